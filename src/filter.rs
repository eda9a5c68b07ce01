use tracing::trace;

use crate::page::{RowHandle, Table, TableRow};

pub const HIGHLIGHT: &str = "highlight";

/// Browser-side equivalent of [`apply`], wired to every `data-table-filter` input.
pub const INLINE_FILTER_JS: &str = r#"(() => {
  const apply = (input, table) => {
    const query = input.value.trim().toLowerCase();
    let visible = 0;
    table.querySelectorAll("tbody tr").forEach((row) => {
      const matches = row.textContent.toLowerCase().includes(query);
      row.hidden = Boolean(query) && !matches;
      row.classList.toggle("highlight", Boolean(query) && matches);
      if (!row.hidden) visible += 1;
    });
    const empty = table.parentElement && table.parentElement.querySelector(".table-empty-state");
    if (empty) empty.hidden = visible > 0;
  };
  document.querySelectorAll("[data-table-filter]").forEach((input) => {
    const table = document.getElementById(input.getAttribute("data-table-filter"));
    if (table) input.addEventListener("input", () => apply(input, table));
  });
})();"#;

/// Shows rows whose text contains `query` (case-insensitive); returns the visible count.
pub fn apply(query: &str, table: &mut Table) -> usize {
    let query = query.trim().to_lowercase();
    let active = !query.is_empty();
    let mut visible = 0;

    for row in table.rows.iter_mut() {
        let matches = row.text_content().to_lowercase().contains(&query);
        row.hidden = active && !matches;
        if active && matches {
            row.classes.insert(HIGHLIGHT.to_string());
        } else {
            row.classes.remove(HIGHLIGHT);
        }
        if !row.hidden {
            visible += 1;
        }
    }

    table.empty_state = visible == 0;
    trace!(query = %query, visible, "filter applied");
    visible
}

/// A table plus its active search query. Content replacement re-runs a non-empty query.
#[derive(Debug, Clone, Default)]
pub struct FilteredTable {
    table: Table,
    query: String,
}

impl FilteredTable {
    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn set_query(&mut self, query: &str) -> usize {
        self.query = query.to_string();
        apply(&self.query, &mut self.table)
    }

    pub fn replace_content(
        &mut self,
        headers: Vec<String>,
        rows: Vec<TableRow>,
    ) -> Vec<RowHandle> {
        self.table.headers = headers;
        self.table.rows = rows;
        self.table.empty_state = self.table.rows.is_empty();
        if !self.query.trim().is_empty() {
            apply(&self.query, &mut self.table);
        }
        (0..self.table.rows.len()).map(RowHandle).collect()
    }
}

#[cfg(test)]
impl FilteredTable {
    pub fn row(&self, handle: RowHandle) -> Option<&TableRow> {
        self.table.rows.get(handle.0)
    }

    pub fn visible_rows(&self) -> impl Iterator<Item = &TableRow> {
        self.table.rows.iter().filter(|row| !row.hidden)
    }
}
