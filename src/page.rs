use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

use chrono::Utc;
use tracing::{debug, warn};

use crate::chart::ChartCanvas;
use crate::filter::{FilteredTable, INLINE_FILTER_JS};
use crate::session::{AUTH_KEY, HOME_PAGE, INLINE_GATE_JS, LOGIN_PAGE};

const GROUP_SEPARATOR: char = '\u{a0}';
const DECIMAL_SEPARATOR: char = ',';
const CHART_JS_CDN: &str = "https://cdn.jsdelivr.net/npm/chart.js@4.4.1/dist/chart.umd.min.js";

/// Formats like `Intl.NumberFormat("en-ZA", { maximumFractionDigits })`.
pub fn format_number(value: f64, max_fraction_digits: usize) -> String {
    if !value.is_finite() {
        return "-".to_string();
    }
    // Half away from zero, as Intl does; `{:.*}` alone rounds ties to even.
    let scale = 10f64.powi(max_fraction_digits as i32);
    let rounded = (value.abs() * scale).round() / scale;
    let fixed = format!("{:.*}", max_fraction_digits, rounded);
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i.to_string(), f.trim_end_matches('0').to_string()),
        None => (fixed.clone(), String::new()),
    };

    let mut grouped = String::new();
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(GROUP_SEPARATOR);
        }
        grouped.push(ch);
    }
    if !frac_part.is_empty() {
        grouped.push(DECIMAL_SEPARATOR);
        grouped.push_str(&frac_part);
    }

    if value < 0.0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

/// Like `format_number` but with a leading `+` for non-negative values.
pub fn format_signed(value: f64, max_fraction_digits: usize) -> String {
    let body = format_number(value, max_fraction_digits);
    if value >= 0.0 {
        format!("+{body}")
    } else {
        body
    }
}

/// JSON safe to inline in a `<script>` block: `</` can no longer close the element.
pub fn script_json(value: &serde_json::Value) -> String {
    value.to_string().replace("</", "<\\/")
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    pub text: String,
    /// Pre-rendered child markup, used by card containers.
    pub children: Vec<String>,
    pub classes: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cell {
    pub text: String,
    pub class: Option<String>,
}

impl Cell {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            class: None,
        }
    }

    pub fn with_class(text: impl Into<String>, class: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            class: Some(class.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableRow {
    pub cells: Vec<Cell>,
    pub classes: BTreeSet<String>,
    pub hidden: bool,
}

impl TableRow {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self {
            cells,
            ..Self::default()
        }
    }

    /// All cell text run together, the way the browser reports a row's text content.
    pub fn text_content(&self) -> String {
        self.cells.iter().map(|c| c.text.as_str()).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<TableRow>,
    pub empty_state: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowHandle(pub usize);

/// Page layout, in render order.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Heading(String),
    Stat { id: String, label: String },
    Text { id: String },
    Loading { id: String, message: String },
    Cards { id: String },
    Chart { id: String },
    Table { id: String, search_id: Option<String> },
    Links(Vec<(String, String)>),
    /// Email/password form; `digest` is the accepted credential hash, `None` rejects all.
    LoginForm { digest: Option<String> },
}

impl Block {
    pub fn stat(id: &str, label: &str) -> Self {
        Block::Stat {
            id: id.to_string(),
            label: label.to_string(),
        }
    }

    pub fn text(id: &str) -> Self {
        Block::Text { id: id.to_string() }
    }

    pub fn chart(id: &str) -> Self {
        Block::Chart { id: id.to_string() }
    }

    pub fn table(id: &str, search_id: &str) -> Self {
        Block::Table {
            id: id.to_string(),
            search_id: Some(search_id.to_string()),
        }
    }
}

/// The named elements a page exposes, written to by page controllers.
#[derive(Debug, Default)]
pub struct Document {
    pub title: String,
    pub requires_auth: bool,
    layout: Vec<Block>,
    elements: BTreeMap<String, Element>,
    tables: BTreeMap<String, FilteredTable>,
    charts: BTreeMap<String, ChartCanvas>,
}

impl Document {
    pub fn new(title: impl Into<String>, requires_auth: bool, layout: Vec<Block>) -> Self {
        let mut doc = Self {
            title: title.into(),
            requires_auth,
            ..Self::default()
        };
        for block in &layout {
            match block {
                Block::Stat { id, .. } | Block::Text { id } | Block::Cards { id } => {
                    doc.elements.insert(id.clone(), Element::default());
                }
                Block::Loading { id, message } => {
                    doc.elements.insert(
                        id.clone(),
                        Element {
                            text: message.clone(),
                            ..Element::default()
                        },
                    );
                }
                Block::Chart { id } => {
                    doc.charts.insert(id.clone(), ChartCanvas::new(id.clone()));
                }
                Block::Table { id, .. } => {
                    doc.tables.insert(id.clone(), FilteredTable::default());
                }
                Block::Heading(_) | Block::Links(_) | Block::LoginForm { .. } => {}
            }
        }
        doc.layout = layout;
        doc
    }

    pub fn set_text(&mut self, id: &str, value: impl Into<String>) -> bool {
        match self.elements.get_mut(id) {
            Some(element) => {
                element.text = value.into();
                true
            }
            None => {
                debug!(slot = id, "no such element, skipping");
                false
            }
        }
    }

    /// Writes every slot that exists; returns how many were written.
    pub fn bind<'a, I>(&mut self, slots: I) -> usize
    where
        I: IntoIterator<Item = (&'a str, String)>,
    {
        let mut written = 0;
        for (id, value) in slots {
            if self.set_text(id, value) {
                written += 1;
            }
        }
        written
    }

    pub fn toggle_class(&mut self, id: &str, class: &str, on: bool) {
        if let Some(element) = self.elements.get_mut(id) {
            if on {
                element.classes.insert(class.to_string());
            } else {
                element.classes.remove(class);
            }
        }
    }

    pub fn remove(&mut self, id: &str) -> bool {
        self.elements.remove(id).is_some()
    }

    /// Replaces a card container's children, skipping items that fail to render.
    pub fn fill_container<T, F>(&mut self, id: &str, items: &[T], mut build: F) -> usize
    where
        F: FnMut(&T) -> anyhow::Result<String>,
    {
        let Some(element) = self.elements.get_mut(id) else {
            debug!(slot = id, "no such container, skipping");
            return 0;
        };
        element.children.clear();
        for (index, item) in items.iter().enumerate() {
            match build(item) {
                Ok(markup) => element.children.push(markup),
                Err(err) => warn!(slot = id, index, "failed to render item: {err:#}"),
            }
        }
        element.children.len()
    }

    /// Replaces the whole table body and returns handles to the new rows.
    pub fn render_table<T, F>(
        &mut self,
        id: &str,
        headers: Vec<String>,
        items: &[T],
        mut build: F,
    ) -> Vec<RowHandle>
    where
        F: FnMut(&T) -> anyhow::Result<TableRow>,
    {
        let Some(table) = self.tables.get_mut(id) else {
            debug!(table = id, "no such table, skipping");
            return Vec::new();
        };
        let mut rows = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            match build(item) {
                Ok(row) => rows.push(row),
                Err(err) => warn!(table = id, index, "failed to render row: {err:#}"),
            }
        }
        table.replace_content(headers, rows)
    }

    pub fn table_mut(&mut self, id: &str) -> Option<&mut FilteredTable> {
        self.tables.get_mut(id)
    }

    pub fn chart_mut(&mut self, id: &str) -> Option<&mut ChartCanvas> {
        self.charts.get_mut(id)
    }

    pub fn destroy_charts(&mut self) {
        for canvas in self.charts.values_mut() {
            canvas.destroy();
        }
    }

    pub fn to_html(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "<!DOCTYPE html>");
        let _ = writeln!(out, "<html lang=\"en\">");
        let _ = writeln!(out, "<head>");
        let _ = writeln!(out, "<meta charset=\"UTF-8\">");
        let _ = writeln!(out, "<title>{}</title>", escape(&self.title));
        let _ = writeln!(out, "<style>{}</style>", INLINE_CSS);
        if self.charts.values().any(ChartCanvas::is_live) {
            let _ = writeln!(out, "<script src=\"{CHART_JS_CDN}\"></script>");
        }
        let _ = writeln!(out, "</head>");
        let _ = writeln!(
            out,
            "<body data-requires-auth=\"{}\" data-auth-key=\"{AUTH_KEY}\" \
             data-login-page=\"{LOGIN_PAGE}\" data-home-page=\"{HOME_PAGE}\">",
            self.requires_auth
        );
        if self.requires_auth {
            let _ = writeln!(
                out,
                "<nav class=\"topbar\"><a href=\"{HOME_PAGE}\">Home</a> \
                 <a href=\"{LOGIN_PAGE}\" data-signout>Sign out</a></nav>"
            );
        }
        let _ = writeln!(out, "<main>");
        let _ = writeln!(out, "<h1>{}</h1>", escape(&self.title));

        for block in &self.layout {
            self.render_block(&mut out, block);
        }

        let _ = writeln!(out, "</main>");
        let _ = writeln!(
            out,
            "<footer>Generated {}</footer>",
            Utc::now().format("%Y-%m-%d %H:%M UTC")
        );
        for canvas in self.charts.values() {
            if let Some(config) = canvas.config() {
                let _ = writeln!(
                    out,
                    "<script>(() => {{ const cfg = {config}; \
                     if (cfg.unit) {{ cfg.options.scales.y.ticks.callback = \
                     (v) => `${{v.toLocaleString(\"en-ZA\")}} ${{cfg.unit}}`; }} \
                     new Chart(document.getElementById(\"{id}\"), cfg); }})();</script>",
                    config = script_json(&config),
                    id = canvas.id(),
                );
            }
        }
        let searchable = self
            .layout
            .iter()
            .any(|b| matches!(b, Block::Table { search_id: Some(_), .. }));
        if searchable {
            let _ = writeln!(out, "<script>{INLINE_FILTER_JS}</script>");
        }
        let _ = writeln!(out, "<script>{INLINE_GATE_JS}</script>");
        let _ = writeln!(out, "</body>");
        let _ = writeln!(out, "</html>");
        out
    }

    fn render_block(&self, out: &mut String, block: &Block) {
        match block {
            Block::Heading(text) => {
                let _ = writeln!(out, "<h2>{}</h2>", escape(text));
            }
            Block::Stat { id, label } => {
                if let Some(element) = self.elements.get(id) {
                    let _ = writeln!(
                        out,
                        "<div class=\"stat\"><span class=\"stat-label\">{}</span> \
                         <span id=\"{}\"{}>{}</span></div>",
                        escape(label),
                        escape(id),
                        class_attr(element),
                        escape(&element.text)
                    );
                }
            }
            Block::Text { id } => {
                if let Some(element) = self.elements.get(id) {
                    let _ = writeln!(
                        out,
                        "<p id=\"{}\"{}>{}</p>",
                        escape(id),
                        class_attr(element),
                        escape(&element.text)
                    );
                }
            }
            Block::Loading { id, .. } => {
                if let Some(element) = self.elements.get(id) {
                    let _ = writeln!(
                        out,
                        "<div id=\"{}\">{}</div>",
                        escape(id),
                        escape(&element.text)
                    );
                }
            }
            Block::Cards { id } => {
                if let Some(element) = self.elements.get(id) {
                    let _ = writeln!(out, "<div id=\"{}\" class=\"row\">", escape(id));
                    for child in &element.children {
                        let _ = writeln!(out, "{child}");
                    }
                    let _ = writeln!(out, "</div>");
                }
            }
            Block::Chart { id } => {
                let _ = writeln!(
                    out,
                    "<div class=\"chart\"><canvas id=\"{}\"></canvas></div>",
                    escape(id)
                );
            }
            Block::Table { id, search_id } => {
                if let Some(search_id) = search_id {
                    let _ = writeln!(
                        out,
                        "<input type=\"search\" id=\"{}\" data-table-filter=\"{}\" \
                         placeholder=\"Search\">",
                        escape(search_id),
                        escape(id)
                    );
                }
                if let Some(filtered) = self.tables.get(id) {
                    render_table_markup(out, id, filtered.table());
                }
            }
            Block::Links(links) => {
                let _ = writeln!(out, "<nav><ul>");
                for (href, label) in links {
                    let _ = writeln!(
                        out,
                        "<li><a href=\"{}\">{}</a></li>",
                        escape(href),
                        escape(label)
                    );
                }
                let _ = writeln!(out, "</ul></nav>");
            }
            Block::LoginForm { digest } => {
                let _ = writeln!(
                    out,
                    "<form data-login-form data-credential=\"{}\">",
                    escape(digest.as_deref().unwrap_or_default())
                );
                let _ = writeln!(
                    out,
                    "<input type=\"email\" id=\"floatingInput\" placeholder=\"name@example.com\">"
                );
                let _ = writeln!(
                    out,
                    "<input type=\"password\" id=\"floatingPassword\" placeholder=\"Password\">"
                );
                let _ = writeln!(out, "<p class=\"login-error\" data-login-error hidden></p>");
                let _ = writeln!(out, "<button type=\"submit\">Sign in</button>");
                let _ = writeln!(out, "</form>");
            }
        }
    }
}

fn class_attr(element: &Element) -> String {
    if element.classes.is_empty() {
        String::new()
    } else {
        let joined: Vec<&str> = element.classes.iter().map(String::as_str).collect();
        format!(" class=\"{}\"", escape(&joined.join(" ")))
    }
}

fn render_table_markup(out: &mut String, id: &str, table: &Table) {
    let _ = writeln!(out, "<table id=\"{}\">", escape(id));
    let _ = write!(out, "<thead><tr>");
    for header in &table.headers {
        let _ = write!(out, "<th>{}</th>", escape(header));
    }
    let _ = writeln!(out, "</tr></thead>");
    let _ = writeln!(out, "<tbody>");
    for row in &table.rows {
        let classes: Vec<&str> = row.classes.iter().map(String::as_str).collect();
        let _ = write!(
            out,
            "<tr{}{}>",
            if classes.is_empty() {
                String::new()
            } else {
                format!(" class=\"{}\"", classes.join(" "))
            },
            if row.hidden { " hidden" } else { "" }
        );
        for cell in &row.cells {
            match &cell.class {
                Some(class) => {
                    let _ = write!(
                        out,
                        "<td class=\"{}\">{}</td>",
                        escape(class),
                        escape(&cell.text)
                    );
                }
                None => {
                    let _ = write!(out, "<td>{}</td>", escape(&cell.text));
                }
            }
        }
        let _ = writeln!(out, "</tr>");
    }
    let _ = writeln!(out, "</tbody>");
    let _ = writeln!(out, "</table>");
    let _ = writeln!(
        out,
        "<p class=\"table-empty-state\"{}>No matching rows.</p>",
        if table.empty_state { "" } else { " hidden" }
    );
}

const INLINE_CSS: &str = "\
body{font-family:'Space Grotesk',sans-serif;background:#0b1410;color:#c8d5cf;margin:2rem}\
main{max-width:1100px;margin:auto}\
.stat{margin:.4rem 0}.stat-label{color:#9aa79f}\
.negative{color:#f7a252}.positive{color:#0fb36c}\
.variance-positive{color:#f7a252}.variance-negative{color:#0fb36c}\
.highlight{background:rgba(147,247,202,.15)}\
.chart{position:relative;height:360px}\
.row{display:flex;flex-wrap:wrap;gap:1rem}\
.vehicle-card{border:1px solid #28402f;border-radius:8px;padding:1rem;width:300px}\
.badge{padding:.1rem .5rem;border-radius:4px}\
.bg-success{background:#0f6b3c}.bg-warning{background:#a36b12}\
table{border-collapse:collapse;width:100%}\
td,th{padding:.3rem .6rem;border-bottom:1px solid #1d2b24}\
.topbar{display:flex;justify-content:flex-end;gap:1rem}.topbar a{color:#93f7ca}\
form[data-login-form]{display:grid;gap:.6rem;max-width:320px}.login-error{color:#f7a252}\
footer{margin-top:2rem;color:#66736b;font-size:.8rem}";

#[cfg(test)]
impl Document {
    pub fn element(&self, id: &str) -> Option<&Element> {
        self.elements.get(id)
    }

    pub fn text(&self, id: &str) -> Option<&str> {
        self.elements.get(id).map(|e| e.text.as_str())
    }

    pub fn table(&self, id: &str) -> Option<&FilteredTable> {
        self.tables.get(id)
    }

    pub fn chart(&self, id: &str) -> Option<&ChartCanvas> {
        self.charts.get(id)
    }
}
