use std::cmp::Ordering;
use std::collections::BTreeMap;

use tracing::debug;

use crate::error::{DashboardError, Result};
use crate::models::{
    KilometerPivot, MonthlyDataset, MonthlyMetrics, PivotRow, RowRecord, VehicleRecord, YearProfile,
};

/// Splits CSV text into trimmed cells. Quoted fields are not special.
pub fn parse_csv(text: &str) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .quoting(false)
        .flexible(true)
        .from_reader(text.trim().as_bytes());

    let mut table = Vec::new();
    for record in reader.records() {
        let record = record?;
        table.push(record.iter().map(normalize_cell).collect());
    }
    Ok(table)
}

fn normalize_cell(cell: &str) -> String {
    cell.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Keeps only digits, sign and dot before converting; anything unparseable is zero.
pub fn parse_numeric(cell: &str) -> f64 {
    let sanitized: String = cell
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if sanitized.is_empty() {
        return 0.0;
    }
    sanitized
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    pub headers: Vec<String>,
    pub rows: Vec<RowRecord>,
}

impl RecordSet {
    /// Parses a header row plus data rows and checks that every required column exists.
    pub fn from_csv(text: &str, required: &[&str]) -> Result<Self> {
        let mut table = parse_csv(text)?.into_iter();
        let headers = table.next().ok_or(DashboardError::Empty)?;

        let missing: Vec<String> = required
            .iter()
            .filter(|name| !headers.iter().any(|h| h.as_str() == **name))
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(DashboardError::FormatInvalid { missing });
        }

        let rows: Vec<RowRecord> = table
            .filter(|cells| cells.iter().any(|c| !c.is_empty()))
            .map(|cells| {
                RowRecord::from_pairs(headers.iter().enumerate().map(|(i, header)| {
                    (header.clone(), cells.get(i).cloned().unwrap_or_default())
                }))
            })
            .collect();

        debug!(columns = headers.len(), rows = rows.len(), "parsed record set");
        Ok(Self { headers, rows })
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.headers.iter().any(|h| h == column)
    }

    /// Drops rows whose key column is empty.
    pub fn retain_keyed(mut self, key: &str) -> Self {
        self.rows.retain(|row| !row.get(key).is_empty());
        self
    }

    pub fn column_total(&self, column: &str) -> f64 {
        self.rows.iter().map(|row| parse_numeric(row.get(column))).sum()
    }

    pub fn totals(&self, columns: &[&str]) -> BTreeMap<String, f64> {
        columns
            .iter()
            .filter(|c| self.has_column(c))
            .map(|c| (c.to_string(), self.column_total(c)))
            .collect()
    }
}

pub fn vehicles_from_csv(text: &str) -> Result<Vec<VehicleRecord>> {
    let set = RecordSet::from_csv(text, &["fleet_number", "current_mileage"])?;
    if set.rows.is_empty() {
        return Err(DashboardError::Empty);
    }
    Ok(set.rows.iter().map(VehicleRecord::from_row).collect())
}

pub fn monthly_metrics_from_csv(text: &str) -> Result<MonthlyDataset> {
    let set = RecordSet::from_csv(text, &MonthlyMetrics::REQUIRED)?.retain_keyed("Month");
    if set.rows.is_empty() {
        return Err(DashboardError::Empty);
    }
    let months = set
        .rows
        .iter()
        .map(|row| MonthlyMetrics {
            month: row.get("Month").to_string(),
            speeding_occurrences: parse_numeric(row.get("SpeedingOccurrences")),
            shift_hours: parse_numeric(row.get("ShiftHours")),
            accidents: parse_numeric(row.get("Accidents")),
            longhaul_km: parse_numeric(row.get("LonghaulKm")),
            local_km: parse_numeric(row.get("LocalKm")),
            total_km: parse_numeric(row.get("TotalKm")),
        })
        .collect();
    Ok(MonthlyDataset {
        months,
        totals: set.totals(&MonthlyMetrics::NUMERIC),
    })
}

/// Turns a year-per-row, month-per-column table into month rows with one value per year.
pub fn pivot_year_months(table: &[Vec<String>]) -> Option<KilometerPivot> {
    let (headers, rows) = table.split_first()?;
    if rows.is_empty() {
        return None;
    }

    let months: Vec<String> = headers
        .iter()
        .skip(1)
        .map(|h| h.chars().filter(|c| !c.is_whitespace()).collect())
        .collect();

    let mut profiles: Vec<YearProfile> = rows
        .iter()
        .filter_map(|row| {
            let year: String = row.first()?.chars().filter(|c| !c.is_whitespace()).collect();
            if year.is_empty() {
                return None;
            }
            Some(YearProfile {
                year,
                values: row.iter().skip(1).map(|c| parse_numeric(c)).collect(),
            })
        })
        .collect();
    if profiles.is_empty() {
        return None;
    }
    profiles.sort_by(|a, b| compare_years(&a.year, &b.year));

    let rows: Vec<PivotRow> = months
        .iter()
        .enumerate()
        .map(|(i, month)| {
            let values: Vec<f64> = profiles
                .iter()
                .map(|p| p.values.get(i).copied().unwrap_or(0.0))
                .collect();
            let variance = if values.len() >= 2 {
                Some(values[values.len() - 1] - values[0])
            } else {
                None
            };
            PivotRow {
                month: month.clone(),
                values,
                variance,
            }
        })
        .collect();

    let totals: BTreeMap<String, f64> = profiles
        .iter()
        .map(|p| (p.year.clone(), p.values.iter().sum::<f64>()))
        .collect();

    Some(KilometerPivot {
        years: profiles.into_iter().map(|p| p.year).collect(),
        rows,
        totals,
    })
}

// Numeric years first in numeric order, anything else after in lexical order.
fn compare_years(a: &str, b: &str) -> Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KMS: &str = "Year, January ,February,March\n\
                       2025,1 000,2000,3000\n\
                       2024,500,km 700,\n\
                       ,9,9,9\n";

    #[test]
    fn splits_lines_and_collapses_whitespace() {
        let table = parse_csv("a,  b   c ,d\r\n1,2,3\n").unwrap();
        assert_eq!(table[0], vec!["a", "b c", "d"]);
        assert_eq!(table[1], vec!["1", "2", "3"]);
    }

    #[test]
    fn quotes_are_not_special() {
        let table = parse_csv("name,make\n\"Volvo, FM\",x\n").unwrap();
        assert_eq!(table[1], vec!["\"Volvo", "FM\"", "x"]);
    }

    #[test]
    fn numeric_coercion_strips_noise() {
        assert_eq!(parse_numeric("1 130 625"), 1_130_625.0);
        assert_eq!(parse_numeric("R1,234.50"), 1234.5);
        assert_eq!(parse_numeric("-42 km"), -42.0);
        assert_eq!(parse_numeric("abc"), 0.0);
        assert_eq!(parse_numeric(""), 0.0);
        assert_eq!(parse_numeric("1.2.3"), 0.0);
        assert_eq!(parse_numeric("-"), 0.0);
    }

    #[test]
    fn missing_required_column_is_format_invalid() {
        let err =
            RecordSet::from_csv("fleet_number,HR\nF150,JBN", &["fleet_number", "current_mileage"])
                .unwrap_err();
        match err {
            DashboardError::FormatInvalid { missing } => {
                assert_eq!(missing, vec!["current_mileage"])
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn column_names_match_exactly() {
        let result =
            RecordSet::from_csv("Fleet_Number,current_mileage\nF1,10", &["fleet_number"]);
        assert!(matches!(result, Err(DashboardError::FormatInvalid { .. })));
    }

    #[test]
    fn short_rows_get_empty_cells_and_totals_sum() {
        let set =
            RecordSet::from_csv("Month,Accidents,TotalKm\nJan,2,100\nFeb,,250\nMar", &["Month"])
                .unwrap();
        assert_eq!(set.rows.len(), 3);
        assert_eq!(set.rows[2].get("TotalKm"), "");
        assert_eq!(set.column_total("Accidents"), 2.0);
        assert_eq!(set.column_total("TotalKm"), 350.0);
        let totals = set.totals(&["Accidents", "Speeding"]);
        assert_eq!(totals.len(), 1);
    }

    #[test]
    fn rows_with_empty_key_are_dropped() {
        let set = RecordSet::from_csv("Month,TotalKm\nJan,10\n,20\nFeb,30", &["Month"])
            .unwrap()
            .retain_keyed("Month");
        assert_eq!(set.rows.len(), 2);
        assert_eq!(set.column_total("TotalKm"), 40.0);
    }

    #[test]
    fn monthly_metrics_optional_columns_default_to_zero() {
        let data = monthly_metrics_from_csv("Month,TotalKm\nJanuary,1200\nFebruary,800\n").unwrap();
        assert_eq!(data.months.len(), 2);
        assert_eq!(data.months[0].accidents, 0.0);
        assert_eq!(data.months[0].total_km, 1200.0);
        assert_eq!(data.total("TotalKm"), 2000.0);
        assert!(!data.totals.contains_key("Accidents"));
        assert_eq!(data.total("Accidents"), 0.0);
    }

    #[test]
    fn pivot_sorts_years_and_computes_variance() {
        let table = parse_csv(KMS).unwrap();
        let pivot = pivot_year_months(&table).unwrap();
        assert_eq!(pivot.years, vec!["2024", "2025"]);
        assert_eq!(pivot.rows[0].month, "January");
        assert_eq!(pivot.rows[0].values, vec![500.0, 1000.0]);
        assert_eq!(pivot.rows[0].variance, Some(500.0));
        assert_eq!(pivot.rows[2].values, vec![0.0, 3000.0]);
        assert_eq!(pivot.totals["2024"], 1200.0);
        assert_eq!(pivot.totals["2025"], 6000.0);
    }

    #[test]
    fn pivot_needs_header_and_rows() {
        assert!(pivot_year_months(&[]).is_none());
        let table = parse_csv("Year,January").unwrap();
        assert!(pivot_year_months(&table).is_none());
    }

    #[test]
    fn single_year_pivot_has_no_variance() {
        let table = parse_csv("Year,Jan,Feb\n2024,1,2").unwrap();
        let pivot = pivot_year_months(&table).unwrap();
        assert!(pivot.rows.iter().all(|r| r.variance.is_none()));
    }
}
