use std::collections::BTreeMap;

pub const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// One CSV data row, column name to raw cell text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowRecord {
    cells: BTreeMap<String, String>,
}

impl RowRecord {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            cells: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Cell text, empty when the column is absent.
    pub fn get(&self, column: &str) -> &str {
        self.cells.get(column).map(String::as_str).unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VehicleRecord {
    pub fleet_number: String,
    pub horse_reg: String,
    pub horse_make: String,
    pub trailer_reg: String,
    pub trailer_make: String,
    pub current_mileage: String,
    pub image_filename: String,
}

impl VehicleRecord {
    pub fn from_row(row: &RowRecord) -> Self {
        Self {
            fleet_number: row.get("fleet_number").to_string(),
            horse_reg: row.get("HR").to_string(),
            horse_make: row.get("Horse_Make").to_string(),
            trailer_reg: row.get("TR").to_string(),
            trailer_make: row.get("Trailer_Make").to_string(),
            current_mileage: row.get("current_mileage").to_string(),
            image_filename: row.get("image_filename").to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyMetrics {
    pub month: String,
    pub speeding_occurrences: f64,
    pub shift_hours: f64,
    pub accidents: f64,
    pub longhaul_km: f64,
    pub local_km: f64,
    pub total_km: f64,
}

impl MonthlyMetrics {
    pub const REQUIRED: [&'static str; 2] = ["Month", "TotalKm"];
    pub const NUMERIC: [&'static str; 6] = [
        "SpeedingOccurrences",
        "ShiftHours",
        "Accidents",
        "LonghaulKm",
        "LocalKm",
        "TotalKm",
    ];
}

/// Monthly rows plus per-column totals for the numeric columns present in the file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonthlyDataset {
    pub months: Vec<MonthlyMetrics>,
    pub totals: BTreeMap<String, f64>,
}

impl MonthlyDataset {
    /// Column total, zero when the column was absent.
    pub fn total(&self, column: &str) -> f64 {
        self.totals.get(column).copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct YearProfile {
    pub year: String,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PivotRow {
    pub month: String,
    /// One value per year, in the same order as `KilometerPivot::years`.
    pub values: Vec<f64>,
    pub variance: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KilometerPivot {
    pub years: Vec<String>,
    pub rows: Vec<PivotRow>,
    pub totals: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extreme {
    pub label: String,
    pub index: Option<usize>,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extremes {
    pub max: Extreme,
    pub min: Extreme,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Comparison {
    pub baseline: f64,
    pub current: f64,
    pub delta: f64,
    pub percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleStatus {
    Active,
    Monitor,
    HighMileage,
}

impl VehicleStatus {
    pub fn label(self) -> &'static str {
        match self {
            VehicleStatus::Active => "Active",
            VehicleStatus::Monitor => "Monitor",
            VehicleStatus::HighMileage => "High Mileage",
        }
    }

    pub fn badge_class(self) -> &'static str {
        match self {
            VehicleStatus::Active => "bg-success",
            VehicleStatus::Monitor => "bg-warning text-dark",
            VehicleStatus::HighMileage => "bg-warning",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FleetSummary {
    pub total: usize,
    pub active: usize,
    pub upcoming_coc: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OperationsSummary {
    pub months: usize,
    pub speeding: f64,
    pub shift_hours: f64,
    pub accidents: f64,
    pub longhaul_km: f64,
    pub local_km: f64,
    pub total_km: f64,
    pub avg_km_per_month: f64,
    pub accidents_per_100k: f64,
    pub speeding_per_100k: f64,
}
