use thiserror::Error;

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("CSV format invalid, missing columns: {}", .missing.join(", "))]
    FormatInvalid { missing: Vec<String> },

    #[error("CSV contained no data rows")]
    Empty,

    #[error("fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("CSV read error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DashboardError>;
