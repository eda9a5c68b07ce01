use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Args;

use crate::session::StaticCredential;
use crate::source::{DataSource, DEFAULT_TIMEOUT};

#[derive(Args, Debug, Clone)]
pub struct DataArgs {
    /// Fleet inventory CSV (path or URL)
    #[arg(long, env = "FLEET_DASH_FLEET_CSV", default_value = "data/fleet.csv")]
    pub fleet_csv: String,
    /// Year-by-month kilometer CSV (path or URL)
    #[arg(long, env = "FLEET_DASH_KMS_CSV", default_value = "data/KMS1.csv")]
    pub kms_csv: String,
    /// Monthly operations metrics CSV (path or URL)
    #[arg(
        long,
        env = "FLEET_DASH_OPERATIONS_CSV",
        default_value = "data/operations.csv"
    )]
    pub operations_csv: String,
    /// Seconds to wait for a CSV before showing fallback data
    #[arg(long, default_value_t = DEFAULT_TIMEOUT.as_secs())]
    pub timeout_secs: u64,
    #[arg(long, default_value = "2024")]
    pub baseline_year: String,
    #[arg(long, default_value = "2025")]
    pub current_year: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub fleet: DataSource,
    pub kilometers: DataSource,
    pub operations: DataSource,
    pub timeout: Duration,
    pub baseline_year: String,
    pub current_year: String,
}

impl From<&DataArgs> for Settings {
    fn from(args: &DataArgs) -> Self {
        Self {
            fleet: DataSource::parse(&args.fleet_csv),
            kilometers: DataSource::parse(&args.kms_csv),
            operations: DataSource::parse(&args.operations_csv),
            timeout: Duration::from_secs(args.timeout_secs.max(1)),
            baseline_year: args.baseline_year.clone(),
            current_year: args.current_year.clone(),
        }
    }
}

pub fn state_dir(explicit: Option<PathBuf>) -> PathBuf {
    explicit.unwrap_or_else(|| PathBuf::from(".fleet-dash"))
}

/// Reads the single accepted login from the environment.
pub fn credential_from_env() -> anyhow::Result<StaticCredential> {
    let email = std::env::var("FLEET_DASH_EMAIL")
        .context("FLEET_DASH_EMAIL must be set to the dashboard login email")?;
    let password = std::env::var("FLEET_DASH_PASSWORD")
        .context("FLEET_DASH_PASSWORD must be set to the dashboard login password")?;
    Ok(StaticCredential::new(&email, &password))
}

/// Digest for the generated login form; `None` when no credential is configured.
pub fn login_digest() -> Option<String> {
    credential_from_env().ok().map(|credential| credential.digest())
}
