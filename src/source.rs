use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::Client;
use tracing::{info, warn};

use crate::error::{DashboardError, Result};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    File(PathBuf),
    Url(String),
}

impl DataSource {
    pub fn parse(value: &str) -> Self {
        if value.starts_with("http://") || value.starts_with("https://") {
            DataSource::Url(value.to_string())
        } else {
            DataSource::File(PathBuf::from(value))
        }
    }

    pub fn describe(&self) -> String {
        match self {
            DataSource::File(path) => path.display().to_string(),
            DataSource::Url(url) => url.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Live,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct Loaded<T> {
    pub data: T,
    pub origin: Origin,
}

impl<T> Loaded<T> {
    pub fn is_fallback(&self) -> bool {
        self.origin == Origin::Fallback
    }
}

pub async fn fetch_text(client: &Client, source: &DataSource) -> Result<String> {
    match source {
        DataSource::File(path) => Ok(tokio::fs::read_to_string(path).await?),
        DataSource::Url(url) => {
            let response = client.get(url).send().await?.error_for_status()?;
            Ok(response.text().await?)
        }
    }
}

/// Runs `fetch` against `timeout`; the first to finish wins.
///
/// On timeout the fetch future is dropped, so a late response is never seen.
pub async fn race<T, Fut, P>(fetch: Fut, timeout: Duration, parse: P) -> Result<T>
where
    Fut: Future<Output = Result<String>>,
    P: FnOnce(&str) -> Result<T>,
{
    tokio::select! {
        text = fetch => parse(&text?),
        _ = tokio::time::sleep(timeout) => Err(DashboardError::Timeout(timeout)),
    }
}

/// Loads and parses `source`, substituting `fallback()` exactly once on any failure.
pub async fn load_or_fallback<T, P, F>(
    client: &Client,
    source: &DataSource,
    timeout: Duration,
    parse: P,
    fallback: F,
) -> Loaded<T>
where
    P: FnOnce(&str) -> Result<T>,
    F: FnOnce() -> T,
{
    settle(
        &source.describe(),
        race(fetch_text(client, source), timeout, parse).await,
        fallback,
    )
}

fn settle<T, F>(name: &str, result: Result<T>, fallback: F) -> Loaded<T>
where
    F: FnOnce() -> T,
{
    match result {
        Ok(data) => {
            info!(source = name, "loaded live data");
            Loaded {
                data,
                origin: Origin::Live,
            }
        }
        Err(err) => {
            warn!(source = name, "{err}; using fallback data");
            Loaded {
                data: fallback(),
                origin: Origin::Fallback,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use crate::pipeline::vehicles_from_csv;

    fn fallback() -> Vec<String> {
        vec!["fallback".to_string()]
    }

    fn fleet_numbers(text: &str) -> Result<Vec<String>> {
        Ok(vehicles_from_csv(text)?
            .into_iter()
            .map(|v| v.fleet_number)
            .collect())
    }

    async fn load_fleet(source: &DataSource) -> Loaded<Vec<String>> {
        load_or_fallback(&Client::new(), source, DEFAULT_TIMEOUT, fleet_numbers, fallback).await
    }

    #[test]
    fn urls_and_paths_are_told_apart() {
        assert_eq!(
            DataSource::parse("https://example.com/data.csv"),
            DataSource::Url("https://example.com/data.csv".to_string())
        );
        assert_eq!(
            DataSource::parse("data/fleet.csv"),
            DataSource::File(PathBuf::from("data/fleet.csv"))
        );
    }

    #[tokio::test]
    async fn reads_live_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "fleet_number,current_mileage\nF150,1130625\nF153,1040478").unwrap();
        let source = DataSource::File(file.path().to_path_buf());

        let loaded = load_fleet(&source).await;
        assert_eq!(loaded.origin, Origin::Live);
        assert_eq!(loaded.data, vec!["F150", "F153"]);
    }

    #[tokio::test]
    async fn missing_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let source = DataSource::File(dir.path().join("absent.csv"));
        let loaded = load_fleet(&source).await;
        assert!(loaded.is_fallback());
        assert_eq!(loaded.data, fallback());
    }

    #[tokio::test]
    async fn missing_column_falls_back() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "fleet_number,HR\nF150,JBN 851 MP").unwrap();
        let source = DataSource::File(file.path().to_path_buf());
        let loaded = load_fleet(&source).await;
        assert!(loaded.is_fallback());
    }

    #[tokio::test(start_paused = true)]
    async fn late_response_after_timeout_is_discarded() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        let slow = async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            flag.store(true, Ordering::SeqCst);
            Ok::<_, DashboardError>("fleet_number,current_mileage\nLATE,1".to_string())
        };

        let result = race(slow, DEFAULT_TIMEOUT, fleet_numbers).await;
        let loaded = settle("slow", result, fallback);
        assert!(loaded.is_fallback());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!finished.load(Ordering::SeqCst));
        assert_eq!(loaded.data, fallback());
    }

    #[tokio::test(start_paused = true)]
    async fn fast_response_beats_timeout() {
        let fast = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, DashboardError>("fleet_number,current_mileage\nF158,1073005".to_string())
        };
        let numbers = race(fast, DEFAULT_TIMEOUT, fleet_numbers).await.unwrap();
        assert_eq!(numbers, vec!["F158"]);
    }
}
