use crate::models::{Comparison, Extreme, Extremes, MonthlyDataset, OperationsSummary};

pub const PER_100K: f64 = 100_000.0;

pub fn sum(values: &[f64]) -> f64 {
    values.iter().sum()
}

pub fn average(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        sum(values) / values.len() as f64
    }
}

/// Peak and trough of a series; ties resolve to the first index.
pub fn extremes(values: &[f64], labels: &[String]) -> Extremes {
    let mut max = Extreme {
        label: "-".to_string(),
        index: None,
        value: 0.0,
    };
    let mut min = Extreme {
        label: "-".to_string(),
        index: None,
        value: 0.0,
    };

    for (index, &value) in values.iter().enumerate() {
        let label = labels
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("#{}", index + 1));
        if max.index.is_none() || value > max.value {
            max = Extreme {
                label: label.clone(),
                index: Some(index),
                value,
            };
        }
        if min.index.is_none() || value < min.value {
            min = Extreme {
                label,
                index: Some(index),
                value,
            };
        }
    }

    Extremes { max, min }
}

impl Comparison {
    pub fn between(baseline: f64, current: f64) -> Self {
        let delta = current - baseline;
        let percent = if baseline > 0.0 {
            delta / baseline * 100.0
        } else {
            0.0
        };
        Self {
            baseline,
            current,
            delta,
            percent,
        }
    }

    pub fn is_increase(&self) -> bool {
        self.percent > 0.0
    }
}

pub fn rate_per_100k(count: f64, km: f64) -> f64 {
    if km <= 0.0 {
        0.0
    } else {
        count / km * PER_100K
    }
}

/// Current intensity and its change versus baseline, only when every total is positive.
pub fn intensity(
    baseline_emissions: f64,
    current_emissions: f64,
    baseline_km: f64,
    current_km: f64,
) -> Option<Comparison> {
    let all_positive = [baseline_emissions, current_emissions, baseline_km, current_km]
        .iter()
        .all(|v| v.is_finite() && *v > 0.0);
    if !all_positive {
        return None;
    }
    Some(Comparison::between(
        baseline_emissions / baseline_km,
        current_emissions / current_km,
    ))
}

/// Period totals and per-100k rates, built from the dataset's column totals.
pub fn summarize_operations(data: &MonthlyDataset) -> OperationsSummary {
    let months = data.months.len();
    let total_km = data.total("TotalKm");
    let accidents = data.total("Accidents");
    let speeding = data.total("SpeedingOccurrences");
    OperationsSummary {
        months,
        speeding,
        shift_hours: data.total("ShiftHours"),
        accidents,
        longhaul_km: data.total("LonghaulKm"),
        local_km: data.total("LocalKm"),
        total_km,
        avg_km_per_month: if months > 0 {
            total_km / months as f64
        } else {
            0.0
        },
        accidents_per_100k: rate_per_100k(accidents, total_km),
        speeding_per_100k: rate_per_100k(speeding, total_km),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("m{i}")).collect()
    }

    #[test]
    fn extremes_take_first_index_on_ties() {
        let result = extremes(&[3.0, 1.0, 4.0, 1.0, 5.0], &labels(5));
        assert_eq!(result.max.index, Some(4));
        assert_eq!(result.max.value, 5.0);
        assert_eq!(result.min.index, Some(1));
        assert_eq!(result.min.value, 1.0);
        assert_eq!(result.min.label, "m1");

        let flat = extremes(&[2.0, 2.0, 2.0], &labels(3));
        assert_eq!(flat.max.index, Some(0));
        assert_eq!(flat.min.index, Some(0));
    }

    #[test]
    fn extremes_of_empty_series_are_placeholders() {
        let result = extremes(&[], &[]);
        assert_eq!(result.max.label, "-");
        assert_eq!(result.max.index, None);
        assert_eq!(result.min.value, 0.0);
    }

    #[test]
    fn comparison_divides_by_baseline() {
        let c = Comparison::between(200.0, 250.0);
        assert_eq!(c.delta, 50.0);
        assert!((c.percent - 25.0).abs() < 1e-9);
        assert!(c.is_increase());

        let down = Comparison::between(400.0, 300.0);
        assert!((down.percent + 25.0).abs() < 1e-9);
        assert!(!down.is_increase());
    }

    #[test]
    fn zero_baseline_gives_zero_percent() {
        let c = Comparison::between(0.0, 120.0);
        assert_eq!(c.delta, 120.0);
        assert_eq!(c.percent, 0.0);
    }

    #[test]
    fn rate_is_scaled_per_100k_km() {
        assert!((rate_per_100k(3.0, 600_000.0) - 0.5).abs() < 1e-9);
        assert_eq!(rate_per_100k(3.0, 0.0), 0.0);
    }

    #[test]
    fn intensity_requires_all_totals() {
        assert!(intensity(100.0, 100.0, 0.0, 50.0).is_none());
        let c = intensity(100.0, 90.0, 50.0, 60.0).unwrap();
        assert!((c.baseline - 2.0).abs() < 1e-9);
        assert!((c.current - 1.5).abs() < 1e-9);
        assert!((c.percent + 25.0).abs() < 1e-9);
    }

    #[test]
    fn operations_summary_totals_and_rates() {
        let data = crate::pipeline::monthly_metrics_from_csv(
            "Month,SpeedingOccurrences,ShiftHours,Accidents,TotalKm\n\
             Jan,4,10,1,100000\n\
             Feb,4,10,2,300000\n",
        )
        .unwrap();
        let summary = summarize_operations(&data);
        assert_eq!(summary.months, 2);
        assert_eq!(summary.total_km, 400_000.0);
        assert_eq!(summary.longhaul_km, 0.0);
        assert_eq!(summary.avg_km_per_month, 200_000.0);
        assert!((summary.accidents_per_100k - 0.75).abs() < 1e-9);
        assert!((summary.speeding_per_100k - 2.0).abs() < 1e-9);
        assert_eq!(
            summarize_operations(&MonthlyDataset::default()).accidents_per_100k,
            0.0
        );
    }
}
