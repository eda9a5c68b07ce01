//! Declarative Chart.js configuration.
//!
//! Pages describe a chart with [`ChartSpec`]; [`ChartSpec::to_config`] turns it into the
//! JSON that `new Chart(canvas, config)` expects, with the dashboard's fixed styling.
//! [`ChartCanvas`] owns at most one live chart per canvas.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Line,
    Bar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Theme {
    /// Dark emissions dashboard: soft grid lines and muted ticks.
    Dark,
    /// Plain incident charts.
    Light,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSpec {
    pub label: String,
    pub data: Vec<f64>,
    pub color: String,
}

impl SeriesSpec {
    pub fn new(label: impl Into<String>, data: &[f64], color: &str) -> Self {
        Self {
            label: label.into(),
            data: data.to_vec(),
            color: color.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub labels: Vec<String>,
    pub series: Vec<SeriesSpec>,
    pub x_title: Option<String>,
    pub y_title: String,
    /// Appended to y-axis tick values, e.g. `kg`.
    pub unit: Option<String>,
    pub theme: Theme,
}

impl ChartSpec {
    pub fn new(kind: ChartKind, labels: Vec<String>, y_title: impl Into<String>) -> Self {
        Self {
            kind,
            labels,
            series: Vec::new(),
            x_title: Some("Month".to_string()),
            y_title: y_title.into(),
            unit: None,
            theme: Theme::Light,
        }
    }

    pub fn series(mut self, series: SeriesSpec) -> Self {
        self.series.push(series);
        self
    }

    pub fn unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }

    pub fn theme(mut self, theme: Theme) -> Self {
        self.theme = theme;
        self
    }

    fn dataset(&self, series: &SeriesSpec, hidden: bool) -> Value {
        let fill = match self.kind {
            ChartKind::Bar => series.color.as_str(),
            ChartKind::Line => "transparent",
        };
        match self.theme {
            Theme::Dark => json!({
                "label": series.label,
                "data": series.data,
                "fill": false,
                "tension": 0.25,
                "borderColor": series.color,
                "backgroundColor": series.color,
                "pointBackgroundColor": series.color,
                "pointRadius": 4,
                "borderWidth": 3,
                "hidden": hidden,
            }),
            Theme::Light => json!({
                "label": series.label,
                "data": series.data,
                "tension": 0,
                "borderColor": series.color,
                "backgroundColor": fill,
                "pointBackgroundColor": series.color,
                "borderWidth": 4,
                "hidden": hidden,
            }),
        }
    }

    /// Chart.js config; series whose label is in `hidden` start hidden.
    pub fn to_config(&self, hidden: &BTreeSet<String>) -> Value {
        let datasets: Vec<Value> = self
            .series
            .iter()
            .map(|s| self.dataset(s, hidden.contains(&s.label)))
            .collect();

        let mut options = match self.theme {
            Theme::Dark => json!({
                "maintainAspectRatio": false,
                "plugins": {
                    "legend": {
                        "position": "top",
                        "labels": { "color": "#c8d5cf", "font": { "family": "Space Grotesk" } },
                    },
                    "tooltip": {
                        "backgroundColor": "rgba(3, 12, 8, 0.9)",
                        "borderColor": "rgba(147, 247, 202, 0.3)",
                        "borderWidth": 1,
                        "padding": 12,
                    },
                },
                "scales": {
                    "x": {
                        "grid": { "color": "rgba(255, 255, 255, 0.05)" },
                        "ticks": { "color": "#9aa79f" },
                    },
                    "y": {
                        "beginAtZero": true,
                        "grid": { "color": "rgba(255, 255, 255, 0.08)" },
                        "ticks": { "color": "#9aa79f" },
                        "title": { "display": true, "text": self.y_title, "color": "#c8d5cf" },
                    },
                },
            }),
            Theme::Light => json!({
                "plugins": {
                    "legend": { "display": true },
                    "tooltip": { "boxPadding": 3 },
                },
                "scales": {
                    "x": {},
                    "y": {
                        "ticks": {},
                        "title": { "display": true, "text": self.y_title },
                    },
                },
            }),
        };
        if let Some(x_title) = &self.x_title {
            options["scales"]["x"]["title"] = json!({ "display": true, "text": x_title });
        }

        let mut config = json!({
            "type": self.kind,
            "data": { "labels": self.labels, "datasets": datasets },
            "options": options,
        });
        if let Some(unit) = &self.unit {
            config["unit"] = json!(unit);
        }
        config
    }
}

#[derive(Debug, Clone)]
struct ChartInstance {
    generation: u64,
    spec: ChartSpec,
    hidden: BTreeSet<String>,
}

/// A canvas slot holding at most one chart instance.
#[derive(Debug, Clone)]
pub struct ChartCanvas {
    id: String,
    generation: u64,
    instance: Option<ChartInstance>,
}

impl ChartCanvas {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            generation: 0,
            instance: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_live(&self) -> bool {
        self.instance.is_some()
    }

    /// Destroys any existing chart before creating the new one.
    pub fn init(&mut self, spec: ChartSpec) {
        self.destroy();
        self.generation += 1;
        debug!(
            canvas = %self.id,
            generation = self.generation,
            series = spec.series.len(),
            "chart created"
        );
        self.instance = Some(ChartInstance {
            generation: self.generation,
            spec,
            hidden: BTreeSet::new(),
        });
    }

    pub fn destroy(&mut self) {
        if let Some(old) = self.instance.take() {
            debug!(canvas = %self.id, generation = old.generation, "chart destroyed");
        }
    }

    /// Shows or hides every dataset whose label contains `label_part`; returns how many matched.
    pub fn set_visible(&mut self, label_part: &str, visible: bool) -> usize {
        let Some(instance) = self.instance.as_mut() else {
            return 0;
        };
        let mut matched = 0;
        for series in instance.spec.series.iter().filter(|s| s.label.contains(label_part)) {
            matched += 1;
            if visible {
                instance.hidden.remove(&series.label);
            } else {
                instance.hidden.insert(series.label.clone());
            }
        }
        matched
    }

    pub fn config(&self) -> Option<Value> {
        self.instance
            .as_ref()
            .map(|instance| instance.spec.to_config(&instance.hidden))
    }
}

#[cfg(test)]
impl ChartCanvas {
    pub fn generation(&self) -> u64 {
        self.instance.as_ref().map(|i| i.generation).unwrap_or(0)
    }

    pub fn is_visible(&self, label: &str) -> bool {
        self.instance
            .as_ref()
            .map(|i| i.spec.series.iter().any(|s| s.label == label) && !i.hidden.contains(label))
            .unwrap_or(false)
    }
}
