use std::collections::BTreeMap;

use anyhow::bail;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::chart::{ChartKind, ChartSpec, SeriesSpec, Theme};
use crate::config::Settings;
use crate::error::DashboardError;
use crate::models::{
    Comparison, FleetSummary, KilometerPivot, MonthlyDataset, VehicleRecord, VehicleStatus, MONTHS,
};
use crate::page::{escape, format_number, format_signed, Block, Cell, Document, TableRow};
use crate::pipeline::{
    monthly_metrics_from_csv, parse_csv, parse_numeric, pivot_year_months, vehicles_from_csv,
};
use crate::samples;
use crate::session::LOGIN_PAGE;
use crate::source::{load_or_fallback, Loaded};
use crate::stats;

const BASELINE_COLOR: &str = "#028C44";
const CURRENT_COLOR: &str = "#171ad1";

/// One generated page. Controllers hold their own state between `init` and `teardown`.
pub trait PageController {
    fn file_name(&self) -> &'static str;
    fn document(&self) -> Document;
    fn init(&mut self, doc: &mut Document);
    fn teardown(&mut self, doc: &mut Document) {
        doc.destroy_charts();
    }
}

pub fn render(controller: &mut dyn PageController) -> String {
    let mut doc = controller.document();
    controller.init(&mut doc);
    let html = doc.to_html();
    controller.teardown(&mut doc);
    html
}

fn month_labels() -> Vec<String> {
    MONTHS.iter().map(|m| m.to_string()).collect()
}

fn yoy_text(change: &Comparison) -> String {
    let sign = if change.is_increase() { "+" } else { "" };
    format!("{sign}{}% YoY", format_number(change.percent, 1))
}

fn bind_change(doc: &mut Document, id: &str, change: &Comparison) {
    doc.set_text(id, yoy_text(change));
    doc.toggle_class(id, "negative", change.is_increase());
    doc.toggle_class(id, "positive", !change.is_increase());
}

/// The login view. Carries the accepted credential digest, if one was configured.
pub struct LoginPage {
    digest: Option<String>,
}

impl LoginPage {
    pub fn new(digest: Option<String>) -> Self {
        if digest.is_none() {
            warn!("no login credential configured, the login form will reject every attempt");
        }
        Self { digest }
    }
}

impl PageController for LoginPage {
    fn file_name(&self) -> &'static str {
        LOGIN_PAGE
    }

    fn document(&self) -> Document {
        Document::new(
            "Sign in",
            false,
            vec![Block::LoginForm {
                digest: self.digest.clone(),
            }],
        )
    }

    fn init(&mut self, _doc: &mut Document) {}
}

pub struct HomePage;

impl PageController for HomePage {
    fn file_name(&self) -> &'static str {
        "home.html"
    }

    fn document(&self) -> Document {
        let links = [
            ("emissions.html", "Emissions"),
            ("fleet.html", "Fleet inventory"),
            ("operations.html", "Operations"),
            ("reports.html", "CO2 report"),
            ("accidents.html", "Accidents"),
            ("blowouts.html", "Blowouts"),
            ("spills.html", "Spills"),
        ];
        Document::new(
            "Fleet Operations",
            true,
            vec![Block::Links(
                links
                    .iter()
                    .map(|(href, label)| (href.to_string(), label.to_string()))
                    .collect(),
            )],
        )
    }

    fn init(&mut self, _doc: &mut Document) {}
}

pub struct EmissionsPage {
    labels: Vec<String>,
    series: BTreeMap<String, Vec<f64>>,
    baseline_year: String,
    current_year: String,
    kilometers: Option<KilometerPivot>,
    kilometers_href: String,
    emission_totals: BTreeMap<String, f64>,
    kilometer_totals: BTreeMap<String, f64>,
}

impl EmissionsPage {
    pub fn new(
        series: BTreeMap<String, Vec<f64>>,
        baseline_year: &str,
        current_year: &str,
        kilometers: Option<KilometerPivot>,
        kilometers_href: &str,
    ) -> Self {
        Self {
            labels: month_labels(),
            series,
            baseline_year: baseline_year.to_string(),
            current_year: current_year.to_string(),
            kilometers,
            kilometers_href: kilometers_href.to_string(),
            emission_totals: BTreeMap::new(),
            kilometer_totals: BTreeMap::new(),
        }
    }

    fn year_series(&self, year: &str) -> &[f64] {
        self.series.get(year).map(Vec::as_slice).unwrap_or(&[])
    }

    fn init_chart(&self, doc: &mut Document) {
        let Some(canvas) = doc.chart_mut("myChart") else {
            return;
        };
        let title = "Total CO2-e emissions [kg]";
        let mut spec = ChartSpec::new(ChartKind::Line, self.labels.clone(), title)
            .series(SeriesSpec::new(
                self.baseline_year.clone(),
                self.year_series(&self.baseline_year),
                "rgba(247, 162, 82, 1)",
            ))
            .series(SeriesSpec::new(
                self.current_year.clone(),
                self.year_series(&self.current_year),
                "rgba(15, 179, 108, 1)",
            ))
            .unit("kg")
            .theme(Theme::Dark);
        spec.x_title = None;
        canvas.init(spec);
    }

    fn populate_emission_stats(&mut self, doc: &mut Document) {
        let baseline_total = stats::sum(self.year_series(&self.baseline_year));
        let current_total = stats::sum(self.year_series(&self.current_year));
        let change = Comparison::between(baseline_total, current_total);
        let extremes = stats::extremes(self.year_series(&self.current_year), &self.labels);

        doc.set_text("stat-total", format!("{} kg", format_number(current_total, 0)));
        bind_change(doc, "stat-change", &change);
        doc.bind([
            (
                "stat-peak",
                format!("{} - {} kg", extremes.max.label, format_number(extremes.max.value, 0)),
            ),
            (
                "stat-best",
                format!("{} - {} kg", extremes.min.label, format_number(extremes.min.value, 0)),
            ),
            ("baseline-year-copy", self.baseline_year.clone()),
            ("current-year-copy", self.current_year.clone()),
            ("baseline-total", format_number(baseline_total, 0)),
            ("current-total", format_number(current_total, 0)),
            ("carousel-change", yoy_text(&change)),
        ]);

        self.emission_totals.insert(self.baseline_year.clone(), baseline_total);
        self.emission_totals.insert(self.current_year.clone(), current_total);
    }

    fn populate_kilometers(&mut self, doc: &mut Document) {
        let Some(pivot) = self.kilometers.clone() else {
            doc.set_text("stat-kms", "N/A");
            doc.set_text("stat-kms-delta", "Fleet data unavailable");
            return;
        };

        let mut headers = vec!["Month".to_string()];
        headers.extend(pivot.years.iter().map(|y| format!("{y} km")));
        if pivot.years.len() >= 2 {
            headers.push("Delta km".to_string());
        }
        let handles = doc.render_table("data-table", headers, &pivot.rows, |row| {
            let mut cells = vec![Cell::new(row.month.clone())];
            cells.extend(row.values.iter().map(|v| Cell::new(format_number(*v, 0))));
            if let Some(variance) = row.variance {
                let class = if variance > 0.0 {
                    "variance-positive"
                } else {
                    "variance-negative"
                };
                cells.push(Cell::with_class(format_signed(variance, 0), class));
            }
            Ok(TableRow::new(cells))
        });
        debug!(rows = handles.len(), "kilometer table rendered");

        let baseline_year = if pivot.totals.contains_key(&self.baseline_year) {
            self.baseline_year.clone()
        } else {
            pivot.years.first().cloned().unwrap_or_default()
        };
        let latest_year = if pivot.totals.contains_key(&self.current_year) {
            self.current_year.clone()
        } else {
            pivot.years.last().cloned().unwrap_or_default()
        };
        let baseline_total = pivot.totals.get(&baseline_year).copied().unwrap_or(0.0);
        let latest_total = pivot.totals.get(&latest_year).copied().unwrap_or(0.0);

        doc.set_text("stat-kms", format!("{} km", format_number(latest_total, 0)));
        if baseline_total != 0.0 {
            let change = Comparison::between(baseline_total, latest_total);
            doc.set_text(
                "stat-kms-delta",
                format!(
                    "{} km ({}% vs {baseline_year})",
                    format_signed(change.delta, 0),
                    format_number(change.percent, 1)
                ),
            );
        }

        self.kilometer_totals.insert(baseline_year, baseline_total);
        self.kilometer_totals.insert(latest_year, latest_total);
    }

    fn update_intensity(&self, doc: &mut Document) {
        let total = |map: &BTreeMap<String, f64>, year: &str| map.get(year).copied().unwrap_or(0.0);
        let Some(change) = stats::intensity(
            total(&self.emission_totals, &self.baseline_year),
            total(&self.emission_totals, &self.current_year),
            total(&self.kilometer_totals, &self.baseline_year),
            total(&self.kilometer_totals, &self.current_year),
        ) else {
            debug!("intensity skipped, totals incomplete");
            return;
        };
        doc.set_text("stat-intensity", format!("{} kg/km", format_number(change.current, 2)));
        doc.set_text(
            "stat-intensity-delta",
            format!("{}% vs {}", format_signed(change.percent, 1), self.baseline_year),
        );
    }
}

impl PageController for EmissionsPage {
    fn file_name(&self) -> &'static str {
        "emissions.html"
    }

    fn document(&self) -> Document {
        Document::new(
            "Fleet Emissions",
            true,
            vec![
                Block::stat("stat-total", "Total emissions"),
                Block::stat("stat-change", "Change"),
                Block::stat("stat-peak", "Peak month"),
                Block::stat("stat-best", "Best month"),
                Block::stat("stat-intensity", "Intensity"),
                Block::stat("stat-intensity-delta", "Intensity change"),
                Block::chart("myChart"),
                Block::Heading("Year on year".to_string()),
                Block::stat("baseline-year-copy", "Baseline year"),
                Block::stat("baseline-total", "Baseline total [kg]"),
                Block::stat("current-year-copy", "Current year"),
                Block::stat("current-total", "Current total [kg]"),
                Block::stat("carousel-change", "Change"),
                Block::Heading("Kilometers".to_string()),
                Block::stat("stat-kms", "Distance"),
                Block::stat("stat-kms-delta", "Distance change"),
                Block::table("data-table", "tableSearch"),
                Block::Links(vec![(
                    self.kilometers_href.clone(),
                    "Download kilometer CSV".to_string(),
                )]),
            ],
        )
    }

    fn init(&mut self, doc: &mut Document) {
        self.init_chart(doc);
        self.populate_emission_stats(doc);
        self.populate_kilometers(doc);
        self.update_intensity(doc);
    }

    fn teardown(&mut self, doc: &mut Document) {
        doc.destroy_charts();
        self.emission_totals.clear();
        self.kilometer_totals.clear();
    }
}

pub fn classify_mileage(mileage: f64) -> VehicleStatus {
    if mileage > 1_200_000.0 {
        VehicleStatus::HighMileage
    } else if mileage > 1_000_000.0 {
        VehicleStatus::Monitor
    } else {
        VehicleStatus::Active
    }
}

pub fn format_mileage(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() || raw == "N/A" {
        return "N/A".to_string();
    }
    if !raw.chars().any(|c| c.is_ascii_digit()) {
        return raw.to_string();
    }
    format!("{} km", format_number(parse_numeric(raw), 0))
}

pub fn summarize_fleet(vehicles: &[VehicleRecord]) -> FleetSummary {
    FleetSummary {
        total: vehicles.len(),
        active: vehicles.len(),
        upcoming_coc: vehicles
            .iter()
            .filter(|v| {
                classify_mileage(parse_numeric(&v.current_mileage)) == VehicleStatus::HighMileage
            })
            .count(),
    }
}

fn or_na(value: &str) -> String {
    if value.is_empty() {
        "N/A".to_string()
    } else {
        escape(value)
    }
}

fn vehicle_card(vehicle: &VehicleRecord) -> anyhow::Result<String> {
    let image = if vehicle.image_filename.is_empty() {
        "placeholder.jpg"
    } else {
        vehicle.image_filename.as_str()
    };
    if image.contains(['/', '\\']) || image.contains("..") {
        bail!("image filename {image:?} is not a plain file name");
    }
    let status = classify_mileage(parse_numeric(&vehicle.current_mileage));
    let link = if vehicle.fleet_number.is_empty() {
        "#".to_string()
    } else {
        format!("Vehicle_{}.html", escape(&vehicle.fleet_number))
    };

    Ok(format!(
        "<div class=\"card vehicle-card\">\
<img src=\"images/{image}\" alt=\"Vehicle {fleet}\" onerror=\"this.style.display='none'\">\
<h5>Fleet: {fleet}</h5>\
<span class=\"badge {badge}\">{status}</span>\
<p><strong>Horse Reg:</strong> {hr}</p>\
<p><strong>Make:</strong> {make}</p>\
<p><strong>Trailer:</strong> {tr}</p>\
<p><strong>Trailer Make:</strong> {trailer_make}</p>\
<p><strong>Mileage:</strong> {mileage}</p>\
<a href=\"{link}\">View Details</a></div>",
        image = escape(image),
        fleet = or_na(&vehicle.fleet_number),
        badge = status.badge_class(),
        status = status.label(),
        hr = or_na(&vehicle.horse_reg),
        make = or_na(&vehicle.horse_make),
        tr = or_na(&vehicle.trailer_reg),
        trailer_make = or_na(&vehicle.trailer_make),
        mileage = escape(&format_mileage(&vehicle.current_mileage)),
    ))
}

fn vehicle_row(vehicle: &VehicleRecord) -> anyhow::Result<TableRow> {
    let status = classify_mileage(parse_numeric(&vehicle.current_mileage));
    Ok(TableRow::new(vec![
        Cell::new(vehicle.fleet_number.clone()),
        Cell::new(vehicle.horse_reg.clone()),
        Cell::new(vehicle.horse_make.clone()),
        Cell::new(vehicle.trailer_reg.clone()),
        Cell::new(vehicle.trailer_make.clone()),
        Cell::new(format_mileage(&vehicle.current_mileage)),
        Cell::with_class(status.label(), status.badge_class()),
    ]))
}

pub struct FleetInventoryPage {
    vehicles: Loaded<Vec<VehicleRecord>>,
    summary: FleetSummary,
}

impl FleetInventoryPage {
    pub fn new(vehicles: Loaded<Vec<VehicleRecord>>) -> Self {
        Self {
            vehicles,
            summary: FleetSummary::default(),
        }
    }

    fn update_statistics(&self, doc: &mut Document) {
        info!(
            total = self.summary.total,
            active = self.summary.active,
            coc_due = self.summary.upcoming_coc,
            "fleet statistics"
        );
        doc.bind([
            ("total-vehicles", self.summary.total.to_string()),
            ("active-vehicles", self.summary.active.to_string()),
            ("upcoming-coc", self.summary.upcoming_coc.to_string()),
        ]);
    }
}

impl PageController for FleetInventoryPage {
    fn file_name(&self) -> &'static str {
        "fleet.html"
    }

    fn document(&self) -> Document {
        Document::new(
            "Fleet Inventory",
            true,
            vec![
                Block::stat("total-vehicles", "Total vehicles"),
                Block::stat("active-vehicles", "Active"),
                Block::stat("upcoming-coc", "Upcoming CoC"),
                Block::text("data-source"),
                Block::Loading {
                    id: "cards-loading".to_string(),
                    message: "Loading fleet...".to_string(),
                },
                Block::Cards {
                    id: "cards-container".to_string(),
                },
                Block::table("data-table", "tableSearch"),
            ],
        )
    }

    fn init(&mut self, doc: &mut Document) {
        doc.remove("cards-loading");
        let vehicles = &self.vehicles.data;
        if self.vehicles.is_fallback() {
            doc.set_text("data-source", "Live fleet data unavailable, showing sample vehicles.");
        }

        if vehicles.is_empty() {
            doc.fill_container("cards-container", &[()], |_| {
                Ok("<div class=\"rtms-empty\">No fleet data available.</div>".to_string())
            });
            self.summary = FleetSummary::default();
            self.update_statistics(doc);
            return;
        }

        let rendered = doc.fill_container("cards-container", vehicles, vehicle_card);
        self.summary = summarize_fleet(vehicles);
        self.summary.active = rendered;

        let headers = ["Fleet", "Horse Reg", "Make", "Trailer", "Trailer Make", "Mileage", "Status"]
            .iter()
            .map(|h| h.to_string())
            .collect();
        doc.render_table("data-table", headers, vehicles, vehicle_row);
        self.update_statistics(doc);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncidentKind {
    Accidents,
    Blowouts,
    Spills,
}

impl IncidentKind {
    pub const ALL: [IncidentKind; 3] = [
        IncidentKind::Accidents,
        IncidentKind::Blowouts,
        IncidentKind::Spills,
    ];

    fn name(self) -> &'static str {
        match self {
            IncidentKind::Accidents => "Accidents",
            IncidentKind::Blowouts => "Blowouts",
            IncidentKind::Spills => "Spills",
        }
    }

    fn series(self) -> ([f64; 12], [f64; 12]) {
        match self {
            IncidentKind::Accidents => samples::ACCIDENTS,
            IncidentKind::Blowouts => samples::BLOWOUTS,
            IncidentKind::Spills => samples::SPILLS,
        }
    }
}

pub struct IncidentPage {
    kind: IncidentKind,
    baseline_year: String,
    current_year: String,
    baseline: Vec<f64>,
    current: Vec<f64>,
}

impl IncidentPage {
    pub fn new(kind: IncidentKind) -> Self {
        let (baseline, current) = kind.series();
        Self {
            kind,
            baseline_year: "2023".to_string(),
            current_year: "2024".to_string(),
            baseline: baseline.to_vec(),
            current: current.to_vec(),
        }
    }
}

impl PageController for IncidentPage {
    fn file_name(&self) -> &'static str {
        match self.kind {
            IncidentKind::Accidents => "accidents.html",
            IncidentKind::Blowouts => "blowouts.html",
            IncidentKind::Spills => "spills.html",
        }
    }

    fn document(&self) -> Document {
        let name = self.kind.name();
        Document::new(
            name,
            true,
            vec![
                Block::stat("stat-total", &format!("{name} in {}", self.current_year)),
                Block::stat("baseline-total", &format!("{name} in {}", self.baseline_year)),
                Block::stat("stat-change", "Change"),
                Block::stat("stat-average", "Average per month"),
                Block::stat("stat-peak", "Worst month"),
                Block::stat("stat-best", "Best month"),
                Block::chart("myChart"),
            ],
        )
    }

    fn init(&mut self, doc: &mut Document) {
        let labels = month_labels();
        if let Some(canvas) = doc.chart_mut("myChart") {
            canvas.init(
                ChartSpec::new(
                    ChartKind::Bar,
                    labels.clone(),
                    format!("{} per month", self.kind.name()),
                )
                .series(SeriesSpec::new(self.baseline_year.clone(), &self.baseline, BASELINE_COLOR))
                .series(SeriesSpec::new(self.current_year.clone(), &self.current, CURRENT_COLOR)),
            );
        }

        let change = Comparison::between(stats::sum(&self.baseline), stats::sum(&self.current));
        let extremes = stats::extremes(&self.current, &labels);
        doc.bind([
            ("stat-total", format_number(change.current, 0)),
            ("baseline-total", format_number(change.baseline, 0)),
            ("stat-average", format_number(stats::average(&self.current), 1)),
            (
                "stat-peak",
                format!("{} - {}", extremes.max.label, format_number(extremes.max.value, 0)),
            ),
            (
                "stat-best",
                format!("{} - {}", extremes.min.label, format_number(extremes.min.value, 0)),
            ),
        ]);
        bind_change(doc, "stat-change", &change);
    }
}

pub struct OperationsPage {
    metrics: Loaded<MonthlyDataset>,
}

impl OperationsPage {
    pub fn new(metrics: Loaded<MonthlyDataset>) -> Self {
        Self { metrics }
    }
}

impl PageController for OperationsPage {
    fn file_name(&self) -> &'static str {
        "operations.html"
    }

    fn document(&self) -> Document {
        Document::new(
            "Fleet Operations",
            true,
            vec![
                Block::text("data-source"),
                Block::stat("ops-months", "Months reported"),
                Block::stat("ops-total-km", "Total distance"),
                Block::stat("ops-longhaul-km", "Long haul"),
                Block::stat("ops-local-km", "Local"),
                Block::stat("ops-avg-km", "Average per month"),
                Block::stat("ops-busiest", "Busiest month"),
                Block::stat("ops-accidents", "Accidents"),
                Block::stat("ops-accident-rate", "Accidents per 100k km"),
                Block::stat("ops-speeding", "Speeding occurrences"),
                Block::stat("ops-speeding-rate", "Speeding per 100k km"),
                Block::stat("ops-shift-hours", "Shift hours"),
                Block::chart("myChart"),
                Block::table("data-table", "tableSearch"),
            ],
        )
    }

    fn init(&mut self, doc: &mut Document) {
        let data = &self.metrics.data;
        let metrics = &data.months;
        if self.metrics.is_fallback() {
            doc.set_text(
                "data-source",
                "Live operations data unavailable, showing sample months.",
            );
        }
        let summary = stats::summarize_operations(data);
        let labels: Vec<String> = metrics.iter().map(|m| m.month.clone()).collect();
        let total_km: Vec<f64> = metrics.iter().map(|m| m.total_km).collect();
        let busiest = stats::extremes(&total_km, &labels).max;

        doc.bind([
            ("ops-months", summary.months.to_string()),
            ("ops-total-km", format!("{} km", format_number(summary.total_km, 0))),
            ("ops-longhaul-km", format!("{} km", format_number(summary.longhaul_km, 0))),
            ("ops-local-km", format!("{} km", format_number(summary.local_km, 0))),
            ("ops-avg-km", format!("{} km", format_number(summary.avg_km_per_month, 0))),
            (
                "ops-busiest",
                format!("{} - {} km", busiest.label, format_number(busiest.value, 0)),
            ),
            ("ops-accidents", format_number(summary.accidents, 0)),
            ("ops-accident-rate", format_number(summary.accidents_per_100k, 2)),
            ("ops-speeding", format_number(summary.speeding, 0)),
            ("ops-speeding-rate", format_number(summary.speeding_per_100k, 2)),
            ("ops-shift-hours", format_number(summary.shift_hours, 0)),
        ]);

        if let Some(canvas) = doc.chart_mut("myChart") {
            let longhaul: Vec<f64> = metrics.iter().map(|m| m.longhaul_km).collect();
            let local: Vec<f64> = metrics.iter().map(|m| m.local_km).collect();
            canvas.init(
                ChartSpec::new(ChartKind::Line, labels, "Distance per month [km]")
                    .series(SeriesSpec::new("Total km", &total_km, BASELINE_COLOR))
                    .series(SeriesSpec::new("Long haul km", &longhaul, CURRENT_COLOR))
                    .series(SeriesSpec::new("Local km", &local, "#f7a252"))
                    .unit("km"),
            );
        }

        let headers = [
            "Month",
            "Total km",
            "Long haul km",
            "Local km",
            "Accidents",
            "Speeding",
            "Shift hours",
            "Accidents per 100k km",
        ]
        .iter()
        .map(|h| h.to_string())
        .collect();
        doc.render_table("data-table", headers, metrics, |m| {
            Ok(TableRow::new(vec![
                Cell::new(m.month.clone()),
                Cell::new(format_number(m.total_km, 0)),
                Cell::new(format_number(m.longhaul_km, 0)),
                Cell::new(format_number(m.local_km, 0)),
                Cell::new(format_number(m.accidents, 0)),
                Cell::new(format_number(m.speeding_occurrences, 0)),
                Cell::new(format_number(m.shift_hours, 0)),
                Cell::new(format_number(stats::rate_per_100k(m.accidents, m.total_km), 2)),
            ]))
        });
    }
}

/// Monthly CO2 report comparing two full years.
pub struct ReportsPage {
    baseline_year: String,
    current_year: String,
    baseline: Vec<f64>,
    current: Vec<f64>,
}

impl ReportsPage {
    /// Series are cut to one value per month; anything past December is dropped.
    pub fn new(baseline_year: &str, baseline: &[f64], current_year: &str, current: &[f64]) -> Self {
        let months = MONTHS.len();
        for (year, series) in [(baseline_year, baseline), (current_year, current)] {
            if series.len() > months {
                debug!(year, dropped = series.len() - months, "report values past December");
            }
        }
        Self {
            baseline_year: baseline_year.to_string(),
            current_year: current_year.to_string(),
            baseline: baseline.iter().take(months).copied().collect(),
            current: current.iter().take(months).copied().collect(),
        }
    }
}

impl PageController for ReportsPage {
    fn file_name(&self) -> &'static str {
        "reports.html"
    }

    fn document(&self) -> Document {
        Document::new(
            "CO2 Report",
            true,
            vec![
                Block::stat("baseline-total", &format!("{} total [kg]", self.baseline_year)),
                Block::stat("stat-total", &format!("{} total [kg]", self.current_year)),
                Block::stat("stat-change", "Change"),
                Block::stat("stat-peak", "Peak month"),
                Block::stat("stat-best", "Best month"),
                Block::chart("myChart"),
            ],
        )
    }

    fn init(&mut self, doc: &mut Document) {
        let labels = month_labels();
        if let Some(canvas) = doc.chart_mut("myChart") {
            canvas.init(
                ChartSpec::new(ChartKind::Line, labels.clone(), "Sum of CO2 emission [kg]")
                    .series(SeriesSpec::new(
                        self.baseline_year.clone(),
                        &self.baseline,
                        BASELINE_COLOR,
                    ))
                    .series(SeriesSpec::new(
                        self.current_year.clone(),
                        &self.current,
                        CURRENT_COLOR,
                    )),
            );
        }

        let change = Comparison::between(stats::sum(&self.baseline), stats::sum(&self.current));
        let extremes = stats::extremes(&self.current, &labels);
        doc.bind([
            ("baseline-total", format_number(change.baseline, 0)),
            ("stat-total", format_number(change.current, 0)),
            (
                "stat-peak",
                format!("{} - {} kg", extremes.max.label, format_number(extremes.max.value, 0)),
            ),
            (
                "stat-best",
                format!("{} - {} kg", extremes.min.label, format_number(extremes.min.value, 0)),
            ),
        ]);
        bind_change(doc, "stat-change", &change);
    }
}

fn kilometer_pivot(text: &str) -> crate::error::Result<Option<KilometerPivot>> {
    let table = parse_csv(text)?;
    pivot_year_months(&table).map(Some).ok_or(DashboardError::Empty)
}

/// Loads every data source and builds the page controllers.
///
/// `login_digest` is the credential hash embedded in the login view.
pub async fn load_pages(
    client: &Client,
    settings: &Settings,
    login_digest: Option<String>,
) -> Vec<Box<dyn PageController>> {
    let vehicles = load_or_fallback(
        client,
        &settings.fleet,
        settings.timeout,
        vehicles_from_csv,
        samples::fallback_vehicles,
    )
    .await;
    let kilometers = load_or_fallback(
        client,
        &settings.kilometers,
        settings.timeout,
        kilometer_pivot,
        || None,
    )
    .await;
    let operations = load_or_fallback(
        client,
        &settings.operations,
        settings.timeout,
        monthly_metrics_from_csv,
        samples::fallback_operations,
    )
    .await;

    let mut pages: Vec<Box<dyn PageController>> = vec![
        Box::new(LoginPage::new(login_digest)),
        Box::new(HomePage),
        Box::new(EmissionsPage::new(
            samples::emission_series(),
            &settings.baseline_year,
            &settings.current_year,
            kilometers.data,
            &settings.kilometers.describe(),
        )),
        Box::new(FleetInventoryPage::new(vehicles)),
        Box::new(OperationsPage::new(operations)),
        Box::new(ReportsPage::new(
            "2023",
            &samples::REPORT_2023,
            "2024",
            &samples::REPORT_2024,
        )),
    ];
    for kind in IncidentKind::ALL {
        pages.push(Box::new(IncidentPage::new(kind)));
    }
    pages
}

#[cfg(test)]
impl FleetInventoryPage {
    pub fn summary(&self) -> FleetSummary {
        self.summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Origin;

    fn live<T>(data: T) -> Loaded<T> {
        Loaded {
            data,
            origin: Origin::Live,
        }
    }

    fn pivot() -> KilometerPivot {
        let table = parse_csv("Year,January,February\n2024,100,100\n2025,150,130").unwrap();
        pivot_year_months(&table).unwrap()
    }

    #[test]
    fn mileage_thresholds() {
        assert_eq!(classify_mileage(3584.0), VehicleStatus::Active);
        assert_eq!(classify_mileage(1_000_000.0), VehicleStatus::Active);
        assert_eq!(classify_mileage(1_040_478.0), VehicleStatus::Monitor);
        assert_eq!(classify_mileage(1_200_001.0), VehicleStatus::HighMileage);
    }

    #[test]
    fn mileage_formatting() {
        assert_eq!(format_mileage(""), "N/A");
        assert_eq!(format_mileage("N/A"), "N/A");
        assert_eq!(format_mileage("unknown"), "unknown");
        assert_eq!(format_mileage("1130625"), "1\u{a0}130\u{a0}625 km");
    }

    #[test]
    fn emissions_page_binds_year_on_year_stats() {
        let series = BTreeMap::from([
            ("2024".to_string(), vec![100.0, 100.0]),
            ("2025".to_string(), vec![90.0, 150.0]),
        ]);
        let mut page = EmissionsPage::new(series, "2024", "2025", Some(pivot()), "data/KMS1.csv");
        let mut doc = page.document();
        page.init(&mut doc);

        assert_eq!(doc.text("stat-total"), Some("240 kg"));
        assert_eq!(doc.text("stat-change"), Some("+20% YoY"));
        assert!(doc.element("stat-change").unwrap().classes.contains("negative"));
        assert_eq!(doc.text("stat-peak"), Some("February - 150 kg"));
        assert_eq!(doc.text("stat-best"), Some("January - 90 kg"));
        assert_eq!(doc.text("stat-kms"), Some("280 km"));
        assert_eq!(doc.text("stat-kms-delta"), Some("+80 km (40% vs 2024)"));
        // 240/280 against 200/200
        assert_eq!(doc.text("stat-intensity"), Some("0,86 kg/km"));
        assert_eq!(doc.text("stat-intensity-delta"), Some("-14,3% vs 2024"));
        assert_eq!(doc.table("data-table").unwrap().table().headers.len(), 4);
        assert!(doc.chart("myChart").unwrap().is_live());

        page.teardown(&mut doc);
        assert!(!doc.chart("myChart").unwrap().is_live());
    }

    #[test]
    fn emissions_page_without_kilometers_shows_na() {
        let series = samples::emission_series();
        let mut page = EmissionsPage::new(series, "2024", "2025", None, "data/KMS1.csv");
        let mut doc = page.document();
        page.init(&mut doc);
        assert_eq!(doc.text("stat-kms"), Some("N/A"));
        assert_eq!(doc.text("stat-kms-delta"), Some("Fleet data unavailable"));
        assert_eq!(doc.text("stat-intensity"), Some(""));
    }

    #[test]
    fn emissions_page_links_the_kilometer_csv() {
        let href = "https://example.com/KMS1.csv";
        let mut page = EmissionsPage::new(samples::emission_series(), "2024", "2025", None, href);
        let html = render(&mut page);
        let link = "<a href=\"https://example.com/KMS1.csv\">Download kilometer CSV</a>";
        assert!(html.contains(link));
    }

    #[test]
    fn report_page_trims_series_to_twelve_months() {
        let mut page = ReportsPage::new(
            "2023",
            &samples::REPORT_2023,
            "2024",
            &samples::REPORT_2024,
        );
        assert_eq!(page.current.len(), 12);
        let mut doc = page.document();
        page.init(&mut doc);

        assert_eq!(doc.text("baseline-total"), Some("12\u{a0}781\u{a0}404"));
        assert_eq!(doc.text("stat-total"), Some("9\u{a0}952\u{a0}794"));
        assert_eq!(doc.text("stat-change"), Some("-22,1% YoY"));
        assert!(doc.element("stat-change").unwrap().classes.contains("positive"));
        assert_eq!(doc.text("stat-peak"), Some("October - 1\u{a0}310\u{a0}736 kg"));
        assert_eq!(doc.text("stat-best"), Some("September - 576\u{a0}067 kg"));

        let config = doc.chart("myChart").unwrap().config().unwrap();
        assert_eq!(config["data"]["datasets"][1]["data"].as_array().unwrap().len(), 12);
        assert_eq!(config["options"]["scales"]["x"]["title"]["text"], "Month");
    }

    #[test]
    fn login_page_is_public_and_embeds_digest() {
        let digest = crate::session::credential_digest("ops@example.com", "s3cret");
        let mut page = LoginPage::new(Some(digest.clone()));
        assert_eq!(page.file_name(), "index.html");
        assert!(!page.document().requires_auth);
        let html = render(&mut page);
        assert!(html.contains(&format!("data-credential=\"{digest}\"")));
        assert!(html.contains("kdgAuthSession"));
    }

    #[test]
    fn protected_pages_carry_gate_and_sign_out() {
        let html = render(&mut HomePage);
        assert!(html.contains("data-requires-auth=\"true\""));
        assert!(html.contains("data-auth-key=\"kdgAuthSession\""));
        assert!(html.contains("<a href=\"index.html\" data-signout>Sign out</a>"));
        assert!(html.contains("reports.html"));
    }

    #[tokio::test]
    async fn load_pages_builds_every_page_once() {
        let dir = tempfile::tempdir().unwrap();
        let missing = |name: &str| dir.path().join(name).display().to_string();
        let args = crate::config::DataArgs {
            fleet_csv: missing("fleet.csv"),
            kms_csv: missing("KMS1.csv"),
            operations_csv: missing("operations.csv"),
            timeout_secs: 1,
            baseline_year: "2024".to_string(),
            current_year: "2025".to_string(),
        };
        let pages = load_pages(&Client::new(), &Settings::from(&args), None).await;
        let names: Vec<&str> = pages.iter().map(|p| p.file_name()).collect();
        assert_eq!(
            names,
            vec![
                "index.html",
                "home.html",
                "emissions.html",
                "fleet.html",
                "operations.html",
                "reports.html",
                "accidents.html",
                "blowouts.html",
                "spills.html",
            ]
        );
    }

    #[test]
    fn fleet_page_counts_and_skips_bad_cards() {
        let mut vehicles = samples::fallback_vehicles();
        vehicles.push(VehicleRecord {
            fleet_number: "F199".to_string(),
            horse_reg: String::new(),
            horse_make: String::new(),
            trailer_reg: String::new(),
            trailer_make: String::new(),
            current_mileage: "1 250 000".to_string(),
            image_filename: "../secret.jpg".to_string(),
        });
        let mut page = FleetInventoryPage::new(live(vehicles));
        let mut doc = page.document();
        page.init(&mut doc);

        assert!(doc.element("cards-loading").is_none());
        assert_eq!(doc.element("cards-container").unwrap().children.len(), 4);
        assert_eq!(
            page.summary(),
            FleetSummary {
                total: 5,
                active: 4,
                upcoming_coc: 1
            }
        );
        assert_eq!(doc.text("total-vehicles"), Some("5"));
        assert_eq!(doc.text("data-source"), Some(""));
    }

    #[test]
    fn fleet_table_filters_by_fleet_number() {
        let mut page = FleetInventoryPage::new(Loaded {
            data: samples::fallback_vehicles(),
            origin: Origin::Fallback,
        });
        let mut doc = page.document();
        page.init(&mut doc);
        assert!(!doc.text("data-source").unwrap_or_default().is_empty());

        let table = doc.table_mut("data-table").unwrap();
        assert_eq!(table.set_query("f150"), 1);
        let visible: Vec<String> = table.visible_rows().map(|r| r.cells[0].text.clone()).collect();
        assert_eq!(visible, vec!["F150"]);
    }

    #[test]
    fn empty_fleet_shows_placeholder() {
        let mut page = FleetInventoryPage::new(live(Vec::new()));
        let mut doc = page.document();
        page.init(&mut doc);
        let children = &doc.element("cards-container").unwrap().children;
        assert_eq!(children.len(), 1);
        assert!(children[0].contains("No fleet data available."));
        assert_eq!(doc.text("total-vehicles"), Some("0"));
    }

    #[test]
    fn incident_page_compares_years() {
        let mut page = IncidentPage::new(IncidentKind::Accidents);
        let mut doc = page.document();
        page.init(&mut doc);
        assert_eq!(doc.text("baseline-total"), Some("53"));
        assert_eq!(doc.text("stat-total"), Some("31"));
        assert_eq!(doc.text("stat-change"), Some("-41,5% YoY"));
        assert!(doc.element("stat-change").unwrap().classes.contains("positive"));
        assert_eq!(doc.text("stat-peak"), Some("February - 5"));
        assert_eq!(doc.text("stat-best"), Some("May - 0"));
    }

    #[test]
    fn operations_page_reports_rates() {
        let mut page = OperationsPage::new(live(samples::fallback_operations()));
        let mut doc = page.document();
        page.init(&mut doc);
        assert_eq!(doc.text("ops-months"), Some("3"));
        assert_eq!(doc.text("ops-accidents"), Some("9"));
        assert_eq!(doc.text("ops-total-km"), Some("1\u{a0}203\u{a0}000 km"));
        assert_eq!(doc.text("ops-busiest"), Some("March - 424\u{a0}200 km"));
        assert_eq!(doc.table("data-table").unwrap().table().rows.len(), 3);
        let html = doc.to_html();
        assert!(html.contains("new Chart(document.getElementById(\"myChart\")"));
    }

    #[test]
    fn month_labels_from_csv_stay_inside_chart_script() {
        let csv = "Month,TotalKm\n</script><script>alert(1)</script>,100";
        let data = monthly_metrics_from_csv(csv).unwrap();
        let html = render(&mut OperationsPage::new(live(data)));
        assert!(!html.contains("</script><script>alert(1)</script>"));
        assert!(html.contains("&lt;/script&gt;&lt;script&gt;alert(1)"));
    }

    #[test]
    fn rendering_tears_down_charts() {
        let mut page = IncidentPage::new(IncidentKind::Spills);
        let html = render(&mut page);
        assert!(html.contains("<canvas id=\"myChart\">"));
        assert!(html.contains("Spills per month"));
    }
}
