//! Data behind the anomaly dashboard: filters, metrics, chart series, map
//! points and the detail table. Rendering is left to the caller.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use serde::Serialize;

use crate::error::Result;
use crate::model::{frame_to_transactions, AnomalyType, ClassifiedDataset, Transaction};
use crate::schema::{anomaly, transaction};

pub const DEFAULT_TOP_MUNICIPALITIES: usize = 10;

pub const NO_FILTERED_DATA_WARNING: &str = "No records match the selected filters";

const MISSING_TEXT: &str = "N/D";

// ── Filtering ───────────────────────────────────────────────────────────────

/// Sidebar filters. Empty whitelists mean "everything".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnomalyFilter {
    /// Inclusive on both ends.
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    pub anomaly_types: Vec<AnomalyType>,
    pub municipalities: Vec<String>,
}

impl AnomalyFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_date_range(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.date_range = Some((start, end));
        self
    }

    pub fn with_anomaly_types(mut self, types: impl IntoIterator<Item = AnomalyType>) -> Self {
        self.anomaly_types = types.into_iter().collect();
        self
    }

    pub fn with_municipalities<S: Into<String>>(
        mut self,
        municipalities: impl IntoIterator<Item = S>,
    ) -> Self {
        self.municipalities = municipalities.into_iter().map(Into::into).collect();
        self
    }

    pub fn matches(&self, t: &Transaction) -> bool {
        let in_range = self
            .date_range
            .map_or(true, |(start, end)| {
                t.transaction_date >= start && t.transaction_date <= end
            });
        let type_ok =
            self.anomaly_types.is_empty() || self.anomaly_types.contains(&t.anomaly_type);
        let municipality_ok = self.municipalities.is_empty()
            || t
                .municipality_name
                .as_ref()
                .is_some_and(|m| self.municipalities.contains(m));
        in_range && type_ok && municipality_ok
    }

    pub fn apply(&self, transactions: &[Transaction]) -> Vec<Transaction> {
        transactions
            .iter()
            .filter(|t| self.matches(t))
            .cloned()
            .collect()
    }

    /// Filter a classified frame, preserving row order.
    pub fn apply_frame(&self, df: &DataFrame) -> Result<DataFrame> {
        let mask: Vec<bool> = frame_to_transactions(df)?
            .iter()
            .map(|t| self.matches(t))
            .collect();
        let mask = BooleanChunked::from_slice("mask".into(), &mask);
        Ok(df.filter(&mask)?)
    }
}

// ── Selector options ────────────────────────────────────────────────────────

/// Distinct anomaly types, sorted by label.
pub fn distinct_anomaly_types(transactions: &[Transaction]) -> Vec<AnomalyType> {
    let mut types: Vec<AnomalyType> = transactions
        .iter()
        .map(|t| t.anomaly_type)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    types.sort_by_key(|t| t.label());
    types
}

/// Distinct non-missing municipality names, sorted.
pub fn distinct_municipalities(transactions: &[Transaction]) -> Vec<String> {
    transactions
        .iter()
        .filter_map(|t| t.municipality_name.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

// ── Metrics ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total_alerts: usize,
    pub municipalities: usize,
    /// Sum of declared values, missing values skipped.
    pub total_value: f64,
}

pub fn summarize(transactions: &[Transaction]) -> Summary {
    Summary {
        total_alerts: transactions.len(),
        municipalities: distinct_municipalities(transactions).len(),
        total_value: transactions.iter().filter_map(|t| t.declared_value).sum(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeCount {
    pub anomaly_type: AnomalyType,
    pub count: usize,
}

/// Records per anomaly type (pie chart), ordered by label.
pub fn counts_by_type(transactions: &[Transaction]) -> Vec<TypeCount> {
    let mut counts: HashMap<AnomalyType, usize> = HashMap::new();
    for t in transactions {
        *counts.entry(t.anomaly_type).or_default() += 1;
    }
    distinct_anomaly_types(transactions)
        .into_iter()
        .map(|anomaly_type| TypeCount {
            anomaly_type,
            count: counts[&anomaly_type],
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MunicipalityCount {
    pub municipality: String,
    pub count: usize,
}

/// The `n` municipalities with the most records (bar chart).
/// Ties are broken by name; records without a municipality are not counted.
pub fn top_municipalities(transactions: &[Transaction], n: usize) -> Vec<MunicipalityCount> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for name in transactions.iter().filter_map(|t| t.municipality_name.as_deref()) {
        *counts.entry(name).or_default() += 1;
    }
    let mut ranked: Vec<MunicipalityCount> = counts
        .into_iter()
        .map(|(municipality, count)| MunicipalityCount {
            municipality: municipality.to_string(),
            count,
        })
        .collect();
    // Stable sort keeps the alphabetical order from the BTreeMap among ties.
    ranked.sort_by(|a, b| b.count.cmp(&a.count));
    ranked.truncate(n);
    ranked
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyCount {
    /// Last day of the month.
    pub month_end: NaiveDate,
    pub count: usize,
}

/// Records per calendar month (timeline), zero-filled between the first
/// and last month present.
pub fn monthly_counts(transactions: &[Transaction]) -> Vec<MonthlyCount> {
    let mut counts: BTreeMap<(i32, u32), usize> = BTreeMap::new();
    for t in transactions {
        let d = t.transaction_date;
        *counts.entry((d.year(), d.month())).or_default() += 1;
    }
    let (Some(&first), Some(&last)) = (counts.keys().next(), counts.keys().next_back()) else {
        return Vec::new();
    };

    let mut series = Vec::new();
    let mut month = first;
    while month <= last {
        if let Some(end) = month_end(month) {
            series.push(MonthlyCount {
                month_end: end,
                count: counts.get(&month).copied().unwrap_or(0),
            });
        }
        month = next_month(month);
    }
    series
}

fn next_month((year, month): (i32, u32)) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

fn month_end(month: (i32, u32)) -> Option<NaiveDate> {
    let (year, next) = next_month(month);
    NaiveDate::from_ymd_opt(year, next, 1)?.pred_opt()
}

// ── Tooltips and map ────────────────────────────────────────────────────────

/// Format with `,` thousands separators and no decimals (`1,234,568`).
pub fn format_thousands(value: f64) -> String {
    let rounded = format!("{:.0}", value.abs());
    let mut grouped = String::with_capacity(rounded.len() + rounded.len() / 3);
    for (i, c) in rounded.chars().enumerate() {
        if i > 0 && (rounded.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if value < 0.0 && rounded != "0" {
        grouped.insert(0, '-');
    }
    grouped
}

/// Hover text for one record: type, municipality, date, value.
pub fn tooltip(t: &Transaction) -> String {
    format!(
        "Tipo: {}\nMunicipio: {}\nFecha: {}\nValor: {}",
        t.anomaly_type,
        t.municipality_name.as_deref().unwrap_or(MISSING_TEXT),
        t.transaction_date,
        t.declared_value
            .map_or_else(|| MISSING_TEXT.to_string(), format_thousands),
    )
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub tooltip: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapView {
    pub center_latitude: f64,
    pub center_longitude: f64,
    pub points: Vec<MapPoint>,
}

/// Map markers centered on the mean position; `None` without coordinates.
pub fn map_view(transactions: &[Transaction]) -> Option<MapView> {
    let points: Vec<MapPoint> = transactions
        .iter()
        .filter_map(|t| {
            Some(MapPoint {
                latitude: t.latitude?,
                longitude: t.longitude?,
                tooltip: tooltip(t),
            })
        })
        .collect();
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    Some(MapView {
        center_latitude: points.iter().map(|p| p.latitude).sum::<f64>() / n,
        center_longitude: points.iter().map(|p| p.longitude).sum::<f64>() / n,
        points,
    })
}

// ── Detail table ────────────────────────────────────────────────────────────

pub const DETAIL_COLUMNS: [&str; 5] = [
    transaction::TRANSACTION_DATE,
    transaction::DEPARTMENT_NAME,
    transaction::MUNICIPALITY_NAME,
    anomaly::ANOMALY_TYPE,
    transaction::DECLARED_VALUE,
];

/// Project a classified frame to the detail-table columns it has.
pub fn detail_table(df: &DataFrame) -> Result<DataFrame> {
    let columns: Vec<Expr> = DETAIL_COLUMNS
        .iter()
        .filter(|name| df.column(**name).is_ok())
        .map(|name| col(*name))
        .collect();
    Ok(df.clone().lazy().select(columns).collect()?)
}

// ── Report ──────────────────────────────────────────────────────────────────

/// Everything a dashboard shell needs for one filter selection.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardReport {
    pub total_records: usize,
    pub total_anomalies: usize,
    pub date_bounds: Option<(NaiveDate, NaiveDate)>,
    pub available_anomaly_types: Vec<AnomalyType>,
    pub available_municipalities: Vec<String>,
    pub filtered: Vec<Transaction>,
    pub summary: Summary,
    pub by_type: Vec<TypeCount>,
    pub top_municipalities: Vec<MunicipalityCount>,
    pub monthly: Vec<MonthlyCount>,
    pub map: Option<MapView>,
    pub warning: Option<String>,
}

impl DashboardReport {
    pub fn build(dataset: &ClassifiedDataset, filter: &AnomalyFilter, top_n: usize) -> Result<Self> {
        let anomalies = dataset.anomaly_transactions()?;
        let filtered = filter.apply(&anomalies);

        let warning = if anomalies.is_empty() {
            dataset.anomalies().warning().map(str::to_string)
        } else if filtered.is_empty() {
            Some(NO_FILTERED_DATA_WARNING.to_string())
        } else {
            None
        };

        Ok(Self {
            total_records: dataset.all().height(),
            total_anomalies: anomalies.len(),
            date_bounds: dataset.date_bounds()?,
            available_anomaly_types: distinct_anomaly_types(&anomalies),
            available_municipalities: distinct_municipalities(&anomalies),
            summary: summarize(&filtered),
            by_type: counts_by_type(&filtered),
            top_municipalities: top_municipalities(&filtered, top_n),
            monthly: monthly_counts(&filtered),
            map: map_view(&filtered),
            filtered,
            warning,
        })
    }
}
