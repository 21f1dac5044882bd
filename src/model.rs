use std::fmt;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{IgacError, Result};
use crate::extract::AnomalySubset;
use crate::parse::date_from_days;
use crate::schema::{anomaly, label, transaction};

/// Risk category assigned by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AnomalyType {
    #[serde(rename = "Normal")]
    Normal,
    #[serde(rename = "Sin Valor Declarado")]
    MissingDeclaredValue,
    #[serde(rename = "Valor Cero/Nulo")]
    ZeroOrNullValue,
    #[serde(rename = "Valor Alto en Zona Rural")]
    HighRuralValue,
}

impl AnomalyType {
    pub const ALL: [AnomalyType; 4] = [
        AnomalyType::Normal,
        AnomalyType::MissingDeclaredValue,
        AnomalyType::ZeroOrNullValue,
        AnomalyType::HighRuralValue,
    ];

    pub fn label(self) -> &'static str {
        match self {
            AnomalyType::Normal => label::NORMAL,
            AnomalyType::MissingDeclaredValue => label::MISSING_DECLARED_VALUE,
            AnomalyType::ZeroOrNullValue => label::ZERO_OR_NULL_VALUE,
            AnomalyType::HighRuralValue => label::HIGH_RURAL_VALUE,
        }
    }

    pub fn from_label(text: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.label() == text)
    }

    pub fn is_anomaly(self) -> bool {
        self != AnomalyType::Normal
    }
}

impl fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One cleaned and classified transaction row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    pub transaction_date: NaiveDate,
    pub municipality_name: Option<String>,
    pub department_name: Option<String>,
    pub has_declared_value_flag: Option<String>,
    pub property_zone_type: Option<String>,
    /// `None` when the source value could not be parsed.
    pub declared_value: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub is_anomaly: bool,
    pub anomaly_type: AnomalyType,
}

/// Output of one pipeline run: the full cleaned table and its anomaly subset.
///
/// Never mutated after construction; consumers filter copies.
#[derive(Debug, Clone)]
pub struct ClassifiedDataset {
    source_path: PathBuf,
    all: DataFrame,
    anomalies: AnomalySubset,
    rural_threshold: Option<f64>,
}

impl ClassifiedDataset {
    pub(crate) fn new(
        source_path: PathBuf,
        all: DataFrame,
        anomalies: AnomalySubset,
        rural_threshold: Option<f64>,
    ) -> Self {
        Self {
            source_path,
            all,
            anomalies,
            rural_threshold,
        }
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Every retained record, with `es_anomalia` and `tipo_anomalia` columns.
    pub fn all(&self) -> &DataFrame {
        &self.all
    }

    pub fn anomalies(&self) -> &AnomalySubset {
        &self.anomalies
    }

    /// 95th percentile of rural declared values, if any rural record had a value.
    pub fn rural_threshold(&self) -> Option<f64> {
        self.rural_threshold
    }

    /// True when both coordinate columns survived parsing, i.e. a map can be drawn.
    pub fn has_coordinates(&self) -> bool {
        has_coordinates(&self.all)
    }

    pub fn transactions(&self) -> Result<Vec<Transaction>> {
        frame_to_transactions(&self.all)
    }

    pub fn anomaly_transactions(&self) -> Result<Vec<Transaction>> {
        frame_to_transactions(self.anomalies.frame())
    }

    /// Earliest and latest transaction date over the full dataset.
    pub fn date_bounds(&self) -> Result<Option<(NaiveDate, NaiveDate)>> {
        let days = self
            .all
            .column(transaction::TRANSACTION_DATE)?
            .cast(&DataType::Int32)?;
        let days = days.i32()?;
        let bounds = match (days.min(), days.max()) {
            (Some(min), Some(max)) => date_from_days(min).zip(date_from_days(max)),
            _ => None,
        };
        Ok(bounds)
    }
}

pub(crate) fn has_coordinates(df: &DataFrame) -> bool {
    df.column(transaction::LATITUDE).is_ok() && df.column(transaction::LONGITUDE).is_ok()
}

fn optional_str(df: &DataFrame, name: &str) -> Result<Option<StringChunked>> {
    match df.column(name) {
        Ok(column) => Ok(Some(column.cast(&DataType::String)?.str()?.clone())),
        Err(_) => Ok(None),
    }
}

fn optional_f64(df: &DataFrame, name: &str) -> Result<Option<Float64Chunked>> {
    match df.column(name) {
        Ok(column) => Ok(Some(column.cast(&DataType::Float64)?.f64()?.clone())),
        Err(_) => Ok(None),
    }
}

/// Materialize the rows of a classified frame.
pub fn frame_to_transactions(df: &DataFrame) -> Result<Vec<Transaction>> {
    let dates = df
        .column(transaction::TRANSACTION_DATE)?
        .cast(&DataType::Int32)?;
    let dates = dates.i32()?;
    let flags = df.column(anomaly::IS_ANOMALY)?.bool()?.clone();
    let types = df
        .column(anomaly::ANOMALY_TYPE)?
        .cast(&DataType::String)?;
    let types = types.str()?;

    let municipality = optional_str(df, transaction::MUNICIPALITY_NAME)?;
    let department = optional_str(df, transaction::DEPARTMENT_NAME)?;
    let indicator = optional_str(df, transaction::HAS_DECLARED_VALUE_FLAG)?;
    let zone = optional_str(df, transaction::PROPERTY_ZONE_TYPE)?;
    let value = optional_f64(df, transaction::DECLARED_VALUE)?;
    let latitude = optional_f64(df, transaction::LATITUDE)?;
    let longitude = optional_f64(df, transaction::LONGITUDE)?;

    let text_at = |ca: &Option<StringChunked>, i: usize| {
        ca.as_ref().and_then(|ca| ca.get(i)).map(str::to_string)
    };
    let number_at = |ca: &Option<Float64Chunked>, i: usize| {
        ca.as_ref().and_then(|ca| ca.get(i)).filter(|v| !v.is_nan())
    };

    let mut rows = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let transaction_date = dates
            .get(i)
            .and_then(date_from_days)
            .ok_or_else(|| IgacError::InvalidData(format!("Null transaction date at row {i}")))?;
        let anomaly_type = types
            .get(i)
            .and_then(AnomalyType::from_label)
            .ok_or_else(|| IgacError::InvalidData(format!("Unknown anomaly type at row {i}")))?;

        rows.push(Transaction {
            transaction_date,
            municipality_name: text_at(&municipality, i),
            department_name: text_at(&department, i),
            has_declared_value_flag: text_at(&indicator, i),
            property_zone_type: text_at(&zone, i),
            declared_value: number_at(&value, i),
            latitude: number_at(&latitude, i),
            longitude: number_at(&longitude, i),
            is_anomaly: flags.get(i).unwrap_or(false),
            anomaly_type,
        });
    }
    Ok(rows)
}
