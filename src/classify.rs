//! Rule-based anomaly classification.
//!
//! Each rule is evaluated independently against every record and yields a
//! [`RuleOutcome`]. [`reduce_outcomes`] then ORs the flags and keeps the label
//! of the first rule that matched, in [`AnomalyRule::ORDERED`] order.

use polars::prelude::*;
use tracing::{debug, info};

use crate::error::Result;
use crate::model::AnomalyType;
use crate::schema::{anomaly, transaction};

/// Percentile of rural declared values above which a record is an outlier.
pub const RURAL_OUTLIER_QUANTILE: f64 = 0.95;

/// Indicator values meaning "no declared value", compared lower-cased.
const MISSING_VALUE_MARKERS: [&str; 3] = ["no", "0", "false"];

const RURAL_MARKER: &str = "rural";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnomalyRule {
    MissingDeclaredValue,
    ZeroOrNullValue,
    HighRuralValue,
}

impl AnomalyRule {
    /// Evaluation order; earlier rules win the label.
    pub const ORDERED: [AnomalyRule; 3] = [
        AnomalyRule::MissingDeclaredValue,
        AnomalyRule::ZeroOrNullValue,
        AnomalyRule::HighRuralValue,
    ];

    pub fn anomaly_type(self) -> AnomalyType {
        match self {
            AnomalyRule::MissingDeclaredValue => AnomalyType::MissingDeclaredValue,
            AnomalyRule::ZeroOrNullValue => AnomalyType::ZeroOrNullValue,
            AnomalyRule::HighRuralValue => AnomalyType::HighRuralValue,
        }
    }

    pub fn outcome(self, matched: bool) -> RuleOutcome {
        RuleOutcome {
            matched,
            anomaly_type: self.anomaly_type(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleOutcome {
    pub matched: bool,
    pub anomaly_type: AnomalyType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub is_anomaly: bool,
    pub anomaly_type: AnomalyType,
}

/// Combine per-rule outcomes: any match flags the record, the first match labels it.
pub fn reduce_outcomes(outcomes: &[RuleOutcome]) -> Verdict {
    let first = outcomes.iter().find(|o| o.matched);
    Verdict {
        is_anomaly: first.is_some(),
        anomaly_type: first.map_or(AnomalyType::Normal, |o| o.anomaly_type),
    }
}

/// Classified frame plus the rural threshold used to build it.
#[derive(Debug, Clone)]
pub struct Classification {
    pub frame: DataFrame,
    pub rural_threshold: Option<f64>,
}

/// Per-record rule inputs pulled out of the parsed frame.
struct RuleInputs {
    missing_indicator: Vec<bool>,
    zero_or_null: Vec<bool>,
    rural: Vec<bool>,
    values: Vec<Option<f64>>,
}

impl RuleInputs {
    fn from_frame(df: &DataFrame) -> Result<Self> {
        let n = df.height();

        let values: Vec<Option<f64>> = {
            let column = df
                .column(transaction::DECLARED_VALUE)?
                .cast(&DataType::Float64)?;
            column
                .f64()?
                .into_iter()
                .map(|v| v.filter(|x| !x.is_nan()))
                .collect()
        };
        let zero_or_null = values.iter().map(|v| v.map_or(true, |x| x == 0.0)).collect();

        let missing_indicator = match df.column(transaction::HAS_DECLARED_VALUE_FLAG) {
            Ok(column) => {
                let column = column.cast(&DataType::String)?;
                column
                    .str()?
                    .into_iter()
                    .map(|v| v.is_some_and(is_missing_value_marker))
                    .collect()
            }
            Err(_) => vec![false; n],
        };

        let rural = match df.column(transaction::PROPERTY_ZONE_TYPE) {
            Ok(column) => {
                let column = column.cast(&DataType::String)?;
                column.str()?.into_iter().map(|v| v.is_some_and(is_rural)).collect()
            }
            Err(_) => vec![false; n],
        };

        Ok(Self {
            missing_indicator,
            zero_or_null,
            rural,
            values,
        })
    }
}

pub fn is_missing_value_marker(raw: &str) -> bool {
    let lowered = raw.to_lowercase();
    MISSING_VALUE_MARKERS.contains(&lowered.as_str())
}

pub fn is_rural(zone: &str) -> bool {
    zone.to_lowercase().contains(RURAL_MARKER)
}

/// Linear-interpolated quantile of an ascending slice; `None` when empty.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    match sorted.len() {
        0 => None,
        1 => Some(sorted[0]),
        n => {
            let index = q * (n - 1) as f64;
            let lower = index.floor() as usize;
            let upper = index.ceil() as usize;
            if lower == upper || upper >= n {
                Some(sorted[lower.min(n - 1)])
            } else {
                let fraction = index - lower as f64;
                Some(sorted[lower] * (1.0 - fraction) + sorted[upper] * fraction)
            }
        }
    }
}

/// Outlier threshold over the declared values of rural records.
///
/// `None` when there are no rural records or none of them has a value.
pub fn rural_threshold(values: &[Option<f64>], rural: &[bool]) -> Option<f64> {
    let mut rural_values: Vec<f64> = values
        .iter()
        .zip(rural)
        .filter_map(|(v, is_rural)| if *is_rural { *v } else { None })
        .collect();
    rural_values.sort_by(f64::total_cmp);
    quantile_sorted(&rural_values, RURAL_OUTLIER_QUANTILE)
}

/// Apply the three rules and append `es_anomalia` / `tipo_anomalia`.
///
/// The rural threshold is computed over the whole frame passed in, so callers
/// must pass the full cleaned dataset, never a filtered view.
pub fn classify_anomalies(mut df: DataFrame) -> Result<Classification> {
    let inputs = RuleInputs::from_frame(&df)?;
    let threshold = rural_threshold(&inputs.values, &inputs.rural);
    debug!(?threshold, "Rural outlier threshold");

    let mut flags = Vec::with_capacity(df.height());
    let mut labels = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let high_rural = match (threshold, inputs.values[i]) {
            (Some(t), Some(v)) => inputs.rural[i] && v > t,
            _ => false,
        };
        let outcomes = [
            AnomalyRule::MissingDeclaredValue.outcome(inputs.missing_indicator[i]),
            AnomalyRule::ZeroOrNullValue.outcome(inputs.zero_or_null[i]),
            AnomalyRule::HighRuralValue.outcome(high_rural),
        ];
        let verdict = reduce_outcomes(&outcomes);
        flags.push(verdict.is_anomaly);
        labels.push(verdict.anomaly_type.label());
    }

    for anomaly_type in AnomalyType::ALL {
        let count = labels.iter().filter(|l| **l == anomaly_type.label()).count();
        info!(anomaly_type = anomaly_type.label(), count, "Classified records");
    }

    df.with_column(Series::new(anomaly::IS_ANOMALY.into(), flags))?;
    df.with_column(Series::new(anomaly::ANOMALY_TYPE.into(), labels))?;

    Ok(Classification {
        frame: df,
        rural_threshold: threshold,
    })
}
