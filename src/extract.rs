use polars::prelude::*;
use tracing::{info, warn};

use crate::error::Result;
use crate::schema::anomaly;

pub const NO_ANOMALIES_WARNING: &str = "No anomalies detected";

/// The flagged records of a classified frame, in their original order.
#[derive(Debug, Clone)]
pub struct AnomalySubset {
    frame: DataFrame,
}

impl AnomalySubset {
    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn len(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    /// Non-fatal warning for the presentation layer; rendering should stop
    /// when this is `Some`.
    pub fn warning(&self) -> Option<&'static str> {
        self.is_empty().then_some(NO_ANOMALIES_WARNING)
    }
}

/// Keep the rows with `es_anomalia == true`.
pub fn extract_anomalies(classified: &DataFrame) -> Result<AnomalySubset> {
    let frame = classified
        .clone()
        .lazy()
        .filter(col(anomaly::IS_ANOMALY))
        .collect()?;

    let subset = AnomalySubset { frame };
    match subset.warning() {
        Some(message) => warn!("{message}"),
        None => info!(anomalies = subset.len(), "Anomalies detected"),
    }
    Ok(subset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_flagged_rows_in_order() {
        let df = df!(
            "id" => ["a", "b", "c", "d"],
            anomaly::IS_ANOMALY => [true, false, true, true]
        )
        .unwrap();
        let subset = extract_anomalies(&df).unwrap();

        assert_eq!(subset.len(), 3);
        assert_eq!(subset.warning(), None);
        let ids: Vec<_> = subset
            .frame()
            .column("id")
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(ids, vec!["a", "c", "d"]);
    }

    #[test]
    fn empty_subset_is_a_warning_not_an_error() {
        let df = df!(
            "id" => ["a"],
            anomaly::IS_ANOMALY => [false]
        )
        .unwrap();
        let subset = extract_anomalies(&df).unwrap();

        assert!(subset.is_empty());
        assert_eq!(subset.warning(), Some(NO_ANOMALIES_WARNING));
    }
}
