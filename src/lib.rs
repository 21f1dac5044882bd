//! Cleaning and anomaly classification for IGAC property-transaction exports.
//!
//! A `;`-delimited export is read ([`source`]), its columns renamed to
//! canonical names ([`normalize`]), dates, coordinates and declared values
//! parsed ([`parse`]), each record checked against three risk rules
//! ([`classify`]) and the flagged subset extracted ([`extract`]).
//! [`pipeline`] runs the whole chain and [`cache`] memoizes it per input.

pub mod cache;
pub mod classify;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod extract;
pub mod logging;
pub mod model;
pub mod normalize;
pub mod parse;
pub mod pipeline;
pub mod schema;
pub mod source;

#[cfg(feature = "python")]
mod python;

pub use cache::DatasetCache;
pub use config::{ColumnMapping, PipelineConfig};
pub use dashboard::{AnomalyFilter, DashboardReport};
pub use error::{IgacError, Result};
pub use extract::AnomalySubset;
pub use model::{AnomalyType, ClassifiedDataset, Transaction};
pub use pipeline::{load_and_process, process_source};

#[cfg(feature = "python")]
use pyo3::prelude::*;
#[cfg(feature = "python")]
use pyo3::types::PyModule;

/// Export schema constants as Python submodules
#[cfg(feature = "python")]
fn add_schema_exports(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Transaction
    let transaction = PyModule::new(m.py(), "transaction")?;
    transaction.add("TRANSACTION_DATE", schema::transaction::TRANSACTION_DATE)?;
    transaction.add("MUNICIPALITY_NAME", schema::transaction::MUNICIPALITY_NAME)?;
    transaction.add("DEPARTMENT_NAME", schema::transaction::DEPARTMENT_NAME)?;
    transaction.add(
        "HAS_DECLARED_VALUE_FLAG",
        schema::transaction::HAS_DECLARED_VALUE_FLAG,
    )?;
    transaction.add("PROPERTY_ZONE_TYPE", schema::transaction::PROPERTY_ZONE_TYPE)?;
    transaction.add("DECLARED_VALUE", schema::transaction::DECLARED_VALUE)?;
    transaction.add("LATITUDE", schema::transaction::LATITUDE)?;
    transaction.add("LONGITUDE", schema::transaction::LONGITUDE)?;
    m.add_submodule(&transaction)?;

    // Anomaly
    let anomaly = PyModule::new(m.py(), "anomaly")?;
    anomaly.add("IS_ANOMALY", schema::anomaly::IS_ANOMALY)?;
    anomaly.add("ANOMALY_TYPE", schema::anomaly::ANOMALY_TYPE)?;
    m.add_submodule(&anomaly)?;

    // Labels
    let label = PyModule::new(m.py(), "label")?;
    label.add("NORMAL", schema::label::NORMAL)?;
    label.add(
        "MISSING_DECLARED_VALUE",
        schema::label::MISSING_DECLARED_VALUE,
    )?;
    label.add("ZERO_OR_NULL_VALUE", schema::label::ZERO_OR_NULL_VALUE)?;
    label.add("HIGH_RURAL_VALUE", schema::label::HIGH_RURAL_VALUE)?;
    m.add_submodule(&label)?;

    // Default source mapping
    let mapping: std::collections::HashMap<&str, &str> =
        schema::DEFAULT_COLUMN_MAPPING.into_iter().collect();
    m.add("DEFAULT_COLUMN_MAPPING", mapping)?;

    Ok(())
}

#[cfg(feature = "python")]
#[pymodule]
fn igac_anomalies(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<python::AnomalyModel>()?;
    m.add_function(wrap_pyfunction!(python::load_and_process_data, m)?)?;
    add_schema_exports(m)?;
    Ok(())
}
