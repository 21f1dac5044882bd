use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::schema::{DEFAULT_COLUMN_MAPPING, DEFAULT_DATA_FILE};

/// Source column name → canonical column name.
///
/// Kept sorted so that iteration order (and therefore cache keys) does not
/// depend on how the mapping was built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnMapping(BTreeMap<String, String>);

impl ColumnMapping {
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn get(&self, source: &str) -> Option<&str> {
        self.0.get(source).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self::new(DEFAULT_COLUMN_MAPPING)
    }
}

/// Runtime configuration for a pipeline run.
///
/// Every field has a default, so a TOML file only needs the keys it overrides:
///
/// ```toml
/// data_file = "exports/2024.csv"
///
/// [column_mapping]
/// FECHA = "fecha_transaccion"
/// VALOR = "valor_declarado"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data_file: PathBuf,
    pub column_mapping: ColumnMapping,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from(DEFAULT_DATA_FILE),
            column_mapping: ColumnMapping::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::transaction;

    #[test]
    fn default_mapping_covers_igac_export() {
        let mapping = ColumnMapping::default();
        assert_eq!(mapping.len(), 8);
        assert_eq!(
            mapping.get("FECHA_RADICA_TEXTO"),
            Some(transaction::TRANSACTION_DATE)
        );
        assert_eq!(mapping.get("VALOR"), Some(transaction::DECLARED_VALUE));
        assert_eq!(mapping.get("NOT_A_COLUMN"), None);
    }

    #[test]
    fn toml_overrides_only_given_keys() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [column_mapping]
            FECHA = "fecha_transaccion"
            "#,
        )
        .unwrap();

        assert_eq!(config.data_file, PathBuf::from(DEFAULT_DATA_FILE));
        assert_eq!(config.column_mapping.len(), 1);
        assert_eq!(
            config.column_mapping.get("FECHA"),
            Some(transaction::TRANSACTION_DATE)
        );
    }

    #[test]
    fn empty_toml_is_default() {
        let config = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn malformed_toml_is_config_error() {
        let err = PipelineConfig::from_toml_str("data_file = [").unwrap_err();
        assert!(matches!(err, crate::error::IgacError::Config(_)));
    }
}
