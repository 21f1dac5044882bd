use polars::prelude::*;
use tracing::{debug, warn};

use crate::config::ColumnMapping;
use crate::error::{IgacError, Result};
use crate::schema::transaction;

/// Rename source columns to their canonical names.
///
/// Mapping entries whose source column is absent are ignored. An entry whose
/// canonical name is already taken by a column that is not itself renamed is
/// skipped, so the result never carries duplicate column names.
/// Fails if no date column is present afterwards.
pub fn normalize_columns(df: DataFrame, mapping: &ColumnMapping) -> Result<DataFrame> {
    let present: Vec<String> = df
        .get_column_names_str()
        .iter()
        .map(|c| c.to_string())
        .collect();

    let renamed_sources: Vec<&str> = mapping
        .iter()
        .filter(|(src, _)| present.iter().any(|c| c == src))
        .map(|(src, _)| src)
        .collect();

    let mut old: Vec<&str> = Vec::new();
    let mut new: Vec<&str> = Vec::new();
    for (src, dst) in mapping.iter() {
        if !renamed_sources.contains(&src) || src == dst {
            continue;
        }
        let occupied = present
            .iter()
            .any(|c| c == dst && !renamed_sources.contains(&c.as_str()))
            || new.contains(&dst);
        if occupied {
            warn!(source = src, target = dst, "Column mapping target already exists, skipping");
            continue;
        }
        old.push(src);
        new.push(dst);
    }

    debug!(renamed = old.len(), mapped = mapping.len(), "Normalizing column names");

    let df = if old.is_empty() {
        df
    } else {
        df.lazy().rename(old, new, true).collect()?
    };

    require_date_column(&df)?;
    Ok(df)
}

fn require_date_column(df: &DataFrame) -> Result<()> {
    if df.column(transaction::TRANSACTION_DATE).is_err() {
        return Err(IgacError::MissingDateColumn(
            transaction::TRANSACTION_DATE.to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_frame() -> DataFrame {
        df!(
            "FECHA_RADICA_TEXTO" => ["01/02/2023"],
            "MUNICIPIO" => ["CALI"],
            "EXTRA" => ["x"]
        )
        .unwrap()
    }

    #[test]
    fn renames_present_columns_and_keeps_others() {
        let df = normalize_columns(raw_frame(), &ColumnMapping::default()).unwrap();
        assert_eq!(
            df.get_column_names_str(),
            vec!["fecha_transaccion", "nombre_municipio", "EXTRA"]
        );
    }

    #[test]
    fn missing_optional_columns_are_tolerated() {
        let df = normalize_columns(raw_frame(), &ColumnMapping::default()).unwrap();
        assert!(df.column(transaction::DECLARED_VALUE).is_err());
        assert!(df.column(transaction::LATITUDE).is_err());
    }

    #[test]
    fn missing_date_column_is_fatal() {
        let df = df!("MUNICIPIO" => ["CALI"]).unwrap();
        let err = normalize_columns(df, &ColumnMapping::default()).unwrap_err();
        assert!(matches!(err, IgacError::MissingDateColumn(_)));
    }

    #[test]
    fn already_canonical_date_column_is_accepted() {
        let df = df!("fecha_transaccion" => ["01/02/2023"]).unwrap();
        let df = normalize_columns(df, &ColumnMapping::default()).unwrap();
        assert_eq!(df.width(), 1);
    }

    #[test]
    fn colliding_target_is_skipped() {
        let df = df!(
            "FECHA_RADICA_TEXTO" => ["01/02/2023"],
            "MUNICIPIO" => ["CALI"],
            "nombre_municipio" => ["PALMIRA"]
        )
        .unwrap();
        let df = normalize_columns(df, &ColumnMapping::default()).unwrap();
        assert_eq!(
            df.get_column_names_str(),
            vec!["fecha_transaccion", "MUNICIPIO", "nombre_municipio"]
        );
    }

    #[test]
    fn custom_mapping_is_applied() {
        let df = df!("FECHA" => ["01/02/2023"]).unwrap();
        let mapping = ColumnMapping::new([("FECHA", transaction::TRANSACTION_DATE)]);
        let df = normalize_columns(df, &mapping).unwrap();
        assert!(df.column(transaction::TRANSACTION_DATE).is_ok());
    }
}
