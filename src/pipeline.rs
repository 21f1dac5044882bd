//! normalize → parse → classify → extract, over one input file.

use std::path::Path;

use tracing::info;

use crate::classify::classify_anomalies;
use crate::config::ColumnMapping;
use crate::error::Result;
use crate::extract::extract_anomalies;
use crate::model::ClassifiedDataset;
use crate::normalize::normalize_columns;
use crate::parse::parse_fields;
use crate::source::SourceFile;

/// Read `path` and run the full pipeline on it.
pub fn load_and_process(path: impl AsRef<Path>, mapping: &ColumnMapping) -> Result<ClassifiedDataset> {
    let source = SourceFile::read(path)?;
    process_source(&source, mapping)
}

/// Run the full pipeline on an already-read source file.
pub fn process_source(source: &SourceFile, mapping: &ColumnMapping) -> Result<ClassifiedDataset> {
    info!(path = %source.path().display(), "Loading and processing data");

    let raw = source.to_frame()?;
    let normalized = normalize_columns(raw, mapping)?;
    let parsed = parse_fields(normalized)?;
    let classification = classify_anomalies(parsed)?;
    let anomalies = extract_anomalies(&classification.frame)?;

    Ok(ClassifiedDataset::new(
        source.path().to_path_buf(),
        classification.frame,
        anomalies,
        classification.rural_threshold,
    ))
}
