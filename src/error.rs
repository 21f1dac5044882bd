use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IgacError {
    #[error("Data file not found: '{}'", .0.display())]
    FileNotFound(PathBuf),

    #[error("Data file is empty: '{}'", .0.display())]
    EmptyFile(PathBuf),

    #[error("No date column found (expected '{0}' after column mapping)")]
    MissingDateColumn(String),

    #[error("Data not loaded: {0}")]
    NotLoaded(String),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("InvalidData: {0}")]
    InvalidData(String),
}

pub type Result<T> = std::result::Result<T, IgacError>;

impl IgacError {
    /// Load-time failures that halt processing before any dataset exists.
    pub fn is_fatal_load_error(&self) -> bool {
        matches!(
            self,
            IgacError::FileNotFound(_) | IgacError::EmptyFile(_) | IgacError::MissingDateColumn(_)
        )
    }
}

#[cfg(feature = "python")]
impl From<IgacError> for pyo3::PyErr {
    fn from(err: IgacError) -> pyo3::PyErr {
        pyo3::exceptions::PyRuntimeError::new_err(err.to_string())
    }
}
