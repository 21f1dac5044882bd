use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3_polars::PyDataFrame;

use crate::cache::DatasetCache;
use crate::config::ColumnMapping;
use crate::dashboard::{self, AnomalyFilter};
use crate::error::IgacError;
use crate::model::{frame_to_transactions, AnomalyType, ClassifiedDataset};
use crate::parse;
use crate::pipeline;
use crate::schema::DEFAULT_DATA_FILE;

/// Python handle on the pipeline, for dashboard shells.
///
/// Loads are memoized per (file contents, mapping), so re-running a
/// Streamlit script does not re-classify an unchanged file.
#[pyclass]
pub struct AnomalyModel {
    base_path: PathBuf,
    cache: DatasetCache,
    current: Option<Arc<ClassifiedDataset>>,
}

#[pymethods]
impl AnomalyModel {
    #[new]
    #[pyo3(signature = (base_path=None))]
    fn new(base_path: Option<String>) -> Self {
        Self {
            base_path: base_path.map(PathBuf::from).unwrap_or_default(),
            cache: DatasetCache::new(),
            current: None,
        }
    }

    // ── Data loading ────────────────────────────────────────────────────────

    /// Load, clean and classify a transaction export.
    ///
    /// `mapping` renames source columns to canonical names; defaults to the
    /// IGAC export layout. Returns `(anomalies_df, all_df)`.
    #[pyo3(signature = (filename=None, mapping=None))]
    fn load(
        &mut self,
        filename: Option<&str>,
        mapping: Option<HashMap<String, String>>,
    ) -> PyResult<(PyDataFrame, PyDataFrame)> {
        let path = self.base_path.join(filename.unwrap_or(DEFAULT_DATA_FILE));
        let mapping = mapping.map(ColumnMapping::new).unwrap_or_default();
        let dataset = self.cache.get_or_load(path, &mapping)?;
        let frames = (
            PyDataFrame(dataset.anomalies().frame().clone()),
            PyDataFrame(dataset.all().clone()),
        );
        self.current = Some(dataset);
        Ok(frames)
    }

    // ── Properties ──────────────────────────────────────────────────────────

    #[getter]
    fn all_df(&self) -> PyResult<PyDataFrame> {
        Ok(PyDataFrame(self.dataset()?.all().clone()))
    }

    #[getter]
    fn anomalies_df(&self) -> PyResult<PyDataFrame> {
        Ok(PyDataFrame(self.dataset()?.anomalies().frame().clone()))
    }

    /// Warning to show instead of the dashboard, if nothing was flagged.
    #[getter]
    fn warning(&self) -> PyResult<Option<&'static str>> {
        Ok(self.dataset()?.anomalies().warning())
    }

    #[getter]
    fn rural_threshold(&self) -> PyResult<Option<f64>> {
        Ok(self.dataset()?.rural_threshold())
    }

    #[getter]
    fn has_coordinates(&self) -> PyResult<bool> {
        Ok(self.dataset()?.has_coordinates())
    }

    // ── Selector options ────────────────────────────────────────────────────

    fn date_bounds(&self) -> PyResult<Option<(NaiveDate, NaiveDate)>> {
        Ok(self.dataset()?.date_bounds()?)
    }

    /// Distinct anomaly labels in `df` (default: the anomaly subset).
    #[pyo3(signature = (df=None))]
    fn anomaly_types(&self, df: Option<PyDataFrame>) -> PyResult<Vec<String>> {
        let rows = self.rows(df)?;
        Ok(dashboard::distinct_anomaly_types(&rows)
            .into_iter()
            .map(|t| t.label().to_string())
            .collect())
    }

    /// Distinct municipality names in `df` (default: the anomaly subset).
    #[pyo3(signature = (df=None))]
    fn municipalities(&self, df: Option<PyDataFrame>) -> PyResult<Vec<String>> {
        let rows = self.rows(df)?;
        Ok(dashboard::distinct_municipalities(&rows))
    }

    // ── Filtering ───────────────────────────────────────────────────────────

    /// Filter the anomaly subset. Date bounds are inclusive; `None` or empty
    /// lists disable a filter.
    #[pyo3(signature = (start=None, end=None, anomaly_types=None, municipalities=None))]
    fn filter_anomalies(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        anomaly_types: Option<Vec<String>>,
        municipalities: Option<Vec<String>>,
    ) -> PyResult<PyDataFrame> {
        let dataset = self.dataset()?;
        let mut filter = AnomalyFilter::new();

        if start.is_some() || end.is_some() {
            let bounds = dataset.date_bounds()?;
            let lower = start.or(bounds.map(|(min, _)| min));
            let upper = end.or(bounds.map(|(_, max)| max));
            if let (Some(lower), Some(upper)) = (lower, upper) {
                filter = filter.with_date_range(lower, upper);
            }
        }
        if let Some(labels) = anomaly_types {
            let types = labels
                .iter()
                .map(|l| {
                    AnomalyType::from_label(l).ok_or_else(|| {
                        PyValueError::new_err(format!("Unknown anomaly type: '{l}'"))
                    })
                })
                .collect::<PyResult<Vec<_>>>()?;
            filter = filter.with_anomaly_types(types);
        }
        if let Some(names) = municipalities {
            filter = filter.with_municipalities(names);
        }

        let df = filter.apply_frame(dataset.anomalies().frame())?;
        Ok(PyDataFrame(df))
    }

    // ── Metrics ─────────────────────────────────────────────────────────────

    /// `(total_alerts, municipalities, total_value)` for a filtered frame.
    fn summary(&self, df: PyDataFrame) -> PyResult<(usize, usize, f64)> {
        let rows = self.rows(Some(df))?;
        let s = dashboard::summarize(&rows);
        Ok((s.total_alerts, s.municipalities, s.total_value))
    }

    /// `[(label, count)]` for the pie chart.
    fn counts_by_type(&self, df: PyDataFrame) -> PyResult<Vec<(String, usize)>> {
        let rows = self.rows(Some(df))?;
        Ok(dashboard::counts_by_type(&rows)
            .into_iter()
            .map(|c| (c.anomaly_type.label().to_string(), c.count))
            .collect())
    }

    /// `[(municipality, count)]` for the bar chart.
    #[pyo3(signature = (df, n=dashboard::DEFAULT_TOP_MUNICIPALITIES))]
    fn top_municipalities(&self, df: PyDataFrame, n: usize) -> PyResult<Vec<(String, usize)>> {
        let rows = self.rows(Some(df))?;
        Ok(dashboard::top_municipalities(&rows, n)
            .into_iter()
            .map(|c| (c.municipality, c.count))
            .collect())
    }

    /// `[(month_end, count)]` for the timeline.
    fn monthly_counts(&self, df: PyDataFrame) -> PyResult<Vec<(NaiveDate, usize)>> {
        let rows = self.rows(Some(df))?;
        Ok(dashboard::monthly_counts(&rows)
            .into_iter()
            .map(|m| (m.month_end, m.count))
            .collect())
    }

    /// One hover text per row of `df`.
    fn tooltips(&self, df: PyDataFrame) -> PyResult<Vec<String>> {
        let rows = self.rows(Some(df))?;
        Ok(rows.iter().map(dashboard::tooltip).collect())
    }

    /// `(center_lat, center_lon, [(lat, lon, tooltip)])`, or `None` without coordinates.
    #[allow(clippy::type_complexity)]
    fn map_points(
        &self,
        df: PyDataFrame,
    ) -> PyResult<Option<(f64, f64, Vec<(f64, f64, String)>)>> {
        let rows = self.rows(Some(df))?;
        Ok(dashboard::map_view(&rows).map(|view| {
            let points = view
                .points
                .into_iter()
                .map(|p| (p.latitude, p.longitude, p.tooltip))
                .collect();
            (view.center_latitude, view.center_longitude, points)
        }))
    }

    #[staticmethod]
    fn detail_table(df: PyDataFrame) -> PyResult<PyDataFrame> {
        Ok(PyDataFrame(dashboard::detail_table(&df.0)?))
    }

    // ── Parse helpers ───────────────────────────────────────────────────────

    #[staticmethod]
    fn parse_declared_value(raw: &str) -> Option<f64> {
        parse::parse_declared_value(raw)
    }

    #[staticmethod]
    fn parse_date(raw: &str) -> Option<NaiveDate> {
        parse::parse_day_first_date(raw)
    }
}

// ── Private helpers ─────────────────────────────────────────────────────────

impl AnomalyModel {
    fn dataset(&self) -> Result<&ClassifiedDataset, IgacError> {
        self.current
            .as_deref()
            .ok_or_else(|| IgacError::NotLoaded("transactions".into()))
    }

    fn rows(&self, df: Option<PyDataFrame>) -> Result<Vec<crate::model::Transaction>, IgacError> {
        match df {
            Some(df) => frame_to_transactions(&df.0),
            None => self.dataset()?.anomaly_transactions(),
        }
    }
}

/// One-shot load without a model object: `(anomalies_df, all_df)`.
#[pyfunction]
#[pyo3(signature = (file_path, col_map=None))]
pub fn load_and_process_data(
    file_path: &str,
    col_map: Option<HashMap<String, String>>,
) -> PyResult<(PyDataFrame, PyDataFrame)> {
    let mapping = col_map.map(ColumnMapping::new).unwrap_or_default();
    let dataset = pipeline::load_and_process(file_path, &mapping)?;
    Ok((
        PyDataFrame(dataset.anomalies().frame().clone()),
        PyDataFrame(dataset.all().clone()),
    ))
}
