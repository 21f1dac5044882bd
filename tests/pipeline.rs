use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use tempfile::TempDir;

use igac_anomalies::dashboard::{self, AnomalyFilter, DashboardReport};
use igac_anomalies::schema::transaction;
use igac_anomalies::{
    load_and_process, AnomalyType, ColumnMapping, DatasetCache, IgacError, PipelineConfig,
};

const HEADER: &str = "FECHA_RADICA_TEXTO;MUNICIPIO;DEPARTAMENTO;TIENE_VALOR;TIPO_PREDIO_ZONA;VALOR;LATITUD;LONGITUD";

fn write_csv(dir: &TempDir, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn export(rows: &[&str]) -> String {
    let mut text = String::from(HEADER);
    for row in rows {
        text.push('\n');
        text.push_str(row);
    }
    text.push('\n');
    text
}

#[test]
fn missing_file_is_fatal() {
    let dir = TempDir::new().unwrap();
    let err = load_and_process(dir.path().join("nope.csv"), &ColumnMapping::default()).unwrap_err();
    assert!(matches!(err, IgacError::FileNotFound(_)));
}

#[test]
fn empty_file_is_fatal() {
    let dir = TempDir::new().unwrap();
    let path = write_csv(&dir, "empty.csv", b"");
    let err = load_and_process(&path, &ColumnMapping::default()).unwrap_err();
    assert!(matches!(err, IgacError::EmptyFile(_)));
}

#[test]
fn file_without_date_column_is_fatal() {
    let dir = TempDir::new().unwrap();
    let path = write_csv(&dir, "nodate.csv", b"MUNICIPIO;VALOR\nCALI;1.000,00\n");
    let err = load_and_process(&path, &ColumnMapping::default()).unwrap_err();
    assert!(matches!(err, IgacError::MissingDateColumn(_)));
    assert!(err.is_fatal_load_error());
}

#[test]
fn three_row_scenario_from_file() {
    let dir = TempDir::new().unwrap();
    let path = write_csv(
        &dir,
        "scenario.csv",
        b"FECHA_RADICA_TEXTO;TIENE_VALOR;VALOR;TIPO_PREDIO_ZONA\n\
          15/01/2023;SI;500.000,00;URBANO\n\
          16/01/2023;NO;300.000,00;URBANO\n\
          17/01/2023;SI;0;RURAL\n",
    );
    let dataset = load_and_process(&path, &ColumnMapping::default()).unwrap();

    assert_eq!(dataset.anomalies().len(), 2);
    let anomalies = dataset.anomaly_transactions().unwrap();
    assert_eq!(anomalies[0].transaction_date, date(2023, 1, 16));
    assert_eq!(anomalies[0].anomaly_type, AnomalyType::MissingDeclaredValue);
    assert_eq!(anomalies[1].transaction_date, date(2023, 1, 17));
    assert_eq!(anomalies[1].anomaly_type, AnomalyType::ZeroOrNullValue);
}

#[test]
fn bad_dates_and_coordinates_drop_rows() {
    let dir = TempDir::new().unwrap();
    let text = export(&[
        "01/03/2023;CALI;VALLE;NO;URBANO;1.000,00;3.45;-76.53",
        "no-date;CALI;VALLE;NO;URBANO;1.000,00;3.45;-76.53",
        "02/03/2023;CALI;VALLE;NO;URBANO;1.000,00;;-76.53",
        "03/03/2023;CALI;VALLE;NO;URBANO;1.000,00;3.45;oeste",
        "04/03/2023;PALMIRA;VALLE;SI;URBANO;2.000,00;3.53;-76.30",
    ]);
    let path = write_csv(&dir, "geo.csv", text.as_bytes());
    let dataset = load_and_process(&path, &ColumnMapping::default()).unwrap();

    let all = dataset.transactions().unwrap();
    let dates: Vec<_> = all.iter().map(|t| t.transaction_date).collect();
    assert_eq!(dates, vec![date(2023, 3, 1), date(2023, 3, 4)]);
    assert!(all.iter().all(|t| t.latitude.is_some() && t.longitude.is_some()));

    let anomalies = dataset.anomaly_transactions().unwrap();
    assert_eq!(anomalies.len(), 1);
    assert_eq!(anomalies[0].transaction_date, date(2023, 3, 1));
    assert!(dataset.has_coordinates());
}

#[test]
fn indicator_no_in_any_case_is_missing_declared_value() {
    let dir = TempDir::new().unwrap();
    let text = export(&[
        "01/03/2023;CALI;VALLE;NO;URBANO;1.000,00;3.45;-76.53",
        "01/03/2023;CALI;VALLE;No;URBANO;0;3.45;-76.53",
        "01/03/2023;CALI;VALLE;no;RURAL;abc;3.45;-76.53",
    ]);
    let path = write_csv(&dir, "indicator.csv", text.as_bytes());
    let dataset = load_and_process(&path, &ColumnMapping::default()).unwrap();

    for t in dataset.transactions().unwrap() {
        assert!(t.is_anomaly);
        assert_eq!(t.anomaly_type, AnomalyType::MissingDeclaredValue);
    }
}

#[test]
fn unparseable_value_is_missing_and_flagged() {
    let dir = TempDir::new().unwrap();
    let text = export(&["01/03/2023;CALI;VALLE;SI;URBANO;abc;3.45;-76.53"]);
    let path = write_csv(&dir, "value.csv", text.as_bytes());
    let dataset = load_and_process(&path, &ColumnMapping::default()).unwrap();

    let rows = dataset.transactions().unwrap();
    assert_eq!(rows[0].declared_value, None);
    assert_eq!(rows[0].anomaly_type, AnomalyType::ZeroOrNullValue);
}

#[test]
fn latin1_export_is_decoded() {
    let dir = TempDir::new().unwrap();
    let mut bytes = b"FECHA_RADICA_TEXTO;MUNICIPIO;VALOR\n01/03/2023;BOGOT".to_vec();
    bytes.push(0xC1); // 'Á' in Latin-1
    bytes.extend_from_slice(b";0\n");
    let path = write_csv(&dir, "latin1.csv", &bytes);
    let dataset = load_and_process(&path, &ColumnMapping::default()).unwrap();

    let rows = dataset.anomaly_transactions().unwrap();
    assert_eq!(rows[0].municipality_name.as_deref(), Some("BOGOTÁ"));
}

#[test]
fn loading_twice_is_identical() {
    let dir = TempDir::new().unwrap();
    let text = export(&[
        "01/03/2023;CALI;VALLE;SI;RURAL;10.000,00;3.45;-76.53",
        "05/04/2023;CALI;VALLE;SI;RURAL;20.000,00;3.45;-76.53",
        "07/05/2023;BUGA;VALLE;SI;RURAL;900.000,00;3.90;-76.29",
    ]);
    let path = write_csv(&dir, "twice.csv", text.as_bytes());
    let mapping = ColumnMapping::default();

    let first = load_and_process(&path, &mapping).unwrap();
    let second = load_and_process(&path, &mapping).unwrap();

    assert!(first.all().equals_missing(second.all()));
    assert!(first
        .anomalies()
        .frame()
        .equals_missing(second.anomalies().frame()));
    assert_eq!(first.rural_threshold(), second.rural_threshold());
}

#[test]
fn cache_reuses_dataset_for_same_file_and_mapping() {
    let dir = TempDir::new().unwrap();
    let text = export(&["01/03/2023;CALI;VALLE;NO;URBANO;1.000,00;3.45;-76.53"]);
    let path = write_csv(&dir, "cached.csv", text.as_bytes());
    let cache = DatasetCache::new();

    let first = cache.get_or_load(&path, &ColumnMapping::default()).unwrap();
    let second = cache.get_or_load(&path, &ColumnMapping::default()).unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let other_mapping = ColumnMapping::new([("FECHA_RADICA_TEXTO", transaction::TRANSACTION_DATE)]);
    let third = cache.get_or_load(&path, &other_mapping).unwrap();
    assert!(!Arc::ptr_eq(&first, &third));
    assert_eq!(cache.len(), 2);
}

#[test]
fn no_anomalies_is_a_warning() {
    let dir = TempDir::new().unwrap();
    let text = export(&["01/03/2023;CALI;VALLE;SI;URBANO;1.000,00;3.45;-76.53"]);
    let path = write_csv(&dir, "clean.csv", text.as_bytes());
    let dataset = load_and_process(&path, &ColumnMapping::default()).unwrap();

    assert!(dataset.anomalies().is_empty());
    assert!(dataset.anomalies().warning().is_some());

    let report = DashboardReport::build(&dataset, &AnomalyFilter::new(), 10).unwrap();
    assert_eq!(report.warning.as_deref(), dataset.anomalies().warning());
    assert!(report.filtered.is_empty());
}

#[test]
fn rural_threshold_ignores_date_filter() {
    let dir = TempDir::new().unwrap();
    let text = export(&[
        "01/01/2023;A;D;SI;RURAL;100,00;1.0;1.0",
        "01/02/2023;B;D;SI;RURAL;200,00;1.0;1.0",
        "01/03/2023;C;D;SI;RURAL;300,00;1.0;1.0",
        "01/04/2023;D;D;SI;RURAL;10.000,00;1.0;1.0",
    ]);
    let path = write_csv(&dir, "rural.csv", text.as_bytes());
    let dataset = load_and_process(&path, &ColumnMapping::default()).unwrap();

    let threshold = dataset.rural_threshold().unwrap();
    assert!(threshold > 300.0 && threshold < 10_000.0);

    // Narrowing the view does not re-classify.
    let filter = AnomalyFilter::new().with_date_range(date(2023, 4, 1), date(2023, 4, 30));
    let report = DashboardReport::build(&dataset, &filter, 10).unwrap();
    assert_eq!(report.filtered.len(), 1);
    assert_eq!(report.filtered[0].anomaly_type, AnomalyType::HighRuralValue);
    assert_eq!(dataset.anomalies().len(), 1);
}

#[test]
fn dashboard_report_for_filtered_view() {
    let dir = TempDir::new().unwrap();
    let text = export(&[
        "10/01/2023;CALI;VALLE;NO;URBANO;1.000,00;3.40;-76.50",
        "11/01/2023;CALI;VALLE;SI;URBANO;0;3.50;-76.60",
        "20/03/2023;BUGA;VALLE;SI;URBANO;;3.90;-76.30",
        "21/03/2023;BUGA;VALLE;SI;URBANO;5.000,00;3.90;-76.30",
    ]);
    let path = write_csv(&dir, "report.csv", text.as_bytes());
    let dataset = load_and_process(&path, &ColumnMapping::default()).unwrap();

    assert_eq!(
        dataset.date_bounds().unwrap(),
        Some((date(2023, 1, 10), date(2023, 3, 21)))
    );

    let filter = AnomalyFilter::new().with_municipalities(["CALI"]);
    let report = DashboardReport::build(&dataset, &filter, 10).unwrap();

    assert_eq!(report.total_records, 4);
    assert_eq!(report.total_anomalies, 3);
    assert_eq!(report.available_municipalities, vec!["BUGA", "CALI"]);
    assert_eq!(report.summary.total_alerts, 2);
    assert_eq!(report.summary.total_value, 1000.0);
    assert_eq!(report.monthly.len(), 1);
    let map = report.map.as_ref().unwrap();
    assert_eq!(map.points.len(), 2);
    assert!((map.center_latitude - 3.45).abs() < 1e-9);
    assert!(map.points[0].tooltip.contains("Municipio: CALI"));

    let filtered_frame = filter.apply_frame(dataset.anomalies().frame()).unwrap();
    assert_eq!(filtered_frame.height(), 2);
    let table = dashboard::detail_table(&filtered_frame).unwrap();
    assert_eq!(table.get_column_names_str(), dashboard::DETAIL_COLUMNS.to_vec());
}

#[test]
fn export_without_coordinates_has_no_map() {
    let dir = TempDir::new().unwrap();
    let path = write_csv(
        &dir,
        "nogeo.csv",
        b"FECHA_RADICA_TEXTO;MUNICIPIO;VALOR\n01/03/2023;CALI;0\n",
    );
    let dataset = load_and_process(&path, &ColumnMapping::default()).unwrap();

    assert!(!dataset.has_coordinates());
    let report = DashboardReport::build(&dataset, &AnomalyFilter::new(), 10).unwrap();
    assert!(report.map.is_none());
    let table = dashboard::detail_table(dataset.anomalies().frame()).unwrap();
    assert_eq!(
        table.get_column_names_str(),
        vec!["fecha_transaccion", "nombre_municipio", "tipo_anomalia", "valor_declarado"]
    );
}

#[test]
fn config_file_drives_the_pipeline() {
    let dir = TempDir::new().unwrap();
    let data = write_csv(&dir, "custom.csv", b"FECHA;VALOR\n01/03/2023;0\n");
    let config_path = dir.path().join("igac.toml");
    fs::write(
        &config_path,
        format!(
            "data_file = {:?}\n\n[column_mapping]\nFECHA = \"fecha_transaccion\"\nVALOR = \"valor_declarado\"\n",
            data.display().to_string()
        ),
    )
    .unwrap();

    let config = PipelineConfig::from_toml_file(&config_path).unwrap();
    assert_eq!(config.data_file, data);

    let dataset = load_and_process(&config.data_file, &config.column_mapping).unwrap();
    assert_eq!(dataset.anomalies().len(), 1);
}
