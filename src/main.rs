//! CLI: load a transaction export, classify it and print the anomaly report.
//!
//! Usage:
//!   igac-anomalies --data data/transacciones_igac.csv
//!   igac-anomalies --from 2023-01-01 --to 2023-06-30 --type "Valor Cero/Nulo" --json
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::Parser;
use tracing::{error, warn};

use igac_anomalies::dashboard::{self, AnomalyFilter, DashboardReport};
use igac_anomalies::logging::init_logging;
use igac_anomalies::{load_and_process, AnomalyType, PipelineConfig};

#[derive(Parser, Debug)]
#[command(
    name = "igac-anomalies",
    version,
    about = "Flag risky property transactions in an IGAC export"
)]
struct Cli {
    /// TOML file with `data_file` and `[column_mapping]`
    #[arg(long)]
    config: Option<PathBuf>,

    /// Transaction export (overrides the config file)
    #[arg(long)]
    data: Option<PathBuf>,

    /// First day of the date range (YYYY-MM-DD or DD/MM/YYYY)
    #[arg(long, value_parser = parse_date_arg)]
    from: Option<NaiveDate>,

    /// Last day of the date range (YYYY-MM-DD or DD/MM/YYYY)
    #[arg(long, value_parser = parse_date_arg)]
    to: Option<NaiveDate>,

    /// Only these anomaly types (label or short name: sin-valor, cero-nulo, alto-rural)
    #[arg(long = "type", value_parser = parse_anomaly_type)]
    types: Vec<AnomalyType>,

    /// Only these municipalities
    #[arg(long = "municipality")]
    municipalities: Vec<String>,

    /// Number of municipalities in the ranking
    #[arg(long, default_value_t = dashboard::DEFAULT_TOP_MUNICIPALITIES)]
    top: usize,

    /// Number of detail rows to print
    #[arg(long, default_value_t = 20)]
    rows: usize,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn parse_date_arg(raw: &str) -> Result<NaiveDate, String> {
    igac_anomalies::parse::parse_day_first_date(raw).ok_or_else(|| format!("invalid date: '{raw}'"))
}

fn parse_anomaly_type(raw: &str) -> Result<AnomalyType, String> {
    let by_alias = match raw.to_lowercase().as_str() {
        "sin-valor" => Some(AnomalyType::MissingDeclaredValue),
        "cero-nulo" => Some(AnomalyType::ZeroOrNullValue),
        "alto-rural" => Some(AnomalyType::HighRuralValue),
        _ => None,
    };
    by_alias
        .or_else(|| AnomalyType::from_label(raw))
        .filter(|t| t.is_anomaly())
        .ok_or_else(|| format!("unknown anomaly type: '{raw}'"))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            eprintln!("ERROR: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_toml_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(data) = &cli.data {
        config.data_file = data.clone();
    }

    let dataset = load_and_process(&config.data_file, &config.column_mapping)?;
    if let Some(message) = dataset.anomalies().warning() {
        warn!("{message}");
        eprintln!("WARNING: {message}");
        return Ok(());
    }

    let mut filter = AnomalyFilter::new()
        .with_anomaly_types(cli.types.iter().copied())
        .with_municipalities(cli.municipalities.iter().cloned());
    if cli.from.is_some() || cli.to.is_some() {
        if let Some((min, max)) = dataset.date_bounds()? {
            filter = filter.with_date_range(cli.from.unwrap_or(min), cli.to.unwrap_or(max));
        }
    }

    let report = DashboardReport::build(&dataset, &filter, cli.top)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if cli.json {
        serde_json::to_writer_pretty(&mut out, &report)?;
        writeln!(out)?;
    } else {
        print_report(&mut out, &report, cli.rows)?;
    }
    Ok(())
}

fn print_report(out: &mut impl Write, report: &DashboardReport, rows: usize) -> io::Result<()> {
    writeln!(
        out,
        "Records: {}  Anomalies: {}",
        report.total_records, report.total_anomalies
    )?;
    if let Some((min, max)) = report.date_bounds {
        writeln!(out, "Date range in data: {min} .. {max}")?;
    }

    if let Some(message) = &report.warning {
        writeln!(out, "\nWARNING: {message}")?;
        return Ok(());
    }

    let summary = &report.summary;
    writeln!(out, "\n== Summary")?;
    writeln!(out, "Total alerts:        {}", summary.total_alerts)?;
    writeln!(out, "Municipalities:      {}", summary.municipalities)?;
    writeln!(
        out,
        "Anomalous value COP: {}",
        dashboard::format_thousands(summary.total_value)
    )?;

    writeln!(out, "\n== By type")?;
    for c in &report.by_type {
        writeln!(out, "{:<28} {:>8}", c.anomaly_type.label(), c.count)?;
    }

    writeln!(out, "\n== Top municipalities")?;
    for c in &report.top_municipalities {
        writeln!(out, "{:<28} {:>8}", c.municipality, c.count)?;
    }

    writeln!(out, "\n== Per month")?;
    for m in &report.monthly {
        writeln!(out, "{}  {:>8}", m.month_end.format("%Y-%m"), m.count)?;
    }

    match &report.map {
        Some(map) => writeln!(
            out,
            "\n== Map\n{} points centered at ({:.4}, {:.4})",
            map.points.len(),
            map.center_latitude,
            map.center_longitude
        )?,
        None => writeln!(out, "\nNo LATITUD/LONGITUD columns, map unavailable.")?,
    }

    writeln!(out, "\n== Detail")?;
    for t in report.filtered.iter().take(rows) {
        writeln!(
            out,
            "{}  {:<20} {:<24} {:<26} {:>16}",
            t.transaction_date,
            t.department_name.as_deref().unwrap_or("-"),
            t.municipality_name.as_deref().unwrap_or("-"),
            t.anomaly_type.label(),
            t.declared_value
                .map_or_else(|| "-".to_string(), dashboard::format_thousands),
        )?;
    }
    if report.filtered.len() > rows {
        writeln!(out, "... {} more", report.filtered.len() - rows)?;
    }
    Ok(())
}
