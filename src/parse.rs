//! Field parsing: transaction dates, coordinates and declared values.
//!
//! Row-level problems never fail the load. A malformed value becomes null;
//! a null date (or, when both coordinate columns exist, a null coordinate)
//! drops the row.

use chrono::{Datelike, NaiveDate, NaiveTime};
use polars::prelude::*;
use tracing::info;

use crate::error::Result;
use crate::schema::transaction;

/// Days from 0001-01-01 (CE) to 1970-01-01, the epoch of polars' Date dtype.
const EPOCH_DAYS_FROM_CE: i32 = 719_163;

const TIME_FORMATS: [&str; 3] = ["%H:%M:%S", "%H:%M", "%H:%M:%S%.f"];

/// Run every field parser in order: dates, coordinates, declared values.
pub fn parse_fields(df: DataFrame) -> Result<DataFrame> {
    let df = parse_transaction_dates(df)?;
    let df = parse_coordinates(df)?;
    parse_declared_values(df)
}

// ── Dates ───────────────────────────────────────────────────────────────────

/// Parse a date written day-first (`31/12/2023`, `31-12-23`, `31.12.2023 14:05`).
///
/// Year-first ISO dates are accepted too, and a month-first reading is used
/// when the day-first one is not a valid calendar date (`12/25/2023`).
/// A trailing time of day is validated and discarded.
pub fn parse_day_first_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let (date_part, time_part) = match raw.split_once(|c: char| c == ' ' || c == 'T') {
        Some((date, time)) => (date, Some(time.trim())),
        None => (raw, None),
    };

    if let Some(time) = time_part {
        let valid_time = TIME_FORMATS
            .iter()
            .any(|fmt| NaiveTime::parse_from_str(time, fmt).is_ok());
        if !valid_time {
            return None;
        }
    }

    let parts: Vec<&str> = date_part.split(['/', '-', '.']).collect();
    let [first, second, third] = parts.as_slice() else {
        return None;
    };
    if [first, second, third]
        .iter()
        .any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()))
    {
        return None;
    }

    if first.len() == 4 {
        let year = first.parse().ok()?;
        return NaiveDate::from_ymd_opt(year, second.parse().ok()?, third.parse().ok()?);
    }

    let year = match third.len() {
        4 => third.parse().ok()?,
        2 => expand_two_digit_year(third.parse().ok()?),
        _ => return None,
    };
    let a: u32 = first.parse().ok()?;
    let b: u32 = second.parse().ok()?;
    NaiveDate::from_ymd_opt(year, b, a).or_else(|| NaiveDate::from_ymd_opt(year, a, b))
}

/// POSIX `%y` pivot: 69-99 → 1900s, 00-68 → 2000s.
fn expand_two_digit_year(yy: i32) -> i32 {
    if yy >= 69 {
        1900 + yy
    } else {
        2000 + yy
    }
}

pub(crate) fn days_since_epoch(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - EPOCH_DAYS_FROM_CE
}

pub(crate) fn date_from_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days + EPOCH_DAYS_FROM_CE)
}

/// Parse the transaction date column to Date dtype and drop rows without one.
pub fn parse_transaction_dates(mut df: DataFrame) -> Result<DataFrame> {
    let days: Vec<Option<i32>> = {
        let raw = df
            .column(transaction::TRANSACTION_DATE)?
            .cast(&DataType::String)?;
        raw.str()?
            .into_iter()
            .map(|v| v.and_then(parse_day_first_date).map(days_since_epoch))
            .collect()
    };
    let dates = Series::new(transaction::TRANSACTION_DATE.into(), days).cast(&DataType::Date)?;
    df.with_column(dates)?;

    let before = df.height();
    let df = df
        .lazy()
        .filter(col(transaction::TRANSACTION_DATE).is_not_null())
        .collect()?;

    info!(
        dropped = before - df.height(),
        retained = df.height(),
        "Parsed transaction dates"
    );
    Ok(df)
}

// ── Coordinates ─────────────────────────────────────────────────────────────

/// Cast latitude/longitude to Float64 (non-numeric → null).
///
/// When both columns exist, rows missing either coordinate are dropped.
/// Absent columns are left absent.
pub fn parse_coordinates(df: DataFrame) -> Result<DataFrame> {
    let has_lat = df.column(transaction::LATITUDE).is_ok();
    let has_lon = df.column(transaction::LONGITUDE).is_ok();
    if !has_lat && !has_lon {
        return Ok(df);
    }

    let casts: Vec<Expr> = [(has_lat, transaction::LATITUDE), (has_lon, transaction::LONGITUDE)]
        .into_iter()
        .filter(|(present, _)| *present)
        .map(|(_, name)| {
            col(name)
                .cast(DataType::String)
                .str()
                .strip_chars(lit(" \t\r\n"))
                .cast(DataType::Float64)
        })
        .collect();

    let before = df.height();
    let mut lazy = df.lazy().with_columns(casts);
    if has_lat && has_lon {
        lazy = lazy.filter(
            col(transaction::LATITUDE)
                .is_not_null()
                .and(col(transaction::LONGITUDE).is_not_null()),
        );
    }
    let df = lazy.collect()?;

    info!(
        dropped = before - df.height(),
        retained = df.height(),
        "Parsed coordinates"
    );
    Ok(df)
}

// ── Declared value ──────────────────────────────────────────────────────────

/// Parse a Colombian-formatted currency amount: `.` groups thousands, `,`
/// marks decimals. `"1.234.567,89"` → `1234567.89`.
///
/// Returns `None` (not zero) for anything that is not a finite number.
pub fn parse_declared_value(raw: &str) -> Option<f64> {
    let normalized = raw.replace('.', "").replace(',', ".");
    normalized
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Parse the declared value column to Float64.
///
/// If the column is missing from the source it is created as zero for every
/// row, which is distinct from a per-row parse failure (null).
pub fn parse_declared_values(mut df: DataFrame) -> Result<DataFrame> {
    let series = if df.column(transaction::DECLARED_VALUE).is_ok() {
        let values: Vec<Option<f64>> = {
            let raw = df
                .column(transaction::DECLARED_VALUE)?
                .cast(&DataType::String)?;
            raw.str()?
                .into_iter()
                .map(|v| v.and_then(parse_declared_value))
                .collect()
        };
        let unparsed = values.iter().filter(|v| v.is_none()).count();
        info!(unparsed, "Parsed declared values");
        Series::new(transaction::DECLARED_VALUE.into(), values)
    } else {
        info!("No declared value column, assuming zero for every record");
        Series::new(
            transaction::DECLARED_VALUE.into(),
            vec![0.0f64; df.height()],
        )
    };
    df.with_column(series)?;
    Ok(df)
}
