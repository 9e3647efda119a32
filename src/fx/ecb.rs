use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use csv::ReaderBuilder;
use rust_decimal::Decimal;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use super::{FxRatePoint, FxRateTable};
use crate::error::PerformanceError;

/// Load the ECB historical reference rates (`eurofxref-hist.csv`)
pub fn load_ecb_csv<P: AsRef<Path>>(file_path: P) -> Result<FxRateTable> {
    let path = file_path.as_ref();
    info!("Loading ECB reference rates: {:?}", path);

    let file = std::fs::File::open(path)
        .map_err(PerformanceError::Io)
        .with_context(|| format!("Failed to open rate file {}", path.display()))?;
    parse_ecb_csv(file)
}

/// Parse the ECB layout: `Date,USD,JPY,...` with one row per publication day.
///
/// The ECB quotes units of currency per 1 EUR; every value is inverted so the
/// table holds rate-to-EUR.
pub fn parse_ecb_csv<R: Read>(reader: R) -> Result<FxRateTable> {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .context("Failed to read rate file headers")?
        .clone();

    let date_idx = headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case("date"))
        .ok_or_else(|| anyhow!("Date column not found in rate file"))?;

    let currencies: Vec<(usize, String)> = headers
        .iter()
        .enumerate()
        .filter(|(idx, h)| *idx != date_idx && !h.is_empty())
        .map(|(idx, h)| (idx, h.to_ascii_uppercase()))
        .collect();
    debug!("Rate file currencies: {:?}", currencies);

    let mut points = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result.context("Failed to read rate record")?;
        let row_num = idx + 2;

        let date_str = record
            .get(date_idx)
            .ok_or_else(|| anyhow!("Missing date at row {}", row_num))?;
        if date_str.is_empty() {
            continue;
        }
        let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").map_err(|_| {
            PerformanceError::ParseError(format!("invalid date '{}' at row {}", date_str, row_num))
        })?;

        for (col, currency) in &currencies {
            let Some(value) = record.get(*col) else {
                continue;
            };
            if value.is_empty() || value.eq_ignore_ascii_case("N/A") {
                continue;
            }
            let per_eur = Decimal::from_str(value).map_err(|_| {
                PerformanceError::ParseError(format!(
                    "invalid {} rate '{}' at row {}",
                    currency, value, row_num
                ))
            })?;
            if per_eur <= Decimal::ZERO {
                return Err(PerformanceError::ParseError(format!(
                    "non-positive {} rate {} at row {}",
                    currency, per_eur, row_num
                ))
                .into());
            }
            points.push(FxRatePoint::new(date, currency.clone(), Decimal::ONE / per_eur));
        }
    }

    let table = FxRateTable::from_points(points)?;
    if table.is_empty() {
        return Err(PerformanceError::ParseError("rate file contains no rates".to_string()).into());
    }
    info!("Parsed {} reference rate points", table.len());
    Ok(table)
}
