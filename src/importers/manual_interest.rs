use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use csv::ReaderBuilder;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

use super::{parse_decimal, parse_optional_decimal, RawRecord};
use crate::transactions::TransactionKind;

/// Parse a hand-maintained interest file: `year;quantity;currency;tax;source`.
///
/// Each row becomes one INTEREST record dated January 1st of its year.
pub fn parse_manual_interest_csv<P: AsRef<Path>>(
    file_path: P,
    delimiter: u8,
    source: &str,
) -> Result<Vec<RawRecord>> {
    let path = file_path.as_ref();
    info!("Parsing manual interest file: {:?}", path);

    let file = std::fs::File::open(path).context("Failed to open manual interest file")?;
    parse_manual_interest_reader(file, delimiter, source)
}

pub fn parse_manual_interest_reader<R: Read>(
    reader: R,
    delimiter: u8,
    source: &str,
) -> Result<Vec<RawRecord>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut records = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let row = result.context("Failed to read manual interest record")?;
        let row_num = idx + 2;

        match parse_row(&row, source) {
            Ok(record) => records.push(record),
            Err(e) => warn!("Skipping row {}: {}", row_num, e),
        }
    }

    info!("Parsed {} manual interest records", records.len());
    Ok(records)
}

fn parse_row(row: &csv::StringRecord, default_source: &str) -> Result<RawRecord> {
    let year: i32 = row
        .get(0)
        .ok_or_else(|| anyhow!("Missing year"))?
        .parse()
        .context("Invalid year")?;
    let date = NaiveDate::from_ymd_opt(year, 1, 1).ok_or_else(|| anyhow!("Invalid year {}", year))?;
    let amount = parse_decimal(row.get(1).ok_or_else(|| anyhow!("Missing quantity"))?)?;
    let currency = row
        .get(2)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow!("Missing currency"))?;
    let tax = parse_optional_decimal(row.get(3))?;
    let source = row.get(4).filter(|s| !s.is_empty()).unwrap_or(default_source);

    Ok(RawRecord {
        amount: Some(amount),
        tax,
        ..RawRecord::new(TransactionKind::Interest, date, currency, source)
    })
}
