use anyhow::{anyhow, Context, Result};
use csv::ReaderBuilder;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

use super::{parse_date, parse_optional_decimal, RawRecord};
use crate::transactions::TransactionKind;

/// Parse a CSV of already-normalized records, one transaction per row.
///
/// Columns are located by header name, so their order does not matter:
/// `date, instrument, isin, ticker, kind, quantity, price, amount, fee, tax,
/// currency, source`. Only `date`, `kind` and `currency` are mandatory.
pub fn parse_canonical_csv<P: AsRef<Path>>(
    file_path: P,
    delimiter: u8,
    source: &str,
) -> Result<Vec<RawRecord>> {
    let path = file_path.as_ref();
    info!("Parsing canonical CSV file: {:?}", path);

    let file = std::fs::File::open(path).context("Failed to open CSV file")?;
    parse_canonical_reader(file, delimiter, source)
}

pub fn parse_canonical_reader<R: Read>(
    reader: R,
    delimiter: u8,
    source: &str,
) -> Result<Vec<RawRecord>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .context("Failed to read CSV headers")?
        .clone();
    debug!("CSV headers: {:?}", headers);

    let mapping = find_columns(&headers)?;
    debug!("Column mapping: {:?}", mapping);

    let mut records = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let row = result.context("Failed to read CSV record")?;

        match parse_row(&row, &mapping, source, idx + 2) {
            Ok(Some(record)) => records.push(record),
            Ok(None) => continue,
            Err(e) => {
                warn!("Skipping row {}: {}", idx + 2, e);
                continue;
            }
        }
    }

    info!("Successfully parsed {} records from CSV", records.len());
    Ok(records)
}

#[derive(Debug)]
struct ColumnMapping {
    date: usize,
    kind: usize,
    currency: usize,
    instrument: Option<usize>,
    isin: Option<usize>,
    ticker: Option<usize>,
    quantity: Option<usize>,
    price: Option<usize>,
    amount: Option<usize>,
    fee: Option<usize>,
    tax: Option<usize>,
    source: Option<usize>,
}

fn position(headers: &csv::StringRecord, names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| names.iter().any(|n| h.eq_ignore_ascii_case(n)))
}

fn find_columns(headers: &csv::StringRecord) -> Result<ColumnMapping> {
    Ok(ColumnMapping {
        date: position(headers, &["date"]).ok_or_else(|| anyhow!("Date column not found"))?,
        kind: position(headers, &["kind", "type"]).ok_or_else(|| anyhow!("Kind column not found"))?,
        currency: position(headers, &["currency"]).ok_or_else(|| anyhow!("Currency column not found"))?,
        instrument: position(headers, &["instrument", "name", "asset"]),
        isin: position(headers, &["isin"]),
        ticker: position(headers, &["ticker", "symbol"]),
        quantity: position(headers, &["quantity", "qty"]),
        price: position(headers, &["price", "unit_price"]),
        amount: position(headers, &["amount", "gross"]),
        fee: position(headers, &["fee", "fees", "commission"]),
        tax: position(headers, &["tax", "withholding"]),
        source: position(headers, &["source"]),
    })
}

fn parse_row(
    row: &csv::StringRecord,
    mapping: &ColumnMapping,
    default_source: &str,
    row_num: usize,
) -> Result<Option<RawRecord>> {
    let cell = |idx: Option<usize>| idx.and_then(|i| row.get(i)).filter(|s| !s.is_empty());

    let kind_str = row
        .get(mapping.kind)
        .ok_or_else(|| anyhow!("Missing kind at row {}", row_num))?;
    if kind_str.is_empty() {
        return Ok(None);
    }
    let kind: TransactionKind = kind_str
        .parse()
        .map_err(|_| anyhow!("Unknown kind '{}' at row {}", kind_str, row_num))?;

    let date_str = row
        .get(mapping.date)
        .ok_or_else(|| anyhow!("Missing date at row {}", row_num))?;
    let date = parse_date(date_str)?;

    let currency = row
        .get(mapping.currency)
        .ok_or_else(|| anyhow!("Missing currency at row {}", row_num))?;

    let source = cell(mapping.source).unwrap_or(default_source);

    Ok(Some(RawRecord {
        instrument: cell(mapping.instrument).map(str::to_string),
        isin: cell(mapping.isin).map(str::to_string),
        ticker: cell(mapping.ticker).map(str::to_string),
        quantity: parse_optional_decimal(cell(mapping.quantity))?,
        price: parse_optional_decimal(cell(mapping.price))?,
        amount: parse_optional_decimal(cell(mapping.amount))?,
        fee: parse_optional_decimal(cell(mapping.fee))?,
        tax: parse_optional_decimal(cell(mapping.tax))?,
        ..RawRecord::new(kind, date, currency, source)
    }))
}
