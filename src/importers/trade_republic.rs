use anyhow::{anyhow, Context, Result};
use csv::ReaderBuilder;
use rust_decimal::Decimal;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

use super::{parse_date, parse_decimal, parse_optional_decimal, RawRecord};
use crate::transactions::TransactionKind;

/// Parse a Trade Republic account export (Spanish locale).
///
/// Expected columns: `Fecha, Tipo, Valor, Nota, ISIN, Cantidad, Comisiones`.
/// `Valor` is the signed cash movement of the row; every amount is in EUR.
pub fn parse_trade_republic_csv<P: AsRef<Path>>(
    file_path: P,
    delimiter: u8,
    source: &str,
) -> Result<Vec<RawRecord>> {
    let path = file_path.as_ref();
    info!("Parsing Trade Republic export: {:?}", path);

    let file = std::fs::File::open(path).context("Failed to open Trade Republic export")?;
    parse_trade_republic_reader(file, delimiter, source)
}

pub fn parse_trade_republic_reader<R: Read>(
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
        .context("Failed to read Trade Republic headers")?
        .clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
            .ok_or_else(|| anyhow!("Column '{}' not found in Trade Republic export", name))
    };

    let date_idx = column("Fecha")?;
    let kind_idx = column("Tipo")?;
    let value_idx = column("Valor")?;
    let note_idx = column("Nota")?;
    let isin_idx = column("ISIN")?;
    let quantity_idx = column("Cantidad")?;
    let fee_idx = column("Comisiones").ok();

    let mut records = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let row = result.context("Failed to read Trade Republic record")?;
        let row_num = idx + 2;

        let kind_label = row.get(kind_idx).unwrap_or_default();
        let kind = match kind_label {
            "Compra" => TransactionKind::Buy,
            "Venta" => TransactionKind::Sell,
            "Dividendo" => TransactionKind::Dividend,
            "Intereses" => TransactionKind::Interest,
            other => {
                debug!("Ignoring Trade Republic row {} of type '{}'", row_num, other);
                continue;
            }
        };

        let parsed = (|| -> Result<RawRecord> {
            let date = parse_date(row.get(date_idx).unwrap_or_default())?;
            let value = parse_decimal(row.get(value_idx).unwrap_or_default())?.abs();
            let note = row
                .get(note_idx)
                .filter(|s| !s.is_empty())
                .unwrap_or("Undefined");
            let isin = row.get(isin_idx).filter(|s| !s.is_empty());
            let fee = parse_optional_decimal(fee_idx.and_then(|i| row.get(i)))?
                .map(|f| f.abs())
                .unwrap_or(Decimal::ZERO);

            let mut record = RawRecord::new(kind, date, "EUR", source);
            record.isin = isin.map(str::to_string);
            record.instrument = match kind {
                TransactionKind::Interest => None,
                _ => Some(note.to_string()),
            };

            if kind.is_trade() {
                let quantity = parse_optional_decimal(row.get(quantity_idx))?
                    .ok_or_else(|| anyhow!("Missing Cantidad"))?;
                if quantity.is_zero() {
                    return Err(anyhow!("Zero Cantidad"));
                }
                record.quantity = Some(quantity);
                record.price = Some(value / quantity);
                record.fee = Some(fee);
            } else {
                record.amount = Some(value);
            }
            Ok(record)
        })();

        match parsed {
            Ok(record) => records.push(record),
            Err(e) => warn!("Skipping row {}: {}", row_num, e),
        }
    }

    info!("Parsed {} records from Trade Republic export", records.len());
    Ok(records)
}
