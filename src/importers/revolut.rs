use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use csv::ReaderBuilder;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

use super::{parse_decimal, RawRecord};
use crate::transactions::TransactionKind;

/// Parse a Revolut flexible-savings statement.
///
/// Expected columns: `Date, Description, Value, EUR` (the currency follows the
/// comma in the value header). Lines sharing a timestamp form one payout:
/// `Interest PAID` is the gross, `Tax` lines are withheld and `Fee` lines are
/// deducted from the gross. Payouts without an interest line (withdrawals,
/// reinvestments, fund buys and sells) are skipped.
pub fn parse_revolut_csv<P: AsRef<Path>>(
    file_path: P,
    delimiter: u8,
    source: &str,
) -> Result<Vec<RawRecord>> {
    let path = file_path.as_ref();
    info!("Parsing Revolut savings statement: {:?}", path);

    let file = std::fs::File::open(path).context("Failed to open Revolut statement")?;
    parse_revolut_reader(file, delimiter, source)
}

pub fn parse_revolut_reader<R: Read>(
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
        .context("Failed to read Revolut headers")?
        .clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.to_ascii_lowercase().starts_with(&name.to_ascii_lowercase()))
            .ok_or_else(|| anyhow!("Column '{}' not found in Revolut statement", name))
    };

    let date_idx = column("Date")?;
    let description_idx = column("Description")?;
    let value_idx = column("Value")?;
    let currency = headers
        .get(value_idx)
        .and_then(|h| h.split_once(','))
        .map(|(_, code)| code.trim().to_ascii_uppercase())
        .filter(|code| code.len() == 3)
        .unwrap_or_else(|| "EUR".to_string());

    let mut payouts: BTreeMap<NaiveDateTime, Vec<(String, Decimal)>> = BTreeMap::new();
    for (idx, result) in reader.records().enumerate() {
        let row = result.context("Failed to read Revolut record")?;
        let row_num = idx + 2;

        let parsed = (|| -> Result<(NaiveDateTime, String, Decimal)> {
            let timestamp = parse_statement_timestamp(row.get(date_idx).unwrap_or_default())?;
            let description = row.get(description_idx).unwrap_or_default().to_string();
            let value = parse_decimal(row.get(value_idx).unwrap_or_default())?;
            Ok((timestamp, description, value))
        })();

        match parsed {
            Ok((timestamp, description, value)) => {
                payouts.entry(timestamp).or_default().push((description, value))
            }
            Err(e) => warn!("Skipping row {}: {}", row_num, e),
        }
    }

    let mut records = Vec::new();
    for (timestamp, lines) in payouts {
        let mut gross = Decimal::ZERO;
        let mut tax = Decimal::ZERO;
        let mut fee = Decimal::ZERO;
        let mut has_interest = false;

        for (description, value) in &lines {
            if description.contains("Interest PAID") {
                gross += *value;
                has_interest = true;
            } else if description.contains("Tax") {
                tax += value.abs();
            } else if description.contains("Fee") {
                fee += value.abs();
            }
        }

        if !has_interest {
            debug!("Ignoring Revolut movement at {} ({} line(s))", timestamp, lines.len());
            continue;
        }

        let mut record =
            RawRecord::new(TransactionKind::Interest, timestamp.date(), currency.as_str(), source);
        record.amount = Some(gross - fee);
        record.tax = Some(tax);
        record.fee = Some(fee);
        records.push(record);
    }

    info!("Parsed {} interest payouts from Revolut statement", records.len());
    Ok(records)
}

fn month_number(name: &str) -> Option<u32> {
    let month = match name.trim_end_matches('.').to_lowercase().as_str() {
        "ene" | "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "abr" | "apr" => 4,
        "may" | "mayo" => 5,
        "jun" => 6,
        "jul" => 7,
        "ago" | "aug" => 8,
        "sep" | "sept" => 9,
        "oct" => 10,
        "nov" => 11,
        "dic" | "dec" => 12,
        _ => return None,
    };
    Some(month)
}

/// Parse timestamps like `31 dic 2024, 1:29:07`
fn parse_statement_timestamp(text: &str) -> Result<NaiveDateTime> {
    let (date_part, time_part) = text
        .split_once(',')
        .ok_or_else(|| anyhow!("Could not parse timestamp: {}", text))?;

    let parts: Vec<&str> = date_part.split_whitespace().collect();
    let [day, month, year] = parts.as_slice() else {
        return Err(anyhow!("Could not parse timestamp: {}", text));
    };
    let month = month_number(month).ok_or_else(|| anyhow!("Unknown month '{}'", month))?;
    let date = NaiveDate::from_ymd_opt(
        year.parse().context("Invalid year")?,
        month,
        day.parse().context("Invalid day")?,
    )
    .ok_or_else(|| anyhow!("Invalid date: {}", date_part))?;

    let time = NaiveTime::parse_from_str(time_part.trim(), "%H:%M:%S")
        .with_context(|| format!("Invalid time '{}'", time_part.trim()))?;
    Ok(date.and_time(time))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const SAMPLE: &str = "\
Date;Description;Value, EUR;Price per share;Quantity of shares
30 dic 2024, 1:29:07;Interest PAID EUR Class R IE000AZVL3K0;0,1523;;
30 dic 2024, 1:29:07;Service Fee Charged EUR Class R;-0,0112;;
30 dic 2024, 1:29:07;Interest Tax EUR Class R;-0,0289;;
31 dic 2024, 1:29:10;Interest PAID EUR Class R IE000AZVL3K0;0,1500;;
2 ene 2025, 9:00:00;BUY EUR Class R IE000AZVL3K0;500,00;1,00;500
3 ene 2025, 10:15:00;Interest WITHDRAWN EUR Class R;-0,30;;
tomorrow;Interest PAID EUR Class R IE000AZVL3K0;1,00;;
";

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_lines_sharing_a_timestamp_form_one_payout() {
        let records = parse_revolut_reader(SAMPLE.as_bytes(), b';', "Revolut").unwrap();
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.kind, TransactionKind::Interest);
        assert_eq!(first.date, date(2024, 12, 30));
        assert_eq!(first.amount, Some(dec!(0.1411)));
        assert_eq!(first.tax, Some(dec!(0.0289)));
        assert_eq!(first.fee, Some(dec!(0.0112)));
        assert_eq!(first.currency, "EUR");
        assert_eq!(first.instrument, None);
        assert_eq!(first.source, "Revolut");

        let second = &records[1];
        assert_eq!(second.date, date(2024, 12, 31));
        assert_eq!(second.amount, Some(dec!(0.1500)));
        assert_eq!(second.tax, Some(Decimal::ZERO));
    }

    #[test]
    fn test_currency_comes_from_value_header() {
        let data = "Date;Description;Value, USD\n1 mar 2024, 0:00:01;Interest PAID USD Class R;2,00\n";
        let records = parse_revolut_reader(data.as_bytes(), b';', "Revolut USD").unwrap();
        assert_eq!(records[0].currency, "USD");
    }

    #[test]
    fn test_statement_timestamp() {
        assert_eq!(
            parse_statement_timestamp("31 dic 2024, 1:29:07").unwrap(),
            date(2024, 12, 31).and_hms_opt(1, 29, 7).unwrap()
        );
        assert_eq!(
            parse_statement_timestamp("5 mayo 2024, 12:00:00").unwrap().date(),
            date(2024, 5, 5)
        );
        assert!(parse_statement_timestamp("2024-12-31").is_err());
        assert!(parse_statement_timestamp("31 foo 2024, 1:00:00").is_err());
    }

    #[test]
    fn test_missing_column_is_error() {
        let data = "Date;Value, EUR\n31 dic 2024, 1:29:07;0,15\n";
        assert!(parse_revolut_reader(data.as_bytes(), b';', "Revolut").is_err());
    }
}
