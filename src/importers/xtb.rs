use anyhow::{anyhow, Context, Result};
use chrono::NaiveDateTime;
use csv::{ReaderBuilder, StringRecord};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

use super::{parse_date, parse_decimal, parse_optional_decimal, RawRecord};
use crate::transactions::TransactionKind;

/// Cash movements closer than this to the previous one belong to the same event
const GROUP_WINDOW_SECS: i64 = 10;

/// Largest accepted gap between the reported net result and the recomputed one
const NET_RESULT_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Parse an XTB export (Spanish locale).
///
/// XTB ships two reports and the layout is picked from the header:
/// - cash operations (`ID, Type, Time, Comment, Symbol, Amount`) give interest
///   and dividends with their withheld tax
/// - closed positions (two header rows) give one BUY and one SELL per position
pub fn parse_xtb_csv<P: AsRef<Path>>(
    file_path: P,
    delimiter: u8,
    source: &str,
) -> Result<Vec<RawRecord>> {
    let path = file_path.as_ref();
    info!("Parsing XTB export: {:?}", path);

    let file = std::fs::File::open(path).context("Failed to open XTB export")?;
    parse_xtb_reader(file, delimiter, source)
}

pub fn parse_xtb_reader<R: Read>(
    mut reader: R,
    delimiter: u8,
    source: &str,
) -> Result<Vec<RawRecord>> {
    let mut text = String::new();
    reader
        .read_to_string(&mut text)
        .context("Failed to read XTB export")?;

    let header: Vec<String> = text
        .lines()
        .next()
        .unwrap_or_default()
        .split(char::from(delimiter))
        .map(|cell| cell.trim().to_ascii_lowercase())
        .collect();
    let is_cash = header.iter().any(|h| h == "type") && header.iter().any(|h| h == "amount");

    if is_cash {
        parse_cash_operations(text.as_bytes(), delimiter, source)
    } else {
        parse_closed_positions(text.as_bytes(), delimiter, source)
    }
}

#[derive(Debug)]
struct CashLine {
    time: NaiveDateTime,
    kind: String,
    symbol: String,
    amount: Decimal,
}

fn parse_cash_operations(data: &[u8], delimiter: u8, source: &str) -> Result<Vec<RawRecord>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(data);

    let headers = reader
        .headers()
        .context("Failed to read XTB cash headers")?
        .clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
            .ok_or_else(|| anyhow!("Column '{}' not found in XTB cash operations", name))
    };

    let kind_idx = column("Type")?;
    let time_idx = column("Time")?;
    let symbol_idx = column("Symbol")?;
    let amount_idx = column("Amount")?;

    let mut lines = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let row = result.context("Failed to read XTB cash record")?;
        let row_num = idx + 2;

        let parsed = (|| -> Result<CashLine> {
            Ok(CashLine {
                time: parse_timestamp(row.get(time_idx).unwrap_or_default())?,
                kind: row.get(kind_idx).unwrap_or_default().to_string(),
                symbol: row.get(symbol_idx).unwrap_or_default().to_string(),
                amount: parse_decimal(row.get(amount_idx).unwrap_or_default())?,
            })
        })();

        match parsed {
            Ok(line) => lines.push(line),
            Err(e) => warn!("Skipping row {}: {}", row_num, e),
        }
    }
    lines.sort_by_key(|line| line.time);

    let mut records = Vec::new();
    for event in group_events(&lines) {
        records.extend(event_income(event, source));
    }

    info!("Parsed {} income records from XTB cash operations", records.len());
    Ok(records)
}

/// Split time-sorted lines into events: a line joins the current event when it
/// is at most `GROUP_WINDOW_SECS` after the previous line.
fn group_events(lines: &[CashLine]) -> Vec<&[CashLine]> {
    let mut events = Vec::new();
    let mut start = 0;
    for idx in 1..lines.len() {
        let gap = lines[idx].time - lines[idx - 1].time;
        if gap.num_seconds() > GROUP_WINDOW_SECS {
            events.push(&lines[start..idx]);
            start = idx;
        }
    }
    if start < lines.len() {
        events.push(&lines[start..]);
    }
    events
}

fn is_interest(kind: &str) -> bool {
    kind.eq_ignore_ascii_case("Free-funds Interest")
}

fn is_interest_tax(kind: &str) -> bool {
    kind.eq_ignore_ascii_case("Free-funds Interest Tax")
}

fn is_dividend(kind: &str) -> bool {
    // XTB spells it DIVIDENT
    kind.eq_ignore_ascii_case("DIVIDENT") || kind.eq_ignore_ascii_case("Dividend")
}

fn is_withholding_tax(kind: &str) -> bool {
    kind.eq_ignore_ascii_case("Withholding Tax")
}

/// Interest and per-symbol dividends of one event, dated at its first line
fn event_income(event: &[CashLine], source: &str) -> Vec<RawRecord> {
    let Some(first) = event.first() else {
        return Vec::new();
    };
    let date = first.time.date();
    let mut records = Vec::new();

    let interest: Decimal = event
        .iter()
        .filter(|l| is_interest(&l.kind))
        .map(|l| l.amount)
        .sum();
    let interest_tax: Decimal = event
        .iter()
        .filter(|l| is_interest_tax(&l.kind))
        .map(|l| l.amount)
        .sum();
    if interest > Decimal::ZERO {
        let mut record = RawRecord::new(TransactionKind::Interest, date, "EUR", source);
        record.amount = Some(interest);
        record.tax = Some(interest_tax.abs());
        records.push(record);
    }

    let mut dividends: BTreeMap<&str, (Decimal, Decimal)> = BTreeMap::new();
    for line in event {
        if is_dividend(&line.kind) {
            dividends.entry(line.symbol.as_str()).or_default().0 += line.amount;
        } else if is_withholding_tax(&line.kind) {
            dividends.entry(line.symbol.as_str()).or_default().1 += line.amount;
        }
    }
    for (symbol, (gross, tax)) in dividends {
        if gross <= Decimal::ZERO {
            debug!("Ignoring XTB tax-only movement for {} on {}", symbol, date);
            continue;
        }
        let mut record = RawRecord::new(TransactionKind::Dividend, date, "EUR", source);
        record.instrument = Some(symbol.to_string());
        record.ticker = Some(symbol.to_string());
        record.amount = Some(gross);
        record.tax = Some(tax.abs());
        records.push(record);
    }

    if records.is_empty() {
        debug!("Ignoring XTB cash event on {} ({} line(s))", first.time, event.len());
    }
    records
}

fn parse_timestamp(text: &str) -> Result<NaiveDateTime> {
    let text = text.trim();
    for format in ["%d/%m/%Y %H:%M:%S", "%d.%m.%Y %H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(dt);
        }
    }
    parse_date(text)?
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow!("Could not parse time: {}", text))
}

/// Column positions of the closed-positions report
#[derive(Debug)]
struct PositionColumns {
    name: usize,
    isin: Option<usize>,
    ticker: Option<usize>,
    volume: usize,
    open_date: usize,
    open_amount: usize,
    close_date: usize,
    close_amount: usize,
    commission: Option<usize>,
    rollovers: Option<usize>,
    swaps: Option<usize>,
    transaction_tax: Option<usize>,
    direction: Option<usize>,
    net_result: Option<usize>,
}

impl PositionColumns {
    /// The first header row names column groups (`Compra`, `Venta`, ...) and
    /// leaves the rest of a group blank; the second row names the sub-columns.
    fn from_headers(top: &StringRecord, sub: &StringRecord) -> Result<Self> {
        let width = top.len().max(sub.len());
        let mut names = Vec::with_capacity(width);
        let mut group = String::new();
        for idx in 0..width {
            let top_cell = top.get(idx).unwrap_or_default();
            if !top_cell.is_empty() {
                group = top_cell.to_lowercase();
            }
            names.push((group.clone(), sub.get(idx).unwrap_or_default().to_lowercase()));
        }

        let find = |group: &str, sub: &str| {
            names
                .iter()
                .position(|(g, s)| g.starts_with(group) && s.starts_with(sub))
        };
        let require = |group: &str, sub: &str| {
            find(group, sub).ok_or_else(|| {
                anyhow!("Column '{} {}' not found in XTB closed positions", group, sub)
            })
        };

        Ok(Self {
            name: require("nombre", "")?,
            isin: find("isin", ""),
            ticker: find("ticker", ""),
            volume: require("volumen", "")?,
            open_date: require("compra", "fecha")?,
            open_amount: require("compra", "importe")?,
            close_date: require("venta", "fecha")?,
            close_amount: require("venta", "importe")?,
            commission: find("comisi", ""),
            rollovers: find("rollover", ""),
            swaps: find("swap", ""),
            transaction_tax: find("impuesto", ""),
            direction: find("posici", ""),
            net_result: find("resultado", ""),
        })
    }
}

fn parse_closed_positions(data: &[u8], delimiter: u8, source: &str) -> Result<Vec<RawRecord>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(data);

    let mut rows = reader.records();
    let top = rows
        .next()
        .ok_or_else(|| anyhow!("XTB closed positions report is empty"))?
        .context("Failed to read XTB headers")?;
    let Some(sub) = rows.next() else {
        return Ok(Vec::new());
    };
    let columns = PositionColumns::from_headers(&top, &sub.context("Failed to read XTB headers")?)?;

    let mut records = Vec::new();
    for (idx, result) in rows.enumerate() {
        let row = result.context("Failed to read XTB position")?;
        let row_num = idx + 3;
        if row.iter().all(str::is_empty) {
            continue;
        }

        match parse_position(&row, &columns, source) {
            Ok([buy, sell]) => {
                records.push(buy);
                records.push(sell);
            }
            Err(e) => warn!("Skipping row {}: {}", row_num, e),
        }
    }

    info!("Parsed {} trades from XTB closed positions", records.len());
    Ok(records)
}

/// One closed position as its opening BUY and closing SELL
fn parse_position(
    row: &StringRecord,
    cols: &PositionColumns,
    source: &str,
) -> Result<[RawRecord; 2]> {
    let cell = |idx: usize| row.get(idx).unwrap_or_default();
    let optional = |idx: Option<usize>| -> Result<Decimal> {
        Ok(parse_optional_decimal(idx.and_then(|i| row.get(i)))?.unwrap_or(Decimal::ZERO))
    };

    let name = cell(cols.name);
    if name.is_empty() {
        return Err(anyhow!("Missing Nombre"));
    }
    let volume = parse_decimal(cell(cols.volume))?;
    if volume <= Decimal::ZERO {
        return Err(anyhow!("Volumen must be positive, got {}", volume));
    }

    let mut buy_date = parse_date(cell(cols.open_date))?;
    let mut sell_date = parse_date(cell(cols.close_date))?;
    let buy_amount = parse_decimal(cell(cols.open_amount))?.abs();
    let sell_amount = parse_decimal(cell(cols.close_amount))?.abs();

    let commission = optional(cols.commission)?.abs()
        + optional(cols.rollovers)?.abs()
        + optional(cols.swaps)?.abs();
    let transaction_tax = optional(cols.transaction_tax)?.abs();

    // Short positions list the closing date under Compra
    let is_short = cols
        .direction
        .and_then(|i| row.get(i))
        .is_some_and(|d| d.eq_ignore_ascii_case("Bajista"));
    if is_short {
        std::mem::swap(&mut buy_date, &mut sell_date);
    }

    if let Some(reported) = parse_optional_decimal(cols.net_result.and_then(|i| row.get(i)))? {
        let expected = sell_amount - buy_amount - commission;
        if (reported - expected).abs() > NET_RESULT_TOLERANCE {
            return Err(anyhow!(
                "net result {} of {} does not match {}",
                reported,
                name,
                expected
            ));
        }
    }

    let isin = cols
        .isin
        .and_then(|i| row.get(i))
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let ticker = cols
        .ticker
        .and_then(|i| row.get(i))
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let mut buy = RawRecord::new(TransactionKind::Buy, buy_date, "EUR", source);
    buy.instrument = Some(name.to_string());
    buy.isin = isin;
    buy.ticker = ticker;
    buy.quantity = Some(volume);
    buy.price = Some(buy_amount / volume);
    buy.fee = Some(Decimal::ZERO);

    let mut sell = RawRecord {
        kind: TransactionKind::Sell,
        date: sell_date,
        price: Some(sell_amount / volume),
        fee: Some(commission),
        ..buy.clone()
    };
    if !transaction_tax.is_zero() {
        sell.tax = Some(transaction_tax);
    }

    Ok([buy, sell])
}
