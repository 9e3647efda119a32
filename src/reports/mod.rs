// Reports module - end-to-end run from exports to yearly results

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

use crate::config::Config;
use crate::fx::{ecb, FxResolver};
use crate::importers::{Importer, RawRecord};
use crate::performance::{
    Processor, SavingsPerformance, SavingsReport, TradingPerformance, TradingReport,
};
use crate::transactions::{sort_chronologically, NormalizeFailure, Normalizer};
use crate::utils::{decimal_2dp, format_quantity};

/// Records contributed by one source
#[derive(Debug, Clone, Serialize)]
pub struct SourceSummary {
    pub name: String,
    pub records: usize,
}

/// Everything a renderer needs for one year
#[derive(Debug)]
pub struct PerformanceReport {
    pub year: i32,
    pub sources: Vec<SourceSummary>,
    /// Transactions that passed normalization, all years included
    pub transactions: usize,
    pub trading: TradingReport,
    pub savings: SavingsReport,
    pub normalization_failures: Vec<NormalizeFailure>,
}

impl PerformanceReport {
    pub fn has_failures(&self) -> bool {
        !self.normalization_failures.is_empty() || !self.trading.failures.is_empty()
    }
}

/// Run every importer, concatenating their records in order
pub fn load_sources(
    importers: &[Box<dyn Importer>],
) -> Result<(Vec<RawRecord>, Vec<SourceSummary>)> {
    let mut records = Vec::new();
    let mut summaries = Vec::new();

    for importer in importers {
        let loaded = importer
            .load()
            .with_context(|| format!("Source '{}' failed", importer.name()))?;
        info!("Source '{}': {} records", importer.name(), loaded.len());
        summaries.push(SourceSummary {
            name: importer.name().to_string(),
            records: loaded.len(),
        });
        records.extend(loaded);
    }

    Ok((records, summaries))
}

/// Normalize `records` and run both processors for `year`
pub fn compute(fx: &FxResolver, records: &[RawRecord], year: i32) -> PerformanceReport {
    let batch = Normalizer::new(fx).normalize_all(records);
    let mut transactions = batch.transactions;
    sort_chronologically(&mut transactions);

    let trading_processor = TradingPerformance::new(year);
    debug!("Running {} over {} transactions", trading_processor.name(), transactions.len());
    let trading = trading_processor.process(&transactions);

    let savings_processor = SavingsPerformance::new(year);
    debug!("Running {} over {} transactions", savings_processor.name(), transactions.len());
    let savings = savings_processor.process(&transactions);

    PerformanceReport {
        year,
        sources: Vec::new(),
        transactions: transactions.len(),
        trading,
        savings,
        normalization_failures: batch.failures,
    }
}

/// Full run: rates, every configured source, both processors
pub fn run(config: &Config, year: i32, rates_path: Option<&Path>) -> Result<PerformanceReport> {
    let rates_path = rates_path
        .map(Path::to_path_buf)
        .or_else(|| config.rates_path())
        .ok_or_else(|| anyhow!("No reference-rate file configured (set `rates` or pass --rates)"))?;

    let fx = FxResolver::new(ecb::load_ecb_csv(&rates_path)?);

    let importers: Vec<Box<dyn Importer>> = config
        .importers()
        .into_iter()
        .map(|importer| Box::new(importer) as Box<dyn Importer>)
        .collect();
    if importers.is_empty() {
        return Err(anyhow!("No sources configured"));
    }
    let (records, sources) = load_sources(&importers)?;

    let mut report = compute(&fx, &records, year);
    report.sources = sources;

    info!(
        "Report {}: {} transactions, trading P/L {}, savings {}",
        year,
        report.transactions,
        report.trading.total_gain_eur(),
        report.savings.total_eur
    );
    Ok(report)
}

/// One CSV row per realized gain
#[derive(Debug, Serialize)]
struct GainRow<'a> {
    instrument: &'a str,
    isin: &'a str,
    disposal_date: String,
    quantity: String,
    proceeds_eur: String,
    cost_basis_eur: String,
    fees_eur: String,
    gain_eur: String,
    lots: usize,
}

/// Write realized gains as CSV, header included even with no rows
pub fn export_gains_csv<W: Write>(trading: &TradingReport, writer: W) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer);

    wtr.write_record([
        "instrument",
        "isin",
        "disposal_date",
        "quantity",
        "proceeds_eur",
        "cost_basis_eur",
        "fees_eur",
        "gain_eur",
        "lots",
    ])
    .context("CSV write error")?;

    for gain in trading.gains() {
        wtr.serialize(GainRow {
            instrument: &gain.instrument.name,
            isin: gain.instrument.isin.as_deref().unwrap_or(""),
            disposal_date: gain.disposal_date.format("%Y-%m-%d").to_string(),
            quantity: format_quantity(gain.quantity),
            proceeds_eur: decimal_2dp(gain.proceeds_eur),
            cost_basis_eur: decimal_2dp(gain.cost_basis_eur),
            fees_eur: decimal_2dp(gain.fees_eur),
            gain_eur: decimal_2dp(gain.gain_eur),
            lots: gain.matched_lots.len(),
        })
        .context("CSV write error")?;
    }
    wtr.flush().context("CSV write error")?;
    Ok(())
}

/// [`export_gains_csv`] into a new file at `path`
pub fn write_gains_csv(trading: &TradingReport, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Cannot create {}", path.display()))?;
    export_gains_csv(trading, std::io::BufWriter::new(file))?;
    info!("Exported {} realized gains to {:?}", trading.gains().count(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fx::{FxRatePoint, FxRateTable};
    use crate::importers::{FileImporter, SourceFormat};
    use crate::transactions::TransactionKind;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    struct StaticImporter(Vec<RawRecord>);

    impl Importer for StaticImporter {
        fn name(&self) -> &str {
            "static"
        }

        fn load(&self) -> Result<Vec<RawRecord>> {
            Ok(self.0.clone())
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn trade(kind: TransactionKind, d: NaiveDate, qty: i64, price: i64, currency: &str) -> RawRecord {
        RawRecord {
            instrument: Some("ACME".to_string()),
            quantity: Some(qty.into()),
            price: Some(price.into()),
            ..RawRecord::new(kind, d, currency, "static")
        }
    }

    #[test]
    fn test_compute_end_to_end() {
        let fx = FxResolver::new(
            FxRateTable::from_points(vec![FxRatePoint::new(date(2024, 1, 2), "USD", dec!(0.5))])
                .unwrap(),
        );
        let importer = StaticImporter(vec![
            // Input order deliberately not chronological
            trade(TransactionKind::Sell, date(2024, 6, 1), 10, 30, "USD"),
            trade(TransactionKind::Buy, date(2024, 1, 3), 10, 20, "USD"),
            RawRecord {
                amount: Some(dec!(4)),
                ..RawRecord::new(TransactionKind::Interest, date(2024, 2, 1), "EUR", "Bank")
            },
            trade(TransactionKind::Buy, date(2024, 1, 3), 1, 1, "JPY"),
        ]);

        let importers: Vec<Box<dyn Importer>> = vec![Box::new(importer)];
        let (records, sources) = load_sources(&importers).unwrap();
        assert_eq!(sources[0].records, 4);

        let report = compute(&fx, &records, 2024);
        assert_eq!(report.transactions, 3);
        assert_eq!(report.normalization_failures.len(), 1);
        assert_eq!(report.trading.total_gain_eur(), dec!(50));
        assert_eq!(report.savings.total_eur, dec!(4));
        assert!(report.has_failures());
    }

    #[test]
    fn test_load_sources_mixes_importer_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let interest = dir.path().join("interest.csv");
        std::fs::write(&interest, "year;quantity;currency;tax;source\n2024;3,5;EUR;0,5;Bank\n").unwrap();

        let importers: Vec<Box<dyn Importer>> = vec![
            Box::new(StaticImporter(vec![trade(
                TransactionKind::Buy,
                date(2024, 1, 3),
                1,
                10,
                "EUR",
            )])),
            Box::new(FileImporter::new("Manual", SourceFormat::ManualInterest, &interest)),
        ];

        let (records, sources) = load_sources(&importers).unwrap();
        let names: Vec<&str> = sources.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["static", "Manual"]);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].kind, TransactionKind::Interest);
        assert_eq!(records[1].amount, Some(dec!(3.5)));
    }

    #[test]
    fn test_failing_source_is_named() {
        let importers: Vec<Box<dyn Importer>> = vec![Box::new(FileImporter::new(
            "Broker",
            SourceFormat::CanonicalCsv,
            "/no/such/export.csv",
        ))];
        let err = load_sources(&importers).unwrap_err();
        assert_eq!(err.to_string(), "Source 'Broker' failed");
    }

    #[test]
    fn test_export_gains_csv() {
        let fx = FxResolver::new(FxRateTable::default());
        let records = vec![
            trade(TransactionKind::Buy, date(2024, 1, 3), 10, 20, "EUR"),
            trade(TransactionKind::Sell, date(2024, 6, 1), 4, 25, "EUR"),
        ];
        let report = compute(&fx, &records, 2024);

        let mut out = Vec::new();
        export_gains_csv(&report.trading, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("instrument,isin,disposal_date"));
        assert_eq!(lines[1], "ACME,,2024-06-01,4,100.00,80.00,0.00,20.00,1");
    }

    #[test]
    fn test_export_without_gains_has_header_only() {
        let fx = FxResolver::new(FxRateTable::default());
        let report = compute(&fx, &[], 2024);

        let mut out = Vec::new();
        export_gains_csv(&report.trading, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 1);
    }
}
