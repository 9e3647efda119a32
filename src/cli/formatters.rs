//! Output formatting module for CLI display
//!
//! This module handles all terminal output formatting, separating
//! the concerns of data calculation from presentation.

use chrono::NaiveDate;
use colored::Colorize;
use itertools::Itertools;
use rust_decimal::Decimal;
use serde::Serialize;
use tabled::{
    settings::{object::Columns, Alignment, Style},
    Table, Tabled,
};

use crate::fx::ResolvedRate;
use crate::importers::RawRecord;
use crate::performance::{SavingsReport, TradingReport};
use crate::reports::{PerformanceReport, SourceSummary};
use crate::utils::{decimal_2dp, format_amount, format_eur, format_quantity};

/// Which parts of a report to render
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    All,
    Trading,
    Savings,
}

impl Section {
    fn trading(self) -> bool {
        matches!(self, Section::All | Section::Trading)
    }

    fn savings(self) -> bool {
        matches!(self, Section::All | Section::Savings)
    }
}

fn colored_eur(value: Decimal) -> String {
    if value >= Decimal::ZERO {
        format_eur(value).green().to_string()
    } else {
        format_eur(value).red().to_string()
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn opt_quantity(value: Option<Decimal>) -> String {
    value.map(format_quantity).unwrap_or_default()
}

fn opt_amount(value: Option<Decimal>) -> String {
    value.map(format_amount).unwrap_or_default()
}

// ============ Terminal tables ============

/// Format a full or partial report for terminal output
pub fn format_report_table(report: &PerformanceReport, section: Section) -> String {
    let mut output = format!(
        "\n{} Performance {} ({} transactions from {})\n",
        "📊".cyan().bold(),
        report.year,
        report.transactions,
        report.sources.iter().map(|s| s.name.as_str()).join(", ")
    );

    if section.trading() {
        output.push_str(&format_trading_table(&report.trading));
    }
    if section.savings() {
        output.push_str(&format_savings_table(&report.savings));
    }

    output
}

/// Realized gains per disposal, then per instrument
pub fn format_trading_table(trading: &TradingReport) -> String {
    let mut output = format!("\n{} Trading - {}\n\n", "📈".cyan().bold(), trading.year);

    if trading.instruments.is_empty() {
        output.push_str(&format!(
            "{} No disposals in {}\n",
            "ℹ".blue().bold(),
            trading.year
        ));
        return output;
    }

    #[derive(Tabled)]
    struct GainRow {
        #[tabled(rename = "Instrument")]
        instrument: String,
        #[tabled(rename = "Sold")]
        date: String,
        #[tabled(rename = "Acquired")]
        acquired: String,
        #[tabled(rename = "Quantity")]
        quantity: String,
        #[tabled(rename = "Proceeds")]
        proceeds: String,
        #[tabled(rename = "Cost Basis")]
        cost: String,
        #[tabled(rename = "Fees")]
        fees: String,
        #[tabled(rename = "P&L")]
        gain: String,
    }

    let rows: Vec<GainRow> = trading
        .gains()
        .map(|g| GainRow {
            instrument: g.instrument.name.clone(),
            date: format_date(g.disposal_date),
            acquired: g
                .matched_lots
                .iter()
                .map(|lot| format_date(lot.acquisition_date))
                .dedup()
                .join(", "),
            quantity: format_quantity(g.quantity),
            proceeds: format_eur(g.proceeds_eur),
            cost: format_eur(g.cost_basis_eur),
            fees: format_eur(g.fees_eur),
            gain: colored_eur(g.gain_eur),
        })
        .collect();

    let mut table = Table::new(&rows);
    table.with(Style::modern());
    // Right-align the numeric columns
    table.modify(Columns::new(3..), Alignment::right());
    output.push_str(&table.to_string());
    output.push('\n');

    #[derive(Tabled)]
    struct InstrumentRow {
        #[tabled(rename = "Instrument")]
        instrument: String,
        #[tabled(rename = "ISIN")]
        isin: String,
        #[tabled(rename = "Disposals")]
        disposals: usize,
        #[tabled(rename = "P&L")]
        gain: String,
    }

    let summary: Vec<InstrumentRow> = trading
        .instruments
        .iter()
        .map(|i| InstrumentRow {
            instrument: i.instrument.name.clone(),
            isin: i.instrument.isin.clone().unwrap_or_default(),
            disposals: i.gains.len(),
            gain: colored_eur(i.total_gain_eur),
        })
        .collect();

    let mut table = Table::new(&summary);
    table.with(Style::rounded());
    table.modify(Columns::new(2..), Alignment::right());
    output.push_str(&format!("\n{}\n", table));

    output.push_str(&format!("\n{}", "━".repeat(60).bright_black()));
    output.push_str(&format!(
        "\n{:<20} {}",
        "Proceeds:".bold(),
        format_eur(trading.total_proceeds_eur())
    ));
    output.push_str(&format!(
        "\n{:<20} {}",
        "Cost Basis:".bold(),
        format_eur(trading.total_cost_basis_eur())
    ));
    output.push_str(&format!(
        "\n{:<20} {}",
        "Fees:".bold(),
        format_eur(trading.total_fees_eur())
    ));
    output.push_str(&format!(
        "\n{:<20} {}\n",
        "Total P&L:".bold(),
        colored_eur(trading.total_gain_eur())
    ));

    output
}

/// Income totals per instrument and kind
pub fn format_savings_table(savings: &SavingsReport) -> String {
    let mut output = format!("\n{} Savings - {}\n\n", "💰".cyan().bold(), savings.year);

    if savings.totals.is_empty() {
        output.push_str(&format!(
            "{} No dividends or interest in {}\n",
            "ℹ".blue().bold(),
            savings.year
        ));
        return output;
    }

    #[derive(Tabled)]
    struct SavingsRow {
        #[tabled(rename = "Instrument")]
        instrument: String,
        #[tabled(rename = "Kind")]
        kind: String,
        #[tabled(rename = "Currency")]
        currency: String,
        #[tabled(rename = "Payments")]
        payments: usize,
        #[tabled(rename = "Gross")]
        total: String,
        #[tabled(rename = "Withheld")]
        withheld: String,
    }

    let rows: Vec<SavingsRow> = savings
        .totals
        .iter()
        .map(|t| SavingsRow {
            instrument: t.instrument.name.clone(),
            kind: t.kind.to_string(),
            currency: t.currency.clone(),
            payments: t.payments,
            total: format_eur(t.total_eur),
            withheld: format_eur(t.withheld_eur),
        })
        .collect();

    let mut table = Table::new(&rows);
    table.with(Style::modern());
    table.modify(Columns::new(3..), Alignment::right());
    output.push_str(&table.to_string());

    output.push_str(&format!("\n\n{}", "━".repeat(60).bright_black()));
    output.push_str(&format!(
        "\n{:<20} {}",
        "Total Income:".bold(),
        format_eur(savings.total_eur).green()
    ));
    if savings.withheld_eur > Decimal::ZERO {
        output.push_str(&format!(
            "\n{:<20} {}",
            "Withheld:".bold(),
            format_eur(savings.withheld_eur).yellow()
        ));
    }
    output.push('\n');

    output
}

/// One line per record that was left out of the results
pub fn format_warnings(report: &PerformanceReport) -> Vec<String> {
    let normalization = report.normalization_failures.iter().map(|f| {
        format!(
            "{} Skipped record #{} from '{}': {}",
            "⚠".yellow().bold(),
            f.index + 1,
            f.source,
            f.error
        )
    });
    let trading = report.trading.failures.iter().map(|f| {
        format!(
            "{} FIFO matching stopped for {}: {}",
            "⚠".yellow().bold(),
            f.instrument,
            f.error
        )
    });
    normalization.chain(trading).collect()
}

/// Preview of raw records parsed from a single export
pub fn format_import_preview(records: &[RawRecord], limit: usize) -> String {
    if records.is_empty() {
        return format!("{} No records found\n", "ℹ".blue().bold());
    }

    #[derive(Tabled)]
    struct RecordRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Kind")]
        kind: String,
        #[tabled(rename = "Instrument")]
        instrument: String,
        #[tabled(rename = "Quantity")]
        quantity: String,
        #[tabled(rename = "Price")]
        price: String,
        #[tabled(rename = "Amount")]
        amount: String,
        #[tabled(rename = "Fee")]
        fee: String,
        #[tabled(rename = "Currency")]
        currency: String,
    }

    let rows: Vec<RecordRow> = records
        .iter()
        .take(limit)
        .map(|r| RecordRow {
            date: format_date(r.date),
            kind: r.kind.to_string(),
            instrument: r.label().to_string(),
            quantity: opt_quantity(r.quantity),
            price: opt_amount(r.price),
            amount: opt_amount(r.amount),
            fee: opt_amount(r.fee),
            currency: r.currency.clone(),
        })
        .collect();

    let mut table = Table::new(&rows);
    table.with(Style::rounded());
    table.modify(Columns::new(3..7), Alignment::right());

    let mut output = format!(
        "\n{} Found {} records\n\n{}\n",
        "✓".green().bold(),
        records.len(),
        table
    );
    if records.len() > limit {
        output.push_str(&format!("\n... and {} more records\n", records.len() - limit));
    }
    output
}

/// A resolved rate, noting when an earlier publication was used
pub fn format_rate(currency: &str, date: NaiveDate, resolved: &ResolvedRate) -> String {
    let mut output = format!(
        "1 {} = {} EUR on {}",
        currency.to_ascii_uppercase().bold(),
        resolved.rate.normalize(),
        format_date(date)
    );
    if resolved.effective_date != date {
        output.push_str(&format!(
            " {}",
            format!("(published {})", format_date(resolved.effective_date)).bright_black()
        ));
    }
    output
}

// ============ JSON ============

#[derive(Serialize)]
struct JsonLot {
    acquisition_date: NaiveDate,
    quantity: String,
    unit_cost_eur: String,
    cost_eur: String,
    acquisition_fee_eur: String,
}

#[derive(Serialize)]
struct JsonGain {
    disposal_date: NaiveDate,
    quantity: String,
    proceeds_eur: String,
    cost_basis_eur: String,
    fees_eur: String,
    gain_eur: String,
    matched_lots: Vec<JsonLot>,
}

#[derive(Serialize)]
struct JsonInstrument {
    instrument: String,
    name: String,
    isin: Option<String>,
    total_gain_eur: String,
    gains: Vec<JsonGain>,
}

#[derive(Serialize)]
struct JsonTrading {
    instruments: Vec<JsonInstrument>,
    total_proceeds_eur: String,
    total_cost_basis_eur: String,
    total_fees_eur: String,
    total_gain_eur: String,
}

#[derive(Serialize)]
struct JsonSavingsTotal {
    instrument: String,
    name: String,
    kind: String,
    currency: String,
    payments: usize,
    total_eur: String,
    withheld_eur: String,
}

#[derive(Serialize)]
struct JsonSavings {
    totals: Vec<JsonSavingsTotal>,
    total_eur: String,
    withheld_eur: String,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    year: i32,
    sources: &'a [SourceSummary],
    transactions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    trading: Option<JsonTrading>,
    #[serde(skip_serializing_if = "Option::is_none")]
    savings: Option<JsonSavings>,
    warnings: Vec<String>,
}

fn json_trading(trading: &TradingReport) -> JsonTrading {
    let instruments = trading
        .instruments
        .iter()
        .map(|i| JsonInstrument {
            instrument: i.instrument.id.clone(),
            name: i.instrument.name.clone(),
            isin: i.instrument.isin.clone(),
            total_gain_eur: decimal_2dp(i.total_gain_eur),
            gains: i
                .gains
                .iter()
                .map(|g| JsonGain {
                    disposal_date: g.disposal_date,
                    quantity: format_quantity(g.quantity),
                    proceeds_eur: decimal_2dp(g.proceeds_eur),
                    cost_basis_eur: decimal_2dp(g.cost_basis_eur),
                    fees_eur: decimal_2dp(g.fees_eur),
                    gain_eur: decimal_2dp(g.gain_eur),
                    matched_lots: g
                        .matched_lots
                        .iter()
                        .map(|lot| JsonLot {
                            acquisition_date: lot.acquisition_date,
                            quantity: format_quantity(lot.quantity),
                            unit_cost_eur: lot.unit_cost_eur.normalize().to_string(),
                            cost_eur: decimal_2dp(lot.cost_eur),
                            acquisition_fee_eur: decimal_2dp(lot.acquisition_fee_eur),
                        })
                        .collect(),
                })
                .collect(),
        })
        .collect();

    JsonTrading {
        instruments,
        total_proceeds_eur: decimal_2dp(trading.total_proceeds_eur()),
        total_cost_basis_eur: decimal_2dp(trading.total_cost_basis_eur()),
        total_fees_eur: decimal_2dp(trading.total_fees_eur()),
        total_gain_eur: decimal_2dp(trading.total_gain_eur()),
    }
}

fn json_savings(savings: &SavingsReport) -> JsonSavings {
    JsonSavings {
        totals: savings
            .totals
            .iter()
            .map(|t| JsonSavingsTotal {
                instrument: t.instrument.id.clone(),
                name: t.instrument.name.clone(),
                kind: t.kind.to_string(),
                currency: t.currency.clone(),
                payments: t.payments,
                total_eur: decimal_2dp(t.total_eur),
                withheld_eur: decimal_2dp(t.withheld_eur),
            })
            .collect(),
        total_eur: decimal_2dp(savings.total_eur),
        withheld_eur: decimal_2dp(savings.withheld_eur),
    }
}

/// Format a report for JSON output; warnings are plain text
pub fn format_report_json(report: &PerformanceReport, section: Section) -> String {
    let warnings = report
        .normalization_failures
        .iter()
        .map(|f| format!("{} record #{}: {}", f.source, f.index + 1, f.error))
        .chain(
            report
                .trading
                .failures
                .iter()
                .map(|f| format!("{}: {}", f.instrument, f.error)),
        )
        .collect();

    let json_report = JsonReport {
        year: report.year,
        sources: &report.sources,
        transactions: report.transactions,
        trading: section.trading().then(|| json_trading(&report.trading)),
        savings: section.savings().then(|| json_savings(&report.savings)),
        warnings,
    };

    serde_json::to_string_pretty(&json_report)
        .unwrap_or_else(|e| format!(r#"{{"error": "JSON serialization failed: {}"}}"#, e))
}

/// Raw records as JSON
pub fn format_import_json(records: &[RawRecord]) -> String {
    serde_json::to_string_pretty(records)
        .unwrap_or_else(|e| format!(r#"{{"error": "JSON serialization failed: {}"}}"#, e))
}

pub fn format_rate_json(currency: &str, date: NaiveDate, resolved: &ResolvedRate) -> String {
    #[derive(Serialize)]
    struct JsonRate {
        currency: String,
        date: NaiveDate,
        effective_date: NaiveDate,
        rate: String,
    }

    let json_rate = JsonRate {
        currency: currency.to_ascii_uppercase(),
        date,
        effective_date: resolved.effective_date,
        rate: resolved.rate.normalize().to_string(),
    };

    serde_json::to_string_pretty(&json_rate)
        .unwrap_or_else(|e| format!(r#"{{"error": "JSON serialization failed: {}"}}"#, e))
}
