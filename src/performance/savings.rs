use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

use super::Processor;
use crate::transactions::{CanonicalTransaction, Instrument, Operation, TransactionKind};

/// EUR income of one instrument and kind over a year
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SavingsTotal {
    pub instrument: Instrument,
    /// Native currency of the last record seen, for display only
    pub currency: String,
    pub kind: TransactionKind,
    pub year: i32,
    pub total_eur: Decimal,
    pub withheld_eur: Decimal,
    pub payments: usize,
}

/// Sum DIVIDEND and INTEREST amounts dated in `year` per (instrument, kind).
///
/// Groups without any payment in the year produce no record.
pub fn aggregate(transactions: &[CanonicalTransaction], year: i32) -> Vec<SavingsTotal> {
    let mut groups: BTreeMap<(&str, TransactionKind), SavingsTotal> = BTreeMap::new();

    for tx in transactions.iter().filter(|tx| tx.year() == year) {
        let income = match &tx.operation {
            Operation::Dividend(income) | Operation::Interest(income) => income,
            Operation::Buy(_) | Operation::Sell(_) => continue,
        };

        let total = groups
            .entry((tx.instrument.id.as_str(), tx.kind()))
            .or_insert_with(|| SavingsTotal {
                instrument: tx.instrument.clone(),
                currency: tx.currency.clone(),
                kind: tx.kind(),
                year,
                total_eur: Decimal::ZERO,
                withheld_eur: Decimal::ZERO,
                payments: 0,
            });

        total.total_eur += income.gross_eur;
        total.withheld_eur += income.withheld_eur;
        total.payments += 1;
        total.currency.clone_from(&tx.currency);
    }

    groups.into_values().collect()
}

/// Savings income of one year
#[derive(Debug, Clone, Serialize)]
pub struct SavingsReport {
    pub year: i32,
    pub totals: Vec<SavingsTotal>,
    pub total_eur: Decimal,
    pub withheld_eur: Decimal,
    /// In-year income records, by date
    pub records: Vec<CanonicalTransaction>,
}

impl SavingsReport {
    /// Total for one kind across instruments
    pub fn total_for(&self, kind: TransactionKind) -> Decimal {
        self.totals
            .iter()
            .filter(|t| t.kind == kind)
            .map(|t| t.total_eur)
            .sum()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SavingsPerformance {
    pub year: i32,
}

impl SavingsPerformance {
    pub fn new(year: i32) -> Self {
        Self { year }
    }
}

impl Processor for SavingsPerformance {
    type Output = SavingsReport;

    fn name(&self) -> &'static str {
        "savings"
    }

    fn process(&self, transactions: &[CanonicalTransaction]) -> SavingsReport {
        // Stable sort keeps ties in input order, so the last-seen currency
        // of each group is deterministic.
        let mut records: Vec<CanonicalTransaction> = transactions
            .iter()
            .filter(|tx| tx.year() == self.year && !tx.kind().is_trade())
            .cloned()
            .collect();
        records.sort_by_key(|tx| (tx.date, tx.seq));

        let totals = aggregate(&records, self.year);
        let total_eur: Decimal = totals.iter().map(|t| t.total_eur).sum();
        let withheld_eur: Decimal = totals.iter().map(|t| t.withheld_eur).sum();

        info!(
            "Savings {}: {} records across {} groups",
            self.year,
            records.len(),
            totals.len()
        );

        SavingsReport {
            year: self.year,
            totals,
            total_eur,
            withheld_eur,
            records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transactions::Income;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn income(seq: usize, name: &str, kind: TransactionKind, date: NaiveDate, eur: Decimal) -> CanonicalTransaction {
        let payload = Income {
            gross: eur,
            withheld: Decimal::ZERO,
            gross_eur: eur,
            withheld_eur: Decimal::ZERO,
        };
        CanonicalTransaction {
            seq,
            instrument: Instrument::new(name, None, None),
            date,
            currency: "EUR".to_string(),
            source: "TEST".to_string(),
            rate: Decimal::ONE,
            operation: match kind {
                TransactionKind::Dividend => Operation::Dividend(payload),
                _ => Operation::Interest(payload),
            },
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_groups_by_instrument_and_kind() {
        let txs = vec![
            income(0, "Y", TransactionKind::Dividend, date(2024, 3, 1), dec!(10)),
            income(1, "Y", TransactionKind::Dividend, date(2024, 9, 1), dec!(5)),
            income(2, "Y", TransactionKind::Interest, date(2024, 9, 1), dec!(1)),
            income(3, "Z", TransactionKind::Dividend, date(2024, 9, 1), dec!(2)),
        ];

        let totals = aggregate(&txs, 2024);
        assert_eq!(totals.len(), 3);
        assert_eq!(totals[0].instrument.id, "Y");
        assert_eq!(totals[0].kind, TransactionKind::Dividend);
        assert_eq!(totals[0].total_eur, dec!(15));
        assert_eq!(totals[0].payments, 2);
        assert_eq!(totals[1].kind, TransactionKind::Interest);
        assert_eq!(totals[2].instrument.id, "Z");
    }

    #[test]
    fn test_other_years_are_excluded() {
        let txs = vec![
            income(0, "Y", TransactionKind::Dividend, date(2023, 12, 31), dec!(10)),
            income(1, "Y", TransactionKind::Dividend, date(2025, 1, 1), dec!(5)),
        ];
        assert!(aggregate(&txs, 2024).is_empty());
    }

    #[test]
    fn test_report_totals_and_record_order() {
        let txs = vec![
            income(0, "Y", TransactionKind::Dividend, date(2024, 9, 1), dec!(10)),
            income(1, "Bank", TransactionKind::Interest, date(2024, 2, 1), dec!(3)),
        ];
        let report = SavingsPerformance::new(2024).process(&txs);
        assert_eq!(report.total_eur, dec!(13));
        assert_eq!(report.total_for(TransactionKind::Interest), dec!(3));
        assert_eq!(report.records[0].seq, 1);
    }
}
