//! Canonical transactions and the normalizer that produces them
//!
//! The normalizer is the single place where native-currency amounts are
//! converted to EUR; everything downstream of it works in EUR only.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

use crate::error::PerformanceError;
use crate::fx::FxResolver;
use crate::importers::RawRecord;

static ISIN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{2}[A-Z0-9]{10}$").expect("ISIN pattern is valid"));

/// Transaction kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionKind {
    Buy,
    Sell,
    Dividend,
    Interest,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Buy => "BUY",
            TransactionKind::Sell => "SELL",
            TransactionKind::Dividend => "DIVIDEND",
            TransactionKind::Interest => "INTEREST",
        }
    }

    pub fn is_trade(&self) -> bool {
        matches!(self, TransactionKind::Buy | TransactionKind::Sell)
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" | "COMPRA" | "B" => Ok(TransactionKind::Buy),
            "SELL" | "VENTA" | "S" => Ok(TransactionKind::Sell),
            "DIVIDEND" | "DIVIDENDO" | "DIV" => Ok(TransactionKind::Dividend),
            "INTEREST" | "INTERESES" | "INT" => Ok(TransactionKind::Interest),
            _ => Err(()),
        }
    }
}

/// Traded or income-paying instrument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    /// ISIN when known, otherwise the name
    pub id: String,
    pub name: String,
    pub isin: Option<String>,
    pub ticker: Option<String>,
}

impl Instrument {
    pub fn new(name: impl Into<String>, isin: Option<String>, ticker: Option<String>) -> Self {
        let name = name.into();
        let id = isin.clone().unwrap_or_else(|| name.clone());
        Self {
            id,
            name,
            isin,
            ticker,
        }
    }
}

/// BUY/SELL payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub fee: Decimal,
    pub unit_price_eur: Decimal,
    pub fee_eur: Decimal,
}

/// DIVIDEND/INTEREST payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Income {
    pub gross: Decimal,
    pub withheld: Decimal,
    pub gross_eur: Decimal,
    pub withheld_eur: Decimal,
}

/// Kind-specific payload of a canonical transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "UPPERCASE")]
pub enum Operation {
    Buy(Trade),
    Sell(Trade),
    Dividend(Income),
    Interest(Income),
}

/// A validated transaction with its EUR amounts attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalTransaction {
    /// Position in the input stream, used as the same-date tie-break
    pub seq: usize,
    pub instrument: Instrument,
    pub date: NaiveDate,
    pub currency: String,
    pub source: String,
    /// Rate-to-EUR applied to every amount of this transaction
    pub rate: Decimal,
    pub operation: Operation,
}

impl CanonicalTransaction {
    pub fn kind(&self) -> TransactionKind {
        match self.operation {
            Operation::Buy(_) => TransactionKind::Buy,
            Operation::Sell(_) => TransactionKind::Sell,
            Operation::Dividend(_) => TransactionKind::Dividend,
            Operation::Interest(_) => TransactionKind::Interest,
        }
    }

    /// Units traded; income counts as a single unit
    pub fn quantity(&self) -> Decimal {
        match &self.operation {
            Operation::Buy(t) | Operation::Sell(t) => t.quantity,
            Operation::Dividend(_) | Operation::Interest(_) => Decimal::ONE,
        }
    }

    /// Native unit price; the gross amount for income
    pub fn unit_price(&self) -> Decimal {
        match &self.operation {
            Operation::Buy(t) | Operation::Sell(t) => t.unit_price,
            Operation::Dividend(i) | Operation::Interest(i) => i.gross,
        }
    }

    pub fn fee(&self) -> Decimal {
        match &self.operation {
            Operation::Buy(t) | Operation::Sell(t) => t.fee,
            Operation::Dividend(_) | Operation::Interest(_) => Decimal::ZERO,
        }
    }

    /// `quantity × unit price` in EUR, fees excluded
    pub fn amount_eur(&self) -> Decimal {
        match &self.operation {
            Operation::Buy(t) | Operation::Sell(t) => t.quantity * t.unit_price_eur,
            Operation::Dividend(i) | Operation::Interest(i) => i.gross_eur,
        }
    }

    pub fn year(&self) -> i32 {
        use chrono::Datelike;
        self.date.year()
    }
}

/// Stable chronological order: by date, then by input position
pub fn sort_chronologically(transactions: &mut [CanonicalTransaction]) {
    transactions.sort_by_key(|tx| (tx.date, tx.seq));
}

/// A raw record that could not be normalized
#[derive(Debug)]
pub struct NormalizeFailure {
    pub index: usize,
    pub source: String,
    pub error: PerformanceError,
}

/// Output of normalizing a whole batch
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub transactions: Vec<CanonicalTransaction>,
    pub failures: Vec<NormalizeFailure>,
}

/// Converts raw parser output into canonical EUR-denominated transactions
pub struct Normalizer<'a> {
    fx: &'a FxResolver,
}

impl<'a> Normalizer<'a> {
    pub fn new(fx: &'a FxResolver) -> Self {
        Self { fx }
    }

    /// Normalize a single record; `seq` is its position in the input stream
    pub fn normalize(
        &self,
        seq: usize,
        raw: &RawRecord,
    ) -> Result<CanonicalTransaction, PerformanceError> {
        let instrument = resolve_instrument(raw)?;
        let invalid = |reason: String| PerformanceError::ValidationError {
            instrument: instrument.id.clone(),
            date: raw.date,
            kind: raw.kind.as_str().to_string(),
            reason,
        };

        let currency = raw.currency.trim().to_ascii_uppercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(invalid(format!("invalid currency code '{}'", raw.currency)));
        }

        let operation_fields = match raw.kind {
            TransactionKind::Buy | TransactionKind::Sell => {
                let quantity = raw
                    .quantity
                    .ok_or_else(|| invalid("missing quantity".to_string()))?;
                let unit_price = raw
                    .price
                    .ok_or_else(|| invalid("missing unit price".to_string()))?;
                let fee = raw.fee.unwrap_or(Decimal::ZERO);

                if quantity <= Decimal::ZERO {
                    return Err(invalid(format!("quantity must be positive, got {}", quantity)));
                }
                if unit_price < Decimal::ZERO {
                    return Err(invalid(format!("negative unit price {}", unit_price)));
                }
                if fee < Decimal::ZERO {
                    return Err(invalid(format!("negative fee {}", fee)));
                }
                Fields::Trade {
                    quantity,
                    unit_price,
                    fee,
                }
            }
            TransactionKind::Dividend | TransactionKind::Interest => {
                let gross = raw
                    .amount
                    .ok_or_else(|| invalid("missing gross amount".to_string()))?;
                let withheld = raw.tax.unwrap_or(Decimal::ZERO);

                if gross < Decimal::ZERO {
                    return Err(invalid(format!("negative gross amount {}", gross)));
                }
                if withheld < Decimal::ZERO {
                    return Err(invalid(format!("negative withheld tax {}", withheld)));
                }
                Fields::Income { gross, withheld }
            }
        };

        let rate = self.fx.rate(raw.date, &currency)?;

        let operation = match (raw.kind, operation_fields) {
            (
                kind,
                Fields::Trade {
                    quantity,
                    unit_price,
                    fee,
                },
            ) => {
                let trade = Trade {
                    quantity,
                    unit_price,
                    fee,
                    unit_price_eur: unit_price * rate,
                    fee_eur: fee * rate,
                };
                if kind == TransactionKind::Buy {
                    Operation::Buy(trade)
                } else {
                    Operation::Sell(trade)
                }
            }
            (kind, Fields::Income { gross, withheld }) => {
                let income = Income {
                    gross,
                    withheld,
                    gross_eur: gross * rate,
                    withheld_eur: withheld * rate,
                };
                if kind == TransactionKind::Dividend {
                    Operation::Dividend(income)
                } else {
                    Operation::Interest(income)
                }
            }
        };

        Ok(CanonicalTransaction {
            seq,
            instrument,
            date: raw.date,
            currency,
            source: raw.source.clone(),
            rate,
            operation,
        })
    }

    /// Normalize every record, collecting failures instead of stopping at the first
    pub fn normalize_all(&self, records: &[RawRecord]) -> NormalizedBatch {
        let mut batch = NormalizedBatch::default();

        for (index, raw) in records.iter().enumerate() {
            match self.normalize(index, raw) {
                Ok(tx) => batch.transactions.push(tx),
                Err(error) => {
                    warn!("Record {} from {} rejected: {}", index + 1, raw.source, error);
                    batch.failures.push(NormalizeFailure {
                        index,
                        source: raw.source.clone(),
                        error,
                    });
                }
            }
        }

        debug!(
            "Normalized {} records ({} rejected)",
            batch.transactions.len(),
            batch.failures.len()
        );
        batch
    }
}

enum Fields {
    Trade {
        quantity: Decimal,
        unit_price: Decimal,
        fee: Decimal,
    },
    Income {
        gross: Decimal,
        withheld: Decimal,
    },
}

fn resolve_instrument(raw: &RawRecord) -> Result<Instrument, PerformanceError> {
    let isin = raw
        .isin
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_ascii_uppercase);
    let name = raw
        .instrument
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let ticker = raw
        .ticker
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_ascii_uppercase);

    let name = match (name, &isin, raw.kind) {
        (Some(name), _, _) => name,
        (None, Some(isin), _) => isin.clone(),
        // Interest is often paid on the account itself, not on a security
        (None, None, TransactionKind::Interest) => raw.source.clone(),
        (None, None, kind) => {
            return Err(PerformanceError::ValidationError {
                instrument: String::new(),
                date: raw.date,
                kind: kind.as_str().to_string(),
                reason: "missing instrument".to_string(),
            })
        }
    };

    if let Some(isin) = &isin {
        if !ISIN_PATTERN.is_match(isin) {
            return Err(PerformanceError::ValidationError {
                instrument: name,
                date: raw.date,
                kind: raw.kind.as_str().to_string(),
                reason: format!("malformed ISIN '{}'", isin),
            });
        }
    }

    Ok(Instrument::new(name, isin, ticker))
}
