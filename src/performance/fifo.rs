use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, info, warn};

use super::Processor;
use crate::error::PerformanceError;
use crate::transactions::{CanonicalTransaction, Instrument, Operation};

/// Open quantity left from a single acquisition
#[derive(Debug, Clone, PartialEq)]
struct Lot {
    acquisition_date: NaiveDate,
    original_quantity: Decimal,
    remaining_quantity: Decimal,
    unit_cost_eur: Decimal,
    /// Whole acquisition fee of the lot
    fee_eur: Decimal,
    /// Part of `fee_eur` not yet attributed to a disposal
    fee_remaining_eur: Decimal,
}

/// Slice of a lot consumed by one sale
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchedLot {
    pub acquisition_date: NaiveDate,
    pub quantity: Decimal,
    pub unit_cost_eur: Decimal,
    pub cost_eur: Decimal,
    pub acquisition_fee_eur: Decimal,
}

/// Gain or loss realized by one SELL transaction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RealizedGain {
    pub instrument: Instrument,
    pub disposal_date: NaiveDate,
    pub quantity: Decimal,
    pub proceeds_eur: Decimal,
    pub cost_basis_eur: Decimal,
    /// Acquisition fees of the consumed lots plus the sale's own fee
    pub fees_eur: Decimal,
    pub gain_eur: Decimal,
    pub matched_lots: Vec<MatchedLot>,
}

/// FIFO queue of open lots for one instrument.
///
/// Transactions must be applied in non-decreasing date order; same-date
/// transactions in their input order.
#[derive(Debug)]
pub struct FifoLedger {
    instrument: Instrument,
    lots: VecDeque<Lot>,
}

impl FifoLedger {
    pub fn new(instrument: Instrument) -> Self {
        Self {
            instrument,
            lots: VecDeque::new(),
        }
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    /// Total open quantity
    pub fn held_quantity(&self) -> Decimal {
        self.lots.iter().map(|l| l.remaining_quantity).sum()
    }

    pub fn open_lot_count(&self) -> usize {
        self.lots.len()
    }

    /// Open a new lot
    pub fn buy(
        &mut self,
        date: NaiveDate,
        quantity: Decimal,
        unit_cost_eur: Decimal,
        fee_eur: Decimal,
    ) {
        self.lots.push_back(Lot {
            acquisition_date: date,
            original_quantity: quantity,
            remaining_quantity: quantity,
            unit_cost_eur,
            fee_eur,
            fee_remaining_eur: fee_eur,
        });
    }

    /// Consume `quantity` from the oldest lots and compute the realized gain.
    ///
    /// Fails without touching the ledger when less than `quantity` is held.
    pub fn sell(
        &mut self,
        date: NaiveDate,
        quantity: Decimal,
        unit_price_eur: Decimal,
        fee_eur: Decimal,
    ) -> Result<RealizedGain, PerformanceError> {
        let held = self.held_quantity();
        if quantity > held {
            return Err(PerformanceError::FifoUnderflow {
                instrument: self.instrument.id.clone(),
                date,
                shortfall: quantity - held,
            });
        }

        let mut to_fill = quantity;
        let mut sale_fee_left = fee_eur;
        let mut proceeds = Decimal::ZERO;
        let mut cost_basis = Decimal::ZERO;
        let mut fees = Decimal::ZERO;
        let mut matched_lots = Vec::new();

        while to_fill > Decimal::ZERO {
            let Some(lot) = self.lots.front_mut() else {
                // unreachable after the held-quantity check
                break;
            };

            let take = to_fill.min(lot.remaining_quantity);
            let cost = take * lot.unit_cost_eur;

            // The last slice of a lot or of a sale takes the remainder, so
            // fees add up exactly.
            let acquisition_fee = if take == lot.remaining_quantity {
                lot.fee_remaining_eur
            } else {
                lot.fee_eur * take / lot.original_quantity
            };
            let sale_fee = if take == to_fill {
                sale_fee_left
            } else {
                fee_eur * take / quantity
            };

            proceeds += take * unit_price_eur;
            cost_basis += cost;
            fees += acquisition_fee + sale_fee;
            sale_fee_left -= sale_fee;

            matched_lots.push(MatchedLot {
                acquisition_date: lot.acquisition_date,
                quantity: take,
                unit_cost_eur: lot.unit_cost_eur,
                cost_eur: cost,
                acquisition_fee_eur: acquisition_fee,
            });

            lot.remaining_quantity -= take;
            lot.fee_remaining_eur -= acquisition_fee;
            to_fill -= take;

            if lot.remaining_quantity.is_zero() {
                self.lots.pop_front();
            }
        }

        Ok(RealizedGain {
            instrument: self.instrument.clone(),
            disposal_date: date,
            quantity,
            proceeds_eur: proceeds,
            cost_basis_eur: cost_basis,
            fees_eur: fees,
            gain_eur: proceeds - cost_basis - fees,
            matched_lots,
        })
    }

    /// Apply one canonical transaction; income kinds are ignored
    pub fn apply(
        &mut self,
        tx: &CanonicalTransaction,
    ) -> Result<Option<RealizedGain>, PerformanceError> {
        match &tx.operation {
            Operation::Buy(trade) => {
                self.buy(tx.date, trade.quantity, trade.unit_price_eur, trade.fee_eur);
                Ok(None)
            }
            Operation::Sell(trade) => self
                .sell(tx.date, trade.quantity, trade.unit_price_eur, trade.fee_eur)
                .map(Some),
            Operation::Dividend(_) | Operation::Interest(_) => Ok(None),
        }
    }
}

/// Realized gains of one instrument within the target year
#[derive(Debug, Clone, Serialize)]
pub struct InstrumentPnl {
    pub instrument: Instrument,
    pub gains: Vec<RealizedGain>,
    pub total_gain_eur: Decimal,
}

/// Instrument whose matching stopped on an error
#[derive(Debug)]
pub struct InstrumentFailure {
    pub instrument: String,
    pub error: PerformanceError,
}

#[derive(Debug)]
pub struct TradingReport {
    pub year: i32,
    pub instruments: Vec<InstrumentPnl>,
    pub failures: Vec<InstrumentFailure>,
}

impl TradingReport {
    pub fn gains(&self) -> impl Iterator<Item = &RealizedGain> {
        self.instruments.iter().flat_map(|i| i.gains.iter())
    }

    pub fn total_gain_eur(&self) -> Decimal {
        self.instruments.iter().map(|i| i.total_gain_eur).sum()
    }

    pub fn total_proceeds_eur(&self) -> Decimal {
        self.gains().map(|g| g.proceeds_eur).sum()
    }

    pub fn total_cost_basis_eur(&self) -> Decimal {
        self.gains().map(|g| g.cost_basis_eur).sum()
    }

    pub fn total_fees_eur(&self) -> Decimal {
        self.gains().map(|g| g.fees_eur).sum()
    }
}

/// FIFO realized gains for disposals in `year`
#[derive(Debug, Clone, Copy)]
pub struct TradingPerformance {
    pub year: i32,
}

impl TradingPerformance {
    pub fn new(year: i32) -> Self {
        Self { year }
    }
}

impl Processor for TradingPerformance {
    type Output = TradingReport;

    fn name(&self) -> &'static str {
        "trading"
    }

    fn process(&self, transactions: &[CanonicalTransaction]) -> TradingReport {
        let mut by_instrument: BTreeMap<&str, Vec<&CanonicalTransaction>> = BTreeMap::new();
        for tx in transactions.iter().filter(|tx| tx.kind().is_trade()) {
            by_instrument
                .entry(tx.instrument.id.as_str())
                .or_default()
                .push(tx);
        }

        let mut instruments = Vec::new();
        let mut failures = Vec::new();

        for (instrument_id, mut txs) in by_instrument {
            txs.sort_by_key(|tx| (tx.date, tx.seq));

            let mut ledger = FifoLedger::new(txs[0].instrument.clone());
            let mut gains = Vec::new();

            for tx in txs {
                // Later disposals cannot change this year's result
                if tx.year() > self.year {
                    break;
                }
                match ledger.apply(tx) {
                    Ok(Some(gain)) if gain.disposal_date.year() == self.year => gains.push(gain),
                    Ok(_) => {}
                    Err(error) => {
                        warn!("Stopping FIFO matching for {}: {}", instrument_id, error);
                        failures.push(InstrumentFailure {
                            instrument: instrument_id.to_string(),
                            error,
                        });
                        break;
                    }
                }
            }

            debug!(
                "{}: {} disposals in {}, {} still held",
                instrument_id,
                gains.len(),
                self.year,
                ledger.held_quantity()
            );

            if !gains.is_empty() {
                let total_gain_eur: Decimal = gains.iter().map(|g| g.gain_eur).sum();
                instruments.push(InstrumentPnl {
                    instrument: ledger.instrument().clone(),
                    gains,
                    total_gain_eur,
                });
            }
        }

        info!(
            "Trading {}: {} instruments with disposals, {} failed",
            self.year,
            instruments.len(),
            failures.len()
        );

        TradingReport {
            year: self.year,
            instruments,
            failures,
        }
    }
}
