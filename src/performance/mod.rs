// Performance module - FIFO trading results and savings income per year

pub mod fifo;
pub mod savings;

pub use fifo::{
    FifoLedger, InstrumentFailure, InstrumentPnl, MatchedLot, RealizedGain, TradingPerformance,
    TradingReport,
};
pub use savings::{aggregate, SavingsPerformance, SavingsReport, SavingsTotal};

use crate::transactions::CanonicalTransaction;

/// A computation over the canonical transaction stream.
///
/// Processors only see EUR-normalized transactions and ignore the kinds they
/// do not handle, so any number of them can run over the same stream.
pub trait Processor {
    type Output;

    fn name(&self) -> &'static str;

    fn process(&self, transactions: &[CanonicalTransaction]) -> Self::Output;
}
