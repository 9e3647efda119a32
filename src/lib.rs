//! Fincli - yearly investment performance in EUR
//!
//! This library reads broker exports, converts them to EUR with the ECB
//! reference rates, computes FIFO realized gains and totals dividend and
//! interest income for a reporting year.

pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod fx;
pub mod importers;
pub mod performance;
pub mod reports;
pub mod transactions;
pub mod utils;
