//! Error handling for fincli
//!
//! The performance core returns the typed `PerformanceError` so callers can
//! react to each failure kind; the peripheral layers (importers, config, CLI)
//! use the anyhow-based `Result` alias for context chaining.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

/// Core error types for performance computation
#[derive(Error, Debug)]
pub enum PerformanceError {
    #[error("no {currency} rate available on or before {date}")]
    RateUnavailable { currency: String, date: NaiveDate },

    #[error("invalid {kind} record for {instrument} on {date}: {reason}")]
    ValidationError {
        instrument: String,
        date: NaiveDate,
        kind: String,
        reason: String,
    },

    #[error("sell of {instrument} on {date} exceeds held quantity by {shortfall}")]
    FifoUnderflow {
        instrument: String,
        date: NaiveDate,
        shortfall: Decimal,
    },

    #[error("invalid {currency} rate {rate} on {date}")]
    InvalidRate {
        currency: String,
        date: NaiveDate,
        rate: Decimal,
    },

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("io error")]
    Io(#[from] std::io::Error),
}

impl PerformanceError {
    /// Instrument the failure refers to, when it refers to one
    pub fn instrument(&self) -> Option<&str> {
        match self {
            PerformanceError::ValidationError { instrument, .. }
            | PerformanceError::FifoUnderflow { instrument, .. } => Some(instrument),
            _ => None,
        }
    }
}

/// Result type alias for the peripheral layers
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_error_formatting_is_readable() {
        let err = PerformanceError::RateUnavailable {
            currency: "USD".to_string(),
            date: date(1998, 12, 31),
        };
        assert_eq!(err.to_string(), "no USD rate available on or before 1998-12-31");

        let err = PerformanceError::FifoUnderflow {
            instrument: "US0378331005".to_string(),
            date: date(2024, 3, 1),
            shortfall: dec!(1),
        };
        assert_eq!(
            err.to_string(),
            "sell of US0378331005 on 2024-03-01 exceeds held quantity by 1"
        );
    }

    #[test]
    fn test_anyhow_context_chains_errors() {
        use anyhow::Context;
        let result: Result<()> = Err(PerformanceError::ParseError("bad row".to_string()))
            .context("failed to load rates");
        let err = result.unwrap_err();
        assert!(err.to_string().contains("failed to load rates"));
        assert!(err.downcast_ref::<PerformanceError>().is_some());
    }

    #[test]
    fn test_instrument_accessor() {
        let err = PerformanceError::ValidationError {
            instrument: "ACME".to_string(),
            date: date(2024, 1, 2),
            kind: "BUY".to_string(),
            reason: "missing quantity".to_string(),
        };
        assert_eq!(err.instrument(), Some("ACME"));
        assert!(PerformanceError::ParseError("x".to_string()).instrument().is_none());
    }
}
