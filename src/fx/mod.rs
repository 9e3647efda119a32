// FX module - historical daily reference rates and EUR conversion

pub mod ecb;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::PerformanceError;

/// Reporting currency; every amount leaving the normalizer is expressed in it
pub const REPORTING_CURRENCY: &str = "EUR";

/// One published reference rate: 1 unit of `currency` is worth `rate` EUR
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FxRatePoint {
    pub date: NaiveDate,
    pub currency: String,
    pub rate: Decimal,
}

impl FxRatePoint {
    pub fn new(date: NaiveDate, currency: impl Into<String>, rate: Decimal) -> Self {
        Self {
            date,
            currency: currency.into(),
            rate,
        }
    }
}

/// Immutable date -> currency -> rate-to-EUR index.
///
/// Each currency holds its points sorted ascending by date with no duplicate
/// dates, which is what makes the binary search in [`FxRateTable::lookup`]
/// valid.
#[derive(Debug, Default)]
pub struct FxRateTable {
    series: HashMap<String, Vec<(NaiveDate, Decimal)>>,
}

impl FxRateTable {
    /// Build the table from an unordered set of points.
    ///
    /// Rejects non-positive rates and two points for the same currency and date.
    pub fn from_points<I>(points: I) -> Result<Self, PerformanceError>
    where
        I: IntoIterator<Item = FxRatePoint>,
    {
        let mut series: HashMap<String, Vec<(NaiveDate, Decimal)>> = HashMap::new();

        for point in points {
            if point.rate <= Decimal::ZERO {
                return Err(PerformanceError::InvalidRate {
                    currency: point.currency,
                    date: point.date,
                    rate: point.rate,
                });
            }
            let currency = point.currency.trim().to_ascii_uppercase();
            series
                .entry(currency)
                .or_default()
                .push((point.date, point.rate));
        }

        for (currency, points) in series.iter_mut() {
            points.sort_by_key(|(date, _)| *date);
            if let Some(pair) = points.windows(2).find(|w| w[0].0 == w[1].0) {
                return Err(PerformanceError::InvalidRate {
                    currency: currency.clone(),
                    date: pair[1].0,
                    rate: pair[1].1,
                });
            }
            debug!("Loaded {} {} reference rates", points.len(), currency);
        }

        Ok(Self { series })
    }

    /// Latest point on or before `date` for `currency`, if any
    pub fn lookup(&self, currency: &str, date: NaiveDate) -> Option<(NaiveDate, Decimal)> {
        let points = self.series.get(currency)?;
        let idx = points.partition_point(|(d, _)| *d <= date);
        if idx == 0 {
            None
        } else {
            Some(points[idx - 1])
        }
    }

    /// Known currencies, sorted
    pub fn currencies(&self) -> Vec<&str> {
        let mut currencies: Vec<&str> = self.series.keys().map(String::as_str).collect();
        currencies.sort_unstable();
        currencies
    }

    /// Earliest and latest date covered by `currency`
    pub fn coverage(&self, currency: &str) -> Option<(NaiveDate, NaiveDate)> {
        let points = self.series.get(currency)?;
        Some((points.first()?.0, points.last()?.0))
    }

    pub fn len(&self) -> usize {
        self.series.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.series.values().all(Vec::is_empty)
    }
}

/// A resolved rate together with the publication date it came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRate {
    pub rate: Decimal,
    /// Date of the reference point used; earlier than the request on
    /// weekends and holidays, equal to it for EUR.
    pub effective_date: NaiveDate,
}

/// Lookup service over a shared, read-only rate table.
///
/// Falls back to the last published rate on or before the requested date,
/// never interpolating and never looking forward.
#[derive(Debug, Clone)]
pub struct FxResolver {
    table: Arc<FxRateTable>,
}

impl FxResolver {
    pub fn new(table: FxRateTable) -> Self {
        Self {
            table: Arc::new(table),
        }
    }

    pub fn table(&self) -> &FxRateTable {
        &self.table
    }

    /// Rate-to-EUR of `currency` on `date`
    pub fn rate(&self, date: NaiveDate, currency: &str) -> Result<Decimal, PerformanceError> {
        self.resolve(date, currency).map(|r| r.rate)
    }

    /// Like [`FxResolver::rate`], also reporting which publication date was used
    pub fn resolve(&self, date: NaiveDate, currency: &str) -> Result<ResolvedRate, PerformanceError> {
        let code = currency.trim().to_ascii_uppercase();
        if code == REPORTING_CURRENCY {
            return Ok(ResolvedRate {
                rate: Decimal::ONE,
                effective_date: date,
            });
        }

        self.table
            .lookup(&code, date)
            .map(|(effective_date, rate)| ResolvedRate {
                rate,
                effective_date,
            })
            .ok_or(PerformanceError::RateUnavailable {
                currency: code,
                date,
            })
    }

    /// Convert `amount` in `currency` to EUR at the rate of `date`
    pub fn to_eur(
        &self,
        amount: Decimal,
        date: NaiveDate,
        currency: &str,
    ) -> Result<Decimal, PerformanceError> {
        Ok(amount * self.rate(date, currency)?)
    }
}
