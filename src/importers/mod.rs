// Import module - broker export parsers producing raw records

pub mod canonical_csv;
pub mod manual_interest;
pub mod revolut;
pub mod trade_republic;
pub mod xtb;

use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

use crate::transactions::TransactionKind;

/// A record as extracted from a broker export, before validation and FX
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub instrument: Option<String>,
    pub isin: Option<String>,
    pub ticker: Option<String>,
    pub kind: TransactionKind,
    pub date: NaiveDate,
    /// Units traded (BUY/SELL)
    pub quantity: Option<Decimal>,
    /// Native unit price (BUY/SELL)
    pub price: Option<Decimal>,
    /// Gross amount (DIVIDEND/INTEREST)
    pub amount: Option<Decimal>,
    pub fee: Option<Decimal>,
    /// Tax withheld at source (DIVIDEND/INTEREST)
    pub tax: Option<Decimal>,
    pub currency: String,
    pub source: String,
}

impl RawRecord {
    pub fn new(
        kind: TransactionKind,
        date: NaiveDate,
        currency: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            instrument: None,
            isin: None,
            ticker: None,
            kind,
            date,
            quantity: None,
            price: None,
            amount: None,
            fee: None,
            tax: None,
            currency: currency.into(),
            source: source.into(),
        }
    }

    /// Best human-readable label for the instrument
    pub fn label(&self) -> &str {
        self.instrument
            .as_deref()
            .or(self.isin.as_deref())
            .unwrap_or(&self.source)
    }
}

/// Supported export layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    CanonicalCsv,
    TradeRepublic,
    ManualInterest,
    Revolut,
    Xtb,
}

impl SourceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::CanonicalCsv => "canonical_csv",
            SourceFormat::TradeRepublic => "trade_republic",
            SourceFormat::ManualInterest => "manual_interest",
            SourceFormat::Revolut => "revolut",
            SourceFormat::Xtb => "xtb",
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "canonical_csv" | "canonical" | "csv" => Ok(SourceFormat::CanonicalCsv),
            "trade_republic" | "tr" => Ok(SourceFormat::TradeRepublic),
            "manual_interest" | "manual" => Ok(SourceFormat::ManualInterest),
            "revolut" | "revolut_savings" => Ok(SourceFormat::Revolut),
            "xtb" => Ok(SourceFormat::Xtb),
            other => Err(anyhow!(
                "Unsupported source format: {}. Supported formats: canonical_csv, trade_republic, manual_interest, revolut, xtb",
                other
            )),
        }
    }
}

/// Anything that can produce raw records for the pipeline
pub trait Importer {
    fn name(&self) -> &str;
    fn load(&self) -> Result<Vec<RawRecord>>;
}

/// Reads one export file, or every file matching `glob` inside a directory
#[derive(Debug, Clone)]
pub struct FileImporter {
    pub name: String,
    pub format: SourceFormat,
    pub path: PathBuf,
    pub glob: String,
    pub delimiter: u8,
}

impl FileImporter {
    pub fn new(name: impl Into<String>, format: SourceFormat, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            format,
            path: path.into(),
            glob: "*.csv".to_string(),
            delimiter: b';',
        }
    }

    pub fn with_glob(mut self, glob: impl Into<String>) -> Self {
        self.glob = glob.into();
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Files this importer will read, sorted by name
    pub fn files(&self) -> Result<Vec<PathBuf>> {
        if self.path.is_file() {
            return Ok(vec![self.path.clone()]);
        }
        if !self.path.is_dir() {
            return Err(anyhow!("Source path not found: {}", self.path.display()));
        }

        let pattern = glob::Pattern::new(&self.glob)
            .with_context(|| format!("Invalid file pattern '{}'", self.glob))?;

        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.path)
            .with_context(|| format!("Failed to list {}", self.path.display()))?
        {
            let path = entry?.path();
            let matches = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| pattern.matches(n));
            if path.is_file() && matches {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn parse_file(&self, path: &Path) -> Result<Vec<RawRecord>> {
        match self.format {
            SourceFormat::CanonicalCsv => {
                canonical_csv::parse_canonical_csv(path, self.delimiter, &self.name)
            }
            SourceFormat::TradeRepublic => {
                trade_republic::parse_trade_republic_csv(path, self.delimiter, &self.name)
            }
            SourceFormat::ManualInterest => {
                manual_interest::parse_manual_interest_csv(path, self.delimiter, &self.name)
            }
            SourceFormat::Revolut => revolut::parse_revolut_csv(path, self.delimiter, &self.name),
            SourceFormat::Xtb => xtb::parse_xtb_csv(path, self.delimiter, &self.name),
        }
    }
}

impl Importer for FileImporter {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Result<Vec<RawRecord>> {
        let files = self.files()?;
        info!(
            "Importing {} file(s) for source '{}' ({})",
            files.len(),
            self.name,
            self.format
        );

        let mut records = Vec::new();
        for file in files {
            let parsed = self
                .parse_file(&file)
                .with_context(|| format!("Failed to import {}", file.display()))?;
            debug!("{:?}: {} records", file, parsed.len());
            records.extend(parsed);
        }
        Ok(records)
    }
}

/// Parse a decimal written with either `.` or `,` as the decimal separator.
///
/// When both appear, the last one is the decimal separator and the other is
/// a thousands separator. Currency symbols and spaces are ignored.
pub fn parse_decimal(text: &str) -> Result<Decimal> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '€' | '$' | '£'))
        .collect();

    let normalized = match (cleaned.rfind('.'), cleaned.rfind(',')) {
        (Some(dot), Some(comma)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (None, Some(_)) => cleaned.replace(',', "."),
        _ => cleaned,
    };

    Decimal::from_str(&normalized)
        .or_else(|_| Decimal::from_scientific(&normalized))
        .with_context(|| format!("Failed to parse decimal '{}'", text))
}

/// Parse an optional decimal cell; empty cells are `None`
pub fn parse_optional_decimal(text: Option<&str>) -> Result<Option<Decimal>> {
    match text.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => parse_decimal(value).map(Some),
    }
}

/// Parse a date in the layouts brokers commonly export
pub fn parse_date(text: &str) -> Result<NaiveDate> {
    let text = text.trim();

    for format in ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Ok(date);
        }
    }
    for format in [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%d/%m/%Y %H:%M:%S",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(dt.date());
        }
    }

    Err(anyhow!("Could not parse date: {}", text))
}
