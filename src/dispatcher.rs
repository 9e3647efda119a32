//! Command dispatcher that routes parsed clap commands to their handlers.

use anyhow::{anyhow, Context, Result};
use chrono::{Datelike, Local, NaiveDate};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::cli::formatters::{self, Section};
use crate::cli::{Commands, RunArgs};
use crate::config::Config;
use crate::fx::{ecb, FxRateTable, FxResolver};
use crate::importers::{self, FileImporter, Importer, SourceFormat};
use crate::reports::{self, PerformanceReport};

/// Rows shown by `import` before eliding the rest
const PREVIEW_LIMIT: usize = 20;

/// Route a parsed command to its handler
pub fn dispatch_command(command: Commands, json_output: bool) -> Result<()> {
    match command {
        Commands::Report { run, export_csv } => {
            dispatch_report(&run, export_csv.as_deref(), Section::All, json_output)
        }
        Commands::Trading { run, export_csv } => {
            dispatch_report(&run, export_csv.as_deref(), Section::Trading, json_output)
        }
        Commands::Savings { run } => dispatch_report(&run, None, Section::Savings, json_output),
        Commands::Import {
            file,
            format,
            delimiter,
        } => dispatch_import(&file, format, delimiter, json_output),
        Commands::Rate {
            currency,
            date,
            rates,
        } => dispatch_rate(&currency, &date, &rates, json_output),
    }
}

/// Reporting year: the flag, then the config file, then last calendar year
pub fn resolve_year(flag: Option<i32>, config: &Config, today: NaiveDate) -> i32 {
    flag.or(config.year).unwrap_or(today.year() - 1)
}

fn dispatch_report(
    run: &RunArgs,
    export_csv: Option<&Path>,
    section: Section,
    json_output: bool,
) -> Result<()> {
    let config_path = Config::locate(run.config.as_deref())?;
    let config = Config::load(&config_path)?;
    let year = resolve_year(run.year, &config, Local::now().date_naive());

    info!("Generating {:?} report for {}", section, year);
    let report = reports::run(&config, year, run.rates.as_deref())?;

    print_report(&report, section, json_output);

    if let Some(path) = export_csv {
        reports::write_gains_csv(&report.trading, path)?;
        if !json_output {
            println!("{} Realized gains exported to: {}\n", "✓".green().bold(), path.display());
        }
    }

    Ok(())
}

fn print_report(report: &PerformanceReport, section: Section, json_output: bool) {
    if json_output {
        println!("{}", formatters::format_report_json(report, section));
        return;
    }

    print!("{}", formatters::format_report_table(report, section));
    println!();

    // Warnings go to stderr so stdout stays clean for piping
    for warning in formatters::format_warnings(report) {
        eprintln!("{}", warning);
    }
}

fn dispatch_import(
    file: &Path,
    format: SourceFormat,
    delimiter: char,
    json_output: bool,
) -> Result<()> {
    if !delimiter.is_ascii() {
        return Err(anyhow!("Delimiter must be a single ASCII character"));
    }

    let name = file
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("import")
        .to_string();

    info!("Previewing {:?} as {}", file, format);
    let importer = FileImporter::new(name, format, PathBuf::from(file)).with_delimiter(delimiter as u8);
    let records = importer.load()?;

    if json_output {
        println!("{}", formatters::format_import_json(&records));
    } else {
        print!("{}", formatters::format_import_preview(&records, PREVIEW_LIMIT));
    }
    Ok(())
}

fn dispatch_rate(currency: &str, date: &str, rates: &Path, json_output: bool) -> Result<()> {
    let date = importers::parse_date(date).with_context(|| format!("Invalid date '{}'", date))?;
    let fx = FxResolver::new(ecb::load_ecb_csv(rates)?);
    let resolved = fx
        .resolve(date, currency)
        .map_err(|e| anyhow::Error::new(e).context(coverage_hint(fx.table(), currency)))?;

    if json_output {
        println!("{}", formatters::format_rate_json(currency, date, &resolved));
    } else {
        println!("{}", formatters::format_rate(currency, date, &resolved));
    }
    Ok(())
}

/// Which dates the rate file covers for `currency`
fn coverage_hint(table: &FxRateTable, currency: &str) -> String {
    let code = currency.trim().to_ascii_uppercase();
    match table.coverage(&code) {
        Some((first, last)) => format!("{} covered from {} to {}", code, first, last),
        None => format!(
            "{} is not in the rate file (known: {})",
            code,
            table.currencies().join(", ")
        ),
    }
}
