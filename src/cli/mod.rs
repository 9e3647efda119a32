use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::importers::SourceFormat;

pub mod formatters;

#[derive(Parser, Debug)]
#[command(name = "fincli")]
#[command(
    version,
    about = "Yearly trading and savings performance in EUR from broker exports"
)]
#[command(
    long_about = "Reads broker exports, converts every amount to EUR with the ECB reference rates, matches sells against buys first-in first-out and totals dividend and interest income for a year."
)]
pub struct Cli {
    /// Disable colorized/ANSI output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    /// Output results in JSON format
    #[arg(long = "json", global = true)]
    pub json: bool,

    /// Log more (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command that runs the full pipeline
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Reporting year (defaults to the config file, then last year)
    #[arg(short, long)]
    pub year: Option<i32>,

    /// Config file (defaults to ./fincli.toml, then the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// ECB reference-rate CSV, overrides `rates` from the config
    #[arg(long)]
    pub rates: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Trading and savings performance for a year
    Report {
        #[command(flatten)]
        run: RunArgs,

        /// Also write realized gains to this CSV file
        #[arg(long)]
        export_csv: Option<PathBuf>,
    },

    /// Realized FIFO gains only
    Trading {
        #[command(flatten)]
        run: RunArgs,

        /// Also write realized gains to this CSV file
        #[arg(long)]
        export_csv: Option<PathBuf>,
    },

    /// Dividend and interest income only
    Savings {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Parse a single export and preview its records
    Import {
        /// Path to the CSV file
        file: PathBuf,

        /// Export format (canonical_csv, trade_republic, manual_interest, revolut, xtb)
        #[arg(short, long)]
        format: SourceFormat,

        /// Field delimiter
        #[arg(short, long, default_value_t = ';')]
        delimiter: char,
    },

    /// Look up the reference rate of a currency on a date
    Rate {
        /// ISO currency code (e.g., USD)
        currency: String,

        /// Date (YYYY-MM-DD)
        date: String,

        /// ECB reference-rate CSV
        #[arg(long)]
        rates: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_report_with_global_flags() {
        let cli = Cli::try_parse_from([
            "fincli", "report", "--year", "2023", "--json", "-vv", "--export-csv", "out.csv",
        ])
        .unwrap();

        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Report { run, export_csv } => {
                assert_eq!(run.year, Some(2023));
                assert_eq!(export_csv, Some(PathBuf::from("out.csv")));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn parse_import_format() {
        let cli = Cli::try_parse_from([
            "fincli", "import", "tr.csv", "--format", "trade_republic",
        ])
        .unwrap();
        match cli.command {
            Commands::Import { format, delimiter, .. } => {
                assert_eq!(format, SourceFormat::TradeRepublic);
                assert_eq!(delimiter, ';');
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn reject_unknown_format() {
        assert!(Cli::try_parse_from(["fincli", "import", "x.csv", "--format", "bitget"]).is_err());
    }
}
