#![allow(dead_code)]

use anyhow::{bail, Result};
use assert_cmd::cargo;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// USD at 1.25 per EUR, i.e. 0.8 EUR per USD. 2024-03-01 is a Friday.
pub const RATES_CSV: &str = "\
Date,USD,JPY,
2024-03-01,1.2500,N/A,
2024-01-02,1.2500,160.00,
";

pub const TRADE_REPUBLIC_CSV: &str = "\
Fecha;Tipo;Valor;Nota;ISIN;Cantidad;Comisiones
2023-06-01;Compra;-1000.00;iShares Core MSCI World;IE00B4L5Y983;10;-1.00
2024-03-20;Dividendo;4.00;iShares Core MSCI World;IE00B4L5Y983;;
2024-04-01;Intereses;2.50;;;;
2024-05-02;Depósito;500.00;;;;
2024-06-10;Venta;1200.00;iShares Core MSCI World;IE00B4L5Y983;10;-1.00
";

pub const BROKER_CSV: &str = "\
date,kind,instrument,isin,quantity,price,amount,fee,tax,currency
2024-01-10,BUY,Apple,US0378331005,10,100,,0,,USD
2024-03-02,SELL,Apple,US0378331005,4,150,,0,,USD
2024-05-01,SELL,Ghost,,1,10,,0,,EUR
";

pub const CONFIG_TOML: &str = r#"
year = 2024
rates = "rates.csv"

[[sources]]
name = "Trade Republic"
format = "trade_republic"
path = "exports/tr"

[[sources]]
name = "Broker"
format = "canonical_csv"
path = "broker.csv"
delimiter = ","
"#;

/// Write rates, exports and a config into `dir`; returns the config path.
///
/// Expected 2024 results: trading P&L 198 (MSCI World) + 160 (Apple),
/// savings 4 + 2.50, one FIFO failure for Ghost.
pub fn write_fixture_workspace(dir: &Path) -> PathBuf {
    let tr_dir = dir.join("exports").join("tr");
    std::fs::create_dir_all(&tr_dir).expect("failed to create exports dir");

    std::fs::write(dir.join("rates.csv"), RATES_CSV).expect("failed to write rates");
    std::fs::write(tr_dir.join("2024.csv"), TRADE_REPUBLIC_CSV).expect("failed to write export");
    std::fs::write(tr_dir.join("notes.txt"), "not an export").expect("failed to write notes");
    std::fs::write(dir.join("broker.csv"), BROKER_CSV).expect("failed to write broker csv");

    let config = dir.join("fincli.toml");
    std::fs::write(&config, CONFIG_TOML).expect("failed to write config");
    config
}

pub fn base_cmd(home: &TempDir) -> Command {
    let mut cmd = Command::new(cargo::cargo_bin!("fincli"));
    cmd.env("HOME", home.path());
    cmd.env("XDG_CONFIG_HOME", home.path().join(".config"));
    cmd.env_remove("RUST_LOG");
    cmd.current_dir(home.path());
    cmd.arg("--no-color");
    cmd
}

pub fn run_cmd(home: &TempDir, args: &[&str]) -> Result<Output> {
    let mut cmd = base_cmd(home);
    cmd.args(args);
    let output = cmd.output()?;
    if !output.status.success() {
        bail!(
            "command failed: {:?}\nstdout: {}\nstderr: {}",
            args,
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(output)
}

pub fn run_cmd_json(home: &TempDir, args: &[&str]) -> Result<Value> {
    let mut json_args = vec!["--json"];
    json_args.extend_from_slice(args);
    let output = run_cmd(home, &json_args)?;
    let stdout = String::from_utf8(output.stdout)?;
    Ok(serde_json::from_str(&stdout)?)
}
