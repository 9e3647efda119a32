mod cli_helpers;

use assert_cmd::prelude::*;
use cli_helpers::{base_cmd, run_cmd_json, write_fixture_workspace};
use predicates::prelude::*;
use tempfile::TempDir;

fn setup_workspace() -> TempDir {
    let home = TempDir::new().expect("failed to create temp home");
    write_fixture_workspace(home.path());
    home
}

#[test]
fn report_table_no_color_when_piped() {
    let home = setup_workspace();

    let mut cmd = base_cmd(&home);
    cmd.arg("report");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Performance 2024"))
        .stdout(predicate::str::contains("358,00 €"))
        .stdout(predicate::str::contains("6,50 €"))
        .stdout(predicate::str::contains("\u{001b}[").not())
        .stderr(predicate::str::contains("FIFO matching stopped for Ghost"));
}

#[test]
fn report_json_totals() {
    let home = setup_workspace();
    let json = run_cmd_json(&home, &["report"]).expect("report failed");

    assert_eq!(json["year"], 2024);
    assert_eq!(json["trading"]["total_gain_eur"], "358.00");
    assert_eq!(json["trading"]["total_fees_eur"], "2.00");
    assert_eq!(json["savings"]["total_eur"], "6.50");
    assert_eq!(json["sources"][0]["name"], "Trade Republic");
    assert_eq!(json["sources"][0]["records"], 4);
    assert_eq!(json["sources"][1]["records"], 3);

    let warnings = json["warnings"].as_array().expect("warnings array");
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].as_str().unwrap().contains("Ghost"));
}

#[test]
fn weekend_sale_uses_friday_rate() {
    let home = setup_workspace();
    let json = run_cmd_json(&home, &["trading"]).expect("trading failed");

    let apple = json["trading"]["instruments"]
        .as_array()
        .unwrap()
        .iter()
        .find(|i| i["name"] == "Apple")
        .expect("Apple missing");
    let gain = &apple["gains"][0];
    assert_eq!(gain["proceeds_eur"], "480.00");
    assert_eq!(gain["cost_basis_eur"], "320.00");
    assert_eq!(gain["matched_lots"][0]["acquisition_date"], "2024-01-10");
    assert!(json.get("savings").is_none());
}

#[test]
fn savings_only() {
    let home = setup_workspace();

    let mut cmd = base_cmd(&home);
    cmd.arg("savings");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Savings - 2024"))
        .stdout(predicate::str::contains("DIVIDEND"))
        .stdout(predicate::str::contains("INTEREST"))
        .stdout(predicate::str::contains("Trading -").not());
}

#[test]
fn year_flag_overrides_config() {
    let home = setup_workspace();
    let json = run_cmd_json(&home, &["report", "--year", "2023"]).expect("report failed");

    assert_eq!(json["year"], 2023);
    assert_eq!(json["trading"]["total_gain_eur"], "0.00");
    assert_eq!(json["savings"]["total_eur"], "0.00");
}

#[test]
fn explicit_config_from_another_directory() {
    let home = setup_workspace();
    let elsewhere = TempDir::new().unwrap();
    let config = home.path().join("fincli.toml");

    let mut cmd = base_cmd(&elsewhere);
    cmd.arg("report").arg("--config").arg(&config);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("358,00 €"));
}

#[test]
fn export_csv_writes_gains() {
    let home = setup_workspace();
    let out = home.path().join("gains.csv");

    let mut cmd = base_cmd(&home);
    cmd.arg("report").arg("--export-csv").arg(&out);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Realized gains exported to"));

    let text = std::fs::read_to_string(&out).expect("export missing");
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("instrument,isin,disposal_date"));
    assert!(text.contains("Apple,US0378331005,2024-03-02,4,480.00,320.00,0.00,160.00,1"));
}

#[test]
fn missing_config_fails() {
    let home = TempDir::new().unwrap();

    let mut cmd = base_cmd(&home);
    cmd.arg("report");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("No config file found"));
}

#[test]
fn import_preview_lists_records() {
    let home = setup_workspace();
    let file = home.path().join("exports").join("tr").join("2024.csv");

    let mut cmd = base_cmd(&home);
    cmd.arg("import")
        .arg(&file)
        .arg("--format")
        .arg("trade_republic");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Found 4 records"))
        .stdout(predicate::str::contains("iShares Core MSCI World"))
        .stdout(predicate::str::contains("\u{001b}[").not());
}

#[test]
fn import_json_is_raw_records() {
    let home = setup_workspace();
    let file = home.path().join("broker.csv");
    let file = file.to_str().unwrap();

    let json = run_cmd_json(
        &home,
        &["import", file, "--format", "canonical_csv", "--delimiter", ","],
    )
    .expect("import failed");

    let records = json.as_array().expect("array of records");
    assert_eq!(records.len(), 3);
    assert_eq!(records[0]["kind"], "BUY");
    assert_eq!(records[0]["currency"], "USD");
}

#[test]
fn rate_shows_fallback_date() {
    let home = setup_workspace();

    let mut cmd = base_cmd(&home);
    cmd.args(["rate", "USD", "2024-03-03", "--rates", "rates.csv"]);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("1 USD = 0.8 EUR on 2024-03-03"))
        .stdout(predicate::str::contains("published 2024-03-01"));
}

#[test]
fn rate_before_first_publication_fails() {
    let home = setup_workspace();

    let mut cmd = base_cmd(&home);
    cmd.args(["rate", "USD", "2023-12-01", "--rates", "rates.csv"]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("no USD rate available on or before 2023-12-01"))
        .stderr(predicate::str::contains("USD covered from 2024-01-02 to 2024-03-01"));
}

#[test]
fn rate_for_unknown_currency_lists_known_ones() {
    let home = setup_workspace();

    let mut cmd = base_cmd(&home);
    cmd.args(["rate", "GBP", "2024-03-01", "--rates", "rates.csv"]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("GBP is not in the rate file (known: JPY, USD)"));
}

#[test]
fn import_revolut_statement_groups_payouts() {
    let home = setup_workspace();
    let file = home.path().join("revolut.csv");
    std::fs::write(
        &file,
        "Date;Description;Value, EUR;Price per share;Quantity of shares\n\
         30 dic 2024, 1:29:07;Interest PAID EUR Class R IE000AZVL3K0;0,15;;\n\
         30 dic 2024, 1:29:07;Interest Tax EUR Class R;-0,03;;\n\
         2 ene 2025, 9:00:00;BUY EUR Class R IE000AZVL3K0;500,00;1,00;500\n",
    )
    .unwrap();
    let file = file.to_str().unwrap();

    let json = run_cmd_json(&home, &["import", file, "--format", "revolut"]).expect("import failed");

    let records = json.as_array().expect("array of records");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["kind"], "INTEREST");
    assert_eq!(records[0]["date"], "2024-12-30");
}
