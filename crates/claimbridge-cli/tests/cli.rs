use assert_cmd::Command;
use predicates::prelude::*;

fn claimbridge() -> Command {
    let mut cmd = Command::cargo_bin("claimbridge").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn config_prints_defaults() {
    claimbridge()
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"check_period_ms\": 10000"))
        .stdout(predicate::str::contains("\"max_claim_data_len\": 16"));
}

#[test]
fn config_honors_environment() {
    claimbridge()
        .arg("config")
        .env("CLAIMBRIDGE_POLLER__CHECK_PERIOD_MS", "250")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"check_period_ms\": 250"));
}

#[test]
fn demo_runs_against_simulated_engine() {
    claimbridge()
        .args(["--log-level", "warn", "-o", "json", "demo", "--period-ms", "5", "--checks", "0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Identity alice created"))
        .stdout(predicate::str::contains("network timeout"))
        .stdout(predicate::str::contains("Demo finished"));
}

#[test]
fn unknown_subcommand_fails() {
    claimbridge().arg("frobnicate").assert().failure();
}
