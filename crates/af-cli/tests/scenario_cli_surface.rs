use assert_cmd::Command;
use predicates::prelude::*;

fn af() -> Command {
    Command::cargo_bin("af").unwrap()
}

#[test]
fn help_lists_all_commands() {
    af().arg("--help").assert().success().stdout(
        predicate::str::contains("verify")
            .and(predicate::str::contains("verify-batch"))
            .and(predicate::str::contains("verify-strategy"))
            .and(predicate::str::contains("scan"))
            .and(predicate::str::contains("benchmark"))
            .and(predicate::str::contains("backtest"))
            .and(predicate::str::contains("simulate"))
            .and(predicate::str::contains("audit-list"))
            .and(predicate::str::contains("init")),
    );
}

#[test]
fn init_writes_env_and_refuses_overwrite() {
    let dir = tempfile::tempdir().unwrap();

    af().current_dir(dir.path())
        .env("MARKET_DATA_CACHE_DIR", dir.path().join("md"))
        .args(["init", "--env", "production"])
        .assert()
        .success()
        .stdout(predicate::str::contains("environment=production"));

    let env_content = std::fs::read_to_string(dir.path().join(".env")).unwrap();
    assert!(env_content.contains("TEE_SIMULATION_MODE=false"));

    // Second run without --force must fail with a process error.
    af().current_dir(dir.path())
        .args(["init", "--env", "production"])
        .assert()
        .failure();

    // And succeed again with --force.
    af().current_dir(dir.path())
        .args(["init", "--env", "production", "--force"])
        .assert()
        .success();
}

#[test]
fn audit_list_reports_empty_log() {
    let dir = tempfile::tempdir().unwrap();

    af().current_dir(dir.path())
        .env("AUDIT_DIR", dir.path().join("audit"))
        .arg("audit-list")
        .assert()
        .success()
        .stdout(predicate::str::contains("no audit records found"));
}

#[test]
fn invalid_tier_is_a_process_error() {
    let dir = tempfile::tempdir().unwrap();

    af().current_dir(dir.path())
        .args(["verify", "some/image:1", "--tier", "extreme"])
        .assert()
        .failure();
}

#[test]
fn unknown_regime_is_a_process_error() {
    let dir = tempfile::tempdir().unwrap();

    af().current_dir(dir.path())
        .env("MARKET_DATA_CACHE_DIR", dir.path().join("md"))
        .env("AUDIT_DIR", dir.path().join("audit"))
        .env("REGISTRY_PATH", dir.path().join("registry.json"))
        .args(["verify-strategy", "some/image:1", "--regime", "no_such_window"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown regime"));
}
