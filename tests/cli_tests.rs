use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn first_run_writes_sample_config() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("conf/config.toml");

    Command::cargo_bin("pr-dash")
        .unwrap()
        .arg("--config")
        .arg(&config)
        .arg("--log-file")
        .arg(dir.path().join("pr-dash.log"))
        .assert()
        .failure()
        .stdout(predicate::str::contains("complete your configuration"))
        .stdout(predicate::str::contains(config.display().to_string()));

    let written = std::fs::read_to_string(&config).unwrap();
    assert!(written.contains("update_interval_minutes = 5"));
    assert!(written.contains("[bitbucket]"));
}

#[test]
fn incomplete_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    std::fs::write(
        &config,
        "update_interval_minutes = 0\n[bitbucket]\nusername = \"me\"\npassword = \"pw\"\nrepositories = [\"a/b\"]\n",
    )
    .unwrap();

    Command::cargo_bin("pr-dash")
        .unwrap()
        .arg("--config")
        .arg(&config)
        .arg("--log-file")
        .arg(dir.path().join("pr-dash.log"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid configuration"));
}

#[test]
fn subcommands_are_not_accepted() {
    Command::cargo_bin("pr-dash")
        .unwrap()
        .arg("status")
        .assert()
        .failure();
}
