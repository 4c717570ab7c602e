//! Integration tests for configuration resolution via CLI.

mod common;

use common::TestEnv;
use predicates::prelude::*;

#[test]
fn test_config_show_defaults() {
    let env = TestEnv::new();
    let shown = env.json(&["config", "show"]);
    let settings = shown["settings"].as_array().unwrap();

    let backend = settings.iter().find(|s| s["key"] == "backend").unwrap();
    assert_eq!(backend["value"], "sqlite");
    assert_eq!(backend["source"], "default");

    let data_dir = settings.iter().find(|s| s["key"] == "data-dir").unwrap();
    assert_eq!(data_dir["source"], "env:PIM_DATA_DIR");
}

#[test]
fn test_config_set_then_show() {
    let env = TestEnv::new();
    env.pim()
        .args(["config", "set", "output-format", "human"])
        .assert()
        .success();

    // Human output now applies without -H
    env.pim()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("output-format  human  (data-dir)"));
}

#[test]
fn test_config_set_unknown_key_fails() {
    let env = TestEnv::new();
    env.pim()
        .args(["config", "set", "editor", "vim"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown config key"));
}

#[test]
fn test_system_config_applies_below_data_dir() {
    let env = TestEnv::new();
    std::fs::write(
        env.config_path().join("config.kdl"),
        "backend \"yaml\"\nlog-level \"warn\"\n",
    )
    .unwrap();
    std::fs::write(env.data_path().join("config.kdl"), "log-level \"error\"\n").unwrap();

    let shown = env.json(&["config", "show"]);
    let settings = shown["settings"].as_array().unwrap();
    let backend = settings.iter().find(|s| s["key"] == "backend").unwrap();
    assert_eq!(backend["value"], "yaml");
    assert_eq!(backend["source"], "system");
    let level = settings.iter().find(|s| s["key"] == "log-level").unwrap();
    assert_eq!(level["value"], "error");
    assert_eq!(level["source"], "data-dir");
}

#[test]
fn test_env_backend_overrides_config() {
    let env = TestEnv::new();
    std::fs::write(env.data_path().join("config.kdl"), "backend \"yaml\"\n").unwrap();

    env.pim()
        .env("PIM_BACKEND", "sqlite")
        .arg("init")
        .assert()
        .success();
    assert!(env.data_path().join("pim.db").exists());
}

#[test]
fn test_invalid_config_file_fails() {
    let env = TestEnv::new();
    std::fs::write(env.data_path().join("config.kdl"), "backend \"sqlite").unwrap();

    env.pim()
        .arg("tree")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Config error"));
}

#[test]
fn test_log_output_goes_to_stderr() {
    let env = TestEnv::init();
    env.pim()
        .args(["--log-level", "debug", "task", "list"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("{"))
        .stderr(predicate::str::contains("opened store"));
}
