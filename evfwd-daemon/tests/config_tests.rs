//! Configuration precedence tests.
//!
//! Tests the daemon loading order: file -> environment -> CLI -> validation.

use std::env;

use clap::Parser;
use evfwd_core::config::ForwarderConfig;
use evfwd_daemon::cli::DaemonCli;

const CONFIG: &str = r#"
[general]
log_level = "info"
log_format = "json"

[output]
kind = "udp"
destination = "127.0.0.1:5514"
"#;

async fn write_config(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let path = dir.path().join("evfwd.toml");
    tokio::fs::write(&path, CONFIG).await.unwrap();
    path
}

/// Mirrors the loading sequence in main.rs.
async fn load(cli: &DaemonCli) -> Result<ForwarderConfig, String> {
    let mut config = ForwarderConfig::from_file(&cli.config)
        .await
        .map_err(|e| e.to_string())?;
    config.apply_env_overrides();
    cli.apply_overrides(&mut config);
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

#[tokio::test]
#[serial_test::serial]
async fn test_cli_overrides_environment() {
    // Given: env and CLI both set the log level
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir).await;
    // SAFETY: Test isolation - serialized and cleaned up below
    unsafe {
        env::set_var("EVFWD_GENERAL_LOG_LEVEL", "warn");
    }

    let cli = DaemonCli::try_parse_from([
        "evfwd-daemon",
        "--config",
        path.to_str().unwrap(),
        "--log-level",
        "debug",
    ])
    .unwrap();
    let result = load(&cli).await;

    // SAFETY: Test isolation
    unsafe {
        env::remove_var("EVFWD_GENERAL_LOG_LEVEL");
    }

    // Then: CLI wins
    let config = result.expect("config should load");
    assert_eq!(config.general.log_level, "debug");
}

#[tokio::test]
#[serial_test::serial]
async fn test_environment_overrides_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir).await;
    // SAFETY: Test isolation
    unsafe {
        env::set_var("EVFWD_GENERAL_LOG_LEVEL", "trace");
    }

    let cli =
        DaemonCli::try_parse_from(["evfwd-daemon", "--config", path.to_str().unwrap()]).unwrap();
    let result = load(&cli).await;

    // SAFETY: Test isolation
    unsafe {
        env::remove_var("EVFWD_GENERAL_LOG_LEVEL");
    }

    let config = result.expect("config should load");
    assert_eq!(config.general.log_level, "trace");
    assert_eq!(config.output.destination, "127.0.0.1:5514");
}

#[tokio::test]
#[serial_test::serial]
async fn test_invalid_cli_override_fails_validation() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir).await;

    let cli = DaemonCli::try_parse_from([
        "evfwd-daemon",
        "--config",
        path.to_str().unwrap(),
        "--log-format",
        "xml",
    ])
    .unwrap();

    let err = load(&cli).await.err().expect("validation should fail");
    assert!(err.contains("general.log_format"), "{err}");
}

#[tokio::test]
async fn test_missing_config_file() {
    let cli =
        DaemonCli::try_parse_from(["evfwd-daemon", "--config", "/nonexistent/evfwd.toml"]).unwrap();
    let err = load(&cli).await.err().expect("load should fail");
    assert!(err.contains("/nonexistent/evfwd.toml"), "{err}");
}

#[test]
fn test_example_config_parses() {
    let content = include_str!("../../evfwd.toml.example");
    let config = ForwarderConfig::parse(content).expect("example config should parse");
    config.validate().expect("example config should validate");
    assert_eq!(config.general.server_name, "evfwd-sensor");
}
