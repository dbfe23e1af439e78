//! Integration tests for configuration resolution
//!
//! Covers:
//! - Missing TOML file falls back to compiled defaults
//! - Priority order: CLI override > environment > TOML > default
//! - Validation of base URL and timeout
//!
//! Note: Uses serial_test to prevent environment variable races.
//! Tests that touch FRAGKIT_* variables are marked with #[serial].

use fragkit_common::config::{
    load_toml_config, CompiledDefaults, ConfigOverrides, ConfigResolver, FailurePolicy,
    ENV_BASE_URL, ENV_CACHE_TOKEN, ENV_CONFIG_PATH, ENV_LINES_OF_CONTEXT, ENV_TIMEOUT_SECS,
};
use fragkit_common::Error;
use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;

fn clear_env() {
    for name in [
        ENV_CONFIG_PATH,
        ENV_BASE_URL,
        ENV_LINES_OF_CONTEXT,
        ENV_CACHE_TOKEN,
        ENV_TIMEOUT_SECS,
    ] {
        env::remove_var(name);
    }
}

fn write_config(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("config.toml");
    std::fs::write(&path, content).unwrap();
    path
}

fn overrides_with_file(path: PathBuf) -> ConfigOverrides {
    ConfigOverrides {
        config_path: Some(path),
        ..Default::default()
    }
}

#[test]
#[serial]
fn test_missing_file_uses_compiled_defaults() {
    clear_env();
    let dir = TempDir::new().unwrap();

    let config = ConfigResolver::new()
        .resolve(&overrides_with_file(dir.path().join("absent.toml")))
        .unwrap();

    let defaults = CompiledDefaults::for_current_platform();
    assert_eq!(config.base_url, defaults.base_url);
    assert_eq!(config.request_timeout_secs, 30);
    assert_eq!(config.cache_token.as_deref(), Some(env!("CARGO_PKG_VERSION")));
    assert_eq!(config.lines_of_context, None);
    assert_eq!(config.failure_policy, FailurePolicy::RejectRemaining);
    assert_eq!(config.logging.level, "info");
}

#[test]
#[serial]
fn test_toml_file_values_apply() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
        [loader]
        base_url = "https://reviews.example.com/r/42/fragments"
        lines_of_context = "3,5"
        cache_token = "serial-77"
        request_timeout_secs = 5
        user_agent = "test-agent"
        failure_policy = "continue"

        [logging]
        level = "debug"
        "#,
    );

    let config = ConfigResolver::new()
        .resolve(&overrides_with_file(path))
        .unwrap();

    assert_eq!(config.base_url, "https://reviews.example.com/r/42/fragments/");
    assert_eq!(config.lines_of_context.as_deref(), Some("3,5"));
    assert_eq!(config.cache_token.as_deref(), Some("serial-77"));
    assert_eq!(config.request_timeout_secs, 5);
    assert_eq!(config.user_agent, "test-agent");
    assert_eq!(config.failure_policy, FailurePolicy::Continue);
    assert_eq!(config.logging.level, "debug");
}

#[test]
#[serial]
fn test_env_overrides_file() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
        [loader]
        base_url = "http://file-host/fragments/"
        request_timeout_secs = 5
        "#,
    );

    env::set_var(ENV_BASE_URL, "http://env-host/fragments/");
    env::set_var(ENV_TIMEOUT_SECS, "9");

    let config = ConfigResolver::new()
        .resolve(&overrides_with_file(path))
        .unwrap();

    assert_eq!(config.base_url, "http://env-host/fragments/");
    assert_eq!(config.request_timeout_secs, 9);

    clear_env();
}

#[test]
#[serial]
fn test_cli_overrides_env_and_file() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
        [loader]
        base_url = "http://file-host/"
        lines_of_context = "1"
        "#,
    );
    env::set_var(ENV_BASE_URL, "http://env-host/");
    env::set_var(ENV_LINES_OF_CONTEXT, "2");

    let overrides = ConfigOverrides {
        config_path: Some(path),
        base_url: Some("http://cli-host/frag".to_string()),
        lines_of_context: Some("3".to_string()),
        request_timeout_secs: Some(12),
    };
    let config = ConfigResolver::new().resolve(&overrides).unwrap();

    assert_eq!(config.base_url, "http://cli-host/frag/");
    assert_eq!(config.lines_of_context.as_deref(), Some("3"));
    assert_eq!(config.request_timeout_secs, 12);

    clear_env();
}

#[test]
#[serial]
fn test_config_path_from_env() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
        [loader]
        base_url = "http://from-env-file/"
        "#,
    );
    env::set_var(ENV_CONFIG_PATH, &path);

    let config = ConfigResolver::new()
        .resolve(&ConfigOverrides::default())
        .unwrap();
    assert_eq!(config.base_url, "http://from-env-file/");

    clear_env();
}

#[test]
#[serial]
fn test_empty_cache_token_disables_token() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
        [loader]
        cache_token = ""
        "#,
    );

    let config = ConfigResolver::new()
        .resolve(&overrides_with_file(path))
        .unwrap();
    assert_eq!(config.cache_token, None);
}

#[test]
#[serial]
fn test_malformed_file_is_an_error() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[loader\nbase_url = ");

    let result = ConfigResolver::new().resolve(&overrides_with_file(path));
    assert!(matches!(result, Err(Error::Toml(_))));
}

#[test]
#[serial]
fn test_invalid_values_rejected() {
    clear_env();
    let dir = TempDir::new().unwrap();

    let overrides = ConfigOverrides {
        config_path: Some(dir.path().join("absent.toml")),
        base_url: Some("ftp://nope/".to_string()),
        ..Default::default()
    };
    assert!(matches!(
        ConfigResolver::new().resolve(&overrides),
        Err(Error::Config(_))
    ));

    let overrides = ConfigOverrides {
        config_path: Some(dir.path().join("absent.toml")),
        request_timeout_secs: Some(0),
        ..Default::default()
    };
    assert!(matches!(
        ConfigResolver::new().resolve(&overrides),
        Err(Error::Config(_))
    ));

    env::set_var(ENV_TIMEOUT_SECS, "soon");
    let overrides = overrides_with_file(dir.path().join("absent.toml"));
    assert!(matches!(
        ConfigResolver::new().resolve(&overrides),
        Err(Error::Config(_))
    ));
    clear_env();
}

#[test]
fn test_load_toml_config_missing_file() {
    let dir = TempDir::new().unwrap();
    let result = load_toml_config(&dir.path().join("nope.toml"));
    assert!(matches!(result, Err(Error::Io(_))));
}
