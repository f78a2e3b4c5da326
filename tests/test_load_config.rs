use std::env;
use std::fs::write;

use gitfleet::load_config::{default_config_path, load_config, parse_config, CONFIG_ENV_VAR};
use gitfleet::FleetError;
use serial_test::serial;
use tempfile::NamedTempFile;

const CONFIG_YAML: &str = r#"
default_provider: work
concurrency: 4
providers:
  - name: work
    type: azuredevops
    org_url: https://dev.azure.com/pdidev
    pat: $GITFLEET_TEST_PAT
  - name: oss
    type: github
    token: $GITFLEET_TEST_TOKEN
"#;

/// A static config plus the referenced env vars yields a fully resolved config.
#[tokio::test]
#[serial]
async fn test_load_config_injects_secrets_from_env() {
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), CONFIG_YAML).unwrap();

    env::set_var("GITFLEET_TEST_PAT", "pat-secret");
    env::set_var("GITFLEET_TEST_TOKEN", "gh-secret");

    let config = load_config(config_file.path()).expect("Config should load");

    assert_eq!(config.concurrency, 4);
    assert_eq!(config.provider_names(), vec!["work", "oss"]);
    assert_eq!(config.default_provider_name().as_deref(), Some("work"));

    let work = config.provider_config("work").unwrap();
    assert_eq!(work.provider_type, "azuredevops");
    assert_eq!(work.get("org_url"), Some("https://dev.azure.com/pdidev"));
    assert_eq!(work.get("pat"), Some("pat-secret"));
    assert_eq!(config.provider_config("oss").unwrap().get("token"), Some("gh-secret"));

    env::remove_var("GITFLEET_TEST_PAT");
    env::remove_var("GITFLEET_TEST_TOKEN");
}

/// A missing secret env var fails the load and names the variable.
#[tokio::test]
#[serial]
async fn test_load_config_errors_on_missing_env() {
    env::remove_var("GITFLEET_TEST_PAT");
    env::set_var("GITFLEET_TEST_TOKEN", "gh-secret");

    let err = parse_config(CONFIG_YAML).expect_err("missing env var must fail");
    assert!(matches!(err, FleetError::Configuration(_)));
    assert!(err.to_string().contains("GITFLEET_TEST_PAT"));

    env::remove_var("GITFLEET_TEST_TOKEN");
}

#[test]
fn test_load_config_rejects_unknown_default_provider() {
    let yaml = "default_provider: nope\nproviders:\n  - name: oss\n    type: github\n    token: t\n";
    let err = parse_config(yaml).unwrap_err();
    assert!(err.to_string().contains("nope"));
}

#[test]
fn test_load_config_defaults_concurrency() {
    let yaml = "providers:\n  - name: oss\n    type: github\n    token: t\n";
    let config = parse_config(yaml).unwrap();
    assert_eq!(config.concurrency, gitfleet::config::DEFAULT_CONCURRENCY);
    assert_eq!(config.default_provider_name().as_deref(), Some("oss"));
}

#[test]
fn test_load_config_missing_file_is_configuration_error() {
    let err = load_config("/definitely/not/here/gitfleet.yaml").unwrap_err();
    assert!(matches!(err, FleetError::Configuration(_)));
}

#[test]
#[serial]
fn test_default_config_path_honours_env() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/custom-gitfleet.yaml");
    assert_eq!(
        default_config_path(),
        std::path::PathBuf::from("/tmp/custom-gitfleet.yaml")
    );
    env::remove_var(CONFIG_ENV_VAR);
    assert!(default_config_path().ends_with(".config/gitfleet/config.yaml"));
}
