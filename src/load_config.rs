//! `load_config`: reads the YAML configuration file and injects secrets from the environment.
//!
//! This is the only place untrusted YAML is parsed. Secret values are never written to the
//! file directly; a setting of the form `$NAME` is replaced by the value of the environment
//! variable `NAME` (after `.env` has been loaded by the binary). An unset variable is a
//! configuration error naming the variable.
//!
//! # Errors
//! Every failure is a [`FleetError::Configuration`], surfaced before any network call.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::config::FleetConfig;
use crate::error::{FleetError, Result};

pub const CONFIG_ENV_VAR: &str = "GITFLEET_CONFIG";

/// `$GITFLEET_CONFIG`, else `$HOME/.config/gitfleet/config.yaml`.
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return PathBuf::from(path);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home)
        .join(".config")
        .join("gitfleet")
        .join("config.yaml")
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<FleetConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(FleetError::Configuration(format!(
                "failed to read config file {}: {e}",
                path_ref.display()
            )));
        }
    };

    parse_config(&config_content)
}

/// Parse YAML text and resolve `$NAME` settings from the environment.
pub fn parse_config(yaml: &str) -> Result<FleetConfig> {
    let mut config: FleetConfig = serde_yaml::from_str(yaml).map_err(|e| {
        error!(error = ?e, "Failed to parse config YAML");
        FleetError::from(e)
    })?;

    for provider in &mut config.providers {
        for (key, value) in provider.settings.iter_mut() {
            if let Some(var) = value.strip_prefix('$') {
                match std::env::var(var) {
                    Ok(resolved) => {
                        info!(provider = %provider.name, setting = %key, var, "Injected setting from environment");
                        *value = resolved;
                    }
                    Err(_) => {
                        error!(provider = %provider.name, setting = %key, var, "Environment variable for setting not set");
                        return Err(FleetError::Configuration(format!(
                            "provider '{}': setting '{key}' refers to environment variable {var}, which is not set",
                            provider.name
                        )));
                    }
                }
            }
        }
    }

    if config.concurrency == 0 {
        return Err(FleetError::Configuration(
            "concurrency must be at least 1".to_string(),
        ));
    }

    if let Some(default) = &config.default_provider {
        if !config.providers.iter().any(|p| &p.name == default) {
            return Err(FleetError::Configuration(format!(
                "default_provider '{default}' does not name a configured provider"
            )));
        }
    }

    config.trace_loaded();
    Ok(config)
}
