use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{FleetError, Result};

pub const DEFAULT_CONCURRENCY: usize = 8;

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

/// A named, provider-typed bag of credentials and URLs.
///
/// Settings are kept as strings; each backend picks out the keys it needs and
/// rejects the config at construction time when one is missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub provider_type: String,
    #[serde(flatten)]
    pub settings: BTreeMap<String, String>,
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>, provider_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider_type: provider_type.into(),
            settings: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.settings.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.settings
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// A setting the backend cannot work without.
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| {
            FleetError::Configuration(format!(
                "provider '{}' ({}) is missing required setting '{key}'",
                self.name, self.provider_type
            ))
        })
    }
}

/// The loaded configuration. Read-only for the lifetime of the process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetConfig {
    #[serde(default)]
    pub default_provider: Option<String>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

impl FleetConfig {
    pub fn provider_config(&self, name: &str) -> Result<&ProviderConfig> {
        self.providers
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| {
                FleetError::Configuration(format!(
                    "no provider named '{name}' in configuration (known: {})",
                    self.provider_names().join(", ")
                ))
            })
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name.clone()).collect()
    }

    /// The configured default, or the only provider when exactly one exists.
    pub fn default_provider_name(&self) -> Option<String> {
        match &self.default_provider {
            Some(name) => Some(name.clone()),
            None if self.providers.len() == 1 => Some(self.providers[0].name.clone()),
            None => None,
        }
    }

    /// Resolve an explicit `--provider` selection, falling back to the default.
    pub fn select_provider(&self, name: Option<&str>) -> Result<&ProviderConfig> {
        match name.map(str::to_string).or_else(|| self.default_provider_name()) {
            Some(name) => self.provider_config(&name),
            None => Err(FleetError::Configuration(
                "no provider selected and no default_provider configured".to_string(),
            )),
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            providers_count = self.providers.len(),
            default_provider = self.default_provider.as_deref().unwrap_or("<none>"),
            concurrency = self.concurrency,
            "Loaded FleetConfig"
        );
        debug!(providers = ?self.provider_names(), "Config loaded (provider names)");
    }
}
