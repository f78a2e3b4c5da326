//! Provider registry and factory.
//!
//! One [`ProviderRegistry`] is built at startup (normally with
//! [`ProviderRegistry::with_defaults`]) and passed to whatever needs to turn a
//! [`ProviderConfig`] into a live provider. Registration is explicit and checked:
//! a backend must declare at least one auth method and the settings it needs, and
//! names are unique. Resolution returns `ProviderNotFound` for unknown types and
//! `ProviderUnavailable` when a known backend cannot be constructed.
//!
//! [`detect_provider_by_url`] maps a repository or organization URL to a provider
//! type using ordered host rules, then hostname substring heuristics.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};
use url::Url;

use crate::config::ProviderConfig;
use crate::contract::{Provider, ProviderDescriptor, ProviderKind};
use crate::error::{FleetError, Result};
use crate::providers::{azure_devops, bitbucket, github};
use crate::query::QueryPattern;

pub type ProviderConstructor = fn(&ProviderConfig) -> Result<Arc<dyn Provider>>;

#[derive(Clone, Copy)]
struct Registration {
    descriptor: &'static ProviderDescriptor,
    constructor: ProviderConstructor,
}

#[derive(Clone, Default)]
pub struct ProviderRegistry {
    entries: BTreeMap<String, Registration>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the three built-in backends.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let builtins: [(&'static ProviderDescriptor, ProviderConstructor); 3] = [
            (&azure_devops::DESCRIPTOR, build_azure_devops),
            (&github::DESCRIPTOR, build_github),
            (&bitbucket::DESCRIPTOR, build_bitbucket),
        ];
        for (descriptor, constructor) in builtins {
            // Built-in descriptors always pass validation.
            if let Err(e) = registry.register(descriptor.kind.as_str(), descriptor, constructor) {
                tracing::error!(error = %e, "Built-in provider failed registration");
            }
        }
        registry
    }

    pub fn register(
        &mut self,
        name: &str,
        descriptor: &'static ProviderDescriptor,
        constructor: ProviderConstructor,
    ) -> Result<()> {
        let key = name.trim().to_ascii_lowercase();
        if key.is_empty() {
            return Err(FleetError::Validation(
                "provider name must not be empty".to_string(),
            ));
        }
        if self.entries.contains_key(&key) {
            return Err(FleetError::Validation(format!(
                "provider '{key}' is already registered"
            )));
        }
        if descriptor.auth_methods.is_empty() {
            return Err(FleetError::Validation(format!(
                "provider '{key}' declares no supported auth methods"
            )));
        }
        if descriptor.required_settings.is_empty() {
            return Err(FleetError::Validation(format!(
                "provider '{key}' declares no required settings"
            )));
        }

        debug!(provider = %key, kind = %descriptor.kind, "Registered provider");
        self.entries.insert(
            key,
            Registration {
                descriptor,
                constructor,
            },
        );
        Ok(())
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn descriptor(&self, provider_type: &str) -> Option<&'static ProviderDescriptor> {
        self.lookup(provider_type).map(|r| r.descriptor)
    }

    fn lookup(&self, provider_type: &str) -> Option<&Registration> {
        let key = provider_type.trim().to_ascii_lowercase();
        self.entries.get(&key).or_else(|| {
            // Accept aliases such as "azure-devops" through ProviderKind parsing.
            key.parse::<ProviderKind>()
                .ok()
                .and_then(|kind| self.entries.get(kind.as_str()))
        })
    }

    pub fn create(
        &self,
        provider_type: &str,
        config: &ProviderConfig,
    ) -> Result<Arc<dyn Provider>> {
        let registration = self.lookup(provider_type).ok_or_else(|| {
            FleetError::ProviderNotFound(format!(
                "unknown provider type '{provider_type}' (registered: {})",
                self.names().join(", ")
            ))
        })?;

        for setting in registration.descriptor.required_settings {
            config.require(setting)?;
        }

        match (registration.constructor)(config) {
            Ok(provider) => {
                info!(provider = %config.name, kind = %registration.descriptor.kind, "Created provider");
                Ok(provider)
            }
            Err(e @ FleetError::Configuration(_)) => Err(e),
            Err(e) => Err(FleetError::ProviderUnavailable {
                provider: config.name.clone(),
                reason: e.to_string(),
            }),
        }
    }

    /// Build the provider described by a named config entry.
    pub fn create_from_config(&self, config: &ProviderConfig) -> Result<Arc<dyn Provider>> {
        self.create(&config.provider_type, config)
    }
}

fn build_azure_devops(config: &ProviderConfig) -> Result<Arc<dyn Provider>> {
    Ok(Arc::new(azure_devops::AzureDevOpsProvider::new(config)?))
}

fn build_github(config: &ProviderConfig) -> Result<Arc<dyn Provider>> {
    Ok(Arc::new(github::GitHubProvider::new(config)?))
}

fn build_bitbucket(config: &ProviderConfig) -> Result<Arc<dyn Provider>> {
    Ok(Arc::new(bitbucket::BitbucketProvider::new(config)?))
}

enum HostRule {
    Exact(&'static str),
    Suffix(&'static str),
}

impl HostRule {
    fn matches(&self, host: &str) -> bool {
        match self {
            HostRule::Exact(expected) => host == *expected,
            HostRule::Suffix(suffix) => host.ends_with(suffix),
        }
    }
}

/// Most specific first.
const HOST_RULES: &[(HostRule, ProviderKind)] = &[
    (HostRule::Exact("dev.azure.com"), ProviderKind::AzureDevOps),
    (HostRule::Exact("ssh.dev.azure.com"), ProviderKind::AzureDevOps),
    (HostRule::Suffix(".visualstudio.com"), ProviderKind::AzureDevOps),
    (HostRule::Exact("github.com"), ProviderKind::GitHub),
    (HostRule::Exact("www.github.com"), ProviderKind::GitHub),
    (HostRule::Exact("api.github.com"), ProviderKind::GitHub),
    (HostRule::Exact("bitbucket.org"), ProviderKind::Bitbucket),
    (HostRule::Exact("www.bitbucket.org"), ProviderKind::Bitbucket),
    (HostRule::Exact("api.bitbucket.org"), ProviderKind::Bitbucket),
];

const HOST_HEURISTICS: &[(&str, ProviderKind)] = &[
    ("github", ProviderKind::GitHub),
    ("azure", ProviderKind::AzureDevOps),
    ("visualstudio", ProviderKind::AzureDevOps),
    ("bitbucket", ProviderKind::Bitbucket),
];

/// Extract the host from an `https://` URL, a scheme-less `host/path`, or an
/// scp-style `git@host:path`.
fn extract_host(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if let Ok(url) = Url::parse(raw) {
        if let Some(host) = url.host_str() {
            return Some(host.to_ascii_lowercase());
        }
    }
    if let Some((_, rest)) = raw.split_once('@') {
        if let Some((host, _)) = rest.split_once(':') {
            return Some(host.to_ascii_lowercase());
        }
    }
    Url::parse(&format!("https://{raw}"))
        .ok()
        .and_then(|url| url.host_str().map(str::to_ascii_lowercase))
}

pub fn detect_provider_by_url(raw: &str) -> Result<ProviderKind> {
    let not_found =
        || FleetError::ProviderNotFound(format!("cannot detect provider for URL '{raw}'"));
    let host = extract_host(raw).ok_or_else(not_found)?;

    if let Some((_, kind)) = HOST_RULES.iter().find(|(rule, _)| rule.matches(&host)) {
        return Ok(*kind);
    }

    HOST_HEURISTICS
        .iter()
        .find(|(needle, _)| host.contains(needle))
        .map(|(_, kind)| *kind)
        .ok_or_else(not_found)
}

/// Path segments of a URL or scp-style remote, without `.git` and `_git`.
fn path_segments(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    let path = match Url::parse(raw) {
        Ok(url) if url.host_str().is_some() => url.path().to_string(),
        _ => match raw.split_once('@').and_then(|(_, rest)| rest.split_once(':')) {
            Some((_, path)) => path.to_string(),
            None => raw.split_once('/').map(|(_, p)| p.to_string()).unwrap_or_default(),
        },
    };
    path.split('/')
        .filter(|s| !s.is_empty() && *s != "_git")
        .map(|s| s.trim_end_matches(".git").to_string())
        .collect()
}

/// Turn a URL-shaped clone scope into a provider type and query.
///
/// `https://dev.azure.com/org/project` becomes `org/project/*`,
/// `https://github.com/org/repo` becomes `org/*/repo`.
pub fn scope_from_url(raw: &str) -> Result<(ProviderKind, QueryPattern)> {
    let kind = detect_provider_by_url(raw)?;
    let host = extract_host(raw).unwrap_or_default();
    let mut segments = path_segments(raw);

    let query = match kind {
        ProviderKind::AzureDevOps => {
            if host == "ssh.dev.azure.com" && segments.first().map(String::as_str) == Some("v3") {
                segments.remove(0);
            }
            if host.ends_with(".visualstudio.com") {
                segments.insert(0, host.clone());
            }
            segments.truncate(3);
            segments.join("/")
        }
        ProviderKind::GitHub | ProviderKind::Bitbucket => match segments.as_slice() {
            [] => String::new(),
            [org] => org.clone(),
            [org, repo, ..] => format!("{org}/*/{repo}"),
        },
    };
    if query.is_empty() {
        return Err(FleetError::Validation(format!(
            "URL '{raw}' does not name an organization"
        )));
    }

    let pattern = QueryPattern::parse(&query)?;
    debug!(url = raw, %kind, %pattern, "Resolved clone scope from URL");
    Ok((kind, pattern))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::AuthMethod;

    #[test]
    fn detects_known_hosts() {
        assert_eq!(
            detect_provider_by_url("https://dev.azure.com/org").unwrap(),
            ProviderKind::AzureDevOps
        );
        assert_eq!(
            detect_provider_by_url("https://github.com/org/repo").unwrap(),
            ProviderKind::GitHub
        );
        assert_eq!(
            detect_provider_by_url("https://bitbucket.org/ws/repo").unwrap(),
            ProviderKind::Bitbucket
        );
        assert_eq!(
            detect_provider_by_url("https://pdidev.visualstudio.com/Payments").unwrap(),
            ProviderKind::AzureDevOps
        );
        assert_eq!(
            detect_provider_by_url("git@github.com:org/repo.git").unwrap(),
            ProviderKind::GitHub
        );
        assert_eq!(
            detect_provider_by_url("git@ssh.dev.azure.com:v3/org/proj/repo").unwrap(),
            ProviderKind::AzureDevOps
        );
    }

    #[test]
    fn falls_back_to_host_heuristics() {
        assert_eq!(
            detect_provider_by_url("https://github.acme-corp.com/team/repo").unwrap(),
            ProviderKind::GitHub
        );
        assert_eq!(
            detect_provider_by_url("https://azure-git.internal/collection").unwrap(),
            ProviderKind::AzureDevOps
        );
        assert_eq!(
            detect_provider_by_url("bitbucket.example.com/scm/x").unwrap(),
            ProviderKind::Bitbucket
        );
    }

    #[test]
    fn unknown_host_is_provider_not_found() {
        assert!(matches!(
            detect_provider_by_url("https://gitlab.com/org/repo"),
            Err(FleetError::ProviderNotFound(_))
        ));
        assert!(matches!(
            detect_provider_by_url(""),
            Err(FleetError::ProviderNotFound(_))
        ));
    }

    #[test]
    fn url_scopes_become_queries() {
        let (kind, pattern) = scope_from_url("https://dev.azure.com/pdidev/Payments").unwrap();
        assert_eq!(kind, ProviderKind::AzureDevOps);
        assert_eq!(pattern.to_string(), "pdidev/Payments/*");

        let (_, pattern) =
            scope_from_url("https://pdidev.visualstudio.com/Payments/_git/payment-api").unwrap();
        assert_eq!(pattern.to_string(), "pdidev.visualstudio.com/Payments/payment-api");

        let (kind, pattern) = scope_from_url("git@github.com:acme/api.git").unwrap();
        assert_eq!(kind, ProviderKind::GitHub);
        assert_eq!(pattern.to_string(), "acme/*/api");

        let (_, pattern) = scope_from_url("https://bitbucket.org/my-team").unwrap();
        assert_eq!(pattern.to_string(), "my-team/*/*");

        assert!(matches!(
            scope_from_url("https://github.com/"),
            Err(FleetError::Validation(_))
        ));
    }

    #[test]
    fn creates_registered_providers() {
        let registry = ProviderRegistry::with_defaults();
        assert_eq!(registry.names(), vec!["azuredevops", "bitbucket", "github"]);

        let config = ProviderConfig::new("oss", "github").with("token", "t");
        let provider = registry.create_from_config(&config).unwrap();
        assert_eq!(provider.provider_name(), ProviderKind::GitHub);

        let config = ProviderConfig::new("work", "Azure-DevOps")
            .with("org_url", "https://dev.azure.com/pdidev")
            .with("pat", "p");
        let provider = registry.create_from_config(&config).unwrap();
        assert!(provider.supports_projects());
    }

    #[test]
    fn unknown_type_and_missing_settings() {
        let registry = ProviderRegistry::with_defaults();
        let err = registry
            .create("gitlab", &ProviderConfig::new("x", "gitlab"))
            .err()
            .unwrap();
        assert!(matches!(err, FleetError::ProviderNotFound(_)));

        let err = registry
            .create("bitbucket", &ProviderConfig::new("x", "bitbucket").with("username", "me"))
            .err()
            .unwrap();
        assert!(matches!(err, FleetError::Configuration(_)));
    }

    #[test]
    fn registration_is_validated() {
        static NO_AUTH: ProviderDescriptor = ProviderDescriptor {
            kind: ProviderKind::GitHub,
            auth_methods: &[],
            supports_projects: false,
            required_settings: &["token"],
        };
        static OK: ProviderDescriptor = ProviderDescriptor {
            kind: ProviderKind::GitHub,
            auth_methods: &[AuthMethod::Token],
            supports_projects: false,
            required_settings: &["token"],
        };
        let constructor: ProviderConstructor = build_github;

        let mut registry = ProviderRegistry::new();
        assert!(registry.register("ghe", &NO_AUTH, constructor).is_err());
        assert!(registry.register("", &OK, constructor).is_err());
        assert!(registry.register("ghe", &OK, constructor).is_ok());
        assert!(registry.register("GHE", &OK, constructor).is_err());
        assert_eq!(registry.descriptor("ghe").map(|d| d.kind), Some(ProviderKind::GitHub));
    }

    #[test]
    fn constructor_failures_become_unavailable() {
        static BROKEN: ProviderDescriptor = ProviderDescriptor {
            kind: ProviderKind::Bitbucket,
            auth_methods: &[AuthMethod::AppPassword],
            supports_projects: false,
            required_settings: &["username"],
        };
        fn not_ready(_: &ProviderConfig) -> Result<Arc<dyn Provider>> {
            Err(FleetError::Connection("backend not ready".into()))
        }
        let mut registry = ProviderRegistry::new();
        registry.register("broken", &BROKEN, not_ready).unwrap();
        let err = registry
            .create("broken", &ProviderConfig::new("b", "broken").with("username", "me"))
            .err()
            .unwrap();
        assert!(matches!(err, FleetError::ProviderUnavailable { .. }));
    }
}
