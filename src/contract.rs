//! # contract: provider capability surface and collaborator interfaces
//!
//! This module defines the data model shared by every hosting backend and the two
//! traits the rest of gitfleet dispatches through:
//!
//! - [`Provider`]: one hosting backend (Azure DevOps, GitHub, Bitbucket). Discovery and
//!   the bulk orchestrator only ever talk to `dyn Provider`, so no backend-specific
//!   URL construction or response parsing leaks outside `crate::providers`.
//! - [`GitRunner`]: the external `git` executable. Only exit codes and the porcelain
//!   status text cross this boundary.
//!
//! ## Repository streaming
//! [`Provider::list_repositories`] returns a [`RepoStream`]: a lazy, finite,
//! non-restartable producer. Each call re-queries the backend. Dropping the stream
//! before it is exhausted is the "stop early" signal and releases everything the
//! stream owns (pending request futures, the cloned HTTP client handle); nothing
//! else needs to be called. Backend errors while streaming are logged and end the
//! stream, they are never yielded to the consumer.
//!
//! ## Mocking & Testing
//! [`GitRunner`] is annotated for `mockall` and exported behind the default
//! `test-export-mocks` feature so integration tests can script git exit codes.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use futures::stream::BoxStream;
#[allow(unused_imports)]
use mockall::{automock, predicate::*};
use serde::{Deserialize, Serialize};

use crate::error::{FleetError, Result};

/// Identifies which backend produced a value, and keys the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    AzureDevOps,
    GitHub,
    Bitbucket,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::AzureDevOps,
        ProviderKind::GitHub,
        ProviderKind::Bitbucket,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::AzureDevOps => "azuredevops",
            ProviderKind::GitHub => "github",
            ProviderKind::Bitbucket => "bitbucket",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "azuredevops" | "azure-devops" | "azure_devops" | "ado" => {
                Ok(ProviderKind::AzureDevOps)
            }
            "github" => Ok(ProviderKind::GitHub),
            "bitbucket" => Ok(ProviderKind::Bitbucket),
            other => Err(FleetError::ProviderNotFound(format!(
                "unknown provider type '{other}'"
            ))),
        }
    }
}

/// Credential kinds a backend accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    Pat,
    Token,
    AppPassword,
}

/// A discovered unit of work. Never mutated after a provider yields it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Repository {
    pub name: String,
    pub clone_url: String,
    pub ssh_url: Option<String>,
    pub default_branch: String,
    pub is_private: bool,
    pub is_disabled: bool,
    pub size_hint: Option<u64>,
    pub description: Option<String>,
    pub provider: ProviderKind,
    pub metadata: BTreeMap<String, String>,
}

impl std::fmt::Display for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Top-level scope within a provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Organization {
    pub name: String,
    pub url: String,
    pub provider: ProviderKind,
    pub metadata: BTreeMap<String, String>,
}

/// Second-level scope, only produced when [`Provider::supports_projects`] is true.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Project {
    pub name: String,
    pub organization: String,
    pub description: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

/// Lazy repository producer returned by [`Provider::list_repositories`].
pub type RepoStream = BoxStream<'static, Repository>;

/// Static facts about a backend, checked by the registry at registration time.
#[derive(Debug, Clone, Copy)]
pub struct ProviderDescriptor {
    pub kind: ProviderKind,
    pub auth_methods: &'static [AuthMethod],
    pub supports_projects: bool,
    /// Settings a [`crate::config::ProviderConfig`] must carry for construction to succeed.
    pub required_settings: &'static [&'static str],
}

/// The capability contract every hosting backend implements.
///
/// `authenticate` and `test_connection` report rejected credentials as `false`
/// rather than an error; configuration-shape problems are reported by the
/// backend's constructor instead.
#[async_trait]
pub trait Provider: Send + Sync {
    fn descriptor(&self) -> &'static ProviderDescriptor;

    fn provider_name(&self) -> ProviderKind {
        self.descriptor().kind
    }

    fn supported_auth_methods(&self) -> &'static [AuthMethod] {
        self.descriptor().auth_methods
    }

    fn supports_projects(&self) -> bool {
        self.descriptor().supports_projects
    }

    /// Validate credentials against the backend. Leaves the instance
    /// unauthenticated and returns `false` when they are rejected.
    async fn authenticate(&self) -> bool;

    /// Cheap re-validation of an existing session; authenticates first if needed.
    async fn test_connection(&self) -> bool;

    async fn list_organizations(&self) -> Result<Vec<Organization>>;

    /// Always empty for backends without projects.
    async fn list_projects(&self, org_name: &str) -> Result<Vec<Project>>;

    fn list_repositories(&self, org_name: &str, project_name: Option<&str>) -> RepoStream;

    /// The repository's HTTPS clone URL with this backend's credentials embedded.
    fn authenticated_clone_url(&self, repo: &Repository) -> Result<String>;

    /// Release the session. Idempotent.
    async fn close(&self);
}

/// The external `git` executable.
///
/// Non-zero exit codes are returned, not turned into errors; `Err` means the
/// process could not be run at all.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait GitRunner: Send + Sync {
    /// `git clone <url> <target_dir>/<dir_name>`.
    async fn clone_repo(&self, url: &str, target_dir: &Path, dir_name: &str) -> Result<i32>;

    /// `git -C <repo_dir> pull`.
    async fn pull(&self, repo_dir: &Path) -> Result<i32>;

    /// `git -C <repo_dir> status --porcelain=v1 --branch`, returning stdout.
    async fn status(&self, repo_dir: &Path) -> Result<String>;
}
