//! # discovery: org -> project -> repository walk
//!
//! [`discover`] enumerates one provider's repositories that match a
//! [`QueryPattern`]. Each level is filtered by its pattern segment before the
//! next level is queried, so a non-matching organization or project never costs
//! an API call.
//!
//! Scopes are walked one at a time. The optional `limit` is checked after every
//! accepted repository; once it is hit the current stream is dropped and no
//! further scope is opened, so the result holds exactly `limit` items.
//!
//! A failure while listing one organization's projects is recorded in
//! [`DiscoveryReport::failures`] and that organization is skipped. Errors inside
//! a repository stream already end that stream at the provider.

use futures::StreamExt;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::contract::{Organization, Provider, Repository};
use crate::error::{FleetError, Result};
use crate::query::QueryPattern;

#[derive(Debug, Clone, Default)]
pub struct DiscoveryOptions {
    pub limit: Option<usize>,
    pub include_disabled: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredRepository {
    pub organization: String,
    pub project: Option<String>,
    pub repository: Repository,
}

/// One element of the JSON discovery output.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DiscoveryRow {
    pub organization: String,
    pub project: Option<String>,
    pub repository: String,
    pub clone_url: String,
    pub ssh_url: Option<String>,
    pub default_branch: String,
    pub is_private: bool,
    pub description: Option<String>,
}

impl From<&DiscoveredRepository> for DiscoveryRow {
    fn from(found: &DiscoveredRepository) -> Self {
        let repo = &found.repository;
        Self {
            organization: found.organization.clone(),
            project: found.project.clone(),
            repository: repo.name.clone(),
            clone_url: repo.clone_url.clone(),
            ssh_url: repo.ssh_url.clone(),
            default_branch: repo.default_branch.clone(),
            is_private: repo.is_private,
            description: repo.description.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct DiscoveryReport {
    pub repositories: Vec<DiscoveredRepository>,
    /// Scopes that could not be listed, keyed by organization name.
    pub failures: Vec<(String, FleetError)>,
    pub limit_reached: bool,
}

impl DiscoveryReport {
    pub fn rows(&self) -> Vec<DiscoveryRow> {
        self.repositories.iter().map(DiscoveryRow::from).collect()
    }

    pub fn into_repositories(self) -> Vec<Repository> {
        self.repositories
            .into_iter()
            .map(|found| found.repository)
            .collect()
    }
}

enum Walk {
    Continue,
    LimitReached,
}

pub async fn discover(
    provider: &dyn Provider,
    pattern: &QueryPattern,
    options: &DiscoveryOptions,
) -> Result<DiscoveryReport> {
    let provider_name = provider.provider_name();
    let mut report = DiscoveryReport::default();

    if options.limit == Some(0) {
        report.limit_reached = true;
        return Ok(report);
    }

    info!(
        provider = %provider_name,
        pattern = %pattern,
        limit = ?options.limit,
        "[DISCOVER] Listing organizations"
    );
    let organizations = provider.list_organizations().await?;
    let matching: Vec<Organization> = organizations
        .into_iter()
        .filter(|org| pattern.matches_org(&org.name))
        .collect();
    debug!(provider = %provider_name, count = matching.len(), "[DISCOVER] Matching organizations");

    for org in &matching {
        info!(provider = %provider_name, org = %org.name, "[DISCOVER] Processing organization");

        if !provider.supports_projects() {
            let walk = walk_scope(provider, &org.name, None, pattern, options, &mut report).await;
            if let Walk::LimitReached = walk {
                break;
            }
            continue;
        }

        let projects = match provider.list_projects(&org.name).await {
            Ok(projects) => projects,
            Err(e) if e.is_fatal() => {
                error!(
                    provider = %provider_name,
                    org = %org.name,
                    error = %e,
                    "[DISCOVER] Listing projects failed fatally"
                );
                return Err(e);
            }
            Err(e) => {
                warn!(
                    provider = %provider_name,
                    org = %org.name,
                    error = %e,
                    "[DISCOVER] Failed to list projects, skipping organization"
                );
                report.failures.push((org.name.clone(), e));
                continue;
            }
        };

        let mut limit_hit = false;
        for project in projects.iter().filter(|p| pattern.matches_project(&p.name)) {
            debug!(org = %org.name, project = %project.name, "[DISCOVER] Processing project");
            let project_name = Some(project.name.as_str());
            let walk =
                walk_scope(provider, &org.name, project_name, pattern, options, &mut report).await;
            if let Walk::LimitReached = walk {
                limit_hit = true;
                break;
            }
        }
        if limit_hit {
            break;
        }
    }

    info!(
        provider = %provider_name,
        found = report.repositories.len(),
        failed_scopes = report.failures.len(),
        limit_reached = report.limit_reached,
        "[DISCOVER] Complete"
    );
    Ok(report)
}

/// Drain one repository stream into `report`, stopping early at the limit.
async fn walk_scope(
    provider: &dyn Provider,
    org: &str,
    project: Option<&str>,
    pattern: &QueryPattern,
    options: &DiscoveryOptions,
    report: &mut DiscoveryReport,
) -> Walk {
    let mut repos = provider.list_repositories(org, project);
    while let Some(repo) = repos.next().await {
        if !pattern.matches_repo(&repo.name) {
            continue;
        }
        if repo.is_disabled && !options.include_disabled {
            debug!(org, repo = %repo.name, "[DISCOVER] Skipping disabled repository");
            continue;
        }
        report.repositories.push(DiscoveredRepository {
            organization: org.to_string(),
            project: project.map(str::to_string),
            repository: repo,
        });
        if options
            .limit
            .is_some_and(|limit| report.repositories.len() >= limit)
        {
            debug!(org, limit = ?options.limit, "[DISCOVER] Limit reached, stopping enumeration");
            report.limit_reached = true;
            return Walk::LimitReached;
        }
    }
    Walk::Continue
}
