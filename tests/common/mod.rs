//! Shared in-memory provider for integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;

use gitfleet::contract::{
    Organization, Project, Provider, ProviderDescriptor, RepoStream, Repository, ProviderKind,
};
use gitfleet::providers::github;
use gitfleet::Result;

pub fn repository(org: &str, name: &str) -> Repository {
    Repository {
        name: name.to_string(),
        clone_url: format!("https://github.com/{org}/{name}.git"),
        ssh_url: Some(format!("git@github.com:{org}/{name}.git")),
        default_branch: "main".to_string(),
        is_private: false,
        is_disabled: false,
        size_hint: Some(1024),
        description: None,
        provider: ProviderKind::GitHub,
        metadata: BTreeMap::new(),
    }
}

/// Flat (GitHub-shaped) provider whose repository streams are generated lazily
/// and count how many items were actually produced.
pub struct LazyProvider {
    pub orgs: Vec<(String, usize)>,
    pub produced: Arc<AtomicUsize>,
    pub listed: Mutex<Vec<String>>,
    pub closed: AtomicUsize,
}

impl LazyProvider {
    /// `total` repositories spread evenly over `org_count` organizations.
    pub fn new(org_count: usize, total: usize) -> Self {
        let per_org = total / org_count;
        Self {
            orgs: (0..org_count)
                .map(|i| (format!("org-{i}"), per_org))
                .collect(),
            produced: Arc::new(AtomicUsize::new(0)),
            listed: Mutex::new(Vec::new()),
            closed: AtomicUsize::new(0),
        }
    }

    pub fn produced(&self) -> usize {
        self.produced.load(Ordering::SeqCst)
    }

    pub fn listed(&self) -> Vec<String> {
        self.listed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for LazyProvider {
    fn descriptor(&self) -> &'static ProviderDescriptor {
        &github::DESCRIPTOR
    }

    async fn authenticate(&self) -> bool {
        true
    }

    async fn test_connection(&self) -> bool {
        true
    }

    async fn list_organizations(&self) -> Result<Vec<Organization>> {
        Ok(self
            .orgs
            .iter()
            .map(|(name, _)| Organization {
                name: name.clone(),
                url: format!("https://github.com/{name}"),
                provider: ProviderKind::GitHub,
                metadata: BTreeMap::new(),
            })
            .collect())
    }

    async fn list_projects(&self, _org_name: &str) -> Result<Vec<Project>> {
        Ok(Vec::new())
    }

    fn list_repositories(&self, org_name: &str, _project_name: Option<&str>) -> RepoStream {
        self.listed.lock().unwrap().push(org_name.to_string());
        let count = self
            .orgs
            .iter()
            .find(|(name, _)| name == org_name)
            .map(|(_, count)| *count)
            .unwrap_or(0);
        let org = org_name.to_string();
        let produced = self.produced.clone();
        futures::stream::iter(0..count)
            .map(move |i| {
                produced.fetch_add(1, Ordering::SeqCst);
                repository(&org, &format!("repo-{i:04}"))
            })
            .boxed()
    }

    fn authenticated_clone_url(&self, repo: &Repository) -> Result<String> {
        Ok(repo
            .clone_url
            .replacen("https://", "https://x-access-token:test@", 1))
    }

    async fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}
