//! Bitbucket Cloud backend (API 2.0, username + app password).
//!
//! Workspaces play the role of organizations. When the config names a
//! `workspace` only that one is returned, otherwise every workspace the user
//! has access to is listed. Listings follow the `next` link of each page.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::http::{self, Session};
use crate::config::ProviderConfig;
use crate::contract::{
    AuthMethod, Organization, Project, Provider, ProviderDescriptor, ProviderKind, RepoStream,
    Repository,
};
use crate::error::Result;

pub const DEFAULT_API_URL: &str = "https://api.bitbucket.org/2.0";
const PAGE_LEN: &str = "100";

pub static DESCRIPTOR: ProviderDescriptor = ProviderDescriptor {
    kind: ProviderKind::Bitbucket,
    auth_methods: &[AuthMethod::AppPassword],
    supports_projects: false,
    required_settings: &["username", "app_password"],
};

#[derive(Debug, Deserialize)]
struct Page<T> {
    values: Vec<T>,
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WorkspaceAccess {
    workspace: WorkspaceRef,
}

#[derive(Debug, Deserialize)]
struct WorkspaceRef {
    slug: String,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RepoLinks {
    #[serde(default)]
    clone: Vec<Link>,
    html: Option<Link>,
}

#[derive(Debug, Deserialize)]
struct MainBranch {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ProjectKey {
    key: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RepoResponse {
    slug: String,
    name: String,
    full_name: Option<String>,
    description: Option<String>,
    #[serde(default)]
    is_private: bool,
    size: Option<u64>,
    mainbranch: Option<MainBranch>,
    #[serde(default)]
    links: RepoLinks,
    project: Option<ProjectKey>,
}

impl RepoResponse {
    pub(crate) fn into_repository(self) -> Repository {
        let clone_link = |kind: &str| {
            self.links
                .clone
                .iter()
                .find(|l| l.name.as_deref() == Some(kind))
                .map(|l| l.href.clone())
        };
        let https = clone_link("https");
        let ssh = clone_link("ssh");

        let mut metadata = BTreeMap::new();
        metadata.insert("display_name".to_string(), self.name);
        if let Some(full_name) = self.full_name {
            metadata.insert("full_name".to_string(), full_name);
        }
        if let Some(html) = self.links.html {
            metadata.insert("html_url".to_string(), html.href);
        }
        if let Some(project) = self.project {
            metadata.insert("project_key".to_string(), project.key);
        }

        Repository {
            clone_url: https.unwrap_or_default(),
            ssh_url: ssh,
            name: self.slug,
            default_branch: self
                .mainbranch
                .map(|b| b.name)
                .unwrap_or_else(|| "main".to_string()),
            is_private: self.is_private,
            is_disabled: false,
            size_hint: self.size,
            description: self.description.filter(|d| !d.is_empty()),
            provider: ProviderKind::Bitbucket,
            metadata,
        }
    }
}

pub struct BitbucketProvider {
    username: String,
    app_password: String,
    workspace: Option<String>,
    api_url: String,
    session: Arc<Session>,
}

impl BitbucketProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            username: config.require("username")?.to_string(),
            app_password: config.require("app_password")?.to_string(),
            workspace: config.get("workspace").map(str::to_string),
            api_url: config
                .get("api_url")
                .unwrap_or(DEFAULT_API_URL)
                .trim_end_matches('/')
                .to_string(),
            session: Session::new(),
        })
    }

    async fn ping(&self) -> Result<()> {
        let client = self.session.client().await?;
        http::send(
            ProviderKind::Bitbucket,
            client
                .get(format!("{}/user", self.api_url))
                .basic_auth(&self.username, Some(&self.app_password)),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Provider for BitbucketProvider {
    fn descriptor(&self) -> &'static ProviderDescriptor {
        &DESCRIPTOR
    }

    async fn authenticate(&self) -> bool {
        match self.ping().await {
            Ok(()) => {
                info!(provider = "bitbucket", username = %self.username, "Authenticated");
                self.session.set_authenticated(true);
                true
            }
            Err(e) => {
                warn!(provider = "bitbucket", username = %self.username, error = %e, "Authentication failed");
                self.session.set_authenticated(false);
                false
            }
        }
    }

    async fn test_connection(&self) -> bool {
        if !self.session.is_authenticated() {
            return self.authenticate().await;
        }
        self.ping().await.is_ok()
    }

    async fn list_organizations(&self) -> Result<Vec<Organization>> {
        if let Some(workspace) = &self.workspace {
            return Ok(vec![Organization {
                name: workspace.clone(),
                url: format!("https://bitbucket.org/{workspace}"),
                provider: ProviderKind::Bitbucket,
                metadata: BTreeMap::new(),
            }]);
        }

        let client = self.session.client().await?;
        let mut orgs = Vec::new();
        let mut next = Some(format!(
            "{}/user/permissions/workspaces?pagelen={PAGE_LEN}",
            self.api_url
        ));
        while let Some(url) = next.take() {
            let page: Page<WorkspaceAccess> = http::get_json(
                ProviderKind::Bitbucket,
                client
                    .get(&url)
                    .basic_auth(&self.username, Some(&self.app_password)),
            )
            .await?;
            orgs.extend(page.values.into_iter().map(|access| {
                let ws = access.workspace;
                let mut metadata = BTreeMap::new();
                if let Some(name) = ws.name {
                    metadata.insert("display_name".to_string(), name);
                }
                Organization {
                    url: format!("https://bitbucket.org/{}", ws.slug),
                    name: ws.slug,
                    provider: ProviderKind::Bitbucket,
                    metadata,
                }
            }));
            next = page.next;
        }

        debug!(provider = "bitbucket", count = orgs.len(), "Listed workspaces");
        Ok(orgs)
    }

    async fn list_projects(&self, _org_name: &str) -> Result<Vec<Project>> {
        Ok(Vec::new())
    }

    fn list_repositories(&self, org_name: &str, _project_name: Option<&str>) -> RepoStream {
        let state = RepoPager {
            session: self.session.clone(),
            username: self.username.clone(),
            app_password: self.app_password.clone(),
            workspace: org_name.to_string(),
            next: Some(format!(
                "{}/repositories/{org_name}?pagelen={PAGE_LEN}",
                self.api_url
            )),
            buffer: VecDeque::new(),
        };

        futures::stream::unfold(state, |mut pager| async move {
            loop {
                if let Some(repo) = pager.buffer.pop_front() {
                    return Some((repo, pager));
                }
                let url = pager.next.take()?;
                if let Err(e) = pager.fetch(&url).await {
                    warn!(provider = "bitbucket", workspace = %pager.workspace, error = %e, "Repository listing failed, ending stream");
                    return None;
                }
            }
        })
        .boxed()
    }

    fn authenticated_clone_url(&self, repo: &Repository) -> Result<String> {
        http::embed_credentials(&repo.clone_url, &self.username, &self.app_password)
    }

    async fn close(&self) {
        self.session.close().await;
    }
}

struct RepoPager {
    session: Arc<Session>,
    username: String,
    app_password: String,
    workspace: String,
    next: Option<String>,
    buffer: VecDeque<Repository>,
}

impl RepoPager {
    async fn fetch(&mut self, url: &str) -> Result<()> {
        let client = self.session.client().await?;
        let page: Page<RepoResponse> = http::get_json(
            ProviderKind::Bitbucket,
            client
                .get(url)
                .basic_auth(&self.username, Some(&self.app_password)),
        )
        .await?;
        self.next = page.next;
        self.buffer
            .extend(page.values.into_iter().map(RepoResponse::into_repository));
        Ok(())
    }
}
