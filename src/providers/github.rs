//! GitHub / GitHub Enterprise backend (REST v3, bearer token).
//!
//! Organizations are the authenticated user's own account plus every org the
//! token can see. Repositories are paged 100 at a time; an organization name
//! that turns out to be a user account (404 on `/orgs/{name}/repos`) is retried
//! against `/users/{name}/repos`.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::http::{self, Session};
use crate::config::ProviderConfig;
use crate::contract::{
    AuthMethod, Organization, Project, Provider, ProviderDescriptor, ProviderKind, RepoStream,
    Repository,
};
use crate::error::{FleetError, Result};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
const PER_PAGE: usize = 100;

pub static DESCRIPTOR: ProviderDescriptor = ProviderDescriptor {
    kind: ProviderKind::GitHub,
    auth_methods: &[AuthMethod::Token, AuthMethod::Pat],
    supports_projects: false,
    required_settings: &["token"],
};

#[derive(Debug, Deserialize)]
struct UserResponse {
    login: String,
}

#[derive(Debug, Deserialize)]
struct OrgResponse {
    login: String,
    url: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RepoResponse {
    name: String,
    full_name: Option<String>,
    clone_url: String,
    ssh_url: Option<String>,
    html_url: Option<String>,
    default_branch: Option<String>,
    #[serde(default)]
    private: bool,
    #[serde(default)]
    archived: bool,
    #[serde(default)]
    disabled: bool,
    size: Option<u64>,
    description: Option<String>,
}

impl RepoResponse {
    pub(crate) fn into_repository(self) -> Repository {
        let mut metadata = BTreeMap::new();
        if let Some(full_name) = self.full_name {
            metadata.insert("full_name".to_string(), full_name);
        }
        if let Some(html_url) = self.html_url {
            metadata.insert("html_url".to_string(), html_url);
        }
        metadata.insert("archived".to_string(), self.archived.to_string());

        Repository {
            name: self.name,
            clone_url: self.clone_url,
            ssh_url: self.ssh_url,
            default_branch: self.default_branch.unwrap_or_else(|| "main".to_string()),
            is_private: self.private,
            is_disabled: self.disabled,
            // GitHub reports size in KB.
            size_hint: self.size.map(|kb| kb * 1024),
            description: self.description,
            provider: ProviderKind::GitHub,
            metadata,
        }
    }
}

pub struct GitHubProvider {
    token: String,
    api_url: String,
    session: Arc<Session>,
    login: RwLock<Option<String>>,
}

impl GitHubProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let token = config.require("token")?.to_string();
        let api_url = config
            .get("api_url")
            .unwrap_or(DEFAULT_API_URL)
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            token,
            api_url,
            session: Session::new(),
            login: RwLock::new(None),
        })
    }

    async fn current_user(&self) -> Result<UserResponse> {
        let client = self.session.client().await?;
        http::get_json(
            ProviderKind::GitHub,
            client
                .get(format!("{}/user", self.api_url))
                .bearer_auth(&self.token)
                .header("Accept", "application/vnd.github+json"),
        )
        .await
    }

    async fn login(&self) -> Result<String> {
        if let Some(login) = self.login.read().await.clone() {
            return Ok(login);
        }
        let user = self.current_user().await?;
        *self.login.write().await = Some(user.login.clone());
        Ok(user.login)
    }
}

#[async_trait]
impl Provider for GitHubProvider {
    fn descriptor(&self) -> &'static ProviderDescriptor {
        &DESCRIPTOR
    }

    async fn authenticate(&self) -> bool {
        match self.current_user().await {
            Ok(user) => {
                info!(provider = "github", login = %user.login, "Authenticated");
                *self.login.write().await = Some(user.login);
                self.session.set_authenticated(true);
                true
            }
            Err(e) => {
                warn!(provider = "github", error = %e, "Authentication failed");
                self.session.set_authenticated(false);
                false
            }
        }
    }

    async fn test_connection(&self) -> bool {
        if !self.session.is_authenticated() {
            return self.authenticate().await;
        }
        let client = match self.session.client().await {
            Ok(client) => client,
            Err(_) => return false,
        };
        http::send(
            ProviderKind::GitHub,
            client
                .get(format!("{}/rate_limit", self.api_url))
                .bearer_auth(&self.token),
        )
        .await
        .is_ok()
    }

    async fn list_organizations(&self) -> Result<Vec<Organization>> {
        let login = self.login().await?;
        let client = self.session.client().await?;

        let mut orgs = vec![Organization {
            name: login.clone(),
            url: format!("https://github.com/{login}"),
            provider: ProviderKind::GitHub,
            metadata: BTreeMap::from([("kind".to_string(), "user".to_string())]),
        }];

        let mut page = 1;
        loop {
            let batch: Vec<OrgResponse> = http::get_json(
                ProviderKind::GitHub,
                client
                    .get(format!("{}/user/orgs", self.api_url))
                    .query(&[("per_page", PER_PAGE.to_string()), ("page", page.to_string())])
                    .bearer_auth(&self.token)
                    .header("Accept", "application/vnd.github+json"),
            )
            .await?;
            let count = batch.len();
            orgs.extend(batch.into_iter().map(|org| {
                let mut metadata =
                    BTreeMap::from([("kind".to_string(), "organization".to_string())]);
                if let Some(description) = org.description {
                    metadata.insert("description".to_string(), description);
                }
                if let Some(api) = org.url {
                    metadata.insert("api_url".to_string(), api);
                }
                Organization {
                    url: format!("https://github.com/{}", org.login),
                    name: org.login,
                    provider: ProviderKind::GitHub,
                    metadata,
                }
            }));
            if count < PER_PAGE {
                break;
            }
            page += 1;
        }

        debug!(provider = "github", count = orgs.len(), "Listed organizations");
        Ok(orgs)
    }

    async fn list_projects(&self, _org_name: &str) -> Result<Vec<Project>> {
        Ok(Vec::new())
    }

    fn list_repositories(&self, org_name: &str, _project_name: Option<&str>) -> RepoStream {
        let state = RepoPager {
            session: self.session.clone(),
            api_url: self.api_url.clone(),
            token: self.token.clone(),
            own_login: self.login.try_read().ok().and_then(|l| l.clone()),
            org: org_name.to_string(),
            endpoint: None,
            page: 1,
            buffer: VecDeque::new(),
            done: false,
        };

        futures::stream::unfold(state, |mut pager| async move {
            loop {
                if let Some(repo) = pager.buffer.pop_front() {
                    return Some((repo, pager));
                }
                if pager.done {
                    return None;
                }
                if let Err(e) = pager.fetch_page().await {
                    warn!(provider = "github", org = %pager.org, error = %e, "Repository listing failed, ending stream");
                    return None;
                }
            }
        })
        .boxed()
    }

    fn authenticated_clone_url(&self, repo: &Repository) -> Result<String> {
        http::embed_credentials(&repo.clone_url, "x-access-token", &self.token)
    }

    async fn close(&self) {
        self.session.close().await;
        self.login.write().await.take();
    }
}

struct RepoPager {
    session: Arc<Session>,
    api_url: String,
    token: String,
    own_login: Option<String>,
    org: String,
    endpoint: Option<String>,
    page: usize,
    buffer: VecDeque<Repository>,
    done: bool,
}

impl RepoPager {
    fn initial_endpoint(&self) -> String {
        match &self.own_login {
            Some(login) if login.eq_ignore_ascii_case(&self.org) => {
                format!("{}/user/repos?affiliation=owner", self.api_url)
            }
            _ => format!("{}/orgs/{}/repos", self.api_url, self.org),
        }
    }

    async fn fetch_page(&mut self) -> Result<()> {
        let client = self.session.client().await?;
        let endpoint = match &self.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => self.initial_endpoint(),
        };

        let request = client
            .get(&endpoint)
            .query(&[("per_page", PER_PAGE.to_string()), ("page", self.page.to_string())])
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json");

        let batch: Vec<RepoResponse> = match http::get_json(ProviderKind::GitHub, request).await {
            Ok(batch) => batch,
            Err(FleetError::ProviderApi { status: 404, .. }) if self.endpoint.is_none() => {
                debug!(provider = "github", org = %self.org, "Not an organization, retrying as user");
                self.endpoint = Some(format!("{}/users/{}/repos", self.api_url, self.org));
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        self.endpoint.get_or_insert(endpoint);

        if batch.len() < PER_PAGE {
            self.done = true;
        }
        self.page += 1;
        self.buffer
            .extend(batch.into_iter().map(RepoResponse::into_repository));
        Ok(())
    }
}
