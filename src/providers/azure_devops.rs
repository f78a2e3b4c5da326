//! Azure DevOps backend (REST 7.0, PAT over basic auth).
//!
//! A PAT is scoped to a single organization, so the organization list is
//! synthesized from the configured `org_url` instead of being queried:
//! `https://dev.azure.com/<org>` yields `<org>`, the legacy
//! `https://<org>.visualstudio.com` form yields the full host name.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use super::http::{self, Session};
use crate::config::ProviderConfig;
use crate::contract::{
    AuthMethod, Organization, Project, Provider, ProviderDescriptor, ProviderKind, RepoStream,
    Repository,
};
use crate::error::{FleetError, Result};

const API_VERSION: &str = "7.0";
const PROJECTS_PAGE_SIZE: usize = 100;
const CONTINUATION_HEADER: &str = "x-ms-continuationtoken";

pub static DESCRIPTOR: ProviderDescriptor = ProviderDescriptor {
    kind: ProviderKind::AzureDevOps,
    auth_methods: &[AuthMethod::Pat],
    supports_projects: true,
    required_settings: &["org_url", "pat"],
};

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    value: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectItem {
    id: Option<String>,
    name: String,
    description: Option<String>,
    state: Option<String>,
    visibility: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RepoItem {
    id: Option<String>,
    name: String,
    remote_url: String,
    ssh_url: Option<String>,
    web_url: Option<String>,
    default_branch: Option<String>,
    is_disabled: Option<bool>,
    size: Option<u64>,
    project: Option<ProjectRef>,
}

#[derive(Debug, Deserialize)]
struct ProjectRef {
    name: String,
    visibility: Option<String>,
}

impl RepoItem {
    pub(crate) fn into_repository(self) -> Repository {
        let mut metadata = BTreeMap::new();
        if let Some(id) = self.id {
            metadata.insert("id".to_string(), id);
        }
        if let Some(web_url) = self.web_url {
            metadata.insert("web_url".to_string(), web_url);
        }
        let mut is_private = true;
        if let Some(project) = self.project {
            is_private = project.visibility.as_deref() != Some("public");
            metadata.insert("project".to_string(), project.name);
        }

        Repository {
            name: self.name,
            clone_url: self.remote_url,
            ssh_url: self.ssh_url,
            default_branch: self
                .default_branch
                .map(|b| b.trim_start_matches("refs/heads/").to_string())
                .unwrap_or_else(|| "main".to_string()),
            is_private,
            is_disabled: self.is_disabled.unwrap_or(false),
            size_hint: self.size,
            description: None,
            provider: ProviderKind::AzureDevOps,
            metadata,
        }
    }
}

/// Organization name and API base derived from a configured org URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct OrgLocation {
    pub(crate) name: String,
    pub(crate) base: Url,
}

pub(crate) fn parse_org_url(raw: &str) -> Result<OrgLocation> {
    let invalid = |why: &str| {
        FleetError::Configuration(format!("invalid Azure DevOps org_url '{raw}': {why}"))
    };

    let mut base =
        Url::parse(raw.trim().trim_end_matches('/')).map_err(|e| invalid(&e.to_string()))?;
    let host = base.host_str().ok_or_else(|| invalid("missing host"))?.to_ascii_lowercase();

    let name = if host == "dev.azure.com" {
        let org = base
            .path_segments()
            .and_then(|mut segments| segments.next())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| invalid("expected https://dev.azure.com/<organization>"))?
            .to_string();
        base.set_path(&org);
        org
    } else if host.ends_with(".visualstudio.com") {
        base.set_path("");
        host
    } else {
        // On-premises Azure DevOps Server: the collection URL is used as-is.
        host
    };

    Ok(OrgLocation { name, base })
}

pub struct AzureDevOpsProvider {
    pat: String,
    org: OrgLocation,
    session: Arc<Session>,
}

impl AzureDevOpsProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let org = parse_org_url(config.require("org_url")?)?;
        let pat = config.require("pat")?.to_string();
        Ok(Self {
            pat,
            org,
            session: Session::new(),
        })
    }

    fn check_org(&self, org_name: &str) -> Result<()> {
        if org_name == self.org.name {
            Ok(())
        } else {
            Err(FleetError::Validation(format!(
                "organization '{org_name}' is not served by this provider (configured: '{}')",
                self.org.name
            )))
        }
    }
}

fn api_url(base: &Url, project: Option<&str>, tail: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty();
        if let Some(project) = project {
            segments.push(project);
        }
        segments.extend(tail);
    }
    url.query_pairs_mut().append_pair("api-version", API_VERSION);
    url
}

/// GET with the PAT; Azure answers 203 with a sign-in page for rejected PATs.
async fn ado_get<T: DeserializeOwned>(
    client: &reqwest::Client,
    pat: &str,
    url: Url,
) -> Result<(T, Option<String>)> {
    let response = http::send(
        ProviderKind::AzureDevOps,
        client.get(url).basic_auth("", Some(pat)),
    )
    .await?;

    if response.status() == StatusCode::NON_AUTHORITATIVE_INFORMATION {
        return Err(FleetError::Authentication {
            provider: ProviderKind::AzureDevOps.to_string(),
            message: "personal access token rejected (203 sign-in redirect)".to_string(),
        });
    }

    let continuation = response
        .headers()
        .get(CONTINUATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let body = response.json::<T>().await.map_err(|e| FleetError::ProviderApi {
        provider: ProviderKind::AzureDevOps.to_string(),
        status: 200,
        message: format!("failed to decode response: {e}"),
    })?;
    Ok((body, continuation))
}

#[async_trait]
impl Provider for AzureDevOpsProvider {
    fn descriptor(&self) -> &'static ProviderDescriptor {
        &DESCRIPTOR
    }

    async fn authenticate(&self) -> bool {
        let result = async {
            let client = self.session.client().await?;
            let mut url = api_url(&self.org.base, None, &["_apis", "projects"]);
            url.query_pairs_mut().append_pair("$top", "1");
            ado_get::<ListResponse<ProjectItem>>(&client, &self.pat, url).await
        }
        .await;

        match result {
            Ok(_) => {
                info!(provider = "azuredevops", org = %self.org.name, "Authenticated");
                self.session.set_authenticated(true);
                true
            }
            Err(e) => {
                warn!(provider = "azuredevops", org = %self.org.name, error = %e, "Authentication failed");
                self.session.set_authenticated(false);
                false
            }
        }
    }

    async fn test_connection(&self) -> bool {
        // The cheapest authenticated call is the same one-project listing.
        self.authenticate().await
    }

    async fn list_organizations(&self) -> Result<Vec<Organization>> {
        Ok(vec![Organization {
            name: self.org.name.clone(),
            url: self.org.base.to_string(),
            provider: ProviderKind::AzureDevOps,
            metadata: BTreeMap::from([("synthesized".to_string(), "true".to_string())]),
        }])
    }

    async fn list_projects(&self, org_name: &str) -> Result<Vec<Project>> {
        self.check_org(org_name)?;
        let client = self.session.client().await?;

        let mut projects = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let mut url = api_url(&self.org.base, None, &["_apis", "projects"]);
            url.query_pairs_mut()
                .append_pair("$top", &PROJECTS_PAGE_SIZE.to_string());
            if let Some(token) = &continuation {
                url.query_pairs_mut().append_pair("continuationToken", token);
            }

            let (page, next): (ListResponse<ProjectItem>, _) =
                ado_get(&client, &self.pat, url).await?;
            projects.extend(page.value.into_iter().map(|p| {
                let mut metadata = BTreeMap::new();
                let fields = [("id", p.id), ("state", p.state), ("visibility", p.visibility)];
                for (key, value) in fields {
                    if let Some(value) = value {
                        metadata.insert(key.to_string(), value);
                    }
                }
                Project {
                    name: p.name,
                    organization: self.org.name.clone(),
                    description: p.description,
                    metadata,
                }
            }));

            match next.filter(|t| !t.is_empty()) {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }

        debug!(provider = "azuredevops", org = %org_name, count = projects.len(), "Listed projects");
        Ok(projects)
    }

    fn list_repositories(&self, org_name: &str, project_name: Option<&str>) -> RepoStream {
        if let Err(e) = self.check_org(org_name) {
            warn!(provider = "azuredevops", error = %e, "Repository listing skipped");
            return futures::stream::empty().boxed();
        }

        let session = self.session.clone();
        let pat = self.pat.clone();
        let url = api_url(&self.org.base, project_name, &["_apis", "git", "repositories"]);
        let scope = format!("{}/{}", org_name, project_name.unwrap_or("*"));

        // The repositories endpoint is not paged: one request, then drain.
        futures::stream::once(async move {
            let result = async {
                let client = session.client().await?;
                ado_get::<ListResponse<RepoItem>>(&client, &pat, url).await
            }
            .await;
            match result {
                Ok((list, _)) => list
                    .value
                    .into_iter()
                    .map(RepoItem::into_repository)
                    .collect::<VecDeque<_>>(),
                Err(e) => {
                    warn!(provider = "azuredevops", scope = %scope, error = %e, "Repository listing failed, ending stream");
                    VecDeque::new()
                }
            }
        })
        .flat_map(futures::stream::iter)
        .boxed()
    }

    fn authenticated_clone_url(&self, repo: &Repository) -> Result<String> {
        http::embed_credentials(&repo.clone_url, "PersonalAccessToken", &self.pat)
    }

    async fn close(&self) {
        self.session.close().await;
    }
}
