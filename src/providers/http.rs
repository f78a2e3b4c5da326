//! Shared HTTP plumbing for the backends: client construction, status mapping,
//! and embedding credentials into clone URLs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tracing::warn;
use url::Url;

use crate::contract::ProviderKind;
use crate::error::{FleetError, Result};

const USER_AGENT: &str = concat!("gitfleet/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn build_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| FleetError::Connection(format!("failed to build HTTP client: {e}")))
}

/// Per-provider-instance HTTP session, shared read-only by concurrent listings.
///
/// The client is created lazily on first use and dropped by [`Session::close`];
/// repository streams hold an `Arc<Session>` and fetch the client when first polled.
#[derive(Default)]
pub(crate) struct Session {
    client: RwLock<Option<reqwest::Client>>,
    authenticated: AtomicBool,
}

impl Session {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) async fn client(&self) -> Result<reqwest::Client> {
        if let Some(client) = self.client.read().await.as_ref() {
            return Ok(client.clone());
        }
        let mut guard = self.client.write().await;
        match guard.as_ref() {
            Some(client) => Ok(client.clone()),
            None => {
                let client = build_client()?;
                *guard = Some(client.clone());
                Ok(client)
            }
        }
    }

    pub(crate) fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    pub(crate) fn set_authenticated(&self, value: bool) {
        self.authenticated.store(value, Ordering::SeqCst);
    }

    pub(crate) async fn close(&self) {
        self.set_authenticated(false);
        self.client.write().await.take();
    }

    pub(crate) async fn is_open(&self) -> bool {
        self.client.read().await.is_some()
    }
}

/// Send a request and map non-success statuses onto the error taxonomy.
pub(crate) async fn send(provider: ProviderKind, request: RequestBuilder) -> Result<Response> {
    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = truncate(&body, 200);
    warn!(%provider, %status, body = %message, "Provider API returned non-success status");

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(FleetError::Authentication {
            provider: provider.to_string(),
            message: format!("{status}: {message}"),
        }),
        _ => Err(FleetError::ProviderApi {
            provider: provider.to_string(),
            status: status.as_u16(),
            message,
        }),
    }
}

pub(crate) async fn get_json<T: DeserializeOwned>(
    provider: ProviderKind,
    request: RequestBuilder,
) -> Result<T> {
    let response = send(provider, request).await?;
    response.json::<T>().await.map_err(|e| FleetError::ProviderApi {
        provider: provider.to_string(),
        status: 200,
        message: format!("failed to decode response: {e}"),
    })
}

/// Replace any userinfo in an HTTPS URL with `username:password`.
pub(crate) fn embed_credentials(clone_url: &str, username: &str, password: &str) -> Result<String> {
    let mut url = Url::parse(clone_url)
        .map_err(|e| FleetError::Validation(format!("invalid clone URL '{clone_url}': {e}")))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(FleetError::Validation(format!(
            "cannot embed credentials into non-HTTP clone URL '{clone_url}'"
        )));
    }

    url.set_username(username)
        .and_then(|_| url.set_password(Some(password)))
        .map_err(|_| FleetError::Validation(format!("cannot set credentials on '{clone_url}'")))?;

    Ok(url.to_string())
}

/// Hide the password part of a URL for logging.
pub fn redact_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) if url.password().is_some() || !url.username().is_empty() => {
            let _ = url.set_username("***");
            let _ = url.set_password(None);
            url.to_string()
        }
        _ => raw.to_string(),
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        format!("{}...", text.chars().take(max).collect::<String>())
    }
}
