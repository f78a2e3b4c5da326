//! Error taxonomy shared by every layer of gitfleet.
//!
//! Errors fall into two groups:
//! - operation-fatal kinds (bad configuration, invalid input, rejected credentials,
//!   unresolvable provider) which abort the whole command before or at its first I/O,
//! - item-scoped kinds (API/connection failures for one organization, a failed git
//!   subprocess for one repository) which are recorded at the batch boundary and
//!   reported in the final summary.
//!
//! See [`FleetError::is_fatal`].

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, FleetError>;

#[derive(Error, Debug)]
pub enum FleetError {
    /// Missing or malformed provider configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Credentials were rejected by the backend.
    #[error("authentication failed for provider '{provider}': {message}")]
    Authentication { provider: String, message: String },

    /// Transport-level failure talking to a backend.
    #[error("connection error: {0}")]
    Connection(String),

    /// The backend answered with a non-success status.
    #[error("{provider} API error (status {status}): {message}")]
    ProviderApi {
        provider: String,
        status: u16,
        message: String,
    },

    /// Unknown provider type, or a URL no detection rule recognises.
    #[error("provider not found: {0}")]
    ProviderNotFound(String),

    /// The provider type is known but cannot be constructed.
    #[error("provider '{provider}' unavailable: {reason}")]
    ProviderUnavailable { provider: String, reason: String },

    /// A git subprocess (or the filesystem step around it) failed for one repository.
    #[error("{repo}: {reason}{}", detail.as_ref().map(|d| format!(" ({d})")).unwrap_or_default())]
    RepositoryOperation {
        repo: String,
        reason: String,
        detail: Option<String>,
    },

    /// Malformed query pattern or CLI input.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The batch was aborted before this item finished.
    #[error("cancelled")]
    Cancelled,
}

impl FleetError {
    pub fn repo_op(repo: impl Into<String>, reason: impl Into<String>) -> Self {
        FleetError::RepositoryOperation {
            repo: repo.into(),
            reason: reason.into(),
            detail: None,
        }
    }

    pub fn repo_op_with(
        repo: impl Into<String>,
        reason: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        FleetError::RepositoryOperation {
            repo: repo.into(),
            reason: reason.into(),
            detail: Some(detail.into()),
        }
    }

    /// True for kinds that abort the whole operation rather than one item.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FleetError::Configuration(_)
                | FleetError::Authentication { .. }
                | FleetError::ProviderNotFound(_)
                | FleetError::ProviderUnavailable { .. }
                | FleetError::Validation(_)
        )
    }

    /// Short tag used in summaries, e.g. `"clone failed"`.
    pub fn reason(&self) -> String {
        match self {
            FleetError::RepositoryOperation { reason, .. } => reason.clone(),
            FleetError::Cancelled => "cancelled".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for FleetError {
    fn from(e: reqwest::Error) -> Self {
        FleetError::Connection(e.to_string())
    }
}

impl From<serde_yaml::Error> for FleetError {
    fn from(e: serde_yaml::Error) -> Self {
        FleetError::Configuration(format!("failed to parse config YAML: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_kinds_are_classified() {
        assert!(FleetError::Validation("x".into()).is_fatal());
        assert!(FleetError::ProviderNotFound("x".into()).is_fatal());
        assert!(!FleetError::Connection("x".into()).is_fatal());
        assert!(!FleetError::repo_op("api", "clone failed").is_fatal());
        assert!(!FleetError::Cancelled.is_fatal());
    }

    #[test]
    fn repository_operation_reason_is_the_short_tag() {
        let err = FleetError::repo_op_with("payment-api", "pull failed", "exit code 1");
        assert_eq!(err.reason(), "pull failed");
        assert_eq!(err.to_string(), "payment-api: pull failed (exit code 1)");
    }
}
