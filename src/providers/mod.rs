//! Hosting backends implementing [`crate::contract::Provider`].
//!
//! Each backend exposes a `DESCRIPTOR` with its static capabilities and a
//! `new(&ProviderConfig)` constructor that rejects configs missing required
//! settings. Backends are wired into a [`crate::registry::ProviderRegistry`]
//! explicitly; nothing here is discovered at runtime.

pub mod azure_devops;
pub mod bitbucket;
pub mod github;
pub mod http;

pub use azure_devops::AzureDevOpsProvider;
pub use bitbucket::BitbucketProvider;
pub use github::GitHubProvider;
