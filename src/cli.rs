use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::config::{FleetConfig, DEFAULT_CONCURRENCY};
use crate::contract::{GitRunner, Provider, ProviderKind};
use crate::discovery::{discover, DiscoveryOptions};
use crate::error::FleetError;
use crate::executor::{BatchExecutor, BatchOptions, CancelSignal};
use crate::git::GitCli;
use crate::load_config::{default_config_path, load_config};
use crate::orchestrator::{BulkOrchestrator, UpdateMode};
use crate::output::{render_bulk_summary, render_discovery, render_status, OutputFormat};
use crate::progress::{ProgressSink, TerminalProgress, TracingProgress};
use crate::query::QueryPattern;
use crate::registry::{scope_from_url, ProviderRegistry};
use crate::status::collect_status;

/// CLI for gitfleet: discover and bulk clone/pull repositories across providers.
#[derive(Parser)]
#[clap(
    name = "gitfleet",
    version,
    about = "Discover and bulk clone/pull git repositories across Azure DevOps, GitHub and Bitbucket"
)]
pub struct Cli {
    /// Path to the YAML config file (default: $GITFLEET_CONFIG or ~/.config/gitfleet/config.yaml)
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[clap(long, short, global = true)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List repositories matching an org/project/repo glob
    Discover {
        /// Query such as `pdidev/*/pay*`
        query: String,
        /// Configured provider name (default: default_provider)
        #[clap(long)]
        provider: Option<String>,
        #[clap(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
        /// Stop after this many repositories
        #[clap(long)]
        limit: Option<usize>,
        /// Include repositories the provider reports as disabled
        #[clap(long)]
        include_disabled: bool,
    },
    /// Clone or update every repository in a scope
    Clone {
        /// Query (`org/project/repo`) or an organization/project URL
        scope: String,
        /// Directory receiving one subdirectory per repository
        #[clap(long)]
        dest: PathBuf,
        #[clap(long)]
        provider: Option<String>,
        #[clap(long)]
        concurrency: Option<usize>,
        /// What to do when the repository directory already exists
        #[clap(long, value_enum, default_value_t = UpdateMode::Skip)]
        mode: UpdateMode,
        /// Run one repository at a time
        #[clap(long)]
        sequential: bool,
        /// Stop the batch at the first failure
        #[clap(long)]
        fail_fast: bool,
    },
    /// Show git status for every clone under a directory
    Status {
        #[clap(long)]
        dest: PathBuf,
        #[clap(long)]
        concurrency: Option<usize>,
        #[clap(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// List configured providers
    Providers {
        /// Also check each provider's credentials
        #[clap(long)]
        test: bool,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli, cancel: CancelSignal) -> Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let registry = ProviderRegistry::with_defaults();

    match cli.command {
        Commands::Discover {
            query,
            provider,
            format,
            limit,
            include_disabled,
        } => {
            let pattern = QueryPattern::parse(&query)?;
            let config = load_config(&config_path)?;
            let provider = connect(&config, &registry, provider.as_deref()).await?;

            let options = DiscoveryOptions {
                limit,
                include_disabled,
            };
            let report = discover(provider.as_ref(), &pattern, &options).await;
            provider.close().await;
            let report = report.context("discovery failed")?;

            print!("{}", render_discovery(&report, format)?);
            report_scope_failures(&report.failures);
            Ok(())
        }
        Commands::Clone {
            scope,
            dest,
            provider,
            concurrency,
            mode,
            sequential,
            fail_fast,
        } => {
            let config = load_config(&config_path)?;
            let (provider_name, pattern) = resolve_scope(&config, &scope, provider)?;
            let provider = connect(&config, &registry, provider_name.as_deref()).await?;

            let discovered =
                match discover(provider.as_ref(), &pattern, &DiscoveryOptions::default()).await {
                    Ok(discovered) => discovered,
                    Err(e) => {
                        provider.close().await;
                        return Err(anyhow::Error::new(e).context("discovery failed"));
                    }
                };
            report_scope_failures(&discovered.failures);
            let repos = discovered.into_repositories();
            if repos.is_empty() {
                println!("No repositories match '{pattern}'");
                provider.close().await;
                return Ok(());
            }

            let executor = BatchExecutor::new(BatchOptions {
                concurrency: concurrency.unwrap_or(config.concurrency),
                sequential,
                fail_fast,
                label: format!("{mode} {pattern}"),
            })
            .with_progress(progress_sink())
            .with_cancel(cancel.clone());

            let git: Arc<dyn GitRunner> = Arc::new(GitCli::new());
            let orchestrator = BulkOrchestrator::new(provider.clone(), git, dest, mode);
            let report = orchestrator.run(repos, &executor).await;
            provider.close().await;
            let report = report.context("bulk clone failed")?;

            print!("{}", render_bulk_summary(&report));
            if report.was_cancelled() && cancel.is_cancelled() {
                anyhow::bail!(FleetError::Cancelled);
            }
            Ok(())
        }
        Commands::Status {
            dest,
            concurrency,
            format,
        } => {
            // Status needs no credentials; the config only supplies a default concurrency.
            let default_concurrency = if config_path.exists() {
                load_config(&config_path)?.concurrency
            } else {
                DEFAULT_CONCURRENCY
            };
            let executor = BatchExecutor::new(BatchOptions {
                concurrency: concurrency.unwrap_or(default_concurrency),
                label: "status".to_string(),
                ..BatchOptions::default()
            })
            .with_cancel(cancel);

            let git: Arc<dyn GitRunner> = Arc::new(GitCli::new());
            let statuses = collect_status(&dest, git, &executor)
                .await
                .with_context(|| format!("cannot scan {}", dest.display()))?;
            print!("{}", render_status(&statuses, format)?);
            Ok(())
        }
        Commands::Providers { test } => {
            let config = load_config(&config_path)?;
            let default = config.default_provider_name();
            for provider_config in &config.providers {
                let marker = if default.as_deref() == Some(provider_config.name.as_str()) {
                    " (default)"
                } else {
                    ""
                };
                let mut line = format!(
                    "{}\t{}{marker}",
                    provider_config.name, provider_config.provider_type
                );
                if test {
                    let state = match registry.create_from_config(provider_config) {
                        Ok(provider) => {
                            let ok = provider.test_connection().await;
                            provider.close().await;
                            if ok {
                                "ok".to_string()
                            } else {
                                "authentication failed".to_string()
                            }
                        }
                        Err(e) => e.to_string(),
                    };
                    line.push_str(&format!("\t{state}"));
                }
                println!("{line}");
            }
            Ok(())
        }
    }
}

/// Work out which configured provider and query a clone scope refers to.
fn resolve_scope(
    config: &FleetConfig,
    scope: &str,
    provider: Option<String>,
) -> Result<(Option<String>, QueryPattern)> {
    let looks_like_url = scope.contains("://") || (scope.contains('@') && scope.contains(':'));
    if !looks_like_url {
        return Ok((provider, QueryPattern::parse(scope)?));
    }

    let (kind, pattern) = scope_from_url(scope)?;
    if provider.is_some() {
        return Ok((provider, pattern));
    }
    let candidate = config
        .providers
        .iter()
        .find(|p| p.provider_type.parse::<ProviderKind>().ok() == Some(kind))
        .ok_or_else(|| {
            FleetError::Configuration(format!(
                "no configured provider of type '{kind}' for {scope}"
            ))
        })?;
    info!(provider = %candidate.name, %kind, "Selected provider from scope URL");
    Ok((Some(candidate.name.clone()), pattern))
}

/// Build and authenticate the selected provider. Rejected credentials are fatal.
async fn connect(
    config: &FleetConfig,
    registry: &ProviderRegistry,
    name: Option<&str>,
) -> Result<Arc<dyn Provider>> {
    let provider_config = config.select_provider(name)?;
    let provider = registry.create_from_config(provider_config)?;
    if !provider.authenticate().await {
        provider.close().await;
        return Err(FleetError::Authentication {
            provider: provider_config.name.clone(),
            message: "credentials were rejected".to_string(),
        }
        .into());
    }
    Ok(provider)
}

fn report_scope_failures(failures: &[(String, FleetError)]) {
    for (scope, e) in failures {
        warn!(org = %scope, error = %e, "Organization skipped");
        eprintln!("warning: skipped organization {scope}: {e}");
    }
}

/// Bars on an interactive terminal, log lines when stderr is redirected.
fn progress_sink() -> Arc<dyn ProgressSink> {
    if std::io::stderr().is_terminal() {
        Arc::new(TerminalProgress::new())
    } else {
        Arc::new(TracingProgress)
    }
}
