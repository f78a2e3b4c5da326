//! Local clone status: scan a destination directory and summarise each
//! repository from `git status --porcelain=v1 --branch`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use crate::contract::GitRunner;
use crate::error::{FleetError, Result};
use crate::executor::BatchExecutor;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepositoryStatus {
    pub path: PathBuf,
    pub is_clean: bool,
    pub branch_name: Option<String>,
    pub remote_branch: Option<String>,
    pub ahead_by: u32,
    pub behind_by: u32,
    pub modified_files: u32,
    pub untracked_files: u32,
    pub staged_files: u32,
    pub error: Option<String>,
}

impl RepositoryStatus {
    pub fn failed(path: PathBuf, error: &FleetError) -> Self {
        Self {
            path,
            error: Some(error.to_string()),
            ..Self::default()
        }
    }

    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

static BRANCH_HEADER: OnceLock<std::result::Result<Regex, regex::Error>> = OnceLock::new();

/// The `## branch...remote [ahead N, behind M]` line, compiled once per process.
fn branch_header() -> Result<&'static Regex> {
    BRANCH_HEADER
        .get_or_init(|| {
            Regex::new(
                r"^## (?:No commits yet on |Initial commit on )?(?P<branch>[^.\s]+(?:\.[^.\s]+)*?)(?:\.\.\.(?P<remote>\S+))?(?: \[(?:ahead (?P<ahead>\d+))?(?:, )?(?:behind (?P<behind>\d+))?(?:gone)?\])?$",
            )
        })
        .as_ref()
        .map_err(|e| FleetError::Validation(format!("invalid branch header pattern: {e}")))
}

/// Parse porcelain v1 output (with `--branch`) into a status snapshot.
pub fn parse_porcelain_status(path: &Path, output: &str) -> Result<RepositoryStatus> {
    let header = branch_header()?;
    let mut status = RepositoryStatus {
        path: path.to_path_buf(),
        ..RepositoryStatus::default()
    };

    for line in output.lines() {
        if let Some(caps) = header.captures(line) {
            status.branch_name = caps.name("branch").map(|m| m.as_str().to_string());
            status.remote_branch = caps.name("remote").map(|m| m.as_str().to_string());
            status.ahead_by = caps
                .name("ahead")
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(0);
            status.behind_by = caps
                .name("behind")
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(0);
            continue;
        }
        if line.starts_with("##") {
            // Detached HEAD and other headers carry no branch name.
            continue;
        }

        let mut code = line.chars();
        let (Some(x), Some(y)) = (code.next(), code.next()) else {
            continue;
        };
        if x == '?' && y == '?' {
            status.untracked_files += 1;
            continue;
        }
        if x != ' ' && x != '!' {
            status.staged_files += 1;
        }
        if y != ' ' && y != '!' {
            status.modified_files += 1;
        }
    }

    status.is_clean =
        status.staged_files == 0 && status.modified_files == 0 && status.untracked_files == 0;
    Ok(status)
}

/// Immediate subdirectories of `dest` that contain `.git`, sorted by name.
pub fn find_repositories(dest: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dest)? {
        let path = entry?.path();
        if path.is_dir() && path.join(".git").exists() {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

/// Status of every clone under `dest`. One entry per repository directory;
/// failures land in the entry's `error` field.
pub async fn collect_status(
    dest: &Path,
    git: Arc<dyn GitRunner>,
    executor: &BatchExecutor,
) -> Result<Vec<RepositoryStatus>> {
    let repos = find_repositories(dest)?;
    info!(path = %dest.display(), count = repos.len(), "Collecting repository status");

    let items: Vec<StatusItem> = repos.into_iter().map(StatusItem).collect();
    let outcome = executor
        .run(items.clone(), |item| {
            let git = git.clone();
            async move {
                let output = git.status(&item.0).await?;
                parse_porcelain_status(&item.0, &output)
            }
        })
        .await;

    // Errors arrive in completion order; match them back by path.
    let mut failures: HashMap<PathBuf, FleetError> = outcome
        .errors
        .into_iter()
        .map(|(item, e)| (item.0, e))
        .collect();
    let statuses = items
        .into_iter()
        .zip(outcome.results)
        .map(|(item, result)| match result {
            Some(status) => status,
            None => match failures.remove(&item.0) {
                Some(e) => {
                    warn!(
                        path = %item.0.display(),
                        error = %e,
                        "Failed to read repository status"
                    );
                    RepositoryStatus::failed(item.0, &e)
                }
                None => RepositoryStatus::failed(item.0, &FleetError::Cancelled),
            },
        })
        .collect();
    Ok(statuses)
}

/// Executor item: a repository directory, displayed by its folder name.
#[derive(Debug, Clone)]
struct StatusItem(PathBuf);

impl std::fmt::Display for StatusItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.file_name() {
            Some(name) => write!(f, "{}", name.to_string_lossy()),
            None => write!(f, "{}", self.0.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::MockGitRunner;
    use crate::executor::BatchOptions;
    use tempfile::tempdir;

    #[test]
    fn parses_branch_header_with_tracking_counts() {
        let out = concat!(
            "## main...origin/main [ahead 2, behind 3]\n",
            " M src/lib.rs\n",
            "M  README.md\n",
            "MM Cargo.toml\n",
            "?? notes.txt\n",
        );
        let status = parse_porcelain_status(Path::new("/r/api"), out).unwrap();
        assert_eq!(status.branch_name.as_deref(), Some("main"));
        assert_eq!(status.remote_branch.as_deref(), Some("origin/main"));
        assert_eq!((status.ahead_by, status.behind_by), (2, 3));
        assert_eq!(status.staged_files, 2);
        assert_eq!(status.modified_files, 2);
        assert_eq!(status.untracked_files, 1);
        assert!(!status.is_clean);
    }

    #[test]
    fn clean_branch_without_upstream() {
        let status = parse_porcelain_status(Path::new("/r/api"), "## feature/v1.2\n").unwrap();
        assert_eq!(status.branch_name.as_deref(), Some("feature/v1.2"));
        assert_eq!(status.remote_branch, None);
        assert_eq!((status.ahead_by, status.behind_by), (0, 0));
        assert!(status.is_clean);
    }

    #[test]
    fn behind_only_header() {
        let header = "## dev...origin/dev [behind 7]\n";
        let status = parse_porcelain_status(Path::new("/r/api"), header).unwrap();
        assert_eq!(status.branch_name.as_deref(), Some("dev"));
        assert_eq!(status.remote_branch.as_deref(), Some("origin/dev"));
        assert_eq!((status.ahead_by, status.behind_by), (0, 7));
    }

    #[test]
    fn branch_header_pattern_is_compiled_once() {
        let first = branch_header().unwrap();
        let second = branch_header().unwrap();
        assert!(std::ptr::eq(first, second));
    }

    #[tokio::test]
    async fn collect_status_records_per_repository_errors() {
        let dest = tempdir().unwrap();
        for name in ["alpha", "beta"] {
            std::fs::create_dir_all(dest.path().join(name).join(".git")).unwrap();
        }
        std::fs::create_dir_all(dest.path().join("plain-dir")).unwrap();

        let mut git = MockGitRunner::new();
        git.expect_status().times(2).returning(|dir| {
            if dir.ends_with("alpha") {
                Ok("## main...origin/main\n".to_string())
            } else {
                Err(FleetError::repo_op("beta", "status failed"))
            }
        });

        let executor = BatchExecutor::new(BatchOptions::default());
        let statuses = collect_status(dest.path(), Arc::new(git), &executor)
            .await
            .unwrap();

        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[0].display_name(), "alpha");
        assert!(statuses[0].is_clean);
        assert_eq!(statuses[1].display_name(), "beta");
        assert_eq!(statuses[1].error.as_deref(), Some("beta: status failed"));
    }
}
