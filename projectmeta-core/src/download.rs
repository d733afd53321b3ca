//! # download: make document sources available locally
//!
//! Sources are declared in configuration as either a git repository, which
//! is cloned into a deterministic directory under `output_dir`, or a local
//! directory, which is used in place.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::contract::{
    DownloadError, DownloadedManifest, DownloadedSource, Downloader, FailedDocument,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    pub output_dir: PathBuf,
    pub sources: Vec<SourceAction>,
}

/// Where a document comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceAction {
    Git(GitSource),
    Local(LocalSource),
}

impl SourceAction {
    /// Repository URL or local path, for logs and failure reports.
    pub fn logical_name(&self) -> String {
        match self {
            SourceAction::Git(git) => git.repo_url.clone(),
            SourceAction::Local(local) => local.path.display().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitSource {
    pub repo_url: String,
    /// Branch, tag or commit. The clone's default branch when unset.
    #[serde(default)]
    pub reference: Option<String>,
    pub root_tex: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalSource {
    pub path: PathBuf,
    pub root_tex: PathBuf,
}

#[derive(Debug, Error)]
pub enum GitError {
    #[error("filesystem error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to launch git: {0}")]
    Launch(#[source] io::Error),

    #[error("git {action} exited with {status}")]
    Exit { action: &'static str, status: String },

    #[error("local source {0} does not exist")]
    MissingLocal(PathBuf),

    #[error("{0} does not exist")]
    MissingPath(PathBuf),

    #[error("{0} has no commits")]
    NoCommit(PathBuf),

    #[error("unreadable commit timestamp {timestamp:?}: {source}")]
    Timestamp {
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("no committed files with extensions {extensions:?} under {root}")]
    NoContent {
        root: PathBuf,
        extensions: Vec<String>,
    },
}

/// Directory name for a cloned repository: URL and reference with path
/// separators flattened.
pub fn git_dir_name(repo_url: &str, reference: Option<&str>) -> String {
    format!("git_{}_{}", repo_url, reference.unwrap_or("default"))
        .replace(['/', ':'], "_")
}

pub struct DefaultDownloader {
    config: DownloadConfig,
}

impl DefaultDownloader {
    pub fn new(config: DownloadConfig) -> Self {
        Self { config }
    }

    fn fetch(&self, source: &SourceAction) -> Result<DownloadedSource, GitError> {
        match source {
            SourceAction::Git(git) => {
                let target = self
                    .config
                    .output_dir
                    .join(git_dir_name(&git.repo_url, git.reference.as_deref()));
                clone_repository(&git.repo_url, git.reference.as_deref(), &target)?;
                Ok(DownloadedSource {
                    logical_name: source.logical_name(),
                    local_path: target,
                    root_tex: git.root_tex.clone(),
                    original_source: source.clone(),
                })
            }
            SourceAction::Local(local) => {
                if !local.path.is_dir() {
                    error!(path = %local.path.display(), "Local source directory not found");
                    return Err(GitError::MissingLocal(local.path.clone()));
                }
                debug!(path = %local.path.display(), "Using local source in place");
                Ok(DownloadedSource {
                    logical_name: source.logical_name(),
                    local_path: local.path.clone(),
                    root_tex: local.root_tex.clone(),
                    original_source: source.clone(),
                })
            }
        }
    }
}

#[async_trait::async_trait]
impl Downloader for DefaultDownloader {
    async fn download_all(&self) -> Result<DownloadedManifest, DownloadError> {
        let mut manifest = DownloadedManifest::default();
        for source in &self.config.sources {
            match self.fetch(source) {
                Ok(downloaded) => manifest.sources.push(downloaded),
                Err(e) => {
                    let logical_name = source.logical_name();
                    error!(source = %logical_name, error = %e, "[DOWNLOAD] Skipping source");
                    manifest.failed.push(FailedDocument {
                        logical_name,
                        error: e.to_string(),
                    });
                }
            }
        }
        info!(
            downloaded = manifest.sources.len(),
            failed = manifest.failed.len(),
            "Downloaded sources"
        );
        Ok(manifest)
    }
}

/// Fresh `git clone` of `repo_url` into `target`, then `git checkout` of
/// `reference` when one is given. An existing `target` is removed first.
pub fn clone_repository(
    repo_url: &str,
    reference: Option<&str>,
    target: &Path,
) -> Result<(), GitError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: io::Error| GitError::Io { path, source }
    };

    if target.exists() {
        fs::remove_dir_all(target).map_err(io_err(target))?;
        debug!(path = %target.display(), "Removed existing source directory");
    } else if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }

    let status = Command::new("git")
        .arg("clone")
        .arg("--quiet")
        .arg(repo_url)
        .arg(target)
        .status()
        .map_err(|e| {
            error!(error = ?e, repo_url, "Failed to launch git process");
            GitError::Launch(e)
        })?;
    if !status.success() {
        error!(
            repo_url,
            path = %target.display(),
            %status,
            "git clone exited with non-zero code"
        );
        return Err(GitError::Exit {
            action: "clone",
            status: status.to_string(),
        });
    }
    info!(repo_url, path = %target.display(), "Cloned git repository");

    if let Some(reference) = reference {
        let status = Command::new("git")
            .arg("-C")
            .arg(target)
            .arg("checkout")
            .arg("--quiet")
            .arg(reference)
            .status()
            .map_err(GitError::Launch)?;
        if !status.success() {
            error!(
                repo_url,
                reference,
                %status,
                "git checkout exited with non-zero code"
            );
            return Err(GitError::Exit {
                action: "checkout",
                status: status.to_string(),
            });
        }
        info!(repo_url, reference, "Checked out reference");
    }
    Ok(())
}

/// Time of the last commit touching `path`, from `git log` run in the
/// file's directory.
pub fn read_git_commit_timestamp_for_file(path: &Path) -> Result<DateTime<Utc>, GitError> {
    if !path.exists() {
        return Err(GitError::MissingPath(path.to_path_buf()));
    }
    let (dir, file) = match (path.parent(), path.file_name()) {
        (Some(dir), Some(file)) if !dir.as_os_str().is_empty() => (dir, Path::new(file)),
        _ => (Path::new("."), path),
    };

    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(["log", "-1", "--format=%cI", "--"])
        .arg(file)
        .output()
        .map_err(GitError::Launch)?;
    if !output.status.success() {
        return Err(GitError::Exit {
            action: "log",
            status: output.status.to_string(),
        });
    }

    let timestamp = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if timestamp.is_empty() {
        return Err(GitError::NoCommit(path.to_path_buf()));
    }
    DateTime::parse_from_rfc3339(&timestamp)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|source| GitError::Timestamp { timestamp, source })
}

/// Files under `root_dir` with extension `extension` (case-sensitive),
/// relative to `root_dir`. `.git` directories are not searched.
pub fn iter_filepaths_with_extension(
    extension: &str,
    root_dir: &Path,
) -> Result<Vec<PathBuf>, GitError> {
    let mut found = Vec::new();
    let mut pending = vec![root_dir.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = fs::read_dir(&dir).map_err(|source| GitError::Io {
            path: dir.clone(),
            source,
        })?;
        for entry in entries {
            let path = entry
                .map_err(|source| GitError::Io {
                    path: dir.clone(),
                    source,
                })?
                .path();
            if path.is_dir() {
                if path.file_name().is_some_and(|name| name != ".git") {
                    pending.push(path);
                }
            } else if path.extension().is_some_and(|ext| ext == extension) {
                if let Ok(relative) = path.strip_prefix(root_dir) {
                    found.push(relative.to_path_buf());
                }
            }
        }
    }
    found.sort();
    Ok(found)
}

/// Most recent commit time over all committed files under `root_dir` with
/// one of `extensions`, e.g. `["tex", "bib"]` for a document's content.
pub fn get_content_commit_date(
    extensions: &[&str],
    root_dir: &Path,
) -> Result<DateTime<Utc>, GitError> {
    let mut newest: Option<DateTime<Utc>> = None;
    for extension in extensions {
        for relative in iter_filepaths_with_extension(extension, root_dir)? {
            match read_git_commit_timestamp_for_file(&root_dir.join(&relative)) {
                Ok(committed) => {
                    newest = Some(newest.map_or(committed, |n| n.max(committed)));
                }
                Err(e) => {
                    debug!(path = %relative.display(), error = %e, "No commit date for file");
                }
            }
        }
    }
    newest.ok_or_else(|| {
        warn!(root = %root_dir.display(), ?extensions, "No committed content found");
        GitError::NoContent {
            root: root_dir.to_path_buf(),
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
        }
    })
}
