//! GitHub repository URL helpers.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

// https://github.com/owner/repo(.git)(/), git@github.com:owner/repo(.git)
static GITHUB_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"^(?:https?://(?:www\.)?github\.com/|git@github\.com:)",
        r"(?P<owner>[\w.-]+)/(?P<repo>[\w.-]+?)(?:\.git)?/?$",
    ))
    .expect("valid github url regex")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("not a GitHub repository URL: {0}")]
pub struct GitHubUrlError(pub String);

/// `owner/repo` of a GitHub repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSlug {
    pub full: String,
    pub owner: String,
    pub repo: String,
}

impl RepoSlug {
    /// Browsable `https://github.com/owner/repo` URL.
    pub fn html_url(&self) -> String {
        format!("https://github.com/{}", self.full)
    }
}

pub fn parse_repo_slug(url: &str) -> Result<RepoSlug, GitHubUrlError> {
    let caps = GITHUB_URL
        .captures(url.trim())
        .ok_or_else(|| GitHubUrlError(url.to_string()))?;
    let owner = caps["owner"].to_string();
    let repo = caps["repo"].to_string();
    Ok(RepoSlug {
        full: format!("{owner}/{repo}"),
        owner,
        repo,
    })
}

/// URL of a file's raw content at `git_ref`.
pub fn make_raw_content_url(slug: &RepoSlug, git_ref: &str, path: &str) -> String {
    format!(
        "https://raw.githubusercontent.com/{}/{}/{}",
        slug.full,
        git_ref,
        path.trim_start_matches('/')
    )
}
