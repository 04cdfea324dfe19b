//! Hosting-API clients
//!
//! Every source resolves releases into the same [`ReleaseMetadata`] shape and
//! is also the transport used to download the selected asset, so credentials
//! stay with the client that owns them.

pub mod github;
pub mod gitlab;

use crate::types::{ApiType, ReleaseMetadata, SourceConfig};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

pub use github::GitHubSource;
pub use gitlab::GitLabSource;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Release tag '{tag}' not found in {repo}")]
    TagNotFound { repo: String, tag: String },
    #[error("No releases found for {repo}")]
    LatestNotFound { repo: String },
    #[error("No tags of {repo} match '{filter}'")]
    NoMatchingTag { repo: String, filter: String },
    #[error("Request for {repo} failed: {status}")]
    RequestFailed {
        repo: String,
        status: reqwest::StatusCode,
    },
    #[error("API rate limit for {source_name} exhausted, resets at {resets_at}")]
    RateLimited {
        source_name: String,
        resets_at: String,
    },
}

#[async_trait]
pub trait SourceProvider: Send + Sync + fmt::Debug {
    /// Name the source is configured under, used as the first segment of
    /// store keys.
    fn identifier(&self) -> &str;

    async fn fetch_latest(&self, repo: &str) -> Result<ReleaseMetadata>;

    async fn fetch_by_tag(&self, repo: &str, tag: &str) -> Result<ReleaseMetadata>;

    /// All tags of `repo` in the order the source lists them, optionally
    /// restricted to those matching `filter`.
    async fn list_tags(&self, repo: &str, filter: Option<&regex::Regex>) -> Result<Vec<String>>;

    async fn download(&self, url: &str, dest: &Path) -> Result<()>;

    /// Checked once before any release is processed.
    async fn preflight(&self) -> Result<()> {
        Ok(())
    }
}

pub type SharedSource = Arc<dyn SourceProvider>;

pub fn build_source(config: &SourceConfig) -> SharedSource {
    match config.apitype {
        ApiType::GitHub => Arc::new(GitHubSource::new(config)),
        ApiType::GitLab => Arc::new(GitLabSource::new(config)),
    }
}

pub fn build_sources(configs: &[SourceConfig]) -> HashMap<String, SharedSource> {
    configs
        .iter()
        .map(|c| (c.name.clone(), build_source(c)))
        .collect()
}

/// Whether credentials for the API at `base_url` may be sent to `url`: the
/// same host and port, or the web host behind an `api.` subdomain.
pub(crate) fn is_trusted_host(url: &str, base_url: &str) -> bool {
    let (Ok(url), Ok(base)) = (reqwest::Url::parse(url), reqwest::Url::parse(base_url)) else {
        return false;
    };
    let (Some(host), Some(base_host)) = (url.host_str(), base.host_str()) else {
        return false;
    };
    (host == base_host && url.port_or_known_default() == base.port_or_known_default())
        || base_host.strip_prefix("api.") == Some(host)
}

pub(crate) fn user_agent() -> String {
    format!("binward/{}", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_stay_with_their_host() {
        let api = "https://api.github.com";
        assert!(is_trusted_host("https://api.github.com/repos/o/r", api));
        assert!(is_trusted_host(
            "https://github.com/o/r/releases/download/v1/tool",
            api
        ));
        assert!(!is_trusted_host("https://downloads.example.com/tool", api));
        assert!(!is_trusted_host("https://github.com.evil.test/tool", api));
        assert!(!is_trusted_host("not a url", api));

        let gitlab = "https://gitlab.example.com:8443";
        assert!(is_trusted_host("https://gitlab.example.com:8443/uploads/x", gitlab));
        assert!(!is_trusted_host("https://gitlab.example.com/uploads/x", gitlab));
    }
}
