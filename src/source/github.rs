//! GitHub API interaction module

use super::{is_trusted_host, user_agent, SourceError, SourceProvider};
use crate::download::download_file;
use crate::types::{Asset, ReleaseMetadata, SourceConfig};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use std::path::Path;

const TAGS_PER_PAGE: usize = 50;

#[derive(Debug, Deserialize)]
struct GitHubRelease {
    tag_name: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    assets: Vec<GitHubAsset>,
}

#[derive(Debug, Deserialize)]
struct GitHubAsset {
    name: String,
    browser_download_url: String,
}

#[derive(Debug, Deserialize)]
struct GitHubTag {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RateLimitResponse {
    resources: RateLimitResources,
}

#[derive(Debug, Deserialize)]
struct RateLimitResources {
    core: RateLimit,
}

#[derive(Debug, Deserialize)]
struct RateLimit {
    limit: u64,
    remaining: u64,
    reset: i64,
}

impl From<GitHubRelease> for ReleaseMetadata {
    fn from(release: GitHubRelease) -> Self {
        ReleaseMetadata {
            tag: release.tag_name,
            body: release.body,
            assets: release
                .assets
                .into_iter()
                .map(|a| Asset {
                    name: a.name,
                    url: a.browser_download_url,
                })
                .collect(),
        }
    }
}

#[derive(Debug)]
pub struct GitHubSource {
    name: String,
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

/// Build GitHub API URL for fetching release information
///
/// `None`, `"latest"` and `"default"` all resolve to the latest release.
pub fn build_gh_release_url(base_url: &str, repo: &str, version: Option<&str>) -> String {
    match version {
        Some(v) if v != "latest" && v != "default" => {
            format!("{}/repos/{}/releases/tags/{}", base_url, repo, v)
        }
        _ => format!("{}/repos/{}/releases/latest", base_url, repo),
    }
}

impl GitHubSource {
    pub fn new(config: &SourceConfig) -> Self {
        if config.token().is_none() {
            tracing::debug!(
                "No token for {}; anonymous requests are heavily rate limited",
                config.name
            );
        }
        Self {
            name: config.name.clone(),
            base_url: config.api_url(),
            token: config.token(),
            client: reqwest::Client::new(),
        }
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github.v3+json")
            .header("User-Agent", user_agent());
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("token {}", token));
        }
        request
    }

    async fn fetch_release(&self, repo: &str, version: Option<&str>) -> Result<ReleaseMetadata> {
        let url = build_gh_release_url(&self.base_url, repo, version);
        tracing::debug!("Fetching GitHub release info from: {}", url);

        let response = self.get(&url).send().await?;
        if !response.status().is_success() {
            if response.status() == StatusCode::NOT_FOUND {
                if let Some(tag) = version {
                    return Err(SourceError::TagNotFound {
                        repo: repo.to_string(),
                        tag: tag.to_string(),
                    }
                    .into());
                }
                return Err(SourceError::LatestNotFound {
                    repo: repo.to_string(),
                }
                .into());
            }
            return Err(SourceError::RequestFailed {
                repo: repo.to_string(),
                status: response.status(),
            }
            .into());
        }

        let release: GitHubRelease = response.json().await?;
        Ok(release.into())
    }
}

#[async_trait]
impl SourceProvider for GitHubSource {
    fn identifier(&self) -> &str {
        &self.name
    }

    async fn fetch_latest(&self, repo: &str) -> Result<ReleaseMetadata> {
        self.fetch_release(repo, None).await
    }

    async fn fetch_by_tag(&self, repo: &str, tag: &str) -> Result<ReleaseMetadata> {
        self.fetch_release(repo, Some(tag)).await
    }

    async fn list_tags(&self, repo: &str, filter: Option<&regex::Regex>) -> Result<Vec<String>> {
        let mut tags = Vec::new();
        let mut page = 1;
        loop {
            let url = format!(
                "{}/repos/{}/tags?per_page={}&page={}",
                self.base_url, repo, TAGS_PER_PAGE, page
            );
            tracing::debug!("Listing GitHub tags: {}", url);

            let response = self.get(&url).send().await?;
            if !response.status().is_success() {
                return Err(SourceError::RequestFailed {
                    repo: repo.to_string(),
                    status: response.status(),
                }
                .into());
            }

            let batch: Vec<GitHubTag> = response.json().await?;
            let last_page = batch.len() < TAGS_PER_PAGE;
            tags.extend(batch.into_iter().map(|t| t.name));
            if last_page {
                break;
            }
            page += 1;
        }

        if let Some(re) = filter {
            tags.retain(|t| re.is_match(t));
        }
        Ok(tags)
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        let mut request = self.client.get(url).header("User-Agent", user_agent());
        match &self.token {
            Some(token) if is_trusted_host(url, &self.base_url) => {
                request = request.header("Authorization", format!("token {}", token));
            }
            Some(_) => tracing::debug!("Not sending {} token to {}", self.name, url),
            None => {}
        }
        download_file(request, dest).await
    }

    async fn preflight(&self) -> Result<()> {
        let url = format!("{}/rate_limit", self.base_url);
        let response = self.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(SourceError::RequestFailed {
                repo: "rate_limit".to_string(),
                status: response.status(),
            }
            .into());
        }
        let limits: RateLimitResponse = response.json().await?;
        check_rate_limit(&self.name, &limits.resources.core)
    }
}

fn check_rate_limit(name: &str, core: &RateLimit) -> Result<()> {
    tracing::info!(
        "{} API requests remaining: {}/{}",
        name,
        core.remaining,
        core.limit
    );

    if core.remaining == 0 {
        let resets_at = Utc
            .timestamp_opt(core.reset, 0)
            .single()
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| core.reset.to_string());
        return Err(SourceError::RateLimited {
            source_name: name.to_string(),
            resets_at,
        }
        .into());
    }
    Ok(())
}
