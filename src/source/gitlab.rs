use super::{is_trusted_host, user_agent, SourceError, SourceProvider};
use crate::download::download_file;
use crate::types::{Asset, ReleaseMetadata, SourceConfig};
use anyhow::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::path::Path;

const TAGS_PER_PAGE: usize = 50;

#[derive(Debug, Deserialize)]
struct GitLabRelease {
    tag_name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    assets: GitLabAssets,
}

#[derive(Debug, Default, Deserialize)]
struct GitLabAssets {
    #[serde(default)]
    links: Vec<GitLabLink>,
}

#[derive(Debug, Deserialize)]
struct GitLabLink {
    name: String,
    url: String,
    #[serde(default)]
    direct_asset_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitLabTag {
    name: String,
}

impl From<GitLabRelease> for ReleaseMetadata {
    fn from(release: GitLabRelease) -> Self {
        ReleaseMetadata {
            tag: release.tag_name,
            body: release.description,
            assets: release
                .assets
                .links
                .into_iter()
                .map(|l| Asset {
                    name: l.name,
                    url: l.direct_asset_url.unwrap_or(l.url),
                })
                .collect(),
        }
    }
}

#[derive(Debug)]
pub struct GitLabSource {
    name: String,
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

/// Project path as the `:id` segment GitLab expects (`org%2Fproject`).
fn project_id(repo: &str) -> String {
    repo.replace('/', "%2F")
}

impl GitLabSource {
    pub fn new(config: &SourceConfig) -> Self {
        Self {
            name: config.name.clone(),
            base_url: config.api_url(),
            token: config.token(),
            client: reqwest::Client::new(),
        }
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let mut request = self.client.get(url).header("User-Agent", user_agent());
        if let Some(token) = &self.token {
            request = request.header("PRIVATE-TOKEN", token);
        }
        request
    }

    fn releases_url(&self, repo: &str) -> String {
        format!(
            "{}/api/v4/projects/{}/releases",
            self.base_url,
            project_id(repo)
        )
    }

    async fn fetch_release(&self, repo: &str, url: String, tag: Option<&str>) -> Result<ReleaseMetadata> {
        tracing::debug!("Fetching GitLab release info from: {}", url);
        let response = self.get(&url).send().await?;
        match response.status() {
            s if s.is_success() => {
                let release: GitLabRelease = response.json().await?;
                Ok(release.into())
            }
            StatusCode::NOT_FOUND => Err(match tag {
                Some(tag) => SourceError::TagNotFound {
                    repo: repo.to_string(),
                    tag: tag.to_string(),
                },
                None => SourceError::LatestNotFound {
                    repo: repo.to_string(),
                },
            }
            .into()),
            status => Err(SourceError::RequestFailed {
                repo: repo.to_string(),
                status,
            }
            .into()),
        }
    }
}

#[async_trait]
impl SourceProvider for GitLabSource {
    fn identifier(&self) -> &str {
        &self.name
    }

    async fn fetch_latest(&self, repo: &str) -> Result<ReleaseMetadata> {
        let url = format!("{}/permalink/latest", self.releases_url(repo));
        self.fetch_release(repo, url, None).await
    }

    async fn fetch_by_tag(&self, repo: &str, tag: &str) -> Result<ReleaseMetadata> {
        let url = format!("{}/{}", self.releases_url(repo), tag.replace('/', "%2F"));
        self.fetch_release(repo, url, Some(tag)).await
    }

    async fn list_tags(&self, repo: &str, filter: Option<&regex::Regex>) -> Result<Vec<String>> {
        let mut tags = Vec::new();
        let mut page = 1;
        loop {
            let url = format!(
                "{}/api/v4/projects/{}/repository/tags?per_page={}&page={}",
                self.base_url,
                project_id(repo),
                TAGS_PER_PAGE,
                page
            );
            let response = self.get(&url).send().await?;
            if !response.status().is_success() {
                return Err(SourceError::RequestFailed {
                    repo: repo.to_string(),
                    status: response.status(),
                }
                .into());
            }
            let batch: Vec<GitLabTag> = response.json().await?;
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
        // Release links may point anywhere
        let request = if is_trusted_host(url, &self.base_url) {
            self.get(url)
        } else {
            self.client.get(url).header("User-Agent", user_agent())
        };
        download_file(request, dest).await
    }
}
