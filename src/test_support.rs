use crate::source::{SourceError, SourceProvider};
use crate::types::{Asset, ReleaseMetadata};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Answer one HTTP request on a local port with `body`. The task resolves to
/// the lowercased request head.
pub async fn serve_once(body: &'static [u8]) -> (SocketAddr, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let task = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut head = Vec::new();
        let mut chunk = [0u8; 1024];
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            head.extend_from_slice(&chunk[..n]);
        }
        let response = format!(
            "HTTP/1.1 200 OK\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.write_all(body).await.unwrap();
        socket.shutdown().await.ok();
        String::from_utf8_lossy(&head).to_lowercase()
    });
    (addr, task)
}

/// In-process source answering from fixed data and counting every call.
#[derive(Debug, Default)]
pub struct StubSource {
    pub release: Option<ReleaseMetadata>,
    pub tags: Vec<String>,
    /// Bytes served per download URL; unknown URLs fail.
    pub files: HashMap<String, Vec<u8>>,
    pub fetches: AtomicUsize,
    pub downloads: AtomicUsize,
    /// Fail `preflight` as if the API quota were spent.
    pub rate_limited: bool,
}

impl StubSource {
    pub fn with_release(tag: &str, assets: &[(&str, &[u8])]) -> Self {
        let mut files = HashMap::new();
        let assets = assets
            .iter()
            .map(|(name, data)| {
                let url = format!("https://stub.invalid/{}/{}", tag, name);
                files.insert(url.clone(), data.to_vec());
                Asset {
                    name: name.to_string(),
                    url,
                }
            })
            .collect();
        Self {
            release: Some(ReleaseMetadata {
                tag: tag.to_string(),
                body: Some(format!("Release {}", tag)),
                assets,
            }),
            files,
            ..Default::default()
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn download_count(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceProvider for StubSource {
    fn identifier(&self) -> &str {
        "stub"
    }

    async fn fetch_latest(&self, repo: &str) -> Result<ReleaseMetadata> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.release.clone().ok_or_else(|| {
            SourceError::LatestNotFound {
                repo: repo.to_string(),
            }
            .into()
        })
    }

    async fn fetch_by_tag(&self, repo: &str, tag: &str) -> Result<ReleaseMetadata> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.release
            .clone()
            .filter(|r| r.tag == tag)
            .ok_or_else(|| {
                SourceError::TagNotFound {
                    repo: repo.to_string(),
                    tag: tag.to_string(),
                }
                .into()
            })
    }

    async fn list_tags(&self, _repo: &str, filter: Option<&regex::Regex>) -> Result<Vec<String>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .tags
            .iter()
            .filter(|t| filter.map_or(true, |re| re.is_match(t)))
            .cloned()
            .collect())
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let data = self
            .files
            .get(url)
            .ok_or_else(|| anyhow!("stub has no file at {}", url))?;
        std::fs::write(dest, data)?;
        Ok(())
    }

    async fn preflight(&self) -> Result<()> {
        if self.rate_limited {
            return Err(SourceError::RateLimited {
                source_name: "stub".to_string(),
                resets_at: "1970-01-01T00:00:00+00:00".to_string(),
            }
            .into());
        }
        Ok(())
    }
}
