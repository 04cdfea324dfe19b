//! Runs every configured release concurrently against a shared store.

use crate::config::{self, STORE_DIR_NAME};
use crate::pipeline::{self, Finish};
use crate::release::Release;
use crate::source::{build_sources, SharedSource};
use crate::store::{spawn_store, FileStore, MemoryStore};
use crate::types::{BinwardConfig, QueryMode, ReleaseMetadata};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::task::JoinSet;

#[derive(Debug, Default)]
pub struct SyncReport {
    pub completed: Vec<String>,
    pub up_to_date: Vec<String>,
    pub excluded: Vec<String>,
    /// Repo and the error that stopped it.
    pub failed: Vec<(String, String)>,
}

impl SyncReport {
    pub fn record(&mut self, repo: String, result: Result<Finish>) {
        match result {
            Ok(Finish::Completed) => self.completed.push(repo),
            Ok(Finish::UpToDate) => self.up_to_date.push(repo),
            Ok(Finish::Excluded) => self.excluded.push(repo),
            Err(e) => {
                tracing::error!("{}: {:#}", repo, e);
                self.failed.push((repo, format!("{:#}", e)));
            }
        }
    }

    pub fn total(&self) -> usize {
        self.completed.len() + self.up_to_date.len() + self.excluded.len() + self.failed.len()
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Check every source the config uses once, before any release starts.
pub async fn preflight(
    config: &BinwardConfig,
    sources: &HashMap<String, SharedSource>,
) -> Result<()> {
    for name in config::used_sources(config) {
        let source = config::lookup_source(sources, &name)?;
        tracing::debug!("Preflight check for {}", name);
        source.preflight().await?;
    }
    Ok(())
}

/// Drive each release on its own task and collect how each one ended.
pub async fn run_releases(releases: Vec<Release>) -> SyncReport {
    let mut workers = JoinSet::new();
    for mut release in releases {
        workers.spawn(async move {
            let result = pipeline::run(&mut release).await;
            (release.repo, result)
        });
    }

    let mut report = SyncReport::default();
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok((repo, result)) => report.record(repo, result),
            Err(e) => {
                tracing::error!("Release worker failed: {}", e);
                report.failed.push(("<unknown>".to_string(), e.to_string()));
            }
        }
    }
    report
}

/// Install or update every release in `config`.
pub async fn sync(config: &BinwardConfig) -> Result<SyncReport> {
    let sources = build_sources(&config.config.sources);
    sync_with_sources(config, &sources).await
}

/// Like [`sync`], against an already built set of sources.
pub async fn sync_with_sources(
    config: &BinwardConfig,
    sources: &HashMap<String, SharedSource>,
) -> Result<SyncReport> {
    preflight(config, sources).await?;

    let store_dir = Path::new(&config.config.releasepath).join(STORE_DIR_NAME);
    let (store, store_task) = spawn_store(FileStore::new(store_dir));
    let releases = config::build_releases(config, sources, Some(store))?;
    tracing::info!("Syncing {} release(s)", releases.len());

    let report = run_releases(releases).await;

    // Workers dropped their handles, so the store drains and exits
    store_task.await.context("store task panicked")?;
    Ok(report)
}

fn single_release(
    config: &BinwardConfig,
    repo: &str,
    version: Option<&str>,
    source: Option<&str>,
) -> Result<Release> {
    let sources = build_sources(&config.config.sources);
    let name = source.unwrap_or_else(|| config::default_source_name(config));
    let provider = config::lookup_source(&sources, name)?;

    let mut release = Release::new(repo, provider, &config.config.releasepath)?;
    if let Some(version) = version.filter(|v| *v != "latest") {
        release.version = Some(version.to_string());
        release.query = QueryMode::ReleaseByTag;
    }
    if let Some(os) = &config.defaults.os {
        release.os = os.to_lowercase();
    }
    if let Some(arch) = &config.defaults.arch {
        release.arch = arch.to_lowercase();
    }
    release.file_type = config.defaults.filetype.clone();
    Ok(release)
}

/// Download the matching asset of one release into `dir`, untouched and
/// unrecorded. Returns the downloaded file.
pub async fn get_release(
    config: &BinwardConfig,
    repo: &str,
    version: Option<&str>,
    source: Option<&str>,
    dir: &Path,
) -> Result<Option<PathBuf>> {
    let mut release = single_release(config, repo, version, source)?;
    release.download_only = true;
    release.publish_path = Some(dir.to_path_buf());

    let (store, store_task) = spawn_store(MemoryStore::default());
    release.store = Some(store);
    let finish = pipeline::run(&mut release).await;
    release.store = None;
    store_task.await.context("store task panicked")?;

    match finish? {
        Finish::Completed => Ok(release.download_path),
        _ => Ok(None),
    }
}

/// Resolve the release metadata for `repo` without touching the filesystem.
pub async fn query_release(
    config: &BinwardConfig,
    repo: &str,
    version: Option<&str>,
    source: Option<&str>,
) -> Result<Option<ReleaseMetadata>> {
    let mut release = single_release(config, repo, version, source)?;
    match pipeline::run(&mut release).await? {
        Finish::Completed => Ok(release.metadata),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreHandle;
    use crate::test_support::StubSource;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn release(stub: &Arc<StubSource>, repo: &str, root: &Path, store: &StoreHandle) -> Release {
        let mut r = Release::new(repo, stub.clone(), root).unwrap();
        r.os = "linux".to_string();
        r.arch = "amd64".to_string();
        r.store = Some(store.clone());
        r
    }

    #[tokio::test]
    async fn concurrent_releases_all_persist() {
        let dir = tempdir().unwrap();
        let stub = Arc::new(StubSource::with_release(
            "v1.0.0",
            &[("tool-linux-amd64", b"bin")],
        ));
        let (store, store_task) = spawn_store(FileStore::new(dir.path().join(STORE_DIR_NAME)));

        let releases: Vec<Release> = (0..4)
            .map(|i| release(&stub, &format!("org/tool{}", i), dir.path(), &store))
            .collect();
        let mut excluded = release(&stub, "other/skipped", dir.path(), &store);
        excluded.supported_os = vec!["plan9".to_string()];

        let mut all = releases;
        all.push(excluded);
        let report = run_releases(all).await;

        assert_eq!(report.completed.len(), 4);
        assert_eq!(report.excluded, ["other/skipped"]);
        assert!(!report.has_failures());
        assert_eq!(report.total(), 5);

        for i in 0..4 {
            let data = store
                .read(format!("stub/org/tool{}/v1.0.0/data", i))
                .await
                .unwrap();
            assert!(data.is_some());
        }
        drop(store);
        store_task.await.unwrap();
    }

    #[tokio::test]
    async fn failures_are_reported_per_release() {
        let dir = tempdir().unwrap();
        let ok = Arc::new(StubSource::with_release("v1.0.0", &[("tool-linux-amd64", b"bin")]));
        let empty = Arc::new(StubSource::default());
        let (store, _task) = spawn_store(MemoryStore::default());

        let report = run_releases(vec![
            release(&ok, "org/good", dir.path(), &store),
            release(&empty, "org/bad", dir.path(), &store),
        ])
        .await;

        assert_eq!(report.completed, ["org/good"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "org/bad");
        assert!(report.has_failures());
    }

    fn config_for(root: &Path, repos: &[&str]) -> BinwardConfig {
        let mut config = BinwardConfig::default();
        config.config.releasepath = root.to_string_lossy().to_string();
        config.defaults.os = Some("linux".to_string());
        config.defaults.arch = Some("amd64".to_string());
        config.releases = repos
            .iter()
            .map(|repo| crate::types::ReleaseEntry {
                repo: repo.to_string(),
                ..Default::default()
            })
            .collect();
        config
    }

    #[tokio::test]
    async fn rate_limited_source_blocks_the_whole_sync() {
        let dir = tempdir().unwrap();
        let stub = Arc::new(StubSource {
            rate_limited: true,
            ..StubSource::with_release("v1.0.0", &[("tool-linux-amd64", b"bin")])
        });
        let sources: HashMap<String, SharedSource> =
            HashMap::from([("github.com".to_string(), stub.clone() as SharedSource)]);
        let config = config_for(dir.path(), &["org/tool", "org/other"]);

        let err = sync_with_sources(&config, &sources).await.unwrap_err();

        assert!(err.to_string().contains("rate limit"), "{}", err);
        assert_eq!(stub.fetch_count(), 0);
        assert_eq!(stub.download_count(), 0);
        assert!(!dir.path().join(STORE_DIR_NAME).exists());
    }

    #[tokio::test]
    async fn sync_with_healthy_source_persists() {
        let dir = tempdir().unwrap();
        let stub = Arc::new(StubSource::with_release(
            "v1.0.0",
            &[("tool-linux-amd64", b"bin")],
        ));
        let sources: HashMap<String, SharedSource> =
            HashMap::from([("github.com".to_string(), stub.clone() as SharedSource)]);
        let config = config_for(dir.path(), &["org/tool"]);

        let report = sync_with_sources(&config, &sources).await.unwrap();

        assert_eq!(report.completed, ["org/tool"]);
        assert!(dir.path().join(STORE_DIR_NAME).exists());
    }

    #[test]
    fn report_counts() {
        let mut report = SyncReport::default();
        report.record("a/a".to_string(), Ok(Finish::Completed));
        report.record("b/b".to_string(), Ok(Finish::UpToDate));
        report.record("c/c".to_string(), Err(anyhow::anyhow!("boom")));
        assert_eq!(report.total(), 3);
        assert_eq!(report.up_to_date, ["b/b"]);
        assert_eq!(report.failed[0].1, "boom");
    }
}
