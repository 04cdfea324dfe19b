//! The per-release record threaded through every pipeline action.

use crate::download::{classify, ArchiveKind};
use crate::pipeline::Action;
use crate::platform::get_system_info;
use crate::source::SharedSource;
use crate::store::StoreHandle;
use crate::template::TemplateVars;
use crate::types::*;
use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

pub const RELEASE_NOTES_FILE: &str = "releaseNotes.txt";

#[derive(Debug)]
pub struct Release {
    pub repo: String,
    pub org: String,
    pub project: String,
    pub source_id: String,
    pub query: QueryMode,
    pub version: Option<String>,

    pub os: String,
    pub arch: String,
    pub tag_regex: Option<String>,
    pub external_url: Option<String>,
    pub supported_os: Vec<String>,

    pub file_name: Option<String>,
    pub release_file_name: Option<String>,
    pub file_type: Option<String>,
    pub download_only: bool,
    pub post_only: bool,
    pub cleanup_archive: bool,
    pub checksum: bool,
    pub upx: UpxConfig,
    pub post_commands: Vec<PostCommand>,

    pub metadata: Option<ReleaseMetadata>,
    pub asset: Option<Asset>,
    pub download_path: Option<PathBuf>,
    pub publish_path: Option<PathBuf>,
    pub artifact_path: Option<PathBuf>,
    pub link_path: Option<PathBuf>,

    /// Root under which `repos/` and stable links live.
    pub release_path: PathBuf,
    /// Pending units, replaced wholesale whenever a stage is planned.
    pub actions: VecDeque<Action>,
    pub provider: SharedSource,
    /// Absent when the caller only wants metadata.
    pub store: Option<StoreHandle>,
}

/// The persisted, public view of an installed release.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReleaseRecord {
    pub repo: String,
    pub source: String,
    pub version: String,
    pub os: String,
    pub arch: String,
    pub asset: Option<String>,
    pub download_url: Option<String>,
    pub publish_path: Option<String>,
    pub artifact_path: Option<String>,
    pub link_path: Option<String>,
    pub installed_at: String,
}

/// Split `org/project`; nested GitLab groups keep everything before the last
/// segment as the org.
pub fn split_repo(repo: &str) -> Result<(String, String)> {
    let repo = repo.trim().trim_matches('/');
    match repo.rsplit_once('/') {
        Some((org, project)) if !org.is_empty() && !project.is_empty() => {
            Ok((org.to_string(), project.to_string()))
        }
        _ => Err(anyhow!("Invalid repository '{}', expected 'org/project'", repo)),
    }
}

fn path_string(path: &Option<PathBuf>) -> Option<String> {
    path.as_ref().map(|p| p.to_string_lossy().to_string())
}

impl Release {
    /// A release of `repo` with every option at its default.
    pub fn new(repo: &str, provider: SharedSource, release_path: impl Into<PathBuf>) -> Result<Self> {
        let (org, project) = split_repo(repo)?;
        let system = get_system_info();
        Ok(Self {
            repo: format!("{}/{}", org, project),
            org,
            project,
            source_id: provider.identifier().to_string(),
            query: QueryMode::Release,
            version: None,
            os: system.os,
            arch: system.arch,
            tag_regex: None,
            external_url: None,
            supported_os: Vec::new(),
            file_name: None,
            release_file_name: None,
            file_type: None,
            download_only: false,
            post_only: false,
            cleanup_archive: false,
            checksum: false,
            upx: UpxConfig::default(),
            post_commands: Vec::new(),
            metadata: None,
            asset: None,
            download_path: None,
            publish_path: None,
            artifact_path: None,
            link_path: None,
            release_path: release_path.into(),
            actions: VecDeque::new(),
            provider,
            store: None,
        })
    }

    /// Build a release from a config entry, filling unset fields from the
    /// config's defaults and global settings.
    pub fn from_entry(
        entry: &ReleaseEntry,
        config: &BinwardConfig,
        provider: SharedSource,
        store: Option<StoreHandle>,
    ) -> Result<Self> {
        let mut release = Release::new(&entry.repo, provider, &config.config.releasepath)?;
        let defaults = &config.defaults;

        if let Some(os) = entry.os.as_ref().or(defaults.os.as_ref()) {
            release.os = os.to_lowercase();
        }
        if let Some(arch) = entry.arch.as_ref().or(defaults.arch.as_ref()) {
            release.arch = arch.to_lowercase();
        }
        release.version = entry
            .version
            .clone()
            .filter(|v| !v.is_empty() && v != "latest");
        release.query = match (entry.query.unwrap_or_default(), &release.version) {
            (QueryMode::Release, Some(_)) => QueryMode::ReleaseByTag,
            (mode, _) => mode,
        };
        if release.query == QueryMode::ReleaseByTag && release.version.is_none() {
            bail!("{}: query 'releasebytag' requires a version", entry.repo);
        }

        release.tag_regex = entry.tagregex.clone();
        release.external_url = entry.url.clone();
        release.supported_os = entry.supportedos.clone();
        release.file_name = entry.filename.clone();
        release.release_file_name = entry.releasefilename.clone();
        release.file_type = entry.filetype.clone().or_else(|| defaults.filetype.clone());
        release.download_only = entry.downloadonly;
        release.post_only = entry.postonly;
        release.cleanup_archive = entry
            .cleanuparchive
            .unwrap_or(config.config.cleanuparchive);
        release.checksum = entry.checksum.unwrap_or(defaults.checksum);
        release.upx = entry.upx.clone().unwrap_or_else(|| config.config.upx.clone());
        release.post_commands = entry.postcommands.clone();
        release.store = store;

        release.validate()?;
        Ok(release)
    }

    pub fn validate(&self) -> Result<()> {
        if self.post_only && self.download_only {
            bail!(
                "{}: 'postonly' and 'downloadonly' cannot both be set",
                self.repo
            );
        }
        if self.checksum {
            tracing::warn!(
                "{}: checksum verification is not supported, ignoring",
                self.repo
            );
        }
        Ok(())
    }

    pub fn tag(&self) -> Option<&str> {
        self.metadata.as_ref().map(|m| m.tag.as_str())
    }

    /// Resolved version when known, otherwise the requested one.
    pub fn resolved_version(&self) -> Option<&str> {
        self.tag().or(self.version.as_deref())
    }

    pub fn publish_dir_for(&self, tag: &str) -> PathBuf {
        self.release_path
            .join("repos")
            .join(&self.org)
            .join(&self.project)
            .join(tag)
    }

    /// Derive publish, artifact and link paths for `tag`.
    ///
    /// A pre-set publish path (direct downloads) is kept as is.
    pub fn set_paths(&mut self, tag: &str) {
        let publish = self
            .publish_path
            .clone()
            .unwrap_or_else(|| self.publish_dir_for(tag));

        let asset_is_archive = self
            .asset
            .as_ref()
            .is_some_and(|a| classify(Path::new(&a.name)) != ArchiveKind::Other);

        let (artifact, link) = match (&self.file_name, &self.asset) {
            (Some(file_name), _) => {
                let link_name = Path::new(file_name)
                    .file_name()
                    .map(|n| n.to_os_string())
                    .unwrap_or_else(|| file_name.into());
                (publish.join(file_name), self.release_path.join(link_name))
            }
            (None, Some(asset)) if self.release_file_name.is_some() && !asset_is_archive => (
                publish.join(&asset.name),
                self.release_path.join(&self.project),
            ),
            _ => (
                publish.join(&self.project),
                self.release_path.join(&self.project),
            ),
        };
        tracing::debug!(
            "{}: artifact {} -> link {}",
            self.repo,
            artifact.display(),
            link.display()
        );

        self.download_path = self.asset.as_ref().map(|a| publish.join(&a.name));
        self.artifact_path = Some(artifact);
        self.link_path = Some(link);
        self.publish_path = Some(publish);
    }

    pub fn store_key(&self) -> String {
        format!(
            "{}/{}/{}/data",
            self.source_id,
            self.repo,
            self.resolved_version().unwrap_or("latest")
        )
    }

    pub fn record(&self) -> ReleaseRecord {
        ReleaseRecord {
            repo: self.repo.clone(),
            source: self.source_id.clone(),
            version: self.resolved_version().unwrap_or("latest").to_string(),
            os: self.os.clone(),
            arch: self.arch.clone(),
            asset: self.asset.as_ref().map(|a| a.name.clone()),
            download_url: self.asset.as_ref().map(|a| a.url.clone()),
            publish_path: path_string(&self.publish_path),
            artifact_path: path_string(&self.artifact_path),
            link_path: path_string(&self.link_path),
            installed_at: Utc::now().to_rfc3339(),
        }
    }

    /// Variables available to file name, URL and post command templates.
    pub fn template_vars(&self) -> TemplateVars {
        let mut vars = TemplateVars::new();
        let version = self.resolved_version().unwrap_or("latest").to_string();
        vars.insert("tag".to_string(), version.clone());
        vars.insert(
            "semver".to_string(),
            version.trim_start_matches('v').to_string(),
        );
        vars.insert("version".to_string(), version);
        vars.insert("os".to_string(), self.os.clone());
        vars.insert("arch".to_string(), self.arch.clone());
        vars.insert("org".to_string(), self.org.clone());
        vars.insert("project".to_string(), self.project.clone());
        vars.insert("repo".to_string(), self.repo.clone());
        vars.insert("source".to_string(), self.source_id.clone());
        if let Some(asset) = &self.asset {
            vars.insert("asset".to_string(), asset.name.clone());
        }
        for (name, path) in [
            ("publishpath", &self.publish_path),
            ("artifactpath", &self.artifact_path),
            ("linkpath", &self.link_path),
        ] {
            if let Some(value) = path_string(path) {
                vars.insert(name.to_string(), value);
            }
        }
        vars
    }
}
