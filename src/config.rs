use crate::release::Release;
use crate::source::SharedSource;
use crate::store::StoreHandle;
use crate::types::*;
use anyhow::{anyhow, bail, Context, Result};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

pub const APP_NAME: &str = "binward";
pub const CONFIG_FILE_NAME: &str = "config.yaml";
/// Directory under the release path holding installed-release records.
pub const STORE_DIR_NAME: &str = ".db";

pub const CONFIG_ENV: &str = "BINWARD_CONFIG";
pub const RELEASE_PATH_ENV: &str = "BINWARD_RELEASE_PATH";

/// `--config`, then `$BINWARD_CONFIG`, then the platform config directory.
pub fn resolve_config_path(flag: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = flag {
        return Ok(path.to_path_buf());
    }
    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    let path = dirs::config_dir()
        .ok_or_else(|| anyhow!("Could not determine config directory"))?
        .join(APP_NAME)
        .join(CONFIG_FILE_NAME);
    tracing::debug!("Config file path: {}", path.display());
    Ok(path)
}

/// Read the config at `path` as written, creating a default file first if it
/// is missing.
pub fn read_config(path: &Path) -> Result<BinwardConfig> {
    if !path.exists() {
        tracing::info!("No config at {}, writing defaults", path.display());
        save_config(path, &BinwardConfig::default())?;
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read config file at {}", path.display()))?;
    parse_config(&content)
        .with_context(|| format!("Could not parse config file at {}", path.display()))
}

/// The effective config: the file plus environment overrides.
pub fn load_config(path: &Path) -> Result<BinwardConfig> {
    let mut config = read_config(path)?;
    apply_env_overrides(&mut config);
    config.config.releasepath = expand_home(&config.config.releasepath);
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<BinwardConfig> {
    // An empty file is a valid, empty config
    if content.trim().is_empty() {
        return Ok(BinwardConfig::default());
    }
    Ok(serde_yaml::from_str(content)?)
}

pub fn save_config(path: &Path, config: &BinwardConfig) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Could not create {}", dir.display()))?;
    }
    let content = serde_yaml::to_string(config)?;
    fs::write(path, content)
        .with_context(|| format!("Could not write config file at {}", path.display()))?;
    Ok(())
}

fn apply_env_overrides(config: &mut BinwardConfig) {
    if let Ok(path) = std::env::var(RELEASE_PATH_ENV) {
        if !path.is_empty() {
            config.config.releasepath = path;
        }
    }
}

fn expand_home(path: &str) -> String {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest).to_string_lossy().to_string(),
        _ if path == "~" => dirs::home_dir()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string()),
        _ => path.to_string(),
    }
}

/// Source used by entries that do not name one.
pub fn default_source_name(config: &BinwardConfig) -> &str {
    config
        .config
        .sources
        .first()
        .map(|s| s.name.as_str())
        .unwrap_or("github.com")
}

/// `{source}/{repo}/{version}/{releasefilename}`
pub fn release_identity(entry: &ReleaseEntry, default_source: &str) -> String {
    format!(
        "{}/{}/{}/{}",
        entry.source.as_deref().unwrap_or(default_source),
        entry.repo.trim().trim_matches('/'),
        entry.version.as_deref().unwrap_or("latest"),
        entry.releasefilename.as_deref().unwrap_or("")
    )
}

/// Drop entries redeclared later in the list. The surviving entry is the
/// last declaration and sits where that declaration was.
pub fn dedup_releases(entries: &[ReleaseEntry], default_source: &str) -> Vec<ReleaseEntry> {
    let mut seen = HashSet::new();
    let mut kept: Vec<ReleaseEntry> = entries
        .iter()
        .rev()
        .filter(|e| seen.insert(release_identity(e, default_source)))
        .cloned()
        .collect();
    kept.reverse();

    if kept.len() != entries.len() {
        tracing::info!(
            "Ignoring {} duplicate release declaration(s)",
            entries.len() - kept.len()
        );
    }
    kept
}

/// Names of the sources the configured releases actually use.
pub fn used_sources(config: &BinwardConfig) -> Vec<String> {
    let default_source = default_source_name(config);
    let mut names: Vec<String> = Vec::new();
    for entry in &config.releases {
        let name = entry.source.as_deref().unwrap_or(default_source);
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

pub fn lookup_source(
    sources: &HashMap<String, SharedSource>,
    name: &str,
) -> Result<SharedSource> {
    sources.get(name).cloned().ok_or_else(|| {
        let mut known: Vec<&str> = sources.keys().map(String::as_str).collect();
        known.sort_unstable();
        anyhow!(
            "Unknown source '{}'. Configured sources: {}",
            name,
            known.join(", ")
        )
    })
}

/// One [`Release`] per distinct configured entry.
pub fn build_releases(
    config: &BinwardConfig,
    sources: &HashMap<String, SharedSource>,
    store: Option<StoreHandle>,
) -> Result<Vec<Release>> {
    let default_source = default_source_name(config);
    dedup_releases(&config.releases, default_source)
        .iter()
        .map(|entry| {
            let source = entry.source.as_deref().unwrap_or(default_source);
            let provider = lookup_source(sources, source)
                .with_context(|| format!("Release {}", entry.repo))?;
            Release::from_entry(entry, config, provider, store.clone())
        })
        .collect()
}

/// Open the config file in `$VISUAL` or `$EDITOR` and check it still parses.
pub fn edit_config(path: &Path) -> Result<()> {
    if !path.exists() {
        save_config(path, &BinwardConfig::default())?;
    }

    let editor = ["VISUAL", "EDITOR"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.trim().is_empty()))
        .ok_or_else(|| anyhow!("Neither VISUAL nor EDITOR is set, cannot edit {}", path.display()))?;

    // Allow things like `code --wait`
    let mut parts = editor.split_whitespace();
    let program = parts.next().unwrap_or_default();
    tracing::debug!("Executing: {} {}", editor, path.display());
    let status = Command::new(program)
        .args(parts)
        .arg(path)
        .status()
        .with_context(|| format!("Could not start editor '{}'", editor))?;
    if !status.success() {
        bail!("Editor '{}' exited with {}", editor, status);
    }

    let content = fs::read_to_string(path)?;
    parse_config(&content)
        .with_context(|| format!("{} is no longer a valid config", path.display()))?;
    Ok(())
}

/// Append `repo` to the config after checking the source has a release for
/// it. Returns `false` when an identical entry is already configured.
pub async fn add_release(
    path: &Path,
    entry: ReleaseEntry,
    sources: &HashMap<String, SharedSource>,
) -> Result<bool> {
    let mut config = read_config(path)?;
    let default_source = default_source_name(&config).to_string();
    let identity = release_identity(&entry, &default_source);
    if config
        .releases
        .iter()
        .any(|e| release_identity(e, &default_source) == identity)
    {
        tracing::info!("{} is already configured", entry.repo);
        return Ok(false);
    }

    crate::release::split_repo(&entry.repo)?;
    let provider = lookup_source(sources, entry.source.as_deref().unwrap_or(&default_source))?;
    let latest = match entry.version.as_deref() {
        Some(version) if version != "latest" => provider.fetch_by_tag(&entry.repo, version).await,
        _ => provider.fetch_latest(&entry.repo).await,
    }
    .with_context(|| format!("Could not verify {}", entry.repo))?;
    tracing::info!("{}: found release {}", entry.repo, latest.tag);

    config.releases.push(entry);
    save_config(path, &config)?;
    Ok(true)
}
