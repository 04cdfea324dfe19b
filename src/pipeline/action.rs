use super::{stages, Outcome, StopReason};
use crate::download::{classify, extract_archive, find_target, make_executable, ArchiveKind};
use crate::platform::{find_asset_for_platform, get_system_info, is_excluded};
use crate::release::{Release, RELEASE_NOTES_FILE};
use crate::source::SourceError;
use crate::store::StoreMsg;
use crate::template::render;
use crate::types::{Asset, PostCommand, ReleaseMetadata};
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// One unit of work for a release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    ExcludeCheck,
    FetchLatest,
    FetchByTag(String),
    FetchTag,
    ReleaseStatus,
    SelectAsset,
    SetPaths,
    PlanPost,
    Download,
    Extract,
    CleanArchive,
    FindTarget,
    MakeExecutable,
    WriteReleaseNotes,
    PlanOs,
    RunCommand(PostCommand),
    PlanFinal,
    Link,
    Persist,
    EndWork,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::ExcludeCheck => "ExcludeCheck",
            Action::FetchLatest => "FetchLatest",
            Action::FetchByTag(_) => "FetchByTag",
            Action::FetchTag => "FetchTag",
            Action::ReleaseStatus => "ReleaseStatus",
            Action::SelectAsset => "SelectAsset",
            Action::SetPaths => "SetPaths",
            Action::PlanPost => "PlanPost",
            Action::Download => "Download",
            Action::Extract => "Extract",
            Action::CleanArchive => "CleanArchive",
            Action::FindTarget => "FindTarget",
            Action::MakeExecutable => "MakeExecutable",
            Action::WriteReleaseNotes => "WriteReleaseNotes",
            Action::PlanOs => "PlanOs",
            Action::RunCommand(_) => "RunCommand",
            Action::PlanFinal => "PlanFinal",
            Action::Link => "Link",
            Action::Persist => "Persist",
            Action::EndWork => "EndWork",
        }
    }

    pub async fn execute(&self, r: &mut Release) -> Outcome {
        match self {
            Action::ExcludeCheck => exclude_check(r),
            Action::FetchLatest => fetch_latest(r).await.into(),
            Action::FetchByTag(tag) => fetch_by_tag(r, tag).await.into(),
            Action::FetchTag => fetch_tag(r).await.into(),
            Action::ReleaseStatus => release_status(r),
            Action::SelectAsset => select_asset(r),
            Action::SetPaths => set_paths(r).into(),
            Action::PlanPost => {
                r.actions = stages::post_actions(r);
                tracing::debug!(
                    "Performing {} post actions for {}",
                    stages::describe(&r.actions),
                    r.repo
                );
                Outcome::Success
            }
            Action::Download => download(r).await.into(),
            Action::Extract => extract(r).await.into(),
            Action::CleanArchive => clean_archive(r).into(),
            Action::FindTarget => locate_target(r).into(),
            Action::MakeExecutable => artifact(r).and_then(make_executable).into(),
            Action::WriteReleaseNotes => write_release_notes(r).into(),
            Action::PlanOs => {
                r.actions = stages::os_actions(r);
                tracing::debug!(
                    "Performing {} OS commands for {}",
                    stages::describe(&r.actions),
                    r.repo
                );
                Outcome::Success
            }
            Action::RunCommand(command) => run_command(r, command).await.into(),
            Action::PlanFinal => {
                r.actions = stages::final_actions(r);
                Outcome::Success
            }
            Action::Link => link(r).into(),
            Action::Persist => persist(r).await.into(),
            Action::EndWork => {
                r.actions.clear();
                Outcome::Success
            }
        }
    }
}

fn exclude_check(r: &Release) -> Outcome {
    let host = get_system_info();
    if is_excluded(&r.supported_os, &host.os) {
        return Outcome::Stop(StopReason::Excluded);
    }
    Outcome::Success
}

async fn fetch_latest(r: &mut Release) -> Result<()> {
    tracing::debug!("Querying {} for latest release of {}", r.source_id, r.repo);
    let provider = r.provider.clone();
    r.metadata = Some(provider.fetch_latest(&r.repo).await?);
    Ok(())
}

async fn fetch_by_tag(r: &mut Release, tag: &str) -> Result<()> {
    tracing::debug!("Querying {} for {} release of {}", r.source_id, tag, r.repo);
    let provider = r.provider.clone();
    r.metadata = Some(provider.fetch_by_tag(&r.repo, tag).await?);
    Ok(())
}

async fn fetch_tag(r: &mut Release) -> Result<()> {
    tracing::debug!("Querying {} for tag list of {}", r.source_id, r.repo);
    let filter = r
        .tag_regex
        .as_deref()
        .map(regex::Regex::new)
        .transpose()
        .with_context(|| format!("{}: invalid tagregex", r.repo))?;

    let provider = r.provider.clone();
    let tags = provider.list_tags(&r.repo, filter.as_ref()).await?;

    // Sources list newest tags first
    let tag = tags.into_iter().next().ok_or_else(|| SourceError::NoMatchingTag {
        repo: r.repo.clone(),
        filter: r.tag_regex.clone().unwrap_or_else(|| ".*".to_string()),
    })?;
    tracing::debug!("Selected tag {}", tag);

    r.metadata = Some(ReleaseMetadata::from_tag(tag));
    Ok(())
}

fn fetched_tag(r: &Release) -> Result<String> {
    r.tag()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("{}: release metadata has not been fetched", r.repo))
}

fn release_status(r: &Release) -> Outcome {
    let tag = match fetched_tag(r) {
        Ok(tag) => tag,
        Err(e) => return Outcome::Fail(e),
    };
    let publish = r.publish_dir_for(&tag);
    if publish.exists() {
        tracing::debug!("{} already exists", publish.display());
        return Outcome::Stop(StopReason::NoUpdate);
    }
    Outcome::Success
}

fn select_asset(r: &mut Release) -> Outcome {
    let Some(metadata) = r.metadata.as_ref() else {
        return Outcome::Fail(anyhow!("{}: release metadata has not been fetched", r.repo));
    };
    let vars = r.template_vars();

    let selected = if let Some(url) = &r.external_url {
        match render(url, &vars) {
            Ok(url) => {
                let name = url
                    .split('?')
                    .next()
                    .and_then(|u| u.rsplit('/').next())
                    .filter(|n| !n.is_empty())
                    .unwrap_or(&r.project)
                    .to_string();
                Some(Asset { name, url })
            }
            Err(e) => return Outcome::Fail(e.into()),
        }
    } else if let Some(pattern) = &r.release_file_name {
        match render(pattern, &vars) {
            Ok(wanted) => metadata.assets.iter().find(|a| a.name == wanted).cloned(),
            Err(e) => return Outcome::Fail(e.into()),
        }
    } else {
        find_asset_for_platform(&metadata.assets, &r.os, &r.arch, r.file_type.as_deref())
    };

    match selected {
        Some(asset) => {
            tracing::debug!("{}: selected asset {} ({})", r.repo, asset.name, asset.url);
            r.asset = Some(asset);
            Outcome::Success
        }
        None => {
            tracing::info!(
                "{}: no asset of {} matches {}/{}",
                r.repo,
                metadata.tag,
                r.os,
                r.arch
            );
            Outcome::Stop(StopReason::Excluded)
        }
    }
}

fn set_paths(r: &mut Release) -> Result<()> {
    let tag = fetched_tag(r)?;
    r.set_paths(&tag);
    Ok(())
}

fn required<'a>(path: &'a Option<PathBuf>, what: &str, repo: &str) -> Result<&'a Path> {
    path.as_deref()
        .ok_or_else(|| anyhow!("{}: {} has not been computed", repo, what))
}

fn artifact(r: &Release) -> Result<&Path> {
    required(&r.artifact_path, "artifact path", &r.repo)
}

async fn download(r: &mut Release) -> Result<()> {
    let asset = r
        .asset
        .clone()
        .ok_or_else(|| anyhow!("{}: no asset selected", r.repo))?;
    let dest = required(&r.download_path, "download path", &r.repo)?.to_path_buf();
    let mut created = None;
    if let Some(parent) = dest.parent() {
        if !parent.exists() {
            created = Some(parent.to_path_buf());
        }
        fs::create_dir_all(parent)
            .with_context(|| format!("Could not create {}", parent.display()))?;
    }

    let provider = r.provider.clone();
    if let Err(e) = provider.download(&asset.url, &dest).await {
        // A leftover publish dir would mark the release up to date next run
        discard_download(&dest, created.as_deref());
        return Err(e).with_context(|| format!("{}: download of {} failed", r.repo, asset.name));
    }
    tracing::info!("{}: downloaded {}", r.repo, dest.display());
    Ok(())
}

fn discard_download(dest: &Path, created: Option<&Path>) {
    if dest.is_file() {
        if let Err(e) = fs::remove_file(dest) {
            tracing::warn!("Could not remove {}: {}", dest.display(), e);
        }
    }
    if let Some(dir) = created {
        if let Err(e) = fs::remove_dir_all(dir) {
            tracing::warn!("Could not remove {}: {}", dir.display(), e);
        }
    }
}

async fn extract(r: &mut Release) -> Result<()> {
    let archive = required(&r.download_path, "download path", &r.repo)?.to_path_buf();
    let publish = required(&r.publish_path, "publish path", &r.repo)?.to_path_buf();
    tokio::task::spawn_blocking(move || extract_archive(&archive, &publish))
        .await
        .context("extraction task panicked")?
}

fn clean_archive(r: &Release) -> Result<()> {
    let archive = required(&r.download_path, "download path", &r.repo)?;
    fs::remove_file(archive)
        .with_context(|| format!("Could not remove {}", archive.display()))?;
    tracing::debug!("Removed {}", archive.display());
    Ok(())
}

fn locate_target(r: &Release) -> Result<()> {
    let artifact = artifact(r)?;
    let download = required(&r.download_path, "download path", &r.repo)?;
    let publish = required(&r.publish_path, "publish path", &r.repo)?;

    if artifact.is_file() {
        return Ok(());
    }

    let found = match classify(download) {
        ArchiveKind::Other => download.to_path_buf(),
        ArchiveKind::Tar | ArchiveKind::Zip => {
            let wanted = artifact
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| r.project.clone());
            find_target(publish, &wanted, &r.project, download).ok_or_else(|| {
                anyhow!(
                    "{}: could not find {} in {}",
                    r.repo,
                    wanted,
                    publish.display()
                )
            })?
        }
    };

    if let Some(parent) = artifact.parent() {
        fs::create_dir_all(parent)?;
    }
    // Archives often wrap the binary in a directory of the same name
    let found = if artifact.is_dir() {
        let staged = publish.join(format!(".{}.binward-tmp", r.project));
        fs::rename(&found, &staged).with_context(|| {
            format!("Could not move {} to {}", found.display(), staged.display())
        })?;
        fs::remove_dir_all(artifact)
            .with_context(|| format!("Could not remove {}", artifact.display()))?;
        staged
    } else {
        found
    };
    fs::rename(&found, artifact).with_context(|| {
        format!(
            "Could not move {} to {}",
            found.display(),
            artifact.display()
        )
    })?;
    tracing::debug!("{} -> {}", found.display(), artifact.display());
    Ok(())
}

fn write_release_notes(r: &Release) -> Result<()> {
    let Some(body) = r.metadata.as_ref().and_then(|m| m.body.as_deref()) else {
        return Ok(());
    };
    if body.trim().is_empty() {
        return Ok(());
    }
    let publish = required(&r.publish_path, "publish path", &r.repo)?;
    let path = publish.join(RELEASE_NOTES_FILE);
    fs::write(&path, body).with_context(|| format!("Could not write {}", path.display()))
}

async fn run_command(r: &Release, command: &PostCommand) -> Result<()> {
    let vars = r.template_vars();
    let args = command
        .args
        .iter()
        .map(|a| render(a, &vars))
        .collect::<Result<Vec<_>, _>>()?;

    tracing::info!("{}: running {} {}", r.repo, command.command, args.join(" "));
    let mut cmd = tokio::process::Command::new(&command.command);
    cmd.args(&args);
    if let Some(publish) = r.publish_path.as_deref().filter(|p| p.is_dir()) {
        cmd.current_dir(publish);
    }

    let status = cmd
        .status()
        .await
        .with_context(|| format!("Could not start {}", command.command))?;
    if !status.success() {
        return Err(anyhow!(
            "{}: {} exited with {}",
            r.repo,
            command.command,
            status
        ));
    }
    Ok(())
}

/// Point the stable link path at the installed artifact, replacing any
/// previous link in a single rename.
fn link(r: &Release) -> Result<()> {
    let artifact = artifact(r)?;
    let link = required(&r.link_path, "link path", &r.repo)?;
    if let Some(parent) = link.parent() {
        fs::create_dir_all(parent)?;
    }

    let link_name = link
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| r.project.clone());
    // Releases of different orgs may share a project name and link path
    let staged = link.with_file_name(format!(
        ".{}.{}.binward-new",
        link_name,
        r.org.replace('/', "_")
    ));
    if fs::symlink_metadata(&staged).is_ok() {
        fs::remove_file(&staged)?;
    }

    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(artifact, &staged)?;
    }
    #[cfg(not(unix))]
    {
        fs::copy(artifact, &staged)?;
    }

    fs::rename(&staged, link)
        .with_context(|| format!("Could not link {}", link.display()))?;
    tracing::info!("{}: {} -> {}", r.repo, link.display(), artifact.display());
    Ok(())
}

async fn persist(r: &Release) -> Result<()> {
    let store = r
        .store
        .as_ref()
        .ok_or_else(|| anyhow!("{}: no store to record the release in", r.repo))?;

    let data = serde_json::to_vec(&r.record())?;
    let (msg, reply) = StoreMsg::write(r.store_key(), data);
    store.send(msg).await?;
    reply
        .await
        .map_err(|_| anyhow!("store dropped the reply for {}", r.repo))??;
    Ok(())
}
