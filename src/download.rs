use anyhow::{anyhow, Context, Result};
use flate2::read::GzDecoder;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tar::Archive;
use walkdir::WalkDir;

/// How a downloaded artifact is post-processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Tar,
    Zip,
    Other,
}

pub fn classify(path: &Path) -> ArchiveKind {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if name.ends_with(".tar")
        || name.ends_with(".tar.gz")
        || name.ends_with(".tgz")
        || name.ends_with(".tar.xz")
    {
        ArchiveKind::Tar
    } else if name.ends_with(".zip") {
        ArchiveKind::Zip
    } else {
        ArchiveKind::Other
    }
}

/// Stream the body of `request` into `local_path`, showing progress.
pub async fn download_file(request: reqwest::RequestBuilder, local_path: &Path) -> Result<()> {
    let filename = local_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    tracing::info!("Downloading {}...", filename);

    let response = request.send().await?.error_for_status()?;
    let total_size = response.content_length().unwrap_or(0);

    let pb = ProgressBar::new(total_size);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")?
            .progress_chars("#>-"),
    );
    pb.set_message(format!("Downloading {}", filename));

    if let Some(parent) = local_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::File::create(local_path)
        .with_context(|| format!("Could not create {}", local_path.display()))?;
    let mut downloaded = 0u64;
    let mut stream = response.bytes_stream();

    use futures_util::StreamExt;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk)?;
        downloaded += chunk.len() as u64;
        pb.set_position(downloaded);
    }

    pb.finish_and_clear();
    Ok(())
}

pub fn extract_archive(archive_path: &Path, extract_dir: &Path) -> Result<()> {
    tracing::info!("Extracting {}...", archive_path.display());
    fs::create_dir_all(extract_dir)?;

    let name = archive_path.to_string_lossy().to_lowercase();
    if name.ends_with(".zip") {
        extract_zip(archive_path, extract_dir)
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        let file = fs::File::open(archive_path)?;
        unpack_tar(GzDecoder::new(file), extract_dir)
    } else if name.ends_with(".tar.xz") {
        let file = fs::File::open(archive_path)?;
        unpack_tar(xz2::read::XzDecoder::new(file), extract_dir)
    } else if name.ends_with(".tar") {
        unpack_tar(fs::File::open(archive_path)?, extract_dir)
    } else {
        Err(anyhow!(
            "Unsupported archive format: {}",
            archive_path.display()
        ))
    }
}

fn unpack_tar<R: Read>(reader: R, extract_dir: &Path) -> Result<()> {
    let mut archive = Archive::new(reader);
    archive.unpack(extract_dir)?;
    Ok(())
}

fn extract_zip(archive_path: &Path, extract_dir: &Path) -> Result<()> {
    let file = fs::File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)?;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let Some(relative) = file.enclosed_name().map(Path::to_path_buf) else {
            tracing::warn!("Skipping unsafe path in zip: {}", file.name());
            continue;
        };
        let outpath = extract_dir.join(relative);

        if file.is_dir() {
            fs::create_dir_all(&outpath)?;
        } else {
            if let Some(parent) = outpath.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut outfile = fs::File::create(&outpath)?;
            io::copy(&mut file, &mut outfile)?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Some(mode) = file.unix_mode() {
                    fs::set_permissions(&outpath, fs::Permissions::from_mode(mode))?;
                }
            }
        }
    }

    Ok(())
}

/// Locate the binary to install inside an extracted tree.
///
/// A file whose name equals `wanted` wins outright. Otherwise every plausible
/// executable is scored by how closely it resembles the project and archive
/// names, and the best one is returned.
pub fn find_target(
    extract_dir: &Path,
    wanted: &str,
    project: &str,
    archive_path: &Path,
) -> Option<PathBuf> {
    let exact = WalkDir::new(extract_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.path() != archive_path)
        .find(|e| e.file_name().to_string_lossy() == wanted)
        .map(|e| e.into_path());
    if exact.is_some() {
        return exact;
    }

    let project_lower = project.to_lowercase();
    let target_names = [
        wanted.to_lowercase(),
        project_lower.clone(),
        format!("{}.exe", project_lower),
    ];

    // "gh_2.83.2_linux_amd64.tar.gz" -> ["gh", "linux", "amd64"]
    let archive_name = archive_path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let asset_stem = archive_name.split('.').next().unwrap_or("");
    let asset_parts: Vec<&str> = asset_stem
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| s.len() > 1 && !s.chars().all(|c| c.is_numeric()))
        .collect();

    let mut candidates = Vec::new();
    for entry in WalkDir::new(extract_dir).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if path == archive_path || !is_candidate(path) {
            continue;
        }
        let file_name = path.file_name()?.to_string_lossy().to_lowercase();
        let file_stem = path.file_stem()?.to_string_lossy().to_lowercase();

        let mut score = 10i32;

        if path.components().any(|c| c.as_os_str() == "bin") {
            score += 20;
        }

        if target_names.contains(&file_name) {
            score += 100;
        } else if target_names.contains(&file_stem) {
            score += 90;
        }

        if asset_parts.contains(&file_name.as_str()) {
            score += 80;
        } else if asset_parts.contains(&file_stem.as_str()) {
            score += 70;
        }

        if file_name.contains(&project_lower) {
            score += 30;
        }

        // Prefer shallow paths over nested docs/ and examples/
        let depth = path
            .strip_prefix(extract_dir)
            .ok()
            .map_or(0, |p| p.components().count());
        score -= (depth as i32) * 5;

        if score > 0 {
            candidates.push((score, path.to_path_buf()));
        }
    }

    candidates.sort_by_key(|(score, _)| -(*score));

    if let Some((score, path)) = candidates.first() {
        tracing::debug!(
            "Found candidate executable: {} with score {}",
            path.display(),
            score
        );
    }

    candidates.into_iter().map(|(_, path)| path).next()
}

fn is_candidate(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase();
    !matches!(
        ext.as_str(),
        "dll" | "so" | "dylib" | "md" | "txt" | "json" | "yaml" | "yml" | "1" | "html"
    ) && !path
        .file_name()
        .map(|n| {
            let n = n.to_string_lossy().to_uppercase();
            n.starts_with("LICENSE") || n.starts_with("README") || n.starts_with("CHANGELOG")
        })
        .unwrap_or(false)
}

pub fn make_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)
            .with_context(|| format!("Could not stat {}", path.display()))?
            .permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms)?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}
