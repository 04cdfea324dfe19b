use crate::types::*;

const OS_ALIASES: &[(&str, &[&str])] = &[
    ("linux", &["linux", "unknown-linux", "pc-linux"]),
    ("darwin", &["darwin", "macos", "osx", "apple"]),
    ("windows", &["windows", "win64", "win32", "win"]),
];

const ARCH_ALIASES: &[(&str, &[&str])] = &[
    ("amd64", &["amd64", "x86_64", "x64"]),
    ("arm64", &["arm64", "aarch64"]),
    ("arm", &["armv7", "armhf", "arm"]),
    ("386", &["386", "i386", "i686"]),
    ("riscv64", &["riscv64"]),
    ("ppc64le", &["ppc64le"]),
    ("s390x", &["s390x"]),
];

const ARCHIVE_EXTS: &[&str] = &[".tar.gz", ".tgz", ".tar.xz", ".tar", ".zip"];
const PACKAGE_EXTS: &[&str] = &[".apk", ".deb", ".rpm", ".msi", ".dmg", ".pkg"];
const INVALID_EXTS: &[&str] = &[
    ".sha256", ".sha512", ".sha256sum", ".asc", ".sig", ".pem", ".pub", ".md", ".txt", ".sbom",
    ".json", ".xml", ".intoto.jsonl",
];

pub fn get_system_info() -> PlatformInfo {
    PlatformInfo {
        os: normalize_os(std::env::consts::OS),
        arch: normalize_arch(std::env::consts::ARCH),
    }
}

pub fn normalize_os(os: &str) -> String {
    match os.to_lowercase().as_str() {
        "macos" | "osx" => "darwin".to_string(),
        other => other.to_string(),
    }
}

pub fn normalize_arch(arch: &str) -> String {
    match arch.to_lowercase().as_str() {
        "x86_64" | "x64" => "amd64".to_string(),
        "aarch64" => "arm64".to_string(),
        "x86" | "i386" | "i686" => "386".to_string(),
        other => other.to_string(),
    }
}

/// True when a release declares the platforms it supports and `os` is not
/// among them. An empty list supports everything.
pub fn is_excluded(supported_os: &[String], os: &str) -> bool {
    if supported_os.is_empty() {
        return false;
    }
    let os = normalize_os(os);
    !supported_os.iter().any(|s| normalize_os(s) == os)
}

fn aliases_for<'a>(table: &'a [(&str, &[&str])], key: &str) -> &'a [&'a str] {
    table
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, aliases)| *aliases)
        .unwrap_or(&[])
}

/// True when `name` mentions any platform in `table` other than `key`.
fn mentions_other(name: &str, table: &[(&str, &[&str])], key: &str) -> bool {
    table
        .iter()
        .filter(|(k, _)| *k != key)
        .any(|(_, aliases)| mentions(name, aliases))
}

fn mentions(name: &str, aliases: &[&str]) -> bool {
    aliases.iter().any(|alias| {
        name.match_indices(alias).any(|(idx, _)| {
            // "win" inside "darwin" and "arm" inside "arm64" are not matches
            let before = name[..idx].chars().next_back();
            let after = name[idx + alias.len()..].chars().next();
            !before.is_some_and(|c| c.is_ascii_alphabetic())
                && !after.is_some_and(|c| c.is_ascii_alphanumeric())
        })
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Kind {
    Archive,
    Binary,
    Package,
}

fn kind_of(name: &str) -> Kind {
    if ARCHIVE_EXTS.iter().any(|ext| name.ends_with(ext)) {
        Kind::Archive
    } else if PACKAGE_EXTS.iter().any(|ext| name.ends_with(ext)) {
        Kind::Package
    } else {
        Kind::Binary
    }
}

/// Pick the asset best matching `system_os`/`system_arch`.
///
/// Assets naming both the OS and the architecture win over those naming only
/// one of them; archives are preferred to bare binaries, and both to
/// distribution packages. When `file_type` is given, assets with that suffix
/// are preferred inside each tier.
pub fn find_asset_for_platform(
    assets: &[Asset],
    system_os: &str,
    system_arch: &str,
    file_type: Option<&str>,
) -> Option<Asset> {
    tracing::trace!(
        "Looking for assets matching OS: '{}', ARCH: '{}'",
        system_os,
        system_arch
    );

    let os_aliases = aliases_for(OS_ALIASES, system_os);
    let arch_aliases = aliases_for(ARCH_ALIASES, system_arch);
    let file_type = file_type.map(|ft| format!(".{}", ft.trim_start_matches('.').to_lowercase()));

    let mut candidates: Vec<((u8, bool, Kind), &Asset)> = Vec::new();
    for asset in assets {
        let name = asset.name.to_lowercase();
        if INVALID_EXTS.iter().any(|ext| name.ends_with(ext)) {
            continue;
        }

        let os_match = mentions(&name, os_aliases);
        let arch_match = mentions(&name, arch_aliases);
        // A partial match only counts when the other half is unspecified,
        // never when it names a different platform
        let tier = match (os_match, arch_match) {
            (true, true) => 0,
            (true, false) if !mentions_other(&name, ARCH_ALIASES, system_arch) => 1,
            (false, true) if !mentions_other(&name, OS_ALIASES, system_os) => 2,
            _ => continue,
        };
        let preferred_type = file_type.as_ref().is_some_and(|ft| name.ends_with(ft.as_str()));

        tracing::trace!(
            "Asset '{}': os_match={}, arch_match={}, preferred_type={}",
            asset.name,
            os_match,
            arch_match,
            preferred_type
        );
        candidates.push(((tier, !preferred_type, kind_of(&name)), asset));
    }

    // Stable sort keeps the release's own ordering between equal candidates
    candidates.sort_by_key(|(rank, _)| *rank);

    let best = candidates.first().map(|(_, asset)| (*asset).clone());
    match &best {
        Some(asset) => tracing::debug!("Found best match: '{}'", asset.name),
        None => tracing::debug!("No asset matches {}/{}", system_os, system_arch),
    }
    best
}
