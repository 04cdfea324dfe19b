use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ApiType {
    #[serde(rename = "github")]
    #[default]
    GitHub,
    #[serde(rename = "gitlab")]
    GitLab,
}

/// How a release's version is resolved against its source.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum QueryMode {
    #[serde(rename = "release")]
    #[default]
    Release,
    #[serde(rename = "releasebytag")]
    ReleaseByTag,
    #[serde(rename = "tag")]
    Tag,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct UpxConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostCommand {
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceConfig {
    pub name: String,
    #[serde(default)]
    pub apitype: ApiType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenvar: Option<String>,
}

impl SourceConfig {
    pub fn api_url(&self) -> String {
        match (&self.url, self.apitype) {
            (Some(url), _) => url.trim_end_matches('/').to_string(),
            (None, ApiType::GitHub) => "https://api.github.com".to_string(),
            (None, ApiType::GitLab) => "https://gitlab.com".to_string(),
        }
    }

    pub fn token(&self) -> Option<String> {
        let var = self.tokenvar.as_deref()?;
        std::env::var(var).ok().filter(|t| !t.is_empty())
    }
}

pub fn default_sources() -> Vec<SourceConfig> {
    vec![
        SourceConfig {
            name: "github.com".to_string(),
            apitype: ApiType::GitHub,
            url: None,
            tokenvar: Some("GH_TOKEN".to_string()),
        },
        SourceConfig {
            name: "gitlab.com".to_string(),
            apitype: ApiType::GitLab,
            url: None,
            tokenvar: Some("GL_TOKEN".to_string()),
        },
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BinwardSettings {
    #[serde(default = "default_release_path")]
    pub releasepath: String,
    #[serde(default)]
    pub cleanuparchive: bool,
    #[serde(default)]
    pub upx: UpxConfig,
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,
}

fn default_release_path() -> String {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("binward")
        .to_string_lossy()
        .to_string()
}

impl Default for BinwardSettings {
    fn default() -> Self {
        Self {
            releasepath: default_release_path(),
            cleanuparchive: false,
            upx: UpxConfig::default(),
            sources: default_sources(),
        }
    }
}

/// Values applied to every release entry that leaves them unset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ReleaseDefaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filetype: Option<String>,
    #[serde(default)]
    pub checksum: bool,
}

/// One entry under `releases:` in the config file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ReleaseEntry {
    pub repo: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<QueryMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tagregex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub releasefilename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filetype: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supportedos: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub downloadonly: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub postonly: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanuparchive: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upx: Option<UpxConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub postcommands: Vec<PostCommand>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct BinwardConfig {
    #[serde(default)]
    pub config: BinwardSettings,
    #[serde(default)]
    pub defaults: ReleaseDefaults,
    #[serde(default)]
    pub releases: Vec<ReleaseEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlatformInfo {
    pub os: String,
    pub arch: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Asset {
    pub name: String,
    pub url: String,
}

/// A release as returned by any source, normalized.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReleaseMetadata {
    pub tag: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

impl ReleaseMetadata {
    /// Metadata for a tag that has no release object attached.
    pub fn from_tag(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            body: None,
            assets: Vec::new(),
        }
    }
}
