use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub fn get_version() -> &'static str {
    const BASE_VERSION: &str = env!("CARGO_PKG_VERSION");

    // Release builds are tagged
    if let Some(tag) = option_env!("BINWARD_GIT_TAG") {
        return tag;
    }

    let commit = option_env!("BINWARD_GIT_COMMIT").unwrap_or("unknown");
    let branch = option_env!("BINWARD_GIT_BRANCH").unwrap_or("unknown");

    // Built once at startup
    let version = format!("v{}-{} ({})", BASE_VERSION, commit, branch);
    Box::leak(version.into_boxed_str())
}

#[derive(Parser)]
#[command(name = "binward")]
#[command(about = "Keeps release binaries from GitHub and GitLab installed and up to date")]
#[command(version = get_version())]
pub struct Cli {
    /// Config file (defaults to $BINWARD_CONFIG, then the user config directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (use multiple times for more detail)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Reduce output to errors only
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install or update every configured release
    Sync,

    /// Download a release asset into a directory without installing it
    Get {
        /// Repository (e.g., 'cli/cli')
        repo: String,
        /// Release tag to fetch instead of the latest
        #[arg(long)]
        version: Option<String>,
        /// Directory to download into
        #[arg(long, default_value = ".")]
        dir: PathBuf,
        /// Configured source to query
        #[arg(long)]
        source: Option<String>,
    },

    /// Print the metadata of a release
    Query {
        /// Repository (e.g., 'cli/cli')
        repo: String,
        /// Release tag to look up instead of the latest
        #[arg(long)]
        version: Option<String>,
        /// Configured source to query
        #[arg(long)]
        source: Option<String>,
    },

    /// Manage binward's configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show the current version
    Version,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the config file
    Get,
    /// Open the config file in $EDITOR
    Edit,
    /// Add a release after checking it exists
    Add {
        /// Repository (e.g., 'cli/cli')
        repo: String,
        /// Pin to this release tag
        #[arg(long)]
        version: Option<String>,
        /// Configured source the repository lives on
        #[arg(long)]
        source: Option<String>,
    },
}
