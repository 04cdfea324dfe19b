mod cli;
mod config;
mod download;
mod pipeline;
mod platform;
mod release;
mod source;
mod store;
mod sync;
mod template;
mod types;

#[cfg(test)]
mod test_support;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands, ConfigAction};
use console::style;
use source::build_sources;
use std::fs;
use sync::SyncReport;
use types::ReleaseEntry;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli)?;

    let config_path = config::resolve_config_path(cli.config.as_deref())?;

    match cli.command {
        Commands::Version => {
            println!("binward {}", cli::get_version());
        }

        Commands::Sync => {
            let config = config::load_config(&config_path)?;
            if config.releases.is_empty() {
                println!("No releases configured in {}", config_path.display());
                return Ok(());
            }
            let report = sync::sync(&config).await?;
            print_report(&report);
            if report.has_failures() {
                std::process::exit(1);
            }
        }

        Commands::Get {
            repo,
            version,
            dir,
            source,
        } => {
            let config = config::load_config(&config_path)?;
            match sync::get_release(
                &config,
                &repo,
                version.as_deref(),
                source.as_deref(),
                &dir,
            )
            .await
            {
                Ok(Some(path)) => println!("{}", path.display()),
                Ok(None) => {
                    tracing::error!("No asset of {} matches this platform", repo);
                    std::process::exit(1);
                }
                Err(e) => {
                    tracing::error!("Failed to get {}: {:#}", repo, e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Query {
            repo,
            version,
            source,
        } => {
            let config = config::load_config(&config_path)?;
            match sync::query_release(&config, &repo, version.as_deref(), source.as_deref())
                .await?
            {
                Some(metadata) => println!("{}", serde_json::to_string_pretty(&metadata)?),
                None => {
                    tracing::error!("{} is not available for this platform", repo);
                    std::process::exit(1);
                }
            }
        }

        Commands::Config { action } => match action {
            ConfigAction::Get => {
                // Creates the default file on first use
                config::read_config(&config_path)?;
                print!("{}", fs::read_to_string(&config_path)?);
            }
            ConfigAction::Edit => {
                config::edit_config(&config_path)?;
                tracing::info!("Saved {}", config_path.display());
            }
            ConfigAction::Add {
                repo,
                version,
                source,
            } => {
                let config = config::load_config(&config_path)?;
                let sources = build_sources(&config.config.sources);
                let entry = ReleaseEntry {
                    repo: repo.clone(),
                    version,
                    source,
                    ..Default::default()
                };
                if config::add_release(&config_path, entry, &sources).await? {
                    println!("Added {} to {}", repo, config_path.display());
                } else {
                    println!("{} is already configured", repo);
                }
            }
        },
    }

    Ok(())
}

fn setup_logging(cli: &Cli) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if cli.quiet {
        "error"
    } else if cli.verbose == 0 {
        "warn"
    } else if cli.verbose == 1 {
        "info"
    } else {
        "debug"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

fn print_report(report: &SyncReport) {
    println!("--- Sync finished: {} release(s) ---", report.total());
    for repo in &report.completed {
        println!("  {} {}", style("installed").green(), repo);
    }
    for repo in &report.up_to_date {
        println!("  {} {}", style("up to date").dim(), repo);
    }
    for repo in &report.excluded {
        println!("  {} {}", style("excluded").yellow(), repo);
    }
    for (repo, error) in &report.failed {
        println!("  {} {}: {}", style("failed").red().bold(), repo, error);
    }
}
