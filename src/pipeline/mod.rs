//! Per-release action pipeline
//!
//! Every piece of work done for a release is an [`Action`]. A release starts
//! with the units computed by [`stages::pre_actions`]; planning units later in
//! the list swap in the next stage once the state it depends on is known:
//!
//! - get/pre: exclusion check, metadata query, up-to-date check, asset
//!   selection, path computation
//! - post: download, extraction, locating and preparing the binary
//! - os: compression and user post commands
//! - final: stable link, persistence
//!
//! [`run_actions`] executes the list in order and stops at the first unit
//! that does not succeed.

mod action;
pub mod stages;


pub use action::Action;

use crate::release::Release;
use anyhow::Result;

/// Why a release stopped early without failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The release does not apply to this platform.
    Excluded,
    /// The resolved version is already installed.
    NoUpdate,
}

#[derive(Debug)]
pub enum Outcome {
    Success,
    Stop(StopReason),
    Fail(anyhow::Error),
}

impl From<Result<()>> for Outcome {
    fn from(result: Result<()>) -> Self {
        match result {
            Ok(()) => Outcome::Success,
            Err(e) => Outcome::Fail(e),
        }
    }
}

/// How a release's pipeline ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finish {
    Completed,
    Excluded,
    UpToDate,
}

impl From<StopReason> for Finish {
    fn from(reason: StopReason) -> Self {
        match reason {
            StopReason::Excluded => Finish::Excluded,
            StopReason::NoUpdate => Finish::UpToDate,
        }
    }
}

/// Execute `release.actions` until the list is empty, a unit stops the
/// pipeline, or a unit fails. Failures are returned unchanged.
pub async fn run_actions(release: &mut Release) -> Result<Finish> {
    while let Some(action) = release.actions.pop_front() {
        tracing::debug!("Executing {} for {}", action.name(), release.repo);
        match action.execute(release).await {
            Outcome::Success => {}
            Outcome::Stop(reason) => {
                match reason {
                    StopReason::Excluded => tracing::info!(
                        "{} is excluded for OS ({}), skipping",
                        release.repo,
                        release.os
                    ),
                    StopReason::NoUpdate => tracing::info!(
                        "{} ({}) is up to date",
                        release.repo,
                        release.resolved_version().unwrap_or("latest")
                    ),
                }
                release.actions.clear();
                return Ok(reason.into());
            }
            Outcome::Fail(err) => {
                tracing::debug!(
                    "Unable to complete {} for {}: {:#}",
                    action.name(),
                    release.repo,
                    err
                );
                release.actions.clear();
                return Err(err);
            }
        }
    }
    Ok(Finish::Completed)
}

/// Plan the first stage for `release` and drive it to completion.
pub async fn run(release: &mut Release) -> Result<Finish> {
    release.actions = stages::pre_actions(release);
    tracing::debug!(
        "Performing {} pre actions for {}",
        stages::describe(&release.actions),
        release.repo
    );
    run_actions(release).await
}
