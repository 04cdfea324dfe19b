//! Stage builders: each computes the next ordered list of actions from the
//! release's current state and has no side effects of its own.

use super::Action;
use crate::download::{classify, ArchiveKind};
use crate::release::Release;
use crate::types::{PostCommand, QueryMode};
use std::collections::VecDeque;

/// Query and asset selection.
pub fn pre_actions(r: &Release) -> VecDeque<Action> {
    let mut actions = VecDeque::new();

    actions.push_back(Action::ExcludeCheck);

    actions.push_back(match (r.query, &r.version) {
        (QueryMode::Tag, _) => Action::FetchTag,
        (_, Some(version)) => Action::FetchByTag(version.clone()),
        (_, None) => Action::FetchLatest,
    });

    // Without a store the caller only wants the metadata
    if r.store.is_none() {
        actions.push_back(Action::EndWork);
        return actions;
    }

    // Direct downloads come with their own publish path
    if r.publish_path.is_none() {
        actions.push_back(Action::ReleaseStatus);
    }

    if !r.post_only {
        actions.push_back(Action::SelectAsset);
    }

    actions.push_back(Action::SetPaths);
    actions.push_back(Action::PlanPost);
    actions
}

/// Everything after an asset has been selected.
pub fn post_actions(r: &Release) -> VecDeque<Action> {
    let mut actions = VecDeque::new();

    if !r.post_only {
        actions.push_back(Action::Download);

        if r.download_only {
            actions.push_back(Action::PlanOs);
            return actions;
        }

        let kind = r
            .download_path
            .as_deref()
            .map(classify)
            .unwrap_or(ArchiveKind::Other);
        match kind {
            ArchiveKind::Tar | ArchiveKind::Zip => {
                actions.push_back(Action::Extract);
                if r.cleanup_archive {
                    actions.push_back(Action::CleanArchive);
                }
            }
            ArchiveKind::Other => {}
        }

        actions.push_back(Action::FindTarget);
        actions.push_back(Action::MakeExecutable);
        actions.push_back(Action::WriteReleaseNotes);
    }

    actions.push_back(Action::PlanOs);
    actions
}

/// Commands to run against the installed artifact, compression first.
pub fn post_commands(r: &Release) -> Vec<PostCommand> {
    let mut commands = Vec::with_capacity(r.post_commands.len() + 1);

    if r.upx.enabled {
        let mut args = Vec::with_capacity(r.upx.args.len() + 1);
        args.push(
            r.artifact_path
                .as_ref()
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_default(),
        );
        args.extend(r.upx.args.iter().cloned());
        commands.push(PostCommand {
            command: "upx".to_string(),
            args,
        });
    }

    commands.extend(r.post_commands.iter().cloned());
    commands
}

pub fn os_actions(r: &Release) -> VecDeque<Action> {
    let mut actions: VecDeque<Action> = post_commands(r)
        .into_iter()
        .map(Action::RunCommand)
        .collect();
    actions.push_back(Action::PlanFinal);
    actions
}

pub fn final_actions(r: &Release) -> VecDeque<Action> {
    // Partial modes never link or record anything
    if r.post_only || r.download_only {
        return VecDeque::from([Action::EndWork]);
    }
    VecDeque::from([Action::Link, Action::Persist, Action::EndWork])
}

/// `[A, B, C]` style listing for debug logs.
pub fn describe(actions: &VecDeque<Action>) -> String {
    let names: Vec<&str> = actions.iter().map(Action::name).collect();
    format!("[{}]", names.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{spawn_store, MemoryStore};
    use crate::test_support::StubSource;
    use crate::types::UpxConfig;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn release() -> Release {
        Release::new("org/proj", Arc::new(StubSource::default()), "/rel").unwrap()
    }

    fn names(actions: &VecDeque<Action>) -> Vec<&'static str> {
        actions.iter().map(Action::name).collect()
    }

    #[test]
    fn library_mode_ends_after_fetch() {
        let r = release();
        assert_eq!(
            names(&pre_actions(&r)),
            ["ExcludeCheck", "FetchLatest", "EndWork"]
        );
    }

    #[tokio::test]
    async fn full_pre_stage() {
        let (store, _task) = spawn_store(MemoryStore::default());
        let mut r = release();
        r.store = Some(store);
        assert_eq!(
            names(&pre_actions(&r)),
            [
                "ExcludeCheck",
                "FetchLatest",
                "ReleaseStatus",
                "SelectAsset",
                "SetPaths",
                "PlanPost"
            ]
        );

        r.version = Some("v1.0.0".to_string());
        r.publish_path = Some(PathBuf::from("/tmp/direct"));
        assert!(matches!(pre_actions(&r)[1], Action::FetchByTag(ref v) if v == "v1.0.0"));
        assert!(!names(&pre_actions(&r)).contains(&"ReleaseStatus"));

        r.query = QueryMode::Tag;
        r.post_only = true;
        let names = names(&pre_actions(&r));
        assert_eq!(names[1], "FetchTag");
        assert!(!names.contains(&"SelectAsset"));
    }

    #[test]
    fn post_stage_by_archive_kind() {
        let mut r = release();
        r.download_path = Some(PathBuf::from("/rel/release.tar.gz"));
        r.cleanup_archive = true;
        assert_eq!(
            names(&post_actions(&r)),
            [
                "Download",
                "Extract",
                "CleanArchive",
                "FindTarget",
                "MakeExecutable",
                "WriteReleaseNotes",
                "PlanOs"
            ]
        );

        r.download_path = Some(PathBuf::from("/rel/tool.zip"));
        r.cleanup_archive = false;
        assert_eq!(names(&post_actions(&r))[1], "Extract");
        assert!(!names(&post_actions(&r)).contains(&"CleanArchive"));

        r.download_path = Some(PathBuf::from("/rel/tool-linux-amd64"));
        assert_eq!(
            names(&post_actions(&r)),
            [
                "Download",
                "FindTarget",
                "MakeExecutable",
                "WriteReleaseNotes",
                "PlanOs"
            ]
        );
    }

    #[test]
    fn partial_modes() {
        let mut r = release();
        r.download_only = true;
        assert_eq!(names(&post_actions(&r)), ["Download", "PlanOs"]);
        assert_eq!(names(&final_actions(&r)), ["EndWork"]);

        let mut r = release();
        r.post_only = true;
        assert_eq!(names(&post_actions(&r)), ["PlanOs"]);
        assert_eq!(names(&final_actions(&r)), ["EndWork"]);

        let r = release();
        assert_eq!(names(&final_actions(&r)), ["Link", "Persist", "EndWork"]);
    }

    #[test]
    fn upx_runs_before_user_commands() {
        let mut r = release();
        r.artifact_path = Some(PathBuf::from("/rel/repos/org/proj/v1/proj"));
        r.upx = UpxConfig {
            enabled: true,
            args: vec!["-k".to_string()],
        };
        r.post_commands = vec![PostCommand {
            command: "strip".to_string(),
            args: vec!["{{.artifactpath}}".to_string()],
        }];

        let commands = post_commands(&r);
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].command, "upx");
        assert_eq!(commands[0].args, ["/rel/repos/org/proj/v1/proj", "-k"]);
        assert_eq!(commands[1].command, "strip");

        assert_eq!(
            names(&os_actions(&r)),
            ["RunCommand", "RunCommand", "PlanFinal"]
        );
    }
}
