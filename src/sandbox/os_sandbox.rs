//! OS-level execution
//!
//! Runs the profile command directly on the host, inside the workspace
//! directory. This is the least secure option: no resource caps and no
//! network isolation. Useful for development machines without a container
//! daemon.

use async_trait::async_trait;
use tokio::process::Command;

use crate::sandbox::language::LanguageProfile;
use crate::sandbox::process::ProcessId;
use crate::sandbox::runtime::SandboxRuntime;
use crate::sandbox::workspace::Workspace;

/// OS-level runtime
#[derive(Debug, Default)]
pub struct OsSandbox;

impl OsSandbox {
    /// Create a new OS runtime
    pub fn new() -> Self {
        tracing::warn!("OS execution mode: submitted code runs on the host without isolation");
        OsSandbox
    }
}

#[async_trait]
impl SandboxRuntime for OsSandbox {
    fn name(&self) -> &str {
        "os"
    }

    fn command(&self, workspace: &Workspace, profile: &LanguageProfile, _id: ProcessId) -> Command {
        let argv = profile.command_in(".");
        let (program, args) = argv.split_first().map_or(("sh", &[][..]), |(p, rest)| (p.as_str(), rest));

        let mut command = Command::new(program);
        command.args(args).current_dir(workspace.path());

        for (key, value) in profile.env {
            command.env(key, value);
        }

        command
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::language::Language;
    use crate::sandbox::workspace::WorkspaceManager;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_runs_inside_workspace() {
        let root = tempdir().unwrap();
        let workspace = WorkspaceManager::new(root.path()).acquire().await.unwrap();

        let command = OsSandbox.command(&workspace, Language::Cpp.profile(), ProcessId::new());
        let std = command.as_std();

        assert_eq!(std.get_program(), "sh");
        assert_eq!(std.get_current_dir(), Some(workspace.path()));
        let args: Vec<_> = std.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(args, ["-c", "g++ ./main.cpp -o ./a.out && ./a.out"]);
    }

    #[tokio::test]
    async fn test_profile_env_is_applied() {
        let root = tempdir().unwrap();
        let workspace = WorkspaceManager::new(root.path()).acquire().await.unwrap();

        let command = OsSandbox.command(&workspace, Language::Python.profile(), ProcessId::new());
        let envs: Vec<_> = command.as_std().get_envs().collect();

        assert!(envs
            .iter()
            .any(|(k, v)| *k == "PYTHONUNBUFFERED" && *v == Some(std::ffi::OsStr::new("1"))));
    }
}
