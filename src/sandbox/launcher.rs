//! Process launcher
//!
//! Turns an [`ExecutionRequest`] into a started [`SandboxProcess`]: workspace
//! allocated, source written, child spawned with all three pipes open. Any
//! failure on the way releases the workspace before returning.

use std::process::Stdio;
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::executor::ExecutionRequest;
use super::process::{ProcessHandle, ProcessId, SandboxProcess};
use super::runtime::SandboxRuntime;
use super::workspace::{Workspace, WorkspaceManager};
use crate::error::{Error, Result};

/// Starts sandboxed processes through one runtime
#[derive(Clone)]
pub struct Launcher {
    runtime: Arc<dyn SandboxRuntime>,
    workspaces: WorkspaceManager,
    max_source_bytes: usize,
}

impl Launcher {
    pub fn new(
        runtime: Arc<dyn SandboxRuntime>,
        workspaces: WorkspaceManager,
        max_source_bytes: usize,
    ) -> Self {
        Launcher {
            runtime,
            workspaces,
            max_source_bytes,
        }
    }

    pub fn runtime(&self) -> &Arc<dyn SandboxRuntime> {
        &self.runtime
    }

    /// Launch `request` and return the running process
    pub async fn launch(&self, request: &ExecutionRequest) -> Result<SandboxProcess> {
        if request.code.len() > self.max_source_bytes {
            return Err(Error::InvalidInput(format!(
                "source is {} bytes, limit is {}",
                request.code.len(),
                self.max_source_bytes
            )));
        }

        let profile = request.language.profile();
        let workspace = self.workspaces.acquire().await?;

        match self.spawn_in(&workspace, request).await {
            Ok((id, child)) => {
                info!(
                    process_id = %id,
                    language = %request.language,
                    runtime = self.runtime.name(),
                    image = profile.image,
                    "Process started"
                );
                let handle = Arc::new(ProcessHandle::new(id, request.language));
                Ok(SandboxProcess::new(
                    handle,
                    child,
                    workspace,
                    self.runtime.clone(),
                ))
            }
            Err(e) => {
                warn!(
                    language = %request.language,
                    runtime = self.runtime.name(),
                    "Launch failed: {}", e
                );
                workspace.release().await;
                Err(e)
            }
        }
    }

    async fn spawn_in(
        &self,
        workspace: &Workspace,
        request: &ExecutionRequest,
    ) -> Result<(ProcessId, tokio::process::Child)> {
        let profile = request.language.profile();
        workspace.write(profile.filename, &request.code).await?;

        let id = ProcessId::new();
        let mut command = self.runtime.command(workspace, profile, id);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| {
            Error::LaunchFailure(format!(
                "failed to spawn {} runtime: {}",
                self.runtime.name(),
                e
            ))
        })?;

        if let Some(initial) = request.stdin.as_deref().filter(|s| !s.is_empty()) {
            if let Some(stdin) = child.stdin.as_mut() {
                let payload = format!("{}\n", initial);
                stdin.write_all(payload.as_bytes()).await?;
                stdin.flush().await?;
                debug!(process_id = %id, "Wrote initial stdin");
            }
        }

        Ok((id, child))
    }
}

impl std::fmt::Debug for Launcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Launcher")
            .field("runtime", &self.runtime.name())
            .field("workspaces", &self.workspaces)
            .field("max_source_bytes", &self.max_source_bytes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::language::Language;
    use crate::sandbox::runtime::testing::{MissingRuntime, ShellRuntime};
    use tempfile::tempdir;

    fn launcher(runtime: Arc<dyn SandboxRuntime>, root: &std::path::Path) -> Launcher {
        Launcher::new(runtime, WorkspaceManager::new(root), 1024)
    }

    fn entries(root: &std::path::Path) -> usize {
        std::fs::read_dir(root).map(|dir| dir.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn test_launch_writes_source_and_spawns() {
        let root = tempdir().unwrap();
        let launcher = launcher(Arc::new(ShellRuntime::default()), root.path());

        let mut process = launcher
            .launch(&ExecutionRequest::new("echo hi", Language::Python))
            .await
            .unwrap();

        let source = process.workspace.path().join("script.py");
        assert_eq!(std::fs::read_to_string(source).unwrap(), "echo hi");
        assert!(process.handle().is_running());
        assert!(format!("{:?}", process).contains("runtime: \"shell\""));
        assert!(process.child.wait().await.unwrap().success());
    }

    #[tokio::test]
    async fn test_oversized_source_is_rejected() {
        let root = tempdir().unwrap();
        let launcher = launcher(Arc::new(ShellRuntime::default()), root.path());
        let request = ExecutionRequest::new("x".repeat(2048), Language::Python);

        let err = launcher.launch(&request).await.unwrap_err();

        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(entries(root.path()), 0);
    }

    #[tokio::test]
    async fn test_spawn_failure_releases_workspace() {
        let root = tempdir().unwrap();
        let launcher = launcher(Arc::new(MissingRuntime), root.path());

        let err = launcher
            .launch(&ExecutionRequest::new("print(1)", Language::Python))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::LaunchFailure(_)));
        assert_eq!(entries(root.path()), 0);
    }

    #[tokio::test]
    async fn test_initial_stdin_is_written() {
        let root = tempdir().unwrap();
        let launcher = launcher(Arc::new(ShellRuntime::default()), root.path());
        let request = ExecutionRequest::new("read x; echo \"got $x\"", Language::Python)
            .with_stdin("7");

        let process = launcher.launch(&request).await.unwrap();
        let output = process.child.wait_with_output().await.unwrap();

        assert_eq!(String::from_utf8_lossy(&output.stdout), "got 7\n");
    }
}
