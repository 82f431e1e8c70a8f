//! Sandbox module - Interactive code execution
//!
//! Provides two isolation runtimes:
//! - OS Mode: host processes confined to a scratch workspace (no isolation)
//! - Container Mode: ephemeral containers with network off and resource caps
//!
//! Whatever the runtime, a run follows the same path: the [`Launcher`]
//! writes the source into a fresh [`Workspace`] and spawns the child, then
//! the [`Supervisor`] streams its output as [`ExecutionEvent`]s, feeds queued
//! input at detected prompts and enforces the wall-clock budget.

mod container;
mod engine;
mod executor;
mod language;
mod launcher;
mod os_sandbox;
mod process;
mod prompt;
mod runtime;
mod supervisor;
mod workspace;

pub use container::{parse_memory_limit, ContainerRuntime};
pub use engine::{Engine, Execution};
pub use executor::{ExecutionEvent, ExecutionRequest, ExecutionResult};
pub use language::{Language, LanguageProfile};
pub use launcher::Launcher;
pub use os_sandbox::OsSandbox;
pub use process::{ProcessHandle, ProcessId, ProcessState, SandboxProcess};
pub use prompt::{looks_like_prompt, HeuristicClassifier, PromptClassifier};
pub use runtime::SandboxRuntime;
pub use supervisor::{Supervisor, SupervisorSettings};
pub use workspace::{Workspace, WorkspaceManager};

#[cfg(test)]
pub(crate) use runtime::testing;

use std::sync::Arc;

use crate::config::{ExecutionEnv, SandboxConfig};
use crate::error::Result;

/// Create the runtime selected by the configuration
pub async fn create_runtime(config: &SandboxConfig) -> Result<Arc<dyn SandboxRuntime>> {
    match config.execution_env {
        ExecutionEnv::Os => Ok(Arc::new(OsSandbox::new())),
        ExecutionEnv::Container => {
            let runtime = ContainerRuntime::new(&config.container);
            if let Err(e) = runtime.preflight().await {
                tracing::warn!("Container preflight failed, runs may fail to launch: {}", e);
            }
            Ok(Arc::new(runtime))
        }
    }
}
