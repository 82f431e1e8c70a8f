//! Execution engine
//!
//! Ties the launcher and the supervisor together. Callers either `start` an
//! execution and consume its event stream themselves, or `run` it to
//! completion and get the collected result.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::executor::{ExecutionEvent, ExecutionRequest, ExecutionResult};
use super::launcher::Launcher;
use super::process::{ProcessHandle, ProcessId, ProcessState};
use super::runtime::SandboxRuntime;
use super::supervisor::{Supervisor, SupervisorSettings};
use super::workspace::WorkspaceManager;
use crate::config::SandboxConfig;
use crate::error::Result;

/// Buffered events per execution before the supervisor waits on the consumer
const EVENT_BUFFER: usize = 64;

/// A started execution
pub struct Execution {
    pub handle: Arc<ProcessHandle>,
    /// Ordered events, ending with exactly one terminal event
    pub events: mpsc::Receiver<ExecutionEvent>,
    pub task: JoinHandle<ProcessState>,
}

impl Execution {
    pub fn id(&self) -> ProcessId {
        self.handle.id()
    }
}

/// Launches and supervises executions
#[derive(Debug, Clone)]
pub struct Engine {
    launcher: Launcher,
    supervisor: Supervisor,
}

impl Engine {
    /// Build an engine with the runtime selected by `config`
    pub async fn from_config(config: &SandboxConfig) -> Result<Self> {
        let runtime = super::create_runtime(config).await?;
        Ok(Self::new(runtime, config))
    }

    pub fn new(runtime: Arc<dyn SandboxRuntime>, config: &SandboxConfig) -> Self {
        Self::with_settings(runtime, config, SupervisorSettings::from_config(config))
    }

    pub fn with_settings(
        runtime: Arc<dyn SandboxRuntime>,
        config: &SandboxConfig,
        settings: SupervisorSettings,
    ) -> Self {
        Engine {
            launcher: Launcher::new(
                runtime,
                WorkspaceManager::new(&config.workspace_root),
                config.max_source_bytes,
            ),
            supervisor: Supervisor::new(settings),
        }
    }

    /// Name of the isolation runtime in use
    pub fn runtime_name(&self) -> &str {
        self.launcher.runtime().name()
    }

    /// Launch `request` and supervise it in the background
    pub async fn start(&self, request: ExecutionRequest) -> Result<Execution> {
        let process = self.launcher.launch(&request).await?;
        let handle = process.handle().clone();

        let (tx, events) = mpsc::channel(EVENT_BUFFER);
        let task = self.supervisor.spawn(process, tx);

        Ok(Execution {
            handle,
            events,
            task,
        })
    }

    /// Run `request` to its terminal state and collect its output
    pub async fn run(&self, request: ExecutionRequest) -> Result<ExecutionResult> {
        let execution = self.start(request).await?;
        Ok(ExecutionResult::collect(execution.events).await)
    }
}
