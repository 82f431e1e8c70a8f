//! Live sandbox processes
//!
//! A [`ProcessHandle`] is the shared half of a running execution: the
//! session keeps it to route late input and to cancel, the supervisor keeps
//! it to consume that input and to record the terminal state. The owned half,
//! [`SandboxProcess`], carries the child and its workspace into the
//! supervisor.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::process::Child;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use super::language::Language;
use super::runtime::SandboxRuntime;
use super::workspace::Workspace;
use crate::error::{Error, Result};

/// Opaque correlation key for one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(Uuid);

impl ProcessId {
    /// Generate a fresh id
    pub fn new() -> Self {
        ProcessId(Uuid::new_v4())
    }
}

impl Default for ProcessId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for ProcessId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(ProcessId)
            .map_err(|e| Error::InvalidInput(format!("invalid process id {}: {}", s, e)))
    }
}

/// Supervision state of an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    Running,
    Completed,
    TimedOut,
    Failed,
}

impl ProcessState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ProcessState::Running)
    }
}

#[derive(Debug)]
struct InputSlot {
    state: ProcessState,
    /// At most one queued line; a newer value overwrites an unconsumed one
    pending: Option<String>,
    /// A prompt was seen and has not been answered yet
    awaiting_input: bool,
}

/// Shared handle to a live execution
#[derive(Debug)]
pub struct ProcessHandle {
    id: ProcessId,
    language: Language,
    slot: Mutex<InputSlot>,
    input_ready: Notify,
    cancel: CancellationToken,
}

impl ProcessHandle {
    pub(crate) fn new(id: ProcessId, language: Language) -> Self {
        ProcessHandle {
            id,
            language,
            slot: Mutex::new(InputSlot {
                state: ProcessState::Running,
                pending: None,
                awaiting_input: false,
            }),
            input_ready: Notify::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> ProcessId {
        self.id
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn state(&self) -> ProcessState {
        self.slot().state
    }

    pub fn is_running(&self) -> bool {
        !self.state().is_terminal()
    }

    /// Queue a line of input for the next detected prompt.
    ///
    /// Fails with [`Error::AlreadyTerminated`] once the execution concluded.
    pub fn inject_input(&self, text: impl Into<String>) -> Result<()> {
        {
            let mut slot = self.slot();
            if slot.state.is_terminal() {
                return Err(Error::AlreadyTerminated(self.id));
            }
            if slot.pending.replace(text.into()).is_some() {
                debug!(process_id = %self.id, "Replaced unconsumed input");
            }
        }
        self.input_ready.notify_one();
        Ok(())
    }

    /// Force termination. Idempotent.
    pub fn terminate(&self) {
        self.cancel.cancel();
    }

    pub(crate) fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn prompt_detected(&self) {
        self.slot().awaiting_input = true;
        self.input_ready.notify_one();
    }

    pub(crate) async fn input_ready(&self) {
        self.input_ready.notified().await;
    }

    /// Take the queued line if a prompt is waiting for it
    pub(crate) fn take_input(&self) -> Option<String> {
        let mut slot = self.slot();
        if !slot.awaiting_input || slot.pending.is_none() {
            return None;
        }
        slot.awaiting_input = false;
        slot.pending.take()
    }

    /// Record the terminal state. Returns false if one was already recorded.
    pub(crate) fn finish(&self, state: ProcessState) -> bool {
        let mut slot = self.slot();
        if slot.state.is_terminal() {
            return false;
        }
        slot.state = state;
        slot.pending = None;
        slot.awaiting_input = false;
        true
    }

    fn slot(&self) -> MutexGuard<'_, InputSlot> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A started child process together with everything it owns
pub struct SandboxProcess {
    pub(crate) handle: Arc<ProcessHandle>,
    pub(crate) child: Child,
    pub(crate) workspace: Workspace,
    pub(crate) runtime: Arc<dyn SandboxRuntime>,
}

impl SandboxProcess {
    pub(crate) fn new(
        handle: Arc<ProcessHandle>,
        child: Child,
        workspace: Workspace,
        runtime: Arc<dyn SandboxRuntime>,
    ) -> Self {
        SandboxProcess {
            handle,
            child,
            workspace,
            runtime,
        }
    }

    pub fn id(&self) -> ProcessId {
        self.handle.id()
    }

    pub fn handle(&self) -> &Arc<ProcessHandle> {
        &self.handle
    }
}

impl std::fmt::Debug for SandboxProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxProcess")
            .field("handle", &self.handle)
            .field("pid", &self.child.id())
            .field("workspace", &self.workspace)
            .field("runtime", &self.runtime.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> ProcessHandle {
        ProcessHandle::new(ProcessId::new(), Language::Python)
    }

    #[test]
    fn test_process_id_round_trips_as_string() {
        let id = ProcessId::new();
        let json = serde_json::to_value(id).unwrap();
        assert!(json.is_string());
        assert_eq!(id.to_string().parse::<ProcessId>().unwrap(), id);
        assert!("not-a-uuid".parse::<ProcessId>().is_err());
    }

    #[test]
    fn test_input_waits_for_prompt() {
        let handle = handle();
        handle.inject_input("42").unwrap();

        assert_eq!(handle.take_input(), None);

        handle.prompt_detected();
        assert_eq!(handle.take_input().as_deref(), Some("42"));
        assert_eq!(handle.take_input(), None);
    }

    #[test]
    fn test_prompt_then_input() {
        let handle = handle();
        handle.prompt_detected();
        assert_eq!(handle.take_input(), None);

        handle.inject_input("late").unwrap();
        assert_eq!(handle.take_input().as_deref(), Some("late"));
    }

    #[test]
    fn test_newer_input_overwrites() {
        let handle = handle();
        handle.inject_input("first").unwrap();
        handle.inject_input("second").unwrap();
        handle.prompt_detected();

        assert_eq!(handle.take_input().as_deref(), Some("second"));
    }

    #[test]
    fn test_inject_after_finish_fails() {
        let handle = handle();
        assert!(handle.finish(ProcessState::Completed));
        assert!(!handle.finish(ProcessState::Failed));
        assert_eq!(handle.state(), ProcessState::Completed);

        let err = handle.inject_input("too late").unwrap_err();
        assert!(matches!(err, Error::AlreadyTerminated(id) if id == handle.id()));
    }

    #[test]
    fn test_terminate_is_idempotent() {
        let handle = handle();
        handle.terminate();
        handle.terminate();
        assert!(handle.cancellation().is_cancelled());
    }
}
