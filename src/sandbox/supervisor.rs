//! Stream supervisor
//!
//! Owns a running child until it reaches a terminal state. Stdout, stderr and
//! stdin are each served by their own task; the supervisor itself only waits
//! for the first of: child exit, a pipe fault, the wall-clock deadline, or
//! cancellation. Every event goes through one ordered channel, and the
//! terminal event is sent only after every reader task has stopped, so it is
//! always the last event for its process.
//!
//! Cleanup (kill, runtime reclaim, workspace release, terminal state) runs on
//! every path. If the supervising future itself is dropped, [`ExitGuard`]
//! and the owned `Child`/`Workspace` values still tear everything down.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use super::executor::ExecutionEvent;
use super::process::{ProcessHandle, ProcessId, ProcessState, SandboxProcess};
use super::prompt::{HeuristicClassifier, PromptClassifier};
use super::runtime::SandboxRuntime;
use crate::config::SandboxConfig;

const READ_CHUNK: usize = 8 * 1024;

/// Timing and classification knobs for supervision
#[derive(Clone)]
pub struct SupervisorSettings {
    /// Wall-clock budget from launch
    pub execution_timeout: Duration,
    /// Stdout silence after which a prompt is inferred
    pub poll_interval: Duration,
    /// Silence required before the first stdout byte
    pub startup_grace: Duration,
    /// Final drain window after exit, and reap window after a kill
    pub drain_grace: Duration,
    pub classifier: Arc<dyn PromptClassifier>,
}

impl SupervisorSettings {
    pub fn from_config(config: &SandboxConfig) -> Self {
        SupervisorSettings {
            execution_timeout: config.execution_timeout,
            poll_interval: config.poll_interval,
            startup_grace: config.startup_grace,
            drain_grace: config.drain_grace,
            classifier: Arc::new(HeuristicClassifier),
        }
    }

    /// Replace the prompt classifier
    pub fn with_classifier(mut self, classifier: impl PromptClassifier + 'static) -> Self {
        self.classifier = Arc::new(classifier);
        self
    }
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self::from_config(&SandboxConfig::default())
    }
}

impl std::fmt::Debug for SupervisorSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisorSettings")
            .field("execution_timeout", &self.execution_timeout)
            .field("poll_interval", &self.poll_interval)
            .field("startup_grace", &self.startup_grace)
            .field("drain_grace", &self.drain_grace)
            .finish_non_exhaustive()
    }
}

/// Why the wait ended
enum Outcome {
    Exited(std::io::Result<std::process::ExitStatus>),
    Fault(String),
    TimedOut,
    Cancelled,
}

/// Supervises sandbox processes
#[derive(Debug, Clone, Default)]
pub struct Supervisor {
    settings: SupervisorSettings,
}

impl Supervisor {
    pub fn new(settings: SupervisorSettings) -> Self {
        Supervisor { settings }
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    /// Supervise `process` on its own task
    pub fn spawn(
        &self,
        process: SandboxProcess,
        events: mpsc::Sender<ExecutionEvent>,
    ) -> JoinHandle<ProcessState> {
        tokio::spawn(self.clone().run(process, events))
    }

    /// Supervise `process` to its terminal state
    pub async fn run(
        self,
        process: SandboxProcess,
        events: mpsc::Sender<ExecutionEvent>,
    ) -> ProcessState {
        let SandboxProcess {
            handle,
            mut child,
            workspace,
            runtime,
        } = process;
        let id = handle.id();
        let settings = self.settings;
        let deadline = Instant::now() + settings.execution_timeout;
        let mut guard = ExitGuard::new(handle.clone(), runtime.clone());

        let _ = events.send(ExecutionEvent::ProcessStarted { id }).await;

        let (fault_tx, mut fault_rx) = mpsc::channel::<String>(4);
        let mut readers = JoinSet::new();
        let mut writer: Option<JoinHandle<()>> = None;

        let outcome = match (child.stdout.take(), child.stderr.take(), child.stdin.take()) {
            (Some(stdout), Some(stderr), Some(stdin)) => {
                readers.spawn(drain_stdout(
                    stdout,
                    handle.clone(),
                    events.clone(),
                    fault_tx.clone(),
                    settings.clone(),
                ));
                readers.spawn(drain_stderr(stderr, id, events.clone(), fault_tx.clone()));
                writer = Some(tokio::spawn(feed_stdin(stdin, handle.clone(), fault_tx)));

                tokio::select! {
                    biased;
                    _ = handle.cancellation().cancelled() => Outcome::Cancelled,
                    status = child.wait() => Outcome::Exited(status),
                    Some(reason) = fault_rx.recv() => Outcome::Fault(reason),
                    _ = tokio::time::sleep_until(deadline) => Outcome::TimedOut,
                }
            }
            _ => Outcome::Fault("child stdio was not piped".to_string()),
        };

        let (state, terminal) = match outcome {
            Outcome::Exited(Ok(status)) => {
                drain(&mut readers, settings.drain_grace).await;
                info!(
                    process_id = %id,
                    language = %handle.language(),
                    exit_code = ?status.code(),
                    "Process completed"
                );
                (
                    ProcessState::Completed,
                    ExecutionEvent::Completed {
                        id,
                        exit_code: status.code(),
                    },
                )
            }
            Outcome::Exited(Err(e)) => {
                warn!(process_id = %id, "Failed to wait for process: {}", e);
                kill(&mut child, &*runtime, id, settings.drain_grace).await;
                stop(&mut readers).await;
                (
                    ProcessState::Failed,
                    ExecutionEvent::Failed {
                        id: Some(id),
                        reason: e.to_string(),
                    },
                )
            }
            Outcome::Fault(reason) => {
                warn!(process_id = %id, "Supervision fault: {}", reason);
                kill(&mut child, &*runtime, id, settings.drain_grace).await;
                stop(&mut readers).await;
                (
                    ProcessState::Failed,
                    ExecutionEvent::Failed {
                        id: Some(id),
                        reason,
                    },
                )
            }
            Outcome::TimedOut => {
                warn!(
                    process_id = %id,
                    language = %handle.language(),
                    "Execution timed out after {:?}", settings.execution_timeout
                );
                kill(&mut child, &*runtime, id, settings.drain_grace).await;
                stop(&mut readers).await;
                (ProcessState::TimedOut, ExecutionEvent::TimedOut { id })
            }
            Outcome::Cancelled => {
                info!(process_id = %id, "Execution cancelled");
                kill(&mut child, &*runtime, id, settings.drain_grace).await;
                stop(&mut readers).await;
                (
                    ProcessState::Failed,
                    ExecutionEvent::Failed {
                        id: Some(id),
                        reason: "Execution cancelled".to_string(),
                    },
                )
            }
        };

        if let Some(writer) = writer {
            writer.abort();
            let _ = writer.await;
        }

        handle.finish(state);
        workspace.release().await;
        guard.disarm();

        let _ = events.send(terminal).await;
        state
    }
}

/// Marks the handle failed and reclaims runtime resources if supervision is
/// abandoned before reaching a terminal state.
struct ExitGuard {
    handle: Arc<ProcessHandle>,
    runtime: Arc<dyn SandboxRuntime>,
    armed: bool,
}

impl ExitGuard {
    fn new(handle: Arc<ProcessHandle>, runtime: Arc<dyn SandboxRuntime>) -> Self {
        ExitGuard {
            handle,
            runtime,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let id = self.handle.id();
        self.handle.finish(ProcessState::Failed);
        warn!(process_id = %id, "Supervision abandoned, reclaiming");

        if let Ok(rt) = tokio::runtime::Handle::try_current() {
            let runtime = self.runtime.clone();
            rt.spawn(async move { runtime.reclaim(id).await });
        }
    }
}

/// Force-terminate the child. A child that already exited is left alone.
async fn kill(child: &mut Child, runtime: &dyn SandboxRuntime, id: ProcessId, grace: Duration) {
    if matches!(child.try_wait(), Ok(Some(_))) {
        return;
    }

    if let Err(e) = child.start_kill() {
        debug!(process_id = %id, "Kill signal not delivered: {}", e);
    }
    if timeout(grace, child.wait()).await.is_err() {
        warn!(process_id = %id, "Process not reaped within {:?}", grace);
    }
    runtime.reclaim(id).await;
}

/// Wait for readers to hit EOF, then abandon whatever is still blocked
async fn drain(readers: &mut JoinSet<()>, grace: Duration) {
    let finished = timeout(grace, async { while readers.join_next().await.is_some() {} }).await;
    if finished.is_err() {
        debug!("Output still open after {:?}, discarding", grace);
        stop(readers).await;
    }
}

/// Stop readers immediately; nothing they hold is forwarded afterwards
async fn stop(readers: &mut JoinSet<()>) {
    readers.abort_all();
    while readers.join_next().await.is_some() {}
}

fn decode(bytes: &[u8]) -> String {
    let line = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

/// Read stdout, split it into lines and classify each one.
///
/// When the stream stays silent for `poll_interval`, a buffered partial line
/// is flushed as a line of its own; with nothing buffered, one empty line is
/// emitted per quiet period. Both stand for "the program may be waiting" and
/// are marked `inferred`. Until the first byte arrives the quiet period is
/// `startup_grace` instead, so compilation or a slow container start does not
/// read as a prompt.
async fn drain_stdout<R>(
    mut stdout: R,
    handle: Arc<ProcessHandle>,
    events: mpsc::Sender<ExecutionEvent>,
    faults: mpsc::Sender<String>,
    settings: SupervisorSettings,
) where
    R: AsyncRead + Unpin,
{
    let id = handle.id();
    let mut buffer: Vec<u8> = Vec::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    let mut quiet_reported = false;
    let mut started = false;

    let emit = |text: String, inferred: bool| {
        let prompt = settings.classifier.is_prompt(&text);
        debug!(process_id = %id, prompt, inferred, "stdout: {}", text);
        ExecutionEvent::Output {
            id,
            text,
            prompt,
            inferred,
        }
    };

    loop {
        let quiet = if started {
            settings.poll_interval
        } else {
            settings.startup_grace
        };

        match timeout(quiet, stdout.read(&mut chunk)).await {
            Err(_) => {
                if quiet_reported {
                    continue;
                }
                quiet_reported = true;
                let text = decode(&std::mem::take(&mut buffer));
                if text.is_empty() && !settings.classifier.is_prompt(&text) {
                    continue;
                }
                if !forward(&events, &handle, emit(text, true)).await {
                    return;
                }
            }
            Ok(Ok(0)) => {
                if !buffer.is_empty() {
                    let event = emit(decode(&buffer), false);
                    forward(&events, &handle, event).await;
                }
                return;
            }
            Ok(Ok(n)) => {
                quiet_reported = false;
                started = true;
                buffer.extend_from_slice(&chunk[..n]);
                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    let event = emit(decode(&line), false);
                    if !forward(&events, &handle, event).await {
                        return;
                    }
                }
            }
            Ok(Err(e)) => {
                let _ = faults.send(format!("failed to read stdout: {}", e)).await;
                return;
            }
        }
    }
}

/// Send an output event; a prompt arms delivery of queued input.
/// Returns false once nobody is listening.
async fn forward(
    events: &mpsc::Sender<ExecutionEvent>,
    handle: &ProcessHandle,
    event: ExecutionEvent,
) -> bool {
    let prompt = event.is_prompt();
    if events.send(event).await.is_err() {
        return false;
    }
    if prompt {
        handle.prompt_detected();
    }
    true
}

async fn drain_stderr<R>(
    stderr: R,
    id: ProcessId,
    events: mpsc::Sender<ExecutionEvent>,
    faults: mpsc::Sender<String>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stderr);
    let mut line = Vec::new();

    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => return,
            Ok(_) => {
                let text = decode(&line);
                debug!(process_id = %id, "stderr: {}", text);
                if events.send(ExecutionEvent::ErrorLine { id, text }).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                let _ = faults.send(format!("failed to read stderr: {}", e)).await;
                return;
            }
        }
    }
}

/// Deliver queued input whenever a prompt is waiting for it
async fn feed_stdin(mut stdin: ChildStdin, handle: Arc<ProcessHandle>, faults: mpsc::Sender<String>) {
    loop {
        handle.input_ready().await;
        let Some(line) = handle.take_input() else {
            continue;
        };

        let payload = format!("{}\n", line);
        let written = async {
            stdin.write_all(payload.as_bytes()).await?;
            stdin.flush().await
        }
        .await;

        if let Err(e) = written {
            let _ = faults.send(format!("failed to write stdin: {}", e)).await;
            return;
        }
        debug!(process_id = %handle.id(), "Delivered queued input");
    }
}
