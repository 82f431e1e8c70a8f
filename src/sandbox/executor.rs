//! Execution request, event and result types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

use super::language::Language;
use super::process::ProcessId;

/// Request to execute code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// The code to execute
    pub code: String,
    /// Programming language
    pub language: Language,
    /// Initial input line, written before any prompt is seen
    #[serde(default)]
    pub stdin: Option<String>,
}

impl ExecutionRequest {
    /// Create a new execution request
    pub fn new(code: impl Into<String>, language: Language) -> Self {
        ExecutionRequest {
            code: code.into(),
            language,
            stdin: None,
        }
    }

    /// Set stdin
    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }
}

/// Something observed while supervising one execution.
///
/// `ProcessStarted` comes first; exactly one terminal event
/// (`Completed`, `TimedOut`, `Failed`) comes last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionEvent {
    ProcessStarted {
        id: ProcessId,
    },
    /// One stdout line; `prompt` marks a line believed to wait for input.
    /// `inferred` lines were produced by stdout going quiet (a flushed
    /// partial line or a blank), not by a newline from the program.
    Output {
        id: ProcessId,
        text: String,
        prompt: bool,
        inferred: bool,
    },
    /// One stderr line
    ErrorLine {
        id: ProcessId,
        text: String,
    },
    TimedOut {
        id: ProcessId,
    },
    /// `id` is `None` if the process never fully launched
    Failed {
        id: Option<ProcessId>,
        reason: String,
    },
    Completed {
        id: ProcessId,
        exit_code: Option<i32>,
    },
}

impl ExecutionEvent {
    pub fn process_id(&self) -> Option<ProcessId> {
        match self {
            ExecutionEvent::ProcessStarted { id }
            | ExecutionEvent::Output { id, .. }
            | ExecutionEvent::ErrorLine { id, .. }
            | ExecutionEvent::TimedOut { id }
            | ExecutionEvent::Completed { id, .. } => Some(*id),
            ExecutionEvent::Failed { id, .. } => *id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionEvent::TimedOut { .. }
                | ExecutionEvent::Failed { .. }
                | ExecutionEvent::Completed { .. }
        )
    }

    pub fn is_prompt(&self) -> bool {
        matches!(self, ExecutionEvent::Output { prompt: true, .. })
    }

    /// A prompt the program printed as a full line. Idle-inferred prompts
    /// are excluded: silence alone does not prove the program is waiting.
    pub fn is_line_prompt(&self) -> bool {
        matches!(
            self,
            ExecutionEvent::Output {
                prompt: true,
                inferred: false,
                ..
            }
        )
    }
}

/// Collected outcome of a non-interactive run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Whether execution completed with exit code 0
    pub success: bool,
    /// Exit code (if the process exited on its own)
    pub exit_code: Option<i32>,
    /// Standard output, one line per output event
    pub stdout: String,
    /// Standard error and failure reasons
    pub stderr: String,
    /// Wall-clock time until the terminal event
    pub execution_time: Duration,
    /// Was execution terminated due to timeout?
    pub timed_out: bool,
    /// Correlation key, if the process launched
    pub process_id: Option<ProcessId>,
    pub started_at: DateTime<Utc>,
}

impl ExecutionResult {
    /// Drain an event stream until its terminal event
    pub async fn collect(mut events: mpsc::Receiver<ExecutionEvent>) -> Self {
        let started_at = Utc::now();
        let clock = std::time::Instant::now();

        let mut result = ExecutionResult {
            success: false,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            execution_time: Duration::ZERO,
            timed_out: false,
            process_id: None,
            started_at,
        };

        while let Some(event) = events.recv().await {
            match event {
                ExecutionEvent::ProcessStarted { id } => result.process_id = Some(id),
                // Idle blanks carry no text of their own
                ExecutionEvent::Output { text, inferred: true, .. } if text.is_empty() => {}
                ExecutionEvent::Output { text, .. } => push_line(&mut result.stdout, &text),
                ExecutionEvent::ErrorLine { text, .. } => push_line(&mut result.stderr, &text),
                ExecutionEvent::TimedOut { .. } => {
                    result.timed_out = true;
                    push_line(&mut result.stderr, "Execution timed out");
                    break;
                }
                ExecutionEvent::Failed { reason, .. } => {
                    push_line(&mut result.stderr, &format!("Execution failed: {}", reason));
                    break;
                }
                ExecutionEvent::Completed { exit_code, .. } => {
                    result.exit_code = exit_code;
                    result.success = exit_code == Some(0);
                    break;
                }
            }
        }

        result.execution_time = clock.elapsed();
        result
    }
}

fn push_line(buffer: &mut String, line: &str) {
    if !buffer.is_empty() {
        buffer.push('\n');
    }
    buffer.push_str(line);
}
