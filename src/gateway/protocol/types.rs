//! Gateway protocol types
//!
//! Inbound client messages and the outbound messages forwarded for each
//! execution event.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::schema::errors;
use crate::sandbox::{ExecutionEvent, ProcessId};

// ============================================================================
// Inbound
// ============================================================================

/// A parsed client message
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// `{"action":"run", ...}`
    Run(RunRequest),
    /// `{"action":"input", ...}`
    Input(InputRequest),
}

/// Start one execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    /// Source code
    pub code: String,
    /// Language name, validated against the profile table
    pub language: String,
    /// Initial input line
    #[serde(default)]
    pub stdin: Option<String>,
}

/// Supply input to a live process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputRequest {
    /// Id learned from the start message; kept raw so it can be echoed back
    #[serde(default)]
    pub process_id: Value,
    /// Line to deliver
    #[serde(default)]
    pub stdin: String,
}

impl InputRequest {
    /// The targeted process, if the raw id names one
    pub fn target(&self) -> Option<ProcessId> {
        self.process_id.as_str()?.parse().ok()
    }
}

// ============================================================================
// Outbound
// ============================================================================

/// A message sent to the client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ServerMessage {
    /// `{"process_id":id}`
    Started { process_id: ProcessId },
    /// `{"output":text,"prompt":bool,"process_id":id}`
    Output {
        output: String,
        prompt: bool,
        process_id: ProcessId,
    },
    /// `{"process_id":id,"finished":true,"exit_code":n|null}`
    Finished {
        process_id: ProcessId,
        finished: bool,
        exit_code: Option<i32>,
    },
    /// `{"error":text}` or `{"error":text,"process_id":id|null}`
    Error {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        process_id: Option<Value>,
    },
}

impl ServerMessage {
    /// Error without process context
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            error: message.into(),
            process_id: None,
        }
    }

    /// Error about a specific process id, echoed as given
    pub fn process_error(message: impl Into<String>, process_id: Value) -> Self {
        ServerMessage::Error {
            error: message.into(),
            process_id: Some(process_id),
        }
    }

    /// Reply for input or actions aimed at an unknown or finished process
    pub fn no_active_process(process_id: Value) -> Self {
        Self::process_error(errors::NO_ACTIVE_PROCESS, process_id)
    }

    /// Serialize to the wire text
    pub fn to_json(&self) -> String {
        // Every variant is plain strings, numbers and bools
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"error":"Internal error"}"#.to_string())
    }
}

fn id_value(id: ProcessId) -> Value {
    Value::String(id.to_string())
}

impl From<ExecutionEvent> for ServerMessage {
    fn from(event: ExecutionEvent) -> Self {
        match event {
            ExecutionEvent::ProcessStarted { id } => ServerMessage::Started { process_id: id },
            ExecutionEvent::Output { id, text, prompt, .. } => ServerMessage::Output {
                output: text,
                prompt,
                process_id: id,
            },
            ExecutionEvent::ErrorLine { id, text } => ServerMessage::process_error(text, id_value(id)),
            ExecutionEvent::TimedOut { id } => {
                ServerMessage::process_error(errors::TIMED_OUT, id_value(id))
            }
            ExecutionEvent::Failed { id, reason } => ServerMessage::process_error(
                format!("Execution failed: {}", reason),
                id.map(id_value).unwrap_or(Value::Null),
            ),
            ExecutionEvent::Completed { id, exit_code } => ServerMessage::Finished {
                process_id: id,
                finished: true,
                exit_code,
            },
        }
    }
}
