//! Gateway protocol schema
//!
//! Decodes the wire text of client messages. Decoding happens in two steps,
//! first JSON then the `action` discriminator, so malformed JSON and an
//! unknown action get their own replies.

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::types::{ClientMessage, ServerMessage};

/// Fixed error texts shared with clients
pub mod errors {
    pub const INVALID_ACTION: &str = "Invalid action";
    pub const NO_ACTIVE_PROCESS: &str = "No active process found";
    pub const ALREADY_RUNNING: &str = "Execution already in progress";
    pub const TIMED_OUT: &str = "Execution timed out";
}

/// Decode one client message. The error is the reply to send back.
pub fn parse_client_message(text: &str) -> Result<ClientMessage, ServerMessage> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| ServerMessage::error(format!("Invalid JSON: {}", e)))?;

    match value.get("action").and_then(Value::as_str) {
        Some("run") => decode(value).map(ClientMessage::Run),
        Some("input") => decode(value).map(ClientMessage::Input),
        _ => Err(ServerMessage::error(errors::INVALID_ACTION)),
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ServerMessage> {
    serde_json::from_value(value).map_err(|e| ServerMessage::error(format!("Invalid request: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn error_text(result: Result<ClientMessage, ServerMessage>) -> String {
        match result {
            Err(ServerMessage::Error { error, .. }) => error,
            other => panic!("expected error reply, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_run() {
        let message =
            parse_client_message(r#"{"action":"run","code":"print(1)","language":"python"}"#).unwrap();

        match message {
            ClientMessage::Run(run) => {
                assert_eq!(run.code, "print(1)");
                assert_eq!(run.language, "python");
                assert_eq!(run.stdin, None);
            }
            other => panic!("expected run, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_input_keeps_raw_id() {
        let message =
            parse_client_message(r#"{"action":"input","process_id":7,"stdin":"42"}"#).unwrap();

        match message {
            ClientMessage::Input(input) => {
                assert_eq!(input.process_id, json!(7));
                assert_eq!(input.stdin, "42");
            }
            other => panic!("expected input, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_json() {
        assert!(error_text(parse_client_message("{not json")).starts_with("Invalid JSON: "));
    }

    #[test]
    fn test_unknown_or_missing_action() {
        assert_eq!(error_text(parse_client_message(r#"{"action":"stop"}"#)), "Invalid action");
        assert_eq!(error_text(parse_client_message(r#"{"code":"x"}"#)), "Invalid action");
        assert_eq!(error_text(parse_client_message("[1,2]")), "Invalid action");
    }

    #[test]
    fn test_run_missing_fields() {
        let text = error_text(parse_client_message(r#"{"action":"run","code":"x"}"#));
        assert!(text.starts_with("Invalid request: "));
    }
}
