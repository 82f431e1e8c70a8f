//! Gateway Protocol - JSON messages over a WebSocket session
//!
//! ## Client messages
//!
//! - `{"action":"run","code":...,"language":...,"stdin":...?}`
//! - `{"action":"input","process_id":...,"stdin":...}`
//!
//! ## Server messages
//!
//! One per execution event, in emission order:
//!
//! - `{"process_id":id}` when the process starts
//! - `{"output":text,"prompt":bool,"process_id":id}` per stdout line
//! - `{"error":text,"process_id":id}` per stderr line, timeout or failure
//! - `{"process_id":id,"finished":true,"exit_code":n}` on completion

pub mod schema;
pub mod types;

pub use schema::{errors, parse_client_message};
pub use types::*;
