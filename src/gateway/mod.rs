//! Gateway module - WebSocket front end for interactive execution
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  ws frames   ┌──────────────┐  events   ┌────────────┐
//! │    Client    │ ◄──────────► │   Session    │ ◄──────── │ Supervisor │
//! └──────────────┘              └──────┬───────┘           └─────▲──────┘
//!                                      │ start / inject_input    │
//!                                      └────────► Engine ────────┘
//! ```

pub mod protocol;
pub mod server;
pub mod session;

pub use protocol::{
    errors, parse_client_message, ClientMessage, InputRequest, RunRequest, ServerMessage,
};
pub use server::{build_router, serve, AppState};
pub use session::Session;
