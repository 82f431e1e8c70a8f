//! # execbox
//!
//! Interactive sandboxed code execution with streamed output.
//!
//! ## Features
//!
//! - **Container Isolation:** Ephemeral containers, network off, CPU and memory caps
//! - **Interactive Input:** Prompts are inferred from output; queued input is fed at the prompt
//! - **Ordered Streaming:** One event channel per run, terminal event always last
//! - **WebSocket Gateway:** JSON session protocol plus a one-shot HTTP endpoint

pub mod config;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod sandbox;

pub use config::Config;
pub use error::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
