//! Configuration module
//!
//! - types/mod.rs: Core configuration types (Config, GatewayConfig, LogConfig)
//! - types/sandbox.rs: Sandbox/execution configuration
//! - io.rs: Configuration loading and saving
//! - validation.rs: Configuration validation
//! - paths.rs: Configuration file paths

mod io;
mod paths;
mod types;
mod validation;

pub use types::{Config, GatewayConfig, LogConfig};

pub use types::sandbox::{ContainerConfig, ExecutionEnv, SandboxConfig};

pub use io::{apply_env_overrides, load_config, load_config_from_path, save_config};
pub use paths::{config_dir, config_path, state_dir, workspace_dir};
pub use validation::{validate_config, ConfigValidationResult, ValidationIssue};
