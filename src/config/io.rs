//! Configuration I/O - Loading and saving configuration
//!
//! Handles reading configuration from files and environment variables.

use std::path::Path;
use std::time::Duration;

use super::types::Config;
use crate::error::{Error, Result};

/// Load configuration with layered precedence:
/// 1. Config file (config.json) if it exists, otherwise defaults
/// 2. Environment variable overrides (includes .env)
pub fn load_config() -> Result<Config> {
    let config_path = super::paths::config_path();

    let mut config = if config_path.exists() {
        load_config_from_path(&config_path)?
    } else {
        Config::default()
    };

    apply_env_overrides(&mut config);

    Ok(config)
}

/// Load configuration from a specific path
pub fn load_config_from_path(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;

    // Detect format by extension
    let config: Config = if path.extension().is_some_and(|ext| ext == "json") {
        json5::from_str(&content).map_err(|e| Error::Config(format!("Invalid JSON config: {}", e)))?
    } else if path.extension().is_some_and(|ext| ext == "toml") {
        toml::from_str(&content).map_err(|e| Error::Config(format!("Invalid TOML config: {}", e)))?
    } else {
        json5::from_str(&content)
            .or_else(|_| toml::from_str(&content).map_err(|e| Error::Config(e.to_string())))
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?
    };

    Ok(config)
}

/// Apply environment variable overrides to an existing config.
///
/// Loads `.env` first, then overlays any set variables. Env vars have the
/// highest precedence: defaults < file < env.
pub fn apply_env_overrides(config: &mut Config) {
    dotenvy::dotenv().ok();

    // Sandbox overrides
    if let Ok(env_str) = std::env::var("EXECBOX_EXECUTION_ENV") {
        match env_str.parse() {
            Ok(exec_env) => config.sandbox.execution_env = exec_env,
            Err(e) => tracing::warn!("Ignoring EXECBOX_EXECUTION_ENV: {}", e),
        }
    }
    if let Ok(root) = std::env::var("EXECBOX_WORKSPACE_ROOT") {
        config.sandbox.workspace_root = std::path::PathBuf::from(root);
    }
    if let Ok(timeout) = std::env::var("EXECBOX_TIMEOUT_SECS") {
        if let Ok(secs) = timeout.parse() {
            config.sandbox.execution_timeout = Duration::from_secs(secs);
        }
    }
    if let Ok(runtime) = std::env::var("EXECBOX_CONTAINER_RUNTIME") {
        config.sandbox.container.runtime = runtime;
    }
    if let Ok(memory) = std::env::var("EXECBOX_MEMORY_LIMIT") {
        config.sandbox.container.memory_limit = memory;
    }
    if let Ok(cpu) = std::env::var("EXECBOX_CPU_LIMIT") {
        if let Ok(v) = cpu.parse() {
            config.sandbox.container.cpu_limit = v;
        }
    }

    // Gateway overrides
    if let Ok(bind) = std::env::var("GATEWAY_BIND") {
        config.gateway.bind = bind;
    }
    if let Ok(port) = std::env::var("GATEWAY_PORT") {
        if let Ok(port) = port.parse() {
            config.gateway.port = port;
        }
    }

    // Logging overrides
    if let Ok(level) = std::env::var("RUST_LOG") {
        config.log.level = level;
    }
    if let Ok(format) = std::env::var("LOG_FORMAT") {
        config.log.format = format;
    }
}

/// Save configuration to a file
pub fn save_config(config: &Config, path: &Path) -> Result<()> {
    let content = if path.extension().is_some_and(|ext| ext == "toml") {
        toml::to_string_pretty(config)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?
    } else {
        serde_json::to_string_pretty(config)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(path, content)?;
    Ok(())
}
