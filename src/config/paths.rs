//! Configuration paths
//!
//! Utilities for resolving configuration file paths.

use std::path::PathBuf;

/// Get the configuration directory
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("EXECBOX_CONFIG_DIR") {
        return PathBuf::from(dir);
    }

    dirs::config_dir()
        .map(|d| d.join("execbox"))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .map(|h| h.join(".config").join("execbox"))
                .unwrap_or_else(|| PathBuf::from(".execbox"))
        })
}

/// Get the main configuration file path
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("EXECBOX_CONFIG") {
        return PathBuf::from(path);
    }

    config_dir().join("config.json")
}

/// Get the state directory
pub fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("EXECBOX_STATE_DIR") {
        return PathBuf::from(dir);
    }

    dirs::data_dir()
        .map(|d| d.join("execbox"))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .map(|h| h.join(".local").join("share").join("execbox"))
                .unwrap_or_else(|| PathBuf::from(".execbox"))
        })
}

/// Get the directory under which run workspaces are created
pub fn workspace_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("EXECBOX_WORKSPACE") {
        return PathBuf::from(dir);
    }

    state_dir().join("workspaces")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_paths() {
        assert!(config_path().ends_with("config.json") || std::env::var("EXECBOX_CONFIG").is_ok());
        let _ = state_dir();
        let _ = workspace_dir();
    }
}
