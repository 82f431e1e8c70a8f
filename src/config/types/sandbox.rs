//! Sandbox configuration types
//!
//! Configuration for the execution runtimes (container, OS) and the
//! supervision limits applied to every run.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Sandbox configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Execution environment
    #[serde(default)]
    pub execution_env: ExecutionEnv,
    /// Directory under which per-run workspaces are created
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,
    /// Container configuration
    #[serde(default)]
    pub container: ContainerConfig,
    /// Wall-clock budget for a single run
    #[serde(with = "humantime_serde", default = "default_execution_timeout")]
    pub execution_timeout: Duration,
    /// How long stdout may stay silent before a pending prompt is assumed
    #[serde(with = "humantime_serde", default = "default_poll_interval")]
    pub poll_interval: Duration,
    /// Silence required before the first stdout byte to assume a pending
    /// prompt; covers compilation and container start
    #[serde(with = "humantime_serde", default = "default_startup_grace")]
    pub startup_grace: Duration,
    /// Grace period for the final drain after exit and for reaping after a kill
    #[serde(with = "humantime_serde", default = "default_drain_grace")]
    pub drain_grace: Duration,
    /// Maximum accepted source size in bytes
    #[serde(default = "default_max_source")]
    pub max_source_bytes: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        SandboxConfig {
            execution_env: ExecutionEnv::default(),
            workspace_root: default_workspace_root(),
            container: ContainerConfig::default(),
            execution_timeout: default_execution_timeout(),
            poll_interval: default_poll_interval(),
            startup_grace: default_startup_grace(),
            drain_grace: default_drain_grace(),
            max_source_bytes: default_max_source(),
        }
    }
}

fn default_workspace_root() -> PathBuf {
    crate::config::workspace_dir()
}

fn default_execution_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_startup_grace() -> Duration {
    Duration::from_secs(5)
}

fn default_drain_grace() -> Duration {
    Duration::from_secs(2)
}

fn default_max_source() -> usize {
    64 * 1024
}

/// Execution environment type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionEnv {
    /// Host processes inside the workspace directory, no isolation
    Os,
    /// Ephemeral containers (recommended)
    #[default]
    Container,
}

impl std::str::FromStr for ExecutionEnv {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "os" | "host" => Ok(ExecutionEnv::Os),
            "container" | "docker" => Ok(ExecutionEnv::Container),
            _ => Err(crate::error::Error::Config(format!(
                "Invalid execution environment: {}. Valid: os, container",
                s
            ))),
        }
    }
}

impl std::fmt::Display for ExecutionEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionEnv::Os => write!(f, "os"),
            ExecutionEnv::Container => write!(f, "container"),
        }
    }
}

/// Container configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// CLI used to start containers (docker, podman)
    #[serde(default = "default_runtime")]
    pub runtime: String,
    /// Network mode
    #[serde(default = "default_network")]
    pub network: String,
    /// Memory limit
    #[serde(default = "default_memory")]
    pub memory_limit: String,
    /// CPU limit (number of CPUs)
    #[serde(default = "default_cpu")]
    pub cpu_limit: f64,
    /// Maximum number of processes inside the container
    #[serde(default = "default_pids")]
    pub pids_limit: Option<u32>,
    /// Where the workspace is mounted inside the container
    #[serde(default = "default_mount_point")]
    pub mount_point: String,
    /// Pull missing language images during preflight
    #[serde(default)]
    pub pull_images: bool,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        ContainerConfig {
            runtime: default_runtime(),
            network: default_network(),
            memory_limit: default_memory(),
            cpu_limit: default_cpu(),
            pids_limit: default_pids(),
            mount_point: default_mount_point(),
            pull_images: false,
        }
    }
}

fn default_runtime() -> String {
    "docker".to_string()
}

fn default_network() -> String {
    "none".to_string()
}

fn default_memory() -> String {
    "100m".to_string()
}

fn default_cpu() -> f64 {
    0.5
}

fn default_pids() -> Option<u32> {
    Some(64)
}

fn default_mount_point() -> String {
    "/code".to_string()
}
