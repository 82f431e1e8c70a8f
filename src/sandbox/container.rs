//! Docker container-based execution
//!
//! The interactive run goes through the container CLI (`docker run -i`) so
//! the child's stdio pipes are the program's stdio. The Docker API is used
//! around it: daemon preflight, image pulls, and force-removal of containers
//! whose CLI client was killed.

use async_trait::async_trait;
use bollard::container::RemoveContainerOptions;
use bollard::errors::Error as DockerError;
use bollard::image::CreateImageOptions;
use bollard::Docker;
use futures::StreamExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::ContainerConfig;
use crate::error::{Error, Result};
use crate::sandbox::language::{Language, LanguageProfile};
use crate::sandbox::process::ProcessId;
use crate::sandbox::runtime::SandboxRuntime;
use crate::sandbox::workspace::Workspace;

/// Docker container runtime
pub struct ContainerRuntime {
    /// Docker API client (absent if the local endpoint could not be configured)
    docker: Option<Docker>,
    /// Container configuration
    config: ContainerConfig,
}

impl ContainerRuntime {
    /// Create a new container runtime
    pub fn new(config: &ContainerConfig) -> Self {
        let docker = match Docker::connect_with_local_defaults() {
            Ok(docker) => Some(docker),
            Err(e) => {
                warn!("Docker API unavailable, containers will not be force-removed: {}", e);
                None
            }
        };

        ContainerRuntime {
            docker,
            config: config.clone(),
        }
    }

    /// Verify the daemon answers and, if configured, pull missing images
    pub async fn preflight(&self) -> Result<()> {
        let docker = self
            .docker
            .as_ref()
            .ok_or_else(|| Error::LaunchFailure("Docker API client not configured".to_string()))?;

        docker
            .ping()
            .await
            .map_err(|e| Error::LaunchFailure(format!("Docker ping failed: {}", e)))?;

        info!("Container runtime connected to Docker");

        if self.config.pull_images {
            for language in Language::ALL {
                self.ensure_image(docker, language.profile().image).await?;
            }
        }

        Ok(())
    }

    /// Ensure the required Docker image is available
    async fn ensure_image(&self, docker: &Docker, image: &str) -> Result<()> {
        if docker.inspect_image(image).await.is_ok() {
            debug!("Image present: {}", image);
            return Ok(());
        }

        info!("Pulling Docker image: {}", image);

        let options = CreateImageOptions {
            from_image: image.to_string(),
            ..Default::default()
        };

        let mut stream = docker.create_image(Some(options), None, None);

        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(status) = info.status {
                        debug!("Pull status: {}", status);
                    }
                }
                Err(e) => {
                    return Err(Error::Container(format!("Failed to pull image {}: {}", image, e)));
                }
            }
        }

        info!("Image pulled successfully: {}", image);
        Ok(())
    }
}

/// Container name for a process
fn container_name(id: ProcessId) -> String {
    format!("execbox-{}", id)
}

/// Parse a memory limit string (e.g., "512m", "1g") to bytes
pub fn parse_memory_limit(limit: &str) -> Option<i64> {
    let limit = limit.trim().to_lowercase();
    let (num_str, unit) = if limit.ends_with('g') || limit.ends_with("gb") {
        (limit.trim_end_matches(|c| c == 'g' || c == 'b'), "g")
    } else if limit.ends_with('m') || limit.ends_with("mb") {
        (limit.trim_end_matches(|c| c == 'm' || c == 'b'), "m")
    } else if limit.ends_with('k') || limit.ends_with("kb") {
        (limit.trim_end_matches(|c| c == 'k' || c == 'b'), "k")
    } else {
        (limit.as_str(), "b")
    };

    let num: i64 = num_str.parse().ok()?;

    Some(match unit {
        "g" => num * 1024 * 1024 * 1024,
        "m" => num * 1024 * 1024,
        "k" => num * 1024,
        _ => num,
    })
}

#[async_trait]
impl SandboxRuntime for ContainerRuntime {
    fn name(&self) -> &str {
        "container"
    }

    fn command(&self, workspace: &Workspace, profile: &LanguageProfile, id: ProcessId) -> Command {
        let mount = &self.config.mount_point;

        let mut command = Command::new(&self.config.runtime);
        command
            .args(["run", "--rm", "-i"])
            .args(["--name", &container_name(id)])
            .args(["--network", &self.config.network])
            .args(["--cpus", &self.config.cpu_limit.to_string()])
            .args(["--memory", &self.config.memory_limit]);

        if let Some(pids) = self.config.pids_limit {
            command.args(["--pids-limit", &pids.to_string()]);
        }

        command
            .arg("-v")
            .arg(format!("{}:{}", workspace.path().display(), mount))
            .args(["-w", mount.as_str()]);

        for (key, value) in profile.env {
            command.arg("-e").arg(format!("{}={}", key, value));
        }

        command.arg(profile.image).args(profile.command_in(mount));
        command
    }

    async fn reclaim(&self, id: ProcessId) {
        let Some(docker) = &self.docker else {
            return;
        };

        let name = container_name(id);
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };

        match docker.remove_container(&name, Some(options)).await {
            Ok(()) => debug!("Removed container: {}", name),
            // --rm already removed it, or it never got created
            Err(DockerError::DockerResponseServerError { status_code: 404, .. }) => {}
            Err(e) => warn!("Failed to remove container {}: {}", name, e),
        }
    }
}
