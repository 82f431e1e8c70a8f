//! Configuration validation
//!
//! Validates configuration and reports issues.

use super::types::Config;
use crate::sandbox::parse_memory_limit;

/// Smallest memory cap a language toolchain can reasonably start with
const MIN_MEMORY_BYTES: i64 = 6 * 1024 * 1024;

/// Result of configuration validation
#[derive(Debug, Clone)]
pub struct ConfigValidationResult {
    /// Whether the config is valid
    pub valid: bool,
    /// Validation errors (critical)
    pub errors: Vec<ValidationIssue>,
    /// Validation warnings (non-critical)
    pub warnings: Vec<ValidationIssue>,
}

impl ConfigValidationResult {
    /// Create a valid result
    pub fn valid() -> Self {
        ConfigValidationResult {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Add an error
    pub fn with_error(mut self, issue: ValidationIssue) -> Self {
        self.valid = false;
        self.errors.push(issue);
        self
    }

    /// Add a warning
    pub fn with_warning(mut self, issue: ValidationIssue) -> Self {
        self.warnings.push(issue);
        self
    }
}

/// A validation issue
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the config field
    pub path: String,
    /// Issue message
    pub message: String,
    /// Suggested fix
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    /// Create a new issue
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationIssue {
            path: path.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    /// Add a suggestion
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " ({})", suggestion)?;
        }
        Ok(())
    }
}

/// Validate the configuration
pub fn validate_config(config: &Config) -> ConfigValidationResult {
    let mut result = ConfigValidationResult::valid();

    result = validate_limits(config, result);
    result = validate_container_config(config, result);
    result = validate_gateway_config(config, result);

    result
}

fn validate_limits(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    let sandbox = &config.sandbox;

    if sandbox.execution_timeout.is_zero() {
        result = result.with_error(
            ValidationIssue::new("sandbox.execution_timeout", "Execution timeout must be positive")
                .with_suggestion("Use a value such as \"30s\""),
        );
    }

    if sandbox.poll_interval.is_zero() {
        result = result.with_error(ValidationIssue::new(
            "sandbox.poll_interval",
            "Poll interval must be positive",
        ));
    } else if sandbox.poll_interval >= sandbox.execution_timeout {
        result = result.with_warning(ValidationIssue::new(
            "sandbox.poll_interval",
            "Poll interval is not shorter than the execution timeout; prompts will never be inferred",
        ));
    }

    if sandbox.startup_grace < sandbox.poll_interval {
        result = result.with_warning(ValidationIssue::new(
            "sandbox.startup_grace",
            "Startup grace is shorter than the poll interval; slow starts may show a spurious prompt",
        ));
    }

    if sandbox.max_source_bytes == 0 {
        result = result.with_error(ValidationIssue::new(
            "sandbox.max_source_bytes",
            "Maximum source size must be positive",
        ));
    }

    result
}

fn validate_container_config(
    config: &Config,
    mut result: ConfigValidationResult,
) -> ConfigValidationResult {
    use super::types::sandbox::ExecutionEnv;

    let container = &config.sandbox.container;

    if config.sandbox.execution_env == ExecutionEnv::Os {
        return result.with_warning(
            ValidationIssue::new(
                "sandbox.execution_env",
                "OS mode runs submitted code on the host without isolation",
            )
            .with_suggestion("Use execution_env = \"container\" for untrusted code"),
        );
    }

    if container.runtime.trim().is_empty() {
        result = result.with_error(
            ValidationIssue::new("sandbox.container.runtime", "No container runtime specified")
                .with_suggestion("Set sandbox.container.runtime to \"docker\" or \"podman\""),
        );
    } else if which::which(&container.runtime).is_err() {
        result = result.with_warning(ValidationIssue::new(
            "sandbox.container.runtime",
            format!("'{}' was not found in PATH", container.runtime),
        ));
    }

    match parse_memory_limit(&container.memory_limit) {
        Some(bytes) if bytes >= MIN_MEMORY_BYTES => {}
        Some(_) => {
            result = result.with_error(ValidationIssue::new(
                "sandbox.container.memory_limit",
                format!("Memory limit {} is below 6m", container.memory_limit),
            ));
        }
        None => {
            result = result.with_error(
                ValidationIssue::new(
                    "sandbox.container.memory_limit",
                    format!("Unparseable memory limit: {}", container.memory_limit),
                )
                .with_suggestion("Use a value such as \"100m\" or \"1g\""),
            );
        }
    }

    if container.cpu_limit <= 0.0 {
        result = result.with_error(ValidationIssue::new(
            "sandbox.container.cpu_limit",
            "CPU limit must be positive",
        ));
    }

    if container.network != "none" {
        result = result.with_warning(ValidationIssue::new(
            "sandbox.container.network",
            format!("Sandboxed programs will have network access ({})", container.network),
        ));
    }

    if !container.mount_point.starts_with('/') {
        result = result.with_error(ValidationIssue::new(
            "sandbox.container.mount_point",
            "Mount point must be an absolute path",
        ));
    }

    result
}

fn validate_gateway_config(
    config: &Config,
    mut result: ConfigValidationResult,
) -> ConfigValidationResult {
    if config.gateway.port == 0 {
        result = result.with_warning(ValidationIssue::new(
            "gateway.port",
            "Port 0 binds a random port",
        ));
    }

    if config.gateway.bind != "127.0.0.1" && config.gateway.bind != "localhost" {
        result = result.with_warning(
            ValidationIssue::new(
                "gateway.bind",
                format!("Gateway is reachable beyond localhost ({})", config.gateway.bind),
            )
            .with_suggestion("Place an authenticating proxy in front of the gateway"),
        );
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutionEnv;
    use std::time::Duration;

    #[test]
    fn test_validate_default_config() {
        let config = Config::default();
        let result = validate_config(&config);

        assert!(result.errors.is_empty(), "{:?}", result.errors);
    }

    #[test]
    fn test_rejects_bad_memory_limit() {
        let mut config = Config::default();
        config.sandbox.container.memory_limit = "lots".into();
        let result = validate_config(&config);

        assert!(!result.valid);
        assert!(result
            .errors
            .iter()
            .any(|i| i.path == "sandbox.container.memory_limit"));
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let mut config = Config::default();
        config.sandbox.execution_timeout = Duration::ZERO;
        let result = validate_config(&config);

        assert!(!result.valid);
    }

    #[test]
    fn test_os_mode_warns() {
        let mut config = Config::default();
        config.sandbox.execution_env = ExecutionEnv::Os;
        let result = validate_config(&config);

        assert!(result.valid);
        assert!(result
            .warnings
            .iter()
            .any(|i| i.path == "sandbox.execution_env"));
    }
}
