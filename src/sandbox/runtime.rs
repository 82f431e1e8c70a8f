//! Isolation runtime trait
//!
//! The launcher owns process spawning; a runtime only decides which command
//! runs a profile inside a workspace, and how to reclaim whatever the
//! runtime left behind once the child was killed.

use async_trait::async_trait;
use tokio::process::Command;

use super::language::LanguageProfile;
use super::process::ProcessId;
use super::workspace::Workspace;

/// Trait for isolation backends
#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    /// Get the runtime name
    fn name(&self) -> &str;

    /// Build the command that builds (if needed) and runs `profile`'s source
    /// in `workspace`. Stdio configuration is left to the caller.
    fn command(&self, workspace: &Workspace, profile: &LanguageProfile, id: ProcessId) -> Command;

    /// Release runtime-side resources of a forcibly terminated process
    async fn reclaim(&self, _id: ProcessId) {}
}
