//! Scratch workspace manager
//!
//! Every run gets a fresh directory holding exactly one source file. The
//! directory is removed exactly once: by an explicit [`Workspace::release`]
//! or, failing that, when the [`Workspace`] is dropped.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Allocates per-run workspaces under a root directory
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    /// Create a manager rooted at `root` (created on first acquire)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        WorkspaceManager { root: root.into() }
    }

    /// Root under which workspaces are created
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Allocate a fresh, uniquely named directory
    pub async fn acquire(&self) -> Result<Workspace> {
        tokio::fs::create_dir_all(&self.root).await?;

        let path = self.root.join(format!("run-{}", Uuid::new_v4()));
        // create_dir (not create_dir_all) fails if the name is somehow taken
        tokio::fs::create_dir(&path).await?;

        debug!(path = %path.display(), "Acquired workspace");
        Ok(Workspace {
            path,
            released: AtomicBool::new(false),
        })
    }
}

/// A disposable directory owned by one run
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    released: AtomicBool,
}

impl Workspace {
    /// Directory path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write UTF-8 `content` to `filename` inside the workspace
    pub async fn write(&self, filename: &str, content: &str) -> Result<PathBuf> {
        if self.released.load(Ordering::Acquire) {
            return Err(Error::InvalidInput(format!(
                "workspace {} already released",
                self.path.display()
            )));
        }

        let name = Path::new(filename);
        let mut components = name.components();
        let single_normal = matches!(components.next(), Some(Component::Normal(_)))
            && components.next().is_none();
        if !single_normal {
            return Err(Error::InvalidInput(format!("invalid file name: {}", filename)));
        }

        let target = self.path.join(name);
        tokio::fs::write(&target, content.as_bytes()).await?;

        debug!(file = %target.display(), bytes = content.len(), "Wrote source file");
        Ok(target)
    }

    /// Remove the directory and everything under it.
    ///
    /// Safe to call repeatedly and after the directory vanished externally.
    pub async fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }

        match tokio::fs::remove_dir_all(&self.path).await {
            Ok(()) => debug!(path = %self.path.display(), "Released workspace"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), "Failed to remove workspace: {}", e),
        }
    }

    /// Whether the workspace has been released
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %self.path.display(), "Failed to remove workspace on drop: {}", e);
            }
        }
    }
}
