//! Per-request scratch directory.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

/// Prefix of every workspace directory name.
pub const WORKSPACE_PREFIX: &str = "synthd-";

/// A fresh temporary directory owned by one pipeline run.
///
/// The directory and everything in it is removed when the workspace is
/// dropped, whichever way the run ends.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Create a new workspace under `root`, or the system temp dir if `None`.
    pub fn create(root: Option<&Path>) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKSPACE_PREFIX);
        let dir = match root {
            Some(root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };
        debug!(path = %dir.path().display(), "created workspace");
        Ok(Self { dir })
    }

    /// Directory path.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of a file inside the workspace.
    pub fn join(&self, name: impl AsRef<Path>) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Write a file inside the workspace and return its path.
    pub async fn write_file(&self, name: &str, contents: &str) -> io::Result<PathBuf> {
        let path = self.join(name);
        tokio::fs::write(&path, contents).await?;
        Ok(path)
    }

    /// Read a file produced inside the workspace.
    pub async fn read_file(&self, name: &str) -> io::Result<String> {
        tokio::fs::read_to_string(self.join(name)).await
    }

    /// Remove the workspace now, logging instead of failing on error.
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            warn!(path = %path.display(), error = %e, "failed to remove workspace");
        } else {
            debug!(path = %path.display(), "removed workspace");
        }
    }
}
