// # Ephemeral Workspace
//
// Each acquisition runs inside its own uniquely named temp directory.
// Subprocesses get it as their working directory; the process-wide current
// directory is never changed. The directory is removed on drop, error paths
// included, unless artifacts are kept for debugging.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::{Error, Result};

/// Scoped temporary working directory
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    path: PathBuf,
    keep: bool,
}

impl Workspace {
    /// Create a fresh directory named `<prefix><random>` in the temp root
    pub fn create(prefix: &str, keep: bool) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir()
            .map_err(|e| Error::fs("creating temporary directory", std::env::temp_dir(), e))?;
        let path = dir.path().to_path_buf();
        tracing::info!("temp dir: {}", path.display());

        Ok(Self {
            dir: Some(dir),
            path,
            keep,
        })
    }

    /// The workspace directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A path inside the workspace
    pub fn join(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.path.join(rel)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };

        if self.keep {
            let kept = dir.keep();
            tracing::info!("keeping artifacts in {}", kept.display());
            return;
        }

        if let Err(e) = dir.close() {
            tracing::warn!(
                "error removing temporary directory {}: {}",
                self.path.display(),
                e
            );
        }
    }
}
