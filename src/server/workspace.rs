//! Per-session save directory
// (c) 2026 rupd contributors

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::util::fs::remove_dir_if_present;

/// The scratch directory where one session stages its upload.
///
/// The name includes the listening port and a per-session identifier, so concurrent
/// sessions (on either server) never share a directory.
/// The directory is removed when the workspace is dropped.
#[derive(Debug)]
pub(crate) struct Workspace {
    path: PathBuf,
}

impl Workspace {
    pub(crate) fn new(staging_root: &Path, port: u16, id: Uuid) -> Self {
        Self {
            path: staging_root.join(format!("session_{port}_{id}")),
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn join<P: AsRef<Path>>(&self, p: P) -> PathBuf {
        self.path.join(p)
    }

    /// Discards any previous contents and creates the directory afresh
    pub(crate) async fn recreate(&self) -> std::io::Result<()> {
        remove_dir_if_present(&self.path).await?;
        tokio::fs::create_dir_all(&self.path).await
    }

    /// Removes the directory and everything in it
    pub(crate) async fn clear(&self) {
        if let Err(e) = remove_dir_if_present(&self.path).await {
            warn!("could not remove {:?}: {e}", self.path);
        } else {
            debug!("cleared {:?}", self.path);
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.path.exists() {
            let _ = std::fs::remove_dir_all(&self.path);
        }
    }
}
