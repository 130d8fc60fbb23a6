//! Receiving the update archive
// (c) 2026 rupd contributors

use std::path::{Path, PathBuf};

use tokio::{fs::File, io::AsyncWriteExt as _};
use tracing::debug;

use super::error::{reason, SessionError};
use crate::protocol::FileInfo;

/// Update archives must have this suffix; what precedes it names the workspace
pub(crate) const ARCHIVE_SUFFIX: &str = ".enc.tar.gz";

/// Derives the workspace name from an archive file name.
///
/// Returns `None` if the name lacks the archive suffix, or would not be a plain
/// directory name once the suffix is removed.
pub(crate) fn archive_base(name: &str) -> Option<&str> {
    let base = name.strip_suffix(ARCHIVE_SUFFIX)?;
    let plain = !base.is_empty()
        && base != "."
        && base != ".."
        && !base.contains(['/', '\\'])
        && !base.contains('\0');
    plain.then_some(base)
}

/// An upload in progress (or complete but not yet verified)
#[derive(Debug)]
pub(crate) struct Upload {
    info: FileInfo,
    base: String,
    path: PathBuf,
    received: u64,
    /// Open while more data is expected
    file: Option<File>,
}

impl Upload {
    /// Validates the metadata and creates the (empty) destination file in `dir`.
    pub(crate) async fn begin(dir: &Path, info: FileInfo) -> Result<Self, SessionError> {
        let Some(base) = archive_base(&info.name) else {
            debug!("refusing archive name {:?}", info.name);
            return Err(SessionError::violation(reason::INFO_FAILED));
        };
        let base = base.to_string();
        let path = dir.join(&info.name);
        let file = File::create(&path)
            .await
            .map_err(SessionError::io("creating upload file"))?;
        let mut upload = Self {
            info,
            base,
            path,
            received: 0,
            file: Some(file),
        };
        if upload.info.size == 0 {
            upload.close().await?;
        }
        Ok(upload)
    }

    /// Appends a chunk.
    ///
    /// # Return
    /// true if this chunk completed the upload
    pub(crate) async fn append(&mut self, chunk: &[u8]) -> Result<bool, SessionError> {
        let Some(file) = self.file.as_mut() else {
            return Err(SessionError::verification(reason::SIZE_MISMATCH));
        };
        let after = self.received + chunk.len() as u64;
        if after > self.info.size {
            debug!(
                "chunk of {} would take upload to {after}, beyond declared {}",
                chunk.len(),
                self.info.size
            );
            return Err(SessionError::verification(reason::SIZE_MISMATCH));
        }
        file.write_all(chunk)
            .await
            .map_err(|e| SessionError::verification(format!("could not store upload: {e}")))?;
        self.received = after;
        if self.is_complete() {
            self.close().await?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Flushes and closes the file, if it is still open
    pub(crate) async fn close(&mut self) -> Result<(), SessionError> {
        if let Some(mut file) = self.file.take() {
            file.flush()
                .await
                .map_err(|e| SessionError::verification(format!("could not store upload: {e}")))?;
            file.sync_all()
                .await
                .map_err(|e| SessionError::verification(format!("could not store upload: {e}")))?;
        }
        Ok(())
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.received == self.info.size
    }

    pub(crate) fn info(&self) -> &FileInfo {
        &self.info
    }

    /// The archive name without its suffix
    pub(crate) fn base(&self) -> &str {
        &self.base
    }

    pub(crate) fn received(&self) -> u64 {
        self.received
    }

    #[cfg(test)]
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}
