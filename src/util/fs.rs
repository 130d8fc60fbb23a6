//! Filesystem helpers
// (c) 2026 rupd contributors

use std::{
    io,
    path::{Path, PathBuf},
};

use tracing::debug;
use walkdir::WalkDir;

/// Removes a directory tree. A directory that does not exist is not an error.
pub(crate) async fn remove_dir_if_present(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Moves a directory tree to `to`, which must not exist.
///
/// A rename is attempted first; if that fails (for example, across filesystems)
/// the tree is copied and the source removed.
pub(crate) async fn move_dir(from: &Path, to: &Path) -> io::Result<()> {
    match tokio::fs::rename(from, to).await {
        Ok(()) => return Ok(()),
        Err(e) => debug!("rename {from:?} -> {to:?} failed ({e}); copying instead"),
    }
    let (src, dest) = (from.to_path_buf(), to.to_path_buf());
    tokio::task::spawn_blocking(move || copy_tree(&src, &dest))
        .await
        .map_err(io::Error::other)??;
    tokio::fs::remove_dir_all(from).await
}

fn copy_tree(from: &Path, to: &Path) -> io::Result<()> {
    for entry in WalkDir::new(from).follow_links(false) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(io::Error::other)?;
        let target: PathBuf = to.join(relative);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            let _ = std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(std::fs::read_link(from)?, to)
}

#[cfg(not(unix))]
fn copy_symlink(from: &Path, to: &Path) -> io::Result<()> {
    std::fs::copy(from, to).map(|_| ())
}
