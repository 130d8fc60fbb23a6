//! Verifying and installing an uploaded archive
// (c) 2026 rupd contributors

use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{
    error::{reason, SessionError},
    upload::Upload,
    workspace::Workspace,
    ServerSettings,
};
use crate::{
    exec::{run_to_completion, SessionLog},
    util::fs::{move_dir, remove_dir_if_present},
};

/// Checks that the version marker in `output` is followed, within `window` bytes, by `prefix`.
pub(crate) fn check_version(
    output: &str,
    marker: &str,
    prefix: &str,
    window: usize,
) -> Result<(), &'static str> {
    let Some(found) = output.find(marker) else {
        return Err(reason::NOT_VALID);
    };
    let bytes = output.as_bytes();
    let start = found + marker.len();
    let end = start.saturating_add(window).min(bytes.len());
    let compatible = bytes[start..end]
        .windows(prefix.len())
        .any(|w| w == prefix.as_bytes());
    if compatible {
        Ok(())
    } else {
        Err(reason::NOT_COMPATIBLE)
    }
}

/// Decrypts the completed upload, checks it is meant for this server, and installs it.
///
/// On success the decrypted tree has replaced `install_root/<base>`, the update driver
/// script is in place, and the save directory has been cleared.
pub(crate) async fn verify_and_install(
    settings: &ServerSettings,
    workspace: &Workspace,
    upload: &Upload,
    log: &mut SessionLog,
) -> Result<(), SessionError> {
    let config = &settings.config;
    if !upload.is_complete() {
        debug!(
            "received {} of {} bytes",
            upload.received(),
            upload.info().size
        );
        return Err(SessionError::verification(reason::SIZE_MISMATCH));
    }
    if config.decrypt_key.is_empty() {
        warn!("no decryption key configured");
        return Err(SessionError::verification(reason::NO_KEY));
    }

    let mark = log.mark();
    decrypt(settings, workspace, upload, log).await?;
    let decrypted = workspace.join(upload.base());
    if !decrypted.is_dir() {
        return Err(SessionError::verification(reason::DECRYPT_FAILED));
    }

    // Only this run's output counts; an earlier DCHK may have left a marker in the log.
    check_version(
        log.since(mark),
        &config.version_marker,
        settings.role.version_prefix(),
        config.version_window,
    )
    .map_err(SessionError::verification)?;

    let target = config.install_root.join(upload.base());
    if let Err(e) = install_tree(&decrypted, &target).await {
        return Err(install_failed(&e, log));
    }
    info!("installed {} into {target:?}", upload.info().name);
    workspace.clear().await;

    if let Err(e) = install_driver(settings, &target, log).await {
        return Err(install_failed(&e, log));
    }
    Ok(())
}

/// Server-side failures are logged in full; the client gets a fixed reason.
fn install_failed(e: &SessionError, log: &mut SessionLog) -> SessionError {
    warn!("{e}");
    log.note(e);
    SessionError::verification(reason::INSTALL_FAILED)
}

async fn decrypt(
    settings: &ServerSettings,
    workspace: &Workspace,
    upload: &Upload,
    log: &mut SessionLog,
) -> Result<(), SessionError> {
    let config = &settings.config;
    let script = workspace.join(&config.decrypt_script);
    if let Err(e) = tokio::fs::copy(config.script_dir.join(&config.decrypt_script), &script).await
    {
        let note = format!("could not stage {}: {e}", config.decrypt_script);
        warn!("{note}");
        log.note(note);
        return Err(SessionError::verification(reason::DECRYPT_FAILED));
    }

    let mut command = Command::new(&script);
    let _ = command
        .arg("decrypt")
        .arg(&upload.info().name)
        .arg(&config.decrypt_key)
        .current_dir(workspace.path());
    if let Err(e) = run_to_completion(command, log).await {
        // The missing output directory reports this to the client.
        warn!("{e}");
        log.note(&e);
    }
    Ok(())
}

/// Replaces `target` with the tree at `decrypted`
async fn install_tree(decrypted: &Path, target: &Path) -> Result<(), SessionError> {
    remove_dir_if_present(target)
        .await
        .map_err(SessionError::io("removing previous installation"))?;
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(SessionError::io("creating install directory"))?;
    }
    move_dir(decrypted, target)
        .await
        .map_err(SessionError::io("installing workspace"))
}

/// Puts the role's update driver script at the top of the install root.
///
/// The copy shipped inside the new workspace is preferred; the server's own copy is the fallback.
async fn install_driver(
    settings: &ServerSettings,
    installed: &Path,
    log: &mut SessionLog,
) -> Result<(), SessionError> {
    let config = &settings.config;
    let script = settings.role.update_script();
    let destination = config.install_root.join(script);
    let bundled: PathBuf = installed.join(&config.driver_subdir).join(script);

    match tokio::fs::copy(&bundled, &destination).await {
        Ok(_) => {
            debug!("installed driver from {bundled:?}");
            Ok(())
        }
        Err(e) => {
            let note = format!("{}: {e}", bundled.display());
            debug!("bundled driver unavailable ({note}); using fallback");
            log.note(&note);
            let fallback = config.script_dir.join(script);
            let _ = tokio::fs::copy(&fallback, &destination)
                .await
                .map_err(SessionError::io(format!(
                    "installing update driver from {}",
                    fallback.display()
                )))?;
            Ok(())
        }
    }
}
