//! Running the workspace build
// (c) 2026 rupd contributors

use std::sync::LazyLock;

use regex::Regex;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    process::Command,
};
use tracing::{info, warn};

use super::{
    error::{reason, SessionError},
    ServerSettings,
};
use crate::{
    exec::{run_with_heartbeat, ExecError, SessionLog},
    protocol::{MessageStream, Tag},
};

/// Progress text sent before the build starts
pub(crate) const PREPARING: &str = "Updating workspace...";

/// The build tool's summary line when packages fail
static FAILED_PACKAGES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[build\]\s+Failed:\s+([0-9]|[1-9][0-9]|1[0-9]{2}|200)\s+packages failed\.")
        .expect("static pattern is valid")
});

/// Number of failed packages reported in build output; 0 if no failure summary is present
pub(crate) fn failed_packages(output: &str) -> u32 {
    FAILED_PACKAGES
        .captures(output)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

/// Runs the update driver for an installed workspace, streaming progress to the client.
///
/// Sends the final `ACK ` itself on success; a build failure is returned as an error
/// for the caller to report.
pub(crate) async fn run_build<S>(
    stream: &mut MessageStream<S>,
    settings: &ServerSettings,
    base: &str,
    log: &mut SessionLog,
) -> Result<(), SessionError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let config = &settings.config;
    stream.send_text(Tag::Step, PREPARING).await?;

    let mut command = Command::new(config.install_root.join(settings.role.update_script()));
    let _ = command
        .arg("update")
        .arg(base)
        .arg("build")
        .current_dir(&config.install_root);

    let captured =
        match run_with_heartbeat(command, log, stream, config.progress_interval()).await {
            Ok(c) => c,
            Err(ExecError::Spawn { program, source }) => {
                warn!("could not run {program}: {source}");
                log.note(format!("could not run {program}: {source}"));
                return Err(SessionError::Build(reason::BUILD_FAILED.into()));
            }
            Err(e) => return Err(e.into()),
        };

    // Only this build's output is inspected.
    let failed = failed_packages(&format!("{}\n{}", captured.stdout, captured.stderr));
    if failed > 0 {
        warn!("build of {base} reported {failed} failed packages");
        return Err(SessionError::Build(reason::BUILD_FAILED.into()));
    }
    info!("build of {base} completed ({})", captured.status);
    stream.send_text(Tag::Ack, reason::BUILD_COMPLETED).await?;
    Ok(())
}
