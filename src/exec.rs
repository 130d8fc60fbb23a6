// (c) 2026 rupd contributors

//! Running helper scripts on behalf of a session
//!
//! Everything a script prints is captured into the [`SessionLog`], which the client
//! can later retrieve with `LOGS`.

use std::{
    fmt::Write as _,
    process::{ExitStatus, Output, Stdio},
    time::Duration,
};

use tokio::{
    io::{AsyncRead, AsyncWrite},
    process::Command,
    time::MissedTickBehavior,
};
use tracing::{debug, trace};

use crate::protocol::{FramingError, MessageStream, Tag};

/// Separates a command's standard error from its standard output in the session log
pub const STDERR_BANNER: &str = "\n\n====== stderr ======\n\n";

/// Progress never reports completion while the command is still running
const RUNNING_CAP: u8 = 99;
const COMPLETE: u8 = 100;

/// Cumulative output of the commands run during one session
#[derive(Debug, Default, Clone)]
pub struct SessionLog(String);

impl SessionLog {
    /// Constructor
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a command's captured output
    pub fn append(&mut self, captured: &Captured) {
        self.0.push_str("\n\n");
        self.0.push_str(&captured.stdout);
        if !captured.stderr.is_empty() {
            self.0.push_str(STDERR_BANNER);
            self.0.push_str(&captured.stderr);
        }
    }

    /// Appends a free-form note, such as the reason a fallback was taken
    pub fn note<T: std::fmt::Display>(&mut self, text: T) {
        let _ = write!(self.0, "\n\n{text}");
    }

    /// Contents
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// A position in the log, for use with [`since`](Self::since)
    #[must_use]
    pub fn mark(&self) -> usize {
        self.0.len()
    }

    /// Everything appended after `mark`
    #[must_use]
    pub fn since(&self, mark: usize) -> &str {
        self.0.get(mark..).unwrap_or_default()
    }
}

/// The result of a finished command
#[derive(Debug, Clone)]
pub struct Captured {
    /// Exit status
    pub status: ExitStatus,
    /// Standard output, lossily decoded
    pub stdout: String,
    /// Standard error, lossily decoded
    pub stderr: String,
}

impl From<Output> for Captured {
    fn from(output: Output) -> Self {
        Self {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// Things that can go wrong running a command
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// The command could not be started, or its output could not be collected
    #[error("could not run {program}: {source}")]
    Spawn {
        /// What we tried to run
        program: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
    /// A progress message could not be delivered
    #[error(transparent)]
    Transport(#[from] FramingError),
}

fn describe(command: &Command) -> String {
    command.as_std().get_program().to_string_lossy().into_owned()
}

fn prepare(command: &mut Command) -> &mut Command {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
}

/// Runs a command to completion, capturing its output into the session log.
pub async fn run_to_completion(
    mut command: Command,
    log: &mut SessionLog,
) -> Result<Captured, ExecError> {
    let program = describe(&command);
    debug!("running {program}");
    let output = prepare(&mut command)
        .output()
        .await
        .map_err(|source| ExecError::Spawn {
            program: program.clone(),
            source,
        })?;
    let captured = Captured::from(output);
    debug!("{program} finished: {}", captured.status);
    log.append(&captured);
    Ok(captured)
}

/// Percentage reported in build progress messages
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Progress {
    reported: u8,
}

impl Progress {
    /// The next value to report while the command is still running.
    ///
    /// Increases by one per call, but never reaches completion.
    pub(crate) fn advance(&mut self) -> u8 {
        self.reported = (self.reported + 1).min(RUNNING_CAP);
        self.reported
    }

    /// The remaining values up to and including completion
    pub(crate) fn finish(&mut self) -> std::ops::RangeInclusive<u8> {
        let from = self.reported + 1;
        self.reported = COMPLETE;
        from..=COMPLETE
    }

    pub(crate) fn message(value: u8) -> String {
        format!("Processing... {value}/{COMPLETE}")
    }
}

/// Runs a long command, sending `STEP` progress messages to the peer at a fixed interval.
///
/// The first progress message is sent immediately. Once the command has finished, the
/// remaining percentages up to 100 are sent in a burst. The command's output is
/// captured into the session log.
pub async fn run_with_heartbeat<S>(
    mut command: Command,
    log: &mut SessionLog,
    stream: &mut MessageStream<S>,
    interval: Duration,
) -> Result<Captured, ExecError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let program = describe(&command);
    debug!("running {program} with progress every {interval:?}");
    let child = prepare(&mut command)
        .spawn()
        .map_err(|source| ExecError::Spawn {
            program: program.clone(),
            source,
        })?;

    let output = child.wait_with_output();
    tokio::pin!(output);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut progress = Progress::default();

    let output = loop {
        tokio::select! {
            biased;
            result = &mut output => {
                break result.map_err(|source| ExecError::Spawn { program: program.clone(), source })?;
            }
            _ = ticker.tick() => {
                let value = progress.advance();
                trace!("progress {value}");
                stream.send_text(Tag::Step, Progress::message(value)).await?;
            }
        }
    };
    for value in progress.finish() {
        stream.send_text(Tag::Step, Progress::message(value)).await?;
    }

    let captured = Captured::from(output);
    debug!("{program} finished: {}", captured.status);
    log.append(&captured);
    Ok(captured)
}
