//! Running several channels side by side
// (c) 2026 rupd contributors

use std::{
    collections::BTreeMap,
    fmt::Display,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{anyhow, Result};
use futures_util::future::join_all;
use indicatif::MultiProgress;
use tracing::{debug, info_span, Instrument as _};

use super::{Channel, DebugSink};
use crate::{config::Configuration, role::Role};

/// How one channel fared
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOutcome {
    /// The channel's role
    pub role: Role,
    /// Why it failed, if it did
    pub error: Option<String>,
}

impl ChannelOutcome {
    fn from_result(role: Role, result: &Result<()>) -> Self {
        Self {
            role,
            error: result.as_ref().err().map(|e| format!("{e:#}")),
        }
    }

    /// Accessor
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

impl Display for ChannelOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.error {
            None => write!(f, "{}: succeeded", self.role),
            Some(e) => write!(f, "{}: failed: {e}", self.role),
        }
    }
}

/// Aggregate outcome of an orchestrated operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    /// One entry per channel, in channel order
    pub outcomes: Vec<ChannelOutcome>,
}

impl Report {
    /// True only if every channel succeeded
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.outcomes.iter().all(ChannelOutcome::succeeded)
    }
}

impl Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for o in &self.outcomes {
            writeln!(f, "{o}")?;
        }
        if self.succeeded() {
            write!(f, "All updates succeeded.")
        } else {
            write!(f, "One or more operations failed.")
        }
    }
}

/// Owns one [`Channel`] per role and drives them concurrently
#[derive(Debug)]
pub struct Orchestrator {
    channels: Vec<Channel>,
}

impl Orchestrator {
    /// Creates one channel per role, all against the same host
    #[must_use]
    pub fn new(host: &str, roles: &[Role], config: &Configuration) -> Self {
        Self::from_channels(
            roles
                .iter()
                .map(|role| Channel::new(*role, host, config))
                .collect(),
        )
    }

    /// Wraps channels constructed elsewhere
    #[must_use]
    pub fn from_channels(channels: Vec<Channel>) -> Self {
        Self { channels }
    }

    /// Sends every channel's progress messages to the given sink
    pub fn set_sink(&mut self, sink: &Arc<dyn DebugSink>) {
        for c in &mut self.channels {
            c.set_sink(Arc::clone(sink));
        }
    }

    /// Attaches every channel's progress bars to the given display
    pub fn set_display(&mut self, display: &MultiProgress) {
        for c in &mut self.channels {
            c.set_display(display.clone());
        }
    }

    /// Accessor
    #[must_use]
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Each channel's most recently retrieved session log, by role
    #[must_use]
    pub fn log_details(&self) -> BTreeMap<Role, String> {
        self.channels
            .iter()
            .map(|c| (c.role(), c.log_details().to_string()))
            .collect()
    }

    /// Connects every channel concurrently
    pub async fn connect_all(&mut self) -> Report {
        let results = join_all(self.channels.iter_mut().map(|channel| {
            let role = channel.role();
            async move {
                let result = channel.connect().await;
                ChannelOutcome::from_result(role, &result)
            }
            .instrument(info_span!("connect", %role))
        }))
        .await;
        Report { outcomes: results }
    }

    /// Uploads, installs and builds on every channel concurrently.
    ///
    /// `files` supplies the archive for each role; a channel whose role has no file fails
    /// without connecting.
    pub async fn update_all(&mut self, files: &BTreeMap<Role, PathBuf>, save_logs: bool) -> Report {
        let results = join_all(self.channels.iter_mut().map(|channel| {
            let role = channel.role();
            let file = files.get(&role).cloned();
            async move {
                let result = update_one(channel, file, save_logs).await;
                ChannelOutcome::from_result(role, &result)
            }
            .instrument(info_span!("update", %role))
        }))
        .await;
        Report { outcomes: results }
    }

    /// Retrieves a log category from every channel concurrently, into `<dir>/<role>/`
    pub async fn request_logs(&mut self, dir: &Path, category: &str) -> Report {
        let results = join_all(self.channels.iter_mut().map(|channel| {
            let role = channel.role();
            let target = dir.join(role.to_string().to_lowercase());
            async move {
                let result = logs_one(channel, &target, category).await;
                ChannelOutcome::from_result(role, &result)
            }
            .instrument(info_span!("logs", %role))
        }))
        .await;
        Report { outcomes: results }
    }

    /// Closes every open channel
    pub async fn close_all(&mut self) {
        for result in join_all(self.channels.iter_mut().map(Channel::close)).await {
            if let Err(e) = result {
                debug!("error closing channel: {e:#}");
            }
        }
    }
}

async fn update_one(channel: &mut Channel, file: Option<PathBuf>, save_logs: bool) -> Result<()> {
    let file = file.ok_or_else(|| anyhow!("No file selected."))?;
    channel.select_file(file)?;
    if !channel.is_connected() {
        channel.connect().await?;
    }
    let result = channel.update(save_logs).await;
    let _ = channel.close().await;
    result
}

async fn logs_one(channel: &mut Channel, dir: &Path, category: &str) -> Result<()> {
    if !channel.is_connected() {
        channel.connect().await?;
    }
    let result = channel.request_logs(dir, category).await.and_then(|summary| {
        if summary.is_clean() {
            Ok(())
        } else {
            Err(anyhow!(
                "Log data error: {}",
                summary.mismatched.join(", ")
            ))
        }
    });
    let _ = channel.close().await;
    result
}
