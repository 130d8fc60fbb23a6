//! Receiving a log category
// (c) 2026 rupd contributors

use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context as _, Result};
use tokio::{
    fs::File,
    io::{AsyncRead, AsyncWrite, AsyncWriteExt as _},
};
use tracing::{debug, warn};

use super::{channel::next_reply, Reporter};
use crate::protocol::{FileInfo, MessageStream, Tag};

/// What a log category retrieval produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSummary {
    /// Files written, in the order received
    pub files: Vec<PathBuf>,
    /// Total bytes written
    pub bytes: u64,
    /// Names of files whose received size did not match the announced size
    pub mismatched: Vec<String>,
}

impl LogSummary {
    /// True if every file arrived intact
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.mismatched.is_empty()
    }
}

/// The file currently being received
#[derive(Debug)]
struct Incoming {
    info: FileInfo,
    path: PathBuf,
    written: u64,
    file: Option<File>,
}

impl Incoming {
    async fn create(dir: &Path, info: FileInfo) -> Result<Self> {
        let path = dir.join(&info.name);
        let file = File::create(&path)
            .await
            .with_context(|| format!("creating {}", path.display()))?;
        let mut incoming = Self {
            info,
            path,
            written: 0,
            file: Some(file),
        };
        if incoming.info.size == 0 {
            incoming.close().await?;
        }
        Ok(incoming)
    }

    async fn append(&mut self, data: &[u8]) -> Result<()> {
        let Some(file) = self.file.as_mut() else {
            // Already complete; anything further is surplus and shows up as a mismatch.
            self.written += data.len() as u64;
            return Ok(());
        };
        file.write_all(data).await?;
        self.written += data.len() as u64;
        if self.written >= self.info.size {
            self.close().await?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
        }
        Ok(())
    }
}

/// Only a bare file name may be used as a local output name
fn is_plain_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !name.contains('\\')
}

/// Requests a log category and writes each file it contains into `save_dir`.
///
/// A file whose received size differs from its announced size is reported but does not
/// end the transfer. A `FAIL` or any unexpected message does.
pub(crate) async fn receive_category<S>(
    stream: &mut MessageStream<S>,
    reporter: &Reporter,
    save_dir: &Path,
    category: &str,
) -> Result<LogSummary>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    tokio::fs::create_dir_all(save_dir)
        .await
        .with_context(|| format!("creating {}", save_dir.display()))?;
    stream.send_text(Tag::Mlog, category).await?;

    let mut summary = LogSummary::default();
    let mut current: Option<Incoming> = None;
    loop {
        let message = next_reply(stream).await?;
        match message.tag() {
            Some(Tag::Minf) => {
                let info: FileInfo = message
                    .body_text()
                    .parse()
                    .with_context(|| format!("bad MINF {:?}", message.body_text()))?;
                if !is_plain_name(&info.name) {
                    bail!("refusing log file name {:?}", info.name);
                }
                if let Some(mut previous) = current.take() {
                    previous.close().await?;
                    warn!("{} was never completed", previous.info.name);
                    summary.mismatched.push(previous.info.name);
                }
                debug!("receiving {info}");
                current = Some(Incoming::create(save_dir, info).await?);
            }
            Some(Tag::Mdat) => {
                let Some(incoming) = current.as_mut() else {
                    bail!("log data without file information");
                };
                incoming.append(message.body()).await?;
            }
            Some(Tag::Step) => {
                let Some(mut incoming) = current.take() else {
                    bail!("log file completion without file information");
                };
                incoming.close().await?;
                summary.bytes += incoming.written;
                if incoming.written == incoming.info.size {
                    reporter.say(format!("Log file received: {}", incoming.info.name));
                } else {
                    warn!(
                        "{}: received {} of {} bytes",
                        incoming.info.name, incoming.written, incoming.info.size
                    );
                    reporter.say("Log data error.");
                    summary.mismatched.push(incoming.info.name.clone());
                }
                summary.files.push(incoming.path);
            }
            Some(Tag::Ack) => break,
            Some(Tag::Fail) => bail!("Logs request failed: {}", message.body_text()),
            _ => bail!("unexpected {} while receiving logs", message.tag_text()),
        }
    }
    if let Some(mut incoming) = current.take() {
        incoming.close().await?;
        summary.mismatched.push(incoming.info.name);
    }
    reporter.say(format!(
        "Received {} log files from category {category}.",
        summary.files.len()
    ));
    Ok(summary)
}
