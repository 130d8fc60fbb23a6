//! One client connection to one update server
// (c) 2026 rupd contributors

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{anyhow, bail, Context as _, Result};
use human_repr::HumanCount as _;
use indicatif::MultiProgress;
use tokio::{
    io::{AsyncRead, AsyncReadExt as _, AsyncWrite},
    net::TcpStream,
    time::timeout,
};
use tracing::{debug, trace};

use super::{logs::receive_category, progress::upload_bar, DebugSink, LogSummary, Reporter};
use crate::{
    config::Configuration,
    protocol::{FileInfo, Message, MessageStream, Tag, MAX_CHUNK_SIZE},
    role::Role,
    token,
};

/// The update archive chosen for a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    /// Full path
    pub path: PathBuf,
    /// File name, as announced to the server
    pub name: String,
    /// Size in bytes, as announced to the server
    pub size: u64,
}

impl SelectedFile {
    /// Examines a local file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let meta = std::fs::metadata(path).with_context(|| format!("File not found: {}", path.display()))?;
        anyhow::ensure!(meta.is_file(), "Not a file: {}", path.display());
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("unusable file name: {}", path.display()))?
            .to_string();
        Ok(Self {
            path: path.to_path_buf(),
            name,
            size: meta.len(),
        })
    }
}

/// Client side of one connection to one server
pub struct Channel {
    role: Role,
    host: String,
    port: u16,
    connect_timeout: Duration,
    message_limit: u32,
    file: Option<SelectedFile>,
    stream: Option<MessageStream<TcpStream>>,
    server_version: Option<String>,
    log_details: String,
    reporter: Reporter,
    display: Option<MultiProgress>,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("role", &self.role)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("file", &self.file)
            .field("connected", &self.stream.is_some())
            .field("server_version", &self.server_version)
            .finish_non_exhaustive()
    }
}

impl Channel {
    /// Constructor. The port is the configured port for the role.
    #[must_use]
    pub fn new(role: Role, host: &str, config: &Configuration) -> Self {
        Self::with_port(role, host, role.port(config), config)
    }

    /// Constructor, with an explicit port
    #[must_use]
    pub fn with_port(role: Role, host: &str, port: u16, config: &Configuration) -> Self {
        Self {
            role,
            host: host.to_string(),
            port,
            connect_timeout: config.connect_timeout(),
            message_limit: config.max_message_size,
            file: None,
            stream: None,
            server_version: None,
            log_details: String::new(),
            reporter: Reporter::new(role.label()),
            display: None,
        }
    }

    /// Replaces the destination of human-readable progress messages
    pub fn set_sink(&mut self, sink: Arc<dyn DebugSink>) {
        self.reporter.set_sink(sink);
    }

    /// Shows upload progress bars on the given display
    pub fn set_display(&mut self, display: MultiProgress) {
        self.display = Some(display);
    }

    /// Accessor
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Accessor
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Accessor
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Is there an open connection?
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// The version string the server announced, if any
    #[must_use]
    pub fn server_version(&self) -> Option<&str> {
        self.server_version.as_deref()
    }

    /// The most recently retrieved session log
    #[must_use]
    pub fn log_details(&self) -> &str {
        &self.log_details
    }

    /// Accessor
    #[must_use]
    pub fn selected_file(&self) -> Option<&SelectedFile> {
        self.file.as_ref()
    }

    /// Chooses the archive to upload
    pub fn select_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let file = SelectedFile::from_path(path).inspect_err(|_| {
            self.reporter.say("File not found.");
        })?;
        debug!("{}selected {} ({} bytes)", self.role.label(), file.name, file.size);
        self.file = Some(file);
        Ok(())
    }

    fn stream(&mut self) -> Result<&mut MessageStream<TcpStream>> {
        self.stream
            .as_mut()
            .ok_or_else(|| anyhow!("{}not connected", self.role.label()))
    }

    /// Connects to the server and exchanges versions.
    pub async fn connect(&mut self) -> Result<()> {
        self.reporter.say("Connecting to server...");
        let target = format!("{}:{}", self.host, self.port);
        let tcp = match timeout(self.connect_timeout, TcpStream::connect(&target)).await {
            Ok(Ok(s)) => s,
            Ok(Err(e)) => {
                self.reporter.say(format!("Connection failed: {e}"));
                return Err(e).with_context(|| format!("connecting to {target}"));
            }
            Err(_) => {
                self.reporter.say("Connection timed out.");
                bail!("timed out connecting to {target}");
            }
        };
        let _ = tcp.set_nodelay(true);
        self.stream = Some(MessageStream::new(tcp, self.message_limit));
        self.reporter.say("Connected successfully.");

        let stream = self.stream()?;
        stream.send_bare(Tag::Vers).await?;
        let reply = next_reply(stream).await?;
        match reply.tag() {
            Some(Tag::Vers) => {
                let version = reply.body_text().into_owned();
                debug!("{}server version {version}", self.role.label());
                self.server_version = Some(version);
                Ok(())
            }
            Some(Tag::Fail) => bail!("version exchange refused: {}", reply.body_text()),
            _ => bail!("unexpected {} reply to version request", reply.tag_text()),
        }
    }

    /// Proves to the server which connection we are on
    pub async fn authenticate(&mut self) -> Result<()> {
        let stream = self.stream()?;
        let local = stream.get_ref().local_addr()?;
        stream
            .send_text(Tag::Auth, token::encode_socket(local))
            .await?;
        let _ = expect_ack(next_reply(stream).await?, "Authentication")?;
        self.reporter.say("Authentication successful.");
        Ok(())
    }

    /// Announces the selected file's name and size
    pub async fn send_info(&mut self) -> Result<()> {
        let file = self
            .file
            .clone()
            .ok_or_else(|| anyhow!("No file selected."))?;
        let stream = self.stream()?;
        stream
            .send_text(Tag::Info, FileInfo::new(file.name, file.size).to_string())
            .await?;
        let _ = expect_ack(next_reply(stream).await?, "File information")?;
        self.reporter.say("File information transmitted.");
        Ok(())
    }

    /// Uploads the selected file
    pub async fn send_data(&mut self) -> Result<()> {
        let file = self
            .file
            .clone()
            .ok_or_else(|| anyhow!("No file selected."))?;
        let bar = upload_bar(self.display.as_ref(), &self.role.label(), &file.name, file.size);
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| anyhow!("{}not connected", self.role.label()))?;

        let source = tokio::fs::File::open(&file.path)
            .await
            .with_context(|| format!("opening {}", file.path.display()))?;
        let sent = send_chunks(stream, source, file.size, |n| bar.inc(n)).await?;
        bar.finish_and_clear();
        if sent < file.size {
            bail!(
                "{} shrank while being sent ({sent} of {} bytes)",
                file.name,
                file.size
            );
        }
        // The server acknowledges once the declared size has arrived; an empty file has no data.
        if file.size > 0 {
            let reply = next_reply(stream).await?;
            let _ = expect_ack(reply, "File data transmission")?;
        }
        self.reporter
            .say(format!("File data transmitted ({}).", file.size.human_count_bytes()));
        Ok(())
    }

    /// Asks the server to decrypt, check and install the upload
    pub async fn check_data(&mut self) -> Result<()> {
        let stream = self.stream()?;
        stream.send_bare(Tag::Dchk).await?;
        let _ = expect_ack(next_reply(stream).await?, "File data check")?;
        self.reporter.say("File data check successful.");
        Ok(())
    }

    /// Runs the build, relaying progress, until the server reports the outcome
    pub async fn run_build(&mut self) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| anyhow!("{}not connected", self.role.label()))?;
        stream.send_bare(Tag::Bash).await?;
        self.reporter
            .say("The update will take a few minutes. Please wait...");
        loop {
            let reply = next_reply(stream).await?;
            match reply.tag() {
                Some(Tag::Step) => self.reporter.say(reply.body_text()),
                Some(Tag::Ack) => {
                    self.reporter.say(reply.body_text());
                    return Ok(());
                }
                Some(Tag::Fail) => bail!("{}", reply.body_text()),
                _ => bail!("unexpected {} during build", reply.tag_text()),
            }
        }
    }

    /// Retrieves the server's session log into [`log_details`](Self::log_details),
    /// optionally saving it next to the selected file.
    pub async fn fetch_session_log(&mut self, save: bool) -> Result<()> {
        let stream = self.stream()?;
        stream.send_bare(Tag::Logs).await?;
        let reply = expect_ack(next_reply(stream).await?, "Logs request")?;
        self.log_details = reply.body_text().into_owned();
        self.reporter.say("Logs request successful.");
        if save {
            self.save_session_log().await?;
        }
        Ok(())
    }

    async fn save_session_log(&self) -> Result<()> {
        let Some(file) = &self.file else {
            debug!("{}no file selected; not saving session log", self.role.label());
            return Ok(());
        };
        let dir = file.path.parent().unwrap_or_else(|| Path::new("."));
        let path = dir.join(session_log_name(&file.name, chrono::Local::now()));
        tokio::fs::write(&path, &self.log_details)
            .await
            .with_context(|| format!("saving session log to {}", path.display()))?;
        self.reporter
            .say(format!("Session log saved to {}", path.display()));
        Ok(())
    }

    /// The full update sequence for the selected file.
    ///
    /// The session log is always requested afterwards, whether or not the update succeeded.
    pub async fn update(&mut self, save_logs: bool) -> Result<()> {
        let outcome = self.transfer_and_build().await;
        if let Err(e) = &outcome {
            self.reporter.say(format!("Update failed: {e:#}"));
        }
        let logs = self.fetch_session_log(save_logs).await;
        if let Err(e) = &logs {
            self.reporter.say(format!("Could not retrieve session log: {e:#}"));
        }
        outcome.and(logs)
    }

    async fn transfer_and_build(&mut self) -> Result<()> {
        anyhow::ensure!(self.file.is_some(), "No file selected.");
        self.authenticate().await?;
        self.send_info().await?;
        self.send_data().await?;
        self.check_data().await?;
        self.run_build().await
    }

    /// Downloads every log file of a category into `save_dir`
    pub async fn request_logs(&mut self, save_dir: &Path, category: &str) -> Result<LogSummary> {
        self.authenticate().await?;
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| anyhow!("{}not connected", self.role.label()))?;
        receive_category(stream, &self.reporter, save_dir, category).await
    }

    /// Closes the connection, if open
    pub async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            self.reporter.say("Closing connection...");
            stream.shutdown().await?;
        }
        Ok(())
    }
}

/// Name of the saved session log: `logs_<archive>_<yymmdd_HHMMSS>.txt`
pub(crate) fn session_log_name<Tz>(archive: &str, when: chrono::DateTime<Tz>) -> String
where
    Tz: chrono::TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!("logs_{archive}_{}.txt", when.format("%y%m%d_%H%M%S"))
}

/// Sends up to `size` bytes from `source` as `DATA` messages.
///
/// # Return
/// The number of bytes sent
pub(crate) async fn send_chunks<S, R, F>(
    stream: &mut MessageStream<S>,
    source: R,
    size: u64,
    mut on_sent: F,
) -> Result<u64>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    R: AsyncRead + Unpin,
    F: FnMut(u64),
{
    let mut reader = source.take(size);
    let mut buffer = vec![0u8; MAX_CHUNK_SIZE];
    let mut sent = 0u64;
    loop {
        let n = reader.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        stream
            .send(&Message::new(Tag::Data, buffer[..n].to_vec()))
            .await?;
        sent += n as u64;
        on_sent(n as u64);
    }
    trace!("sent {sent} bytes");
    Ok(sent)
}

/// Waits for the server's next message
pub(crate) async fn next_reply<S>(stream: &mut MessageStream<S>) -> Result<Message>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    stream
        .receive()
        .await?
        .ok_or_else(|| anyhow!("connection closed by server"))
}

/// Requires an `ACK `; a `FAIL` becomes an error carrying its reason
pub(crate) fn expect_ack(reply: Message, what: &str) -> Result<Message> {
    match reply.tag() {
        Some(Tag::Ack) => Ok(reply),
        Some(Tag::Fail) if reply.body().is_empty() => bail!("{what} failed"),
        Some(Tag::Fail) => bail!("{what} failed: {}", reply.body_text()),
        _ => bail!("unexpected {} reply to {what}", reply.tag_text()),
    }
}
