//! One client connection
// (c) 2026 rupd contributors

use std::{net::SocketAddr, sync::Arc};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use super::{
    build::run_build,
    error::{reason, SessionError},
    mlog::send_category,
    upload::{archive_base, Upload},
    verify::verify_and_install,
    workspace::Workspace,
    ServerSettings,
};
use crate::{
    exec::SessionLog,
    protocol::{FileInfo, FramingError, Message, MessageStream, Tag, PROTOCOL_VERSION},
    token,
};

/// How far a session has progressed.
///
/// The order of the variants is significant: later states imply the earlier ones.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, strum::Display)]
pub enum SessionState {
    /// Connected, not yet authenticated
    New,
    /// Token accepted
    Authenticated,
    /// Upload metadata accepted
    InfoOk,
    /// All upload data received
    DataOk,
    /// Upload decrypted, checked and installed
    Verified,
    /// A build has been attempted
    BuildAttempted,
}

/// Server-side state of one connection
pub(crate) struct Session<S> {
    stream: MessageStream<S>,
    peer: SocketAddr,
    settings: Arc<ServerSettings>,
    state: SessionState,
    upload: Option<Upload>,
    /// Name of the most recently verified workspace
    installed: Option<String>,
    workspace: Workspace,
    log: SessionLog,
}

impl<S> std::fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("peer", &self.peer)
            .field("state", &self.state)
            .field("workspace", &self.workspace)
            .finish_non_exhaustive()
    }
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// The session `id` names its save directory.
    pub(crate) fn new(stream: S, peer: SocketAddr, settings: Arc<ServerSettings>, id: Uuid) -> Self {
        let workspace = Workspace::new(&settings.config.staging_root, settings.port, id);
        debug!("save directory will be {:?}", workspace.path());
        Self {
            stream: MessageStream::new(stream, settings.config.max_message_size),
            peer,
            settings,
            state: SessionState::New,
            upload: None,
            installed: None,
            workspace,
            log: SessionLog::new(),
        }
    }

    /// Current state
    pub(crate) fn state(&self) -> SessionState {
        self.state
    }

    /// Serves requests until the client disconnects or the connection fails.
    ///
    /// The save directory is removed on the way out in every case.
    pub(crate) async fn run(mut self) -> Result<(), FramingError> {
        let result = self.serve().await;
        self.workspace.clear().await;
        result
    }

    async fn serve(&mut self) -> Result<(), FramingError> {
        loop {
            let message = match self.stream.receive().await {
                Ok(Some(m)) => m,
                Ok(None) => return Ok(()),
                Err(e) if e.is_recoverable() => {
                    warn!("malformed message: {e}");
                    self.stream.send_bare(Tag::Fail).await?;
                    continue;
                }
                Err(e) => return Err(e),
            };
            self.dispatch(message).await?;
        }
    }

    /// Handles one message, replying to the client where required.
    ///
    /// Only transport failures are returned; everything else becomes a `FAIL` reply.
    pub(crate) async fn dispatch(&mut self, message: Message) -> Result<(), FramingError> {
        let what = message.tag_text();
        match self.handle(message).await {
            Ok(()) => Ok(()),
            Err(SessionError::Transport(e)) => Err(e),
            Err(e) => {
                warn!("{what} refused: {e}");
                if e.abandons_transfer() {
                    self.abandon_transfer().await;
                }
                self.stream.send(&e.to_reply()).await
            }
        }
    }

    async fn handle(&mut self, message: Message) -> Result<(), SessionError> {
        let Some(tag) = message.tag() else {
            return Err(SessionError::UnknownCommand);
        };
        trace!("{tag} in state {}", self.state);
        match tag {
            Tag::Vers => Ok(self.stream.send_text(Tag::Vers, PROTOCOL_VERSION).await?),
            Tag::Auth => self.authenticate(&message.body_text()).await,
            _ if self.state < SessionState::Authenticated => {
                Err(SessionError::violation(reason::AUTH_REQUIRED))
            }
            Tag::Info => self.begin_upload(&message.body_text()).await,
            Tag::Data => self.receive_chunk(message.body()).await,
            Tag::Dchk => self.verify().await,
            Tag::Bash => self.build().await,
            Tag::Logs => {
                let log = Bytes::copy_from_slice(self.log.as_str().as_bytes());
                Ok(self.stream.send(&Message::new(Tag::Ack, log)).await?)
            }
            Tag::Mlog => {
                send_category(&mut self.stream, &self.settings, &message.body_text()).await
            }
            // Only server-to-client tags remain.
            Tag::Ack | Tag::Fail | Tag::Step | Tag::Minf | Tag::Mdat => Err(
                SessionError::violation(format!("Unexpected command {tag}.")),
            ),
        }
    }

    async fn authenticate(&mut self, token_text: &str) -> Result<(), SessionError> {
        match token::decode(token_text) {
            Ok((address, port)) if port == self.peer.port() => {
                if self.state == SessionState::New {
                    self.state = SessionState::Authenticated;
                }
                info!("authenticated (token for {address})");
                Ok(self.stream.send_bare(Tag::Ack).await?)
            }
            Ok((address, port)) => {
                warn!(
                    "token for {address}:{port} does not match connection from {}",
                    self.peer
                );
                Err(SessionError::violation(reason::AUTH_FAILED))
            }
            Err(e) => {
                warn!("undecodable token: {e}");
                Err(SessionError::violation(reason::AUTH_FAILED))
            }
        }
    }

    async fn begin_upload(&mut self, body: &str) -> Result<(), SessionError> {
        let info: FileInfo = body.parse().map_err(|e| {
            debug!("bad file information {body:?}: {e}");
            SessionError::violation(reason::INFO_FAILED)
        })?;
        if archive_base(&info.name).is_none() {
            debug!("refusing archive name {:?}", info.name);
            return Err(SessionError::violation(reason::INFO_FAILED));
        }

        // Any earlier transfer is discarded.
        self.upload = None;
        self.workspace
            .recreate()
            .await
            .map_err(SessionError::io("creating save directory"))?;
        let upload = Upload::begin(self.workspace.path(), info).await?;
        info!(
            "receiving {} ({} bytes)",
            upload.info().name,
            upload.info().size
        );
        self.upload = Some(upload);
        self.state = SessionState::InfoOk;
        Ok(self.stream.send_bare(Tag::Ack).await?)
    }

    async fn receive_chunk(&mut self, chunk: &[u8]) -> Result<(), SessionError> {
        if self.state < SessionState::InfoOk {
            return Err(SessionError::violation(reason::INFO_FAILED));
        }
        let Some(upload) = self.upload.as_mut() else {
            return Err(SessionError::violation(reason::NO_TRANSFER));
        };
        if upload.append(chunk).await? {
            info!("received all {} bytes", upload.received());
            self.state = SessionState::DataOk;
            self.stream.send_bare(Tag::Ack).await?;
        }
        Ok(())
    }

    async fn verify(&mut self) -> Result<(), SessionError> {
        if self.state < SessionState::InfoOk {
            return Err(SessionError::violation(reason::INFO_FAILED));
        }
        let Some(upload) = self.upload.as_mut() else {
            return Err(SessionError::violation(reason::NO_TRANSFER));
        };
        upload.close().await?;
        verify_and_install(&self.settings, &self.workspace, upload, &mut self.log).await?;

        let base = upload.base().to_string();
        self.upload = None;
        info!("{base} verified");
        self.installed = Some(base);
        self.state = SessionState::Verified;
        Ok(self.stream.send_bare(Tag::Ack).await?)
    }

    async fn build(&mut self) -> Result<(), SessionError> {
        let (SessionState::Verified, Some(base)) = (self.state, self.installed.clone()) else {
            return Err(SessionError::violation(reason::NOT_VERIFIED));
        };
        self.state = SessionState::BuildAttempted;
        run_build(&mut self.stream, &self.settings, &base, &mut self.log).await
    }

    /// Drops the transfer in progress and its save directory
    async fn abandon_transfer(&mut self) {
        self.upload = None;
        self.workspace.clear().await;
        if matches!(self.state, SessionState::InfoOk | SessionState::DataOk) {
            self.state = SessionState::Authenticated;
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod test {
    use super::{Session, SessionState};
    use crate::{
        config::Configuration,
        protocol::{Message, MessageStream, Tag},
        role::Role,
        server::{reason, ServerSettings},
        token,
    };
    use pretty_assertions::assert_eq;
    use std::{net::SocketAddr, sync::Arc};
    use tokio::io::DuplexStream;
    use uuid::Uuid;

    const PEER: &str = "192.168.0.72:21911";

    struct Harness {
        session: Session<DuplexStream>,
        client: MessageStream<DuplexStream>,
        _root: tempfile::TempDir,
    }

    impl Harness {
        fn new() -> Self {
            let root = tempfile::tempdir().unwrap();
            let config = Configuration {
                staging_root: root.path().join("staging"),
                install_root: root.path().join("install"),
                ..Configuration::system_default().clone()
            };
            let settings = Arc::new(ServerSettings {
                role: Role::Mr,
                port: 12341,
                config,
            });
            let (a, b) = tokio::io::duplex(1 << 20);
            let peer: SocketAddr = PEER.parse().unwrap();
            Self {
                session: Session::new(a, peer, settings, Uuid::new_v4()),
                client: MessageStream::new(b, 1 << 20),
                _root: root,
            }
        }

        async fn request(&mut self, message: Message) -> Message {
            self.session.dispatch(message).await.unwrap();
            self.client.receive().await.unwrap().unwrap()
        }

        async fn authenticate(&mut self) {
            let reply = self
                .request(Message::text(Tag::Auth, token::encode("192.168.0.72", 21911)))
                .await;
            assert!(reply.is(Tag::Ack));
        }
    }

    #[tokio::test]
    async fn save_directory_is_named_after_the_session() {
        let h = Harness::new();
        let id = Uuid::new_v4();
        let (a, _b) = tokio::io::duplex(64);
        let session = Session::new(a, PEER.parse().unwrap(), Arc::clone(&h.session.settings), id);
        assert_eq!(
            session.workspace.path().file_name().unwrap().to_string_lossy(),
            format!("session_12341_{id}")
        );
    }

    #[tokio::test]
    async fn version_needs_no_auth() {
        let mut h = Harness::new();
        let reply = h.request(Message::bare(Tag::Vers)).await;
        assert_eq!(reply.tag(), Some(Tag::Vers));
        assert!(reply.body_text().starts_with("rupd/"));
        assert_eq!(h.session.state(), SessionState::New);
    }

    #[tokio::test]
    async fn gated_before_auth() {
        let mut h = Harness::new();
        for tag in [Tag::Info, Tag::Data, Tag::Dchk, Tag::Bash, Tag::Logs, Tag::Mlog] {
            let reply = h.request(Message::bare(tag)).await;
            assert!(reply.is(Tag::Fail), "{tag} was not refused");
            assert_eq!(reply.body_text(), reason::AUTH_REQUIRED);
        }
        assert!(!h.session.workspace.path().exists());
    }

    #[tokio::test]
    async fn unknown_tag_gets_bare_fail() {
        let mut h = Harness::new();
        let reply = h.request(Message::with_raw_tag(*b"HUH?", "")).await;
        assert!(reply.is(Tag::Fail));
        assert!(reply.body().is_empty());
    }

    #[tokio::test]
    async fn wrong_port_token() {
        let mut h = Harness::new();
        let reply = h
            .request(Message::text(Tag::Auth, token::encode("192.168.0.72", 21912)))
            .await;
        assert_eq!(reply.body_text(), reason::AUTH_FAILED);
        let reply = h.request(Message::text(Tag::Auth, "not base64!")).await;
        assert_eq!(reply.body_text(), reason::AUTH_FAILED);
        assert_eq!(h.session.state(), SessionState::New);
    }

    #[tokio::test]
    async fn failed_reauth_keeps_authentication() {
        let mut h = Harness::new();
        h.authenticate().await;
        let reply = h.request(Message::text(Tag::Auth, "garbage")).await;
        assert!(reply.is(Tag::Fail));
        assert_eq!(h.session.state(), SessionState::Authenticated);
        h.authenticate().await;
    }

    #[tokio::test]
    async fn upload_flow() {
        let mut h = Harness::new();
        h.authenticate().await;

        let reply = h
            .request(Message::text(Tag::Info, "demo.enc.tar.gz,100"))
            .await;
        assert!(reply.is(Tag::Ack));
        assert_eq!(h.session.state(), SessionState::InfoOk);

        for size in [40usize, 40] {
            h.session
                .dispatch(Message::new(Tag::Data, vec![9u8; size]))
                .await
                .unwrap();
        }
        assert_eq!(h.session.state(), SessionState::InfoOk);
        let reply = h.request(Message::new(Tag::Data, vec![9u8; 20])).await;
        assert!(reply.is(Tag::Ack));
        assert_eq!(h.session.state(), SessionState::DataOk);

        let stored = std::fs::read(h.session.workspace.join("demo.enc.tar.gz")).unwrap();
        assert_eq!(stored, vec![9u8; 100]);
    }

    #[tokio::test]
    async fn bad_info_changes_nothing() {
        let mut h = Harness::new();
        h.authenticate().await;
        for body in ["demo.zip,10", "demo.enc.tar.gz", "demo.enc.tar.gz,-4"] {
            let reply = h.request(Message::text(Tag::Info, body)).await;
            assert_eq!(reply.body_text(), reason::INFO_FAILED);
        }
        assert_eq!(h.session.state(), SessionState::Authenticated);
        let reply = h.request(Message::new(Tag::Data, vec![0u8; 4])).await;
        assert_eq!(reply.body_text(), reason::INFO_FAILED);
    }

    #[tokio::test]
    async fn short_upload_fails_check_and_is_abandoned() {
        let mut h = Harness::new();
        h.authenticate().await;
        let _ = h
            .request(Message::text(Tag::Info, "demo.enc.tar.gz,100"))
            .await;
        h.session
            .dispatch(Message::new(Tag::Data, vec![1u8; 40]))
            .await
            .unwrap();
        let reply = h.request(Message::bare(Tag::Dchk)).await;
        assert_eq!(reply.body_text(), reason::SIZE_MISMATCH);
        assert_eq!(h.session.state(), SessionState::Authenticated);
        assert!(!h.session.workspace.path().exists());
    }

    #[tokio::test]
    async fn overrun_is_a_size_mismatch() {
        let mut h = Harness::new();
        h.authenticate().await;
        let _ = h.request(Message::text(Tag::Info, "demo.enc.tar.gz,10")).await;
        let reply = h.request(Message::new(Tag::Data, vec![1u8; 11])).await;
        assert_eq!(reply.body_text(), reason::SIZE_MISMATCH);
        assert_eq!(h.session.state(), SessionState::Authenticated);
    }

    #[tokio::test]
    async fn build_requires_verification() {
        let mut h = Harness::new();
        h.authenticate().await;
        let reply = h.request(Message::bare(Tag::Bash)).await;
        assert_eq!(reply.body_text(), reason::NOT_VERIFIED);
    }

    #[tokio::test]
    async fn empty_session_log() {
        let mut h = Harness::new();
        h.authenticate().await;
        let reply = h.request(Message::bare(Tag::Logs)).await;
        assert!(reply.is(Tag::Ack));
        assert!(reply.body().is_empty());
    }

    #[tokio::test]
    async fn missing_log_category() {
        let mut h = Harness::new();
        h.authenticate().await;
        let reply = h.request(Message::text(Tag::Mlog, "../../etc")).await;
        assert_eq!(reply.body_text(), reason::DIRECTORY_NOT_FOUND);
    }

    #[tokio::test]
    async fn client_direction_tags_are_refused() {
        let mut h = Harness::new();
        h.authenticate().await;
        let reply = h.request(Message::bare(Tag::Mdat)).await;
        assert!(reply.is(Tag::Fail));
        assert_eq!(reply.body_text(), "Unexpected command MDAT.");
    }
}
