//! Update server
// (c) 2026 rupd contributors
//!
//! One server instance listens per [role](Role). Each accepted connection is handled by its
//! own [session](Session) task; sessions share nothing but the immutable [`ServerSettings`].

mod build;
mod error;
mod mlog;
mod session;
mod upload;
mod verify;
mod workspace;

pub use error::reason;
pub(crate) use session::Session;
pub use session::SessionState;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context as _;
use tokio::{net::TcpListener, task::JoinSet};
use tracing::{error, info, info_span, warn, Instrument as _};
use uuid::Uuid;

use crate::{config::Configuration, role::Role};

/// Pause after a failed `accept`, so a persistent failure (e.g. out of file descriptors)
/// doesn't spin
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Settings shared by every session of one server
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Which subsystem this server updates
    pub role: Role,
    /// The port the server is actually listening on
    pub port: u16,
    /// Run-time configuration
    pub config: Configuration,
}

/// A bound, not yet running, update server
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    settings: Arc<ServerSettings>,
}

impl Server {
    /// Binds the listening socket for a role.
    ///
    /// If the configured port for the role is 0, an ephemeral port is chosen.
    pub async fn bind(role: Role, config: Configuration) -> anyhow::Result<Self> {
        config.validate()?;
        let wanted = role.port(&config);
        let listener = TcpListener::bind((config.bind_address.as_str(), wanted))
            .await
            .with_context(|| format!("binding {}:{wanted}", config.bind_address))?;
        let port = listener.local_addr()?.port();
        Ok(Self {
            listener,
            settings: Arc::new(ServerSettings { role, port, config }),
        })
    }

    /// The address we are listening on
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accessor
    #[must_use]
    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    /// Accepts connections forever, serving each in its own task.
    pub async fn run(self) -> anyhow::Result<()> {
        info!(
            "{} update server listening on {}",
            self.settings.role,
            self.local_addr()?
        );
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let settings = Arc::clone(&self.settings);
                    let id = Uuid::new_v4();
                    let span = info_span!("session", role = %settings.role, %peer, %id);
                    let _j = tokio::spawn(
                        async move {
                            info!("connected");
                            if let Err(e) = Session::new(stream, peer, settings, id).run().await {
                                error!("session failed: {e}");
                            }
                            info!("disconnected");
                        }
                        .instrument(span),
                    );
                }
                Err(e) => {
                    warn!("error accepting connection: {e}");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }
}

/// Runs servers for the given roles until interrupted
pub async fn server_main(config: Configuration, roles: &[Role]) -> anyhow::Result<()> {
    anyhow::ensure!(!roles.is_empty(), "no server roles selected");
    let mut tasks = JoinSet::new();
    for &role in roles {
        let server = Server::bind(role, config.clone()).await?;
        let _ = tasks.spawn(server.run());
    }

    tokio::select! {
        Some(result) = tasks.join_next() => {
            // Servers only return on error.
            result.context("server task panicked")??;
            Ok(())
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("waiting for interrupt")?;
            info!("interrupted, shutting down");
            tasks.abort_all();
            Ok(())
        }
    }
}
