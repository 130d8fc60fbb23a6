//! Session error handling
// (c) 2026 rupd contributors

use crate::{
    exec::ExecError,
    protocol::{FramingError, Message, Tag},
};

/// Reasons sent to the client in `FAIL` replies
pub mod reason {
    /// The token did not match the connection
    pub const AUTH_FAILED: &str = "Authentication failed.";
    /// A command other than `VERS`/`AUTH` arrived before authentication
    pub const AUTH_REQUIRED: &str = "Authentication required.";
    /// `INFO` was malformed, or a transfer command arrived without a valid `INFO`
    pub const INFO_FAILED: &str = "Info verification failed.";
    /// The upload is not the size it was declared to be
    pub const SIZE_MISMATCH: &str = "File size mismatch.";
    /// The decrypt step did not produce the expected directory
    pub const DECRYPT_FAILED: &str = "File decryption failed.";
    /// No version marker in the decrypt output
    pub const NOT_VALID: &str = "File is not valid.";
    /// The version marker is not followed by this server's role prefix
    pub const NOT_COMPATIBLE: &str = "File is not compatible.";
    /// `BASH` arrived before a successful `DCHK`
    pub const NOT_VERIFIED: &str = "File is not verified.";
    /// Transfer data arrived when no transfer was in progress
    pub const NO_TRANSFER: &str = "No transfer in progress.";
    /// `MLOG` named a category that doesn't exist
    pub const DIRECTORY_NOT_FOUND: &str = "Directory not found.";
    /// The build reported failed packages
    pub const BUILD_FAILED: &str = "Build failed.";
    /// The build ran without reported failures
    pub const BUILD_COMPLETED: &str = "Build completed.";
    /// No decryption key has been configured on the server
    pub const NO_KEY: &str = "Decryption key is not configured.";
    /// The verified tree or its update driver could not be put in place
    pub const INSTALL_FAILED: &str = "File installation failed.";
}

/// Everything that can go wrong handling a single request
#[derive(Debug, thiserror::Error)]
pub(crate) enum SessionError {
    /// The tag was not one we know
    #[error("unknown command")]
    UnknownCommand,
    /// The request is not acceptable in the current state
    #[error("{0}")]
    Violation(String),
    /// The upload failed a check; the transfer is abandoned
    #[error("{0}")]
    Verification(String),
    /// The build ran but reported failures
    #[error("{0}")]
    Build(String),
    /// Something went wrong on our side
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    /// The connection itself failed; the session ends
    #[error(transparent)]
    Transport(#[from] FramingError),
}

impl SessionError {
    pub(crate) fn violation<S: Into<String>>(why: S) -> Self {
        Self::Violation(why.into())
    }

    pub(crate) fn verification<S: Into<String>>(why: S) -> Self {
        Self::Verification(why.into())
    }

    /// Adapter for `map_err`
    pub(crate) fn io<S: Into<String>>(context: S) -> impl FnOnce(std::io::Error) -> Self {
        let context = context.into();
        move |source| Self::Io { context, source }
    }

    /// Does this failure abandon the transfer in progress?
    pub(crate) fn abandons_transfer(&self) -> bool {
        matches!(self, Self::Verification(_))
    }

    /// The reply to send the client, if the session survives
    pub(crate) fn to_reply(&self) -> Message {
        match self {
            Self::UnknownCommand => Message::bare(Tag::Fail),
            other => Message::text(Tag::Fail, other.to_string()),
        }
    }
}

impl From<ExecError> for SessionError {
    fn from(e: ExecError) -> Self {
        match e {
            ExecError::Transport(t) => Self::Transport(t),
            ExecError::Spawn { program, source } => Self::Io {
                context: format!("running {program}"),
                source,
            },
        }
    }
}
