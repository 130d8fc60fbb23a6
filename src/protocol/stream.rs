// (c) 2026 rupd contributors

//! Message-oriented wrapper around a byte stream

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt as _};
use tracing::trace;

use super::{receive_frame, send_frame, FramingError, Message, Tag};

/// A bidirectional byte stream carrying framed [`Message`]s.
///
/// Incoming messages larger than the configured limit are refused.
#[derive(Debug)]
pub struct MessageStream<S> {
    inner: S,
    limit: u32,
}

impl<S> MessageStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Constructor
    pub fn new(inner: S, limit: u32) -> Self {
        Self { inner, limit }
    }

    /// The size limit applied to incoming messages
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Sends a message
    pub async fn send(&mut self, message: &Message) -> Result<(), FramingError> {
        trace!("send {message}");
        send_frame(&mut self.inner, &message.to_payload()).await
    }

    /// Syntactic sugar: sends a message with a text body
    pub async fn send_text<T: AsRef<str>>(&mut self, tag: Tag, text: T) -> Result<(), FramingError> {
        self.send(&Message::text(tag, text)).await
    }

    /// Syntactic sugar: sends a message with an empty body
    pub async fn send_bare(&mut self, tag: Tag) -> Result<(), FramingError> {
        self.send(&Message::bare(tag)).await
    }

    /// Receives the next message.
    ///
    /// # Return
    /// `Ok(None)` if the peer closed the connection cleanly between messages.
    pub async fn receive(&mut self) -> Result<Option<Message>, FramingError> {
        let Some(payload) = receive_frame(&mut self.inner, self.limit).await? else {
            trace!("peer closed connection");
            return Ok(None);
        };
        let message = Message::from_payload(payload)?;
        trace!("recv {message}");
        Ok(Some(message))
    }

    /// Shuts down the write half of the underlying stream
    pub async fn shutdown(&mut self) -> std::io::Result<()> {
        self.inner.shutdown().await
    }

    /// Accessor
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Consumes the wrapper, returning the underlying stream
    pub fn into_inner(self) -> S {
        self.inner
    }
}
