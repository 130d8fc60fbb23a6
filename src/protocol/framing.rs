// (c) 2026 rupd contributors

//! On-wire message framing
//!
//! A frame is a 4 byte big-endian length followed by that many bytes of payload.

use bytes::{BufMut as _, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt as _, AsyncWrite, AsyncWriteExt as _};

/// Size of the frame header on the wire. Any change would constitute a breaking protocol change.
pub const HEADER_LEN: usize = 4;

/// Things that can go wrong at the framing layer
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    /// The peer went away part-way through a frame
    #[error("connection closed part-way through a message")]
    Truncated,
    /// The declared payload size exceeds what we are prepared to accept
    #[error("message of {size} bytes exceeds the limit of {limit} bytes")]
    TooLarge {
        /// Declared size
        size: u64,
        /// Configured limit
        limit: u32,
    },
    /// The payload is too short to contain a command tag
    #[error("message payload of {0} bytes is too short to hold a command tag")]
    ShortPayload(usize),
    /// Underlying I/O failure
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FramingError {
    /// Can the connection carry on after this error?
    ///
    /// Only a short payload leaves the stream in sync; everything else is fatal to the connection.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FramingError::ShortPayload(_))
    }
}

/// Writes a single frame containing `payload`.
///
/// Header and payload are assembled into a single buffer and flushed together.
pub async fn send_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), FramingError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let size = u32::try_from(payload.len()).map_err(|_| FramingError::TooLarge {
        size: payload.len() as u64,
        limit: u32::MAX,
    })?;
    let mut frame = BytesMut::with_capacity(HEADER_LEN + payload.len());
    frame.put_u32(size);
    frame.put_slice(payload);
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads a single frame, refusing payloads declared larger than `limit`.
///
/// # Return
/// * `Ok(Some(payload))` on success
/// * `Ok(None)` if the peer closed the connection cleanly, before sending any part of a new frame
pub async fn receive_frame<R>(reader: &mut R, limit: u32) -> Result<Option<Bytes>, FramingError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut header = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        let n = reader.read(&mut header[filled..]).await?;
        if n == 0 {
            return if filled == 0 {
                Ok(None)
            } else {
                Err(FramingError::Truncated)
            };
        }
        filled += n;
    }

    let size = u32::from_be_bytes(header);
    let too_large = FramingError::TooLarge {
        size: u64::from(size),
        limit,
    };
    if size > limit {
        return Err(too_large);
    }
    let len = usize::try_from(size).map_err(|_| too_large)?;

    let mut payload = BytesMut::zeroed(len);
    match reader.read_exact(&mut payload).await {
        Ok(_) => Ok(Some(payload.freeze())),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(FramingError::Truncated),
        Err(e) => Err(e.into()),
    }
}
