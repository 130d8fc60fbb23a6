// (c) 2026 rupd contributors

//! # 📖 The update protocol
//!
//! Client and server exchange length-prefixed messages over a single TCP connection.
//!
//! ## Framing
//!
//! Each message on the wire is:
//!
//! * a 4 byte unsigned length, big-endian, followed by
//! * that many bytes of payload.
//!
//! The payload itself is a 4 byte ASCII [command tag](Tag), padded with spaces where the
//! mnemonic is shorter (`ACK `), followed by an optional body whose meaning depends on the tag.
//!
//! A receiver rejects any message whose declared length exceeds its configured limit,
//! without attempting to read the payload.
//!
//! ## Conversation
//!
//! The client always speaks first; the server answers each request with exactly one reply
//! (`ACK ` or `FAIL`), except where noted.
//!
//! | Request | Body | Reply |
//! |---------|------|-------|
//! | `VERS` | none | `VERS` carrying the server's version string |
//! | `AUTH` | [connection token](crate::token) | `ACK ` / `FAIL` |
//! | `INFO` | `name,size` | `ACK ` / `FAIL` |
//! | `DATA` | up to [`MAX_CHUNK_SIZE`] bytes of the archive | `ACK ` once the declared size is reached, otherwise nothing |
//! | `DCHK` | none | `ACK ` / `FAIL` once the archive has been decrypted and installed |
//! | `BASH` | none | any number of `STEP` progress messages, then `ACK ` / `FAIL` |
//! | `LOGS` | none | `ACK ` carrying the session log |
//! | `MLOG` | log category | for each log file: `MINF`, `MDAT`..., `STEP`; then `ACK ` |
//!
//! Every request other than `VERS` and `AUTH` is refused with `FAIL` until the connection
//! has authenticated.

mod framing;
mod message;
mod stream;
mod tag;

pub use framing::{receive_frame, send_frame, FramingError, HEADER_LEN};
pub use message::{FileInfo, FileInfoError, Message};
pub use stream::MessageStream;
pub use tag::{Tag, TAG_LEN};

/// Largest body we put into a single `DATA` or `MDAT` message
pub const MAX_CHUNK_SIZE: usize = 64 * 1024 - 8;

/// Default upper bound on the size of an incoming message payload
pub const DEFAULT_MESSAGE_LIMIT: u32 = 64 * 1024 * 1024;

/// Version string announced in reply to `VERS`
pub const PROTOCOL_VERSION: &str = concat!("rupd/", env!("CARGO_PKG_VERSION"), " protocol 1");
