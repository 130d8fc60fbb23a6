// (c) 2026 rupd contributors

//! Protocol messages

use std::{borrow::Cow, fmt::Display, num::ParseIntError, str::FromStr};

use bytes::{BufMut as _, Bytes, BytesMut};

use super::{FramingError, Tag, TAG_LEN};

/// A single protocol message: a command tag followed by an opaque body.
///
/// The raw tag is retained so that messages with tags we don't recognise can still be
/// received, logged and refused.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    raw_tag: [u8; TAG_LEN],
    body: Bytes,
}

impl Message {
    /// Constructor
    #[must_use]
    pub fn new<B: Into<Bytes>>(tag: Tag, body: B) -> Self {
        Self {
            raw_tag: tag.wire(),
            body: body.into(),
        }
    }

    /// Constructs a message with an empty body
    #[must_use]
    pub fn bare(tag: Tag) -> Self {
        Self::new(tag, Bytes::new())
    }

    /// Constructs a message with a text body
    #[must_use]
    pub fn text<S: AsRef<str>>(tag: Tag, text: S) -> Self {
        Self::new(tag, Bytes::copy_from_slice(text.as_ref().as_bytes()))
    }

    /// Constructs a message with an arbitrary four-byte tag (which need not be one we know)
    #[must_use]
    pub fn with_raw_tag<B: Into<Bytes>>(raw_tag: [u8; TAG_LEN], body: B) -> Self {
        Self {
            raw_tag,
            body: body.into(),
        }
    }

    /// Splits a received frame payload into tag and body
    pub fn from_payload(mut payload: Bytes) -> Result<Self, FramingError> {
        if payload.len() < TAG_LEN {
            return Err(FramingError::ShortPayload(payload.len()));
        }
        let head = payload.split_to(TAG_LEN);
        let mut raw_tag = [0u8; TAG_LEN];
        raw_tag.copy_from_slice(&head);
        Ok(Self {
            raw_tag,
            body: payload,
        })
    }

    /// Encodes this message as a frame payload (tag, then body)
    #[must_use]
    pub fn to_payload(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(TAG_LEN + self.body.len());
        buf.put_slice(&self.raw_tag);
        buf.put_slice(&self.body);
        buf.freeze()
    }

    /// The tag, if it is one we know
    #[must_use]
    pub fn tag(&self) -> Option<Tag> {
        Tag::from_wire(self.raw_tag)
    }

    /// Does this message carry the given tag?
    #[must_use]
    pub fn is(&self, tag: Tag) -> bool {
        self.raw_tag == tag.wire()
    }

    /// The tag exactly as received
    #[must_use]
    pub fn raw_tag(&self) -> [u8; TAG_LEN] {
        self.raw_tag
    }

    /// Printable form of the tag, whether or not we know it
    #[must_use]
    pub fn tag_text(&self) -> String {
        String::from_utf8_lossy(&self.raw_tag).trim_end().to_string()
    }

    /// Message body
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Message body interpreted as text. Invalid UTF-8 sequences are replaced.
    #[must_use]
    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Consumes the message, returning its body
    #[must_use]
    pub fn into_body(self) -> Bytes {
        self.body
    }
}

impl Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({} bytes)", self.tag_text(), self.body.len())
    }
}

/////////////////////////////////////////////////////////////////////////////////////////////
// FILE METADATA

/// File metadata, as carried by `INFO` and `MINF` (`name,size`)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileInfo {
    /// Bare file name (no directory part)
    pub name: String,
    /// File size in bytes
    pub size: u64,
}

/// Reasons a `name,size` body could not be understood
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FileInfoError {
    /// There was no comma
    #[error("file information has no separator")]
    MissingSeparator,
    /// The name part was empty
    #[error("file information has an empty name")]
    EmptyName,
    /// The size part was not a non-negative integer
    #[error("file size is not valid: {0}")]
    BadSize(#[from] ParseIntError),
}

impl FileInfo {
    /// Constructor
    #[must_use]
    pub fn new<S: Into<String>>(name: S, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }
}

impl FromStr for FileInfo {
    type Err = FileInfoError;

    /// The size follows the last comma; the name may itself contain commas.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, size) = s.rsplit_once(',').ok_or(FileInfoError::MissingSeparator)?;
        if name.is_empty() {
            return Err(FileInfoError::EmptyName);
        }
        Ok(Self {
            name: name.to_string(),
            size: size.trim().parse()?,
        })
    }
}

impl Display for FileInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.name, self.size)
    }
}
