// (c) 2026 rupd contributors

//! Command tags

use strum::IntoEnumIterator as _;

/// Width of a command tag on the wire
pub const TAG_LEN: usize = 4;

/// The command tags understood by this protocol.
///
/// On the wire each tag occupies exactly [`TAG_LEN`] bytes of ASCII.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::EnumIter, strum::EnumString,
)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Tag {
    /// Version exchange
    Vers,
    /// Positive reply; may carry text
    Ack,
    /// Negative reply; carries a reason
    Fail,
    /// Connection token
    Auth,
    /// Upload metadata (`name,size`)
    Info,
    /// A chunk of the upload
    Data,
    /// Request verification and installation of the upload
    Dchk,
    /// Request the workspace build
    Bash,
    /// Progress text
    Step,
    /// Request the session log
    Logs,
    /// Request the files of a log category
    Mlog,
    /// Log file metadata (`name,size`)
    Minf,
    /// A chunk of a log file
    Mdat,
}

impl Tag {
    /// The exact bytes of this tag on the wire
    #[must_use]
    pub const fn wire(self) -> [u8; TAG_LEN] {
        match self {
            Tag::Vers => *b"VERS",
            Tag::Ack => *b"ACK ",
            Tag::Fail => *b"FAIL",
            Tag::Auth => *b"AUTH",
            Tag::Info => *b"INFO",
            Tag::Data => *b"DATA",
            Tag::Dchk => *b"DCHK",
            Tag::Bash => *b"BASH",
            Tag::Step => *b"STEP",
            Tag::Logs => *b"LOGS",
            Tag::Mlog => *b"MLOG",
            Tag::Minf => *b"MINF",
            Tag::Mdat => *b"MDAT",
        }
    }

    /// Looks up a tag by its wire representation.
    ///
    /// The match is exact: `ACK` without its trailing space is not a tag.
    #[must_use]
    pub fn from_wire(raw: [u8; TAG_LEN]) -> Option<Self> {
        Self::iter().find(|t| t.wire() == raw)
    }
}
