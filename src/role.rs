// (c) 2026 rupd contributors

//! Server roles
//!
//! Each robot runs two update services, one per subsystem. They speak the same protocol
//! and differ only in their port, the version prefix they accept and the driver script
//! they run.

use serde::{Deserialize, Serialize};

use crate::config::Configuration;

/// The subsystem a server instance updates
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    clap::ValueEnum,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Main robot subsystem
    Mr,
    /// Secondary (field) subsystem
    Fs,
}

impl Role {
    /// The prefix that must follow the version marker in a compatible archive
    #[must_use]
    pub const fn version_prefix(self) -> &'static str {
        match self {
            Role::Mr => "MR",
            Role::Fs => "FS",
        }
    }

    /// File name of the update driver script for this role
    #[must_use]
    pub const fn update_script(self) -> &'static str {
        match self {
            Role::Mr => "mr_update.sh",
            Role::Fs => "fs_update.sh",
        }
    }

    /// Listening port for this role
    #[must_use]
    pub fn port(self, config: &Configuration) -> u16 {
        match self {
            Role::Mr => config.mr_port,
            Role::Fs => config.fs_port,
        }
    }

    /// The role served on a given port: the MR port means MR, anything else FS
    #[must_use]
    pub fn for_port(port: u16, config: &Configuration) -> Self {
        if port == config.mr_port {
            Role::Mr
        } else {
            Role::Fs
        }
    }

    /// Sets the listening port for this role
    pub fn set_port(self, config: &mut Configuration, port: u16) {
        match self {
            Role::Mr => config.mr_port = port,
            Role::Fs => config.fs_port = port,
        }
    }

    /// Prefix for human-readable messages about this role, e.g. `[MR] `
    #[must_use]
    pub fn label(self) -> String {
        format!("[{self}] ")
    }
}
