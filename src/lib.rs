// (c) 2026 rupd contributors

//! `rupd` updates the software on a robot over the network.
//!
//! Each robot runs two update servers, one per subsystem ([`Role::Mr`] and [`Role::Fs`]).
//! A client uploads an encrypted archive to each, asks the server to decrypt and install it,
//! then asks it to build the workspace, relaying progress as it goes.
//! The same servers also hand out the robot's log files on request.
//!
//! ## 📖 Documentation
//!
//! * [The protocol](protocol)
//! * [Configuration](config)
//! * [Troubleshooting](doc::troubleshooting)
//!
//! ## 🧰 Getting Started
//!
//! On the robot:
//! ```text
//! rupd server
//! ```
//! The servers need a decrypt key (`decrypt_key`), the decrypt script, and the per-role
//! update driver scripts; see [`Configuration`].
//!
//! On the workstation:
//! ```text
//! rupd update --host robot.local --mr mr_1.2.enc.tar.gz --fs fs_1.2.enc.tar.gz --save-logs
//! rupd logs --host robot.local --category navigation --dir ./robot-logs
//! ```
//!
//! The exit status is zero only if every server succeeded.
//!
//! ## Security
//!
//! The authentication token is an obfuscation of the connection's own address, not a secret.
//! It keeps stray connections out; it does not keep out anyone who can read the protocol.
//! Archives are encrypted at rest and in transit by the external tooling that produces them.
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

mod cli;
pub use cli::{cli, styles};

pub mod client;
pub use client::{Channel, Orchestrator};

pub mod config;
pub use config::Configuration;

pub mod doc;
pub(crate) mod exec;
pub mod protocol;

pub mod role;
pub use role::Role;

pub mod server;
pub use server::{server_main, Server};

pub mod token;
pub mod util;
