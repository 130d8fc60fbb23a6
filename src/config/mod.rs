// (c) 2026 rupd contributors
//! # 📖 Configuration management
//!
//! rupd obtains run-time configuration from the following sources, in order of increasing priority:
//! 1. Hard-wired defaults
//! 2. The system-wide configuration file, `/etc/rupd.toml`
//! 3. The user's configuration file, e.g. `~/.config/rupd/rupd.toml` on Linux
//! 4. A file given with `--config`
//! 5. Environment variables prefixed `RUPD_`, e.g. `RUPD_DECRYPT_KEY`
//! 6. Command-line options
//!
//! Run `rupd config-files` for a list of which files we read.
//!
//! ## File format
//!
//! Configuration files are TOML. Keys are the field names of [Configuration]:
//!
//! ```toml
//! install_root = "/home/robot/robot_ws"
//! decrypt_key = "hunter2"
//! progress_interval_ms = 2000
//! ```
//!
//! * `rupd show-config` outputs the list of supported fields, their current values, and where each value came from.
//! * For an explanation of each field, refer to [Configuration].

mod manager;
pub use manager::Manager;

mod prettyprint;
pub use prettyprint::DisplayAdapter;

mod source;
pub(crate) use source::CommandLineSource;

mod structure;
pub use structure::Configuration;
pub use structure::MIN_MESSAGE_LIMIT;
