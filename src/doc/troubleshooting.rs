// (c) 2026 rupd contributors

//! ## 🕵️ Troubleshooting
//!
//! The `--debug` option reports information that may help you diagnose issues.
//!
//! rupd also understands the `RUST_LOG` environment variable which might let you probe deeper.
//! Some possible settings for this variable are:
//!
//! * `rupd=trace` outputs every message sent and received, as `TAG (n bytes)`
//! * `trace` sets all the Rust components to trace mode, which is rarely useful
//!
//! ### The client cannot connect
//!
//! * Are the servers running? `rupd server` starts both roles; `--role mr` or `--role fs` starts one.
//! * Do the ports match? The MR and FS servers listen on `mr_port` and `fs_port`;
//!   the client connects to the same settings. Check both ends with `rupd show-config`.
//! * Connection attempts give up after `connect_timeout_ms`.
//!
//! ### Authentication fails
//!
//! The server checks that the token names the connection it arrived on.
//! Anything that rewrites addresses or ports between client and server (NAT, a proxy)
//! makes that impossible. Connect directly.
//!
//! ### "File decryption failed." or "File is not valid."
//!
//! * Is `decrypt_key` set on the server? Without it, every check fails.
//! * Is the decrypt script present in `script_dir`, and executable?
//! * The archive must unpack to a directory named after the archive, without its `.enc.tar.gz` suffix.
//!
//! The session log holds the script's output. `rupd update --save-logs` saves it next to each archive.
//!
//! ### "File is not compatible."
//!
//! The decrypt script's output must contain the version marker (`version_marker`) followed,
//! within `version_window` bytes, by the server's role prefix (`MR` or `FS`).
//! An MR archive sent to the FS server fails this way.
//!
//! ### Configuration debug
//! * `rupd config-files` tells you where rupd is looking for configuration files.
//! * `rupd show-config` shows the settings rupd would use and where it got them from.
//!   Command line options beat environment variables (`RUPD_<FIELD>`), which beat
//!   the `--config` file, which beats the user file, which beats the system file.
//!
//! ```text
//! $ rupd --mr-port 2000 show-config
//! ┌──────────────────────┬─────────────────────┬──────────────────────────────┐
//! │ field                │ value               │ source                       │
//! ├──────────────────────┼─────────────────────┼──────────────────────────────┤
//! │ bind_address         │ 0.0.0.0             │ default                      │
//! │ mr_port              │ 2000                │ command line                 │
//! │ fs_port              │ 12342               │ default                      │
//! │ decrypt_key          │ <set>               │ /etc/rupd.toml               │
//! ...
//! ```
