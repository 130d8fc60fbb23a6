//! Command Line Interface for rupd
// (c) 2026 rupd contributors
mod args;
mod cli_main;
pub mod styles;
pub use cli_main::cli;
