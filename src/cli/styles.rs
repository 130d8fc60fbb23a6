// (c) 2026 rupd contributors
//! Console styling for rupd's own output and for clap's help
//!
//! Print through anstream's `println!` / `eprintln!`, which drop the styling when the
//! output is not a terminal.

use anstyle::{AnsiColor, Color::Ansi, Style};
use clap::builder::styling::Styles;

/// Failure reports and fatal errors
pub const ERROR: Style = Style::new().bold().fg_color(Some(Ansi(AnsiColor::Red)));
/// A report in which every server succeeded
pub const SUCCESS: Style = Style::new().fg_color(Some(Ansi(AnsiColor::Green)));

const CAUTION: Style = Style::new().bold().fg_color(Some(Ansi(AnsiColor::Yellow)));
const DETAIL: Style = Style::new().fg_color(Some(Ansi(AnsiColor::Cyan)));
const HEADER: Style = Style::new()
    .underline()
    .fg_color(Some(Ansi(AnsiColor::Yellow)));

pub(crate) const CLAP_STYLES: Styles = Styles::styled()
    .usage(HEADER)
    .header(HEADER)
    .literal(Style::new().bold())
    .invalid(CAUTION)
    .error(ERROR)
    .valid(DETAIL.bold().underline())
    .placeholder(DETAIL);

/// Style for an overall outcome
#[must_use]
pub fn outcome(succeeded: bool) -> Style {
    if succeeded {
        SUCCESS
    } else {
        ERROR
    }
}

/// Resets styling to default.
pub use anstyle::Reset as RESET;
