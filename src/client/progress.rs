//! Progress bar styling
// (c) 2026 rupd contributors

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Maximum update frequency we will use for the progress display
pub(crate) const MAX_UPDATE_FPS: u8 = 20;

/// A single-line style format for Indicatif.
///
/// ```text
/// [MR] demo.enc.tar.gz [====================      ] 2m30s @ 123.4MB/s [1.24GB]
/// ```
const PROGRESS_STYLE: &str =
    "{prefix} {msg:.dim} {wide_bar:.cyan} {eta} @ {decimal_bytes_per_sec} [{decimal_total_bytes:.dim}]";

/// Creates an upload progress bar, attached to the display if there is one
pub(crate) fn upload_bar(
    display: Option<&MultiProgress>,
    prefix: &str,
    name: &str,
    size: u64,
) -> ProgressBar {
    let Some(display) = display else {
        return ProgressBar::hidden();
    };
    let style = ProgressStyle::with_template(PROGRESS_STYLE)
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    display.add(
        ProgressBar::new(size)
            .with_style(style)
            .with_prefix(prefix.trim_end().to_string())
            .with_message(name.to_string()),
    )
}
