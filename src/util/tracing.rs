//! Tracing subscriber setup
// (c) 2026 rupd contributors

use std::{
    fmt,
    fs::File,
    io::Write,
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use anyhow::Context as _;
use indicatif::MultiProgress;
use serde::{de, Deserialize, Serialize};
use strum::VariantNames as _;
use tracing_subscriber::{
    fmt::{format::Writer, time::FormatTime, MakeWriter},
    prelude::*,
    EnvFilter, Layer, Registry,
};

static TRACING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Overrides the console filter (standard `tracing_subscriber` syntax)
const CONSOLE_FILTER_VAR: &str = "RUST_LOG";
/// Overrides the log file filter; if unset, the file gets what the console gets
const FILE_FILTER_VAR: &str = "RUST_LOG_FILE_DETAIL";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Computes the trace level from the verbosity flags
pub(crate) fn trace_level(debug: bool, quiet: bool) -> &'static str {
    match (debug, quiet) {
        (true, _) => "debug",
        (false, true) => "error",
        (false, false) => "info",
    }
}

/// Selects the format of time stamps in output messages
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    Eq,
    PartialEq,
    strum::Display,
    strum::EnumString,
    strum::VariantNames,
    clap::ValueEnum,
    Serialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum TimeFormat {
    /// Local time, as `2026-03-09 14:05:07L`
    #[default]
    Local,
    /// UTC, as `2026-03-09 13:05:07Z`
    Utc,
    /// Local time in [RFC 3339](https://datatracker.ietf.org/doc/html/rfc3339) form, as `2026-03-09T14:05:07.123+01:00`
    Rfc3339,
}

impl<'de> Deserialize<'de> for TimeFormat {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        text.parse()
            .map_err(|_| de::Error::unknown_variant(&text, TimeFormat::VARIANTS))
    }
}

impl FormatTime for TimeFormat {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        match self {
            TimeFormat::Local => write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%SL")),
            TimeFormat::Utc => write!(w, "{}", chrono::Utc::now().format("%Y-%m-%d %H:%M:%SZ")),
            TimeFormat::Rfc3339 => write!(
                w,
                "{}",
                chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, false)
            ),
        }
    }
}

/// Where console trace output goes
#[derive(Debug)]
pub(crate) enum ConsoleTraceType {
    /// Straight to stderr
    Standard,
    /// Above the progress bars of this display
    Indicatif(MultiProgress),
    /// Nowhere
    #[cfg_attr(not(test), allow(dead_code))]
    None,
}

/// A console filter, and whether it came from the environment
struct Filter {
    filter: EnvFilter,
    from_env: bool,
}

impl Filter {
    /// Reads `var`; if it is unset, logs rupd's own events at `level`
    fn from_env_or(var: &str, level: &str) -> anyhow::Result<Self> {
        match std::env::var(var) {
            Ok(directives) => Ok(Self {
                filter: EnvFilter::try_new(&directives)
                    .with_context(|| format!("{var} (set in environment) was not understood"))?,
                from_env: true,
            }),
            Err(_) => Ok(Self {
                filter: EnvFilter::try_new(format!("rupd={level}"))?,
                from_env: false,
            }),
        }
    }

    /// Event targets are only worth showing when other crates might be logging too
    fn layer<W>(self, writer: W, time_format: TimeFormat, ansi: bool) -> BoxedLayer
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_target(self.from_env)
            .with_ansi(ansi)
            .with_timer(time_format)
            .with_writer(writer)
            .with_filter(self.filter)
            .boxed()
    }
}

/// Sets up tracing to the console and, optionally, to a file.
///
/// The file never gets ANSI colour. Only the first call in a process has any effect.
///
/// **CAUTION:** If this fails, tracing is not set up; the caller must report the error itself.
pub(crate) fn setup(
    trace_level: &str,
    console: ConsoleTraceType,
    log_file: Option<&Path>,
    time_format: TimeFormat,
    ansi: bool,
) -> anyhow::Result<()> {
    if TRACING_INITIALIZED.swap(true, Ordering::Relaxed) {
        tracing::warn!("tracing setup requested a second time (ignoring)");
        return Ok(());
    }
    let layers = match setup_inner(trace_level, console, log_file, time_format, ansi) {
        Ok(l) => l,
        Err(e) => {
            TRACING_INITIALIZED.store(false, Ordering::Relaxed);
            return Err(e);
        }
    };
    tracing_subscriber::registry().with(layers).init();
    Ok(())
}

pub(crate) fn setup_inner(
    trace_level: &str,
    console: ConsoleTraceType,
    log_file: Option<&Path>,
    time_format: TimeFormat,
    ansi: bool,
) -> anyhow::Result<Vec<BoxedLayer>> {
    let mut layers = Vec::new();

    let console_filter = Filter::from_env_or(CONSOLE_FILTER_VAR, trace_level)?;
    match console {
        ConsoleTraceType::Standard => {
            layers.push(console_filter.layer(std::io::stderr, time_format, ansi));
        }
        ConsoleTraceType::Indicatif(display) => {
            layers.push(console_filter.layer(BarSafeWriter(display), time_format, ansi));
        }
        ConsoleTraceType::None => (),
    }

    if let Some(path) = log_file {
        let file = File::create(path)
            .with_context(|| format!("could not open log file {}", path.display()))?;
        let filter = if std::env::var(FILE_FILTER_VAR).is_ok() {
            Filter::from_env_or(FILE_FILTER_VAR, trace_level)?
        } else {
            Filter::from_env_or(CONSOLE_FILTER_VAR, trace_level)?
        };
        layers.push(filter.layer(Arc::new(file), time_format, false));
    }
    Ok(layers)
}

/// Returns whether tracing has been initialized
pub fn is_initialized() -> bool {
    TRACING_INITIALIZED.load(Ordering::Relaxed)
}

/// Prints events above a progress display instead of through it
#[derive(Clone)]
struct BarSafeWriter(MultiProgress);

impl<'w> MakeWriter<'w> for BarSafeWriter {
    type Writer = EventLine;

    fn make_writer(&'w self) -> Self::Writer {
        EventLine {
            display: self.0.clone(),
            text: Vec::new(),
        }
    }
}

/// One formatted event, printed when the formatter drops it
struct EventLine {
    display: MultiProgress,
    text: Vec<u8>,
}

impl Write for EventLine {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.text.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Drop for EventLine {
    fn drop(&mut self) {
        let text = String::from_utf8_lossy(&self.text);
        let line = text.trim_end_matches('\n');
        if line.is_empty() {
            return;
        }
        if self.display.is_hidden() || self.display.println(line).is_err() {
            eprintln!("{line}");
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod test {
    use indicatif::{MultiProgress, ProgressDrawTarget};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use tracing_subscriber::fmt::{format::Writer, time::FormatTime as _, MakeWriter as _};

    use super::{setup_inner, trace_level, BarSafeWriter, ConsoleTraceType, TimeFormat};

    #[rstest]
    #[case(true, true, "debug")]
    #[case(true, false, "debug")]
    #[case(false, true, "error")]
    #[case(false, false, "info")]
    fn levels(#[case] debug: bool, #[case] quiet: bool, #[case] expected: &str) {
        assert_eq!(trace_level(debug, quiet), expected);
    }

    #[rstest]
    #[case("RFC3339", TimeFormat::Rfc3339)]
    #[case("utc", TimeFormat::Utc)]
    #[case("Local", TimeFormat::Local)]
    fn time_format_from_config_text(#[case] text: &str, #[case] expected: TimeFormat) {
        #[derive(serde::Deserialize)]
        struct Holder {
            tf: TimeFormat,
        }
        let h: Holder = figment::Figment::from(figment::providers::Serialized::defaults(
            std::collections::BTreeMap::from([("tf", text)]),
        ))
        .extract()
        .unwrap();
        assert_eq!(h.tf, expected);
    }

    #[test]
    fn timestamps() {
        for (tf, suffix) in [(TimeFormat::Local, "L"), (TimeFormat::Utc, "Z")] {
            let mut out = String::new();
            tf.format_time(&mut Writer::new(&mut out)).unwrap();
            assert_eq!(out.len(), "2026-03-09 14:05:07L".len());
            assert!(out.ends_with(suffix));
        }
        let mut out = String::new();
        TimeFormat::Rfc3339
            .format_time(&mut Writer::new(&mut out))
            .unwrap();
        assert!(out.contains('T'));
    }

    #[test]
    fn console_only() {
        let mp = MultiProgress::with_draw_target(ProgressDrawTarget::hidden());
        let layers = setup_inner("info", ConsoleTraceType::Indicatif(mp), None, TimeFormat::Local, false)
            .unwrap();
        assert_eq!(layers.len(), 1);
    }

    #[test]
    fn console_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let layers = setup_inner(
            "debug",
            ConsoleTraceType::Standard,
            Some(&dir.path().join("rupd.log")),
            TimeFormat::Utc,
            false,
        )
        .unwrap();
        assert_eq!(layers.len(), 2);
    }

    #[test]
    fn bad_level() {
        assert!(setup_inner("not a level!", ConsoleTraceType::None, None, TimeFormat::Utc, false).is_err());
    }

    #[test]
    fn unwritable_log_file() {
        let result = setup_inner(
            "info",
            ConsoleTraceType::None,
            Some(std::path::Path::new("/nonexistent/dir/rupd.log")),
            TimeFormat::Utc,
            false,
        );
        assert!(result.is_err());
    }

    #[test]
    fn bar_safe_writer_accepts_events() {
        use std::io::Write as _;
        let writer = BarSafeWriter(MultiProgress::with_draw_target(ProgressDrawTarget::hidden()));
        let mut line = writer.make_writer();
        let msg = b"2026-03-09 14:05:07L  INFO connected\n";
        assert_eq!(line.write(msg).unwrap(), msg.len());
        line.flush().unwrap();
    }
}
