//! Human-readable progress reporting
// (c) 2026 rupd contributors

use std::sync::Arc;

use tracing::info;

/// Destination for a channel's human-readable progress messages.
///
/// Any `Fn(&str)` closure is a sink, which is convenient for capturing output in tests
/// or forwarding it to a user interface.
pub trait DebugSink: Send + Sync {
    /// Receives one message
    fn line(&self, text: &str);
}

impl<F> DebugSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn line(&self, text: &str) {
        self(text);
    }
}

/// The default sink: messages become `info` level tracing events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DebugSink for TracingSink {
    fn line(&self, text: &str) {
        info!("{text}");
    }
}

/// Prefixes messages with the channel label before handing them to the sink
#[derive(Clone)]
pub(crate) struct Reporter {
    prefix: String,
    sink: Arc<dyn DebugSink>,
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl Reporter {
    pub(crate) fn new<S: Into<String>>(prefix: S) -> Self {
        Self {
            prefix: prefix.into(),
            sink: Arc::new(TracingSink),
        }
    }

    pub(crate) fn set_sink(&mut self, sink: Arc<dyn DebugSink>) {
        self.sink = sink;
    }

    pub(crate) fn say<T: AsRef<str>>(&self, text: T) {
        self.sink.line(&format!("{}{}", self.prefix, text.as_ref()));
    }
}
