//! Update client
// (c) 2026 rupd contributors
//!
//! A [`Channel`] drives one connection to one server. An [`Orchestrator`] runs the same
//! operation on several channels concurrently and reports the outcome for each.

mod channel;
pub use channel::{Channel, SelectedFile};

mod logs;
pub use logs::LogSummary;

mod orchestrator;
pub use orchestrator::{ChannelOutcome, Orchestrator, Report};

mod progress;
pub(crate) use progress::MAX_UPDATE_FPS;

mod sink;
pub use sink::{DebugSink, TracingSink};
pub(crate) use sink::Reporter;
