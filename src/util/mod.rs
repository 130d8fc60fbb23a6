//! General utility code that didn't fit anywhere else
// (c) 2026 rupd contributors

pub(crate) mod fs;

mod tracing;
pub use tracing::{is_initialized as tracing_is_initialised, TimeFormat};
pub(crate) use tracing::{setup as setup_tracing, trace_level, ConsoleTraceType};
