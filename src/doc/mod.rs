//! Additional documentation
// (c) 2026 rupd contributors

pub mod troubleshooting;
