//! rupd utility - main entrypoint
// (c) 2026 rupd contributors

use rupd::styles::{ERROR, RESET};

fn main() -> std::process::ExitCode {
    match rupd::cli() {
        Ok(code) => code,
        Err(e) => {
            if rupd::util::tracing_is_initialised() {
                tracing::error!("{e:#}");
            } else {
                anstream::eprintln!("{ERROR}Error:{RESET} {e:#}");
            }
            std::process::ExitCode::FAILURE
        }
    }
}
