//! Structured JSON logging via **tracing**.
//!
//! Performance characteristics:
//! - Events below the `RUST_LOG` filter cost a level check and nothing else
//! - Safe to emit from Rayon workers during batch analysis
//!
//! Logs go to stderr so stdout stays reserved for reports.

use tracing::{error, info, warn};

/// Installs the global JSON subscriber. Call once, at startup.
///
/// # Environment Variables
/// - `RUST_LOG`: filter directives (e.g., `RUST_LOG=tracelens_core=debug`)
pub fn init_structured_logging() {
    // try_init: a second call (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .json()
        .with_ansi(false)
        .with_level(true)
        .with_target(true)
        .with_current_span(true)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn log_warn(message: &str) {
    warn!(detail = %message);
}

pub fn log_info(message: &str) {
    info!(detail = %message);
}

pub fn log_error(message: &str) {
    error!(detail = %message);
}

/// Logs `detail` under a named event, choosing the level from the name
/// (`ERROR`, `WARN`/`WARNING`, anything else is info).
pub fn log_event(event: &str, detail: &str) {
    match event.to_uppercase().as_str() {
        "ERROR" => error!(event = %event, detail = %detail),
        "WARN" | "WARNING" => warn!(event = %event, detail = %detail),
        _ => info!(event = %event, detail = %detail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        init_structured_logging();
        init_structured_logging();
        log_event("analysis", "done");
        log_event("warning", "cycle");
        log_info("info");
        log_warn("warn");
        log_error("error");
    }
}
