//! Process-wide logging setup.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes the global tracing subscriber from the configured level.
///
/// Accepted levels are `info` and `error`; anything else falls back to
/// `info`. `RUST_LOG` takes precedence when set. Calling this twice is a
/// no-op (the second init fails silently), so the level is immutable for
/// the lifetime of the process.
pub fn init(log_level: &str) {
    let level = match log_level.to_ascii_lowercase().as_str() {
        "error" => "error",
        _ => "info",
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).compact())
        .try_init();
}
