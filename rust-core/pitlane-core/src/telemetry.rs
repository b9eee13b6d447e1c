//! # Telemetry
//!
//! Tracing subscriber setup for binaries embedding the core.

use tracing_subscriber::EnvFilter;

/// Filter directive used when `RUST_LOG` is unset or invalid
pub const DEFAULT_DIRECTIVE: &str = "pitlane=info";

/// Initialize tracing
///
/// `RUST_LOG` replaces [`DEFAULT_DIRECTIVE`] entirely when set.
/// Calling this more than once is harmless; later calls are ignored.
pub fn init_tracing(json: bool) {
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter());
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}
