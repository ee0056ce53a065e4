//! Diagnostic tracing on stderr.
//!
//! Tracing is for whoever debugs the engine. The operator sees advisories
//! (`[system]`/`[ai]` lines through `io::operator`), which are gated by the
//! `verbose` setting and never by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Directive used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_DIRECTIVE: &str = "warn";

/// Install the global subscriber.
///
/// ```bash
/// RUST_LOG=taskloop=debug taskloop run --goal "list files"
/// ```
///
/// Returns `false` if a subscriber was already installed.
pub fn init() -> bool {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .try_init()
        .is_ok()
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}
