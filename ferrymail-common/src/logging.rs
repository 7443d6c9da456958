//! Process-wide tracing setup.

use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber.
///
/// Filtering follows `RUST_LOG` when set. Without it, debug builds log
/// at DEBUG and release builds at INFO.
///
/// # Panics
/// Panics if a global subscriber is already installed.
pub fn init() {
    let fallback = if cfg!(debug_assertions) { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .with_target(false)
        .compact()
        .init();
}
