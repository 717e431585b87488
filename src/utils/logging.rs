//! Tracing subscriber setup.

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber filtered by `RUST_LOG`, defaulting to `default_level`.
///
/// Returns `false` when a global subscriber was already installed.
pub fn init_tracing(default_level: Level) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(default_level.into()))
        .try_init()
        .is_ok()
}
