use crate::error::GearError;
use tracing_subscriber::EnvFilter;

/// Installs a `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// `default_directive` (e.g. `"gears=info,warn"`).
///
/// Libraries embedding gears usually install their own subscriber instead.
/// Fails if a global subscriber is already set.
pub fn init_tracing(default_directive: &str) -> Result<(), GearError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| GearError::Configuration(format!("tracing subscriber: {e}")))
}
