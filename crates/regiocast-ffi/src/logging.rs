//! Logging setup for hosts that load the library.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when neither an explicit filter nor `RUST_LOG` is given.
pub const DEFAULT_FILTER: &str = "regiocast_core=info,regiocast_ffi=info";

/// Install a global fmt subscriber writing to stderr.
///
/// An explicit `filter` wins over `RUST_LOG`. Fails on an unparsable filter
/// or when a global subscriber is already installed.
pub fn init_logging(filter: Option<&str>) -> Result<(), String> {
    let env_filter = match filter {
        Some(f) => EnvFilter::try_new(f).map_err(|e| format!("Invalid log filter '{}': {}", f, e))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()),
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .try_init()
        .map_err(|e| format!("Logging already initialized: {}", e))
}
