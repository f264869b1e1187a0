//! Tracing subscriber setup.
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the host application. With the `telemetry` feature enabled,
//! [`init_tracing`] installs a formatting subscriber honouring `RUST_LOG` and
//! falling back to the configured level.

use crate::core::config::TelemetryConfig;

/// Install a global fmt subscriber.
///
/// Returns false when a global subscriber was already installed.
#[cfg(feature = "telemetry")]
pub fn init_tracing(config: &TelemetryConfig) -> bool {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init()
        .is_ok()
}

#[cfg(not(feature = "telemetry"))]
pub fn init_tracing(_config: &TelemetryConfig) -> bool {
    false
}
