//! GraphGuard Logging Library
//!
//! One-call `tracing` initialization shared by the engine binary and tests.
//! The subscriber is the only process-wide state the system installs.

use tracing_subscriber::EnvFilter;

use graphguard_config::LoggingSettings;

/// Install the global tracing subscriber.
///
/// The filter comes from `RUST_LOG` when set, otherwise from the configured
/// level. Safe to call more than once; later calls are no-ops.
pub fn init(settings: &LoggingSettings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.level.clone()));

    let result = if settings.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(false)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .try_init()
    };

    if result.is_ok() {
        tracing::debug!(level = %settings.level, json = settings.json, "logging initialized");
    }
}

// Re-export the macros call sites use
pub use tracing::{debug, error, info, trace, warn};
