//! Runtime configuration: telemetry buffers, warmup and shutdown

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Performance monitor sizing
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MonitorSettings {
    /// Maximum retained samples per stream; oldest are evicted first
    #[validate(range(min = 64))]
    pub buffer_capacity: usize,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            buffer_capacity: 65_536,
        }
    }
}

/// Optional startup warmup burst
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct WarmupSettings {
    pub enabled: bool,

    #[validate(range(min = 100))]
    pub time_ms: u64,

    #[validate(range(min = 1))]
    pub parallelism: usize,

    #[validate(range(min = 1))]
    pub warmup_tps: u32,
}

impl Default for WarmupSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            time_ms: 5000,
            parallelism: 4,
            warmup_tps: 50,
        }
    }
}

/// Shutdown drain policy
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ShutdownSettings {
    /// Grace period for draining pools before force-termination
    #[validate(range(min = 100))]
    pub grace_period_ms: u64,
}

impl Default for ShutdownSettings {
    fn default() -> Self {
        Self {
            grace_period_ms: 10_000,
        }
    }
}

/// Log sink configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LoggingSettings {
    #[validate(length(min = 1))]
    pub level: String,

    /// Emit JSON lines instead of the compact human format
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
