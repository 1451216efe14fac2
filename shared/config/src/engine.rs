//! Fraud engine configuration

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Which transaction side gets promoted to `fraud_flag=true` when auto-flag
/// fires. Unknown values fail configuration load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoFlagMode {
    Sender,
    Receiver,
    Both,
}

/// Rule evaluation pool sizing, deadlines and auto-flag policy.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EngineSettings {
    /// Workers executing per-rule evaluations
    #[validate(range(min = 1, max = 1024))]
    pub fraud_worker_pool_size: usize,

    #[validate(range(min = 1, max = 4096))]
    pub fraud_worker_max_pool_size: usize,

    /// Fallback per-transaction deadline when no latency history exists.
    /// With history the deadline is 10x the observed rule p99.
    #[validate(range(min = 10))]
    pub evaluation_deadline_ms: u64,

    pub auto_flag_enabled: bool,

    #[validate(range(min = 1, max = 100))]
    pub auto_flag_fraud_score_threshold: u8,

    pub auto_flag_mode: AutoFlagMode,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            fraud_worker_pool_size: 16,
            fraud_worker_max_pool_size: 32,
            evaluation_deadline_ms: 1000,
            auto_flag_enabled: false,
            auto_flag_fraud_score_threshold: 100,
            auto_flag_mode: AutoFlagMode::Sender,
        }
    }
}
