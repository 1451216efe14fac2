//! Transaction generator configuration

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Pacing and sizing for the transaction generator.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GeneratorSettings {
    /// Workers executing create-and-submit tasks
    #[validate(range(min = 1, max = 1024))]
    pub transaction_worker_pool_size: usize,

    #[validate(range(min = 1, max = 4096))]
    pub transaction_worker_max_pool_size: usize,

    /// Token-bucket burst capacity; refill rate is the target TPS
    #[validate(range(min = 1))]
    pub scheduler_tps_capacity: u32,

    /// Upper bound accepted by `start(target_tps)`
    #[validate(range(min = 1))]
    pub max_transaction_rate: u32,

    #[validate(range(min = 0.01))]
    pub amount_min: f64,

    #[validate(range(min = 0.01))]
    pub amount_max: f64,

    /// Account ids are drawn uniformly from 1..=account_id_range
    #[validate(range(min = 2))]
    pub account_id_range: u64,

    /// Consecutive creation failures that trip the breaker
    #[validate(range(min = 1))]
    pub failure_threshold: u32,

    /// Window within which consecutive failures are counted
    #[validate(range(min = 100))]
    pub failure_window_ms: u64,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            transaction_worker_pool_size: 8,
            transaction_worker_max_pool_size: 16,
            scheduler_tps_capacity: 100,
            max_transaction_rate: 4000,
            amount_min: 1.0,
            amount_max: 5000.0,
            account_id_range: 10_000,
            failure_threshold: 100,
            failure_window_ms: 10_000,
        }
    }
}
