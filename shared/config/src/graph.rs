//! Graph server connection configuration

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Gremlin endpoint and per-pool sizing.
///
/// The engine keeps two physically separate pools against the same server:
/// "main" for transaction writes and fact persistence, "fraud" for rule
/// traversals. Each pool is bounded by `pool size x max in-process requests`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GraphSettings {
    #[validate(length(min = 1))]
    pub gremlin_host: String,

    #[validate(range(min = 1, max = 65535))]
    pub gremlin_port: u16,

    #[validate(range(min = 1, max = 256))]
    pub main_connection_pool_size: usize,

    #[validate(range(min = 1, max = 256))]
    pub fraud_connection_pool_size: usize,

    #[validate(range(min = 1, max = 64))]
    pub max_in_process_per_connection: usize,

    #[validate(range(min = 100))]
    pub request_timeout_ms: u64,

    #[validate(range(min = 0, max = 10))]
    pub retry_attempts: u32,

    #[validate(range(min = 1))]
    pub retry_backoff_ms: u64,
}

impl GraphSettings {
    /// Base URL of the Gremlin HTTP endpoint
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.gremlin_host, self.gremlin_port)
    }

    /// Concurrent request bound for the main pool
    pub fn main_in_process_limit(&self) -> usize {
        self.main_connection_pool_size * self.max_in_process_per_connection
    }

    /// Concurrent request bound for the fraud pool
    pub fn fraud_in_process_limit(&self) -> usize {
        self.fraud_connection_pool_size * self.max_in_process_per_connection
    }
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            gremlin_host: "localhost".to_string(),
            gremlin_port: 8182,
            main_connection_pool_size: 8,
            fraud_connection_pool_size: 16,
            max_in_process_per_connection: 4,
            request_timeout_ms: 5000,
            retry_attempts: 3,
            retry_backoff_ms: 50,
        }
    }
}
