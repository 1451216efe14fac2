//! Metadata counter store configuration

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Write-behind counter aggregator settings. Counters accumulate in memory
/// and flush as additive operations against the KV store.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MetadataSettings {
    #[validate(length(min = 1))]
    pub kv_address: String,

    #[validate(length(min = 1))]
    pub namespace: String,

    #[validate(length(min = 1))]
    pub set_name: String,

    #[validate(range(min = 50))]
    pub flush_interval_ms: u64,

    /// Pending-increment count that triggers an eager flush
    #[validate(range(min = 1))]
    pub flush_threshold: u64,
}

impl MetadataSettings {
    /// Storage key for one counter record
    pub fn record_key(&self, record_name: &str) -> String {
        format!("{}:{}:{}", self.namespace, self.set_name, record_name)
    }
}

impl Default for MetadataSettings {
    fn default() -> Self {
        Self {
            kv_address: "redis://127.0.0.1:6379".to_string(),
            namespace: "graphguard".to_string(),
            set_name: "dashboard".to_string(),
            flush_interval_ms: 1000,
            flush_threshold: 200,
        }
    }
}
