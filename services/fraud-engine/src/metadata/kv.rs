//! KV backend for the counter records
//!
//! The store only ever issues additive operations, create-only seeds, reads
//! and truncations; that narrow contract is the trait below. Production
//! backs it with Redis hashes, tests with in-memory maps.

use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::HashMap;
use tracing::info;

use graphguard_config::MetadataSettings;
use graphguard_errors::Result;

use super::records::RecordKind;

#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Apply per-bin additive deltas to one record
    async fn add(&self, record: RecordKind, deltas: &[(&'static str, i64)]) -> Result<()>;

    /// Read the persisted record
    async fn read(&self, record: RecordKind) -> Result<HashMap<String, i64>>;

    /// Create the record with seed values only if it does not exist yet;
    /// existing records are never overwritten
    async fn create_if_absent(&self, record: RecordKind, seed: &[(&'static str, i64)]) -> Result<()>;

    /// Remove the record entirely
    async fn truncate(&self, record: RecordKind) -> Result<()>;
}

/// Redis implementation: one hash per record at `namespace:set:record`,
/// `HINCRBY` for additive flushes, `HSETNX` for seeding.
pub struct RedisKv {
    manager: redis::aio::ConnectionManager,
    settings: MetadataSettings,
}

impl RedisKv {
    pub async fn connect(settings: MetadataSettings) -> Result<Self> {
        let client = redis::Client::open(settings.kv_address.as_str())?;
        let manager = redis::aio::ConnectionManager::new(client).await?;
        info!(address = %settings.kv_address, "metadata KV connected");
        Ok(Self { manager, settings })
    }

    fn key(&self, record: RecordKind) -> String {
        self.settings.record_key(record.name())
    }
}

#[async_trait]
impl KvBackend for RedisKv {
    async fn add(&self, record: RecordKind, deltas: &[(&'static str, i64)]) -> Result<()> {
        let key = self.key(record);
        let mut conn = self.manager.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (bin, delta) in deltas {
            pipe.hincr(&key, *bin, *delta).ignore();
        }
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    async fn read(&self, record: RecordKind) -> Result<HashMap<String, i64>> {
        let key = self.key(record);
        let mut conn = self.manager.clone();
        let map: HashMap<String, i64> = conn.hgetall(&key).await?;
        Ok(map)
    }

    async fn create_if_absent(
        &self,
        record: RecordKind,
        seed: &[(&'static str, i64)],
    ) -> Result<()> {
        let key = self.key(record);
        let mut conn = self.manager.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (bin, value) in seed {
            pipe.hset_nx(&key, *bin, *value).ignore();
        }
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    async fn truncate(&self, record: RecordKind) -> Result<()> {
        let key = self.key(record);
        let mut conn = self.manager.clone();
        conn.del::<_, ()>(&key).await?;
        Ok(())
    }
}
