//! Metadata counter store
//!
//! Write-behind aggregator keeping hot dashboard counters off the graph
//! path. Producers bump per-bin atomic adders; a single background loop
//! drains the adders and issues additive KV operations. A failed flush puts
//! the drained deltas back, so increments are never lost or doubled.

pub mod kv;
pub mod records;

pub use kv::{KvBackend, RedisKv};
pub use records::{bins, RecordKind};

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use graphguard_config::MetadataSettings;
use graphguard_errors::Result;

use crate::models::FraudStatus;

pub struct MetadataStore {
    backend: Arc<dyn KvBackend>,
    counters: HashMap<RecordKind, HashMap<&'static str, AtomicI64>>,
    pending: AtomicU64,
    flush_now: Notify,
    /// Exactly one in-flight flush
    flush_lock: Mutex<()>,
    settings: MetadataSettings,
}

impl MetadataStore {
    pub fn new(backend: Arc<dyn KvBackend>, settings: MetadataSettings) -> Arc<Self> {
        let counters = RecordKind::ALL
            .into_iter()
            .map(|record| {
                let bins = record
                    .bin_names()
                    .iter()
                    .map(|bin| (*bin, AtomicI64::new(0)))
                    .collect();
                (record, bins)
            })
            .collect();

        Arc::new(Self {
            backend,
            counters,
            pending: AtomicU64::new(0),
            flush_now: Notify::new(),
            flush_lock: Mutex::new(()),
            settings,
        })
    }

    /// Accumulate one delta in memory. Deltas are additive only; negative
    /// values are rejected.
    pub fn increment(&self, record: RecordKind, bin: &str, delta: i64) {
        if delta < 0 {
            warn!(record = record.name(), bin, delta, "negative delta rejected");
            return;
        }
        if delta == 0 {
            return;
        }
        let Some(counter) = self.counters.get(&record).and_then(|bins| bins.get(bin)) else {
            warn!(record = record.name(), bin, "unknown counter bin");
            return;
        };
        counter.fetch_add(delta, Ordering::Relaxed);

        let pending = self.pending.fetch_add(1, Ordering::Relaxed) + 1;
        if pending >= self.settings.flush_threshold {
            self.flush_now.notify_one();
        }
    }

    /// Record one consolidated fraud verdict
    pub fn record_fraud(&self, status: FraudStatus, amount: f64) {
        self.increment(RecordKind::Fraud, bins::TOTAL, 1);
        match status {
            FraudStatus::Blocked => self.increment(RecordKind::Fraud, bins::BLOCKED, 1),
            FraudStatus::Review => self.increment(RecordKind::Fraud, bins::REVIEW, 1),
            FraudStatus::Cleared => {}
        }
        self.increment(RecordKind::Fraud, bins::AMOUNT, amount.round() as i64);
    }

    /// Record an account promoted to `fraud_flag=true`
    pub fn record_account_flagged(&self) {
        self.increment(RecordKind::Account, bins::FLAGGED, 1);
    }

    /// Latest persisted value; staleness is bounded by one flush interval
    pub async fn read_record(&self, record: RecordKind) -> Result<HashMap<String, i64>> {
        self.backend.read(record).await
    }

    /// Truncate the backing record
    pub async fn clear(&self, record: RecordKind) -> Result<()> {
        self.backend.truncate(record).await
    }

    /// Background loop: seed records create-only, then flush on the interval
    /// or eagerly when the pending count crosses the threshold. A final
    /// flush runs on cancellation.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        for record in RecordKind::ALL {
            if let Err(err) = self.backend.create_if_absent(record, &record.seed()).await {
                warn!(record = record.name(), error = %err, "record seeding failed");
            }
        }

        let interval = Duration::from_millis(self.settings.flush_interval_ms);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
                _ = self.flush_now.notified() => {}
            }
            if let Err(err) = self.flush_once().await {
                warn!(error = %err, "metadata flush failed, deltas retained");
            }
        }

        if let Err(err) = self.flush_once().await {
            warn!(error = %err, "final metadata flush failed");
        }
    }

    /// Drain the in-memory deltas and apply them additively. On failure the
    /// drained deltas are credited back for the next cycle.
    pub async fn flush_once(&self) -> Result<u64> {
        let _guard = self.flush_lock.lock().await;
        self.pending.store(0, Ordering::Relaxed);

        let mut flushed = 0u64;
        let mut first_error = None;
        for record in RecordKind::ALL {
            let deltas = self.drain(record);
            if deltas.is_empty() {
                continue;
            }
            match self.backend.add(record, &deltas).await {
                Ok(()) => {
                    flushed += deltas.len() as u64;
                    debug!(record = record.name(), bins = deltas.len(), "flushed");
                }
                Err(err) => {
                    self.credit_back(record, &deltas);
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(flushed),
        }
    }

    /// Swap every non-zero bin of one record to zero and return the snapshot
    fn drain(&self, record: RecordKind) -> Vec<(&'static str, i64)> {
        let Some(bins) = self.counters.get(&record) else {
            return Vec::new();
        };
        bins.iter()
            .filter_map(|(bin, counter)| {
                let value = counter.swap(0, Ordering::Relaxed);
                (value != 0).then_some((*bin, value))
            })
            .collect()
    }

    fn credit_back(&self, record: RecordKind, deltas: &[(&'static str, i64)]) {
        let Some(bins) = self.counters.get(&record) else {
            return;
        };
        for (bin, value) in deltas {
            if let Some(counter) = bins.get(bin) {
                counter.fetch_add(*value, Ordering::Relaxed);
            }
        }
        self.pending.fetch_add(deltas.len() as u64, Ordering::Relaxed);
    }
}
