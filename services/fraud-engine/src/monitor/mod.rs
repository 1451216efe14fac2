//! Performance monitor
//!
//! Producers (generator, engine, rules) enqueue samples on an unbounded MPSC
//! channel and never block; a single consumer task drains the channel into
//! bounded ring buffers. Aggregates are computed on demand over sliding
//! windows of 1, 5 or 10 minutes.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::warn;

use graphguard_config::MonitorSettings;

pub const VALID_WINDOWS_MINUTES: [u32; 3] = [1, 5, 10];

/// One end-to-end transaction observation
#[derive(Debug, Clone)]
pub struct TransactionSample {
    pub at: DateTime<Utc>,
    pub end_to_end: Duration,
    pub execution: Duration,
    pub queue_wait: Duration,
    pub db: Duration,
    pub ok: bool,
}

/// One rule invocation observation
#[derive(Debug, Clone)]
pub struct RuleSample {
    pub at: DateTime<Utc>,
    pub rule: String,
    pub duration: Duration,
    pub ok: bool,
}

pub enum Sample {
    Transaction(TransactionSample),
    Rule(RuleSample),
    /// Consumer acknowledgement point; lets callers wait until everything
    /// enqueued before it has been applied
    Sync(oneshot::Sender<()>),
}

/// Aggregates over one sliding window
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WindowStats {
    pub avg_ms: f64,
    pub max_ms: f64,
    pub min_ms: f64,
    pub count: u64,
    pub success_rate: f64,
    pub qps: f64,
}

/// Transaction aggregates: end-to-end latency plus component averages
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionWindowStats {
    pub latency: WindowStats,
    pub execution_avg_ms: f64,
    pub queue_wait_avg_ms: f64,
    pub db_avg_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub window_minutes: u32,
    pub transaction: TransactionWindowStats,
    pub rules: BTreeMap<String, WindowStats>,
}

struct MonitorState {
    capacity: usize,
    transactions: VecDeque<TransactionSample>,
    rules: HashMap<String, VecDeque<RuleSample>>,
}

impl MonitorState {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            transactions: VecDeque::new(),
            rules: HashMap::new(),
        }
    }

    fn apply(&mut self, sample: Sample) {
        match sample {
            Sample::Transaction(s) => {
                if self.transactions.len() == self.capacity {
                    self.transactions.pop_front();
                }
                self.transactions.push_back(s);
            }
            Sample::Rule(s) => {
                let buffer = self.rules.entry(s.rule.clone()).or_default();
                if buffer.len() == self.capacity {
                    buffer.pop_front();
                }
                buffer.push_back(s);
            }
            Sample::Sync(ack) => {
                let _ = ack.send(());
            }
        }
    }
}

pub struct PerformanceMonitor {
    sender: mpsc::UnboundedSender<Sample>,
    state: Arc<RwLock<MonitorState>>,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl PerformanceMonitor {
    /// Create the monitor and spawn its consumer task
    pub fn new(settings: &MonitorSettings) -> Arc<Self> {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Sample>();
        let state = Arc::new(RwLock::new(MonitorState::new(settings.buffer_capacity)));

        let consumer_state = Arc::clone(&state);
        let consumer = tokio::spawn(async move {
            while let Some(sample) = receiver.recv().await {
                if let Ok(mut guard) = consumer_state.write() {
                    guard.apply(sample);
                }
            }
        });

        Arc::new(Self {
            sender,
            state,
            consumer: Mutex::new(Some(consumer)),
        })
    }

    /// Enqueue without blocking; samples after shutdown are dropped
    pub fn record_transaction(&self, sample: TransactionSample) {
        let _ = self.sender.send(Sample::Transaction(sample));
    }

    pub fn record_rule(&self, sample: RuleSample) {
        let _ = self.sender.send(Sample::Rule(sample));
    }

    /// Wait until every sample enqueued before this call has been applied
    pub async fn synced(&self) {
        let (ack, done) = oneshot::channel();
        if self.sender.send(Sample::Sync(ack)).is_ok() {
            let _ = done.await;
        }
    }

    /// Coerce an arbitrary requested window to a supported one
    pub fn coerce_window(window_minutes: u32) -> u32 {
        if VALID_WINDOWS_MINUTES.contains(&window_minutes) {
            window_minutes
        } else {
            warn!(
                requested = window_minutes,
                "unsupported stats window, coercing to 1 minute"
            );
            1
        }
    }

    /// Windowed aggregates for transactions and every rule stream
    pub fn report(&self, window_minutes: u32) -> PerformanceReport {
        let window_minutes = Self::coerce_window(window_minutes);
        let cutoff = Utc::now() - ChronoDuration::minutes(window_minutes as i64);
        let window_secs = (window_minutes * 60) as f64;

        let guard = match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let recent: Vec<&TransactionSample> = guard
            .transactions
            .iter()
            .filter(|s| s.at >= cutoff)
            .collect();

        let latency = aggregate(
            recent.iter().map(|s| (s.end_to_end, s.ok)),
            window_secs,
        );
        let transaction = TransactionWindowStats {
            execution_avg_ms: mean_ms(recent.iter().map(|s| s.execution)),
            queue_wait_avg_ms: mean_ms(recent.iter().map(|s| s.queue_wait)),
            db_avg_ms: mean_ms(recent.iter().map(|s| s.db)),
            latency,
        };

        let mut rules = BTreeMap::new();
        for (name, buffer) in &guard.rules {
            let samples = buffer.iter().filter(|s| s.at >= cutoff);
            rules.insert(
                name.clone(),
                aggregate(samples.map(|s| (s.duration, s.ok)), window_secs),
            );
        }

        PerformanceReport {
            window_minutes,
            transaction,
            rules,
        }
    }

    /// Completions per second over the trailing `secs` seconds
    pub fn completion_rate(&self, secs: u64) -> f64 {
        let cutoff = Utc::now() - ChronoDuration::seconds(secs as i64);
        let guard = match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let count = guard.transactions.iter().filter(|s| s.at >= cutoff).count();
        count as f64 / secs.max(1) as f64
    }

    /// p99 rule latency over the window, across all rule streams. Drives the
    /// engine's adaptive per-transaction deadline.
    pub fn rule_latency_p99(&self, window_minutes: u32) -> Option<Duration> {
        let window_minutes = Self::coerce_window(window_minutes);
        let cutoff = Utc::now() - ChronoDuration::minutes(window_minutes as i64);
        let guard = match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut durations: Vec<Duration> = guard
            .rules
            .values()
            .flat_map(|buffer| buffer.iter())
            .filter(|s| s.at >= cutoff)
            .map(|s| s.duration)
            .collect();
        if durations.is_empty() {
            return None;
        }
        durations.sort_unstable();
        let index = ((durations.len() - 1) as f64 * 0.99) as usize;
        Some(durations[index])
    }

    /// Stop the consumer task. Samples recorded afterwards are dropped.
    pub fn shutdown(&self) {
        if let Ok(mut guard) = self.consumer.lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }
}

fn aggregate(samples: impl Iterator<Item = (Duration, bool)>, window_secs: f64) -> WindowStats {
    let mut count = 0u64;
    let mut ok_count = 0u64;
    let mut sum_ms = 0.0;
    let mut max_ms = 0.0f64;
    let mut min_ms = f64::MAX;

    for (duration, ok) in samples {
        let ms = duration.as_secs_f64() * 1000.0;
        count += 1;
        if ok {
            ok_count += 1;
        }
        sum_ms += ms;
        max_ms = max_ms.max(ms);
        min_ms = min_ms.min(ms);
    }

    if count == 0 {
        return WindowStats::default();
    }
    WindowStats {
        avg_ms: sum_ms / count as f64,
        max_ms,
        min_ms,
        count,
        success_rate: ok_count as f64 / count as f64,
        qps: count as f64 / window_secs,
    }
}

fn mean_ms(durations: impl Iterator<Item = Duration>) -> f64 {
    let mut count = 0u64;
    let mut sum_ms = 0.0;
    for duration in durations {
        count += 1;
        sum_ms += duration.as_secs_f64() * 1000.0;
    }
    if count == 0 {
        0.0
    } else {
        sum_ms / count as f64
    }
}
