//! Transaction generator
//!
//! Produces transactions at a bounded target rate. A governor token bucket
//! paces the scheduler (refill = target TPS, burst = the configured
//! capacity); each token grants one create-and-submit task on the generator
//! worker pool. Creation failures do not stop generation until the
//! consecutive-failure breaker trips.

use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use graphguard_config::{GeneratorSettings, ShutdownSettings};
use graphguard_errors::{GraphGuardError, Result};

use crate::engine::FraudEngine;
use crate::graph::GraphClient;
use crate::models::{
    GenerationType, PerformanceInfo, TransactionInfo, TransactionProperties, TransactionStatus,
    TransactionType,
};
use crate::monitor::{PerformanceMonitor, TransactionSample};

const CITIES: &[&str] = &[
    "New York",
    "London",
    "Singapore",
    "Lisbon",
    "Tokyo",
    "Sydney",
    "Toronto",
    "Berlin",
];

const CURRENCY: &str = "USD";

enum GeneratorState {
    Stopped,
    Running {
        target_tps: u32,
        started_at: DateTime<Utc>,
        cancel: CancellationToken,
        scheduler: JoinHandle<()>,
    },
    Stopping,
}

/// Point-in-time view of the generator lifecycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorSnapshot {
    pub running: bool,
    pub target_tps: u32,
    pub started_at: Option<DateTime<Utc>>,
}

/// Everything the scheduler task and its workers need; lives behind one Arc
/// so spawned tasks outlive control-plane calls.
struct GeneratorCore {
    graph: Arc<GraphClient>,
    engine: Arc<FraudEngine>,
    monitor: Arc<PerformanceMonitor>,
    settings: GeneratorSettings,
    workers: Arc<Semaphore>,
    consecutive_failures: AtomicU32,
    failure_window_started: std::sync::Mutex<Option<Instant>>,
    fatal: mpsc::Sender<GraphGuardError>,
}

pub struct TransactionGenerator {
    core: Arc<GeneratorCore>,
    grace_period: Duration,
    state: Mutex<GeneratorState>,
}

impl TransactionGenerator {
    pub fn new(
        graph: Arc<GraphClient>,
        engine: Arc<FraudEngine>,
        monitor: Arc<PerformanceMonitor>,
        settings: GeneratorSettings,
        shutdown: &ShutdownSettings,
        fatal: mpsc::Sender<GraphGuardError>,
    ) -> Arc<Self> {
        let core = Arc::new(GeneratorCore {
            graph,
            engine,
            monitor,
            workers: Arc::new(Semaphore::new(settings.transaction_worker_pool_size)),
            settings,
            consecutive_failures: AtomicU32::new(0),
            failure_window_started: std::sync::Mutex::new(None),
            fatal,
        });
        Arc::new(Self {
            core,
            grace_period: Duration::from_millis(shutdown.grace_period_ms),
            state: Mutex::new(GeneratorState::Stopped),
        })
    }

    /// Start generating at `target_tps`. Only legal from the STOPPED state.
    pub async fn start(&self, target_tps: u32) -> Result<()> {
        let mut state = self.state.lock().await;
        match &*state {
            GeneratorState::Stopped => {}
            GeneratorState::Running { .. } => {
                return Err(GraphGuardError::invalid_state("start", "RUNNING"))
            }
            GeneratorState::Stopping => {
                return Err(GraphGuardError::invalid_state("start", "STOPPING"))
            }
        }
        if target_tps == 0 {
            return Err(GraphGuardError::out_of_range(
                "target_tps",
                "must be greater than zero",
            ));
        }
        if target_tps > self.core.settings.max_transaction_rate {
            return Err(GraphGuardError::out_of_range(
                "target_tps",
                format!(
                    "exceeds max_transaction_rate {}",
                    self.core.settings.max_transaction_rate
                ),
            ));
        }

        self.core.consecutive_failures.store(0, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let scheduler = tokio::spawn(Arc::clone(&self.core).run_scheduler(
            target_tps,
            cancel.clone(),
            self.grace_period,
        ));
        *state = GeneratorState::Running {
            target_tps,
            started_at: Utc::now(),
            cancel,
            scheduler,
        };
        info!(target_tps, "generator started");
        Ok(())
    }

    /// Stop generation and drain in-flight submissions before returning
    pub async fn stop(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let prior = std::mem::replace(&mut *state, GeneratorState::Stopping);
        let (cancel, scheduler) = match prior {
            GeneratorState::Running {
                cancel, scheduler, ..
            } => (cancel, scheduler),
            other => {
                let current = match other {
                    GeneratorState::Stopped => "STOPPED",
                    _ => "STOPPING",
                };
                *state = other;
                return Err(GraphGuardError::invalid_state("stop", current));
            }
        };
        drop(state);

        cancel.cancel();
        if let Err(err) = scheduler.await {
            warn!(error = %err, "scheduler task ended abnormally");
        }

        *self.state.lock().await = GeneratorState::Stopped;
        info!("generator stopped");
        Ok(())
    }

    pub async fn snapshot(&self) -> GeneratorSnapshot {
        let state = self.state.lock().await;
        match &*state {
            GeneratorState::Running {
                target_tps,
                started_at,
                cancel,
                ..
            } => GeneratorSnapshot {
                // The breaker may have cancelled the scheduler without the
                // control plane having called stop() yet
                running: !cancel.is_cancelled(),
                target_tps: *target_tps,
                started_at: Some(*started_at),
            },
            _ => GeneratorSnapshot {
                running: false,
                target_tps: 0,
                started_at: None,
            },
        }
    }

    /// Submissions currently occupying generator workers
    pub fn in_flight(&self) -> usize {
        self.core
            .settings
            .transaction_worker_pool_size
            .saturating_sub(self.core.workers.available_permits())
    }

    /// Synchronous create-one entry point, also used by the control plane
    pub async fn generate_one(&self, gen_type: GenerationType) -> Result<TransactionInfo> {
        self.core.generate_one(gen_type).await
    }
}

impl GeneratorCore {
    async fn run_scheduler(
        self: Arc<Self>,
        target_tps: u32,
        cancel: CancellationToken,
        grace_period: Duration,
    ) {
        let refill = NonZeroU32::new(target_tps).unwrap_or(NonZeroU32::MIN);
        let burst =
            NonZeroU32::new(self.settings.scheduler_tps_capacity).unwrap_or(NonZeroU32::MIN);
        let limiter = RateLimiter::direct(Quota::per_second(refill).allow_burst(burst));

        let mut tasks: JoinSet<()> = JoinSet::new();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = limiter.until_ready() => {
                    let permit = tokio::select! {
                        _ = cancel.cancelled() => break,
                        permit = Arc::clone(&self.workers).acquire_owned() => match permit {
                            Ok(permit) => permit,
                            Err(_) => break,
                        },
                    };
                    let core = Arc::clone(&self);
                    let task_cancel = cancel.clone();
                    tasks.spawn(async move {
                        let _permit = permit;
                        core.create_and_submit(GenerationType::Auto, &task_cancel).await;
                    });
                    // Reap finished tasks without blocking the token loop
                    while tasks.try_join_next().is_some() {}
                }
            }
        }

        let drain = async {
            while tasks.join_next().await.is_some() {}
        };
        if tokio::time::timeout(grace_period, drain).await.is_err() {
            warn!(
                grace_ms = grace_period.as_millis() as u64,
                "drain grace period exceeded, aborting in-flight submissions"
            );
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }
    }

    /// One unit of scheduled work: create the transaction and hand it to
    /// the fraud engine. Failures feed the monitor and the breaker.
    async fn create_and_submit(&self, gen_type: GenerationType, cancel: &CancellationToken) {
        match self.generate_one(gen_type).await {
            Ok(info) => {
                self.consecutive_failures.store(0, Ordering::Relaxed);
                self.engine.submit(info).await;
            }
            Err(err) => {
                error!(error = %err, "transaction creation failed");
                if self.record_creation_failure() {
                    self.trip_breaker(cancel).await;
                }
            }
        }
    }

    async fn generate_one(&self, gen_type: GenerationType) -> Result<TransactionInfo> {
        let start = Utc::now();
        let begun = Instant::now();

        let (from_account_id, to_account_id) = self.pick_accounts();
        let txn = TransactionProperties {
            txn_id: Uuid::new_v4(),
            amount: self.pick_amount(),
            currency: CURRENCY.to_string(),
            timestamp: start,
            transaction_type: pick_type(),
            status: TransactionStatus::Completed,
            location: pick_city(),
            gen_type,
        };

        let result = self
            .graph
            .create_transaction_edge(&from_account_id, &to_account_id, &txn)
            .await;

        match result {
            Ok(edge_id) => Ok(TransactionInfo {
                success: true,
                edge_id,
                txn_id: txn.txn_id,
                from_account_id,
                to_account_id,
                amount: txn.amount,
                perf: PerformanceInfo::ok(start, begun.elapsed()),
            }),
            Err(err) => {
                self.monitor.record_transaction(TransactionSample {
                    at: Utc::now(),
                    end_to_end: begun.elapsed(),
                    execution: Duration::ZERO,
                    queue_wait: Duration::ZERO,
                    db: begun.elapsed(),
                    ok: false,
                });
                Err(err)
            }
        }
    }

    /// Two distinct account ids, uniform over the known id space
    fn pick_accounts(&self) -> (String, String) {
        let mut rng = rand::thread_rng();
        let range = self.settings.account_id_range;
        let from = rng.gen_range(1..=range);
        let to = loop {
            let candidate = rng.gen_range(1..=range);
            if candidate != from {
                break candidate;
            }
        };
        (format!("A{from}"), format!("A{to}"))
    }

    fn pick_amount(&self) -> f64 {
        let mut rng = rand::thread_rng();
        let raw = rng.gen_range(self.settings.amount_min..self.settings.amount_max);
        (raw * 100.0).round() / 100.0
    }

    /// Count a creation failure inside the sliding window; true when the
    /// breaker threshold is reached.
    fn record_creation_failure(&self) -> bool {
        let window = Duration::from_millis(self.settings.failure_window_ms);
        let mut started = match self.failure_window_started.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match *started {
            Some(at) if at.elapsed() <= window => {}
            _ => {
                *started = Some(Instant::now());
                self.consecutive_failures.store(0, Ordering::Relaxed);
            }
        }
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        failures >= self.settings.failure_threshold
    }

    /// Stop accepting work and surface a fatal signal to the orchestrator.
    /// The control plane completes the STOPPING -> STOPPED transition.
    async fn trip_breaker(&self, cancel: &CancellationToken) {
        cancel.cancel();
        error!(
            threshold = self.settings.failure_threshold,
            "consecutive creation failures exceeded threshold, stopping generation"
        );
        let _ = self
            .fatal
            .send(GraphGuardError::fatal(
                "graph unavailable: consecutive transaction creation failures",
            ))
            .await;
    }
}

fn pick_type() -> TransactionType {
    let mut rng = rand::thread_rng();
    *TransactionType::ALL
        .choose(&mut rng)
        .unwrap_or(&TransactionType::Transfer)
}

fn pick_city() -> String {
    let mut rng = rand::thread_rng();
    CITIES.choose(&mut rng).unwrap_or(&CITIES[0]).to_string()
}
