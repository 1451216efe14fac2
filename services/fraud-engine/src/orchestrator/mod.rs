//! Orchestrator
//!
//! Owns the component tree and the process lifecycle: construct pools,
//! warmup, start/stop generation, drain, shutdown. Exposes the typed control
//! API consumed by the CLI and the external HTTP layer. All wiring is
//! explicit constructor injection; the only process-wide state is the log
//! sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use graphguard_config::AppSettings;
use graphguard_errors::{GraphGuardError, Result};

use crate::engine::FraudEngine;
use crate::graph::GraphClient;
use crate::metadata::{KvBackend, MetadataStore, RecordKind, RedisKv};
use crate::models::{GenerationType, RuleStateView, TransactionSummary};
use crate::monitor::{PerformanceMonitor, PerformanceReport};
use crate::generator::TransactionGenerator;
use crate::rules::RuleRegistry;

/// Outcome of a start request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StartStatus {
    Started,
    AlreadyRunning,
    Invalid,
}

/// Outcome of a stop request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StopStatus {
    Stopped,
    NotRunning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartOutcome {
    pub status: StartStatus,
    pub detail: Option<String>,
}

/// Generator and throughput view for the dashboard
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub running: bool,
    pub target_tps: u32,
    pub current_tps: f64,
    pub actual_tps: f64,
    pub queue_size: usize,
    pub started_at: Option<DateTime<Utc>>,
}

/// Aggregated dashboard payload: status plus the persisted counter records
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub status: EngineStatus,
    pub fraud: HashMap<String, i64>,
    pub user: HashMap<String, i64>,
    pub account: HashMap<String, i64>,
}

pub struct Orchestrator {
    settings: AppSettings,
    graph: Arc<GraphClient>,
    metadata: Arc<MetadataStore>,
    monitor: Arc<PerformanceMonitor>,
    registry: Arc<RuleRegistry>,
    engine: Arc<FraudEngine>,
    generator: Arc<TransactionGenerator>,
    background: CancellationToken,
    flush_task: Mutex<Option<JoinHandle<()>>>,
    fatal_rx: Mutex<mpsc::Receiver<GraphGuardError>>,
}

impl Orchestrator {
    /// Build the production component tree: HTTP graph pools and Redis
    /// counter store per the settings.
    pub async fn build(settings: AppSettings) -> Result<Arc<Self>> {
        settings.check()?;
        let graph = Arc::new(GraphClient::connect(&settings.graph)?);
        let kv = Arc::new(RedisKv::connect(settings.metadata.clone()).await?);
        Ok(Self::assemble(settings, graph, kv))
    }

    /// Wire the component tree over explicit collaborators. Tests inject
    /// scripted transports and in-memory KV backends here.
    pub fn assemble(
        settings: AppSettings,
        graph: Arc<GraphClient>,
        kv: Arc<dyn KvBackend>,
    ) -> Arc<Self> {
        let monitor = PerformanceMonitor::new(&settings.monitor);
        let metadata = MetadataStore::new(kv, settings.metadata.clone());
        let registry = RuleRegistry::with_reference_rules(Arc::clone(&graph));
        let engine = FraudEngine::new(
            Arc::clone(&graph),
            Arc::clone(&registry),
            Arc::clone(&metadata),
            Arc::clone(&monitor),
            settings.engine.clone(),
        );
        let (fatal_tx, fatal_rx) = mpsc::channel(4);
        let generator = TransactionGenerator::new(
            Arc::clone(&graph),
            Arc::clone(&engine),
            Arc::clone(&monitor),
            settings.generator.clone(),
            &settings.shutdown,
            fatal_tx,
        );

        let background = CancellationToken::new();
        let flush_task = tokio::spawn(Arc::clone(&metadata).run(background.clone()));

        Arc::new(Self {
            settings,
            graph,
            metadata,
            monitor,
            registry,
            engine,
            generator,
            background,
            flush_task: Mutex::new(Some(flush_task)),
            fatal_rx: Mutex::new(fatal_rx),
        })
    }

    /// Optional warmup before the engine is declared ready: prime both
    /// graph pools with concurrent manual transactions, then run a short
    /// timed burst through the scheduler.
    pub async fn warmup(&self) -> Result<()> {
        if !self.settings.warmup.enabled {
            return Ok(());
        }
        info!(
            tps = self.settings.warmup.warmup_tps,
            duration_ms = self.settings.warmup.time_ms,
            parallelism = self.settings.warmup.parallelism,
            "running warmup"
        );

        let mut primes = tokio::task::JoinSet::new();
        for _ in 0..self.settings.warmup.parallelism {
            let generator = Arc::clone(&self.generator);
            let engine = Arc::clone(&self.engine);
            primes.spawn(async move {
                if let Ok(info) = generator.generate_one(GenerationType::Manual).await {
                    engine.submit(info).await;
                }
            });
        }
        while primes.join_next().await.is_some() {}

        self.generator.start(self.settings.warmup.warmup_tps).await?;
        tokio::time::sleep(Duration::from_millis(self.settings.warmup.time_ms)).await;
        self.generator.stop().await?;
        Ok(())
    }

    // =========================================================================
    // CONTROL API
    // =========================================================================

    pub async fn start_generator(&self, target_tps: u32) -> StartOutcome {
        match self.generator.start(target_tps).await {
            Ok(()) => StartOutcome {
                status: StartStatus::Started,
                detail: None,
            },
            Err(GraphGuardError::InvalidState { current, .. }) => StartOutcome {
                status: StartStatus::AlreadyRunning,
                detail: Some(format!("generator is {current}")),
            },
            Err(err) => StartOutcome {
                status: StartStatus::Invalid,
                detail: Some(err.to_string()),
            },
        }
    }

    pub async fn stop_generator(&self) -> StopStatus {
        match self.generator.stop().await {
            Ok(()) => StopStatus::Stopped,
            Err(_) => StopStatus::NotRunning,
        }
    }

    pub async fn status(&self) -> EngineStatus {
        let snapshot = self.generator.snapshot().await;
        EngineStatus {
            running: snapshot.running,
            target_tps: snapshot.target_tps,
            current_tps: self.monitor.completion_rate(5),
            actual_tps: self.monitor.completion_rate(60),
            queue_size: self.generator.in_flight(),
            started_at: snapshot.started_at,
        }
    }

    pub fn list_rules(&self) -> Vec<RuleStateView> {
        self.registry.list()
    }

    pub fn toggle_rule(&self, name: &str, enabled: bool) -> Result<RuleStateView> {
        self.registry.toggle(name, enabled)
    }

    /// Windowed performance aggregates; invalid windows coerce to 1 minute
    pub fn stats(&self, window_minutes: u32) -> PerformanceReport {
        self.monitor.report(window_minutes)
    }

    /// Dashboard summary: generator status plus persisted counters
    pub async fn dashboard(&self) -> Result<DashboardSummary> {
        Ok(DashboardSummary {
            status: self.status().await,
            fraud: self.metadata.read_record(RecordKind::Fraud).await?,
            user: self.metadata.read_record(RecordKind::User).await?,
            account: self.metadata.read_record(RecordKind::Account).await?,
        })
    }

    /// Create one MANUAL transaction and run it through the full pipeline
    pub async fn create_transaction(&self) -> Result<TransactionSummary> {
        let info = self.generator.generate_one(GenerationType::Manual).await?;
        Ok(self.engine.submit(info).await)
    }

    pub async fn inspect_indexes(&self) -> Result<String> {
        self.graph.inspect_indexes().await
    }

    pub async fn create_fraud_index(&self) -> Result<String> {
        self.graph.create_fraud_flag_index().await
    }

    pub async fn seed_sample_data(&self) -> Result<u64> {
        self.graph.seed_sample_data().await
    }

    pub async fn recent_transactions(
        &self,
        limit: usize,
    ) -> Result<Vec<serde_json::Map<String, serde_json::Value>>> {
        self.graph.recent_transactions(limit).await
    }

    /// Resolves when the generator surfaces an unrecoverable fault
    pub async fn wait_fatal(&self) -> Option<GraphGuardError> {
        self.fatal_rx.lock().await.recv().await
    }

    /// Stop everything: drain the generator, run a final metadata flush,
    /// stop the telemetry consumer. Bounded by the configured grace period.
    pub async fn shutdown(&self) {
        info!("shutting down");
        if let Err(err) = self.generator.stop().await {
            // Already stopped is the normal case on clean exits
            if !matches!(err, GraphGuardError::InvalidState { .. }) {
                warn!(error = %err, "generator stop failed during shutdown");
            }
        }

        self.background.cancel();
        let flush_task = self.flush_task.lock().await.take();
        if let Some(task) = flush_task {
            let grace = Duration::from_millis(self.settings.shutdown.grace_period_ms);
            match tokio::time::timeout(grace, task).await {
                Ok(_) => {}
                Err(_) => warn!("metadata flush loop did not stop within the grace period"),
            }
        }

        self.monitor.shutdown();
        info!("shutdown complete");
    }
}
