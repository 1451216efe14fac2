//! Fraud engine
//!
//! Fans each submitted transaction out across the enabled rule set on a
//! bounded worker pool, consolidates the verdicts, and persists the fraud
//! facts onto the transaction edge. Every submission ends in either a
//! consolidated annotation or a failed sample; nothing is dropped silently.

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use graphguard_config::{AutoFlagMode, EngineSettings};

use crate::graph::GraphClient;
use crate::metadata::MetadataStore;
use crate::models::{
    FraudAnnotation, PerformanceInfo, RuleVerdict, TransactionInfo, TransactionSummary,
};
use crate::monitor::{PerformanceMonitor, RuleSample, TransactionSample};
use crate::rules::RuleRegistry;

pub struct FraudEngine {
    graph: Arc<GraphClient>,
    registry: Arc<RuleRegistry>,
    metadata: Arc<MetadataStore>,
    monitor: Arc<PerformanceMonitor>,
    workers: Arc<Semaphore>,
    settings: EngineSettings,
}

impl FraudEngine {
    pub fn new(
        graph: Arc<GraphClient>,
        registry: Arc<RuleRegistry>,
        metadata: Arc<MetadataStore>,
        monitor: Arc<PerformanceMonitor>,
        settings: EngineSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            graph,
            registry,
            metadata,
            monitor,
            workers: Arc::new(Semaphore::new(settings.fraud_worker_pool_size)),
            settings,
        })
    }

    /// Per-transaction deadline: ten times the observed rule p99, falling
    /// back to the configured value while no history exists.
    fn evaluation_deadline(&self) -> Duration {
        match self.monitor.rule_latency_p99(1) {
            Some(p99) if !p99.is_zero() => (p99 * 10).max(Duration::from_millis(10)),
            _ => Duration::from_millis(self.settings.evaluation_deadline_ms),
        }
    }

    /// Evaluate all enabled rules for one transaction and persist the
    /// consolidated verdict. Rule failures and timeouts surface as
    /// exception verdicts, never as errors.
    pub async fn submit(&self, info: TransactionInfo) -> TransactionSummary {
        let execution_started = Instant::now();
        let rules = self.registry.enabled_rules();
        let mut pending: Vec<String> = rules.iter().map(|r| r.name().to_string()).collect();

        let mut evaluations: JoinSet<(RuleVerdict, Duration)> = JoinSet::new();
        for rule in rules {
            let txn = info.clone();
            let workers = Arc::clone(&self.workers);
            let monitor = Arc::clone(&self.monitor);
            evaluations.spawn(async move {
                let queued = Instant::now();
                let _permit = match workers.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        let perf =
                            PerformanceInfo::failed(Utc::now(), queued.elapsed());
                        return (
                            RuleVerdict::failure(rule.name(), "worker pool closed", perf),
                            queued.elapsed(),
                        );
                    }
                };
                let queue_wait = queued.elapsed();
                let verdict = rule.evaluate(&txn).await;
                monitor.record_rule(RuleSample {
                    at: Utc::now(),
                    rule: verdict.rule_name.clone(),
                    duration: verdict.perf.duration,
                    ok: verdict.perf.ok,
                });
                (verdict, queue_wait)
            });
        }

        let deadline = tokio::time::Instant::now() + self.evaluation_deadline();
        let mut verdicts = Vec::new();
        let mut max_queue_wait = Duration::ZERO;
        loop {
            match tokio::time::timeout_at(deadline, evaluations.join_next()).await {
                Ok(Some(Ok((verdict, queue_wait)))) => {
                    pending.retain(|name| name != &verdict.rule_name);
                    max_queue_wait = max_queue_wait.max(queue_wait);
                    verdicts.push(verdict);
                }
                Ok(Some(Err(join_err))) => {
                    warn!(txn_id = %info.txn_id, error = %join_err, "rule task aborted");
                }
                Ok(None) => break,
                Err(_elapsed) => {
                    evaluations.abort_all();
                    warn!(
                        txn_id = %info.txn_id,
                        outstanding = pending.len(),
                        "evaluation deadline exceeded, cancelling outstanding rules"
                    );
                    break;
                }
            }
        }

        // Cancelled or panicked rules still get accounted for
        for name in pending.drain(..) {
            let perf = PerformanceInfo::failed(Utc::now(), execution_started.elapsed());
            self.monitor.record_rule(RuleSample {
                at: Utc::now(),
                rule: name.clone(),
                duration: perf.duration,
                ok: false,
            });
            verdicts.push(RuleVerdict::failure(
                &name,
                "cancelled by per-transaction deadline",
                perf,
            ));
        }

        let execution = execution_started.elapsed();
        let mut annotation_ok = true;
        let mut annotation_latency = Duration::ZERO;

        if let Some(annotation) = consolidate(&verdicts) {
            let write_started = Instant::now();
            match self.graph.annotate_edge(&info.edge_id, &annotation).await {
                Ok(()) => {
                    annotation_latency = write_started.elapsed();
                    self.metadata
                        .record_fraud(annotation.fraud_status, info.amount);
                    debug!(
                        txn_id = %info.txn_id,
                        score = annotation.fraud_score,
                        status = annotation.fraud_status.as_str(),
                        rules = annotation.details.len(),
                        "transaction annotated"
                    );
                }
                Err(err) => {
                    annotation_ok = false;
                    error!(txn_id = %info.txn_id, error = %err, "annotation write failed");
                }
            }
            if annotation_ok {
                self.auto_flag(&info, annotation.fraud_score).await;
            }
        }

        let end_to_end = (Utc::now() - info.perf.start)
            .to_std()
            .unwrap_or(execution);
        self.monitor.record_transaction(TransactionSample {
            at: Utc::now(),
            end_to_end,
            execution,
            queue_wait: max_queue_wait,
            db: info.perf.duration + annotation_latency,
            ok: annotation_ok,
        });

        TransactionSummary { verdicts, info }
    }

    /// Promote accounts to `fraud_flag=true` when the consolidated score
    /// reaches the configured threshold.
    async fn auto_flag(&self, info: &TransactionInfo, score: u8) {
        if !self.settings.auto_flag_enabled || score < self.settings.auto_flag_fraud_score_threshold
        {
            return;
        }
        let targets: Vec<&str> = match self.settings.auto_flag_mode {
            AutoFlagMode::Sender => vec![&info.from_account_id],
            AutoFlagMode::Receiver => vec![&info.to_account_id],
            AutoFlagMode::Both => vec![&info.from_account_id, &info.to_account_id],
        };
        for account_id in targets {
            match self.graph.flag_account(account_id).await {
                Ok(()) => {
                    self.metadata.record_account_flagged();
                    debug!(account_id, score, "account auto-flagged");
                }
                Err(err) => warn!(account_id, error = %err, "auto-flag write failed"),
            }
        }
    }
}

/// Consolidate per-rule verdicts into one annotation.
///
/// Returns `None` when no rule fired; clean transactions leave no fraud
/// properties on the edge. Otherwise: score is the maximum among firing
/// rules, status the highest severity, and `details` holds one JSON-encoded
/// evidence record per firing rule in verdict order.
pub fn consolidate(verdicts: &[RuleVerdict]) -> Option<FraudAnnotation> {
    let firing: Vec<&RuleVerdict> = verdicts.iter().filter(|v| v.fired()).collect();
    if firing.is_empty() {
        return None;
    }

    let fraud_score = firing.iter().map(|v| v.score).max().unwrap_or(0);
    let fraud_status = firing
        .iter()
        .map(|v| v.status)
        .max()
        .unwrap_or(crate::models::FraudStatus::Review);
    let details = firing
        .iter()
        .filter_map(|v| v.details.as_ref())
        .filter_map(|evidence| serde_json::to_string(evidence).ok())
        .collect();

    Some(FraudAnnotation {
        fraud_score,
        fraud_status,
        eval_timestamp: Utc::now(),
        details,
    })
}
