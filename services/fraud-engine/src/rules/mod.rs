//! Rule framework
//!
//! Rules take an opaque transaction in and produce a verdict out; traversal
//! work is delegated to the graph server over the fraud pool. A rule
//! evaluation never errors out of the framework: failures become verdicts
//! with `exception=true` and a cleared status.

pub mod counterparty;
pub mod device_network;
pub mod registry;
pub mod transaction_network;

pub use counterparty::FlaggedCounterpartyRule;
pub use device_network::FlaggedDeviceNetworkRule;
pub use registry::RuleRegistry;
pub use transaction_network::FlaggedTransactionNetworkRule;

use async_trait::async_trait;
use chrono::Utc;
use std::time::Instant;
use tracing::warn;

use graphguard_errors::Result;

use crate::models::{PerformanceInfo, RuleDescriptor, RuleVerdict, TransactionInfo};

#[async_trait]
pub trait FraudRule: Send + Sync {
    /// Static rule metadata
    fn descriptor(&self) -> &RuleDescriptor;

    fn name(&self) -> &str {
        &self.descriptor().name
    }

    /// Rule body; may fail with a typed error
    async fn try_evaluate(&self, txn: &TransactionInfo) -> Result<RuleVerdict>;

    /// Infallible wrapper used by the engine. Errors are captured as
    /// exception verdicts with a failed performance sample.
    async fn evaluate(&self, txn: &TransactionInfo) -> RuleVerdict {
        let start = Utc::now();
        let begun = Instant::now();
        match self.try_evaluate(txn).await {
            Ok(verdict) => verdict,
            Err(err) => {
                warn!(
                    rule = self.name(),
                    txn_id = %txn.txn_id,
                    error = %err,
                    "rule evaluation failed"
                );
                RuleVerdict::failure(
                    self.name(),
                    err.to_string(),
                    PerformanceInfo::failed(start, begun.elapsed()),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EdgeId, RuleComplexity};
    use graphguard_errors::GraphGuardError;
    use std::time::Duration;
    use uuid::Uuid;

    struct FailingRule {
        descriptor: RuleDescriptor,
    }

    #[async_trait]
    impl FraudRule for FailingRule {
        fn descriptor(&self) -> &RuleDescriptor {
            &self.descriptor
        }

        async fn try_evaluate(&self, _txn: &TransactionInfo) -> Result<RuleVerdict> {
            Err(GraphGuardError::graph_unavailable(
                "project",
                "connection reset",
                true,
            ))
        }
    }

    fn txn() -> TransactionInfo {
        TransactionInfo {
            success: true,
            edge_id: EdgeId("e-1".to_string()),
            txn_id: Uuid::new_v4(),
            from_account_id: "A1".to_string(),
            to_account_id: "A2".to_string(),
            amount: 10.0,
            perf: PerformanceInfo::ok(Utc::now(), Duration::from_millis(1)),
        }
    }

    #[tokio::test]
    async fn test_errors_become_exception_verdicts() {
        let rule = FailingRule {
            descriptor: RuleDescriptor {
                name: "always_fails".to_string(),
                description: "test".to_string(),
                key_indicators: vec![],
                use_case: "test".to_string(),
                complexity: RuleComplexity::Low,
                enabled: true,
                run_async: true,
            },
        };

        let verdict = rule.evaluate(&txn()).await;
        assert!(verdict.exception);
        assert!(!verdict.fired());
        assert!(!verdict.perf.ok);
        assert_eq!(verdict.rule_name, "always_fails");
    }
}
