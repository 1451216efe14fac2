//! Direct counterparty rule: either side of the transaction is flagged

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

use graphguard_errors::{GraphGuardError, Result};

use crate::graph::GraphClient;
use crate::models::{
    props, EvidenceRecord, FraudStatus, PerformanceInfo, RuleComplexity, RuleDescriptor,
    RuleVerdict, TransactionInfo,
};

use super::FraudRule;

pub const NAME: &str = "flagged_counterparty";

pub struct FlaggedCounterpartyRule {
    graph: Arc<GraphClient>,
    descriptor: RuleDescriptor,
}

impl FlaggedCounterpartyRule {
    pub fn new(graph: Arc<GraphClient>) -> Self {
        Self {
            graph,
            descriptor: RuleDescriptor {
                name: NAME.to_string(),
                description: "Sender or receiver account carries a fraud flag".to_string(),
                key_indicators: vec!["fraud_flag on either counterparty".to_string()],
                use_case: "Blocks transfers touching accounts already known to be fraudulent"
                    .to_string(),
                complexity: RuleComplexity::Low,
                enabled: true,
                run_async: true,
            },
        }
    }
}

fn is_flagged(fields: &serde_json::Map<String, Value>) -> bool {
    fields
        .get(props::FRAUD_FLAG)
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

#[async_trait]
impl FraudRule for FlaggedCounterpartyRule {
    fn descriptor(&self) -> &RuleDescriptor {
        &self.descriptor
    }

    async fn try_evaluate(&self, txn: &TransactionInfo) -> Result<RuleVerdict> {
        let start = Utc::now();
        let begun = Instant::now();

        let ids = [txn.from_account_id.clone(), txn.to_account_id.clone()];
        let elements = self.graph.get_element_map(&ids, &[props::FRAUD_FLAG]).await?;

        // A missing endpoint vertex is a rule error, not a clean verdict
        let sender = elements
            .get(&txn.from_account_id)
            .ok_or_else(|| GraphGuardError::not_found("account", txn.from_account_id.clone()))?;
        let receiver = elements
            .get(&txn.to_account_id)
            .ok_or_else(|| GraphGuardError::not_found("account", txn.to_account_id.clone()))?;

        let mut flagged_entities = Vec::new();
        if is_flagged(sender) {
            flagged_entities.push(txn.from_account_id.clone());
        }
        if is_flagged(receiver) {
            flagged_entities.push(txn.to_account_id.clone());
        }

        let perf = PerformanceInfo::ok(start, begun.elapsed());
        if flagged_entities.is_empty() {
            return Ok(RuleVerdict::clean(NAME, "no flagged counterparty", perf));
        }

        let reason = format!("flagged counterparty: {}", flagged_entities.join(", "));
        let evidence = EvidenceRecord {
            flagged_entities,
            sender: txn.from_account_id.clone(),
            receiver: txn.to_account_id.clone(),
            connected_accounts_checked: 2,
            detection_time: Utc::now(),
            rule_name: NAME.to_string(),
        };

        Ok(RuleVerdict {
            rule_name: NAME.to_string(),
            is_fraud: true,
            score: 100,
            reason,
            status: FraudStatus::Blocked,
            details: Some(evidence),
            exception: false,
            perf,
        })
    }
}
