//! Transactional neighborhood rule: a flagged account within two hops

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use graphguard_errors::{GraphGuardError, Result};

use crate::graph::GraphClient;
use crate::models::{
    labels, props, EvidenceRecord, FraudStatus, PerformanceInfo, RuleComplexity, RuleDescriptor,
    RuleVerdict, TransactionInfo,
};

use super::FraudRule;

pub const NAME: &str = "flagged_transaction_network";

const BASE_SCORE: u32 = 75;
const SCORE_PER_NEIGHBOR: u32 = 5;
const SCORE_CAP: u32 = 95;
const BLOCK_THRESHOLD: u8 = 90;

/// One projection from the new edge: for each endpoint, the distinct flagged
/// accounts reachable over its `TRANSACTS` edges, plus how many accounts
/// were examined.
const PROJECTION: &str = "g.E(edge_id)\
     .project('sender_hits', 'receiver_hits', 'sender_checked', 'receiver_checked')\
     .by(outV().bothE(edge_label).bothV().has(flag_key, true).dedup().id().fold())\
     .by(inV().bothE(edge_label).bothV().has(flag_key, true).dedup().id().fold())\
     .by(outV().bothE(edge_label).bothV().dedup().count())\
     .by(inV().bothE(edge_label).bothV().dedup().count())";

pub struct FlaggedTransactionNetworkRule {
    graph: Arc<GraphClient>,
    descriptor: RuleDescriptor,
}

impl FlaggedTransactionNetworkRule {
    pub fn new(graph: Arc<GraphClient>) -> Self {
        Self {
            graph,
            descriptor: RuleDescriptor {
                name: NAME.to_string(),
                description: "A flagged account transacts with either endpoint".to_string(),
                key_indicators: vec![
                    "fraud_flag within the 2-hop transaction neighborhood".to_string(),
                ],
                use_case: "Catches accounts laundering through one intermediary".to_string(),
                complexity: RuleComplexity::Medium,
                enabled: true,
                run_async: true,
            },
        }
    }

    /// Score grows with each distinct flagged neighbor and saturates below
    /// the direct-counterparty score.
    fn score_for(neighbor_count: usize) -> u8 {
        BASE_SCORE
            .saturating_add(SCORE_PER_NEIGHBOR * neighbor_count as u32)
            .min(SCORE_CAP) as u8
    }
}

fn id_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(crate::graph::graphson::id_to_string)
            .collect(),
        _ => Vec::new(),
    }
}

#[async_trait]
impl FraudRule for FlaggedTransactionNetworkRule {
    fn descriptor(&self) -> &RuleDescriptor {
        &self.descriptor
    }

    async fn try_evaluate(&self, txn: &TransactionInfo) -> Result<RuleVerdict> {
        let start = Utc::now();
        let begun = Instant::now();

        let mut bindings = Map::new();
        bindings.insert("edge_label".to_string(), json!(labels::TRANSACTS));
        bindings.insert("flag_key".to_string(), json!(props::FRAUD_FLAG));
        let data = self
            .graph
            .project(NAME, &txn.edge_id, PROJECTION, bindings)
            .await?;

        let row = match &data {
            Value::Array(rows) => rows.first(),
            _ => None,
        }
        .and_then(Value::as_object)
        .ok_or_else(|| GraphGuardError::not_found("edge", txn.edge_id.to_string()))?;

        let mut neighbors: BTreeSet<String> = BTreeSet::new();
        neighbors.extend(id_list(row.get("sender_hits")));
        neighbors.extend(id_list(row.get("receiver_hits")));
        // The endpoints themselves are the direct-counterparty rule's concern
        neighbors.remove(&txn.from_account_id);
        neighbors.remove(&txn.to_account_id);

        let checked = row
            .get("sender_checked")
            .and_then(Value::as_u64)
            .unwrap_or(0)
            + row
                .get("receiver_checked")
                .and_then(Value::as_u64)
                .unwrap_or(0);

        let perf = PerformanceInfo::ok(start, begun.elapsed());
        if neighbors.is_empty() {
            return Ok(RuleVerdict::clean(
                NAME,
                "no flagged transactional neighbor",
                perf,
            ));
        }

        let score = Self::score_for(neighbors.len());
        let status = if score >= BLOCK_THRESHOLD {
            FraudStatus::Blocked
        } else {
            FraudStatus::Review
        };
        let reason = format!(
            "{} flagged account(s) within the transaction neighborhood",
            neighbors.len()
        );
        let evidence = EvidenceRecord {
            flagged_entities: neighbors.into_iter().collect(),
            sender: txn.from_account_id.clone(),
            receiver: txn.to_account_id.clone(),
            connected_accounts_checked: checked,
            detection_time: Utc::now(),
            rule_name: NAME.to_string(),
        };

        Ok(RuleVerdict {
            rule_name: NAME.to_string(),
            is_fraud: true,
            score,
            reason,
            status,
            details: Some(evidence),
            exception: false,
            perf,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_scales_and_saturates() {
        assert_eq!(FlaggedTransactionNetworkRule::score_for(1), 80);
        assert_eq!(FlaggedTransactionNetworkRule::score_for(3), 90);
        assert_eq!(FlaggedTransactionNetworkRule::score_for(4), 95);
        assert_eq!(FlaggedTransactionNetworkRule::score_for(100), 95);
    }

    #[test]
    fn test_block_threshold_boundary() {
        assert!(FlaggedTransactionNetworkRule::score_for(3) >= BLOCK_THRESHOLD);
        assert!(FlaggedTransactionNetworkRule::score_for(2) < BLOCK_THRESHOLD);
    }
}
