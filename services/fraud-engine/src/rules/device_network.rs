//! Device network rule: a flagged device reachable through the ownership
//! and transaction network of the two endpoints

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Instant;

use graphguard_errors::{GraphGuardError, Result};

use crate::graph::graphson::id_to_string;
use crate::graph::GraphClient;
use crate::models::{
    labels, props, EvidenceRecord, FraudStatus, PerformanceInfo, RuleComplexity, RuleDescriptor,
    RuleVerdict, TransactionInfo,
};

use super::FraudRule;

pub const NAME: &str = "flagged_device_network";

const SCORE: u8 = 85;

/// One projection from the new edge: accounts the endpoints transact with,
/// their owners, and the flagged devices those owners use.
const PROJECTION: &str = "g.E(edge_id)\
     .project('devices', 'connected')\
     .by(bothV().both(edge_label).dedup().in(owns_label).out(uses_label)\
        .has(flag_key, true).dedup().id().fold())\
     .by(bothV().both(edge_label).dedup().count())";

pub struct FlaggedDeviceNetworkRule {
    graph: Arc<GraphClient>,
    descriptor: RuleDescriptor,
}

impl FlaggedDeviceNetworkRule {
    pub fn new(graph: Arc<GraphClient>) -> Self {
        Self {
            graph,
            descriptor: RuleDescriptor {
                name: NAME.to_string(),
                description: "A flagged device is used by owners of connected accounts"
                    .to_string(),
                key_indicators: vec![
                    "fraud_flag on devices across OWNS/USES/TRANSACTS".to_string(),
                ],
                use_case: "Surfaces fraud rings sharing hardware behind separate accounts"
                    .to_string(),
                complexity: RuleComplexity::High,
                enabled: true,
                run_async: true,
            },
        }
    }
}

#[async_trait]
impl FraudRule for FlaggedDeviceNetworkRule {
    fn descriptor(&self) -> &RuleDescriptor {
        &self.descriptor
    }

    async fn try_evaluate(&self, txn: &TransactionInfo) -> Result<RuleVerdict> {
        let start = Utc::now();
        let begun = Instant::now();

        let mut bindings = Map::new();
        bindings.insert("edge_label".to_string(), json!(labels::TRANSACTS));
        bindings.insert("owns_label".to_string(), json!(labels::OWNS));
        bindings.insert("uses_label".to_string(), json!(labels::USES));
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

        let devices: Vec<String> = match row.get("devices") {
            Some(Value::Array(items)) => items.iter().map(id_to_string).collect(),
            _ => Vec::new(),
        };
        let connected = row.get("connected").and_then(Value::as_u64).unwrap_or(0);

        let perf = PerformanceInfo::ok(start, begun.elapsed());
        if devices.is_empty() {
            return Ok(RuleVerdict::clean(
                NAME,
                "no flagged device in the ownership network",
                perf,
            ));
        }

        let reason = format!(
            "flagged device(s) {} reachable via {} connected account(s)",
            devices.join(", "),
            connected
        );
        let evidence = EvidenceRecord {
            flagged_entities: devices,
            sender: txn.from_account_id.clone(),
            receiver: txn.to_account_id.clone(),
            connected_accounts_checked: connected,
            detection_time: Utc::now(),
            rule_name: NAME.to_string(),
        };

        Ok(RuleVerdict {
            rule_name: NAME.to_string(),
            is_fraud: true,
            score: SCORE,
            reason,
            status: FraudStatus::Review,
            details: Some(evidence),
            exception: false,
            perf,
        })
    }
}
