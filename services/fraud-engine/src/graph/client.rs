//! Graph client
//!
//! Two physically separate pools against the same Gremlin endpoint: "main"
//! carries transaction writes and fact persistence, "fraud" carries rule
//! traversals. Rule load can therefore never starve generator writes.

use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use graphguard_config::GraphSettings;
use graphguard_errors::{GraphGuardError, Result};

use crate::models::{labels, props, EdgeId, FraudAnnotation, TransactionProperties};

use super::graphson::id_to_string;
use super::transport::{GraphTransport, HttpGraphTransport};

/// One bounded connection pool: a transport plus an in-process request cap
struct GraphPool {
    name: &'static str,
    transport: Arc<dyn GraphTransport>,
    permits: Arc<Semaphore>,
}

impl GraphPool {
    async fn submit(&self, operation: &str, script: &str, bindings: Value) -> Result<Value> {
        let _permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| GraphGuardError::internal(format!("{} pool closed", self.name)))?;
        self.transport.submit(operation, script, bindings).await
    }
}

/// Traversal API over the two pools
pub struct GraphClient {
    main: GraphPool,
    fraud: GraphPool,
}

impl GraphClient {
    /// Connect both pools per the configured sizes
    pub fn connect(settings: &GraphSettings) -> Result<Self> {
        let main_transport =
            HttpGraphTransport::new(settings, settings.main_connection_pool_size)?;
        let fraud_transport =
            HttpGraphTransport::new(settings, settings.fraud_connection_pool_size)?;
        info!(
            endpoint = %settings.endpoint(),
            main_limit = settings.main_in_process_limit(),
            fraud_limit = settings.fraud_in_process_limit(),
            "graph client connected"
        );
        Ok(Self::with_transports(
            Arc::new(main_transport),
            Arc::new(fraud_transport),
            settings,
        ))
    }

    /// Build a client over explicit transports. Tests use this to substitute
    /// scripted transports for the wire.
    pub fn with_transports(
        main: Arc<dyn GraphTransport>,
        fraud: Arc<dyn GraphTransport>,
        settings: &GraphSettings,
    ) -> Self {
        Self {
            main: GraphPool {
                name: "main",
                transport: main,
                permits: Arc::new(Semaphore::new(settings.main_in_process_limit())),
            },
            fraud: GraphPool {
                name: "fraud",
                transport: fraud,
                permits: Arc::new(Semaphore::new(settings.fraud_in_process_limit())),
            },
        }
    }

    /// Append a `TRANSACTS` edge between two existing account vertices and
    /// return its id. `NotFound` when either endpoint vertex is absent.
    pub async fn create_transaction_edge(
        &self,
        from_account_id: &str,
        to_account_id: &str,
        txn: &TransactionProperties,
    ) -> Result<EdgeId> {
        let script = "g.V(from_id).as('s').V(to_id).addE(edge_label).from('s')\
             .property(p_txn_id_key, p_txn_id)\
             .property(p_amount_key, p_amount)\
             .property(p_currency_key, p_currency)\
             .property(p_timestamp_key, p_timestamp)\
             .property(p_type_key, p_type)\
             .property(p_status_key, p_status)\
             .property(p_location_key, p_location)\
             .property(p_gen_type_key, p_gen_type)\
             .id()";
        let bindings = json!({
            "from_id": from_account_id,
            "to_id": to_account_id,
            "edge_label": labels::TRANSACTS,
            "p_txn_id_key": props::TXN_ID,
            "p_txn_id": txn.txn_id.to_string(),
            "p_amount_key": props::AMOUNT,
            "p_amount": txn.amount,
            "p_currency_key": props::CURRENCY,
            "p_currency": txn.currency,
            "p_timestamp_key": props::TIMESTAMP,
            "p_timestamp": txn.timestamp.timestamp_millis(),
            "p_type_key": props::TYPE,
            "p_type": txn.transaction_type.as_str(),
            "p_status_key": props::STATUS,
            "p_status": txn.status.as_str(),
            "p_location_key": props::LOCATION,
            "p_location": txn.location,
            "p_gen_type_key": props::GEN_TYPE,
            "p_gen_type": txn.gen_type.as_str(),
        });

        let data = self
            .main
            .submit("createTransactionEdge", script, bindings)
            .await?;
        match first_element(&data) {
            Some(id) => Ok(EdgeId(id_to_string(id))),
            None => Err(GraphGuardError::not_found(
                "account",
                format!("{from_account_id} or {to_account_id}"),
            )),
        }
    }

    /// Idempotent property overwrite of the consolidated fraud facts
    pub async fn annotate_edge(&self, edge_id: &EdgeId, annotation: &FraudAnnotation) -> Result<()> {
        let script = "g.E(edge_id)\
             .property(p_is_fraud_key, true)\
             .property(p_score_key, p_score)\
             .property(p_status_key, p_status)\
             .property(p_eval_key, p_eval)\
             .property(p_details_key, p_details)\
             .id()";
        let bindings = json!({
            "edge_id": edge_id.0,
            "p_is_fraud_key": props::IS_FRAUD,
            "p_score_key": props::FRAUD_SCORE,
            "p_score": annotation.fraud_score,
            "p_status_key": props::FRAUD_STATUS,
            "p_status": annotation.fraud_status.as_str(),
            "p_eval_key": props::EVAL_TIMESTAMP,
            "p_eval": annotation.eval_timestamp.timestamp_millis(),
            "p_details_key": props::DETAILS,
            "p_details": annotation.details,
        });

        let data = self.main.submit("annotateEdge", script, bindings).await?;
        match first_element(&data) {
            Some(_) => Ok(()),
            None => Err(GraphGuardError::not_found("edge", edge_id.to_string())),
        }
    }

    /// Promote an account vertex to `fraud_flag=true`
    pub async fn flag_account(&self, account_id: &str) -> Result<()> {
        let script = "g.V(account_id).property(flag_key, true).id()";
        let bindings = json!({
            "account_id": account_id,
            "flag_key": props::FRAUD_FLAG,
        });
        let data = self.main.submit("flagAccount", script, bindings).await?;
        match first_element(&data) {
            Some(_) => Ok(()),
            None => Err(GraphGuardError::not_found("account", account_id)),
        }
    }

    /// Fetch the named fields for a set of vertices in one round trip.
    /// Returns a map keyed by vertex id; absent vertices are simply missing.
    pub async fn get_element_map(
        &self,
        vertex_ids: &[String],
        fields: &[&str],
    ) -> Result<HashMap<String, Map<String, Value>>> {
        // Field names are static rule constants, safe to inline
        let field_list = fields
            .iter()
            .map(|f| format!("'{f}'"))
            .collect::<Vec<_>>()
            .join(", ");
        let script = format!("g.V(vertex_ids).elementMap({field_list})");
        let bindings = json!({ "vertex_ids": vertex_ids });

        let data = self.fraud.submit("getElementMap", &script, bindings).await?;
        let mut result = HashMap::new();
        if let Value::Array(rows) = data {
            for row in rows {
                if let Value::Object(map) = row {
                    if let Some(id) = map.get("id") {
                        result.insert(id_to_string(id), map.clone());
                    }
                }
            }
        }
        Ok(result)
    }

    /// Run a rule projection anchored at a transaction edge over the fraud
    /// pool. The script must reference the `edge_id` binding.
    pub async fn project(
        &self,
        operation: &str,
        edge_id: &EdgeId,
        script: &str,
        mut extra_bindings: Map<String, Value>,
    ) -> Result<Value> {
        extra_bindings.insert("edge_id".to_string(), Value::String(edge_id.0.clone()));
        self.fraud
            .submit(operation, script, Value::Object(extra_bindings))
            .await
    }

    /// Best-effort admin read of the server's index catalog
    pub async fn inspect_indexes(&self) -> Result<String> {
        let data = self
            .main
            .submit("inspectIndexes", "g.call('index.list')", json!({}))
            .await?;
        Ok(serde_json::to_string_pretty(&data)?)
    }

    /// Request a vertex index over `fraud_flag`
    pub async fn create_fraud_flag_index(&self) -> Result<String> {
        let script = "g.call('index.create').with('element', 'vertex').with('key', flag_key)";
        let bindings = json!({ "flag_key": props::FRAUD_FLAG });
        let data = self
            .main
            .submit("createFraudFlagIndex", script, bindings)
            .await?;
        Ok(serde_json::to_string(&data)?)
    }

    /// List the most recent transaction edges for the dashboard view
    pub async fn recent_transactions(&self, limit: usize) -> Result<Vec<Map<String, Value>>> {
        let script = "g.E().hasLabel(edge_label).order().by(ts_key, desc).limit(max_rows).elementMap()";
        let bindings = json!({
            "edge_label": labels::TRANSACTS,
            "ts_key": props::TIMESTAMP,
            "max_rows": limit,
        });
        let data = self
            .main
            .submit("recentTransactions", script, bindings)
            .await?;

        let mut rows = Vec::new();
        if let Value::Array(items) = data {
            for item in items {
                if let Value::Object(map) = item {
                    rows.push(map);
                }
            }
        }
        Ok(rows)
    }

    /// Seed the demo data set: accounts A1..A5, user U1 owning A3, device D1
    /// used by U1, and a historical transaction path. Idempotent.
    pub async fn seed_sample_data(&self) -> Result<u64> {
        let mut script = String::new();
        for account in ["A1", "A2", "A3", "A4", "A5"] {
            script.push_str(&format!(
                "g.V('{account}').fold().coalesce(unfold(), \
                 addV('account').property(id, '{account}')\
                 .property('balance', 1000.0d).property('type', 'checking')).next();\n"
            ));
        }
        script.push_str(
            "g.V('U1').fold().coalesce(unfold(), addV('user').property(id, 'U1')).next();\n\
             g.V('D1').fold().coalesce(unfold(), addV('device').property(id, 'D1')).next();\n\
             g.V('U1').as('u').V('A3')\
             .coalesce(inE('OWNS').where(outV().as('u')), addE('OWNS').from('u')).next();\n\
             g.V('U1').as('u').V('D1')\
             .coalesce(inE('USES').where(outV().as('u')), addE('USES').from('u')).next();\n\
             g.V().count()",
        );

        let data = self.main.submit("seedSampleData", &script, json!({})).await?;
        let count = first_element(&data)
            .and_then(Value::as_u64)
            .unwrap_or_default();
        debug!(vertices = count, "sample data seeded");
        Ok(count)
    }
}

/// First element of a flattened traversal result list
fn first_element(data: &Value) -> Option<&Value> {
    match data {
        Value::Array(items) => items.first(),
        Value::Null => None,
        other => Some(other),
    }
}
