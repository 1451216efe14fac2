//! Gremlin HTTP transport
//!
//! A narrow seam between the traversal API and the wire. Production uses
//! `HttpGraphTransport`; tests substitute scripted implementations.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use graphguard_config::GraphSettings;
use graphguard_errors::{GraphGuardError, Result};

use super::graphson::{flatten, GremlinResponse};

/// Submits one Gremlin script with bindings and returns the flattened result
#[async_trait]
pub trait GraphTransport: Send + Sync {
    async fn submit(&self, operation: &str, script: &str, bindings: Value) -> Result<Value>;
}

/// HTTP implementation against the graph server's Gremlin endpoint.
/// Transient transport faults are retried with bounded exponential backoff.
pub struct HttpGraphTransport {
    client: reqwest::Client,
    url: String,
    retry_attempts: u32,
    retry_backoff: Duration,
}

impl HttpGraphTransport {
    pub fn new(settings: &GraphSettings, pool_size: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(pool_size)
            .timeout(Duration::from_millis(settings.request_timeout_ms))
            .build()
            .map_err(|e| {
                GraphGuardError::configuration(format!("http client: {e}"), Some("graph"))
            })?;

        Ok(Self {
            client,
            url: settings.endpoint(),
            retry_attempts: settings.retry_attempts,
            retry_backoff: Duration::from_millis(settings.retry_backoff_ms),
        })
    }

    async fn submit_once(&self, operation: &str, script: &str, bindings: &Value) -> Result<Value> {
        let body = json!({
            "gremlin": script,
            "language": "gremlin-groovy",
            "bindings": bindings,
        });

        let response = self.client.post(&self.url).json(&body).send().await?;
        let http_status = response.status();
        let payload: Value = response.json().await.map_err(|e| {
            GraphGuardError::graph_unavailable(operation, format!("malformed response: {e}"), false)
        })?;

        let parsed: GremlinResponse = serde_json::from_value(payload)
            .map_err(|e| GraphGuardError::graph_unavailable(operation, e.to_string(), false))?;

        match parsed.status.code {
            200 | 204 => Ok(flatten(parsed.result.data.unwrap_or(Value::Null))),
            code => Err(classify_server_error(
                operation,
                code,
                &parsed.status.message,
                http_status.as_u16(),
            )),
        }
    }
}

#[async_trait]
impl GraphTransport for HttpGraphTransport {
    async fn submit(&self, operation: &str, script: &str, bindings: Value) -> Result<Value> {
        let mut attempt = 0;
        loop {
            match self.submit_once(operation, script, &bindings).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.retry_attempts => {
                    let backoff = self.retry_backoff * 2u32.saturating_pow(attempt);
                    warn!(
                        operation,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "transient graph fault, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) => {
                    debug!(operation, error = %err, "graph request failed");
                    return Err(err);
                }
            }
        }
    }
}

/// Map a non-OK Gremlin status to an error kind.
///
/// Duplicate-identity violations surface as Conflict (client-generated UUIDs
/// colliding is fatal to the caller); server overload codes stay retryable.
fn classify_server_error(
    operation: &str,
    gremlin_code: u16,
    message: &str,
    http_status: u16,
) -> GraphGuardError {
    let lowered = message.to_lowercase();
    if lowered.contains("already exists") || lowered.contains("duplicate") {
        return GraphGuardError::conflict("transaction", message.to_string());
    }

    // 597: script evaluation error; 598: server timeout; 599: serialization
    let retryable = gremlin_code == 598 || http_status == 503;
    GraphGuardError::graph_unavailable(
        operation,
        format!("server status {gremlin_code}: {message}"),
        retryable,
    )
}
