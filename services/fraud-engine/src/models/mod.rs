//! Data models for the fraud detection engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Edge property names persisted in the graph. These are wire names shared
/// with the dashboard and the seeded data set; renaming them is a breaking
/// change.
pub mod props {
    pub const TXN_ID: &str = "txn_id";
    pub const AMOUNT: &str = "amount";
    pub const CURRENCY: &str = "currency";
    pub const TIMESTAMP: &str = "timestamp";
    pub const TYPE: &str = "type";
    pub const STATUS: &str = "status";
    pub const LOCATION: &str = "location";
    pub const GEN_TYPE: &str = "gen_type";
    pub const IS_FRAUD: &str = "is_fraud";
    pub const FRAUD_SCORE: &str = "fraud_score";
    pub const FRAUD_STATUS: &str = "fraud_status";
    pub const EVAL_TIMESTAMP: &str = "eval_timestamp";
    pub const DETAILS: &str = "details";
    pub const FRAUD_FLAG: &str = "fraud_flag";
}

/// Edge labels in the property graph
pub mod labels {
    pub const TRANSACTS: &str = "TRANSACTS";
    pub const OWNS: &str = "OWNS";
    pub const USES: &str = "USES";
}

/// Opaque graph element identifier, as returned by the traversal driver
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeId(pub String);

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Transfer,
    Payment,
    Deposit,
    Withdrawal,
}

impl TransactionType {
    pub const ALL: [TransactionType; 4] = [
        TransactionType::Transfer,
        TransactionType::Payment,
        TransactionType::Deposit,
        TransactionType::Withdrawal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Transfer => "transfer",
            TransactionType::Payment => "payment",
            TransactionType::Deposit => "deposit",
            TransactionType::Withdrawal => "withdrawal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GenerationType {
    Auto,
    Manual,
}

impl GenerationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationType::Auto => "AUTO",
            GenerationType::Manual => "MANUAL",
        }
    }
}

/// Consolidated verdict severity. Variant order defines the ranking used
/// when consolidating multiple firing rules: cleared < review < blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FraudStatus {
    Cleared,
    Review,
    Blocked,
}

impl FraudStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FraudStatus::Cleared => "cleared",
            FraudStatus::Review => "review",
            FraudStatus::Blocked => "blocked",
        }
    }
}

/// Timing of a single operation
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PerformanceInfo {
    pub start: DateTime<Utc>,
    pub duration: Duration,
    pub ok: bool,
}

impl PerformanceInfo {
    pub fn ok(start: DateTime<Utc>, duration: Duration) -> Self {
        Self {
            start,
            duration,
            ok: true,
        }
    }

    pub fn failed(start: DateTime<Utc>, duration: Duration) -> Self {
        Self {
            start,
            duration,
            ok: false,
        }
    }
}

/// Properties written when a transaction edge is created
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionProperties {
    pub txn_id: Uuid,
    pub amount: f64,
    pub currency: String,
    pub timestamp: DateTime<Utc>,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub location: String,
    pub gen_type: GenerationType,
}

/// Consolidated fraud facts written onto the transaction edge when at least
/// one rule fired. Absence of these properties denotes a clean transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudAnnotation {
    pub fraud_score: u8,
    pub fraud_status: FraudStatus,
    pub eval_timestamp: DateTime<Utc>,
    /// One JSON-encoded evidence record per firing rule
    pub details: Vec<String>,
}

/// A successfully created transaction, handed from the generator to the
/// fraud engine. Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionInfo {
    pub success: bool,
    pub edge_id: EdgeId,
    pub txn_id: Uuid,
    pub from_account_id: String,
    pub to_account_id: String,
    pub amount: f64,
    pub perf: PerformanceInfo,
}

/// Per-rule evidence persisted (JSON-encoded) into the `details` property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub flagged_entities: Vec<String>,
    pub sender: String,
    pub receiver: String,
    pub connected_accounts_checked: u64,
    pub detection_time: DateTime<Utc>,
    pub rule_name: String,
}

/// Outcome of one rule invocation for one transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleVerdict {
    pub rule_name: String,
    pub is_fraud: bool,
    pub score: u8,
    pub reason: String,
    pub status: FraudStatus,
    pub details: Option<EvidenceRecord>,
    pub exception: bool,
    pub perf: PerformanceInfo,
}

impl RuleVerdict {
    /// A rule fired when it marked the transaction fraudulent with a
    /// non-cleared status.
    pub fn fired(&self) -> bool {
        self.is_fraud && self.status != FraudStatus::Cleared
    }

    /// Clean verdict: the rule ran and found nothing
    pub fn clean(rule_name: &str, reason: impl Into<String>, perf: PerformanceInfo) -> Self {
        Self {
            rule_name: rule_name.to_string(),
            is_fraud: false,
            score: 0,
            reason: reason.into(),
            status: FraudStatus::Cleared,
            details: None,
            exception: false,
            perf,
        }
    }

    /// Failure verdict: the rule errored or was cancelled. Never bubbles up;
    /// recorded as a failed sample instead.
    pub fn failure(rule_name: &str, reason: impl Into<String>, perf: PerformanceInfo) -> Self {
        Self {
            rule_name: rule_name.to_string(),
            is_fraud: false,
            score: 0,
            reason: reason.into(),
            status: FraudStatus::Cleared,
            details: None,
            exception: true,
            perf,
        }
    }
}

/// All verdicts for one transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionSummary {
    pub verdicts: Vec<RuleVerdict>,
    pub info: TransactionInfo,
}

impl TransactionSummary {
    pub fn firing_rules(&self) -> impl Iterator<Item = &RuleVerdict> {
        self.verdicts.iter().filter(|v| v.fired())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RuleComplexity {
    Low,
    Medium,
    High,
}

/// Static rule metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDescriptor {
    pub name: String,
    pub description: String,
    pub key_indicators: Vec<String>,
    pub use_case: String,
    pub complexity: RuleComplexity,
    pub enabled: bool,
    pub run_async: bool,
}

/// Rule listing entry returned by the control API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleStateView {
    pub name: String,
    pub description: String,
    pub complexity: RuleComplexity,
    pub enabled: bool,
}
