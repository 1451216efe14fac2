//! Core error types for GraphGuard services

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for GraphGuard services
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum GraphGuardError {
    /// Graph server transport errors (timeouts, disconnects, 5xx responses)
    #[error("Graph unavailable during {operation}: {message}")]
    GraphUnavailable {
        message: String,
        operation: String,
        retryable: bool,
        code: String,
    },

    /// Resource not found errors (missing vertex, unknown rule)
    #[error("Resource not found: {resource_type} with ID {resource_id}")]
    NotFound {
        resource_type: String,
        resource_id: String,
        code: String,
    },

    /// Duplicate-identity errors (transaction id collision)
    #[error("Resource already exists: {resource_type} with identifier {identifier}")]
    Conflict {
        resource_type: String,
        identifier: String,
        code: String,
    },

    /// Lifecycle violations (start while running, stop while stopped)
    #[error("Invalid state for {operation}: currently {current}")]
    InvalidState {
        operation: String,
        current: String,
        code: String,
    },

    /// Parameter range violations (zero or excessive target rate)
    #[error("Value out of range for {field}: {message}")]
    OutOfRange {
        field: String,
        message: String,
        code: String,
    },

    /// Configuration errors; these fail startup loudly
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        key: Option<String>,
        code: String,
    },

    /// Counter store errors (Redis faults during flush/read)
    #[error("KV store error during {operation}: {message}")]
    KvStore {
        message: String,
        operation: String,
        retryable: bool,
        code: String,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
        code: String,
    },

    /// Operation deadline exceeded
    #[error("Operation timed out: {operation} after {timeout_ms}ms")]
    Timeout {
        operation: String,
        timeout_ms: u64,
        code: String,
    },

    /// Internal errors that indicate a bug rather than an environmental fault
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        source_detail: Option<String>,
        code: String,
    },

    /// Unrecoverable faults; the orchestrator drains and exits on these
    #[error("Fatal error: {message}")]
    Fatal {
        message: String,
        code: String,
    },
}

impl GraphGuardError {
    /// Get the error code
    pub fn code(&self) -> &str {
        match self {
            Self::GraphUnavailable { code, .. } => code,
            Self::NotFound { code, .. } => code,
            Self::Conflict { code, .. } => code,
            Self::InvalidState { code, .. } => code,
            Self::OutOfRange { code, .. } => code,
            Self::Configuration { code, .. } => code,
            Self::KvStore { code, .. } => code,
            Self::Serialization { code, .. } => code,
            Self::Timeout { code, .. } => code,
            Self::Internal { code, .. } => code,
            Self::Fatal { code, .. } => code,
        }
    }

    /// Check if the error is worth retrying within the same operation
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::GraphUnavailable { retryable, .. } => *retryable,
            Self::KvStore { retryable, .. } => *retryable,
            Self::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Check if the error must stop the engine
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }

    /// Graph transport failure during the named operation
    pub fn graph_unavailable(operation: &str, message: impl Into<String>, retryable: bool) -> Self {
        Self::GraphUnavailable {
            message: message.into(),
            operation: operation.to_string(),
            retryable,
            code: "GRAPH_UNAVAILABLE".to_string(),
        }
    }

    pub fn not_found(resource_type: &str, resource_id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type: resource_type.to_string(),
            resource_id: resource_id.into(),
            code: "RESOURCE_NOT_FOUND".to_string(),
        }
    }

    pub fn conflict(resource_type: &str, identifier: impl Into<String>) -> Self {
        Self::Conflict {
            resource_type: resource_type.to_string(),
            identifier: identifier.into(),
            code: "RESOURCE_CONFLICT".to_string(),
        }
    }

    pub fn invalid_state(operation: &str, current: impl Into<String>) -> Self {
        Self::InvalidState {
            operation: operation.to_string(),
            current: current.into(),
            code: "INVALID_STATE".to_string(),
        }
    }

    pub fn out_of_range(field: &str, message: impl Into<String>) -> Self {
        Self::OutOfRange {
            field: field.to_string(),
            message: message.into(),
            code: "OUT_OF_RANGE".to_string(),
        }
    }

    pub fn configuration(message: impl Into<String>, key: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            key: key.map(str::to_string),
            code: "CONFIGURATION_ERROR".to_string(),
        }
    }

    pub fn kv_store(operation: &str, message: impl Into<String>, retryable: bool) -> Self {
        Self::KvStore {
            message: message.into(),
            operation: operation.to_string(),
            retryable,
            code: "KV_STORE_ERROR".to_string(),
        }
    }

    pub fn timeout(operation: &str, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.to_string(),
            timeout_ms,
            code: "OPERATION_TIMEOUT".to_string(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source_detail: None,
            code: "INTERNAL_ERROR".to_string(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
            code: "FATAL_ERROR".to_string(),
        }
    }
}

impl From<reqwest::Error> for GraphGuardError {
    fn from(err: reqwest::Error) -> Self {
        let retryable = err.is_timeout() || err.is_connect() || err.is_request();
        let operation = err
            .url()
            .map(|u| u.path().to_string())
            .unwrap_or_else(|| "request".to_string());
        Self::graph_unavailable(&operation, err.to_string(), retryable)
    }
}

impl From<redis::RedisError> for GraphGuardError {
    fn from(err: redis::RedisError) -> Self {
        let retryable =
            err.is_timeout() || err.is_connection_refusal() || err.is_connection_dropped();
        Self::kv_store("redis", err.to_string(), retryable)
    }
}

impl From<serde_json::Error> for GraphGuardError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
            code: "SERIALIZATION_ERROR".to_string(),
        }
    }
}

/// Result type alias for GraphGuard operations
pub type Result<T> = std::result::Result<T, GraphGuardError>;
