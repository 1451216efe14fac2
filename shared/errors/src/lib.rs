//! GraphGuard Error Handling Library
//!
//! Custom error types shared by every GraphGuard crate, with error-kind
//! predicates used by retry and shutdown policies.

pub mod types;

// Re-export commonly used types
pub use types::*;

// Re-export external dependencies
pub use anyhow::{anyhow, Context, Result as AnyhowResult};
pub use thiserror::Error;
