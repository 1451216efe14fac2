//! GraphGuard fraud engine
//!
//! Real-time transaction fraud detection over a property graph. The
//! generator writes `TRANSACTS` edges at a bounded rate, the engine fans
//! each transaction out across the enabled rule set, consolidates the
//! verdicts, and annotates the edge. Dashboard counters aggregate in the
//! metadata store; telemetry in the performance monitor.

pub mod cli;
pub mod engine;
pub mod generator;
pub mod graph;
pub mod metadata;
pub mod models;
pub mod monitor;
pub mod orchestrator;
pub mod rules;
