//! Rule registry
//!
//! Ordered name-to-rule map behind a read-write lock. Reads (dispatch
//! snapshots, listings) are frequent; writes (toggles) are rare. A toggle
//! takes effect at the next submit: in-flight evaluations keep the snapshot
//! they started with.

use std::sync::{Arc, RwLock};
use tracing::info;

use graphguard_errors::{GraphGuardError, Result};

use crate::graph::GraphClient;
use crate::models::RuleStateView;

use super::{
    FlaggedCounterpartyRule, FlaggedDeviceNetworkRule, FlaggedTransactionNetworkRule, FraudRule,
};

struct RuleEntry {
    rule: Arc<dyn FraudRule>,
    enabled: bool,
}

#[derive(Default)]
pub struct RuleRegistry {
    entries: RwLock<Vec<RuleEntry>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry loaded with the three reference rules
    pub fn with_reference_rules(graph: Arc<GraphClient>) -> Arc<Self> {
        let registry = Self::new();
        registry.register(Arc::new(FlaggedCounterpartyRule::new(Arc::clone(&graph))));
        registry.register(Arc::new(FlaggedTransactionNetworkRule::new(Arc::clone(
            &graph,
        ))));
        registry.register(Arc::new(FlaggedDeviceNetworkRule::new(graph)));
        Arc::new(registry)
    }

    /// Registration order is the stable order used for dispatch and for the
    /// `details` entries of consolidated annotations.
    pub fn register(&self, rule: Arc<dyn FraudRule>) {
        let enabled = rule.descriptor().enabled;
        let mut entries = self.write_entries();
        entries.push(RuleEntry { rule, enabled });
    }

    pub fn list(&self) -> Vec<RuleStateView> {
        self.read_entries()
            .iter()
            .map(|entry| {
                let descriptor = entry.rule.descriptor();
                RuleStateView {
                    name: descriptor.name.clone(),
                    description: descriptor.description.clone(),
                    complexity: descriptor.complexity,
                    enabled: entry.enabled,
                }
            })
            .collect()
    }

    /// Enable or disable one rule by name
    pub fn toggle(&self, name: &str, enabled: bool) -> Result<RuleStateView> {
        let mut entries = self.write_entries();
        let entry = entries
            .iter_mut()
            .find(|entry| entry.rule.name() == name)
            .ok_or_else(|| GraphGuardError::not_found("rule", name))?;
        entry.enabled = enabled;
        info!(rule = name, enabled, "rule toggled");

        let descriptor = entry.rule.descriptor();
        Ok(RuleStateView {
            name: descriptor.name.clone(),
            description: descriptor.description.clone(),
            complexity: descriptor.complexity,
            enabled,
        })
    }

    /// Snapshot of the enabled rules, in registration order
    pub fn enabled_rules(&self) -> Vec<Arc<dyn FraudRule>> {
        self.read_entries()
            .iter()
            .filter(|entry| entry.enabled)
            .map(|entry| Arc::clone(&entry.rule))
            .collect()
    }

    fn read_entries(&self) -> std::sync::RwLockReadGuard<'_, Vec<RuleEntry>> {
        match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_entries(&self) -> std::sync::RwLockWriteGuard<'_, Vec<RuleEntry>> {
        match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
