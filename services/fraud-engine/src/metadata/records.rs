//! Counter record catalog
//!
//! One record per counter kind, each a map of bin name to int64. The kinds
//! and bin names are wire names shared with the dashboard.

/// Bin names within the counter records
pub mod bins {
    // fraud record
    pub const TOTAL: &str = "total";
    pub const BLOCKED: &str = "blocked";
    pub const REVIEW: &str = "review";
    pub const AMOUNT: &str = "amount";

    // user record: population by risk tier
    pub const LOW: &str = "low";
    pub const MEDIUM: &str = "medium";
    pub const HIGH: &str = "high";

    // account record
    pub const FLAGGED: &str = "flagged";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    User,
    Account,
    Fraud,
}

impl RecordKind {
    pub const ALL: [RecordKind; 3] = [RecordKind::User, RecordKind::Account, RecordKind::Fraud];

    /// Storage record name
    pub fn name(&self) -> &'static str {
        match self {
            RecordKind::User => "user",
            RecordKind::Account => "account",
            RecordKind::Fraud => "fraud",
        }
    }

    /// Bin names this record carries
    pub fn bin_names(&self) -> &'static [&'static str] {
        match self {
            RecordKind::User => &[bins::LOW, bins::MEDIUM, bins::HIGH],
            RecordKind::Account => &[bins::FLAGGED],
            RecordKind::Fraud => &[bins::TOTAL, bins::BLOCKED, bins::REVIEW, bins::AMOUNT],
        }
    }

    /// Seed values used for the create-only write at startup
    pub fn seed(&self) -> Vec<(&'static str, i64)> {
        self.bin_names().iter().map(|bin| (*bin, 0i64)).collect()
    }
}
