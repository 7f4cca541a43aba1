use serde::{Deserialize, Serialize};

/// An address row with a full address but no lexemes yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAddress {
    /// Store row key.
    pub id: i64,
    pub fulladdress: String,
}

/// Lexemes computed for one row, ready to be written back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexemeUpdate {
    pub id: i64,
    pub lexemes: String,
}

/// Outcome of one convergence run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IndexReport {
    /// Every fetch, including the final empty one.
    pub fetches: u64,
    /// Non-empty batches processed.
    pub batches: u64,
    pub rows_updated: u64,
    pub elapsed_ms: u64,
}
