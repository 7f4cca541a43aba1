//! Store boundary of the lexeme index builder.

use rusqlite::Connection;

use super::types::*;
use super::IndexError;

/// Fetch / write-back operations the convergence loop needs.
pub trait LexemeStore: Send + Sync {
    /// Up to `limit` rows whose `fulladdress_search` is unset. Order is
    /// store-defined.
    fn fetch_unindexed(
        &self,
        conn: &Connection,
        limit: u32,
    ) -> Result<Vec<PendingAddress>, IndexError>;

    /// Write one batch of lexemes, one update per row. Returns affected rows.
    fn write_lexemes(
        &self,
        conn: &Connection,
        updates: &[LexemeUpdate],
    ) -> Result<usize, IndexError>;
}
