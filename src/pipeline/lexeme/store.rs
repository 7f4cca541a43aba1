use rusqlite::{params, Connection};

use super::traits::LexemeStore;
use super::types::*;
use super::IndexError;
use crate::db::{DatabaseError, StatementWatchdog};

/// SQLite-backed lexeme store over `fias_addrobj`.
///
/// Rows are keyed by SQLite `rowid`, which is never NULL.
pub struct SqliteLexemeStore {
    watchdog: StatementWatchdog,
}

impl SqliteLexemeStore {
    pub fn new(watchdog: StatementWatchdog) -> Self {
        Self { watchdog }
    }
}

impl LexemeStore for SqliteLexemeStore {
    fn fetch_unindexed(
        &self,
        conn: &Connection,
        limit: u32,
    ) -> Result<Vec<PendingAddress>, IndexError> {
        let rows = self.watchdog.guard(|| {
            let mut stmt = conn.prepare_cached(
                "SELECT rowid, fulladdress
                 FROM fias_addrobj
                 WHERE fulladdress_search IS NULL AND fulladdress IS NOT NULL
                 LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], |row| {
                Ok(PendingAddress {
                    id: row.get(0)?,
                    fulladdress: row.get(1)?,
                })
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })?;
        Ok(rows)
    }

    fn write_lexemes(
        &self,
        conn: &Connection,
        updates: &[LexemeUpdate],
    ) -> Result<usize, IndexError> {
        let tx = conn.unchecked_transaction().map_err(DatabaseError::from)?;

        let mut affected = 0;
        for update in updates {
            affected += self.watchdog.guard(|| {
                tx.prepare_cached(
                    "UPDATE fias_addrobj SET fulladdress_search = ?1 WHERE rowid = ?2",
                )?
                .execute(params![update.lexemes, update.id])
            })?;
        }

        tx.commit().map_err(DatabaseError::from)?;
        Ok(affected)
    }
}
