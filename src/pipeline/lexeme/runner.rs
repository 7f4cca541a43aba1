//! Batch convergence loop: fetch rows missing lexemes, tokenize, write back,
//! repeat until a fetch comes back empty.

use std::time::Instant;

use rusqlite::Connection;

use super::tokenizer::tokenize;
use super::traits::LexemeStore;
use super::types::*;
use super::IndexError;
use crate::pipeline::cancel::CancelFlag;

/// Run the loop to convergence.
///
/// There is no iteration cap: the only way out besides an error or a cancel
/// is an empty fetch. Batches already written stay written when a later one
/// fails.
pub fn build_lexeme_index(
    conn: &Connection,
    store: &dyn LexemeStore,
    batch_size: u32,
    cancel: &CancelFlag,
) -> Result<IndexReport, IndexError> {
    let start = Instant::now();
    let mut report = IndexReport::default();

    tracing::info!(batch_size, "Lexeme indexing started");

    loop {
        if cancel.is_cancelled() {
            tracing::warn!(
                batches = report.batches,
                rows = report.rows_updated,
                "Lexeme indexing cancelled"
            );
            return Err(IndexError::Cancelled);
        }

        let batch = store.fetch_unindexed(conn, batch_size)?;
        report.fetches += 1;

        if batch.is_empty() {
            break;
        }

        let updates: Vec<LexemeUpdate> = batch
            .into_iter()
            .map(|row| LexemeUpdate {
                lexemes: tokenize(&row.fulladdress),
                id: row.id,
            })
            .collect();

        let written = store.write_lexemes(conn, &updates)?;
        report.batches += 1;
        report.rows_updated += written as u64;

        tracing::debug!(
            batch = report.batches,
            rows = written,
            total = report.rows_updated,
            "Lexeme batch written"
        );
    }

    report.elapsed_ms = start.elapsed().as_millis() as u64;
    tracing::info!(
        batches = report.batches,
        rows = report.rows_updated,
        elapsed_ms = report.elapsed_ms,
        "Lexeme indexing finished"
    );

    Ok(report)
}
