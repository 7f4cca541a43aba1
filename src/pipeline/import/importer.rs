use std::io::{BufReader, Read};
use std::time::Instant;

use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use super::archive::{table_name_from_entry, ArchiveSource};
use super::assembler::{finalize, Decision, RecordAssembler};
use super::xml::ElementReader;
use super::ImportError;
use crate::config::{destination_table, is_address_table, ImportConfig};
use crate::db::{DatabaseError, StatementWatchdog, TableWriter};
use crate::pipeline::cancel::CancelFlag;

const STREAM_BUFFER_BYTES: usize = 1024 * 1024;

/// Counters for one imported table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableReport {
    pub table: String,
    pub entry: String,
    pub seen: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub elapsed_ms: u64,
}

/// Result of walking a whole archive.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct IngestReport {
    pub tables: Vec<TableReport>,
    /// Entries with no table marker or a table outside the allow-list.
    pub skipped_entries: u64,
}

impl IngestReport {
    pub fn imported_address_table(&self) -> bool {
        self.tables.iter().any(|t| is_address_table(&t.table))
    }

    pub fn total_accepted(&self) -> u64 {
        self.tables.iter().map(|t| t.accepted).sum()
    }
}

/// Import every allow-listed table of the archive.
pub fn ingest_archive(
    conn: &Connection,
    source: &ArchiveSource,
    config: &ImportConfig,
    watchdog: &StatementWatchdog,
    cancel: &CancelFlag,
) -> Result<IngestReport, ImportError> {
    let mut report = IngestReport::default();

    source.for_each_entry(|entry, stream| {
        let table = match table_name_from_entry(entry) {
            Some(table) if config.wants_table(&table) => table,
            _ => {
                tracing::debug!(entry, "Skipping archive entry");
                report.skipped_entries += 1;
                return Ok(());
            }
        };

        let table_report = ingest_table(conn, &table, entry, stream, config, watchdog, cancel)?;
        report.tables.push(table_report);
        Ok(())
    })?;

    Ok(report)
}

/// Stream one table's XML into its destination table.
///
/// Inserts are committed every `commit_every` accepted records. Any failure
/// rolls back the open chunk and aborts; earlier chunks stay committed.
pub fn ingest_table(
    conn: &Connection,
    table: &str,
    entry: &str,
    stream: &mut dyn Read,
    config: &ImportConfig,
    watchdog: &StatementWatchdog,
    cancel: &CancelFlag,
) -> Result<TableReport, ImportError> {
    if cancel.is_cancelled() {
        return Err(ImportError::Cancelled);
    }

    let start = Instant::now();
    tracing::info!(table, entry, "Table import started");

    let insert_error = |source: DatabaseError| ImportError::Insert {
        table: table.to_string(),
        source,
    };

    let mut writer = TableWriter::open(conn, &destination_table(table)).map_err(insert_error)?;
    let assembler = RecordAssembler::new(table);
    let mut reader = ElementReader::new(BufReader::with_capacity(STREAM_BUFFER_BYTES, stream));

    let mut seen = 0u64;
    let mut accepted = 0u64;
    let mut rejected = 0u64;
    let mut in_chunk = 0u32;

    let mut tx = conn.unchecked_transaction().map_err(DatabaseError::from)?;

    loop {
        let element = reader.next_element().map_err(|source| ImportError::Xml {
            entry: entry.to_string(),
            source,
        })?;
        let Some(element) = element else {
            break;
        };

        if cancel.is_cancelled() {
            tracing::warn!(table, seen, accepted, "Table import cancelled");
            return Err(ImportError::Cancelled);
        }
        seen += 1;

        match assembler.decide(&element.attributes) {
            Decision::Accept(mut record) => {
                finalize(&mut record, Utc::now());
                writer.insert(conn, &record, watchdog).map_err(insert_error)?;
                accepted += 1;
                in_chunk += 1;

                if in_chunk >= config.commit_every {
                    tx.commit().map_err(DatabaseError::from)?;
                    tx = conn.unchecked_transaction().map_err(DatabaseError::from)?;
                    in_chunk = 0;
                }
            }
            Decision::Reject(reason) => {
                rejected += 1;
                tracing::trace!(table, reason = %reason, "Record filtered out");
            }
        }

        if config.progress_every > 0 && seen % config.progress_every == 0 {
            tracing::info!(
                table,
                seen,
                accepted,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Import progress"
            );
        }
    }

    tx.commit().map_err(DatabaseError::from)?;

    let report = TableReport {
        table: table.to_string(),
        entry: entry.to_string(),
        seen,
        accepted,
        rejected,
        elapsed_ms: start.elapsed().as_millis() as u64,
    };

    tracing::info!(
        table,
        imported = report.accepted,
        filtered = report.rejected,
        elapsed_ms = report.elapsed_ms,
        "Table import finished"
    );

    Ok(report)
}
