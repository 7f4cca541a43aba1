//! Run orchestration: ingest → full-address refresh → lexeme index.
//!
//! Which stages run depends on [`RunMode`]. Ingestion and indexing failures
//! end the run; a refresh failure is logged and the run carries on.

use std::time::Instant;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::cancel::CancelFlag;
use super::describe_error;
use super::fulladdress::{FullAddressResolver, HierarchyResolver, RefreshOutcome};
use super::import::{ingest_archive, ArchiveSource, IngestReport};
use super::lexeme::{build_lexeme_index, IndexReport, LexemeStore, SqliteLexemeStore};
use super::PipelineError;
use crate::config::{ImportConfig, RunMode};
use crate::db::{open_location, DatabaseError, StatementWatchdog};

/// Everything a run did, printed with `--summary-json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub mode: RunMode,
    pub started_at: DateTime<Utc>,
    pub ingest: Option<IngestReport>,
    pub refresh: RefreshOutcome,
    pub index: Option<IndexReport>,
    pub elapsed_ms: u64,
}

/// Validate the configuration, open the store and run the configured stages.
pub fn run_import(config: &ImportConfig, cancel: &CancelFlag) -> Result<RunSummary, PipelineError> {
    config.validate()?;

    let conn = open_location(config.database_path())?;
    let watchdog = StatementWatchdog::install(&conn, config.statement_timeout(), cancel.clone())?;
    let resolver = HierarchyResolver::new(watchdog.clone());
    let store = SqliteLexemeStore::new(watchdog.clone());

    run_stages(&conn, config, &watchdog, &resolver, &store, cancel)
}

/// Stage sequencing over an already opened store.
pub fn run_stages(
    conn: &Connection,
    config: &ImportConfig,
    watchdog: &StatementWatchdog,
    resolver: &dyn FullAddressResolver,
    store: &dyn LexemeStore,
    cancel: &CancelFlag,
) -> Result<RunSummary, PipelineError> {
    let start = Instant::now();
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();

    tracing::info!(
        %run_id,
        mode = config.mode.as_str(),
        database = config.database_path(),
        "Run started"
    );

    let result = execute(conn, config, watchdog, resolver, store, cancel);
    let elapsed_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok((ingest, refresh, index)) => {
            let summary = RunSummary {
                run_id,
                mode: config.mode,
                started_at,
                ingest,
                refresh,
                index,
                elapsed_ms,
            };
            tracing::info!(%run_id, elapsed_ms, "Run finished");
            Ok(summary)
        }
        Err(e) => {
            if e.is_cancellation() {
                tracing::warn!(%run_id, elapsed_ms, "Run cancelled");
                Err(PipelineError::Cancelled)
            } else {
                tracing::error!(%run_id, elapsed_ms, error = %describe_error(&e), "Run failed");
                Err(e)
            }
        }
    }
}

type StageResults = (Option<IngestReport>, RefreshOutcome, Option<IndexReport>);

fn execute(
    conn: &Connection,
    config: &ImportConfig,
    watchdog: &StatementWatchdog,
    resolver: &dyn FullAddressResolver,
    store: &dyn LexemeStore,
    cancel: &CancelFlag,
) -> Result<StageResults, PipelineError> {
    let ingest = if config.mode.ingests() {
        let source = ArchiveSource::open(&config.archive_path)?;
        tracing::info!(
            archive = %config.archive_path.display(),
            kind = ?source.kind(),
            tables = ?config.tables,
            "Ingesting archive"
        );
        Some(ingest_archive(conn, &source, config, watchdog, cancel)?)
    } else {
        None
    };

    let refresh = if should_refresh(config.mode, ingest.as_ref()) {
        refresh_full_addresses(conn, config, resolver, cancel)?
    } else {
        RefreshOutcome::Skipped
    };

    let index = if config.mode.builds_lexemes() {
        Some(build_lexeme_index(conn, store, config.batch_size, cancel)?)
    } else {
        None
    };

    Ok((ingest, refresh, index))
}

/// Full runs only refresh when the address table was part of the import.
fn should_refresh(mode: RunMode, ingest: Option<&IngestReport>) -> bool {
    if !mode.refreshes_addresses() {
        return false;
    }
    match ingest {
        Some(report) => report.imported_address_table(),
        None => true,
    }
}

fn refresh_full_addresses(
    conn: &Connection,
    config: &ImportConfig,
    resolver: &dyn FullAddressResolver,
    cancel: &CancelFlag,
) -> Result<RefreshOutcome, PipelineError> {
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }

    let start = Instant::now();
    match resolver.refresh(conn, config.refresh_scope) {
        Ok(changed_rows) => {
            tracing::info!(
                changed_rows,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Full-address refresh finished"
            );
            Ok(RefreshOutcome::Updated { changed_rows })
        }
        Err(DatabaseError::Interrupted) => Err(PipelineError::Cancelled),
        Err(e) if cancel.is_cancelled() => {
            tracing::debug!(error = %e, "Refresh stopped by cancel");
            Err(PipelineError::Cancelled)
        }
        Err(e) => {
            tracing::warn!(
                error = %describe_error(&e),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Full-address refresh failed, continuing with lexeme indexing"
            );
            Ok(RefreshOutcome::from_failure(&e))
        }
    }
}
