use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rusqlite::{Connection, ErrorCode};

use super::DatabaseError;
use crate::pipeline::cancel::CancelFlag;

/// SQLite VM instructions between two watchdog checks.
const PROGRESS_OPS: i32 = 1_000;

/// Open a SQLite connection to the given path and run migrations
pub fn open_database(path: &Path) -> Result<Connection, DatabaseError> {
    let conn = Connection::open(path)?;
    configure_pragmas(&conn)?;
    run_migrations(&conn)?;
    Ok(conn)
}

/// Open an in-memory database (for testing)
pub fn open_memory_database() -> Result<Connection, DatabaseError> {
    let conn = Connection::open_in_memory()?;
    configure_pragmas(&conn)?;
    run_migrations(&conn)?;
    Ok(conn)
}

/// Open a database from a command-line location (`:memory:` or a file path).
pub fn open_location(location: &str) -> Result<Connection, DatabaseError> {
    if location == ":memory:" {
        open_memory_database()
    } else {
        open_database(Path::new(location))
    }
}

fn configure_pragmas(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=NORMAL;
         PRAGMA foreign_keys=ON;"
    )?;
    Ok(())
}

/// Run all pending migrations
pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    let current_version = get_current_version(conn);

    let migrations: Vec<(i64, &str)> = vec![
        (1, include_str!("../../resources/migrations/001_fias_schema.sql")),
        (2, include_str!("../../resources/migrations/002_lexeme_index.sql")),
    ];

    for (version, sql) in migrations {
        if version > current_version {
            tracing::info!("Running migration v{version}");
            conn.execute_batch(sql).map_err(|e| DatabaseError::MigrationFailed {
                version,
                reason: e.to_string(),
            })?;
        }
    }

    Ok(())
}

/// Get the current schema version (0 if no schema exists yet)
fn get_current_version(conn: &Connection) -> i64 {
    conn.query_row(
        "SELECT MAX(version) FROM schema_version",
        [],
        |row| row.get::<_, Option<i64>>(0),
    )
    .ok()
    .flatten()
    .unwrap_or(0)
}

/// Interrupts statements that outlive their deadline or run after a cancel.
///
/// Installed once per connection as a SQLite progress handler. Statements run
/// through [`StatementWatchdog::guard`] get a fresh deadline; anything else is
/// only subject to the cancel flag.
#[derive(Clone)]
pub struct StatementWatchdog {
    deadline: Arc<Mutex<Option<Instant>>>,
    timeout: Duration,
    cancel: CancelFlag,
}

impl StatementWatchdog {
    pub fn install(
        conn: &Connection,
        timeout: Duration,
        cancel: CancelFlag,
    ) -> Result<Self, DatabaseError> {
        conn.busy_timeout(timeout)?;

        let deadline: Arc<Mutex<Option<Instant>>> = Arc::new(Mutex::new(None));
        let handler_deadline = Arc::clone(&deadline);
        let handler_cancel = cancel.clone();
        conn.progress_handler(
            PROGRESS_OPS,
            Some(move || handler_cancel.is_cancelled() || deadline_passed(&handler_deadline)),
        );

        Ok(Self {
            deadline,
            timeout,
            cancel,
        })
    }

    /// Run one store operation under the statement deadline.
    pub fn guard<T>(
        &self,
        op: impl FnOnce() -> rusqlite::Result<T>,
    ) -> Result<T, DatabaseError> {
        self.set_deadline(Some(Instant::now() + self.timeout));
        let result = op();
        self.set_deadline(None);
        result.map_err(|e| self.classify(e))
    }

    /// Map an interrupt into `Timeout` or `Interrupted`; other errors pass through.
    pub fn classify(&self, err: rusqlite::Error) -> DatabaseError {
        if !is_interrupt(&err) {
            return DatabaseError::Sqlite(err);
        }
        if self.cancel.is_cancelled() {
            DatabaseError::Interrupted
        } else {
            DatabaseError::Timeout(self.timeout)
        }
    }

    fn set_deadline(&self, value: Option<Instant>) {
        if let Ok(mut guard) = self.deadline.lock() {
            *guard = value;
        }
    }
}

fn deadline_passed(deadline: &Mutex<Option<Instant>>) -> bool {
    deadline
        .lock()
        .map(|d| d.is_some_and(|at| Instant::now() >= at))
        .unwrap_or(false)
}

fn is_interrupt(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::OperationInterrupted
    )
}
