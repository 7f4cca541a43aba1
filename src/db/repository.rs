use std::collections::HashSet;

use rusqlite::{params_from_iter, Connection};

use super::{DatabaseError, StatementWatchdog};
use crate::config::ADDRESS_TABLE;
use crate::models::FieldRecord;

/// Identifiers are spliced into SQL, so only `[a-z_][a-z0-9_]*` is accepted.
pub fn validate_identifier(name: &str) -> Result<(), DatabaseError> {
    let bytes = name.as_bytes();
    let valid = !bytes.is_empty()
        && bytes.len() <= 64
        && !bytes[0].is_ascii_digit()
        && bytes
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'_');
    if valid {
        Ok(())
    } else {
        Err(DatabaseError::InvalidIdentifier(name.to_string()))
    }
}

/// Inserts field records into one destination table, adding TEXT columns for
/// attributes the table has not seen yet.
pub struct TableWriter {
    table: String,
    columns: HashSet<String>,
}

impl TableWriter {
    /// Create the table if needed and load its current column set.
    pub fn open(conn: &Connection, table: &str) -> Result<Self, DatabaseError> {
        validate_identifier(table)?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS \"{table}\" (
                recid TEXT PRIMARY KEY,
                recstate INTEGER NOT NULL DEFAULT 1,
                reccreated TEXT,
                recupdated TEXT
             )"
        ))?;
        let columns = table_columns(conn, table)?;
        Ok(Self {
            table: table.to_string(),
            columns,
        })
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains(name)
    }

    /// Insert one record with every value bound as a parameter.
    pub fn insert(
        &mut self,
        conn: &Connection,
        record: &FieldRecord,
        watchdog: &StatementWatchdog,
    ) -> Result<usize, DatabaseError> {
        if record.is_empty() {
            return Ok(0);
        }
        self.ensure_columns(conn, record, watchdog)?;

        let columns: Vec<String> = record.names().map(|n| format!("\"{n}\"")).collect();
        let placeholders: Vec<String> = (1..=record.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO \"{}\" ({}) VALUES ({})",
            self.table,
            columns.join(", "),
            placeholders.join(", "),
        );

        watchdog.guard(|| {
            let mut stmt = conn.prepare_cached(&sql)?;
            stmt.execute(params_from_iter(record.values()))
        })
    }

    fn ensure_columns(
        &mut self,
        conn: &Connection,
        record: &FieldRecord,
        watchdog: &StatementWatchdog,
    ) -> Result<(), DatabaseError> {
        for name in record.names() {
            if self.columns.contains(name) {
                continue;
            }
            validate_identifier(name)?;
            let sql = format!("ALTER TABLE \"{}\" ADD COLUMN \"{name}\" TEXT", self.table);
            watchdog.guard(|| conn.execute_batch(&sql))?;
            tracing::debug!(table = %self.table, column = name, "Added column");
            self.columns.insert(name.to_string());
        }
        Ok(())
    }
}

fn table_columns(conn: &Connection, table: &str) -> Result<HashSet<String>, DatabaseError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info(\"{table}\")"))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    let mut columns = HashSet::new();
    for row in rows {
        columns.insert(row?);
    }
    Ok(columns)
}

/// Row count of a destination table.
pub fn count_rows(conn: &Connection, table: &str) -> Result<i64, DatabaseError> {
    validate_identifier(table)?;
    let count = conn.query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |row| {
        row.get::<_, i64>(0)
    })?;
    Ok(count)
}

/// Address rows that have a full address but no search lexemes yet.
pub fn count_pending_lexemes(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        &format!(
            "SELECT COUNT(*) FROM \"{}\"
             WHERE fulladdress_search IS NULL AND fulladdress IS NOT NULL",
            crate::config::destination_table(ADDRESS_TABLE)
        ),
        [],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::pipeline::cancel::CancelFlag;

    fn setup() -> (Connection, StatementWatchdog) {
        let conn = open_memory_database().unwrap();
        let watchdog =
            StatementWatchdog::install(&conn, Duration::from_secs(5), CancelFlag::new()).unwrap();
        (conn, watchdog)
    }

    fn record(pairs: &[(&str, &str)]) -> FieldRecord {
        let mut r = FieldRecord::new();
        for (n, v) in pairs {
            r.set(*n, *v);
        }
        r
    }

    #[test]
    fn identifiers_validated() {
        assert!(validate_identifier("fias_addrobj").is_ok());
        assert!(validate_identifier("okato2").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("1abc").is_err());
        assert!(validate_identifier("name\"; DROP TABLE x; --").is_err());
        assert!(validate_identifier("Upper").is_err());
    }

    #[test]
    fn insert_into_address_table() {
        let (conn, watchdog) = setup();
        let mut writer = TableWriter::open(&conn, "fias_addrobj").unwrap();
        let r = record(&[
            ("recid", "r1"),
            ("aoguid", "g1"),
            ("formalname", "Ленина"),
            ("recstate", "1"),
        ]);
        assert_eq!(writer.insert(&conn, &r, &watchdog).unwrap(), 1);

        let (name, state): (String, i64) = conn
            .query_row(
                "SELECT formalname, recstate FROM fias_addrobj WHERE recid = 'r1'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(name, "Ленина");
        assert_eq!(state, 1, "recstate keeps INTEGER affinity");
    }

    #[test]
    fn unknown_attribute_becomes_column() {
        let (conn, watchdog) = setup();
        let mut writer = TableWriter::open(&conn, "fias_addrobj").unwrap();
        assert!(!writer.has_column("newattr"));

        let r = record(&[("recid", "r1"), ("newattr", "x")]);
        writer.insert(&conn, &r, &watchdog).unwrap();
        assert!(writer.has_column("newattr"));

        let value: String = conn
            .query_row("SELECT newattr FROM fias_addrobj", [], |row| row.get(0))
            .unwrap();
        assert_eq!(value, "x");
    }

    #[test]
    fn other_tables_created_on_demand() {
        let (conn, watchdog) = setup();
        let mut writer = TableWriter::open(&conn, "fias_house").unwrap();
        let r = record(&[("recid", "h1"), ("housenum", "12"), ("aoguid", "g1")]);
        writer.insert(&conn, &r, &watchdog).unwrap();
        assert_eq!(count_rows(&conn, "fias_house").unwrap(), 1);
    }

    #[test]
    fn hostile_attribute_name_rejected() {
        let (conn, watchdog) = setup();
        let mut writer = TableWriter::open(&conn, "fias_house").unwrap();
        let r = record(&[("recid", "h1"), ("bad name", "x")]);
        let err = writer.insert(&conn, &r, &watchdog).unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidIdentifier(_)));
        assert_eq!(count_rows(&conn, "fias_house").unwrap(), 0);
    }

    #[test]
    fn empty_record_inserts_nothing() {
        let (conn, watchdog) = setup();
        let mut writer = TableWriter::open(&conn, "fias_house").unwrap();
        assert_eq!(writer.insert(&conn, &FieldRecord::new(), &watchdog).unwrap(), 0);
        assert_eq!(count_rows(&conn, "fias_house").unwrap(), 0);
    }

    #[test]
    fn values_are_bound_not_spliced() {
        let (conn, watchdog) = setup();
        let mut writer = TableWriter::open(&conn, "fias_addrobj").unwrap();
        let hostile = "x'); DROP TABLE fias_addrobj; --";
        let r = record(&[("recid", "r1"), ("formalname", hostile)]);
        writer.insert(&conn, &r, &watchdog).unwrap();

        let stored: String = conn
            .query_row("SELECT formalname FROM fias_addrobj", [], |row| row.get(0))
            .unwrap();
        assert_eq!(stored, hostile);
    }

    #[test]
    fn pending_lexeme_count_ignores_rows_without_full_address() {
        let (conn, _) = setup();
        conn.execute_batch(
            "INSERT INTO fias_addrobj (recid, fulladdress) VALUES ('a', 'г Москва');
             INSERT INTO fias_addrobj (recid, fulladdress) VALUES ('b', NULL);
             INSERT INTO fias_addrobj (recid, fulladdress, fulladdress_search)
                 VALUES ('c', 'г Тула', 'г ту тул тула');",
        )
        .unwrap();
        assert_eq!(count_pending_lexemes(&conn).unwrap(), 1);
    }
}
