//! Full-address refresh.
//!
//! Every address object gets a `fulladdress` built from its parent chain,
//! root first: `"г Москва, ул Ленина"`. Rows whose value changes lose their
//! search lexemes so the index builder picks them up again.

use std::collections::{HashMap, HashSet};

use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::config::{destination_table, ADDRESS_TABLE};
use crate::db::{DatabaseError, StatementWatchdog};
use crate::pipeline::describe_error;

/// Longest parent chain followed before the walk stops.
pub const MAX_HIERARCHY_DEPTH: usize = 32;

const PART_SEPARATOR: &str = ", ";

/// Which address rows a refresh recomputes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshScope {
    /// Rows with `recstate = 1`.
    ActiveOnly,
    All,
}

impl RefreshScope {
    pub fn includes(&self, recstate: i64) -> bool {
        match self {
            Self::ActiveOnly => recstate == 1,
            Self::All => true,
        }
    }
}

/// Computes `fulladdress` for address rows.
pub trait FullAddressResolver: Send + Sync {
    /// Returns the number of rows whose `fulladdress` changed. Rows already
    /// holding the computed value are left alone and not counted.
    fn refresh(&self, conn: &Connection, scope: RefreshScope) -> Result<usize, DatabaseError>;
}

/// The slice of an address row needed to build its full address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressNode {
    pub rowid: i64,
    pub recstate: i64,
    pub aoguid: Option<String>,
    pub parentguid: Option<String>,
    pub shortname: Option<String>,
    pub formalname: Option<String>,
}

impl AddressNode {
    /// `"<shortname> <formalname>"`, or whichever half is present.
    pub fn label(&self) -> Option<String> {
        let parts: Vec<&str> = [self.shortname.as_deref(), self.formalname.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

/// Join the labels of `node` and its ancestors, root first.
///
/// A missing parent ends the chain. A repeated guid or a chain longer than
/// [`MAX_HIERARCHY_DEPTH`] stops the walk at the last distinct ancestor.
pub fn compose_full_address(node: &AddressNode, by_guid: &HashMap<&str, &AddressNode>) -> String {
    let mut labels = Vec::new();
    let mut visited: HashSet<&str> = HashSet::new();
    let mut current = Some(node);

    while let Some(n) = current {
        if labels.len() >= MAX_HIERARCHY_DEPTH {
            break;
        }
        if let Some(guid) = n.aoguid.as_deref() {
            if !visited.insert(guid) {
                break;
            }
        }
        if let Some(label) = n.label() {
            labels.push(label);
        }
        current = n
            .parentguid
            .as_deref()
            .filter(|p| !p.is_empty())
            .and_then(|p| by_guid.get(p).copied());
    }

    labels.reverse();
    labels.join(PART_SEPARATOR)
}

/// Builds full addresses in-process from the `aoguid`/`parentguid` hierarchy
/// of `fias_addrobj`.
pub struct HierarchyResolver {
    watchdog: StatementWatchdog,
}

impl HierarchyResolver {
    pub fn new(watchdog: StatementWatchdog) -> Self {
        Self { watchdog }
    }

    fn load_nodes(&self, conn: &Connection, table: &str) -> Result<Vec<AddressNode>, DatabaseError> {
        // Active rows first so they win the guid lookup over stale duplicates.
        let sql = format!(
            "SELECT rowid, recstate, aoguid, parentguid, shortname, formalname
             FROM {table}
             ORDER BY recstate DESC, rowid"
        );
        self.watchdog.guard(|| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], |row| {
                Ok(AddressNode {
                    rowid: row.get(0)?,
                    recstate: row.get::<_, Option<i64>>(1)?.unwrap_or(0),
                    aoguid: row.get(2)?,
                    parentguid: row.get(3)?,
                    shortname: row.get(4)?,
                    formalname: row.get(5)?,
                })
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })
    }
}

impl FullAddressResolver for HierarchyResolver {
    fn refresh(&self, conn: &Connection, scope: RefreshScope) -> Result<usize, DatabaseError> {
        let table = destination_table(ADDRESS_TABLE);
        let nodes = self.load_nodes(conn, &table)?;

        let mut by_guid: HashMap<&str, &AddressNode> = HashMap::with_capacity(nodes.len());
        for node in &nodes {
            if let Some(guid) = node.aoguid.as_deref() {
                by_guid.entry(guid).or_insert(node);
            }
        }

        let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        let sql = format!(
            "UPDATE {table}
             SET fulladdress = ?1, fulladdress_search = NULL, recupdated = ?2
             WHERE rowid = ?3 AND fulladdress IS NOT ?1"
        );

        let tx = conn.unchecked_transaction()?;
        let mut rows_changed = 0usize;
        let mut considered = 0usize;

        for node in nodes.iter().filter(|n| scope.includes(n.recstate)) {
            considered += 1;
            let full = compose_full_address(node, &by_guid);
            rows_changed += self.watchdog.guard(|| {
                tx.prepare_cached(&sql)?
                    .execute(params![full, stamp, node.rowid])
            })?;
        }

        tx.commit()?;

        tracing::info!(
            scope = ?scope,
            considered,
            rows_changed,
            "Full addresses refreshed"
        );
        Ok(rows_changed)
    }
}

/// What happened to the refresh stage of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RefreshOutcome {
    /// `changed_rows` counts rows whose `fulladdress` actually changed, not
    /// every row in scope.
    Updated { changed_rows: usize },
    /// Logged and skipped over; the run went on to the lexeme stage.
    Failed { error: String },
    Skipped,
}

impl RefreshOutcome {
    pub fn from_failure(err: &DatabaseError) -> Self {
        Self::Failed {
            error: describe_error(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::pipeline::cancel::CancelFlag;

    fn resolver(conn: &Connection) -> HierarchyResolver {
        let watchdog =
            StatementWatchdog::install(conn, Duration::from_secs(5), CancelFlag::new()).unwrap();
        HierarchyResolver::new(watchdog)
    }

    fn insert(conn: &Connection, guid: &str, parent: Option<&str>, short: &str, formal: &str) {
        conn.execute(
            "INSERT INTO fias_addrobj (recid, aoguid, parentguid, shortname, formalname)
             VALUES (?1, ?1, ?2, ?3, ?4)",
            params![guid, parent, short, formal],
        )
        .unwrap();
    }

    fn full_address(conn: &Connection, guid: &str) -> Option<String> {
        conn.query_row(
            "SELECT fulladdress FROM fias_addrobj WHERE aoguid = ?1",
            [guid],
            |row| row.get(0),
        )
        .unwrap()
    }

    fn node(guid: &str, parent: Option<&str>, short: &str, formal: &str) -> AddressNode {
        AddressNode {
            rowid: 0,
            recstate: 1,
            aoguid: Some(guid.into()),
            parentguid: parent.map(Into::into),
            shortname: Some(short.into()),
            formalname: Some(formal.into()),
        }
    }

    #[test]
    fn compose_walks_to_root() {
        let city = node("msk", None, "г", "Москва");
        let street = node("len", Some("msk"), "ул", "Ленина");
        let map: HashMap<&str, &AddressNode> = [("msk", &city), ("len", &street)].into();
        assert_eq!(compose_full_address(&street, &map), "г Москва, ул Ленина");
        assert_eq!(compose_full_address(&city, &map), "г Москва");
    }

    #[test]
    fn compose_stops_at_missing_parent() {
        let street = node("len", Some("gone"), "ул", "Ленина");
        let map: HashMap<&str, &AddressNode> = [("len", &street)].into();
        assert_eq!(compose_full_address(&street, &map), "ул Ленина");
    }

    #[test]
    fn compose_survives_cycles() {
        let a = node("a", Some("b"), "г", "А");
        let b = node("b", Some("a"), "р-н", "Б");
        let map: HashMap<&str, &AddressNode> = [("a", &a), ("b", &b)].into();
        assert_eq!(compose_full_address(&a, &map), "р-н Б, г А");
    }

    #[test]
    fn compose_caps_depth() {
        let nodes: Vec<AddressNode> = (0..40)
            .map(|i| {
                let parent = (i > 0).then(|| format!("n{}", i - 1));
                node(&format!("n{i}"), parent.as_deref(), "x", &i.to_string())
            })
            .collect();
        let map: HashMap<&str, &AddressNode> = nodes
            .iter()
            .map(|n| (n.aoguid.as_deref().unwrap(), n))
            .collect();
        let full = compose_full_address(&nodes[39], &map);
        assert_eq!(full.split(PART_SEPARATOR).count(), MAX_HIERARCHY_DEPTH);
        assert!(full.ends_with("x 39"));
    }

    #[test]
    fn label_skips_blank_halves() {
        let mut n = node("a", None, "  ", "Тула");
        assert_eq!(n.label().as_deref(), Some("Тула"));
        n.formalname = None;
        assert_eq!(n.label(), None);
    }

    #[test]
    fn refresh_fills_full_addresses() {
        let conn = open_memory_database().unwrap();
        insert(&conn, "msk", None, "г", "Москва");
        insert(&conn, "len", Some("msk"), "ул", "Ленина");

        let changed = resolver(&conn).refresh(&conn, RefreshScope::ActiveOnly).unwrap();
        assert_eq!(changed, 2);
        assert_eq!(full_address(&conn, "len").as_deref(), Some("г Москва, ул Ленина"));
    }

    #[test]
    fn unchanged_rows_are_not_counted() {
        let conn = open_memory_database().unwrap();
        insert(&conn, "msk", None, "г", "Москва");
        let r = resolver(&conn);
        assert_eq!(r.refresh(&conn, RefreshScope::ActiveOnly).unwrap(), 1);
        assert_eq!(r.refresh(&conn, RefreshScope::ActiveOnly).unwrap(), 0);
    }

    #[test]
    fn changed_address_resets_stale_lexemes() {
        let conn = open_memory_database().unwrap();
        insert(&conn, "msk", None, "г", "Москва");
        let r = resolver(&conn);
        r.refresh(&conn, RefreshScope::ActiveOnly).unwrap();
        conn.execute(
            "UPDATE fias_addrobj SET fulladdress_search = 'г мо мос' WHERE aoguid = 'msk'",
            [],
        )
        .unwrap();

        conn.execute(
            "UPDATE fias_addrobj SET formalname = 'Тула' WHERE aoguid = 'msk'",
            [],
        )
        .unwrap();
        assert_eq!(r.refresh(&conn, RefreshScope::ActiveOnly).unwrap(), 1);

        let search: Option<String> = conn
            .query_row(
                "SELECT fulladdress_search FROM fias_addrobj WHERE aoguid = 'msk'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(search, None);
        assert_eq!(full_address(&conn, "msk").as_deref(), Some("г Тула"));
    }

    #[test]
    fn active_scope_skips_inactive_rows() {
        let conn = open_memory_database().unwrap();
        insert(&conn, "msk", None, "г", "Москва");
        insert(&conn, "old", Some("msk"), "ул", "Старая");
        conn.execute("UPDATE fias_addrobj SET recstate = 0 WHERE aoguid = 'old'", [])
            .unwrap();

        let r = resolver(&conn);
        assert_eq!(r.refresh(&conn, RefreshScope::ActiveOnly).unwrap(), 1);
        assert_eq!(full_address(&conn, "old"), None);

        assert_eq!(r.refresh(&conn, RefreshScope::All).unwrap(), 1);
        assert_eq!(full_address(&conn, "old").as_deref(), Some("г Москва, ул Старая"));
    }

    #[test]
    fn failure_outcome_carries_message() {
        let outcome = RefreshOutcome::from_failure(&DatabaseError::Timeout(Duration::from_secs(30)));
        match outcome {
            RefreshOutcome::Failed { error } => assert!(error.contains("timeout")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
