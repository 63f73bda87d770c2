//! # Storage Module - Dynamic Schema Frame Store
//!
//! Frames are persisted into SQLite with one table per frame `type`. Tables are
//! created the first time a type is seen and grow a new `TEXT` column whenever a
//! frame carries a field name the table has not seen before. Schema evolution is
//! additive only: columns are never dropped, and a frame with a novel field grows
//! the table instead of failing.
//!
//! ## Table layout
//!
//! ```text
//! CREATE TABLE "msg" (
//!     id   INTEGER PRIMARY KEY AUTOINCREMENT,
//!     time TEXT,
//!     -- one nullable TEXT column per field name ever observed for "msg"
//! )
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use meshcom_gateway::storage::SchemaStore;
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut store = SchemaStore::open("meshcom.db")?;
//!     let frame = serde_json::json!({"type": "msg", "src": "N0CALL-1", "msg": "hi"});
//!     let row_id = store.insert("msg", frame.as_object().unwrap())?;
//!     println!("stored row {row_id}, columns {:?}", store.columns("msg")?);
//!     Ok(())
//! }
//! ```
//!
//! ## Concurrency
//!
//! The store is owned by a single actor (`&mut self` API). Each check-then-alter
//! sequence still runs inside one SQLite transaction so an external process
//! (viewers, the prune command) never observes or races a half-applied schema
//! change.

use log::{debug, info};
use rusqlite::{params_from_iter, Connection, Transaction, TransactionBehavior};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use crate::validation::{quote_identifier, validate_identifier, IdentifierError};

/// How long a writer waits on a lock held by an external reader or the pruner.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid identifier {name:?}: {source}")]
    InvalidIdentifier {
        name: String,
        #[source]
        source: IdentifierError,
    },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Per-table outcome of [`SchemaStore::prune_to_newest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneReport {
    pub table: String,
    pub deleted: usize,
}

/// Row count and columns of one table, as reported by [`SchemaStore::table_summaries`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSummary {
    pub table: String,
    pub rows: i64,
    pub columns: Vec<String>,
}

/// SQLite-backed store whose tables follow the shape of the frames written to it.
pub struct SchemaStore {
    conn: Connection,
    /// ASCII-lowercased column names per ASCII-lowercased table name, reconciled
    /// against `PRAGMA table_info` the first time a table is touched.
    known_columns: HashMap<String, HashSet<String>>,
}

impl SchemaStore {
    /// Open (or create) the database at `path`, creating missing parent directories.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        // WAL lets the polling viewers read while the gateway writes
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        info!("Frame store opened at {}", path.display());
        Ok(Self::with_connection(conn))
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self::with_connection(Connection::open_in_memory()?))
    }

    fn with_connection(conn: Connection) -> Self {
        Self {
            conn,
            known_columns: HashMap::new(),
        }
    }

    /// Create the table for `table` if needed and add a `TEXT` column for every
    /// name in `fields` that is not a column yet. Idempotent.
    pub fn ensure_table<'a, I>(&mut self, table: &str, fields: I) -> StoreResult<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let fields: Vec<&str> = fields.into_iter().collect();
        check_identifiers(table, fields.iter().copied())?;

        let tx = self.conn.transaction()?;
        let result = reconcile_schema(&tx, &mut self.known_columns, table, &fields);
        let result = result.and_then(|()| tx.commit().map_err(StoreError::from));
        if result.is_err() {
            // the cache may now describe columns that were rolled back
            self.known_columns.remove(&table_key(table));
        }
        result
    }

    /// Ensure the schema covers `frame`, then append one row holding every field
    /// coerced to text. Columns not present in the frame stay NULL. Returns the
    /// new row id.
    pub fn insert(&mut self, table: &str, frame: &Map<String, Value>) -> StoreResult<i64> {
        check_identifiers(table, frame.keys().map(String::as_str))?;
        let fields: Vec<&str> = frame.keys().map(String::as_str).collect();

        let tx = self.conn.transaction()?;
        let result = reconcile_schema(&tx, &mut self.known_columns, table, &fields)
            .and_then(|()| insert_row(&tx, table, frame))
            .and_then(|row_id| {
                tx.commit()?;
                Ok(row_id)
            });
        if result.is_err() {
            self.known_columns.remove(&table_key(table));
        }
        result
    }

    /// Column names of `table` in declaration order; empty when the table does not exist.
    pub fn columns(&self, table: &str) -> StoreResult<Vec<String>> {
        table_columns(&self.conn, table)
    }

    /// Names of all frame tables, sorted.
    pub fn tables(&self) -> StoreResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' \
             ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// Row count and column list for every table.
    pub fn table_summaries(&self) -> StoreResult<Vec<TableSummary>> {
        let mut out = Vec::new();
        for table in self.tables()? {
            let rows: i64 = self.conn.query_row(
                &format!("SELECT COUNT(*) FROM {}", quote_identifier(&table)),
                [],
                |row| row.get(0),
            )?;
            let columns = table_columns(&self.conn, &table)?;
            out.push(TableSummary {
                table,
                rows,
                columns,
            });
        }
        Ok(out)
    }

    /// Maintenance pass: under an immediate (write-locked) transaction delete every
    /// row except the newest one (highest `id`) in each table. Tables that do not
    /// carry an `id` column are skipped.
    pub fn prune_to_newest(&mut self) -> StoreResult<Vec<PruneReport>> {
        let tables = self.tables()?;
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut reports = Vec::new();
        for table in tables {
            let has_id = table_columns(&tx, &table)?
                .iter()
                .any(|c| c.eq_ignore_ascii_case("id"));
            if !has_id {
                debug!("prune: skipping {} (no id column)", table);
                continue;
            }
            let quoted = quote_identifier(&table);
            let deleted = tx.execute(
                &format!("DELETE FROM {quoted} WHERE id < (SELECT MAX(id) FROM {quoted})"),
                [],
            )?;
            if deleted > 0 {
                reports.push(PruneReport { table, deleted });
            }
        }
        tx.commit()?;
        Ok(reports)
    }
}

fn check_identifiers<'a, I>(table: &'a str, fields: I) -> StoreResult<()>
where
    I: IntoIterator<Item = &'a str>,
{
    std::iter::once(table)
        .chain(fields)
        .try_for_each(|name| {
            validate_identifier(name).map_err(|source| StoreError::InvalidIdentifier {
                name: name.to_string(),
                source,
            })
        })
}

fn reconcile_schema(
    tx: &Transaction<'_>,
    known_columns: &mut HashMap<String, HashSet<String>>,
    table: &str,
    fields: &[&str],
) -> StoreResult<()> {
    let quoted = quote_identifier(table);
    let key = table_key(table);
    if !known_columns.contains_key(&key) {
        tx.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {quoted} (id INTEGER PRIMARY KEY AUTOINCREMENT, time TEXT)"
            ),
            [],
        )?;
        let existing = table_columns(tx, table)?
            .into_iter()
            .map(|c| c.to_ascii_lowercase())
            .collect();
        known_columns.insert(key.clone(), existing);
    }
    let columns = known_columns.entry(key).or_default();

    for field in fields {
        // SQLite folds ASCII case only
        let key = field.to_ascii_lowercase();
        if columns.contains(&key) {
            continue;
        }
        tx.execute(
            &format!(
                "ALTER TABLE {quoted} ADD COLUMN {} TEXT",
                quote_identifier(field)
            ),
            [],
        )?;
        info!("Schema: table {} gained column {}", table, field);
        columns.insert(key);
    }
    Ok(())
}

fn insert_row(tx: &Transaction<'_>, table: &str, frame: &Map<String, Value>) -> StoreResult<i64> {
    if frame.is_empty() {
        tx.execute(
            &format!("INSERT INTO {} DEFAULT VALUES", quote_identifier(table)),
            [],
        )?;
        return Ok(tx.last_insert_rowid());
    }
    let columns = frame
        .keys()
        .map(|k| quote_identifier(k))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=frame.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO {} ({columns}) VALUES ({placeholders})",
        quote_identifier(table)
    );
    tx.execute(&sql, params_from_iter(frame.values().map(value_to_text)))?;
    Ok(tx.last_insert_rowid())
}

/// Text rendering of a frame value: strings verbatim, `null` as SQL NULL, anything
/// else as compact JSON.
pub fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Cache key for `table`. SQLite matches ASCII letters case-insensitively, so
/// `MSG` and `msg` are one table while `Ä` and `ä` stay distinct.
fn table_key(table: &str) -> String {
    table.to_ascii_lowercase()
}

/// `PRAGMA table_info` yields no rows for a missing table.
fn table_columns(conn: &Connection, table: &str) -> StoreResult<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_identifier(table)))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>("name"))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}
