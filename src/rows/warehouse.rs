//! Warehouse access for row lookups.
//!
//! Row tracing only ever needs four read-only queries: sample a relation,
//! fetch one row by a column value, list a table's columns and check for a
//! column. [`SqlExecutor`] is that surface; [`SqliteWarehouse`] implements it
//! over `rusqlite`.
//!
//! Relation and column names come from the manifest and end up interpolated
//! into SQL, so every identifier is checked against a strict pattern and
//! quoted before use. Values are always bound as parameters.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};

use regex::Regex;
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection};
use serde_json::{Map, Number, Value};
use tracing::debug;

/// A fetched row: column name -> JSON value.
pub type Row = Map<String, Value>;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*$").unwrap());

/// Errors raised by warehouse queries.
#[derive(Debug, thiserror::Error)]
pub enum WarehouseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("invalid relation name: '{0}'")]
    InvalidRelation(String),

    #[error("invalid identifier: '{0}'")]
    InvalidIdentifier(String),
}

pub type WarehouseResult<T> = Result<T, WarehouseError>;

/// Read-only queries used by row tracing and previews.
pub trait SqlExecutor: Send + Sync {
    /// First `limit` rows of a relation.
    fn execute(&self, relation_name: &str, limit: usize) -> WarehouseResult<Vec<Row>>;

    /// First row whose `column` equals `value`.
    fn fetch_by_column(&self, relation_name: &str, column: &str, value: &str) -> WarehouseResult<Option<Row>>;

    /// Column names of a table, in declaration order. Empty when the table
    /// does not exist.
    fn columns(&self, schema: Option<&str>, table: &str) -> WarehouseResult<Vec<String>>;

    fn column_exists(&self, schema: Option<&str>, table: &str, column: &str) -> WarehouseResult<bool> {
        Ok(self.columns(schema, table)?.iter().any(|c| c == column))
    }
}

// =============================================================================
// Identifiers
// =============================================================================

fn quote_identifier(identifier: &str) -> WarehouseResult<String> {
    if IDENTIFIER.is_match(identifier) {
        Ok(format!("\"{identifier}\""))
    } else {
        Err(WarehouseError::InvalidIdentifier(identifier.to_string()))
    }
}

/// Validate and quote a dotted relation name (`[database.][schema.]table`).
///
/// SQLite has no catalog level, so a three-part name keeps only
/// `schema.table`.
pub fn quote_relation(relation_name: &str) -> WarehouseResult<String> {
    let parts: Vec<&str> = relation_name.split('.').collect();
    if parts.is_empty() || parts.len() > 3 || parts.iter().any(|p| !IDENTIFIER.is_match(p)) {
        return Err(WarehouseError::InvalidRelation(relation_name.to_string()));
    }
    let skip = parts.len().saturating_sub(2);
    let quoted: Vec<String> = parts[skip..].iter().map(|p| format!("\"{p}\"")).collect();
    Ok(quoted.join("."))
}

// =============================================================================
// SQLite
// =============================================================================

/// URLs that open a private in-memory database.
fn is_memory_url(url: &str) -> bool {
    url.is_empty() || url == ":memory:"
}

/// A SQLite database, reached through one shared connection.
pub struct SqliteWarehouse {
    url: String,
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteWarehouse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteWarehouse").field("url", &self.url).finish()
    }
}

impl SqliteWarehouse {
    /// Open a database file, or an in-memory database for an empty URL.
    ///
    /// A `sqlite://` prefix is accepted and stripped.
    pub fn open(url: &str) -> WarehouseResult<Self> {
        let path = url.strip_prefix("sqlite://").unwrap_or(url);
        let conn = if is_memory_url(path) {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        Ok(Self {
            url: url.to_string(),
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> WarehouseResult<Self> {
        Self::open("")
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Run a batch of statements, typically fixture setup.
    pub fn execute_batch(&self, sql: &str) -> WarehouseResult<()> {
        self.conn().execute_batch(sql)?;
        Ok(())
    }

    fn query_rows(&self, sql: &str, params: impl rusqlite::Params) -> WarehouseResult<Vec<Row>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(sql)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let rows = stmt
            .query_map(params, |row| {
                let mut out = Row::new();
                for (i, name) in names.iter().enumerate() {
                    out.insert(name.clone(), json_value(row.get_ref(i)?));
                }
                Ok(out)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

/// JSON rendering of a SQLite value. Blobs are decoded as lossy UTF-8 and
/// non-finite reals become `null`.
fn json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::String(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

impl SqlExecutor for SqliteWarehouse {
    fn execute(&self, relation_name: &str, limit: usize) -> WarehouseResult<Vec<Row>> {
        let sql = format!("SELECT * FROM {} LIMIT ?1", quote_relation(relation_name)?);
        debug!(relation = relation_name, limit, "sampling relation");
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.query_rows(&sql, params![limit])
    }

    fn fetch_by_column(&self, relation_name: &str, column: &str, value: &str) -> WarehouseResult<Option<Row>> {
        let sql = format!(
            "SELECT * FROM {} WHERE {} = ?1 LIMIT 1",
            quote_relation(relation_name)?,
            quote_identifier(column)?
        );
        Ok(self.query_rows(&sql, params![value])?.into_iter().next())
    }

    fn columns(&self, schema: Option<&str>, table: &str) -> WarehouseResult<Vec<String>> {
        if !IDENTIFIER.is_match(table) {
            return Err(WarehouseError::InvalidIdentifier(table.to_string()));
        }
        let conn = self.conn();
        let names = match schema {
            Some(schema) => {
                let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1, ?2)")?;
                let names = stmt
                    .query_map(params![table, schema], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                names
            }
            None => {
                let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
                let names = stmt
                    .query_map(params![table], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                names
            }
        };
        Ok(names)
    }
}

/// Warehouses shared per database URL.
///
/// In-memory URLs are pooled too, so every caller using the empty URL sees
/// the same database for the life of the pool.
#[derive(Debug, Default)]
pub struct WarehousePool {
    warehouses: Mutex<HashMap<String, Arc<SqliteWarehouse>>>,
}

impl WarehousePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// The warehouse for `url`, opening it on first use.
    pub fn connect(&self, url: &str) -> WarehouseResult<Arc<SqliteWarehouse>> {
        let mut warehouses = match self.warehouses.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(existing) = warehouses.get(url) {
            return Ok(Arc::clone(existing));
        }
        let warehouse = Arc::new(SqliteWarehouse::open(url)?);
        warehouses.insert(url.to_string(), Arc::clone(&warehouse));
        Ok(warehouse)
    }
}
