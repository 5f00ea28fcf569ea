use std::time::Duration;

use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::{NewSideDocument, SideDocument};

pub mod memory;
pub mod pg;

pub use memory::MemoryRequestStore;
pub use pg::PgRequestStore;

pub type PgPool = Pool<ConnectionManager<PgConnection>>;

pub const DEFAULT_MAX_POOL_SIZE: u32 = 2;

pub fn init_pool(database_url: &str) -> anyhow::Result<PgPool> {
    init_pool_with_size(database_url, DEFAULT_MAX_POOL_SIZE)
}

pub fn init_pool_with_size(database_url: &str, max_size: u32) -> anyhow::Result<PgPool> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool_size = max_size.max(1);
    let pool = Pool::builder()
        .max_size(pool_size)
        .connection_timeout(Duration::from_secs(10))
        .build(manager)?;
    Ok(pool)
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("failed to decode row: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("unknown table {0}")]
    UnknownTable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOrder<'a> {
    Column(&'a str, Direction),
    /// Physical insertion sequence of the table.
    Sequence(Direction),
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnFilter<'a> {
    pub column: &'a str,
    pub value: &'a str,
}

#[derive(Debug, Clone, Copy)]
pub struct RowSelect<'a> {
    pub table: &'a str,
    pub filter: Option<ColumnFilter<'a>>,
    pub order: RowOrder<'a>,
    pub limit: Option<usize>,
}

impl<'a> RowSelect<'a> {
    pub fn all(table: &'a str) -> Self {
        Self {
            table,
            filter: None,
            order: RowOrder::Sequence(Direction::Asc),
            limit: None,
        }
    }

    pub fn filter(mut self, column: &'a str, value: &'a str) -> Self {
        self.filter = Some(ColumnFilter { column, value });
        self
    }

    pub fn order(mut self, order: RowOrder<'a>) -> Self {
        self.order = order;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ColumnUpdate<'a> {
    pub table: &'a str,
    pub column: &'a str,
    pub value: &'a str,
    pub key_column: &'a str,
    pub key: &'a str,
}

/// One untyped row. Binary columns are carried as Postgres bytea hex text (`\x…`).
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub seq: i64,
    pub values: Map<String, Value>,
}

impl RawRow {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }
}

/// Generic access to the relational store holding request tables.
///
/// Every call opens and releases its own connection; nothing is cached between calls so
/// schema changes made by a migration are visible immediately.
pub trait RequestStore: Send + Sync + 'static {
    fn list_tables(&self) -> StoreResult<Vec<String>>;

    fn table_columns(&self, table: &str) -> StoreResult<Vec<ColumnInfo>>;

    fn select_rows(&self, select: &RowSelect<'_>) -> StoreResult<Vec<RawRow>>;

    fn update_column(&self, update: &ColumnUpdate<'_>) -> StoreResult<usize>;

    fn delete_all_rows(&self, table: &str) -> StoreResult<usize>;

    /// Side-table entries for one protocol, most recently inserted first.
    fn side_documents(&self, protocol: &str) -> StoreResult<Vec<SideDocument>>;

    fn insert_side_document(&self, document: &NewSideDocument) -> StoreResult<()>;
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn encode_bytea(bytes: &[u8]) -> Value {
    Value::String(format!("\\x{}", hex::encode(bytes)))
}

pub fn decode_bytea(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::String(text) => {
            let digits = text.strip_prefix("\\x").unwrap_or(text);
            hex::decode(digits).ok()
        }
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_u64().and_then(|byte| u8::try_from(byte).ok()))
            .collect(),
        _ => None,
    }
}
