use tracing::debug;

use crate::db::{RequestStore, StoreResult};
use crate::requests::columns::{ColumnSet, ResolvedColumns};
use crate::requests::Category;

pub const REQUEST_TABLE_PREFIX: &str = "requests_";
pub const SIDE_DOCUMENTS_TABLE: &str = "request_documents";

/// True when `name` follows the request-table convention: the prefix followed by at least one
/// ASCII alphanumeric or underscore, and nothing else.
pub fn is_request_table(name: &str) -> bool {
    match name.strip_prefix(REQUEST_TABLE_PREFIX) {
        Some(rest) => {
            !rest.is_empty() && rest.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        }
        None => false,
    }
}

/// Per-call view of the store's schema. Nothing is cached between calls.
pub struct SchemaCatalog<'a> {
    store: &'a dyn RequestStore,
}

impl<'a> SchemaCatalog<'a> {
    pub fn new(store: &'a dyn RequestStore) -> Self {
        Self { store }
    }

    pub fn all_tables(&self) -> StoreResult<Vec<String>> {
        self.store.list_tables()
    }

    /// Request tables in name order.
    pub fn list_tables(&self) -> StoreResult<Vec<String>> {
        let mut tables: Vec<String> = self
            .all_tables()?
            .into_iter()
            .filter(|name| is_request_table(name))
            .collect();
        tables.sort();
        tables.dedup();
        Ok(tables)
    }

    pub fn has_table(&self, name: &str) -> StoreResult<bool> {
        Ok(self.all_tables()?.iter().any(|t| t == name))
    }

    pub fn has_side_documents(&self) -> StoreResult<bool> {
        self.has_table(SIDE_DOCUMENTS_TABLE)
    }

    pub fn columns_of(&self, table: &str) -> StoreResult<ColumnSet> {
        Ok(ColumnSet::from_info(self.store.table_columns(table)?))
    }

    /// Shape of one request table, or `None` when the table cannot take part in aggregation.
    pub fn table_shape(&self, table: &str) -> StoreResult<Option<TableShape>> {
        let columns = self.columns_of(table)?;
        Ok(TableShape::new(table, columns))
    }
}

#[derive(Debug, Clone)]
pub struct TableShape {
    pub name: String,
    pub category: Option<Category>,
    pub columns: ColumnSet,
    pub resolved: ResolvedColumns,
}

impl TableShape {
    pub fn new(table: &str, columns: ColumnSet) -> Option<Self> {
        let category = Category::from_table(table);

        let Some(resolved) = ResolvedColumns::resolve(&columns) else {
            debug!(table, "skipping table without a protocol column");
            return None;
        };

        if let Some(category) = category {
            let required = category.required_columns();
            if !crate::requests::columns::table_has_all(&columns, required) {
                debug!(table, "skipping table missing required category columns");
                return None;
            }
        }

        Some(Self {
            name: table.to_string(),
            category,
            columns,
            resolved,
        })
    }
}
