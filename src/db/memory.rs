use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use serde_json::{Map, Value};

use super::{
    ColumnInfo, ColumnUpdate, Direction, RawRow, RequestStore, RowOrder, RowSelect, StoreError,
    StoreResult,
};
use crate::models::{NewSideDocument, SideDocument};
use crate::requests::catalog::SIDE_DOCUMENTS_TABLE;
use crate::requests::normalize::value_text;

#[derive(Debug, Default)]
struct MemoryTable {
    columns: Vec<String>,
    rows: Vec<RawRow>,
    next_seq: i64,
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: BTreeMap<String, MemoryTable>,
    side_documents: Option<Vec<(String, SideDocument)>>,
}

/// In-process store with the same observable semantics as [`super::PgRequestStore`]: filters
/// compare the text form of a value, NULLs sort last, and rows carry an insertion sequence.
#[derive(Debug, Default)]
pub struct MemoryRequestStore {
    state: Mutex<MemoryState>,
}

impl MemoryRequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }

    pub fn create_table(&self, name: &str, columns: &[&str]) -> StoreResult<()> {
        let mut state = self.lock()?;
        state.tables.insert(
            name.to_string(),
            MemoryTable {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows: Vec::new(),
                next_seq: 1,
            },
        );
        Ok(())
    }

    pub fn add_column(&self, table: &str, column: &str) -> StoreResult<()> {
        let mut state = self.lock()?;
        let entry = state
            .tables
            .get_mut(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        if !entry.columns.iter().any(|c| c == column) {
            entry.columns.push(column.to_string());
        }
        Ok(())
    }

    /// Inserts a row; columns missing from `values` are stored as NULL and unknown keys are
    /// ignored, mirroring an `INSERT` that names a subset of columns.
    pub fn insert_row(&self, table: &str, values: Value) -> StoreResult<i64> {
        let mut state = self.lock()?;
        let entry = state
            .tables
            .get_mut(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;

        let provided = match values {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let mut row = Map::new();
        for column in &entry.columns {
            row.insert(
                column.clone(),
                provided.get(column).cloned().unwrap_or(Value::Null),
            );
        }

        let seq = entry.next_seq;
        entry.next_seq += 1;
        entry.rows.push(RawRow { seq, values: row });
        Ok(seq)
    }

    pub fn enable_side_documents(&self) -> StoreResult<()> {
        let mut state = self.lock()?;
        if state.side_documents.is_none() {
            state.side_documents = Some(Vec::new());
        }
        Ok(())
    }

    pub fn side_document_count(&self) -> StoreResult<usize> {
        let state = self.lock()?;
        Ok(state.side_documents.as_ref().map_or(0, Vec::len))
    }

    pub fn rows(&self, table: &str) -> StoreResult<Vec<RawRow>> {
        let state = self.lock()?;
        state
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))
    }
}

fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    let left = left.filter(|v| !v.is_null());
    let right = right.filter(|v| !v.is_null());
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(a), Some(b)) => value_text(a).cmp(&value_text(b)),
    }
}

impl RequestStore for MemoryRequestStore {
    fn list_tables(&self) -> StoreResult<Vec<String>> {
        let state = self.lock()?;
        let mut names: Vec<String> = state.tables.keys().cloned().collect();
        if state.side_documents.is_some() {
            names.push(SIDE_DOCUMENTS_TABLE.to_string());
        }
        names.sort();
        Ok(names)
    }

    fn table_columns(&self, table: &str) -> StoreResult<Vec<ColumnInfo>> {
        let state = self.lock()?;
        Ok(state
            .tables
            .get(table)
            .map(|t| {
                t.columns
                    .iter()
                    .map(|name| ColumnInfo {
                        name: name.clone(),
                        data_type: "text".to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    fn select_rows(&self, select: &RowSelect<'_>) -> StoreResult<Vec<RawRow>> {
        let state = self.lock()?;
        let table = state
            .tables
            .get(select.table)
            .ok_or_else(|| StoreError::UnknownTable(select.table.to_string()))?;

        let mut rows: Vec<RawRow> = table
            .rows
            .iter()
            .filter(|row| match select.filter {
                Some(filter) => {
                    row.get(filter.column).and_then(value_text).as_deref() == Some(filter.value)
                }
                None => true,
            })
            .cloned()
            .collect();

        match select.order {
            RowOrder::Column(column, direction) => rows.sort_by(|a, b| {
                let left = a.get(column);
                let right = b.get(column);
                let both_present = left.is_some_and(|v| !v.is_null())
                    && right.is_some_and(|v| !v.is_null());
                // NULLS LAST in both directions
                let primary = if both_present && direction == Direction::Desc {
                    compare_values(left, right).reverse()
                } else {
                    compare_values(left, right)
                };
                let tie = match direction {
                    Direction::Asc => a.seq.cmp(&b.seq),
                    Direction::Desc => b.seq.cmp(&a.seq),
                };
                primary.then(tie)
            }),
            RowOrder::Sequence(Direction::Asc) => rows.sort_by_key(|row| row.seq),
            RowOrder::Sequence(Direction::Desc) => {
                rows.sort_by_key(|row| std::cmp::Reverse(row.seq))
            }
        }

        if let Some(limit) = select.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    fn update_column(&self, update: &ColumnUpdate<'_>) -> StoreResult<usize> {
        let mut state = self.lock()?;
        let table = state
            .tables
            .get_mut(update.table)
            .ok_or_else(|| StoreError::UnknownTable(update.table.to_string()))?;

        let mut updated = 0;
        for row in table.rows.iter_mut() {
            let matches =
                row.get(update.key_column).and_then(value_text).as_deref() == Some(update.key);
            if matches {
                row.values.insert(
                    update.column.to_string(),
                    Value::String(update.value.to_string()),
                );
                updated += 1;
            }
        }
        Ok(updated)
    }

    fn delete_all_rows(&self, table: &str) -> StoreResult<usize> {
        let mut state = self.lock()?;
        let table = state
            .tables
            .get_mut(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        let removed = table.rows.len();
        table.rows.clear();
        Ok(removed)
    }

    fn side_documents(&self, protocol: &str) -> StoreResult<Vec<SideDocument>> {
        let state = self.lock()?;
        let docs = state
            .side_documents
            .as_ref()
            .ok_or_else(|| StoreError::UnknownTable(SIDE_DOCUMENTS_TABLE.to_string()))?;
        Ok(docs
            .iter()
            .rev()
            .filter(|(owner, _)| owner == protocol)
            .map(|(_, doc)| doc.clone())
            .collect())
    }

    fn insert_side_document(&self, document: &NewSideDocument) -> StoreResult<()> {
        let mut state = self.lock()?;
        let docs = state
            .side_documents
            .as_mut()
            .ok_or_else(|| StoreError::UnknownTable(SIDE_DOCUMENTS_TABLE.to_string()))?;
        docs.push((
            document.protocol.clone(),
            SideDocument {
                filename: document.filename.clone(),
                stored_name: Some(document.stored_name.clone()),
            },
        ));
        Ok(())
    }
}
