use std::path::PathBuf;

use tracing::{info, warn};

use crate::db::RowSelect;
use crate::requests::catalog::{is_request_table, SchemaCatalog};
use crate::requests::columns::ColumnRole;
use crate::requests::error::{RequestError, RequestResult};
use crate::requests::normalize::value_text;
use crate::requests::safety::join_within;
use crate::requests::{Category, RequestContext};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClearReport {
    pub deleted_rows: usize,
    pub removed_dirs: Vec<PathBuf>,
    pub missing_dirs: Vec<PathBuf>,
    pub skipped_protocols: Vec<String>,
}

/// Deletes every row of one category table together with each protocol's directory under that
/// category's root. With `dry_run` nothing is touched and the report lists what would go.
pub fn clear_category(
    ctx: &RequestContext<'_>,
    table: &str,
    dry_run: bool,
) -> RequestResult<ClearReport> {
    if !is_request_table(table) {
        return Err(RequestError::InvalidTable(table.to_string()));
    }
    let category =
        Category::from_table(table).ok_or_else(|| RequestError::InvalidTable(table.to_string()))?;
    let root = ctx
        .roots
        .root_for(category)
        .ok_or_else(|| RequestError::InvalidTable(table.to_string()))?;

    let catalog = SchemaCatalog::new(ctx.store);
    if !catalog.has_table(table)? {
        return Err(RequestError::TableNotFound(table.to_string()));
    }
    let columns = catalog.columns_of(table)?;
    let protocol_column = ColumnRole::Protocol
        .resolve(&columns)
        .ok_or_else(|| RequestError::MissingColumns(table.to_string()))?;

    let rows = ctx.store.select_rows(&RowSelect::all(table))?;
    let mut report = ClearReport::default();
    let mut targets = Vec::new();
    for row in &rows {
        let protocol = row
            .get(protocol_column)
            .and_then(value_text)
            .map(|p| p.trim().to_string())
            .unwrap_or_default();
        if protocol.is_empty() {
            continue;
        }
        match join_within(root, &[protocol.as_str()]) {
            Ok(dir) if dir.as_path() != root => targets.push(dir),
            _ => {
                warn!(table, protocol = %protocol, "skipping protocol that does not name a directory under the category root");
                report.skipped_protocols.push(protocol);
            }
        }
    }

    if dry_run {
        report.deleted_rows = rows.len();
        for dir in targets {
            if ctx.files.is_dir(&dir) {
                report.removed_dirs.push(dir);
            } else {
                report.missing_dirs.push(dir);
            }
        }
        return Ok(report);
    }

    report.deleted_rows = ctx.store.delete_all_rows(table)?;
    for dir in targets {
        if !ctx.files.is_dir(&dir) {
            report.missing_dirs.push(dir);
            continue;
        }
        ctx.files.remove_dir_all(&dir).map_err(RequestError::File)?;
        report.removed_dirs.push(dir);
    }

    info!(
        table,
        deleted_rows = report.deleted_rows,
        removed_dirs = report.removed_dirs.len(),
        "cleared request category"
    );
    Ok(report)
}
