use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, info};

use crate::db::{Direction, RawRow, RowOrder, RowSelect};
use crate::models::RequestRecord;
use crate::requests::catalog::{SchemaCatalog, TableShape};
use crate::requests::error::{RequestError, RequestResult};
use crate::requests::locator::DocumentLocator;
use crate::requests::normalize::{
    has_payload, value_text, RowNormalizer, BLOB_FILENAME_COLUMN, BLOB_PAYLOAD_COLUMN,
};
use crate::requests::safety::is_safe_name;
use crate::requests::{Category, RequestContext};

/// Whose requests a caller may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// A client: rows whose CPF (preferred) or login column equals these values.
    Owner { cpf: String, login: String },
    /// A consultant: every row of every table.
    Unrestricted,
}

impl Scope {
    pub fn owner(cpf: Option<&str>, login: &str) -> Self {
        Scope::Owner {
            cpf: cpf.unwrap_or_default().trim().to_string(),
            login: login.trim().to_string(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Scope::Owner { .. } => "owner",
            Scope::Unrestricted => "unrestricted",
        }
    }

    /// Row filter for one table, `None` when the table cannot be matched against this owner.
    fn owner_filter<'s>(&'s self, shape: &TableShape) -> Option<(&'static str, &'s str)> {
        let Scope::Owner { cpf, login } = self else {
            return None;
        };
        match (shape.resolved.owner_cpf, shape.resolved.owner_login) {
            (Some(column), _) if !cpf.is_empty() => Some((column, cpf.as_str())),
            (_, Some(column)) if !login.is_empty() => Some((column, login.as_str())),
            _ => None,
        }
    }

    /// Whether `row` of `shape` belongs to this caller.
    pub fn permits(&self, shape: &TableShape, row: &RawRow) -> bool {
        let Scope::Owner { cpf, login } = self else {
            return true;
        };
        let matches = |column: Option<&str>, wanted: &str| {
            !wanted.is_empty()
                && column
                    .and_then(|column| row.get(column))
                    .and_then(value_text)
                    .is_some_and(|value| value.trim() == wanted)
        };
        matches(shape.resolved.owner_cpf, cpf) || matches(shape.resolved.owner_login, login)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Aggregation {
    pub records: Vec<RequestRecord>,
    pub exam_types: Vec<String>,
    pub protocols: Vec<String>,
}

/// Bytes of a document stored inside a request row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

pub struct RequestAggregator<'a> {
    ctx: &'a RequestContext<'a>,
}

impl<'a> RequestAggregator<'a> {
    pub fn new(ctx: &'a RequestContext<'a>) -> Self {
        Self { ctx }
    }

    fn catalog(&self) -> SchemaCatalog<'a> {
        SchemaCatalog::new(self.ctx.store)
    }

    pub fn aggregate(&self, scope: &Scope) -> RequestResult<Aggregation> {
        let catalog = self.catalog();
        let locator = DocumentLocator::new(self.ctx.store, self.ctx.files, self.ctx.roots);
        let normalizer = RowNormalizer::new(&locator);

        let mut rows = Vec::new();
        for table in catalog.list_tables()? {
            let Some(shape) = catalog.table_shape(&table)? else {
                continue;
            };

            let mut select = RowSelect::all(&shape.name);
            if let Scope::Owner { .. } = scope {
                let Some((column, value)) = scope.owner_filter(&shape) else {
                    debug!(table = %shape.name, "skipping table without owner columns");
                    continue;
                };
                select = select.filter(column, value);
            }

            let direction = match scope {
                Scope::Owner { .. } => Direction::Desc,
                Scope::Unrestricted => Direction::Asc,
            };
            select = select.order(match shape.resolved.created_at {
                Some(column) => RowOrder::Column(column, direction),
                None => RowOrder::Sequence(direction),
            });

            for row in self.ctx.store.select_rows(&select)? {
                rows.push(normalizer.normalize(&shape, &row)?);
            }
        }

        if *scope == Scope::Unrestricted {
            rows.sort_by_key(|row| row.sort_key);
        }

        let records: Vec<RequestRecord> = rows.into_iter().map(|row| row.record).collect();
        let exam_types = distinct(records.iter().map(|r| r.exam_type.as_str()));
        let protocols = distinct(records.iter().map(|r| r.protocol.as_str()));

        info!(scope = scope.kind(), count = records.len(), "aggregated requests");
        Ok(Aggregation {
            records,
            exam_types,
            protocols,
        })
    }

    /// True when some row with this protocol is visible to `scope`.
    pub fn owns_protocol(&self, scope: &Scope, protocol: &str) -> RequestResult<bool> {
        if !is_safe_name(protocol) {
            return Err(RequestError::InvalidProtocol);
        }
        if *scope == Scope::Unrestricted {
            return Ok(true);
        }

        let catalog = self.catalog();
        for table in catalog.list_tables()? {
            let Some(shape) = catalog.table_shape(&table)? else {
                continue;
            };
            let rows = self
                .ctx
                .store
                .select_rows(&RowSelect::all(&shape.name).filter(shape.resolved.protocol, protocol))?;
            if rows.iter().any(|row| scope.permits(&shape, row)) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Document stored in the row's own binary column, for categories that keep one.
    pub fn fetch_attachment(
        &self,
        category: Category,
        protocol: &str,
        scope: &Scope,
    ) -> RequestResult<Attachment> {
        if category.blob_sentinel().is_none() {
            return Err(RequestError::NotFound);
        }
        if !is_safe_name(protocol) {
            return Err(RequestError::InvalidProtocol);
        }

        let catalog = self.catalog();
        let table = category.table_name();
        if !catalog.has_table(table)? {
            return Err(RequestError::NotFound);
        }
        let columns = catalog.columns_of(table)?;
        let shape = TableShape::new(table, columns).ok_or(RequestError::NotFound)?;
        if !shape.columns.contains(BLOB_FILENAME_COLUMN) || !shape.columns.contains(BLOB_PAYLOAD_COLUMN)
        {
            return Err(RequestError::NotFound);
        }

        let rows = self.ctx.store.select_rows(
            &RowSelect::all(table)
                .filter(shape.resolved.protocol, protocol)
                .limit(1),
        )?;
        let row = rows.first().ok_or(RequestError::NotFound)?;
        if !scope.permits(&shape, row) {
            return Err(RequestError::Forbidden);
        }

        let filename = row
            .get(BLOB_FILENAME_COLUMN)
            .and_then(value_text)
            .map(|name| name.trim().to_string())
            .unwrap_or_default();
        let payload = row.get(BLOB_PAYLOAD_COLUMN);
        if filename.is_empty() || !has_payload(payload) {
            return Err(RequestError::NotFound);
        }

        let bytes = match payload {
            Some(value) => crate::db::decode_bytea(value)
                .or_else(|| value.as_str().map(|text| text.as_bytes().to_vec()))
                .unwrap_or_default(),
            None => Vec::new(),
        };
        let content_type = mime_guess::from_path(&filename)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        Ok(Attachment {
            filename,
            content_type,
            bytes,
        })
    }
}

fn distinct<'r>(values: impl Iterator<Item = &'r str>) -> Vec<String> {
    values
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
