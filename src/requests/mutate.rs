use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::db::{ColumnUpdate, RowSelect};
use crate::models::NewSideDocument;
use crate::requests::catalog::{is_request_table, SchemaCatalog};
use crate::requests::columns::{ColumnRole, ColumnSet, CONSULTANT_RESPONSE_COLUMN};
use crate::requests::error::{RequestError, RequestResult};
use crate::requests::locator::DocumentLocator;
use crate::requests::normalize::value_text;
use crate::requests::safety::{is_pdf, is_safe_name, join_within, sanitize_filename};
use crate::requests::status::RequestStatus;
use crate::requests::RequestContext;

/// A file received alongside a consultant response.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResponseOutcome {
    pub stored_name: Option<String>,
    pub filename: Option<String>,
}

struct WriteTarget {
    table: String,
    protocol_column: &'static str,
    status_column: &'static str,
    columns: ColumnSet,
}

pub struct RequestMutator<'a> {
    ctx: &'a RequestContext<'a>,
}

impl<'a> RequestMutator<'a> {
    pub fn new(ctx: &'a RequestContext<'a>) -> Self {
        Self { ctx }
    }

    fn target(&self, table: &str) -> RequestResult<WriteTarget> {
        if !is_request_table(table) {
            return Err(RequestError::InvalidTable(table.to_string()));
        }
        let catalog = SchemaCatalog::new(self.ctx.store);
        if !catalog.has_table(table)? {
            return Err(RequestError::TableNotFound(table.to_string()));
        }
        let columns = catalog.columns_of(table)?;
        let (Some(protocol_column), Some(status_column)) = (
            ColumnRole::Protocol.resolve(&columns),
            ColumnRole::Status.resolve(&columns),
        ) else {
            return Err(RequestError::MissingColumns(table.to_string()));
        };
        Ok(WriteTarget {
            table: table.to_string(),
            protocol_column,
            status_column,
            columns,
        })
    }

    /// Sets the status of every row carrying `protocol` and returns how many matched.
    pub fn set_status(&self, table: &str, protocol: &str, status: &str) -> RequestResult<usize> {
        let (table, protocol, status) = (table.trim(), protocol.trim(), status.trim());
        if table.is_empty() || protocol.is_empty() || status.is_empty() {
            return Err(RequestError::MissingFields);
        }
        let status: RequestStatus = status.parse().map_err(RequestError::InvalidStatus)?;
        let target = self.target(table)?;

        let updated = self.ctx.store.update_column(&ColumnUpdate {
            table: &target.table,
            column: target.status_column,
            value: status.label(),
            key_column: target.protocol_column,
            key: protocol,
        })?;

        info!(table, protocol, status = %status, updated, "updated request status");
        Ok(updated)
    }

    /// Stores the consultant's final response on a finalized request, optionally with a PDF.
    ///
    /// The file is checked before the row is touched. Once the response is written the file is
    /// saved next to the protocol's existing documents; recording it in the side table is
    /// best-effort.
    pub fn record_consultant_response(
        &self,
        table: &str,
        protocol: &str,
        response: &str,
        file: Option<UploadedFile>,
    ) -> RequestResult<ResponseOutcome> {
        let (table, protocol, response) = (table.trim(), protocol.trim(), response.trim());
        if table.is_empty() || protocol.is_empty() || response.is_empty() {
            return Err(RequestError::MissingFields);
        }
        if !is_request_table(table) {
            return Err(RequestError::InvalidTable(table.to_string()));
        }
        if !is_safe_name(protocol) {
            return Err(RequestError::InvalidProtocol);
        }

        let target = self.target(table)?;
        if !target.columns.contains(CONSULTANT_RESPONSE_COLUMN) {
            return Err(RequestError::ColumnNotFound {
                table: target.table,
                column: CONSULTANT_RESPONSE_COLUMN.to_string(),
            });
        }

        let upload = file
            .filter(|file| !file.filename.trim().is_empty())
            .map(|file| {
                let original = file.filename.trim().to_string();
                let safe_name = sanitize_filename(&original);
                if safe_name.is_empty() || !is_pdf(&safe_name) {
                    return Err(RequestError::InvalidPdf);
                }
                Ok((original, safe_name, file.bytes))
            })
            .transpose()?;

        let rows = self.ctx.store.select_rows(
            &RowSelect::all(&target.table)
                .filter(target.protocol_column, protocol)
                .limit(1),
        )?;
        let row = rows.first().ok_or(RequestError::NotFound)?;
        let current = row
            .get(target.status_column)
            .and_then(value_text)
            .unwrap_or_default();
        if current.trim() != RequestStatus::Finalized.label() {
            return Err(RequestError::StatusNotFinalized(protocol.to_string()));
        }

        self.ctx.store.update_column(&ColumnUpdate {
            table: &target.table,
            column: CONSULTANT_RESPONSE_COLUMN,
            value: response,
            key_column: target.protocol_column,
            key: protocol,
        })?;
        info!(table, protocol, "recorded consultant response");

        let Some((original, safe_name, bytes)) = upload else {
            return Ok(ResponseOutcome::default());
        };

        let stored_name = format!("FINAL_{}_{}", Utc::now().format("%Y%m%d_%H%M%S"), safe_name);
        self.save_response_file(table, protocol, &stored_name, &bytes)?;

        if SchemaCatalog::new(self.ctx.store).has_side_documents()? {
            let entry = NewSideDocument {
                protocol: protocol.to_string(),
                filename: Some(original.clone()),
                stored_name: stored_name.clone(),
            };
            if let Err(err) = self.ctx.store.insert_side_document(&entry) {
                warn!(protocol, stored_name = %stored_name, error = %err, "failed to record response file in side table");
            }
        }

        Ok(ResponseOutcome {
            stored_name: Some(stored_name),
            filename: Some(original),
        })
    }

    fn save_response_file(
        &self,
        table: &str,
        protocol: &str,
        stored_name: &str,
        bytes: &[u8],
    ) -> RequestResult<()> {
        let locator = DocumentLocator::new(self.ctx.store, self.ctx.files, self.ctx.roots);
        let dir = match locator.existing_protocol_dir(protocol)? {
            Some(dir) => dir,
            None => {
                let dir = join_within(locator.creation_root(table), &[protocol])?;
                self.ctx
                    .files
                    .create_dir_all(&dir)
                    .map_err(RequestError::File)?;
                dir
            }
        };

        let path = join_within(&dir, &[stored_name])?;
        self.ctx
            .files
            .write(&path, bytes)
            .map_err(RequestError::File)?;
        info!(protocol, path = %path.display(), "stored consultant response file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ColumnInfo, MemoryRequestStore, RawRow, RequestStore, StoreError, StoreResult};
    use crate::models::SideDocument;
    use crate::requests::locator::DocumentRoots;
    use crate::requests::Category;
    use crate::storage::LocalDocumentStorage;
    use serde_json::json;

    const PERIODIC: &str = "requests_periodic";

    struct Fixture {
        _dir: tempfile::TempDir,
        store: MemoryRequestStore,
        files: LocalDocumentStorage,
        roots: DocumentRoots,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let roots = DocumentRoots::under(dir.path().join("uploads"), dir.path().join("db"));
            let store = MemoryRequestStore::new();
            store
                .create_table(PERIODIC, &["protocolo", "status_final", "resposta_consultor"])
                .unwrap();
            Self {
                _dir: dir,
                store,
                files: LocalDocumentStorage::new(),
                roots,
            }
        }

        fn ctx(&self) -> RequestContext<'_> {
            RequestContext::new(&self.store, &self.files, &self.roots)
        }

        fn insert(&self, protocol: &str, status: &str) {
            self.store
                .insert_row(PERIODIC, json!({ "protocolo": protocol, "status_final": status }))
                .unwrap();
        }

        fn column(&self, column: &str) -> serde_json::Value {
            self.store.rows(PERIODIC).unwrap()[0]
                .get(column)
                .cloned()
                .unwrap()
        }
    }

    fn pdf(name: &str) -> Option<UploadedFile> {
        Some(UploadedFile {
            filename: name.to_string(),
            bytes: b"%PDF-1.4".to_vec(),
        })
    }

    #[test]
    fn set_status_validates_before_writing() {
        let fx = Fixture::new();
        fx.insert("P1", "Em Aberto");
        let ctx = fx.ctx();
        let mutator = RequestMutator::new(&ctx);

        assert!(matches!(
            mutator.set_status(PERIODIC, "P1", "Cancelado"),
            Err(RequestError::InvalidStatus(_))
        ));
        assert!(matches!(
            mutator.set_status("users", "P1", "Finalizado"),
            Err(RequestError::InvalidTable(_))
        ));
        assert!(matches!(
            mutator.set_status("requests_unknown", "P1", "Finalizado"),
            Err(RequestError::TableNotFound(_))
        ));
        assert!(matches!(
            mutator.set_status(PERIODIC, " ", "Finalizado"),
            Err(RequestError::MissingFields)
        ));

        assert_eq!(mutator.set_status(PERIODIC, "P1", "Em Andamento").unwrap(), 1);
        assert_eq!(fx.column("status_final"), json!("Em Andamento"));
    }

    #[test]
    fn set_status_on_unknown_protocol_updates_nothing() {
        let fx = Fixture::new();
        fx.insert("P1", "Em Aberto");
        let ctx = fx.ctx();
        let updated = RequestMutator::new(&ctx)
            .set_status(PERIODIC, "P404", "Finalizado")
            .unwrap();
        assert_eq!(updated, 0);
    }

    #[test]
    fn set_status_requires_status_column() {
        let fx = Fixture::new();
        fx.store
            .create_table("requests_dismissal", &["protocolo"])
            .unwrap();
        let ctx = fx.ctx();
        assert!(matches!(
            RequestMutator::new(&ctx).set_status("requests_dismissal", "D1", "Finalizado"),
            Err(RequestError::MissingColumns(_))
        ));
    }

    #[test]
    fn response_requires_finalized_status() {
        let fx = Fixture::new();
        fx.insert("P1", "Em Andamento");
        let ctx = fx.ctx();
        let result =
            RequestMutator::new(&ctx).record_consultant_response(PERIODIC, "P1", "Apto", None);
        assert!(matches!(result, Err(RequestError::StatusNotFinalized(_))));
        assert_eq!(fx.column("resposta_consultor"), serde_json::Value::Null);
    }

    #[test]
    fn response_on_finalized_request_updates_only_the_response() {
        let fx = Fixture::new();
        fx.insert("P1", "Finalizado");
        let ctx = fx.ctx();
        let outcome = RequestMutator::new(&ctx)
            .record_consultant_response(PERIODIC, "P1", " Apto ", None)
            .unwrap();
        assert_eq!(outcome, ResponseOutcome::default());
        assert_eq!(fx.column("resposta_consultor"), json!("Apto"));
        assert_eq!(fx.column("status_final"), json!("Finalizado"));
    }

    #[test]
    fn response_requires_the_literal_response_column() {
        let fx = Fixture::new();
        fx.store
            .create_table("requests_dismissal", &["protocolo", "status_final"])
            .unwrap();
        let ctx = fx.ctx();
        let result = RequestMutator::new(&ctx).record_consultant_response(
            "requests_dismissal",
            "D1",
            "Apto",
            None,
        );
        assert!(matches!(result, Err(RequestError::ColumnNotFound { .. })));
    }

    #[test]
    fn non_pdf_upload_fails_before_the_row_is_touched() {
        let fx = Fixture::new();
        fx.insert("P1", "Finalizado");
        let ctx = fx.ctx();
        let result = RequestMutator::new(&ctx).record_consultant_response(
            PERIODIC,
            "P1",
            "Apto",
            pdf("laudo.docx"),
        );
        assert!(matches!(result, Err(RequestError::InvalidPdf)));
        assert_eq!(fx.column("resposta_consultor"), serde_json::Value::Null);
    }

    #[test]
    fn response_file_is_created_under_the_category_root() {
        let fx = Fixture::new();
        fx.insert("P1", "Finalizado");
        fx.store.enable_side_documents().unwrap();
        let ctx = fx.ctx();
        let outcome = RequestMutator::new(&ctx)
            .record_consultant_response(PERIODIC, "P1", "Apto", pdf("Laudo Final.pdf"))
            .unwrap();

        let stored = outcome.stored_name.unwrap();
        assert!(stored.starts_with("FINAL_"));
        assert!(stored.ends_with("_Laudo_Final.pdf"));
        assert_eq!(outcome.filename.as_deref(), Some("Laudo Final.pdf"));

        let periodic_root = fx.roots.root_for(Category::Periodic).unwrap();
        assert!(periodic_root.join("P1").join(&stored).is_file());
        assert_eq!(fx.store.side_document_count().unwrap(), 1);
    }

    #[test]
    fn response_file_joins_an_existing_protocol_directory() {
        let fx = Fixture::new();
        fx.insert("P1", "Finalizado");
        let existing = fx.roots.uploads.join("P1");
        std::fs::create_dir_all(&existing).unwrap();

        let ctx = fx.ctx();
        let outcome = RequestMutator::new(&ctx)
            .record_consultant_response(PERIODIC, "P1", "Apto", pdf("aso.pdf"))
            .unwrap();
        assert!(existing.join(outcome.stored_name.unwrap()).is_file());
    }

    /// Delegates to the in-memory store but refuses every side-table insert.
    struct SideInsertFails(MemoryRequestStore);

    impl RequestStore for SideInsertFails {
        fn list_tables(&self) -> StoreResult<Vec<String>> {
            self.0.list_tables()
        }

        fn table_columns(&self, table: &str) -> StoreResult<Vec<ColumnInfo>> {
            self.0.table_columns(table)
        }

        fn select_rows(&self, select: &RowSelect<'_>) -> StoreResult<Vec<RawRow>> {
            self.0.select_rows(select)
        }

        fn update_column(&self, update: &ColumnUpdate<'_>) -> StoreResult<usize> {
            self.0.update_column(update)
        }

        fn delete_all_rows(&self, table: &str) -> StoreResult<usize> {
            self.0.delete_all_rows(table)
        }

        fn side_documents(&self, protocol: &str) -> StoreResult<Vec<SideDocument>> {
            self.0.side_documents(protocol)
        }

        fn insert_side_document(&self, _document: &NewSideDocument) -> StoreResult<()> {
            Err(StoreError::Unavailable("side table offline".to_string()))
        }
    }

    #[test]
    fn failed_side_table_insert_keeps_response_and_file() {
        let fx = Fixture::new();
        let store = MemoryRequestStore::new();
        store
            .create_table(PERIODIC, &["protocolo", "status_final", "resposta_consultor"])
            .unwrap();
        store
            .insert_row(PERIODIC, json!({ "protocolo": "P1", "status_final": "Finalizado" }))
            .unwrap();
        store.enable_side_documents().unwrap();
        let failing = SideInsertFails(store);
        let ctx = RequestContext::new(&failing, &fx.files, &fx.roots);

        let outcome = RequestMutator::new(&ctx)
            .record_consultant_response(PERIODIC, "P1", "Apto", pdf("laudo.pdf"))
            .unwrap();

        let stored = outcome.stored_name.expect("file stored despite side-table failure");
        let row = failing.0.rows(PERIODIC).unwrap();
        assert_eq!(
            row[0].get("resposta_consultor"),
            Some(&serde_json::Value::String("Apto".into()))
        );
        let periodic_root = fx.roots.root_for(Category::Periodic).unwrap();
        assert!(periodic_root.join("P1").join(&stored).is_file());
        assert_eq!(failing.0.side_document_count().unwrap(), 0);
    }
}
