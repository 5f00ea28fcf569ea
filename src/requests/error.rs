use thiserror::Error;

use crate::db::StoreError;
use crate::requests::safety::PathTraversal;

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("missing required fields")]
    MissingFields,
    #[error("{0} is not a request table")]
    InvalidTable(String),
    #[error("{0:?} is not an accepted status")]
    InvalidStatus(String),
    #[error("invalid protocol identifier")]
    InvalidProtocol,
    #[error("invalid file name")]
    InvalidFilename,
    #[error("only PDF files are accepted")]
    InvalidPdf,
    #[error("table {0} lacks the protocol or status column")]
    MissingColumns(String),
    #[error("table {table} has no column {column}")]
    ColumnNotFound { table: String, column: String },
    #[error("table {0} does not exist")]
    TableNotFound(String),
    #[error("not found")]
    NotFound,
    #[error("forbidden")]
    Forbidden,
    #[error("request {0} is not finalized")]
    StatusNotFinalized(String),
    #[error(transparent)]
    UnsafePath(#[from] PathTraversal),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("storage error: {0}")]
    Storage(StoreError),
    #[error("file error: {0:#}")]
    File(anyhow::Error),
}

pub type RequestResult<T> = Result<T, RequestError>;

impl RequestError {
    /// Stable machine-readable code returned to API callers.
    pub fn code(&self) -> &'static str {
        match self {
            RequestError::MissingFields => "missing_fields",
            RequestError::InvalidTable(_) => "invalid_table",
            RequestError::InvalidStatus(_) => "invalid_status",
            RequestError::InvalidProtocol => "invalid_protocol",
            RequestError::InvalidFilename => "invalid_filename",
            RequestError::InvalidPdf => "invalid_pdf",
            RequestError::MissingColumns(_) => "missing_columns",
            RequestError::ColumnNotFound { .. } => "column_not_found",
            RequestError::TableNotFound(_) => "table_not_found",
            RequestError::NotFound => "not_found",
            RequestError::Forbidden => "forbidden",
            RequestError::StatusNotFinalized(_) => "status_not_finalized",
            RequestError::UnsafePath(_) => "unsafe_path",
            RequestError::StorageUnavailable(_) => "storage_unavailable",
            RequestError::Storage(_) => "storage_error",
            RequestError::File(_) => "file_error",
        }
    }
}

impl From<StoreError> for RequestError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Unavailable(message) => RequestError::StorageUnavailable(message),
            StoreError::UnknownTable(table) => RequestError::TableNotFound(table),
            other => RequestError::Storage(other),
        }
    }
}
