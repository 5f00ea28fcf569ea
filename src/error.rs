use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt::Display;
use tracing::error;

use crate::db::StoreError;
use crate::requests::RequestError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized")
    }

    pub fn forbidden() -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden")
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found")
    }

    pub fn internal<E: Display>(error: E) -> Self {
        error!(error = %error, "internal error");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = Json(ErrorResponse {
            ok: false,
            error: self.message,
        });
        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    ok: bool,
    error: String,
}

fn status_for(error: &RequestError) -> StatusCode {
    match error {
        RequestError::MissingFields
        | RequestError::InvalidTable(_)
        | RequestError::InvalidStatus(_)
        | RequestError::InvalidProtocol
        | RequestError::InvalidFilename
        | RequestError::InvalidPdf
        | RequestError::MissingColumns(_)
        | RequestError::ColumnNotFound { .. }
        | RequestError::UnsafePath(_) => StatusCode::BAD_REQUEST,
        RequestError::Forbidden => StatusCode::FORBIDDEN,
        RequestError::NotFound | RequestError::TableNotFound(_) => StatusCode::NOT_FOUND,
        RequestError::StatusNotFinalized(_) => StatusCode::CONFLICT,
        RequestError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        RequestError::Storage(_) | RequestError::File(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<RequestError> for AppError {
    fn from(value: RequestError) -> Self {
        let status = status_for(&value);
        if status.is_server_error() {
            error!(error = %value, code = value.code(), "request operation failed");
        }
        AppError::new(status, value.code())
    }
}

impl From<StoreError> for AppError {
    fn from(value: StoreError) -> Self {
        AppError::from(RequestError::from(value))
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(value: jsonwebtoken::errors::Error) -> Self {
        AppError::internal(value)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        AppError::internal(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        AppError::internal(value)
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(value: tokio::task::JoinError) -> Self {
        AppError::internal(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_request_errors_to_http_statuses() {
        let cases = [
            (RequestError::InvalidStatus("x".into()), StatusCode::BAD_REQUEST, "invalid_status"),
            (RequestError::NotFound, StatusCode::NOT_FOUND, "not_found"),
            (
                RequestError::StatusNotFinalized("P1".into()),
                StatusCode::CONFLICT,
                "status_not_finalized",
            ),
            (
                RequestError::StorageUnavailable("down".into()),
                StatusCode::SERVICE_UNAVAILABLE,
                "storage_unavailable",
            ),
            (RequestError::Forbidden, StatusCode::FORBIDDEN, "forbidden"),
        ];
        for (error, status, code) in cases {
            let app = AppError::from(error);
            assert_eq!(app.status(), status);
            assert_eq!(app.message(), code);
        }
    }
}
