use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;

use super::requests::ensure_owner;
use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::requests::safety::{is_safe_name, join_within};
use crate::requests::{Attachment, Category, RequestError};
use crate::state::AppState;

fn attachment_content_disposition(filename: &str) -> Option<String> {
    if filename.is_empty() {
        return None;
    }

    let sanitized: String = filename
        .chars()
        .map(|ch| match ch {
            '"' | '\\' => '_',
            ch if ch.is_control() => '_',
            _ => ch,
        })
        .collect();
    let ascii: String = sanitized
        .chars()
        .map(|ch| if ch.is_ascii() { ch } else { '_' })
        .collect();

    let encoded =
        percent_encoding::utf8_percent_encode(&sanitized, percent_encoding::NON_ALPHANUMERIC);
    Some(format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii, encoded
    ))
}

fn file_response(attachment: Attachment) -> AppResult<impl IntoResponse> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&attachment.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    if let Some(disposition) = attachment_content_disposition(&attachment.filename) {
        let value = HeaderValue::from_str(&disposition).map_err(AppError::internal)?;
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok((StatusCode::OK, headers, attachment.bytes))
}

/// Streams one stored document of a protocol from whichever root holds it.
pub async fn download_document(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((protocol, stored_name)): Path<(String, String)>,
) -> AppResult<impl IntoResponse> {
    let scope = user.scope()?;
    let attachment = state
        .run(move |ctx| {
            if !is_safe_name(&protocol) {
                return Err(RequestError::InvalidProtocol.into());
            }
            if !is_safe_name(&stored_name) {
                return Err(RequestError::InvalidFilename.into());
            }
            ensure_owner(&ctx.aggregator(), &scope, &protocol)?;

            let dir = ctx
                .locator()
                .resolve_single(&protocol, &stored_name)?
                .ok_or(RequestError::NotFound)?;

            let path = join_within(&dir, &[stored_name.as_str()]).map_err(RequestError::from)?;
            let bytes = ctx.files.read(&path).map_err(RequestError::File)?;
            let content_type = mime_guess::from_path(&stored_name)
                .first_or_octet_stream()
                .essence_str()
                .to_string();
            Ok(Attachment {
                filename: stored_name,
                content_type,
                bytes,
            })
        })
        .await?;

    file_response(attachment)
}

/// Serves the document kept inside a request row, for the categories that store one.
pub async fn download_attachment(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((category, protocol)): Path<(String, String)>,
) -> AppResult<impl IntoResponse> {
    let scope = user.scope()?;
    let category = Category::from_slug(&category)
        .filter(|category| category.blob_sentinel().is_some())
        .ok_or_else(AppError::not_found)?;

    let attachment = state
        .run(move |ctx| {
            Ok(ctx
                .aggregator()
                .fetch_attachment(category, &protocol, &scope)?)
        })
        .await?;

    file_response(attachment)
}
