use axum::extract::{Json, Multipart, Path, State};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::models::{Document, RequestRecord};
use crate::requests::{
    status_slug, RequestError, RequestStatus, ResponseOutcome, Scope, UploadedFile,
};
use crate::state::AppState;

#[derive(Serialize)]
pub struct RequestListResponse {
    pub requests: Vec<RequestRecord>,
    pub exam_types: Vec<String>,
    pub protocols: Vec<String>,
    pub statuses: Vec<&'static str>,
}

pub async fn list_requests(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<RequestListResponse>> {
    let scope = user.scope()?;
    let aggregation = state
        .run(move |ctx| Ok(ctx.aggregator().aggregate(&scope)?))
        .await?;

    Ok(Json(RequestListResponse {
        requests: aggregation.records,
        exam_types: aggregation.exam_types,
        protocols: aggregation.protocols,
        statuses: RequestStatus::labels(),
    }))
}

#[derive(Serialize)]
pub struct DocumentListResponse {
    pub protocol: String,
    pub documents: Vec<Document>,
}

pub async fn list_request_documents(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(protocol): Path<String>,
) -> AppResult<Json<DocumentListResponse>> {
    let scope = user.scope()?;
    let protocol = protocol.trim().to_string();
    let lookup = protocol.clone();
    let documents = state
        .run(move |ctx| {
            ensure_owner(&ctx.aggregator(), &scope, &lookup)?;
            Ok(ctx.locator().list_documents(&lookup)?)
        })
        .await?;

    Ok(Json(DocumentListResponse {
        protocol,
        documents,
    }))
}

/// Rejects owner-scoped callers asking for a protocol none of their rows carry.
pub(crate) fn ensure_owner(
    aggregator: &crate::requests::RequestAggregator<'_>,
    scope: &Scope,
    protocol: &str,
) -> AppResult<()> {
    if aggregator.owns_protocol(scope, protocol)? {
        Ok(())
    } else {
        Err(RequestError::Forbidden.into())
    }
}

#[derive(Deserialize)]
pub struct StatusUpdatePayload {
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Serialize)]
pub struct StatusUpdateResponse {
    pub ok: bool,
    pub status: String,
    pub status_slug: String,
}

pub async fn update_status(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<StatusUpdatePayload>,
) -> AppResult<Json<StatusUpdateResponse>> {
    user.require_consultant()?;

    let StatusUpdatePayload {
        protocol,
        origin,
        status,
    } = payload;
    let status = status.trim().to_string();
    let requested = status.clone();
    let updated = state
        .run(move |ctx| Ok(ctx.mutator().set_status(&origin, &protocol, &requested)?))
        .await?;

    if updated == 0 {
        return Err(RequestError::NotFound.into());
    }

    Ok(Json(StatusUpdateResponse {
        ok: true,
        status_slug: status_slug(&status),
        status,
    }))
}

#[derive(Serialize)]
pub struct FinalizeResponse {
    pub ok: bool,
    #[serde(flatten)]
    pub outcome: ResponseOutcome,
}

#[derive(Default)]
struct FinalizeForm {
    protocol: String,
    origin: String,
    response: String,
    file: Option<UploadedFile>,
}

async fn read_finalize_form(mut multipart: Multipart) -> AppResult<FinalizeForm> {
    let mut form = FinalizeForm::default();

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        error!(error = %err, "invalid multipart data");
        AppError::bad_request("invalid_multipart")
    })? {
        let name = field.name().map(|n| n.to_string());
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().map(|n| n.to_string()).unwrap_or_default();
                let bytes = field.bytes().await.map_err(|err| {
                    error!(error = %err, "failed to read file bytes");
                    AppError::bad_request("invalid_multipart")
                })?;
                if !filename.trim().is_empty() {
                    form.file = Some(UploadedFile {
                        filename,
                        bytes: bytes.to_vec(),
                    });
                }
            }
            Some(key @ ("protocol" | "origin" | "response")) => {
                let key = key.to_string();
                let value = field.text().await.map_err(|err| {
                    error!(error = %err, field = %key, "invalid form field");
                    AppError::bad_request("invalid_multipart")
                })?;
                match key.as_str() {
                    "protocol" => form.protocol = value,
                    "origin" => form.origin = value,
                    _ => form.response = value,
                }
            }
            _ => {}
        }
    }

    Ok(form)
}

pub async fn finalize_request(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    multipart: Multipart,
) -> AppResult<Json<FinalizeResponse>> {
    user.require_consultant()?;

    let form = read_finalize_form(multipart).await?;
    let consultant = user.login.clone();
    let outcome = state
        .run(move |ctx| {
            Ok(ctx.mutator().record_consultant_response(
                &form.origin,
                &form.protocol,
                &form.response,
                form.file,
            )?)
        })
        .await?;

    info!(consultant = %consultant, stored_name = ?outcome.stored_name, "request finalized");
    Ok(Json(FinalizeResponse { ok: true, outcome }))
}
