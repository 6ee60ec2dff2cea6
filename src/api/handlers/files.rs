use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{record_error, replication_error};
use crate::api::response::{ApiError, AppQuery, JSend, JSendPaginated, Pagination};
use crate::auth::{RequireUser, Session};
use crate::object_store::ObjectStoreError;
use crate::secrets;
use crate::storage::models::{FileRecord, Owner, WriteOp};
use crate::upload::{Submission, UploadError, UploadFile, UploadRequest};
use crate::AppState;

/// Header carrying the password of a protected file on download.
pub const FILE_PASSWORD_HEADER: &str = "x-file-password";

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct FileResponse {
    pub byte_size: u64,
    pub created_at: String,
    pub file_id: String,
    pub mime_type: String,
    pub name: String,
    pub owner: Option<Owner>,
    pub password_protected: bool,
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub file: FileResponse,
    /// The password chosen at upload, echoed back so it can be shared.
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListFilesParams {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    20
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    Session(session): Session,
    mut multipart: Multipart,
) -> Result<Json<JSend<UploadResponse>>, ApiError> {
    let mut request = UploadRequest::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("").to_string();
                let content_type = field.content_type().map(|s| s.to_string());
                let data = field.bytes().await.map_err(multipart_error)?;

                // Browsers send an empty, unnamed part when nothing was picked
                if file_name.is_empty() && data.is_empty() {
                    continue;
                }

                request.file = Some(UploadFile {
                    mime_type: resolve_mime_type(content_type, &file_name),
                    name: file_name,
                    data,
                });
            }
            "password" => {
                request.password = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::bad_request(format!("Invalid password: {e}")))?,
                );
            }
            "api_key" => {
                request.api_key = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::bad_request(format!("Invalid api_key: {e}")))?,
                );
            }
            _ => {
                // Ignore unknown fields
            }
        }
    }

    let mut submission = Submission::new();
    let outcome = state
        .uploads
        .submit(&mut submission, &session, request)
        .await
        .map_err(upload_error)?;

    Ok(JSend::success(UploadResponse {
        file: file_to_response(&outcome.record),
        password: outcome.password,
    }))
}

pub async fn get_file(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
) -> Result<Json<JSend<FileResponse>>, ApiError> {
    let file = find_file(&state, &file_id)?;
    Ok(JSend::success(file_to_response(&file)))
}

/// Serve file content. Password-protected files need the password in
/// the `x-file-password` header.
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let file = find_file(&state, &file_id)?;

    if let Some(hash) = file.password_hash.clone() {
        let password = headers
            .get(FILE_PASSWORD_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| ApiError::forbidden("This file is password protected."))?;

        let matches =
            tokio::task::spawn_blocking(move || secrets::verify_password(&password, &hash))
                .await
                .map_err(|e| ApiError::internal(e.to_string()))?;
        if !matches {
            return Err(ApiError::forbidden("Incorrect password."));
        }
    }

    let data = state
        .object_store
        .get(&file.path)
        .await
        .map_err(|e| match e {
            ObjectStoreError::NotFound(_) => ApiError::not_found("File content not found"),
            _ => ApiError::internal(format!("Failed to retrieve file: {e}")),
        })?;

    Ok(content_response(&state, &file, data))
}

/// Files uploaded by the signed-in user, newest first.
pub async fn list_my_files(
    State(state): State<Arc<AppState>>,
    RequireUser(user): RequireUser,
    AppQuery(params): AppQuery<ListFilesParams>,
) -> Result<Json<JSendPaginated<FileResponse>>, ApiError> {
    if params.limit == 0 {
        return Err(ApiError::bad_request("limit must be greater than 0"));
    }

    let files = state
        .db
        .get_files_by_owner(&user.id)
        .map_err(|e| ApiError::internal(e.to_string()))?;

    let total = files.len() as u64;
    let items: Vec<FileResponse> = files
        .iter()
        .skip(params.offset as usize)
        .take(params.limit as usize)
        .map(file_to_response)
        .collect();

    Ok(JSendPaginated::success(
        items,
        Pagination {
            limit: params.limit,
            offset: params.offset,
            total,
        },
    ))
}

pub async fn delete_my_file(
    State(state): State<Arc<AppState>>,
    RequireUser(user): RequireUser,
    Path(file_id): Path<String>,
) -> Result<Json<JSend<()>>, ApiError> {
    let file = find_file(&state, &file_id)?;
    if !file.is_owned_by(&user.id) {
        return Err(ApiError::forbidden("You can only delete your own files."));
    }

    // Phase 1: Remove metadata via muster
    let operation = WriteOp::DeleteFile {
        file_id: file_id.clone(),
    };
    state
        .node
        .replicate(operation)
        .await
        .map_err(replication_error)?;

    // Phase 2: Delete blob from object storage (best-effort)
    if let Err(e) = state.object_store.delete(&file.path).await {
        tracing::warn!(file_id = %file_id, error = %e, "Failed to delete file from object storage");
    }

    tracing::debug!(file_id = %file_id, "Deleted file");
    Ok(JSend::success(()))
}

// ============================================================================
// Helpers
// ============================================================================

fn find_file(state: &AppState, file_id: &str) -> Result<FileRecord, ApiError> {
    state
        .db
        .get_file(file_id)
        .map_err(|e| ApiError::internal(e.to_string()))?
        .ok_or_else(|| ApiError::not_found("File not found"))
}

/// MIME type from the multipart Content-Type, else guessed from the name, else octet-stream.
fn resolve_mime_type(content_type: Option<String>, file_name: &str) -> String {
    content_type
        .filter(|ct| !ct.is_empty() && ct != "application/octet-stream")
        .or_else(|| mime_guess::from_path(file_name).first().map(|m| m.to_string()))
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::payload_too_large("File exceeds maximum upload size")
    } else {
        ApiError::bad_request(format!("Invalid multipart data: {e}"))
    }
}

fn upload_error(e: UploadError) -> ApiError {
    let message = e.to_string();
    match e {
        UploadError::Validation(_) => ApiError::bad_request(message),
        UploadError::TooLarge { .. } => ApiError::payload_too_large(message),
        UploadError::Storage(_) => ApiError::bad_gateway(message),
        UploadError::Record(e) => record_error(e),
        UploadError::InvalidTransition { .. } => ApiError::internal(message),
    }
}

fn content_response(state: &AppState, file: &FileRecord, data: Bytes) -> Response {
    let mut response = (StatusCode::OK, data).into_response();
    let headers = response.headers_mut();

    headers.insert(
        header::CONTENT_TYPE,
        file.mime_type
            .parse()
            .unwrap_or(header::HeaderValue::from_static("application/octet-stream")),
    );

    headers.insert(
        header::CONTENT_LENGTH,
        header::HeaderValue::from(file.byte_size),
    );

    let filename = file.name.replace(['"', '\\', '\r', '\n'], "_");
    if let Ok(value) = format!("inline; filename=\"{filename}\"").parse() {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    // Protected files must not land in shared caches
    let cache_control = if file.is_password_protected() {
        "private, no-store".to_string()
    } else {
        format!(
            "public, max-age={}",
            state.config.storage.cache_control_seconds
        )
    };
    if let Ok(value) = cache_control.parse() {
        headers.insert(header::CACHE_CONTROL, value);
    }

    response
}

fn file_to_response(file: &FileRecord) -> FileResponse {
    FileResponse {
        byte_size: file.byte_size,
        created_at: file.created_at.to_rfc3339(),
        file_id: file.file_id.clone(),
        mime_type: file.mime_type.clone(),
        name: file.name.clone(),
        owner: file.owner.clone(),
        password_protected: file.is_password_protected(),
        path: file.path.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::RecordError;

    #[test]
    fn test_resolve_mime_type() {
        assert_eq!(
            resolve_mime_type(Some("image/png".to_string()), "x.bin"),
            "image/png"
        );
        assert_eq!(
            resolve_mime_type(Some("application/octet-stream".to_string()), "notes.txt"),
            "text/plain"
        );
        assert_eq!(resolve_mime_type(None, "page.html"), "text/html");
        assert_eq!(resolve_mime_type(None, "noext"), "application/octet-stream");
    }

    #[test]
    fn test_upload_error_status() {
        let cases = [
            (
                UploadError::Validation("No file to upload!".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (
                UploadError::TooLarge {
                    name: "a".to_string(),
                    limit: 50,
                },
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (
                UploadError::Storage(ObjectStoreError::Backend("down".to_string())),
                StatusCode::BAD_GATEWAY,
            ),
            (
                UploadError::Record(RecordError::Unauthorized("Invalid API key.".to_string())),
                StatusCode::UNAUTHORIZED,
            ),
            (
                UploadError::Record(RecordError::Unavailable("no quorum".to_string())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(upload_error(err).status(), status);
        }
    }
}
