use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::{Duration, Utc};
use serde::Serialize;
use std::sync::Arc;

use super::replication_error;
use crate::api::response::{ApiError, AppJson, JSend};
use crate::auth::{bearer_or_cookie_token, Profile, RequireUser, Role, User};
use crate::secrets;
use crate::storage::models::{ApiKeyRecord, Owner, SessionRecord, WriteOp};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct ApiKeyResponse {
    /// Shown once; only its digest is stored.
    pub api_key: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub expires_at: String,
    pub token: String,
    pub user: UserResponse,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            role: user.role,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn current_user(RequireUser(user): RequireUser) -> Json<JSend<UserResponse>> {
    JSend::success(UserResponse::from(&user))
}

pub async fn create_api_key(
    State(state): State<Arc<AppState>>,
    RequireUser(user): RequireUser,
) -> Result<Json<JSend<ApiKeyResponse>>, ApiError> {
    let api_key = secrets::generate_token().map_err(|e| ApiError::internal(e.to_string()))?;

    let operation = WriteOp::CreateApiKey(ApiKeyRecord {
        key_digest: secrets::token_digest(&api_key),
        owner: Owner::from(&user),
        created_at: Utc::now(),
    });
    state
        .node
        .replicate(operation)
        .await
        .map_err(replication_error)?;

    tracing::info!(user_id = %user.id, "Issued API key");
    Ok(JSend::success(ApiKeyResponse { api_key }))
}

pub async fn sign_out(
    State(state): State<Arc<AppState>>,
    RequireUser(user): RequireUser,
    headers: HeaderMap,
) -> Result<Json<JSend<()>>, ApiError> {
    let token = bearer_or_cookie_token(&headers)
        .ok_or_else(|| ApiError::unauthorized("You must be signed in."))?;

    let operation = WriteOp::DeleteSession {
        token_digest: secrets::token_digest(&token),
    };
    state
        .node
        .replicate(operation)
        .await
        .map_err(replication_error)?;

    tracing::debug!(user_id = %user.id, "Signed out");
    Ok(JSend::success(()))
}

/// Create a session straight from a provider profile, as the OAuth sign-in
/// callback would. Only routed in test mode.
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    AppJson(profile): AppJson<Profile>,
) -> Result<Json<JSend<SessionResponse>>, ApiError> {
    if profile.id.trim().is_empty() {
        return Err(ApiError::bad_request("id must not be empty"));
    }

    let user = User::from_profile(&profile, state.config.session.owner_id.as_deref());
    let token = secrets::generate_token().map_err(|e| ApiError::internal(e.to_string()))?;
    let now = Utc::now();
    let expires_at = Duration::try_seconds(state.config.session.max_age_seconds)
        .and_then(|max_age| now.checked_add_signed(max_age))
        .ok_or_else(|| ApiError::internal("Session lifetime out of range"))?;
    let session = SessionRecord {
        token_digest: secrets::token_digest(&token),
        user: user.clone(),
        created_at: now,
        expires_at,
    };
    let expires_at = session.expires_at.to_rfc3339();

    state
        .node
        .replicate(WriteOp::CreateSession(session))
        .await
        .map_err(replication_error)?;

    tracing::info!(user_id = %user.id, "Signed in");
    Ok(JSend::success(SessionResponse {
        expires_at,
        token,
        user: UserResponse::from(&user),
    }))
}
