use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::{bearer_or_cookie_token, SessionStatus};
use crate::api::response::ApiError;
use crate::AppState;

/// Route prefixes that require a signed-in session.
pub const PROTECTED_PATHS: &[&str] = &["/dashboard", "/user"];

/// Response header set while the session is still loading.
pub const SESSION_STATUS_HEADER: &str = "x-session-status";

/// How a request is let through the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// Session unresolved: the handler still runs, the response is marked as loading.
    Overlay,
    /// Protected path: only authenticated sessions reach the handler.
    Guarded,
    /// Unprotected path: the handler always runs.
    Open,
}

/// Decide how a request for `path` is gated given its session status.
pub fn decide(path: &str, status: &SessionStatus) -> Gate {
    if matches!(status, SessionStatus::Loading) {
        return Gate::Overlay;
    }

    if is_protected(path) {
        Gate::Guarded
    } else {
        Gate::Open
    }
}

/// Prefix match on whole path segments: `/user` covers `/user/x` but not `/users`.
fn is_protected(path: &str) -> bool {
    PROTECTED_PATHS.iter().any(|prefix| match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    })
}

/// Resolves the session once per request, stores it in the request extensions
/// and applies the gate decision.
pub async fn gate_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = bearer_or_cookie_token(request.headers());
    let status = state.sessions.resolve(token.as_deref()).await;
    let gate = decide(request.uri().path(), &status);
    let authenticated = status.user().is_some();
    request.extensions_mut().insert(status);

    match gate {
        Gate::Overlay => {
            let mut response = next.run(request).await;
            response
                .headers_mut()
                .insert(SESSION_STATUS_HEADER, HeaderValue::from_static("loading"));
            response
        }
        Gate::Guarded if !authenticated => {
            tracing::debug!(path = %request.uri().path(), "Rejected unauthenticated request");
            ApiError::unauthorized("You must be signed in to view this page.").into_response()
        }
        Gate::Guarded | Gate::Open => next.run(request).await,
    }
}
