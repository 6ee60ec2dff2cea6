use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use chrono::Utc;

use super::{SessionStatus, User};
use crate::api::response::ApiError;
use crate::secrets;
use crate::state_machine::FileStateMachine;
use crate::storage::models::WriteOp;
use crate::storage::Database;

/// Cookie carrying the session token for browser clients.
pub const SESSION_COOKIE: &str = "session_token";

/// Resolves session tokens against the session table.
#[derive(Clone)]
pub struct SessionResolver {
    db: Database,
    timeout: Duration,
}

impl SessionResolver {
    pub fn new(db: Database, timeout: Duration) -> Self {
        Self { db, timeout }
    }

    /// Resolve a presented token. A store that fails or does not answer within
    /// the timeout leaves the session `Loading`.
    pub async fn resolve(&self, token: Option<&str>) -> SessionStatus {
        let Some(token) = token else {
            return SessionStatus::Unauthenticated;
        };

        let db = self.db.clone();
        let digest = secrets::token_digest(token);
        let lookup = tokio::task::spawn_blocking(move || db.get_session(&digest));

        match tokio::time::timeout(self.timeout, lookup).await {
            Ok(Ok(Ok(Some(session)))) if !session.is_expired(Utc::now()) => {
                SessionStatus::Authenticated(session.user)
            }
            Ok(Ok(Ok(_))) => SessionStatus::Unauthenticated,
            Ok(Ok(Err(e))) => {
                tracing::error!(error = %e, "Session lookup failed");
                SessionStatus::Loading
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Session lookup task failed");
                SessionStatus::Loading
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Session lookup timed out"
                );
                SessionStatus::Loading
            }
        }
    }
}

/// Replicate one sweep of sessions that have expired by now.
pub async fn sweep_expired_sessions(
    node: &Arc<muster::RedbNode<FileStateMachine>>,
) -> Result<(), muster::MusterError> {
    node.replicate(WriteOp::DeleteExpiredSessions { now: Utc::now() })
        .await?;
    Ok(())
}

/// Sweep expired sessions every `every` for as long as the node runs.
/// Only the leader's sweeps take effect; followers skip quietly.
pub async fn run_session_sweeper(
    node: Arc<muster::RedbNode<FileStateMachine>>,
    every: Duration,
) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        match sweep_expired_sessions(&node).await {
            Ok(()) => tracing::debug!("Swept expired sessions"),
            Err(muster::MusterError::NotLeader { .. }) => {}
            Err(e) => tracing::warn!(error = %e, "Session sweep failed"),
        }
    }
}

/// Extract the session token from `Authorization: Bearer` or the session cookie.
pub fn bearer_or_cookie_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer ").or_else(|| h.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|t| !t.is_empty());

    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// The session status resolved by the gate middleware for this request.
#[derive(Debug, Clone)]
pub struct Session(pub SessionStatus);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Infallible> {
        let status = parts
            .extensions
            .get::<SessionStatus>()
            .cloned()
            .unwrap_or(SessionStatus::Unauthenticated);
        Ok(Session(status))
    }
}

/// A signed-in user, rejecting the request with 401 otherwise.
#[derive(Debug, Clone)]
pub struct RequireUser(pub User);

#[axum::async_trait]
impl<S> FromRequestParts<S> for RequireUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, ApiError> {
        parts
            .extensions
            .get::<SessionStatus>()
            .and_then(SessionStatus::user)
            .cloned()
            .map(RequireUser)
            .ok_or_else(|| ApiError::unauthorized("You must be signed in."))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::auth::Role;
    use crate::storage::models::SessionRecord;

    fn user() -> User {
        User {
            id: "42".to_string(),
            name: "ferris#0001".to_string(),
            role: Role::User,
        }
    }

    fn resolver(dir: &tempfile::TempDir) -> (Database, SessionResolver) {
        let db = Database::open(dir.path().join("data")).unwrap();
        let resolver = SessionResolver::new(db.clone(), Duration::from_secs(5));
        (db, resolver)
    }

    fn store_session(db: &Database, token: &str, expires_in: ChronoDuration) {
        let now = Utc::now();
        db.put_session(&SessionRecord {
            token_digest: secrets::token_digest(token),
            user: user(),
            created_at: now,
            expires_at: now + expires_in,
        })
        .unwrap();
    }

    #[tokio::test]
    async fn test_resolve_without_token() {
        let dir = tempfile::tempdir().unwrap();
        let (_db, resolver) = resolver(&dir);
        assert_eq!(resolver.resolve(None).await, SessionStatus::Unauthenticated);
    }

    #[tokio::test]
    async fn test_resolve_valid_session() {
        let dir = tempfile::tempdir().unwrap();
        let (db, resolver) = resolver(&dir);
        store_session(&db, "tok", ChronoDuration::hours(1));

        assert_eq!(
            resolver.resolve(Some("tok")).await,
            SessionStatus::Authenticated(user())
        );
        assert_eq!(
            resolver.resolve(Some("other")).await,
            SessionStatus::Unauthenticated
        );
    }

    #[tokio::test]
    async fn test_resolve_expired_session() {
        let dir = tempfile::tempdir().unwrap();
        let (db, resolver) = resolver(&dir);
        store_session(&db, "old", ChronoDuration::seconds(-1));

        assert_eq!(
            resolver.resolve(Some("old")).await,
            SessionStatus::Unauthenticated
        );
    }

    #[tokio::test]
    async fn test_resolve_store_failure_is_loading() {
        let dir = tempfile::tempdir().unwrap();
        let (db, resolver) = resolver(&dir);

        let write_txn = db.begin_write().unwrap();
        {
            let mut table = write_txn.open_table(crate::storage::SESSIONS).unwrap();
            table
                .insert(secrets::token_digest("broken").as_str(), &[0xc1_u8][..])
                .unwrap();
        }
        write_txn.commit().unwrap();

        assert_eq!(
            resolver.resolve(Some("broken")).await,
            SessionStatus::Loading
        );
    }

    #[test]
    fn test_token_from_bearer_header() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_or_cookie_token(&headers).as_deref(), Some("abc"));
    }

    #[test]
    fn test_token_from_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; session_token=xyz; other=1"),
        );
        assert_eq!(bearer_or_cookie_token(&headers).as_deref(), Some("xyz"));
    }

    #[test]
    fn test_no_token() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic Zm9v"));
        headers.insert(COOKIE, HeaderValue::from_static("session_token="));
        assert_eq!(bearer_or_cookie_token(&headers), None);
    }
}
