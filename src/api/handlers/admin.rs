use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use crate::api::response::{ApiError, JSend};
use crate::upload::human_size;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub max_upload_size: String,
    pub status: &'static str,
    pub storage_backend: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ClusterStatusResponse {
    pub cluster_info: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct PurgeResponse {
    pub api_keys_deleted: u64,
    pub files_deleted: u64,
    pub sessions_deleted: u64,
}

/// Liveness plus the upload settings this node enforces.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<JSend<HealthResponse>> {
    JSend::success(HealthResponse {
        max_upload_size: human_size(&state.config.max_upload_size),
        status: "ok",
        storage_backend: state.config.storage.backend.as_str(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn cluster_status(
    State(state): State<Arc<AppState>>,
) -> Json<JSend<ClusterStatusResponse>> {
    let info = state.node.cluster_info().await;
    let peers: Vec<serde_json::Value> = info
        .peers
        .iter()
        .map(|p| {
            serde_json::json!({
                "address": p.address,
                "id": p.id,
                "sequence": p.sequence,
                "status": format!("{:?}", p.status),
            })
        })
        .collect();

    JSend::success(ClusterStatusResponse {
        cluster_info: serde_json::json!({
            "leader_id": info.leader_id,
            "node_id": info.node_id,
            "peers": peers,
            "role": format!("{:?}", info.role),
            "sequence": info.sequence,
            "term": info.term,
        }),
    })
}

/// Wipe every table. Only routed in test mode; object storage is left alone.
pub async fn admin_purge(
    State(state): State<Arc<AppState>>,
) -> Result<Json<JSend<PurgeResponse>>, ApiError> {
    let stats = state
        .db
        .purge_all()
        .map_err(|e| ApiError::internal(e.to_string()))?;

    tracing::warn!(
        api_keys = stats.api_keys,
        files = stats.files,
        sessions = stats.sessions,
        "Purged metadata store"
    );

    Ok(JSend::success(PurgeResponse {
        api_keys_deleted: stats.api_keys,
        files_deleted: stats.files,
        sessions_deleted: stats.sessions,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{sign_in, test_state};

    #[tokio::test]
    async fn test_health_reports_upload_settings() {
        let dir = tempfile::tempdir().unwrap();
        let Json(body) = health(State(test_state(&dir))).await;

        assert_eq!(body.data.status, "ok");
        assert_eq!(body.data.storage_backend, "local");
        assert_eq!(body.data.max_upload_size, "1KB");
    }

    #[tokio::test]
    async fn test_purge_counts_every_table() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        sign_in(&state, "1");
        sign_in(&state, "2");

        let Json(body) = admin_purge(State(Arc::clone(&state))).await.unwrap();
        assert_eq!(body.data.sessions_deleted, 2);
        assert_eq!(body.data.files_deleted, 0);
        assert!(state.db.get_all_sessions().unwrap().is_empty());
    }
}
