use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::auth::gate_middleware;
use crate::AppState;

/// Room for multipart boundaries and text fields on top of the file itself.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Files at the limit must reach the orchestrator so it can name them in the rejection
    let upload_limit = usize::try_from(state.config.max_upload_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    let mut router = Router::new()
        // Files
        .route(
            "/files",
            post(handlers::upload_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/files/:id", get(handlers::get_file))
        .route("/files/:id/content", get(handlers::download_file))
        // Dashboard (protected)
        .route("/dashboard/files", get(handlers::list_my_files))
        .route("/dashboard/files/:id", delete(handlers::delete_my_file))
        // User (protected)
        .route("/user", get(handlers::current_user))
        .route("/user/api-keys", post(handlers::create_api_key))
        .route("/user/session", delete(handlers::sign_out))
        // Internal
        .route("/_internal/cluster/status", get(handlers::cluster_status))
        .route("/_internal/health", get(handlers::health));

    // Test-only routes
    if state.config.test_mode {
        tracing::warn!("Test mode enabled, purge and session routes are available.");
        router = router
            .route("/admin/purge", delete(handlers::admin_purge))
            .route("/_internal/sessions", post(handlers::create_session));
    }

    router
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            gate_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
