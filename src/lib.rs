//! file-share - File sharing API with password-protected uploads
//!
//! This crate provides anonymous and signed-in file uploads with:
//! - Collision-resistant file ids and storage paths
//! - An upload orchestrator that stores bytes before recording metadata
//! - Swappable object storage backends (local filesystem, Supabase storage)
//! - File, session and API key metadata in redb, replicated via muster
//! - Session-gated routes for dashboards and user settings

pub mod api;
pub mod auth;
pub mod config;
pub mod ids;
pub mod object_store;
pub mod recorder;
pub mod secrets;
pub mod state_machine;
pub mod storage;
#[cfg(test)]
pub mod testutil;
pub mod upload;

use std::sync::Arc;

use auth::SessionResolver;
use config::Config;
use state_machine::FileStateMachine;
use storage::Database;
use upload::Orchestrator;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub db: Database,
    pub node: Arc<muster::RedbNode<FileStateMachine>>,
    pub object_store: Arc<dyn object_store::ObjectStore>,
    pub sessions: SessionResolver,
    pub uploads: Orchestrator,
}
