//! Shared test helpers for file-share router tests.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::auth::{Profile, SessionResolver, User};
use crate::config::{ClusterConfig, Config, NodeConfig, SessionConfig, StorageConfig};
use crate::object_store::LocalStore;
use crate::recorder::ClusterRecorder;
use crate::secrets;
use crate::state_machine::FileStateMachine;
use crate::storage::models::SessionRecord;
use crate::storage::{Database, SESSIONS};
use crate::upload::Orchestrator;
use crate::AppState;

/// Create a test AppState with a temporary database and local object store.
pub fn test_state(temp_dir: &tempfile::TempDir) -> Arc<AppState> {
    let data_dir = temp_dir.path().join("data");
    let files_dir = temp_dir.path().join("files");

    let config = Config {
        node: NodeConfig {
            id: uuid::Uuid::new_v4().to_string(),
            bind_address: "127.0.0.1:0".to_string(),
            data_dir: data_dir.to_string_lossy().to_string(),
        },
        cluster: ClusterConfig::default(),
        session: SessionConfig::default(),
        storage: StorageConfig::default(),
        test_mode: true,
        max_upload_size: 1024, // 1KB for tests
    };

    let db = Database::open(&data_dir).expect("Failed to open test database");
    let object_store =
        Arc::new(LocalStore::new(&files_dir).expect("Failed to create test object store"));

    let muster_storage =
        muster::RedbStorage::new(db.inner()).expect("Failed to create muster storage");
    let state_machine = FileStateMachine::new(db.clone());
    let muster_config = muster::Config {
        node_id: config.node.id.clone(),
        cluster_port: 0,
        heartbeat_interval_ms: 50,
        election_timeout_ms: 300,
        discovery: muster::DiscoveryConfig {
            dns_name: None,
            peers: vec![],
            poll_interval_secs: 5,
        },
    };
    let node = muster::MusterNode::new(muster_config, muster_storage, state_machine)
        .expect("Failed to create muster node");

    let recorder = Arc::new(ClusterRecorder::new(db.clone(), Arc::clone(&node)));
    let uploads = Orchestrator::new(
        object_store.clone(),
        recorder,
        config.max_upload_size,
        config.storage.cache_control_seconds,
    );
    let sessions = SessionResolver::new(db.clone(), Duration::from_secs(5));

    Arc::new(AppState {
        config,
        db,
        node: Arc::clone(&node),
        object_store,
        sessions,
        uploads,
    })
}

/// Store a session for a fresh user directly in the database and return its token.
pub fn sign_in(state: &AppState, profile_id: &str) -> (String, User) {
    let user = User::from_profile(
        &Profile {
            id: profile_id.to_string(),
            username: "tester".to_string(),
            discriminator: "0001".to_string(),
        },
        None,
    );
    let token = secrets::generate_token().expect("Failed to generate token");
    let now = Utc::now();
    state
        .db
        .put_session(&SessionRecord {
            token_digest: secrets::token_digest(&token),
            user: user.clone(),
            created_at: now,
            expires_at: now + chrono::Duration::hours(1),
        })
        .expect("Failed to store session");
    (token, user)
}

/// Start the node's cluster tasks and wait until it has elected a leader,
/// so replicated writes can commit.
pub async fn start_cluster(state: &AppState) {
    // Dropping the handles detaches the tasks; they end with the test runtime.
    let _handles = state.node.start();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while state.node.cluster_info().await.leader_id.is_none()
        && tokio::time::Instant::now() < deadline
    {
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

/// Store an undecodable session row and return the token pointing at it.
/// Resolving that token fails inside the store.
pub fn corrupt_session(state: &AppState) -> String {
    let token = secrets::generate_token().expect("Failed to generate token");
    let digest = secrets::token_digest(&token);

    let write_txn = state.db.begin_write().expect("Failed to begin write");
    {
        let mut table = write_txn.open_table(SESSIONS).expect("Failed to open sessions");
        table
            .insert(digest.as_str(), &[0xc1_u8, 0xff, 0x00][..])
            .expect("Failed to insert session");
    }
    write_txn.commit().expect("Failed to commit");
    token
}
