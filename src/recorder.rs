//! The metadata-recording procedure that turns a stored upload into a `FileRecord`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;

use crate::auth::User;
use crate::secrets;
use crate::state_machine::FileStateMachine;
use crate::storage::models::{FileRecord, Owner, WriteOp};
use crate::storage::Database;

/// Who an upload is attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// A signed-in user.
    Session(User),
    /// An anonymous client presenting a user's API key.
    ApiKey(String),
}

/// Metadata for bytes that are already in object storage.
#[derive(Debug, Clone)]
pub struct RecordFile {
    pub file_id: String,
    pub name: String,
    pub path: String,
    pub mime_type: String,
    pub byte_size: u64,
    /// Plaintext password; hashed before anything is persisted.
    pub password: Option<String>,
    pub credential: Credential,
}

/// Failure of the recording call. The message is meant for the end user.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Internal(String),
}

impl From<muster::MusterError> for RecordError {
    fn from(e: muster::MusterError) -> Self {
        match e {
            muster::MusterError::NotLeader { .. } => {
                RecordError::Unavailable("No leader available, retry shortly".to_string())
            }
            muster::MusterError::NoQuorum => {
                RecordError::Unavailable("Failed to reach quorum for replication".to_string())
            }
            _ => RecordError::Internal(e.to_string()),
        }
    }
}

/// Records file metadata once the bytes are stored.
#[async_trait]
pub trait MetadataRecorder: Send + Sync {
    async fn record(&self, file: RecordFile) -> Result<FileRecord, RecordError>;
}

/// Records metadata in the replicated redb store.
pub struct ClusterRecorder {
    db: Database,
    node: Arc<muster::RedbNode<FileStateMachine>>,
}

impl ClusterRecorder {
    pub fn new(db: Database, node: Arc<muster::RedbNode<FileStateMachine>>) -> Self {
        Self { db, node }
    }

    async fn resolve_owner(&self, credential: &Credential) -> Result<Owner, RecordError> {
        match credential {
            Credential::Session(user) => Ok(Owner::from(user)),
            Credential::ApiKey(key) => {
                let db = self.db.clone();
                let digest = secrets::token_digest(key);
                let entry = tokio::task::spawn_blocking(move || db.get_api_key(&digest))
                    .await
                    .map_err(|e| RecordError::Internal(e.to_string()))?
                    .map_err(|e| RecordError::Internal(e.to_string()))?;

                entry
                    .map(|entry| entry.owner)
                    .ok_or_else(|| RecordError::Unauthorized("Invalid API key.".to_string()))
            }
        }
    }
}

#[async_trait]
impl MetadataRecorder for ClusterRecorder {
    async fn record(&self, file: RecordFile) -> Result<FileRecord, RecordError> {
        let owner = self.resolve_owner(&file.credential).await?;

        let password_hash = match file.password.filter(|p| !p.is_empty()) {
            Some(password) => Some(
                tokio::task::spawn_blocking(move || secrets::hash_password(&password))
                    .await
                    .map_err(|e| RecordError::Internal(e.to_string()))?
                    .map_err(|e| RecordError::Internal(e.to_string()))?,
            ),
            None => None,
        };

        let record = FileRecord {
            file_id: file.file_id,
            name: file.name,
            path: file.path,
            mime_type: file.mime_type,
            byte_size: file.byte_size,
            created_at: Utc::now(),
            owner: Some(owner),
            password_hash,
        };

        self.node
            .replicate(WriteOp::CreateFile(record.clone()))
            .await?;

        tracing::debug!(
            file_id = %record.file_id,
            protected = record.is_password_protected(),
            "Recorded file"
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use crate::storage::models::ApiKeyRecord;
    use crate::testutil::{start_cluster, test_state};

    fn record_file(credential: Credential, password: Option<&str>) -> RecordFile {
        RecordFile {
            file_id: "f1".to_string(),
            name: "photo.png".to_string(),
            path: "f1.png".to_string(),
            mime_type: "image/png".to_string(),
            byte_size: 3,
            password: password.map(str::to_string),
            credential,
        }
    }

    fn recorder(state: &crate::AppState) -> ClusterRecorder {
        ClusterRecorder::new(state.db.clone(), Arc::clone(&state.node))
    }

    #[tokio::test]
    async fn test_unknown_api_key_is_unauthorized() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        let result = recorder(&state)
            .record(record_file(Credential::ApiKey("nope".to_string()), None))
            .await;
        assert!(matches!(
            result,
            Err(RecordError::Unauthorized(ref message)) if message == "Invalid API key."
        ));
        assert!(state.db.get_file("f1").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_api_key_resolves_to_issuer() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        start_cluster(&state).await;

        let owner = Owner {
            id: "77".to_string(),
            name: "ferris#0077".to_string(),
        };
        state
            .db
            .put_api_key(&ApiKeyRecord {
                key_digest: secrets::token_digest("issued-key"),
                owner: owner.clone(),
                created_at: Utc::now(),
            })
            .unwrap();

        let record = recorder(&state)
            .record(record_file(
                Credential::ApiKey("issued-key".to_string()),
                Some(""),
            ))
            .await
            .unwrap();
        assert_eq!(record.owner, Some(owner));
        assert!(!record.is_password_protected());
        assert!(state.db.get_file("f1").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_session_upload_hashes_password() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        start_cluster(&state).await;

        let user = User {
            id: "5".to_string(),
            name: "crab#0005".to_string(),
            role: Role::User,
        };
        let record = recorder(&state)
            .record(record_file(Credential::Session(user), Some("pw")))
            .await
            .unwrap();

        let stored = state.db.get_file("f1").unwrap().unwrap();
        assert!(stored.is_owned_by("5"));
        let hash = stored.password_hash.unwrap();
        assert_ne!(hash, "pw");
        assert!(secrets::verify_password("pw", &hash));
        assert_eq!(record.password_hash, Some(hash));
    }
}
