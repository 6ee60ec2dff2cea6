//! file-share's state machine for muster cluster replication.

use serde::{Deserialize, Serialize};

use crate::storage::models::{ApiKeyRecord, FileRecord, SessionRecord, WriteOp};
use crate::storage::Database;

/// The file-share state machine, replicated by muster.
pub struct FileStateMachine {
    db: Database,
}

impl FileStateMachine {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

/// Full state snapshot for syncing lagging followers.
#[derive(Debug, Serialize, Deserialize)]
pub struct FileSnapshot {
    pub api_keys: Vec<ApiKeyRecord>,
    pub files: Vec<FileRecord>,
    pub sessions: Vec<SessionRecord>,
}

impl muster::StateMachine for FileStateMachine {
    type WriteOp = WriteOp;
    type Snapshot = FileSnapshot;

    fn apply(&self, op: &WriteOp) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        match op {
            WriteOp::CreateApiKey(key) => self.db.put_api_key(key)?,
            WriteOp::CreateFile(file) => self.db.put_file(file)?,
            WriteOp::CreateSession(session) => self.db.put_session(session)?,
            WriteOp::DeleteFile { file_id } => {
                self.db.delete_file(file_id)?;
            }
            WriteOp::DeleteSession { token_digest } => {
                self.db.delete_session(token_digest)?;
            }
            WriteOp::DeleteExpiredSessions { now } => {
                self.db.delete_expired_sessions(*now)?;
            }
        }
        Ok(())
    }

    fn snapshot(&self) -> Result<FileSnapshot, Box<dyn std::error::Error + Send + Sync>> {
        Ok(FileSnapshot {
            api_keys: self.db.get_all_api_keys()?,
            files: self.db.get_all_files()?,
            sessions: self.db.get_all_sessions()?,
        })
    }

    fn restore(
        &self,
        snapshot: FileSnapshot,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        for key in &snapshot.api_keys {
            self.db.put_api_key(key)?;
        }
        for file in &snapshot.files {
            self.db.put_file(file)?;
        }
        for session in &snapshot.sessions {
            self.db.put_session(session)?;
        }
        Ok(())
    }
}
