use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::User;

/// The user an uploaded file is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub id: String,
    pub name: String,
}

impl From<&User> for Owner {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
        }
    }
}

/// A file record stored in redb
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_id: String,
    pub name: String,
    /// Object storage key holding the bytes
    pub path: String,
    pub mime_type: String,
    pub byte_size: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub owner: Option<Owner>,
    /// Argon2id PHC string. Never leaves the server.
    #[serde(default)]
    pub password_hash: Option<String>,
}

impl FileRecord {
    pub fn is_password_protected(&self) -> bool {
        self.password_hash.is_some()
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner.as_ref().is_some_and(|o| o.id == user_id)
    }
}

/// An API key entry, keyed by the SHA-256 digest of the key itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    pub key_digest: String,
    pub owner: Owner,
    pub created_at: DateTime<Utc>,
}

/// A signed-in session, keyed by the SHA-256 digest of its token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub token_digest: String,
    pub user: User,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Types of write operations (replicated via muster)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WriteOp {
    CreateApiKey(ApiKeyRecord),
    CreateFile(FileRecord),
    CreateSession(SessionRecord),
    DeleteFile { file_id: String },
    DeleteSession { token_digest: String },
    /// Drop sessions expired as of `now`; the leader picks `now` so replicas agree.
    DeleteExpiredSessions { now: DateTime<Utc> },
}
