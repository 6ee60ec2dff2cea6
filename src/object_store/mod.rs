mod local;
mod supabase;

pub use local::LocalStore;
pub use supabase::SupabaseStore;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Object attributes sent along with an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOptions {
    pub content_type: String,
    /// Cache lifetime in seconds
    pub cache_control: u64,
}

impl PutOptions {
    pub fn cache_control_header(&self) -> String {
        format!("max-age={}", self.cache_control)
    }
}

/// Abstraction over object storage backends.
/// Keys are storage paths produced by [`crate::ids::generate`].
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, data: Bytes, options: &PutOptions)
        -> Result<(), ObjectStoreError>;
    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError>;
    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError>;
}
