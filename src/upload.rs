//! Upload orchestration: validate, store the bytes, then record the metadata.
//!
//! A submission moves `Idle -> Validating -> Uploading -> Recording -> Done`.
//! Any failure passes through `Failed` and returns the submission to `Idle`
//! so the client can retry by hand. Nothing is retried automatically, and an
//! object whose metadata could not be recorded is left in storage.

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;

use crate::auth::SessionStatus;
use crate::ids;
use crate::object_store::{ObjectStore, ObjectStoreError, PutOptions};
use crate::recorder::{Credential, MetadataRecorder, RecordError, RecordFile};
use crate::storage::models::FileRecord;

/// 50MB
pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 50 * 1024 * 1024;

/// One hour
pub const DEFAULT_CACHE_CONTROL: u64 = 3600;

/// `50MB`, `1KB`, or a byte count when the size is not a whole unit.
pub fn human_size(bytes: &u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    match *bytes {
        b if b >= MB && b % MB == 0 => format!("{}MB", b / MB),
        b if b >= KB && b % KB == 0 => format!("{}KB", b / KB),
        b => format!("{b} bytes"),
    }
}

/// A file picked for upload.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub mime_type: String,
    pub data: Bytes,
}

/// Everything a client submits in one upload attempt.
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    /// `None` when no file was selected.
    pub file: Option<UploadFile>,
    /// Optional password protecting the file. Empty means none.
    pub password: Option<String>,
    /// Required when the client has no session. Ignored otherwise.
    pub api_key: Option<String>,
}

/// The recorded file together with the password the client chose, so it can be shared.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub record: FileRecord,
    pub password: Option<String>,
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("{0}")]
    Validation(String),
    #[error("{name} is above {} limit!", human_size(.limit))]
    TooLarge { name: String, limit: u64 },
    #[error("{0}")]
    Storage(#[from] ObjectStoreError),
    #[error("{0}")]
    Record(#[from] RecordError),
    #[error("Cannot move upload from {from:?} to {to:?}")]
    InvalidTransition { from: UploadPhase, to: UploadPhase },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPhase {
    Idle,
    Validating,
    Uploading,
    Recording,
    Done,
    Failed,
}

impl UploadPhase {
    fn can_move_to(self, next: UploadPhase) -> bool {
        use UploadPhase::*;
        matches!(
            (self, next),
            (Idle | Done, Validating)
                | (Validating, Uploading)
                | (Uploading, Recording)
                | (Recording, Done)
                | (Validating | Uploading | Recording, Failed)
                | (Failed, Idle)
        )
    }
}

/// Progress of a single client's submissions.
#[derive(Debug, Clone)]
pub struct Submission {
    phase: UploadPhase,
    history: Vec<UploadPhase>,
}

impl Default for Submission {
    fn default() -> Self {
        Self::new()
    }
}

impl Submission {
    pub fn new() -> Self {
        Self {
            phase: UploadPhase::Idle,
            history: vec![UploadPhase::Idle],
        }
    }

    pub fn phase(&self) -> UploadPhase {
        self.phase
    }

    /// Every phase this submission has been in, oldest first.
    pub fn history(&self) -> &[UploadPhase] {
        &self.history
    }

    fn advance(&mut self, next: UploadPhase) -> Result<(), UploadError> {
        if !self.phase.can_move_to(next) {
            return Err(UploadError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        self.phase = next;
        self.history.push(next);
        Ok(())
    }

    fn fail(&mut self) {
        if self.advance(UploadPhase::Failed).is_ok() {
            let _ = self.advance(UploadPhase::Idle);
        }
    }
}

/// Sequences the object storage write and the metadata write of an upload.
pub struct Orchestrator {
    store: Arc<dyn ObjectStore>,
    recorder: Arc<dyn MetadataRecorder>,
    max_upload_size: u64,
    cache_control: u64,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        recorder: Arc<dyn MetadataRecorder>,
        max_upload_size: u64,
        cache_control: u64,
    ) -> Self {
        Self {
            store,
            recorder,
            max_upload_size,
            cache_control,
        }
    }

    /// Run one upload attempt. On failure `submission` is back to `Idle` and
    /// the error message is ready to show to the user.
    pub async fn submit(
        &self,
        submission: &mut Submission,
        session: &SessionStatus,
        request: UploadRequest,
    ) -> Result<UploadOutcome, UploadError> {
        submission.advance(UploadPhase::Validating)?;

        match self.run(submission, session, request).await {
            Ok(outcome) => {
                submission.advance(UploadPhase::Done)?;
                Ok(outcome)
            }
            Err(e) => {
                submission.fail();
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        submission: &mut Submission,
        session: &SessionStatus,
        request: UploadRequest,
    ) -> Result<UploadOutcome, UploadError> {
        let (file, credential) = self.validate(session, &request)?;
        let password = request.password.filter(|p| !p.is_empty());
        let id = ids::generate(&file.name);
        let byte_size = file.data.len() as u64;

        submission.advance(UploadPhase::Uploading)?;
        let options = PutOptions {
            content_type: file.mime_type.clone(),
            cache_control: self.cache_control,
        };
        self.store.put(&id.path, file.data, &options).await?;

        submission.advance(UploadPhase::Recording)?;
        let record = self
            .recorder
            .record(RecordFile {
                file_id: id.file_id.clone(),
                name: file.name,
                path: id.path.clone(),
                mime_type: file.mime_type,
                byte_size,
                password: password.clone(),
                credential,
            })
            .await
            .inspect_err(|e| {
                tracing::warn!(
                    file_id = %id.file_id,
                    path = %id.path,
                    error = %e,
                    "Metadata recording failed, stored object left orphaned"
                );
            })?;

        tracing::info!(file_id = %record.file_id, byte_size, "Upload complete");
        Ok(UploadOutcome { record, password })
    }

    fn validate(
        &self,
        session: &SessionStatus,
        request: &UploadRequest,
    ) -> Result<(UploadFile, Credential), UploadError> {
        let file = request
            .file
            .clone()
            .ok_or_else(|| UploadError::Validation("No file to upload!".to_string()))?;

        let credential = match session.user() {
            Some(user) => Credential::Session(user.clone()),
            None => request
                .api_key
                .as_deref()
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .map(|key| Credential::ApiKey(key.to_string()))
                .ok_or_else(|| {
                    UploadError::Validation("Please login or enter your api key.".to_string())
                })?,
        };

        if file.data.len() as u64 >= self.max_upload_size {
            let name = if file.name.is_empty() {
                "File size".to_string()
            } else {
                file.name.clone()
            };
            return Err(UploadError::TooLarge {
                name,
                limit: self.max_upload_size,
            });
        }

        Ok((file, credential))
    }
}
