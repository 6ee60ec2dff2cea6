mod admin;
mod files;
mod user;

use crate::api::response::ApiError;
use crate::recorder::RecordError;

pub use admin::{admin_purge, cluster_status, health};
pub use files::{
    delete_my_file, download_file, get_file, list_my_files, upload_file, FILE_PASSWORD_HEADER,
};
pub use user::{create_api_key, create_session, current_user, sign_out};

/// Map a MusterError to an ApiError
fn replication_error(e: muster::MusterError) -> ApiError {
    record_error(RecordError::from(e))
}

fn record_error(e: RecordError) -> ApiError {
    match e {
        RecordError::Unauthorized(message) => ApiError::unauthorized(message),
        RecordError::Unavailable(message) => ApiError::unavailable(message),
        RecordError::Internal(message) => ApiError::internal(message),
    }
}
