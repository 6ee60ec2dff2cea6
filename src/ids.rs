//! Identifier and storage key generation for uploaded files.

const MAX_EXTENSION_LEN: usize = 16;

/// A freshly generated file identifier and the object storage key derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileId {
    pub file_id: String,
    pub path: String,
}

/// Generate a unique file id and storage path for a file name.
///
/// The id is a random UUID in simple form. The path is the id followed by the
/// sanitized extension of `file_name`, or the bare id when the name has no
/// usable extension. Never fails.
pub fn generate(file_name: &str) -> FileId {
    let file_id = uuid::Uuid::new_v4().simple().to_string();
    let path = match extension(file_name) {
        Some(ext) => format!("{file_id}.{ext}"),
        None => file_id.clone(),
    };
    FileId { file_id, path }
}

/// Lowercased ASCII-alphanumeric extension, if the name carries one.
fn extension(file_name: &str) -> Option<String> {
    // Only the final path component counts
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or(file_name);
    let (stem, ext) = base.rsplit_once('.')?;

    // Dot-files like `.env` have no extension
    if stem.is_empty() {
        return None;
    }

    let ext: String = ext
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(MAX_EXTENSION_LEN)
        .map(|c| c.to_ascii_lowercase())
        .collect();

    (!ext.is_empty()).then_some(ext)
}
