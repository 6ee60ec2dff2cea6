use redb::{ReadableTable, WriteTransaction};

use super::db::{Database, DatabaseError};
use super::models::FileRecord;
use super::tables::*;

impl Database {
    // ========================================================================
    // File operations
    // ========================================================================

    /// Store a file record and update the owner index
    pub fn put_file(&self, file: &FileRecord) -> Result<(), DatabaseError> {
        debug_assert!(!file.file_id.is_empty(), "file id must not be empty");
        debug_assert!(!file.path.is_empty(), "file path must not be empty");

        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(FILES)?;
            let data = rmp_serde::to_vec_named(file)?;
            table.insert(file.file_id.as_str(), data.as_slice())?;
        }
        if let Some(ref owner) = file.owner {
            add_to_owner_index(&write_txn, &owner.id, &file.file_id)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Get a file by its id
    pub fn get_file(&self, file_id: &str) -> Result<Option<FileRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(FILES)?;

        match table.get(file_id)? {
            Some(data) => {
                let file: FileRecord = rmp_serde::from_slice(data.value())?;
                Ok(Some(file))
            }
            None => Ok(None),
        }
    }

    /// Get all files uploaded by an owner, newest first
    pub fn get_files_by_owner(&self, owner_id: &str) -> Result<Vec<FileRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let owner_table = read_txn.open_table(OWNER_FILES)?;
        let files_table = read_txn.open_table(FILES)?;

        let file_ids: Vec<String> = match owner_table.get(owner_id)? {
            Some(data) => rmp_serde::from_slice(data.value())?,
            None => return Ok(Vec::new()),
        };

        let mut files = Vec::new();
        for file_id in file_ids {
            if let Some(data) = files_table.get(file_id.as_str())? {
                let file: FileRecord = rmp_serde::from_slice(data.value())?;
                files.push(file);
            }
        }
        files.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(files)
    }

    /// Delete a file by its id and clean up the owner index
    pub fn delete_file(&self, file_id: &str) -> Result<bool, DatabaseError> {
        let write_txn = self.begin_write()?;

        let existing: Option<FileRecord> = {
            let table = write_txn.open_table(FILES)?;
            let result = match table.get(file_id)? {
                Some(data) => Some(rmp_serde::from_slice(data.value())?),
                None => None,
            };
            result
        };

        let deleted = match existing {
            Some(file) => {
                {
                    let mut table = write_txn.open_table(FILES)?;
                    table.remove(file_id)?;
                }
                if let Some(ref owner) = file.owner {
                    remove_from_owner_index(&write_txn, &owner.id, file_id)?;
                }
                true
            }
            None => false,
        };

        write_txn.commit()?;
        Ok(deleted)
    }

    /// Get all files (for snapshot/restore)
    pub fn get_all_files(&self) -> Result<Vec<FileRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(FILES)?;

        let mut files = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            let file: FileRecord = rmp_serde::from_slice(value.value())?;
            files.push(file);
        }

        Ok(files)
    }
}

fn add_to_owner_index(
    write_txn: &WriteTransaction,
    owner_id: &str,
    file_id: &str,
) -> Result<(), DatabaseError> {
    let mut owner_table = write_txn.open_table(OWNER_FILES)?;
    let mut file_ids: Vec<String> = match owner_table.get(owner_id)? {
        Some(data) => rmp_serde::from_slice(data.value())?,
        None => Vec::new(),
    };

    if !file_ids.iter().any(|id| id == file_id) {
        file_ids.push(file_id.to_string());
        let data = rmp_serde::to_vec_named(&file_ids)?;
        owner_table.insert(owner_id, data.as_slice())?;
    }
    Ok(())
}

fn remove_from_owner_index(
    write_txn: &WriteTransaction,
    owner_id: &str,
    file_id: &str,
) -> Result<(), DatabaseError> {
    let mut owner_table = write_txn.open_table(OWNER_FILES)?;
    let file_ids: Option<Vec<String>> = match owner_table.get(owner_id)? {
        Some(data) => Some(rmp_serde::from_slice(data.value())?),
        None => None,
    };

    if let Some(mut ids) = file_ids {
        ids.retain(|id| id != file_id);
        if ids.is_empty() {
            owner_table.remove(owner_id)?;
        } else {
            let data = rmp_serde::to_vec_named(&ids)?;
            owner_table.insert(owner_id, data.as_slice())?;
        }
    }
    Ok(())
}
