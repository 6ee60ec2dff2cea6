use chrono::{DateTime, Utc};
use redb::ReadableTable;

use super::db::{Database, DatabaseError};
use super::models::{ApiKeyRecord, SessionRecord};
use super::tables::*;

impl Database {
    // ========================================================================
    // API keys
    // ========================================================================

    pub fn put_api_key(&self, key: &ApiKeyRecord) -> Result<(), DatabaseError> {
        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(API_KEYS)?;
            let data = rmp_serde::to_vec_named(key)?;
            table.insert(key.key_digest.as_str(), data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Look up an API key by the digest of the presented key
    pub fn get_api_key(&self, key_digest: &str) -> Result<Option<ApiKeyRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(API_KEYS)?;

        match table.get(key_digest)? {
            Some(data) => Ok(Some(rmp_serde::from_slice(data.value())?)),
            None => Ok(None),
        }
    }

    pub fn get_all_api_keys(&self) -> Result<Vec<ApiKeyRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(API_KEYS)?;

        let mut keys = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            keys.push(rmp_serde::from_slice(value.value())?);
        }
        Ok(keys)
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    pub fn put_session(&self, session: &SessionRecord) -> Result<(), DatabaseError> {
        let write_txn = self.begin_write()?;
        {
            let mut table = write_txn.open_table(SESSIONS)?;
            let data = rmp_serde::to_vec_named(session)?;
            table.insert(session.token_digest.as_str(), data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Look up a session by token digest. Expiry is left to the caller.
    pub fn get_session(&self, token_digest: &str) -> Result<Option<SessionRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(SESSIONS)?;

        match table.get(token_digest)? {
            Some(data) => Ok(Some(rmp_serde::from_slice(data.value())?)),
            None => Ok(None),
        }
    }

    pub fn delete_session(&self, token_digest: &str) -> Result<bool, DatabaseError> {
        let write_txn = self.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(SESSIONS)?;
            let removed = table.remove(token_digest)?.is_some();
            removed
        };
        write_txn.commit()?;
        Ok(removed)
    }

    /// Remove every session expired at `now`. Returns how many were removed.
    pub fn delete_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, DatabaseError> {
        let write_txn = self.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(SESSIONS)?;

            let mut expired = Vec::new();
            for result in table.iter()? {
                let (key, value) = result?;
                let session: SessionRecord = rmp_serde::from_slice(value.value())?;
                if session.is_expired(now) {
                    expired.push(key.value().to_string());
                }
            }

            for token_digest in &expired {
                table.remove(token_digest.as_str())?;
            }
            expired.len() as u64
        };
        write_txn.commit()?;
        Ok(removed)
    }

    pub fn get_all_sessions(&self) -> Result<Vec<SessionRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(SESSIONS)?;

        let mut sessions = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            sessions.push(rmp_serde::from_slice(value.value())?);
        }
        Ok(sessions)
    }
}
