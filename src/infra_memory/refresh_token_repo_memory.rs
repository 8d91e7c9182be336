use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Table {
    rows: HashMap<RecordId, RefreshTokenRecord>,
    by_hash: HashMap<TokenHash, RecordId>,
}

impl Table {
    fn live_by_hash_mut(&mut self, hash: &TokenHash, now: DateTime<Utc>) -> Option<&mut RefreshTokenRecord> {
        let id = self.by_hash.get(hash)?;
        self.rows.get_mut(id).filter(|rec| rec.is_valid_at(now))
    }
}

/// Refresh-token table for the "memory" backend and tests.
///
/// One mutex covers both the rows and the hash index, so every conditional
/// write is atomic the same way a single guarded UPDATE is.
#[derive(Default)]
pub struct MemoryRefreshTokenRepo {
    table: Mutex<Table>,
}

impl MemoryRefreshTokenRepo {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Table>, AuthError> {
        self.table
            .lock()
            .map_err(|e| AuthError::Storage(e.to_string()))
    }
}

#[async_trait::async_trait]
impl RefreshTokenRepo for MemoryRefreshTokenRepo {
    async fn insert(&self, record: &RefreshTokenRecord) -> Result<(), AuthError> {
        let mut table = self.lock()?;
        if table.by_hash.contains_key(&record.token_hash) || table.rows.contains_key(&record.id) {
            return Err(AuthError::Storage("duplicate refresh token".to_string()));
        }
        table.by_hash.insert(record.token_hash, record.id);
        table.rows.insert(record.id, record.clone());
        Ok(())
    }

    async fn find_by_hash(&self, hash: &TokenHash) -> Result<Option<RefreshTokenRecord>, AuthError> {
        let table = self.lock()?;
        Ok(table
            .by_hash
            .get(hash)
            .and_then(|id| table.rows.get(id))
            .cloned())
    }

    async fn replace_hash(
        &self,
        old: &TokenHash,
        new: &TokenHash,
        new_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        let mut table = self.lock()?;
        if table.by_hash.contains_key(new) {
            return Err(AuthError::Storage("duplicate refresh token".to_string()));
        }
        let Some(rec) = table.live_by_hash_mut(old, now) else {
            return Ok(false);
        };
        rec.token_hash = *new;
        rec.expires_at = new_expires_at;
        let id = rec.id;
        table.by_hash.remove(old);
        table.by_hash.insert(*new, id);
        Ok(true)
    }

    async fn extend_expiry(
        &self,
        hash: &TokenHash,
        new_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        let mut table = self.lock()?;
        match table.live_by_hash_mut(hash, now) {
            Some(rec) => {
                rec.expires_at = new_expires_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn revoke_by_hash(&self, hash: &TokenHash) -> Result<bool, AuthError> {
        let mut table = self.lock()?;
        let Some(id) = table.by_hash.get(hash).copied() else {
            return Ok(false);
        };
        match table.rows.get_mut(&id) {
            Some(rec) if !rec.is_revoked => {
                rec.is_revoked = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_by_id(
        &self,
        owner_id: OwnerId,
        id: RecordId,
    ) -> Result<Option<TokenHash>, AuthError> {
        let mut table = self.lock()?;
        match table.rows.get_mut(&id) {
            Some(rec) if rec.owner_id == owner_id && !rec.is_revoked => {
                rec.is_revoked = true;
                Ok(Some(rec.token_hash))
            }
            _ => Ok(None),
        }
    }

    async fn revoke_all_for_owner(&self, owner_id: OwnerId) -> Result<Vec<TokenHash>, AuthError> {
        let now = Utc::now();
        let mut table = self.lock()?;
        let revoked = table
            .rows
            .values_mut()
            .filter(|rec| rec.owner_id == owner_id && rec.is_valid_at(now))
            .map(|rec| {
                rec.is_revoked = true;
                rec.token_hash
            })
            .collect();
        Ok(revoked)
    }

    async fn list_for_owner(&self, owner_id: OwnerId) -> Result<Vec<RefreshTokenRecord>, AuthError> {
        let table = self.lock()?;
        let mut rows: Vec<_> = table
            .rows
            .values()
            .filter(|rec| rec.owner_id == owner_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.issued_at.cmp(&a.issued_at));
        Ok(rows)
    }

    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AuthError> {
        let mut table = self.lock()?;
        let doomed: Vec<(RecordId, TokenHash)> = table
            .rows
            .values()
            .filter(|rec| rec.expires_at < cutoff)
            .map(|rec| (rec.id, rec.token_hash))
            .collect();
        for (id, hash) in &doomed {
            table.rows.remove(id);
            table.by_hash.remove(hash);
        }
        Ok(doomed.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(owner: i64, byte: u8, expires_in: Duration) -> RefreshTokenRecord {
        let now = Utc::now();
        RefreshTokenRecord::new(
            OwnerId(owner),
            TokenHash([byte; TOKEN_HASH_LEN]),
            now,
            now + expires_in,
            ClientMetadata::default(),
        )
    }

    #[tokio::test]
    async fn replace_hash_is_single_use() {
        let repo = MemoryRefreshTokenRepo::new();
        let rec = record(1, 1, Duration::hours(1));
        repo.insert(&rec).await.unwrap();

        let now = Utc::now();
        let new = TokenHash([2; TOKEN_HASH_LEN]);
        let later = now + Duration::hours(2);
        assert!(repo.replace_hash(&rec.token_hash, &new, later, now).await.unwrap());
        assert!(!repo
            .replace_hash(&rec.token_hash, &TokenHash([3; TOKEN_HASH_LEN]), later, now)
            .await
            .unwrap());

        assert!(repo.find_by_hash(&rec.token_hash).await.unwrap().is_none());
        let moved = repo.find_by_hash(&new).await.unwrap().unwrap();
        assert_eq!(moved.id, rec.id);
        assert_eq!(moved.expires_at, later);
    }

    #[tokio::test]
    async fn expired_rows_cannot_be_rotated_or_extended() {
        let repo = MemoryRefreshTokenRepo::new();
        let rec = record(1, 4, Duration::seconds(-5));
        repo.insert(&rec).await.unwrap();
        let now = Utc::now();
        assert!(!repo
            .replace_hash(&rec.token_hash, &TokenHash([5; TOKEN_HASH_LEN]), now, now)
            .await
            .unwrap());
        assert!(!repo.extend_expiry(&rec.token_hash, now, now).await.unwrap());
    }

    #[tokio::test]
    async fn revoke_by_id_returns_hash_once() {
        let repo = MemoryRefreshTokenRepo::new();
        let rec = record(7, 6, Duration::hours(1));
        repo.insert(&rec).await.unwrap();
        assert_eq!(repo.revoke_by_id(OwnerId(8), rec.id).await.unwrap(), None);
        assert_eq!(
            repo.revoke_by_id(OwnerId(7), rec.id).await.unwrap(),
            Some(rec.token_hash)
        );
        assert_eq!(repo.revoke_by_id(OwnerId(7), rec.id).await.unwrap(), None);
    }
}
