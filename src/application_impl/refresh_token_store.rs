use super::HmacTokenHasher;
use crate::application_port::AuthError;
use crate::domain_model::*;
use crate::domain_port::{RefreshTokenRepo, ValidationCache};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Deadline for each backend call; exceeding it fails closed.
    pub timeout: Duration,
    /// Extra attempts for idempotent reads. Writes are never retried.
    pub read_retries: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            read_retries: 1,
        }
    }
}

/// Hashed refresh-token table plus its validation cache.
///
/// Raw tokens enter here and are hashed immediately; nothing below this
/// layer ever sees them. Every mutation invalidates the affected hashes
/// before returning.
pub struct RefreshTokenStore {
    repo: Arc<dyn RefreshTokenRepo>,
    cache: Arc<dyn ValidationCache>,
    hasher: HmacTokenHasher,
    cfg: StoreConfig,
}

impl RefreshTokenStore {
    pub fn new(
        repo: Arc<dyn RefreshTokenRepo>,
        cache: Arc<dyn ValidationCache>,
        hasher: HmacTokenHasher,
        cfg: StoreConfig,
    ) -> Self {
        Self {
            repo,
            cache,
            hasher,
            cfg,
        }
    }

    pub fn hash(&self, raw: &str) -> Result<TokenHash, AuthError> {
        self.hasher.hash(raw)
    }

    async fn guarded<T, F>(&self, op: &'static str, fut: F) -> Result<T, AuthError>
    where
        F: Future<Output = Result<T, AuthError>>,
    {
        match tokio::time::timeout(self.cfg.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(op, "refresh token store call timed out");
                Err(AuthError::Storage(format!("{} timed out", op)))
            }
        }
    }

    async fn read_with_retry<T, F, Fut>(&self, op: &'static str, mut call: F) -> Result<T, AuthError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AuthError>>,
    {
        let mut attempt = 0;
        loop {
            match self.guarded(op, call()).await {
                Err(AuthError::Storage(e)) if attempt < self.cfg.read_retries => {
                    attempt += 1;
                    debug!(op, attempt, error = %e, "retrying read");
                }
                other => return other,
            }
        }
    }

    async fn invalidate(&self, hash: &TokenHash) -> Result<(), AuthError> {
        self.guarded("cache_invalidate", self.cache.invalidate(hash))
            .await
    }

    /// Tombstone ahead of a mutation, so a failed invalidation after the
    /// write cannot leave a `Valid` entry behind.
    async fn pre_invalidate(&self, hash: &TokenHash) {
        if let Err(e) = self.invalidate(hash).await {
            warn!(error = %e, hash = %hash.short(), "tombstone before write failed");
        }
    }

    pub async fn store(
        &self,
        owner_id: OwnerId,
        raw: &RawRefreshToken,
        expires_at: DateTime<Utc>,
        metadata: ClientMetadata,
        extra_claims: ExtraClaims,
    ) -> Result<RecordId, AuthError> {
        let hash = self.hash(raw.as_str())?;
        let record = RefreshTokenRecord::new(owner_id, hash, Utc::now(), expires_at, metadata)
            .with_extra_claims(extra_claims);
        self.guarded("insert", self.repo.insert(&record)).await?;
        debug!(%owner_id, record_id = %record.id, hash = %hash.short(), "refresh token stored");
        Ok(record.id)
    }

    /// Outer error is infrastructure; inner is the (private) rejection cause.
    pub async fn validate(
        &self,
        raw: &str,
    ) -> Result<Result<RefreshTokenRecord, Rejection>, AuthError> {
        let hash = self.hash(raw)?;
        let now = Utc::now();

        match self.guarded("cache_get", self.cache.get(&hash)).await {
            Ok(Some(record)) if record.is_valid_at(now) => return Ok(Ok(record)),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "validation cache read failed, using store"),
        }

        let found = self
            .read_with_retry("find_by_hash", || self.repo.find_by_hash(&hash))
            .await?;
        let Some(record) = found else {
            return Ok(Err(Rejection::NotFound));
        };
        if let Err(rejection) = record.check_at(now) {
            return Ok(Err(rejection));
        }
        if let Err(e) = self.guarded("cache_put", self.cache.put(&record)).await {
            warn!(error = %e, "validation cache write failed");
        }
        Ok(Ok(record))
    }

    /// Conditional swap of `old_raw` for `new_raw`; `false` means someone else won.
    pub async fn rotate(
        &self,
        old_raw: &str,
        new_raw: &RawRefreshToken,
        new_expires_at: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        let old = self.hash(old_raw)?;
        let new = self.hash(new_raw.as_str())?;
        self.pre_invalidate(&old).await;
        let swapped = self
            .guarded(
                "replace_hash",
                self.repo.replace_hash(&old, &new, new_expires_at, Utc::now()),
            )
            .await;
        // the old hash is dead or contested either way
        self.invalidate(&old).await?;
        swapped
    }

    pub async fn extend(&self, raw: &str, new_expires_at: DateTime<Utc>) -> Result<bool, AuthError> {
        let hash = self.hash(raw)?;
        self.pre_invalidate(&hash).await;
        let extended = self
            .guarded(
                "extend_expiry",
                self.repo.extend_expiry(&hash, new_expires_at, Utc::now()),
            )
            .await;
        self.invalidate(&hash).await?;
        extended
    }

    pub async fn revoke_by_hash(&self, raw: &str) -> Result<bool, AuthError> {
        let hash = self.hash(raw)?;
        self.pre_invalidate(&hash).await;
        let revoked = self
            .guarded("revoke_by_hash", self.repo.revoke_by_hash(&hash))
            .await;
        self.invalidate(&hash).await?;
        revoked
    }

    pub async fn revoke_by_id(&self, owner_id: OwnerId, id: RecordId) -> Result<bool, AuthError> {
        let hash = self
            .guarded("revoke_by_id", self.repo.revoke_by_id(owner_id, id))
            .await?;
        match hash {
            Some(hash) => {
                self.invalidate(&hash).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn revoke_all_for_owner(&self, owner_id: OwnerId) -> Result<u64, AuthError> {
        let hashes = self
            .guarded(
                "revoke_all_for_owner",
                self.repo.revoke_all_for_owner(owner_id),
            )
            .await?;
        for hash in &hashes {
            self.invalidate(hash).await?;
        }
        Ok(hashes.len() as u64)
    }

    pub async fn list_for_owner(&self, owner_id: OwnerId) -> Result<Vec<RefreshTokenRecord>, AuthError> {
        self.read_with_retry("list_for_owner", || self.repo.list_for_owner(owner_id))
            .await
    }

    /// Rows past `cutoff` are dead already, so nothing in the cache can vouch for them.
    pub async fn cleanup_expired(&self, cutoff: DateTime<Utc>) -> Result<u64, AuthError> {
        self.guarded("delete_expired", self.repo.delete_expired_before(cutoff))
            .await
    }
}
