use crate::application_port::*;
use crate::domain_model::*;
use chrono::{DateTime, Utc};

/// Persisted table of hashed refresh tokens, keyed by `token_hash`.
///
/// Every mutating method is a single guarded write on the backend; callers
/// never read-modify-write a row themselves.
#[async_trait::async_trait]
pub trait RefreshTokenRepo: Send + Sync {
    /// Insert a new row. A duplicate hash is a `Storage` error.
    async fn insert(&self, record: &RefreshTokenRecord) -> Result<(), AuthError>;

    /// Fetch the row for `hash` regardless of its revoked/expired state.
    async fn find_by_hash(&self, hash: &TokenHash) -> Result<Option<RefreshTokenRecord>, AuthError>;

    /// Move a live row from `old` to `new` in one conditional write.
    /// Returns `false` when the row was already rotated, revoked or expired at `now`.
    async fn replace_hash(
        &self,
        old: &TokenHash,
        new: &TokenHash,
        new_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthError>;

    /// Push back the expiry of a live row without changing its hash.
    async fn extend_expiry(
        &self,
        hash: &TokenHash,
        new_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthError>;

    async fn revoke_by_hash(&self, hash: &TokenHash) -> Result<bool, AuthError>;

    /// Revoke one row if it belongs to `owner_id`; returns the hash it held.
    async fn revoke_by_id(
        &self,
        owner_id: OwnerId,
        id: RecordId,
    ) -> Result<Option<TokenHash>, AuthError>;

    /// Revoke every live row of `owner_id`; returns the hashes that were revoked.
    async fn revoke_all_for_owner(&self, owner_id: OwnerId) -> Result<Vec<TokenHash>, AuthError>;

    /// Newest first.
    async fn list_for_owner(&self, owner_id: OwnerId) -> Result<Vec<RefreshTokenRecord>, AuthError>;

    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AuthError>;
}
