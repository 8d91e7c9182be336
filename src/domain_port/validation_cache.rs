use crate::application_port::*;
use crate::domain_model::*;

/// Short-lived cache of known-valid refresh-token rows.
///
/// `invalidate` leaves a tombstone for one TTL: `get` treats it as a miss and
/// `put` does not overwrite it, so a validation that read the row before a
/// mutation cannot re-populate a stale entry after it.
#[async_trait::async_trait]
pub trait ValidationCache: Send + Sync {
    async fn get(&self, hash: &TokenHash) -> Result<Option<RefreshTokenRecord>, AuthError>;
    async fn put(&self, record: &RefreshTokenRecord) -> Result<(), AuthError>;
    async fn invalidate(&self, hash: &TokenHash) -> Result<(), AuthError>;
}
