use super::util::storage_err;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};

/// `refresh_token` table; see `migrations/0001_refresh_token.sql`.
pub struct MySqlRefreshTokenRepo {
    pool: MySqlPool,
}

impl MySqlRefreshTokenRepo {
    pub fn new(pool: MySqlPool) -> Self {
        MySqlRefreshTokenRepo { pool }
    }

    fn hash_from_bytes(bytes: &[u8]) -> Result<TokenHash, AuthError> {
        TokenHash::from_slice(bytes)
            .ok_or_else(|| AuthError::Storage(format!("token_hash has {} bytes", bytes.len())))
    }

    fn row_to_record(row: MySqlRow) -> Result<RefreshTokenRecord, AuthError> {
        let id: RecordId = row.try_get("id").map_err(storage_err)?;
        let owner_id: OwnerId = row.try_get("owner_id").map_err(storage_err)?;
        let hash_bytes: Vec<u8> = row.try_get("token_hash").map_err(storage_err)?;
        let issued_at: DateTime<Utc> = row.try_get("issued_at").map_err(storage_err)?;
        let expires_at: DateTime<Utc> = row.try_get("expires_at").map_err(storage_err)?;
        let is_revoked: bool = row.try_get("is_revoked").map_err(storage_err)?;
        let ip: Option<String> = row.try_get("client_ip").map_err(storage_err)?;
        let user_agent: Option<String> = row.try_get("user_agent").map_err(storage_err)?;
        let extra_claims: Option<String> = row.try_get("extra_claims").map_err(storage_err)?;
        let extra_claims = match extra_claims {
            Some(json) => serde_json::from_str::<ExtraClaims>(&json)
                .map_err(|e| AuthError::Storage(format!("extra_claims: {}", e)))?,
            None => ExtraClaims::new(),
        };

        Ok(RefreshTokenRecord {
            id,
            owner_id,
            token_hash: Self::hash_from_bytes(&hash_bytes)?,
            issued_at,
            expires_at,
            is_revoked,
            client_metadata: ClientMetadata { ip, user_agent },
            extra_claims,
        })
    }
}

#[async_trait::async_trait]
impl RefreshTokenRepo for MySqlRefreshTokenRepo {
    async fn insert(&self, record: &RefreshTokenRecord) -> Result<(), AuthError> {
        let extra_claims = if record.extra_claims.is_empty() {
            None
        } else {
            let json = serde_json::to_string(&record.extra_claims)
                .map_err(|e| AuthError::Storage(e.to_string()))?;
            Some(json)
        };

        sqlx::query(
            r#"
INSERT INTO refresh_token
    (id, owner_id, token_hash, issued_at, expires_at, is_revoked, client_ip, user_agent, extra_claims)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
"#,
        )
        .bind(record.id)
        .bind(record.owner_id)
        .bind(record.token_hash.as_bytes())
        .bind(record.issued_at)
        .bind(record.expires_at)
        .bind(record.is_revoked)
        .bind(record.client_metadata.ip.as_deref())
        .bind(record.client_metadata.user_agent.as_deref())
        .bind(extra_claims)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }

    async fn find_by_hash(&self, hash: &TokenHash) -> Result<Option<RefreshTokenRecord>, AuthError> {
        let row_opt: Option<MySqlRow> = sqlx::query(
            r#"
SELECT id, owner_id, token_hash, issued_at, expires_at, is_revoked, client_ip, user_agent, extra_claims
FROM refresh_token
WHERE token_hash = ?
"#,
        )
        .bind(hash.as_bytes())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;

        row_opt.map(Self::row_to_record).transpose()
    }

    async fn replace_hash(
        &self,
        old: &TokenHash,
        new: &TokenHash,
        new_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        let res = sqlx::query(
            r#"
UPDATE refresh_token
SET token_hash = ?, expires_at = ?
WHERE token_hash = ?
  AND is_revoked = FALSE
  AND expires_at > ?
"#,
        )
        .bind(new.as_bytes())
        .bind(new_expires_at)
        .bind(old.as_bytes())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(res.rows_affected() == 1)
    }

    async fn extend_expiry(
        &self,
        hash: &TokenHash,
        new_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, AuthError> {
        let res = sqlx::query(
            r#"
UPDATE refresh_token
SET expires_at = ?
WHERE token_hash = ?
  AND is_revoked = FALSE
  AND expires_at > ?
"#,
        )
        .bind(new_expires_at)
        .bind(hash.as_bytes())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(res.rows_affected() == 1)
    }

    async fn revoke_by_hash(&self, hash: &TokenHash) -> Result<bool, AuthError> {
        let res = sqlx::query(
            r#"
UPDATE refresh_token
SET is_revoked = TRUE
WHERE token_hash = ? AND is_revoked = FALSE
"#,
        )
        .bind(hash.as_bytes())
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(res.rows_affected() == 1)
    }

    async fn revoke_by_id(
        &self,
        owner_id: OwnerId,
        id: RecordId,
    ) -> Result<Option<TokenHash>, AuthError> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        let row_opt: Option<MySqlRow> = sqlx::query(
            r#"
SELECT token_hash
FROM refresh_token
WHERE id = ? AND owner_id = ? AND is_revoked = FALSE
FOR UPDATE
"#,
        )
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage_err)?;

        let Some(row) = row_opt else {
            tx.rollback().await.map_err(storage_err)?;
            return Ok(None);
        };
        let hash_bytes: Vec<u8> = row.try_get("token_hash").map_err(storage_err)?;
        let hash = Self::hash_from_bytes(&hash_bytes)?;

        sqlx::query("UPDATE refresh_token SET is_revoked = TRUE WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(storage_err)?;
        tx.commit().await.map_err(storage_err)?;

        Ok(Some(hash))
    }

    async fn revoke_all_for_owner(&self, owner_id: OwnerId) -> Result<Vec<TokenHash>, AuthError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(storage_err)?;

        let rows = sqlx::query(
            r#"
SELECT token_hash
FROM refresh_token
WHERE owner_id = ? AND is_revoked = FALSE AND expires_at > ?
FOR UPDATE
"#,
        )
        .bind(owner_id)
        .bind(now)
        .fetch_all(&mut *tx)
        .await
        .map_err(storage_err)?;

        let mut hashes = Vec::with_capacity(rows.len());
        for row in &rows {
            let bytes: Vec<u8> = row.try_get("token_hash").map_err(storage_err)?;
            hashes.push(Self::hash_from_bytes(&bytes)?);
        }

        sqlx::query(
            r#"
UPDATE refresh_token
SET is_revoked = TRUE
WHERE owner_id = ? AND is_revoked = FALSE AND expires_at > ?
"#,
        )
        .bind(owner_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(storage_err)?;
        tx.commit().await.map_err(storage_err)?;

        Ok(hashes)
    }

    async fn list_for_owner(&self, owner_id: OwnerId) -> Result<Vec<RefreshTokenRecord>, AuthError> {
        let rows = sqlx::query(
            r#"
SELECT id, owner_id, token_hash, issued_at, expires_at, is_revoked, client_ip, user_agent, extra_claims
FROM refresh_token
WHERE owner_id = ?
ORDER BY issued_at DESC
"#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn delete_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AuthError> {
        let res = sqlx::query("DELETE FROM refresh_token WHERE expires_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(res.rows_affected())
    }
}
