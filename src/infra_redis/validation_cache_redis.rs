use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use redis::aio::ConnectionManager;
use redis::{
    AsyncCommands, ExistenceCheck, FromRedisValue, RedisError, RedisResult, RedisWrite, SetExpiry,
    SetOptions, ToRedisArgs, Value,
};

const TOMBSTONE: &str = "-";

/// What a cache key holds: a serialized row, or a marker left by `invalidate`.
#[derive(Debug, Clone, PartialEq)]
enum CachedEntry {
    Valid(RefreshTokenRecord),
    Tombstone,
}

impl ToRedisArgs for CachedEntry {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + RedisWrite,
    {
        match self {
            CachedEntry::Tombstone => out.write_arg(TOMBSTONE.as_bytes()),
            // serializing plain data into a Vec cannot fail
            CachedEntry::Valid(rec) => out.write_arg(&serde_json::to_vec(rec).unwrap_or_default()),
        }
    }
}

impl FromRedisValue for CachedEntry {
    fn from_redis_value(v: &Value) -> RedisResult<Self> {
        let s: String = redis::from_redis_value(v)?;
        if s == TOMBSTONE {
            return Ok(CachedEntry::Tombstone);
        }
        let rec = serde_json::from_str::<RefreshTokenRecord>(&s).map_err(|e| {
            RedisError::from((
                redis::ErrorKind::TypeError,
                "invalid cached refresh token",
                e.to_string(),
            ))
        })?;
        Ok(CachedEntry::Valid(rec))
    }
}

pub struct RedisValidationCache {
    conn: ConnectionManager,
    prefix: String,
    ttl_secs: u64,
}

impl RedisValidationCache {
    pub fn new(conn: ConnectionManager, prefix: impl Into<String>, ttl_secs: u64) -> Self {
        RedisValidationCache {
            conn,
            prefix: prefix.into(),
            ttl_secs: ttl_secs.max(1),
        }
    }

    fn key(&self, hash: &TokenHash) -> String {
        format!("{}:{}", self.prefix, hash.to_hex())
    }
}

#[async_trait::async_trait]
impl ValidationCache for RedisValidationCache {
    async fn get(&self, hash: &TokenHash) -> Result<Option<RefreshTokenRecord>, AuthError> {
        let key = self.key(hash);
        let mut conn = self.conn.clone();
        let val: Option<CachedEntry> = conn
            .get(&key)
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))?;
        match val {
            Some(CachedEntry::Valid(rec)) => Ok(Some(rec)),
            Some(CachedEntry::Tombstone) | None => Ok(None),
        }
    }

    async fn put(&self, record: &RefreshTokenRecord) -> Result<(), AuthError> {
        let key = self.key(&record.token_hash);
        let mut conn = self.conn.clone();
        // NX: a tombstone already at the key stays put
        let opts = SetOptions::default()
            .conditional_set(ExistenceCheck::NX)
            .with_expiration(SetExpiry::EX(self.ttl_secs));
        let _: Option<String> = conn
            .set_options(&key, CachedEntry::Valid(record.clone()), opts)
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn invalidate(&self, hash: &TokenHash) -> Result<(), AuthError> {
        let key = self.key(hash);
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(&key, CachedEntry::Tombstone, self.ttl_secs)
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record() -> RefreshTokenRecord {
        let now = Utc::now();
        RefreshTokenRecord::new(
            OwnerId(77),
            TokenHash([0xab; TOKEN_HASH_LEN]),
            now,
            now + chrono::Duration::hours(1),
            ClientMetadata {
                ip: Some("10.0.0.1".to_string()),
                user_agent: None,
            },
        )
    }

    #[test]
    fn cached_entry_decodes_tombstone_and_record() {
        let tomb = Value::BulkString(TOMBSTONE.as_bytes().to_vec());
        assert_eq!(CachedEntry::from_redis_value(&tomb).unwrap(), CachedEntry::Tombstone);

        let rec = record();
        let json = serde_json::to_vec(&rec).unwrap();
        let decoded = CachedEntry::from_redis_value(&Value::BulkString(json)).unwrap();
        assert_eq!(decoded, CachedEntry::Valid(rec));
    }

    #[test]
    fn garbage_is_a_type_error() {
        let junk = Value::BulkString(b"{not json".to_vec());
        assert!(CachedEntry::from_redis_value(&junk).is_err());
    }
}
