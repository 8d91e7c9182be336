use super::OwnerId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
pub struct RecordId(pub uuid::Uuid);

impl RecordId {
    pub fn new() -> Self {
        RecordId(uuid::Uuid::new_v4())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::from_str(s).map(RecordId)
    }
}

pub const TOKEN_HASH_LEN: usize = 32;

/// Keyed digest of a raw refresh token. The raw value itself is never kept.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct TokenHash(pub [u8; TOKEN_HASH_LEN]);

impl TokenHash {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; TOKEN_HASH_LEN] = bytes.try_into().ok()?;
        Some(TokenHash(arr))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First bytes only, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Debug for TokenHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenHash({}..)", self.short())
    }
}

/// Raw opaque refresh token as handed to the client. Never persisted.
#[derive(Clone, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RawRefreshToken(pub String);

impl RawRefreshToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for RawRefreshToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RawRefreshToken(<redacted>)")
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ClientMetadata {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Non-registered access-token claims, carried over to every refreshed token.
pub type ExtraClaims = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    pub id: RecordId,
    pub owner_id: OwnerId,
    pub token_hash: TokenHash,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_revoked: bool,
    pub client_metadata: ClientMetadata,
    #[serde(default)]
    pub extra_claims: ExtraClaims,
}

/// Why a presented refresh token was refused. Never shown to the caller.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Rejection {
    NotFound,
    Expired,
    Revoked,
}

impl RefreshTokenRecord {
    pub fn new(
        owner_id: OwnerId,
        token_hash: TokenHash,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        client_metadata: ClientMetadata,
    ) -> Self {
        Self {
            id: RecordId::new(),
            owner_id,
            token_hash,
            issued_at,
            expires_at,
            is_revoked: false,
            client_metadata,
            extra_claims: ExtraClaims::new(),
        }
    }

    pub fn with_extra_claims(mut self, extra_claims: ExtraClaims) -> Self {
        self.extra_claims = extra_claims;
        self
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked && !self.is_expired_at(now)
    }

    pub fn check_at(&self, now: DateTime<Utc>) -> Result<(), Rejection> {
        if self.is_revoked {
            Err(Rejection::Revoked)
        } else if self.is_expired_at(now) {
            Err(Rejection::Expired)
        } else {
            Ok(())
        }
    }
}
