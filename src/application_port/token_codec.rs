use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Registered claim names that extra claims may not shadow.
pub const RESERVED_CLAIMS: [&str; 5] = ["iss", "sub", "iat", "exp", "jti"];

pub use crate::domain_model::ExtraClaims;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub iss: String,
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    #[serde(flatten)]
    pub extra: ExtraClaims,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AccessToken(pub String);

#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token uses an unsupported algorithm")]
    Format,
    #[error("token signature mismatch")]
    Signature,
    #[error("token expired")]
    Expired,
    #[error("token claims rejected")]
    Claims,
    #[error("token encoding failed: {0}")]
    Encoding(String),
}

pub trait TokenCodec: Send + Sync {
    fn encode(&self, claims: &AccessClaims) -> Result<AccessToken, TokenError>;
    /// Verifies signature and expiry against `now`; no leeway.
    fn decode(&self, token: &str, now: DateTime<Utc>) -> Result<AccessClaims, TokenError>;
}
