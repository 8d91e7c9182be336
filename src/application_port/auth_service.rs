use super::{AccessToken, ConfigurationError, ExtraClaims, TokenError};
use crate::domain_model::*;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid token")]
    InvalidToken,
    #[error("invalid or expired refresh token")]
    InvalidRefreshToken,
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("store error: {0}")]
    Storage(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<TokenError> for AuthError {
    fn from(error: TokenError) -> Self {
        match error {
            TokenError::Encoding(e) => AuthError::Internal(e),
            _ => AuthError::InvalidToken,
        }
    }
}

impl From<Rejection> for AuthError {
    fn from(_: Rejection) -> Self {
        AuthError::InvalidRefreshToken
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedTokens {
    pub access_token: AccessToken,
    pub expires_in: i64,
    pub access_token_expires_at: DateTime<Utc>,
    #[serde(skip)]
    pub cookie_policy: CookiePolicy,
    /// `None` when the presented refresh token was extended in place.
    #[serde(skip)]
    pub refresh_token: Option<RawRefreshToken>,
    pub refresh_token_expires_at: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn authenticate(&self, username: &str, password: &str) -> Result<OwnerId, AuthError>;
}

#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    async fn issue(
        &self,
        owner_id: OwnerId,
        extra_claims: ExtraClaims,
        ctx: &RequestContext,
        metadata: ClientMetadata,
    ) -> Result<IssuedTokens, AuthError>;
    async fn refresh(
        &self,
        raw_refresh_token: &str,
        ctx: &RequestContext,
    ) -> Result<IssuedTokens, AuthError>;
    async fn verify(&self, access_token: &str) -> Result<OwnerId, AuthError>;
    async fn revoke(&self, raw_refresh_token: &str) -> Result<bool, AuthError>;
    async fn revoke_owner_token(
        &self,
        owner_id: OwnerId,
        record_id: RecordId,
    ) -> Result<bool, AuthError>;
    async fn revoke_all_for_owner(&self, owner_id: OwnerId) -> Result<u64, AuthError>;
    async fn list_for_owner(&self, owner_id: OwnerId) -> Result<Vec<RefreshTokenRecord>, AuthError>;
    async fn cleanup_expired(&self) -> Result<u64, AuthError>;
    /// Cookie attributes for `ctx` without issuing anything, for reading or clearing the cookie.
    fn cookie_policy(&self, ctx: &RequestContext) -> Result<CookiePolicy, AuthError>;
}
