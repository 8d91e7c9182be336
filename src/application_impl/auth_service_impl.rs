use super::{
    CookiePolicyResolver, OpaqueTokenGenerator, RefreshOutcome, RefreshTokenStore, RotationManager,
};
use crate::application_port::*;
use crate::domain_model::*;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub issuer: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    /// Expired rows are kept this long before `cleanup_expired` deletes them.
    pub cleanup_grace: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: "tokenward".to_string(),
            access_ttl: Duration::minutes(15),
            refresh_ttl: Duration::days(7),
            cleanup_grace: Duration::days(1),
        }
    }
}

pub struct RealAuthService {
    token_codec: Arc<dyn TokenCodec>,
    store: Arc<RefreshTokenStore>,
    rotation: RotationManager,
    generator: OpaqueTokenGenerator,
    cookie_resolver: CookiePolicyResolver,
    cfg: AuthConfig,
}

impl RealAuthService {
    pub fn new(
        token_codec: Arc<dyn TokenCodec>,
        store: Arc<RefreshTokenStore>,
        rotation: RotationManager,
        generator: OpaqueTokenGenerator,
        cookie_resolver: CookiePolicyResolver,
        cfg: AuthConfig,
    ) -> Self {
        Self {
            token_codec,
            store,
            rotation,
            generator,
            cookie_resolver,
            cfg,
        }
    }

    #[inline]
    fn new_jti() -> String {
        Uuid::new_v4().to_string()
    }

    fn strip_reserved(mut extra: ExtraClaims) -> ExtraClaims {
        for reserved in RESERVED_CLAIMS {
            if extra.remove(reserved).is_some() {
                warn!(claim = reserved, "dropping extra claim that shadows a registered claim");
            }
        }
        extra
    }

    fn access_claims(&self, owner_id: OwnerId, extra: ExtraClaims, now: DateTime<Utc>) -> AccessClaims {
        AccessClaims {
            iss: self.cfg.issuer.clone(),
            sub: owner_id.to_string(),
            iat: now.timestamp(),
            exp: (now + self.cfg.access_ttl).timestamp(),
            jti: Self::new_jti(),
            extra,
        }
    }

    fn issue_access(
        &self,
        owner_id: OwnerId,
        extra: ExtraClaims,
    ) -> Result<(AccessToken, DateTime<Utc>), AuthError> {
        let now = Utc::now();
        let claims = self.access_claims(owner_id, extra, now);
        let token = self.token_codec.encode(&claims)?;
        let exp = DateTime::<Utc>::from_timestamp(claims.exp, 0)
            .ok_or_else(|| AuthError::Internal("access expiry out of range".to_string()))?;
        Ok((token, exp))
    }

    fn expires_in(&self) -> i64 {
        self.cfg.access_ttl.num_seconds()
    }
}

#[async_trait::async_trait]
impl AuthService for RealAuthService {
    async fn issue(
        &self,
        owner_id: OwnerId,
        extra_claims: ExtraClaims,
        ctx: &RequestContext,
        metadata: ClientMetadata,
    ) -> Result<IssuedTokens, AuthError> {
        let cookie_policy = self.cookie_resolver.resolve(ctx)?;
        let extra_claims = Self::strip_reserved(extra_claims);

        let refresh_token = self.generator.generate()?;
        let refresh_exp = Utc::now() + self.cfg.refresh_ttl;
        let record_id = self
            .store
            .store(owner_id, &refresh_token, refresh_exp, metadata, extra_claims.clone())
            .await?;

        let (access_token, access_exp) = self.issue_access(owner_id, extra_claims)?;
        info!(%owner_id, %record_id, environment = ?cookie_policy.environment, "tokens issued");

        Ok(IssuedTokens {
            access_token,
            expires_in: self.expires_in(),
            access_token_expires_at: access_exp,
            cookie_policy,
            refresh_token: Some(refresh_token),
            refresh_token_expires_at: refresh_exp,
        })
    }

    async fn refresh(
        &self,
        raw_refresh_token: &str,
        ctx: &RequestContext,
    ) -> Result<IssuedTokens, AuthError> {
        // resolved before rotation: a config error must leave the presented token usable
        let cookie_policy = self.cookie_resolver.resolve(ctx)?;

        let outcome = self.rotation.refresh(raw_refresh_token).await?;
        let owner_id = outcome.owner_id();
        let extra_claims = outcome.record().extra_claims.clone();
        let (access_token, access_exp) = self.issue_access(owner_id, extra_claims)?;
        let refresh_token_expires_at = outcome.expires_at();
        let refresh_token = match outcome {
            RefreshOutcome::Rotated { new_token, .. } => Some(new_token),
            RefreshOutcome::Extended { .. } => None,
        };
        debug!(%owner_id, rotated = refresh_token.is_some(), "tokens refreshed");

        Ok(IssuedTokens {
            access_token,
            expires_in: self.expires_in(),
            access_token_expires_at: access_exp,
            cookie_policy,
            refresh_token,
            refresh_token_expires_at,
        })
    }

    async fn verify(&self, access_token: &str) -> Result<OwnerId, AuthError> {
        let claims = self
            .token_codec
            .decode(access_token, Utc::now())
            .map_err(|e| {
                debug!(error = %e, "access token rejected");
                AuthError::from(e)
            })?;
        claims
            .sub
            .parse::<OwnerId>()
            .map_err(|_| AuthError::InvalidToken)
    }

    async fn revoke(&self, raw_refresh_token: &str) -> Result<bool, AuthError> {
        let revoked = self.store.revoke_by_hash(raw_refresh_token).await?;
        debug!(revoked, "refresh token revoke requested");
        Ok(revoked)
    }

    async fn revoke_owner_token(
        &self,
        owner_id: OwnerId,
        record_id: RecordId,
    ) -> Result<bool, AuthError> {
        let revoked = self.store.revoke_by_id(owner_id, record_id).await?;
        if revoked {
            info!(%owner_id, %record_id, "refresh token revoked");
        }
        Ok(revoked)
    }

    async fn revoke_all_for_owner(&self, owner_id: OwnerId) -> Result<u64, AuthError> {
        let count = self.store.revoke_all_for_owner(owner_id).await?;
        info!(%owner_id, count, "all refresh tokens revoked");
        Ok(count)
    }

    async fn list_for_owner(&self, owner_id: OwnerId) -> Result<Vec<RefreshTokenRecord>, AuthError> {
        self.store.list_for_owner(owner_id).await
    }

    async fn cleanup_expired(&self) -> Result<u64, AuthError> {
        let cutoff = Utc::now() - self.cfg.cleanup_grace;
        let deleted = self.store.cleanup_expired(cutoff).await?;
        if deleted > 0 {
            info!(deleted, "expired refresh tokens deleted");
        }
        Ok(deleted)
    }

    fn cookie_policy(&self, ctx: &RequestContext) -> Result<CookiePolicy, AuthError> {
        Ok(self.cookie_resolver.resolve(ctx)?)
    }
}
