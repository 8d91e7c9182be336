use super::{OpaqueTokenGenerator, RefreshTokenStore};
use crate::application_port::AuthError;
use crate::domain_model::*;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RotationPolicy {
    /// Replace the token value on every use.
    Rotate,
    /// Keep the value and push its expiry forward.
    Extend,
}

/// Outcome of a refresh attempt that made it to `Validated`.
#[derive(Debug)]
pub enum RefreshOutcome {
    Rotated {
        record: RefreshTokenRecord,
        new_token: RawRefreshToken,
        expires_at: DateTime<Utc>,
    },
    Extended {
        record: RefreshTokenRecord,
        expires_at: DateTime<Utc>,
    },
}

impl RefreshOutcome {
    /// The row as it was validated, before this refresh touched it.
    pub fn record(&self) -> &RefreshTokenRecord {
        match self {
            RefreshOutcome::Rotated { record, .. } | RefreshOutcome::Extended { record, .. } => {
                record
            }
        }
    }

    pub fn owner_id(&self) -> OwnerId {
        self.record().owner_id
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        match self {
            RefreshOutcome::Rotated { expires_at, .. }
            | RefreshOutcome::Extended { expires_at, .. } => *expires_at,
        }
    }

    pub fn new_token(&self) -> Option<&RawRefreshToken> {
        match self {
            RefreshOutcome::Rotated { new_token, .. } => Some(new_token),
            RefreshOutcome::Extended { .. } => None,
        }
    }
}

/// Drives one refresh attempt: `Presented -> Validated -> Rotated | Rejected`.
///
/// Any rejection, including losing a concurrent rotation, is terminal and
/// surfaces as `InvalidRefreshToken` with no cause attached.
pub struct RotationManager {
    store: Arc<RefreshTokenStore>,
    generator: OpaqueTokenGenerator,
    refresh_ttl: chrono::Duration,
    policy: RotationPolicy,
}

impl RotationManager {
    pub fn new(
        store: Arc<RefreshTokenStore>,
        generator: OpaqueTokenGenerator,
        refresh_ttl: chrono::Duration,
        policy: RotationPolicy,
    ) -> Self {
        Self {
            store,
            generator,
            refresh_ttl,
            policy,
        }
    }

    pub fn policy(&self) -> RotationPolicy {
        self.policy
    }

    pub async fn refresh(&self, presented: &str) -> Result<RefreshOutcome, AuthError> {
        if presented.is_empty() {
            return Err(AuthError::InvalidRefreshToken);
        }

        let record = match self.store.validate(presented).await? {
            Ok(record) => record,
            Err(reason) => {
                debug!(?reason, "refresh token rejected");
                return Err(reason.into());
            }
        };

        let expires_at = Utc::now() + self.refresh_ttl;
        match self.policy {
            RotationPolicy::Rotate => {
                let new_token = self.generator.generate()?;
                if !self.store.rotate(presented, &new_token, expires_at).await? {
                    info!(
                        owner_id = %record.owner_id,
                        record_id = %record.id,
                        "refresh token lost a rotation race"
                    );
                    return Err(AuthError::InvalidRefreshToken);
                }
                debug!(owner_id = %record.owner_id, record_id = %record.id, "refresh token rotated");
                Ok(RefreshOutcome::Rotated {
                    record,
                    new_token,
                    expires_at,
                })
            }
            RotationPolicy::Extend => {
                if !self.store.extend(presented, expires_at).await? {
                    return Err(AuthError::InvalidRefreshToken);
                }
                debug!(owner_id = %record.owner_id, record_id = %record.id, "refresh token extended");
                Ok(RefreshOutcome::Extended { record, expires_at })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application_impl::{HmacTokenHasher, StoreConfig};
    use crate::infra_memory::{MemoryRefreshTokenRepo, MemoryValidationCache};
    use std::time::Duration;

    fn store() -> Arc<RefreshTokenStore> {
        Arc::new(RefreshTokenStore::new(
            Arc::new(MemoryRefreshTokenRepo::new()),
            Arc::new(MemoryValidationCache::new(Duration::from_secs(300))),
            HmacTokenHasher::new(b"rotation-test".to_vec()),
            StoreConfig::default(),
        ))
    }

    fn manager(store: Arc<RefreshTokenStore>, policy: RotationPolicy) -> RotationManager {
        RotationManager::new(
            store,
            OpaqueTokenGenerator::default(),
            chrono::Duration::days(7),
            policy,
        )
    }

    async fn seed(store: &RefreshTokenStore, raw: &str, ttl: chrono::Duration) {
        store
            .store(
                OwnerId(42),
                &RawRefreshToken(raw.to_string()),
                Utc::now() + ttl,
                ClientMetadata::default(),
                ExtraClaims::new(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn rotation_issues_a_new_value_and_kills_the_old() {
        let store = store();
        seed(&store, "seed-token", chrono::Duration::hours(1)).await;
        let rm = manager(store.clone(), RotationPolicy::Rotate);

        let outcome = rm.refresh("seed-token").await.unwrap();
        assert_eq!(outcome.owner_id(), OwnerId(42));
        let next = outcome.new_token().unwrap().clone();
        assert_ne!(next.as_str(), "seed-token");

        assert!(matches!(
            rm.refresh("seed-token").await,
            Err(AuthError::InvalidRefreshToken)
        ));
        assert!(rm.refresh(next.as_str()).await.is_ok());
    }

    #[tokio::test]
    async fn extend_mode_keeps_the_value() {
        let store = store();
        seed(&store, "keep-me", chrono::Duration::minutes(5)).await;
        let rm = manager(store.clone(), RotationPolicy::Extend);

        let outcome = rm.refresh("keep-me").await.unwrap();
        assert!(outcome.new_token().is_none());
        assert!(outcome.expires_at() > Utc::now() + chrono::Duration::days(6));

        let again = rm.refresh("keep-me").await.unwrap();
        assert_eq!(again.owner_id(), OwnerId(42));
        let record = store.validate("keep-me").await.unwrap().unwrap();
        assert_eq!(record.expires_at, again.expires_at());
    }

    #[tokio::test]
    async fn every_rejection_cause_looks_the_same() {
        let store = store();
        seed(&store, "expired", chrono::Duration::seconds(-1)).await;
        seed(&store, "revoked", chrono::Duration::hours(1)).await;
        store.revoke_by_hash("revoked").await.unwrap();
        let rm = manager(store, RotationPolicy::Rotate);

        for presented in ["expired", "revoked", "unknown", ""] {
            let err = rm.refresh(presented).await.unwrap_err();
            assert!(matches!(err, AuthError::InvalidRefreshToken));
            assert_eq!(err.to_string(), "invalid or expired refresh token");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_rotation_has_one_winner() {
        let store = store();
        seed(&store, "contested", chrono::Duration::hours(1)).await;
        let rm = Arc::new(manager(store.clone(), RotationPolicy::Rotate));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let rm = rm.clone();
                tokio::spawn(async move { rm.refresh("contested").await })
            })
            .collect();
        let mut winners = Vec::new();
        for handle in handles {
            match handle.await.unwrap() {
                Ok(outcome) => winners.push(outcome),
                Err(e) => assert!(matches!(e, AuthError::InvalidRefreshToken)),
            }
        }
        assert_eq!(winners.len(), 1);

        let live: Vec<_> = store
            .list_for_owner(OwnerId(42))
            .await
            .unwrap()
            .into_iter()
            .filter(|r| r.is_valid_at(Utc::now()))
            .collect();
        assert_eq!(live.len(), 1);
        let winner_token = winners[0].new_token().unwrap();
        assert_eq!(live[0].token_hash, store.hash(winner_token.as_str()).unwrap());
    }
}
