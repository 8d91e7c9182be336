use crate::application_port::AuthService;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Periodically deletes refresh-token rows that are past their grace window.
pub struct CleanupWorker {
    auth_service: Arc<dyn AuthService>,
    interval: Duration,
    cancellation_token: CancellationToken,
}

impl CleanupWorker {
    pub fn new(
        auth_service: Arc<dyn AuthService>,
        interval: Duration,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            auth_service,
            interval: interval.max(Duration::from_millis(1)),
            cancellation_token,
        }
    }

    async fn tick_once(&self) -> anyhow::Result<()> {
        let deleted = self.auth_service.cleanup_expired().await?;
        tracing::debug!(deleted, "cleanup tick");
        Ok(())
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = self.cancellation_token.cancelled() => {
                    tracing::info!("cleanup worker shutting down...");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.tick_once().await {
                        tracing::error!("cleanup worker error: {:#}", e);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application_impl::*;
    use crate::application_port::*;
    use crate::domain_model::*;
    use crate::infra_memory::{MemoryRefreshTokenRepo, MemoryValidationCache};

    fn service(refresh_ttl: chrono::Duration) -> Arc<dyn AuthService> {
        let cfg = AuthConfig {
            refresh_ttl,
            cleanup_grace: chrono::Duration::zero(),
            ..Default::default()
        };
        let store = Arc::new(RefreshTokenStore::new(
            Arc::new(MemoryRefreshTokenRepo::new()),
            Arc::new(MemoryValidationCache::new(Duration::from_secs(60))),
            HmacTokenHasher::new(b"cleanup-hash".to_vec()),
            StoreConfig::default(),
        ));
        let rotation = RotationManager::new(
            store.clone(),
            OpaqueTokenGenerator::default(),
            cfg.refresh_ttl,
            RotationPolicy::Rotate,
        );
        Arc::new(RealAuthService::new(
            Arc::new(JwtHs256Codec::new(JwtConfig {
                issuer: cfg.issuer.clone(),
                signing_key: b"cleanup-sign".to_vec(),
            })),
            store,
            rotation,
            OpaqueTokenGenerator::default(),
            CookiePolicyResolver::new(ResolverConfig::default()),
            cfg,
        ))
    }

    #[tokio::test]
    async fn deletes_expired_rows_until_cancelled() {
        let svc = service(chrono::Duration::seconds(-10));
        let ctx = RequestContext::new("localhost", false);
        for _ in 0..3 {
            svc.issue(OwnerId(4), ExtraClaims::new(), &ctx, ClientMetadata::default())
                .await
                .unwrap();
        }
        assert_eq!(svc.list_for_owner(OwnerId(4)).await.unwrap().len(), 3);

        let cancel = CancellationToken::new();
        let worker = CleanupWorker::new(svc.clone(), Duration::from_millis(10), cancel.clone());
        let handle = tokio::spawn(async move { worker.run().await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        handle.await.unwrap().unwrap();

        assert!(svc.list_for_owner(OwnerId(4)).await.unwrap().is_empty());
    }
}
