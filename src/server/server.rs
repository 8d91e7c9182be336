use super::{CleanupWorker, Secrets};
use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::infra_memory::*;
use crate::infra_mysql::*;
use crate::infra_redis::*;
use crate::logger::*;
use crate::settings::{self, Settings};
use anyhow::anyhow;
use sqlx::{MySql, Pool};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const CACHE_KEY_PREFIX: &str = "tokenward:rt";

pub struct Server {
    pub auth_service: Arc<dyn AuthService>,
    pub credential_verifier: Arc<dyn CredentialVerifier>,
    cleanup_handle: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
    pools: Vec<Pool<MySql>>,
}

impl Server {
    pub async fn try_new(settings: &Settings) -> anyhow::Result<Self> {
        let secrets = Secrets::from_env()?;
        Self::try_new_with_secrets(settings, secrets).await
    }

    pub async fn try_new_with_secrets(settings: &Settings, secrets: Secrets) -> anyhow::Result<Self> {
        let mut pools: Vec<Pool<MySql>> = Vec::new();

        let refresh_repo: Arc<dyn RefreshTokenRepo> = match settings.store.backend.as_str() {
            "memory" => Arc::new(MemoryRefreshTokenRepo::new()),
            "mysql" => {
                let dsn = required(&settings.store.mysql_dsn, "store.mysql_dsn")?;
                let pool = Pool::<MySql>::connect(dsn).await?;
                pools.push(pool.clone());
                Arc::new(MySqlRefreshTokenRepo::new(pool))
            }
            other => return Err(anyhow!("Unknown store backend: {}", other)),
        };

        let cache: Arc<dyn ValidationCache> = match settings.cache.backend.as_str() {
            "memory" => Arc::new(MemoryValidationCache::new(Duration::from_secs(
                settings.cache.ttl_secs,
            ))),
            "redis" => {
                let dsn = required(&settings.cache.redis_dsn, "cache.redis_dsn")?;
                let redis_client = redis::Client::open(dsn)?;
                let redis_manager = redis_client.get_connection_manager().await?;
                Arc::new(RedisValidationCache::new(
                    redis_manager,
                    CACHE_KEY_PREFIX,
                    settings.cache.ttl_secs,
                ))
            }
            other => return Err(anyhow!("Unknown cache backend: {}", other)),
        };

        let auth_repo: Arc<dyn AuthRepo> = match settings.credentials.backend.as_str() {
            "fake" => {
                let repo = MemoryAuthRepo::new();
                for user in &settings.credentials.users {
                    repo.add_user(OwnerId(user.owner_id), &user.username, &user.password)?;
                }
                info!(users = settings.credentials.users.len(), "fake credential table seeded");
                Arc::new(repo)
            }
            "real" => {
                let dsn = settings
                    .credentials
                    .mysql_dsn
                    .as_deref()
                    .or(settings.store.mysql_dsn.as_deref())
                    .ok_or_else(|| anyhow!("credentials.mysql_dsn is required"))?;
                let pool = match (&settings.store.mysql_dsn, pools.first()) {
                    (Some(store_dsn), Some(pool)) if store_dsn == dsn => pool.clone(),
                    _ => {
                        let pool = Pool::<MySql>::connect(dsn).await?;
                        pools.push(pool.clone());
                        pool
                    }
                };
                Arc::new(MySqlAuthRepo::new(pool))
            }
            other => return Err(anyhow!("Unknown credentials backend: {}", other)),
        };
        let credential_verifier: Arc<dyn CredentialVerifier> =
            Arc::new(Argon2CredentialVerifier::new(auth_repo));

        let store = Arc::new(RefreshTokenStore::new(
            refresh_repo,
            cache,
            HmacTokenHasher::new(secrets.hash_key),
            StoreConfig {
                timeout: Duration::from_millis(settings.store.timeout_ms),
                read_retries: settings.store.read_retries,
            },
        ));

        let auth_cfg = AuthConfig {
            issuer: settings.auth.issuer.clone(),
            access_ttl: chrono::Duration::seconds(settings.auth.access_ttl_secs),
            refresh_ttl: chrono::Duration::seconds(settings.auth.refresh_ttl_secs),
            cleanup_grace: chrono::Duration::seconds(settings.auth.cleanup_grace_secs),
        };
        let token_codec: Arc<dyn TokenCodec> = Arc::new(JwtHs256Codec::new(JwtConfig {
            issuer: auth_cfg.issuer.clone(),
            signing_key: secrets.signing_key,
        }));

        let generator = OpaqueTokenGenerator::new(settings.auth.refresh_token_bytes);
        let policy = if settings.auth.rotate_refresh_tokens {
            RotationPolicy::Rotate
        } else {
            RotationPolicy::Extend
        };
        let rotation = RotationManager::new(store.clone(), generator.clone(), auth_cfg.refresh_ttl, policy);

        let cookie_resolver = CookiePolicyResolver::new(resolver_config(
            &settings.cookie,
            settings.auth.refresh_ttl_secs,
        )?);
        smoke_test_resolver(&cookie_resolver)?;

        let auth_service: Arc<dyn AuthService> = Arc::new(RealAuthService::new(
            token_codec,
            store,
            rotation,
            generator,
            cookie_resolver,
            auth_cfg,
        ));

        // region runtime infra
        let cancel = CancellationToken::new();
        let worker = CleanupWorker::new(
            auth_service.clone(),
            Duration::from_secs(settings.auth.cleanup_interval_secs),
            cancel.clone(),
        );
        let cleanup_handle = tokio::spawn(async move {
            let _ = worker.run().await;
        });
        // endregion

        info!(?policy, store = %settings.store.backend, cache = %settings.cache.backend, "server started");

        Ok(Self {
            auth_service,
            credential_verifier,
            cleanup_handle: Mutex::new(Some(cleanup_handle)),
            cancel,
            pools,
        })
    }

    pub async fn shutdown(&self) {
        info!("server shutting down...");

        self.cancel.cancel();

        let handle = self.cleanup_handle.lock().ok().and_then(|mut lock| lock.take());
        if let Some(handle) = handle {
            let r = handle.await;
            info!("cleanup handle dropped: {:?}", r);
        }

        for pool in &self.pools {
            pool.close().await;
        }
    }
}

fn required<'a>(value: &'a Option<String>, name: &str) -> anyhow::Result<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| anyhow!("{} is required", name))
}

/// Turns the `[cookie]` section into resolver input.
///
/// Without an explicit `lifetime_secs` the cookie lives as long as the refresh
/// token it carries.
pub fn resolver_config(cookie: &settings::Cookie, refresh_ttl_secs: i64) -> anyhow::Result<ResolverConfig> {
    let samesite = cookie
        .samesite
        .as_deref()
        .map(str::parse::<SameSite>)
        .transpose()
        .map_err(|e| anyhow!("cookie.samesite: {}", e))?;

    let mut filters = Vec::new();
    if cookie.lifetime_secs.is_none() {
        filters.push(CookieFilter::lifetime(move |_, _| refresh_ttl_secs));
    }

    Ok(ResolverConfig {
        overrides: CookieOverrides {
            enabled: cookie.enabled,
            name: cookie.name.clone(),
            samesite,
            secure: cookie.secure,
            httponly: cookie.httponly,
            path: cookie.path.clone(),
            domain: cookie.domain.clone(),
            lifetime_secs: cookie.lifetime_secs,
        },
        filters,
        auth_path: cookie
            .auth_path
            .clone()
            .unwrap_or_else(|| DEFAULT_AUTH_PATH.to_string()),
        debug: cookie.debug,
        allow_insecure_httponly: cookie.allow_insecure_httponly,
    })
}

/// Resolves one request of each host class so a bad `[cookie]` section fails at startup.
pub fn smoke_test_resolver(resolver: &CookiePolicyResolver) -> anyhow::Result<()> {
    let samples = [
        RequestContext::new("localhost", false),
        RequestContext::new("localhost", true).with_origin("https://app.example.com"),
        RequestContext::new("staging.example.com", true),
        RequestContext::new("example.com", true),
    ];
    for ctx in &samples {
        let policy = resolver
            .resolve(ctx)
            .map_err(|e| anyhow!("cookie policy invalid for host {:?}: {}", ctx.host, e))?;
        debug!(host = %ctx.host, ?policy, "cookie policy sample");
    }
    Ok(())
}
