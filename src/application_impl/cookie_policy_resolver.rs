use crate::application_port::ConfigurationError;
use crate::domain_model::*;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::warn;

pub const DEFAULT_COOKIE_NAME: &str = "refresh_token";
pub const DEFAULT_COOKIE_LIFETIME_SECS: i64 = 24 * 60 * 60;
pub const DEFAULT_AUTH_PATH: &str = "/api/v1/auth";

/// Deploy-time values; any field set here is authoritative.
#[derive(Debug, Clone, Default)]
pub struct CookieOverrides {
    pub enabled: Option<bool>,
    pub name: Option<String>,
    pub samesite: Option<SameSite>,
    pub secure: Option<bool>,
    pub httponly: Option<bool>,
    pub path: Option<String>,
    pub domain: Option<String>,
    pub lifetime_secs: Option<i64>,
}

type FilterFn = dyn Fn(CookiePolicy, &RequestContext) -> CookiePolicy + Send + Sync;

/// One runtime customization step, applied after environment defaults.
#[derive(Clone)]
pub struct CookieFilter {
    name: String,
    apply: Arc<FilterFn>,
}

impl CookieFilter {
    pub fn new<F>(name: impl Into<String>, apply: F) -> Self
    where
        F: Fn(CookiePolicy, &RequestContext) -> CookiePolicy + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            apply: Arc::new(apply),
        }
    }

    pub fn samesite<F>(f: F) -> Self
    where
        F: Fn(SameSite, Environment) -> SameSite + Send + Sync + 'static,
    {
        Self::new("samesite", move |mut policy, _| {
            policy.samesite = f(policy.samesite, policy.environment);
            policy
        })
    }

    pub fn secure<F>(f: F) -> Self
    where
        F: Fn(bool, Environment) -> bool + Send + Sync + 'static,
    {
        Self::new("secure", move |mut policy, _| {
            policy.secure = f(policy.secure, policy.environment);
            policy
        })
    }

    pub fn path<F>(f: F) -> Self
    where
        F: Fn(&str, Environment) -> String + Send + Sync + 'static,
    {
        Self::new("path", move |mut policy, _| {
            policy.path = f(&policy.path, policy.environment);
            policy
        })
    }

    pub fn domain<F>(f: F) -> Self
    where
        F: Fn(Option<&str>, &RequestContext) -> Option<String> + Send + Sync + 'static,
    {
        Self::new("domain", move |mut policy, ctx| {
            policy.domain = f(policy.domain.as_deref(), ctx);
            policy
        })
    }

    pub fn lifetime<F>(f: F) -> Self
    where
        F: Fn(i64, Environment) -> i64 + Send + Sync + 'static,
    {
        Self::new("lifetime", move |mut policy, _| {
            policy.lifetime_secs = f(policy.lifetime_secs, policy.environment);
            policy
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for CookieFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CookieFilter").field(&self.name).finish()
    }
}

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub overrides: CookieOverrides,
    pub filters: Vec<CookieFilter>,
    /// Path the production cookie is restricted to.
    pub auth_path: String,
    /// Forces the development environment regardless of host.
    pub debug: bool,
    /// Lets `httponly=false` through, with a warning on every resolution.
    pub allow_insecure_httponly: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            overrides: CookieOverrides::default(),
            filters: Vec::new(),
            auth_path: DEFAULT_AUTH_PATH.to_string(),
            debug: false,
            allow_insecure_httponly: false,
        }
    }
}

/// Stateless: the same config and context always give the same policy.
#[derive(Debug, Clone)]
pub struct CookiePolicyResolver {
    cfg: ResolverConfig,
}

impl CookiePolicyResolver {
    pub fn new(cfg: ResolverConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.cfg
    }

    pub fn resolve(&self, ctx: &RequestContext) -> Result<CookiePolicy, ConfigurationError> {
        let environment = classify_environment(&ctx.host, ctx.is_https, self.cfg.debug);

        let mut policy = Self::fallback(environment);
        self.apply_environment_defaults(&mut policy, ctx);
        for filter in &self.cfg.filters {
            policy = (filter.apply)(policy, ctx);
        }
        self.apply_overrides(&mut policy);

        self.validate(policy)
    }

    fn fallback(environment: Environment) -> CookiePolicy {
        CookiePolicy {
            enabled: true,
            name: DEFAULT_COOKIE_NAME.to_string(),
            samesite: SameSite::Lax,
            secure: true,
            httponly: true,
            path: "/".to_string(),
            domain: None,
            lifetime_secs: DEFAULT_COOKIE_LIFETIME_SECS,
            environment,
        }
    }

    fn apply_environment_defaults(&self, policy: &mut CookiePolicy, ctx: &RequestContext) {
        match policy.environment {
            Environment::Development => {
                policy.samesite = if ctx.is_https && is_cross_site(ctx) {
                    SameSite::None
                } else {
                    SameSite::Lax
                };
                policy.secure = ctx.is_https;
                policy.path = "/".to_string();
            }
            Environment::Staging => {
                policy.samesite = SameSite::Lax;
                policy.secure = true;
                policy.path = "/".to_string();
            }
            Environment::Production => {
                policy.samesite = SameSite::Strict;
                policy.secure = true;
                policy.path = self.cfg.auth_path.clone();
            }
        }
    }

    fn apply_overrides(&self, policy: &mut CookiePolicy) {
        let o = &self.cfg.overrides;
        if let Some(enabled) = o.enabled {
            policy.enabled = enabled;
        }
        if let Some(name) = &o.name {
            policy.name = name.clone();
        }
        if let Some(samesite) = o.samesite {
            policy.samesite = samesite;
        }
        if let Some(secure) = o.secure {
            policy.secure = secure;
        }
        if let Some(httponly) = o.httponly {
            policy.httponly = httponly;
        }
        if let Some(path) = &o.path {
            policy.path = path.clone();
        }
        if let Some(domain) = &o.domain {
            policy.domain = Some(domain.clone());
        }
        if let Some(lifetime) = o.lifetime_secs {
            policy.lifetime_secs = lifetime;
        }
    }

    fn validate(&self, mut policy: CookiePolicy) -> Result<CookiePolicy, ConfigurationError> {
        if policy.samesite == SameSite::None && !policy.secure {
            return Err(ConfigurationError::InsecureSameSiteNone);
        }
        if !policy.httponly {
            if !self.cfg.allow_insecure_httponly {
                return Err(ConfigurationError::HttpOnlyDisabled);
            }
            warn!(
                cookie = %policy.name,
                "refresh cookie is readable by scripts (httponly=false debug override)"
            );
        }
        if policy.lifetime_secs <= 0 {
            policy.lifetime_secs = DEFAULT_COOKIE_LIFETIME_SECS;
        }
        policy.name = sanitize_cookie_name(&policy.name);
        if policy.path.is_empty() || !policy.path.starts_with('/') {
            policy.path = "/".to_string();
        }
        policy.domain = policy
            .domain
            .map(|d| d.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|d| !d.is_empty());
        Ok(policy)
    }
}

/// RFC 6265 cookie-name token characters only; empty falls back to the default name.
pub fn sanitize_cookie_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(*c))
        .collect();
    if cleaned.is_empty() {
        DEFAULT_COOKIE_NAME.to_string()
    } else {
        cleaned
    }
}

fn strip_port(host: &str) -> &str {
    let host = host.trim();
    if let Some(rest) = host.strip_prefix('[') {
        // bracketed IPv6, optionally with a port
        return rest.split(']').next().unwrap_or(rest);
    }
    if host.matches(':').count() > 1 {
        // bare IPv6
        return host;
    }
    host.split(':').next().unwrap_or(host)
}

fn normalize_host(host: &str) -> String {
    strip_port(host).trim_end_matches('.').to_ascii_lowercase()
}

fn is_local_host(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1")
        || host.ends_with(".local")
        || host.ends_with(".test")
        || host.ends_with(".localhost")
}

pub fn classify_environment(host: &str, _is_https: bool, debug: bool) -> Environment {
    let host = normalize_host(host);
    if debug || is_local_host(&host) {
        Environment::Development
    } else if host.contains("staging") || host.contains("dev") || host.contains("test") {
        Environment::Staging
    } else {
        Environment::Production
    }
}

/// Last two labels of a DNS name; IPs and local names are their own site.
fn site_of(host: &str) -> String {
    if host.parse::<IpAddr>().is_ok() || (is_local_host(host) && !host.contains('.')) {
        return host.to_string();
    }
    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    if labels.len() <= 2 {
        host.to_string()
    } else {
        labels[labels.len() - 2..].join(".")
    }
}

fn origin_host(origin: &str) -> Option<String> {
    let rest = origin.split_once("://").map(|(_, r)| r).unwrap_or(origin);
    let authority = rest.split('/').next()?;
    let authority = authority.rsplit('@').next()?;
    let host = normalize_host(authority);
    (!host.is_empty()).then_some(host)
}

pub fn is_cross_site(ctx: &RequestContext) -> bool {
    let Some(origin) = ctx.origin.as_deref() else {
        return false;
    };
    match origin_host(origin) {
        Some(origin_host) => site_of(&origin_host) != site_of(&normalize_host(&ctx.host)),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(cfg: ResolverConfig, ctx: RequestContext) -> Result<CookiePolicy, ConfigurationError> {
        CookiePolicyResolver::new(cfg).resolve(&ctx)
    }

    #[test]
    fn classifies_environments() {
        for host in [
            "localhost",
            "localhost:8080",
            "127.0.0.1",
            "[::1]:3000",
            "::1",
            "myapp.local",
            "shop.test",
            "api.localhost",
        ] {
            assert_eq!(classify_environment(host, false, false), Environment::Development, "{}", host);
        }
        for host in ["staging.example.com", "dev.example.com", "api-test.example.org"] {
            assert_eq!(classify_environment(host, true, false), Environment::Staging, "{}", host);
        }
        assert_eq!(classify_environment("example.com", true, false), Environment::Production);
        assert_eq!(classify_environment("example.com", true, true), Environment::Development);
    }

    #[test]
    fn localhost_over_http_is_lax_and_insecure() {
        let p = resolve(ResolverConfig::default(), RequestContext::new("localhost:8080", false)).unwrap();
        assert_eq!(p.environment, Environment::Development);
        assert_eq!(p.samesite, SameSite::Lax);
        assert!(!p.secure);
        assert!(p.httponly);
        assert_eq!(p.path, "/");
        assert_eq!(p.lifetime_secs, DEFAULT_COOKIE_LIFETIME_SECS);
    }

    #[test]
    fn cross_site_dev_over_https_uses_none() {
        let ctx = RequestContext::new("api.localhost", true).with_origin("https://frontend.test:5173");
        let p = resolve(ResolverConfig::default(), ctx).unwrap();
        assert_eq!(p.samesite, SameSite::None);
        assert!(p.secure);
    }

    #[test]
    fn cross_site_dev_over_http_stays_lax() {
        let ctx = RequestContext::new("localhost:8080", false).with_origin("http://127.0.0.1:3000");
        let p = resolve(ResolverConfig::default(), ctx).unwrap();
        assert_eq!(p.samesite, SameSite::Lax);
        assert!(!p.secure);
    }

    #[test]
    fn same_site_origin_is_not_cross_site() {
        let ctx = RequestContext::new("api.example.com", true).with_origin("https://www.example.com");
        assert!(!is_cross_site(&ctx));
        let ctx = RequestContext::new("api.example.com", true).with_origin("https://example.org");
        assert!(is_cross_site(&ctx));
        assert!(!is_cross_site(&RequestContext::new("api.example.com", true)));
    }

    #[test]
    fn staging_host_is_lax_and_secure() {
        let p = resolve(ResolverConfig::default(), RequestContext::new("staging.example.com", true)).unwrap();
        assert_eq!(p.environment, Environment::Staging);
        assert_eq!(p.samesite, SameSite::Lax);
        assert!(p.secure);
        assert_eq!(p.path, "/");
    }

    #[test]
    fn production_is_strict_and_path_restricted() {
        let p = resolve(ResolverConfig::default(), RequestContext::new("example.com", true)).unwrap();
        assert_eq!(p.environment, Environment::Production);
        assert_eq!(p.samesite, SameSite::Strict);
        assert!(p.secure);
        assert_eq!(p.path, DEFAULT_AUTH_PATH);
    }

    #[test]
    fn insecure_none_override_is_rejected() {
        let cfg = ResolverConfig {
            overrides: CookieOverrides {
                samesite: Some(SameSite::None),
                secure: Some(false),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(
            resolve(cfg, RequestContext::new("example.com", true)),
            Err(ConfigurationError::InsecureSameSiteNone)
        );
    }

    #[test]
    fn none_override_on_plain_http_dev_is_rejected() {
        let cfg = ResolverConfig {
            overrides: CookieOverrides {
                samesite: Some(SameSite::None),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(
            resolve(cfg, RequestContext::new("localhost", false)),
            Err(ConfigurationError::InsecureSameSiteNone)
        );
    }

    #[test]
    fn httponly_off_needs_the_debug_override() {
        let overrides = CookieOverrides {
            httponly: Some(false),
            ..Default::default()
        };
        let strict = ResolverConfig {
            overrides: overrides.clone(),
            ..Default::default()
        };
        assert_eq!(
            resolve(strict, RequestContext::new("example.com", true)),
            Err(ConfigurationError::HttpOnlyDisabled)
        );

        let loose = ResolverConfig {
            overrides,
            allow_insecure_httponly: true,
            ..Default::default()
        };
        let p = resolve(loose, RequestContext::new("example.com", true)).unwrap();
        assert!(!p.httponly);
    }

    #[test]
    fn bad_lifetime_and_name_fall_back() {
        let cfg = ResolverConfig {
            overrides: CookieOverrides {
                name: Some(" ;=\t".to_string()),
                lifetime_secs: Some(-5),
                ..Default::default()
            },
            ..Default::default()
        };
        let p = resolve(cfg, RequestContext::new("example.com", true)).unwrap();
        assert_eq!(p.name, DEFAULT_COOKIE_NAME);
        assert_eq!(p.lifetime_secs, DEFAULT_COOKIE_LIFETIME_SECS);
    }

    #[test]
    fn name_is_sanitized() {
        assert_eq!(sanitize_cookie_name("my app;token"), "myapptoken");
        assert_eq!(sanitize_cookie_name("__Host-rt"), "__Host-rt");
    }

    #[test]
    fn overrides_beat_filters_and_filters_beat_defaults() {
        let cfg = ResolverConfig {
            overrides: CookieOverrides {
                path: Some("/auth".to_string()),
                ..Default::default()
            },
            filters: vec![
                CookieFilter::path(|_, _| "/from-filter".to_string()),
                CookieFilter::samesite(|current, env| match env {
                    Environment::Production => SameSite::Lax,
                    _ => current,
                }),
                CookieFilter::domain(|_, ctx| Some(format!(".{}", ctx.host))),
            ],
            ..Default::default()
        };
        let p = resolve(cfg, RequestContext::new("Example.com", true)).unwrap();
        assert_eq!(p.path, "/auth");
        assert_eq!(p.samesite, SameSite::Lax);
        assert_eq!(p.domain.as_deref(), Some("example.com"));
    }

    #[test]
    fn filters_run_in_order() {
        let cfg = ResolverConfig {
            filters: vec![
                CookieFilter::lifetime(|_, _| 100),
                CookieFilter::lifetime(|secs, _| secs * 2),
            ],
            ..Default::default()
        };
        let p = resolve(cfg, RequestContext::new("example.com", true)).unwrap();
        assert_eq!(p.lifetime_secs, 200);
    }

    #[test]
    fn filter_cannot_sneak_past_validation() {
        let cfg = ResolverConfig {
            filters: vec![
                CookieFilter::samesite(|_, _| SameSite::None),
                CookieFilter::secure(|_, _| false),
            ],
            ..Default::default()
        };
        assert_eq!(
            resolve(cfg, RequestContext::new("example.com", true)),
            Err(ConfigurationError::InsecureSameSiteNone)
        );
    }

    #[test]
    fn every_host_class_yields_a_safe_policy() {
        let hosts = ["localhost", "127.0.0.1", "dev.example.com", "example.com", "app.test"];
        let origins = [None, Some("https://other.org"), Some("http://localhost:3000")];
        for host in hosts {
            for https in [false, true] {
                for origin in origins {
                    let mut ctx = RequestContext::new(host, https);
                    ctx.origin = origin.map(str::to_string);
                    let p = resolve(ResolverConfig::default(), ctx).unwrap();
                    assert!(p.samesite != SameSite::None || p.secure);
                    assert!(p.httponly);
                    assert!(p.lifetime_secs > 0);
                    assert!(!p.name.is_empty());
                }
            }
        }
    }
}
