use anyhow::{Result, anyhow};
use config::{Config, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub auth: Auth,
    #[serde(default)]
    pub cookie: Cookie,
    pub store: Store,
    pub cache: Cache,
    pub credentials: Credentials,
    pub http: Http,
    pub log: Log,
}

#[derive(Debug, Deserialize)]
pub struct Auth {
    pub issuer: String,
    #[serde(default = "default_access_ttl_secs")]
    pub access_ttl_secs: i64,
    #[serde(default = "default_refresh_ttl_secs")]
    pub refresh_ttl_secs: i64,
    #[serde(default = "default_true")]
    pub rotate_refresh_tokens: bool,
    #[serde(default = "default_refresh_token_bytes")]
    pub refresh_token_bytes: usize,
    #[serde(default = "default_cleanup_grace_secs")]
    pub cleanup_grace_secs: i64,
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
}

/// Every field except the resolver switches is an explicit override:
/// absent means "let the environment decide".
#[derive(Debug, Default, Deserialize)]
pub struct Cookie {
    pub enabled: Option<bool>,
    pub name: Option<String>,
    pub samesite: Option<String>,
    pub secure: Option<bool>,
    pub httponly: Option<bool>,
    pub path: Option<String>,
    pub domain: Option<String>,
    pub lifetime_secs: Option<i64>,
    pub auth_path: Option<String>,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub allow_insecure_httponly: bool,
}

#[derive(Debug, Deserialize)]
pub struct Store {
    pub backend: String, // "memory" or "mysql"
    pub mysql_dsn: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_read_retries")]
    pub read_retries: u32,
}

#[derive(Debug, Deserialize)]
pub struct Cache {
    pub backend: String, // "memory" or "redis"
    pub redis_dsn: Option<String>,
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub backend: String, // "fake" or "real"
    pub mysql_dsn: Option<String>,
    #[serde(default)]
    pub users: Vec<SeedUser>,
}

#[derive(Deserialize)]
pub struct SeedUser {
    pub owner_id: i64,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for SeedUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedUser")
            .field("owner_id", &self.owner_id)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
pub struct Http {
    pub address: String,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Log {
    pub filter: String,
}

fn default_access_ttl_secs() -> i64 {
    15 * 60
}

fn default_refresh_ttl_secs() -> i64 {
    7 * 24 * 3600
}

fn default_true() -> bool {
    true
}

fn default_refresh_token_bytes() -> usize {
    32
}

fn default_cleanup_grace_secs() -> i64 {
    24 * 3600
}

fn default_cleanup_interval_secs() -> u64 {
    3600
}

fn default_timeout_ms() -> u64 {
    2000
}

fn default_read_retries() -> u32 {
    1
}

fn default_cache_ttl_secs() -> u64 {
    300
}

#[cfg(debug_assertions)]
const SETTINGS_PATH: &str = "settings/dev.toml";
#[cfg(not(debug_assertions))]
const SETTINGS_PATH: &str = "settings/release.toml";

pub fn parse_settings(path: Option<&str>) -> Result<Settings> {
    let path = path.unwrap_or(SETTINGS_PATH);

    let settings: Settings = Config::builder()
        .add_source(File::with_name(path))
        .build()
        .map_err(|e| anyhow!(e))?
        .try_deserialize()
        .map_err(|e| anyhow!(e))?;

    Ok(settings)
}
