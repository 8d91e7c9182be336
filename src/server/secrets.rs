use anyhow::{Result, anyhow};
use tracing::warn;

pub const SIGNING_KEY_ENV: &str = "TOKENWARD_SIGNING_KEY";
pub const HASH_KEY_ENV: &str = "TOKENWARD_HASH_KEY";

const DEV_SIGNING_KEY: &str = "tokenward-dev-signing-key";
const DEV_HASH_KEY: &str = "tokenward-dev-hash-key";

#[cfg(debug_assertions)]
const ALLOW_DEV_KEYS: bool = true;
#[cfg(not(debug_assertions))]
const ALLOW_DEV_KEYS: bool = false;

/// Server keys, taken from the environment and never from settings files.
pub struct Secrets {
    pub signing_key: Vec<u8>,
    pub hash_key: Vec<u8>,
}

impl Secrets {
    /// Debug builds fall back to built-in development keys; release builds
    /// refuse to start without both variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok(), ALLOW_DEV_KEYS)
    }

    pub fn from_lookup<F>(lookup: F, allow_dev_keys: bool) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let signing_key = Self::read(&lookup, SIGNING_KEY_ENV, DEV_SIGNING_KEY, allow_dev_keys)?;
        let hash_key = Self::read(&lookup, HASH_KEY_ENV, DEV_HASH_KEY, allow_dev_keys)?;
        if signing_key == hash_key {
            return Err(anyhow!(
                "{} and {} must hold different keys",
                SIGNING_KEY_ENV,
                HASH_KEY_ENV
            ));
        }
        Ok(Self {
            signing_key,
            hash_key,
        })
    }

    fn read<F>(lookup: &F, name: &str, fallback: &str, allow_fallback: bool) -> Result<Vec<u8>>
    where
        F: Fn(&str) -> Option<String>,
    {
        match lookup(name).filter(|v| !v.is_empty()) {
            Some(v) => Ok(v.into_bytes()),
            None if allow_fallback => {
                warn!(env = name, "secret not set, using the development key");
                Ok(fallback.as_bytes().to_vec())
            }
            None => Err(anyhow!("{} must be set", name)),
        }
    }
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secrets(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_distinct_dev_keys_when_allowed() {
        let s = Secrets::from_lookup(|_| None, true).unwrap();
        assert_ne!(s.signing_key, s.hash_key);
    }

    #[test]
    fn missing_keys_are_refused_without_dev_fallback() {
        let err = Secrets::from_lookup(|_| None, false).unwrap_err();
        assert!(err.to_string().contains(SIGNING_KEY_ENV));

        let err = Secrets::from_lookup(
            |name| (name == SIGNING_KEY_ENV).then(|| "signing".to_string()),
            false,
        )
        .unwrap_err();
        assert!(err.to_string().contains(HASH_KEY_ENV));
    }

    #[test]
    fn explicit_keys_are_used_as_given() {
        let s = Secrets::from_lookup(
            |name| match name {
                SIGNING_KEY_ENV => Some("s3cret-sign".to_string()),
                HASH_KEY_ENV => Some("s3cret-hash".to_string()),
                _ => None,
            },
            false,
        )
        .unwrap();
        assert_eq!(s.signing_key, b"s3cret-sign");
        assert_eq!(s.hash_key, b"s3cret-hash");
    }

    #[test]
    fn identical_keys_are_refused() {
        let err = Secrets::from_lookup(|_| Some("same".to_string()), false).unwrap_err();
        assert!(err.to_string().contains("different"));
    }

    #[test]
    fn empty_value_counts_as_unset() {
        let s = Secrets::from_lookup(|name| (name == SIGNING_KEY_ENV).then(String::new), true)
            .unwrap();
        assert_eq!(s.signing_key, DEV_SIGNING_KEY.as_bytes());

        let err = Secrets::from_lookup(|_| Some(String::new()), false).unwrap_err();
        assert!(err.to_string().contains("must be set"));
    }
}
