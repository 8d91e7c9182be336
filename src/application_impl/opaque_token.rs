use crate::application_port::AuthError;
use crate::domain_model::{RawRefreshToken, TOKEN_HASH_LEN, TokenHash};
use hmac::{Hmac, KeyInit, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;

pub const DEFAULT_REFRESH_TOKEN_BYTES: usize = 32;

/// Hex-encoded random tokens straight from the OS CSPRNG.
#[derive(Debug, Clone)]
pub struct OpaqueTokenGenerator {
    byte_len: usize,
}

impl OpaqueTokenGenerator {
    pub fn new(byte_len: usize) -> Self {
        Self {
            byte_len: byte_len.max(16),
        }
    }

    pub fn generate(&self) -> Result<RawRefreshToken, AuthError> {
        let mut buf = vec![0u8; self.byte_len];
        OsRng
            .try_fill_bytes(&mut buf)
            .map_err(|e| AuthError::Internal(format!("os rng unavailable: {}", e)))?;
        Ok(RawRefreshToken(hex::encode(buf)))
    }
}

impl Default for OpaqueTokenGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_REFRESH_TOKEN_BYTES)
    }
}

/// HMAC-SHA256 keyed by a server secret; the table alone cannot be reversed or forged.
#[derive(Clone)]
pub struct HmacTokenHasher {
    key: Vec<u8>,
}

impl HmacTokenHasher {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }

    pub fn hash(&self, raw: &str) -> Result<TokenHash, AuthError> {
        let mut mac = Hmac::<Sha256>::new_from_slice(&self.key)
            .map_err(|e| AuthError::Internal(e.to_string()))?;
        mac.update(raw.as_bytes());
        let out = mac.finalize().into_bytes();
        let mut bytes = [0u8; TOKEN_HASH_LEN];
        bytes.copy_from_slice(&out);
        Ok(TokenHash(bytes))
    }

    pub fn hash_hex(&self, raw: &str) -> Result<String, AuthError> {
        Ok(self.hash(raw)?.to_hex())
    }
}

impl std::fmt::Debug for HmacTokenHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("HmacTokenHasher")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generates_hex_of_requested_length() {
        let token = OpaqueTokenGenerator::new(32).generate().unwrap();
        assert_eq!(token.as_str().len(), 64);
        assert!(token.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn tiny_lengths_are_raised_to_minimum() {
        let token = OpaqueTokenGenerator::new(1).generate().unwrap();
        assert_eq!(token.as_str().len(), 32);
    }

    #[test]
    fn tokens_do_not_repeat() {
        let generator = OpaqueTokenGenerator::default();
        let seen: HashSet<String> = (0..256)
            .map(|_| generator.generate().unwrap().0)
            .collect();
        assert_eq!(seen.len(), 256);
    }

    #[test]
    fn hash_is_keyed_and_stable() {
        let a = HmacTokenHasher::new(b"key-a".to_vec());
        let b = HmacTokenHasher::new(b"key-b".to_vec());
        assert_eq!(a.hash("token").unwrap(), a.hash("token").unwrap());
        assert_ne!(a.hash("token").unwrap(), b.hash("token").unwrap());
        assert_ne!(a.hash("token").unwrap(), a.hash("token2").unwrap());
    }

    #[test]
    fn matches_reference_hmac() {
        // RFC 4231 test case 2
        let hasher = HmacTokenHasher::new(b"Jefe".to_vec());
        assert_eq!(
            hasher.hash_hex("what do ya want for nothing?").unwrap(),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn digest_never_equals_raw_value() {
        let hasher = HmacTokenHasher::new(b"k".to_vec());
        let raw = OpaqueTokenGenerator::default().generate().unwrap();
        assert_ne!(hasher.hash_hex(raw.as_str()).unwrap(), raw.0);
    }
}
