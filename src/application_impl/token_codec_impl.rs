use crate::application_port::{AccessClaims, AccessToken, TokenCodec, TokenError};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};

#[derive(Clone)]
pub struct JwtConfig {
    pub issuer: String,
    pub signing_key: Vec<u8>,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

/// Compact HS256 tokens: `base64url(header).base64url(claims).base64url(hmac)`.
pub struct JwtHs256Codec {
    issuer: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtHs256Codec {
    pub fn new(cfg: JwtConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // expiry is checked against the caller's clock in `decode`
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_issuer(&[cfg.issuer.clone()]);
        JwtHs256Codec {
            issuer: cfg.issuer,
            encoding_key: EncodingKey::from_secret(&cfg.signing_key),
            decoding_key: DecodingKey::from_secret(&cfg.signing_key),
            validation,
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// `Format` when the header is readable JSON but does not declare HS256.
    /// Unreadable headers are left for `decode` to call malformed.
    fn check_declared_alg(token: &str) -> Result<(), TokenError> {
        let Some(header) = token.split('.').next() else {
            return Ok(());
        };
        let Ok(bytes) = URL_SAFE_NO_PAD.decode(header.trim_end_matches('=')) else {
            return Ok(());
        };
        let Ok(serde_json::Value::Object(header)) = serde_json::from_slice::<serde_json::Value>(&bytes) else {
            return Ok(());
        };
        match header.get("alg").and_then(|alg| alg.as_str()) {
            Some("HS256") => Ok(()),
            _ => Err(TokenError::Format),
        }
    }

    fn map_error(e: jsonwebtoken::errors::Error) -> TokenError {
        match e.kind() {
            ErrorKind::InvalidSignature => TokenError::Signature,
            ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::MissingAlgorithm => TokenError::Format,
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidIssuer
            | ErrorKind::InvalidAudience
            | ErrorKind::InvalidSubject
            | ErrorKind::ImmatureSignature
            | ErrorKind::MissingRequiredClaim(_) => TokenError::Claims,
            _ => TokenError::Malformed,
        }
    }
}

impl TokenCodec for JwtHs256Codec {
    fn encode(&self, claims: &AccessClaims) -> Result<AccessToken, TokenError> {
        let token = encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| TokenError::Encoding(e.to_string()))?;
        Ok(AccessToken(token))
    }

    fn decode(&self, token: &str, now: DateTime<Utc>) -> Result<AccessClaims, TokenError> {
        if token.split('.').count() != 3 {
            return Err(TokenError::Malformed);
        }
        Self::check_declared_alg(token)?;
        let data = decode::<AccessClaims>(token, &self.decoding_key, &self.validation)
            .map_err(Self::map_error)?;
        if data.claims.exp <= now.timestamp() {
            return Err(TokenError::Expired);
        }
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application_port::ExtraClaims;
    use chrono::Duration;

    fn codec() -> JwtHs256Codec {
        JwtHs256Codec::new(JwtConfig {
            issuer: "tokenward.test".to_string(),
            signing_key: b"unit-test-signing-key".to_vec(),
        })
    }

    fn claims(now: DateTime<Utc>, ttl: Duration) -> AccessClaims {
        let mut extra = ExtraClaims::new();
        extra.insert("roles".to_string(), serde_json::json!(["admin", "editor"]));
        AccessClaims {
            iss: "tokenward.test".to_string(),
            sub: "42".to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
            extra,
        }
    }

    #[test]
    fn round_trips_claims() {
        let now = Utc::now();
        let c = claims(now, Duration::minutes(15));
        let token = codec().encode(&c).unwrap();
        assert_eq!(token.0.split('.').count(), 3);
        assert_eq!(codec().decode(&token.0, now).unwrap(), c);
    }

    #[test]
    fn valid_until_the_second_before_expiry() {
        let now = Utc::now();
        let c = claims(now, Duration::seconds(10));
        let token = codec().encode(&c).unwrap();
        assert!(codec().decode(&token.0, now + Duration::seconds(9)).is_ok());
        assert_eq!(
            codec().decode(&token.0, now + Duration::seconds(10)),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn rejects_already_expired_token() {
        let now = Utc::now();
        let c = claims(now, Duration::seconds(-1));
        let token = codec().encode(&c).unwrap();
        assert_eq!(codec().decode(&token.0, now), Err(TokenError::Expired));
    }

    #[test]
    fn any_flipped_signature_byte_is_a_signature_error() {
        let now = Utc::now();
        let token = codec().encode(&claims(now, Duration::minutes(5))).unwrap().0;
        let sig_start = token.rfind('.').unwrap() + 1;
        for i in sig_start..token.len() {
            let mut bytes = token.clone().into_bytes();
            bytes[i] = if bytes[i] == b'A' { b'B' } else { b'A' };
            let tampered = String::from_utf8(bytes).unwrap();
            assert_eq!(
                codec().decode(&tampered, now),
                Err(TokenError::Signature),
                "byte {} not detected",
                i
            );
        }
    }

    #[test]
    fn tampered_payload_fails_signature() {
        let now = Utc::now();
        let token = codec().encode(&claims(now, Duration::minutes(5))).unwrap().0;
        let mut forged = claims(now, Duration::minutes(5));
        forged.sub = "1".to_string();
        let forged_payload = codec().encode(&forged).unwrap().0;
        let parts: Vec<&str> = token.split('.').collect();
        let forged_parts: Vec<&str> = forged_payload.split('.').collect();
        let spliced = format!("{}.{}.{}", parts[0], forged_parts[1], parts[2]);
        assert_eq!(codec().decode(&spliced, now), Err(TokenError::Signature));
    }

    #[test]
    fn wrong_segment_count_is_malformed() {
        let now = Utc::now();
        assert_eq!(codec().decode("abc.def", now), Err(TokenError::Malformed));
        assert_eq!(codec().decode("a.b.c.d", now), Err(TokenError::Malformed));
        assert_eq!(codec().decode("", now), Err(TokenError::Malformed));
        assert_eq!(codec().decode("!!.??.**", now), Err(TokenError::Malformed));
    }

    #[test]
    fn other_algorithm_is_a_format_error() {
        let now = Utc::now();
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims(now, Duration::minutes(5)),
            &EncodingKey::from_secret(b"unit-test-signing-key"),
        )
        .unwrap();
        assert_eq!(codec().decode(&token, now), Err(TokenError::Format));
    }

    fn with_header(header: &str, token: &str) -> String {
        let rest = token.split_once('.').unwrap().1;
        format!("{}.{}", URL_SAFE_NO_PAD.encode(header), rest)
    }

    #[test]
    fn unsigned_or_unknown_algorithm_is_a_format_error() {
        let now = Utc::now();
        let token = codec().encode(&claims(now, Duration::minutes(5))).unwrap().0;
        let payload = token.split('.').nth(1).unwrap();

        let unsigned = format!(
            "{}.{}.",
            URL_SAFE_NO_PAD.encode(r#"{"typ":"JWT","alg":"none"}"#),
            payload
        );
        assert_eq!(codec().decode(&unsigned, now), Err(TokenError::Format));

        for header in [
            r#"{"typ":"JWT","alg":"none"}"#,
            r#"{"typ":"JWT","alg":"XS999"}"#,
            r#"{"typ":"JWT","alg":"hs256"}"#,
            r#"{"typ":"JWT"}"#,
        ] {
            assert_eq!(
                codec().decode(&with_header(header, &token), now),
                Err(TokenError::Format),
                "header {}",
                header
            );
        }
    }

    #[test]
    fn unreadable_header_is_malformed() {
        let now = Utc::now();
        let token = codec().encode(&claims(now, Duration::minutes(5))).unwrap().0;
        assert_eq!(
            codec().decode(&with_header("not json", &token), now),
            Err(TokenError::Malformed)
        );
    }

    #[test]
    fn foreign_key_is_rejected() {
        let now = Utc::now();
        let other = JwtHs256Codec::new(JwtConfig {
            issuer: "tokenward.test".to_string(),
            signing_key: b"some-other-key".to_vec(),
        });
        let token = other.encode(&claims(now, Duration::minutes(5))).unwrap();
        assert_eq!(codec().decode(&token.0, now), Err(TokenError::Signature));
    }

    #[test]
    fn foreign_issuer_is_rejected() {
        let now = Utc::now();
        let mut c = claims(now, Duration::minutes(5));
        c.iss = "someone.else".to_string();
        let token = codec().encode(&c).unwrap();
        assert_eq!(codec().decode(&token.0, now), Err(TokenError::Claims));
    }
}
