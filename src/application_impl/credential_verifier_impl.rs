use crate::application_port::{AuthError, CredentialVerifier};
use crate::domain_model::OwnerId;
use crate::domain_port::AuthRepo;
use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use std::sync::Arc;

/// PHC-format argon2id hash, as stored in `auth_credential.password_hash`.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AuthError::Internal(e.to_string()))?
        .to_string();
    Ok(hash)
}

fn verify_password(password: &str, password_hash: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(password_hash)
        .map_err(|e| AuthError::Internal(format!("invalid PHC hash: {}", e)))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(_) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthError::Internal(format!("verify error: {}", e))),
    }
}

pub struct Argon2CredentialVerifier {
    auth_repo: Arc<dyn AuthRepo>,
}

impl Argon2CredentialVerifier {
    pub fn new(auth_repo: Arc<dyn AuthRepo>) -> Self {
        Self { auth_repo }
    }
}

#[async_trait::async_trait]
impl CredentialVerifier for Argon2CredentialVerifier {
    async fn authenticate(&self, username: &str, password: &str) -> Result<OwnerId, AuthError> {
        let rec = self
            .auth_repo
            .get_by_username(username)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !rec.is_active {
            return Err(AuthError::InvalidCredentials);
        }

        let password = password.to_owned();
        let password_hash = rec.password_hash.clone();
        // CPU-bound
        let ok = tokio::task::spawn_blocking(move || verify_password(&password, &password_hash))
            .await
            .map_err(|e| AuthError::Internal(e.to_string()))??;
        if !ok {
            return Err(AuthError::InvalidCredentials);
        }
        Ok(rec.owner_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra_memory::MemoryAuthRepo;

    #[tokio::test]
    async fn authenticates_known_user() {
        let repo = Arc::new(MemoryAuthRepo::new());
        repo.add_user(OwnerId(42), "alice", "correct horse").unwrap();
        let verifier = Argon2CredentialVerifier::new(repo);

        assert_eq!(
            verifier.authenticate("alice", "correct horse").await.unwrap(),
            OwnerId(42)
        );
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_user_look_alike() {
        let repo = Arc::new(MemoryAuthRepo::new());
        repo.add_user(OwnerId(42), "alice", "correct horse").unwrap();
        let verifier = Argon2CredentialVerifier::new(repo);

        assert!(matches!(
            verifier.authenticate("alice", "battery staple").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            verifier.authenticate("bob", "correct horse").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn inactive_user_is_refused() {
        let repo = Arc::new(MemoryAuthRepo::new());
        repo.add_user(OwnerId(7), "carol", "pw-pw-pw").unwrap();
        repo.set_active("carol", false);
        let verifier = Argon2CredentialVerifier::new(repo);
        assert!(matches!(
            verifier.authenticate("carol", "pw-pw-pw").await,
            Err(AuthError::InvalidCredentials)
        ));
    }
}
