use crate::application_impl::hash_password;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::Utc;
use dashmap::DashMap;

/// Credential table for the "fake" backend and tests.
#[derive(Default)]
pub struct MemoryAuthRepo {
    users: DashMap<String, AuthCredentialsRecord>,
}

impl MemoryAuthRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, owner_id: OwnerId, username: &str, password: &str) -> Result<(), AuthError> {
        let password_hash = hash_password(password)?;
        self.users.insert(
            username.to_string(),
            AuthCredentialsRecord {
                owner_id,
                username: username.to_string(),
                password_hash,
                is_active: true,
                created_at: Utc::now(),
            },
        );
        Ok(())
    }

    pub fn set_active(&self, username: &str, is_active: bool) {
        if let Some(mut rec) = self.users.get_mut(username) {
            rec.is_active = is_active;
        }
    }
}

#[async_trait::async_trait]
impl AuthRepo for MemoryAuthRepo {
    async fn get_by_username(
        &self,
        username: &str,
    ) -> Result<Option<AuthCredentialsRecord>, AuthError> {
        Ok(self.users.get(username).map(|rec| rec.clone()))
    }
}
