//! Human credential checks

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use uuid::Uuid;

use super::AppUser;
use crate::config::UserEntry;
use crate::error::LoginError;

/// Verifies an application user's username and password
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// `Ok(None)` when the credentials do not match
    async fn verify(&self, username: &str, password: &str) -> Result<Option<AppUser>, LoginError>;
}

/// Lowercase hex SHA-256 of a password
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// Namespace for user ids derived from usernames
const USER_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a4e_93d0_4b7a_8c55_1e0f_5a11_0001);

/// Stable id for a configured user, identical across restarts
pub fn user_id_for(username: &str) -> Uuid {
    Uuid::new_v5(&USER_NAMESPACE, username.trim().as_bytes())
}

/// Users and password digests fixed at startup (from `APP_USERS`)
pub struct StaticCredentialVerifier {
    users: HashMap<String, (Uuid, String)>,
}

impl StaticCredentialVerifier {
    pub fn new(entries: &[UserEntry]) -> Self {
        let users = entries
            .iter()
            .map(|entry| {
                (
                    entry.username.clone(),
                    (user_id_for(&entry.username), entry.password_sha256.to_lowercase()),
                )
            })
            .collect();
        Self { users }
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl CredentialVerifier for StaticCredentialVerifier {
    async fn verify(&self, username: &str, password: &str) -> Result<Option<AppUser>, LoginError> {
        let Some((user_id, digest)) = self.users.get(username.trim()) else {
            return Ok(None);
        };
        if hash_password(password) != *digest {
            return Ok(None);
        }
        Ok(Some(AppUser {
            user_id: *user_id,
            username: username.trim().to_string(),
        }))
    }
}
