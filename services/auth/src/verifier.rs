//! Credential verification
//!
//! The session layer never sees passwords: login handlers ask a
//! [`CredentialVerifier`] and only issue a session on a positive answer.

use std::collections::HashMap;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::StaticUser;
use crate::repositories::UserRepository;
use crate::validation::validate_username;

/// Failure to reach a decision about a credential pair
///
/// A wrong password is not an error, it is `Ok(false)`.
#[derive(Error, Debug)]
pub enum VerifierError {
    #[error("User store error: {0}")]
    Store(#[from] anyhow::Error),

    #[error("Malformed password hash: {0}")]
    Hash(String),
}

/// Checks a username/password pair
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify_credentials(&self, username: &str, password: &str)
    -> Result<bool, VerifierError>;
}

/// Hash a password with argon2 and a random salt
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();
    Ok(hash)
}

fn verify_hash(password: &str, hash: &str) -> Result<bool, VerifierError> {
    let parsed = PasswordHash::new(hash).map_err(|e| VerifierError::Hash(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Fixed set of users, loaded from configuration
///
/// Passwords are hashed once at construction and only the hashes are kept.
pub struct StaticUsers {
    users: HashMap<String, String>,
}

impl StaticUsers {
    pub fn new(users: &[StaticUser]) -> anyhow::Result<Self> {
        let mut hashed = HashMap::with_capacity(users.len());
        for user in users {
            validate_username(&user.name)
                .map_err(|e| anyhow::anyhow!("Invalid static user {:?}: {}", user.name, e))?;
            hashed.insert(user.name.clone(), hash_password(&user.password)?);
        }
        info!("Loaded {} static users", hashed.len());
        Ok(Self { users: hashed })
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl CredentialVerifier for StaticUsers {
    async fn verify_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<bool, VerifierError> {
        match self.users.get(username) {
            Some(hash) => verify_hash(password, hash),
            None => {
                debug!("Unknown static user: {}", username);
                Ok(false)
            }
        }
    }
}

/// Users from the PostgreSQL `users` table
pub struct DatabaseUsers {
    repository: UserRepository,
}

impl DatabaseUsers {
    pub fn new(repository: UserRepository) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl CredentialVerifier for DatabaseUsers {
    async fn verify_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<bool, VerifierError> {
        let Some(user) = self.repository.find_by_username(username).await? else {
            debug!("Unknown user: {}", username);
            return Ok(false);
        };
        if !user.enabled {
            debug!("Disabled user: {}", username);
            return Ok(false);
        }
        verify_hash(password, &user.password_hash)
    }
}
