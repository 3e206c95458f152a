//! Argon2id password hashing. Hashes are PHC strings, so algorithm and cost travel with
//! every stored hash and can be raised without a schema change.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString},
};
use rand::rngs::OsRng;
use thiserror::Error;

use crate::domain::validation::PASSWORD_MIN;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PasswordError {
    #[error("password must be at least {min} characters")]
    TooShort { min: usize },
    #[error("password does not match")]
    Mismatch,
    #[error("stored password hash is malformed: {0}")]
    Malformed(String),
    #[error("invalid argon2 parameters: {0}")]
    Params(String),
    #[error("password worker failed: {0}")]
    Worker(String),
}

/// Cost parameters; production defaults target a few hundred milliseconds per verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashCost {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashCost {
    fn default() -> Self {
        Self {
            memory_kib: 65_536,
            iterations: 3,
            parallelism: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl PasswordHasher {
    pub fn new(cost: HashCost) -> Result<Self, PasswordError> {
        let params = Params::new(cost.memory_kib, cost.iterations, cost.parallelism, None)
            .map_err(|err| PasswordError::Params(err.to_string()))?;
        Ok(Self { params })
    }

    fn argon2(params: Params) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
    }

    pub async fn hash(&self, plaintext: &str) -> Result<String, PasswordError> {
        if plaintext.chars().count() < PASSWORD_MIN {
            return Err(PasswordError::TooShort { min: PASSWORD_MIN });
        }

        let params = self.params.clone();
        let plaintext = plaintext.to_owned();
        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            Self::argon2(params)
                .hash_password(plaintext.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|err| PasswordError::Worker(err.to_string()))
        })
        .await
        .map_err(|err| PasswordError::Worker(err.to_string()))?
    }

    /// Verify against a stored hash. Cost is read from the hash itself.
    pub async fn verify(&self, hash: &str, plaintext: &str) -> Result<(), PasswordError> {
        let params = self.params.clone();
        let hash = hash.to_owned();
        let plaintext = plaintext.to_owned();
        tokio::task::spawn_blocking(move || {
            let parsed =
                PasswordHash::new(&hash).map_err(|err| PasswordError::Malformed(err.to_string()))?;
            Self::argon2(params)
                .verify_password(plaintext.as_bytes(), &parsed)
                .map_err(|_| PasswordError::Mismatch)
        })
        .await
        .map_err(|err| PasswordError::Worker(err.to_string()))?
    }
}
