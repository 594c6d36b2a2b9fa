use argon2::{Algorithm, Argon2, Params, PasswordVerifier, Version};
use async_trait::async_trait;
use password_hash::{PasswordHash, SaltString};

use super::provider::PasswordHasher;
use crate::error::{AuthError, AuthResult};

/// Argon2id PHC-string hasher. Hashing runs on the blocking pool.
#[derive(Debug, Clone, Default)]
pub struct Argon2Hasher {
    params: Option<Params>,
}

impl Argon2Hasher {
    pub fn new() -> Self { Self::default() }

    /// Custom cost parameters (memory KiB, iterations, lanes).
    pub fn with_cost(m_cost: u32, t_cost: u32, p_cost: u32) -> AuthResult<Self> {
        let params = Params::new(m_cost, t_cost, p_cost, None).map_err(|e| AuthError::internal(e.to_string()))?;
        Ok(Self { params: Some(params) })
    }

    fn argon2(&self) -> Argon2<'static> {
        match &self.params {
            Some(p) => Argon2::new(Algorithm::Argon2id, Version::V0x13, p.clone()),
            None => Argon2::default(),
        }
    }

    pub fn hash_blocking(&self, password: &str) -> AuthResult<String> {
        use argon2::PasswordHasher as _;
        let mut salt_bytes = [0u8; 16];
        getrandom::getrandom(&mut salt_bytes).map_err(|e| AuthError::internal(e.to_string()))?;
        let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| AuthError::internal(e.to_string()))?;
        let phc = self
            .argon2()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AuthError::internal(e.to_string()))?
            .to_string();
        Ok(phc)
    }

    /// Params are read from the PHC string, so hashes made with other costs still verify.
    pub fn verify_blocking(&self, hash: &str, password: &str) -> bool {
        if let Ok(parsed) = PasswordHash::new(hash) {
            self.argon2().verify_password(password.as_bytes(), &parsed).is_ok()
        } else { false }
    }
}

#[async_trait]
impl PasswordHasher for Argon2Hasher {
    async fn hash(&self, password: &str) -> AuthResult<String> {
        let me = self.clone();
        let password = password.to_string();
        tokio::task::spawn_blocking(move || me.hash_blocking(&password))
            .await
            .map_err(|e| AuthError::internal(e.to_string()))?
    }

    async fn compare(&self, hash: &str, password: &str) -> bool {
        let me = self.clone();
        let (hash, password) = (hash.to_string(), password.to_string());
        tokio::task::spawn_blocking(move || me.verify_blocking(&hash, &password))
            .await
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> Argon2Hasher { Argon2Hasher::with_cost(8 * 1024, 1, 1).unwrap() }

    #[tokio::test]
    async fn hash_then_compare() {
        let h = cheap();
        let phc = h.hash("s3cr3t!").await.unwrap();
        assert!(phc.starts_with("$argon2id$"));
        assert!(h.compare(&phc, "s3cr3t!").await);
        assert!(!h.compare(&phc, "wrong").await);
    }

    #[tokio::test]
    async fn salts_differ() {
        let h = cheap();
        let a = h.hash("same").await.unwrap();
        let b = h.hash("same").await.unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn garbage_hash_never_matches() {
        assert!(!cheap().verify_blocking("not-a-phc-string", "anything"));
        assert!(!cheap().verify_blocking("", ""));
    }

    #[test]
    fn rejects_invalid_cost() {
        assert!(Argon2Hasher::with_cost(0, 0, 0).is_err());
    }
}
