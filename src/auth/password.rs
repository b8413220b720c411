use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("password hashing task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// bcrypt is CPU bound, so it runs on the blocking pool.
pub async fn hash_password(plain: String, cost: u32) -> Result<String, PasswordError> {
    let hashed = tokio::task::spawn_blocking(move || bcrypt::hash(plain, cost)).await??;
    Ok(hashed)
}

pub async fn verify_password(plain: String, hashed: String) -> Result<bool, PasswordError> {
    let ok = tokio::task::spawn_blocking(move || bcrypt::verify(plain, &hashed)).await??;
    Ok(ok)
}

/// bcrypt hash of a throwaway secret at the configured cost. Logins for
/// unknown or inactive accounts verify against it so every failed login
/// costs the same bcrypt work.
#[derive(Debug, Default)]
pub struct DecoyHash {
    hash: tokio::sync::OnceCell<String>,
}

impl DecoyHash {
    pub async fn verify(&self, plain: String, cost: u32) -> Result<(), PasswordError> {
        let hash = self
            .hash
            .get_or_try_init(|| hash_password("shopfront-decoy".to_string(), cost))
            .await?;
        verify_password(plain, hash.clone()).await?;
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.hash.initialized()
    }
}

/// Returns a message describing why the password is too weak, if it is.
pub fn strength_problem(password: &str) -> Option<&'static str> {
    let long_enough = password.chars().count() >= 8;
    let lower = password.chars().any(|c| c.is_lowercase());
    let upper = password.chars().any(|c| c.is_uppercase());
    let digit = password.chars().any(|c| c.is_ascii_digit());
    let symbol = password.chars().any(|c| !c.is_alphanumeric() && !c.is_whitespace());

    if long_enough && lower && upper && digit && symbol {
        None
    } else {
        Some("Password must contain a small letter, a capital letter, a digit, a symbol and at least 8 characters")
    }
}

pub struct ResetToken {
    /// Sent to the user, never stored.
    pub plain: String,
    /// Stored on the user document.
    pub digest: String,
}

pub fn generate_reset_token() -> ResetToken {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let plain = hex::encode(bytes);
    let digest = digest_reset_token(&plain);
    ResetToken { plain, digest }
}

pub fn digest_reset_token(plain: &str) -> String {
    hex::encode(Sha256::digest(plain.as_bytes()))
}
