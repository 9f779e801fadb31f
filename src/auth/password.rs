use anyhow::anyhow;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use lazy_static::lazy_static;

/// Argon2id PHC string for `plain` with a fresh random salt.
pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow!("argon2 hash: {}", e))
}

/// `Ok(false)` on mismatch; `Err` only when `hash` is not a PHC string.
pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| anyhow!("stored password hash: {}", e))?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

/// Check a login attempt against an account that may not exist or may have
/// no local password. Those cases still run one Argon2 verification against
/// a throwaway hash, so response time does not reveal registered emails.
pub fn verify_login(plain: &str, stored: Option<&str>) -> anyhow::Result<bool> {
    lazy_static! {
        static ref DECOY: Option<String> = hash_password("petcare-decoy-password").ok();
    }
    match stored {
        Some(hash) => verify_password(plain, hash),
        None => {
            if let Some(decoy) = DECOY.as_deref() {
                verify_password(plain, decoy)?;
            }
            Ok(false)
        }
    }
}
