//! Password hashing for admin and agent accounts.

use argon2::{
    Argon2, Params,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use crate::{Error, Result};

/// Hash a password using Argon2id with OWASP recommended parameters.
pub fn hash_password(password: &str) -> Result<String> {
    // m=19456 (19 MiB), t=2, p=1
    let params = Params::new(19456, 2, 1, None)
        .map_err(|e| Error::Other(format!("Invalid Argon2 params: {}", e)))?;
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let salt = SaltString::generate(&mut OsRng);
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| Error::Other(format!("Password hashing failed: {}", e)))?
        .to_string();
    Ok(hash)
}

/// Verify a password against a stored hash. Parameters are read from the hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| Error::Other(format!("Invalid password hash format: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}
