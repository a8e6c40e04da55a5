//! Credential hashing and verification
//!
//! Argon2id with explicit parameters. Account creation uses the stronger
//! profile; token-adjacent hashing uses the interactive one. Verification
//! distinguishes a wrong password from a corrupt digest: the former is
//! `Ok(false)`, the latter an error.

use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::SaltString,
};
use thiserror::Error;

/// Errors surfaced by hashing and verification
#[derive(Error, Debug)]
pub enum VerificationError {
    /// The stored digest could not be parsed or compared
    #[error("Invalid password digest: {0}")]
    InvalidDigest(String),

    /// Hashing itself failed
    #[error("Password hashing failed: {0}")]
    Hashing(String),
}

/// Cost profile for hashing
#[derive(Debug, Clone, Copy)]
pub enum HashProfile {
    /// Account creation and password changes: 64 MiB, 3 passes, 2 lanes
    Strong,
    /// Lower-stakes hashing on the hot path: 19 MiB, 2 passes, 1 lane
    Interactive,
}

impl HashProfile {
    fn hasher(self) -> Argon2<'static> {
        let (memory_kib, time_cost, parallelism) = match self {
            HashProfile::Strong => (64 * 1024, 3, 2),
            HashProfile::Interactive => (19 * 1024, 2, 1),
        };
        let params = Params::new(memory_kib, time_cost, parallelism, None)
            .expect("static argon2 parameters are valid");
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
    }
}

/// Hash a plaintext password under the given cost profile
pub fn hash(plaintext: &str, profile: HashProfile) -> Result<String, VerificationError> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    profile
        .hasher()
        .hash_password(plaintext.as_bytes(), &salt)
        .map(|digest| digest.to_string())
        .map_err(|e| VerificationError::Hashing(e.to_string()))
}

/// Verify a plaintext password against a stored digest.
///
/// The cost parameters are read back from the digest itself, so any profile
/// verifies with the same code path. A mismatch is `Ok(false)`; a digest
/// that cannot be parsed or compared is an error, never a silent `false`.
pub fn verify(digest: &str, plaintext: &str) -> Result<bool, VerificationError> {
    let parsed =
        PasswordHash::new(digest).map_err(|e| VerificationError::InvalidDigest(e.to_string()))?;

    match Argon2::default().verify_password(plaintext.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(VerificationError::InvalidDigest(e.to_string())),
    }
}
