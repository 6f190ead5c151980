//! Password hashing, session tokens and credential validation
//!
//! # Pure Functions
//!
//! This module contains ONLY pure functions. No HTTP framework or database
//! dependencies; the server wraps these with axum middleware and repositories.
//!
//! - Passwords: salted SHA-256, stretched over `PASSWORD_HASH_ROUNDS` rounds
//! - Session tokens: 32 random bytes as hex; only SHA-256 of the token is stored

use rand::RngCore;
use sha2::{Digest, Sha256};

/// Stretching rounds applied to every password hash
pub const PASSWORD_HASH_ROUNDS: u32 = 10_000;

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 128;

/// Credential validation failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    InvalidEmail(String),
    PasswordTooShort,
    PasswordTooLong,
}

impl std::fmt::Display for CredentialError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialError::InvalidEmail(email) => write!(f, "Invalid email address: {}", email),
            CredentialError::PasswordTooShort => {
                write!(f, "Password must be at least {} characters", MIN_PASSWORD_LEN)
            }
            CredentialError::PasswordTooLong => {
                write!(f, "Password must be at most {} characters", MAX_PASSWORD_LEN)
            }
        }
    }
}

impl std::error::Error for CredentialError {}

impl From<CredentialError> for crate::Error {
    fn from(e: CredentialError) -> Self {
        crate::Error::InvalidInput(e.to_string())
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    to_hex(&bytes)
}

/// Generate a fresh password salt (16 random bytes, hex)
pub fn generate_salt() -> String {
    random_hex(16)
}

/// Hash a password with its salt
///
/// Returns 64 hex characters.
///
/// # Examples
///
/// ```
/// use lms_common::auth::{hash_password, verify_password};
///
/// let hash = hash_password("correct horse", "abcd");
/// assert_eq!(hash.len(), 64);
/// assert!(verify_password("correct horse", "abcd", &hash));
/// assert!(!verify_password("wrong horse", "abcd", &hash));
/// ```
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut digest = Sha256::new()
        .chain_update(salt.as_bytes())
        .chain_update(password.as_bytes())
        .finalize();

    for _ in 1..PASSWORD_HASH_ROUNDS {
        digest = Sha256::new()
            .chain_update(digest)
            .chain_update(salt.as_bytes())
            .finalize();
    }

    to_hex(&digest)
}

/// Check a password against a stored hash (constant-time comparison)
pub fn verify_password(password: &str, salt: &str, expected_hash: &str) -> bool {
    constant_time_eq(hash_password(password, salt).as_bytes(), expected_hash.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Generate a new bearer token (returned to the client once, never stored)
pub fn generate_token() -> String {
    random_hex(32)
}

/// Hash a bearer token for storage and lookup
pub fn hash_token(token: &str) -> String {
    to_hex(&Sha256::digest(token.as_bytes()))
}

/// Normalize an email address (trimmed, lower-cased)
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validate an email address shape
///
/// One `@`, a non-empty local part, and a domain of at least two non-empty
/// dot-separated labels.
pub fn validate_email(email: &str) -> Result<(), CredentialError> {
    let invalid = || CredentialError::InvalidEmail(email.to_string());

    let mut parts = email.split('@');
    let (local, domain) = match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => (local, domain),
        _ => return Err(invalid()),
    };

    if local.is_empty() || email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|l| l.is_empty()) {
        return Err(invalid());
    }

    Ok(())
}

/// Validate password length
pub fn validate_password(password: &str) -> Result<(), CredentialError> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LEN {
        return Err(CredentialError::PasswordTooShort);
    }
    if len > MAX_PASSWORD_LEN {
        return Err(CredentialError::PasswordTooLong);
    }
    Ok(())
}
