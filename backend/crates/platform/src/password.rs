//! Password Hashing and Verification
//!
//! One-way credential hashing with bcrypt:
//! - Input is pre-hashed with SHA-256 so every password, however long,
//!   reaches bcrypt as the same fixed-size digest (bcrypt silently truncates
//!   after 72 bytes, which would make long passphrases collide)
//! - Zeroization of clear text input
//! - Verification never errors: any mismatch or malformed hash is `false`

use std::fmt;

use thiserror::Error;
use unicode_normalization::UnicodeNormalization;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::sha256;

// ============================================================================
// Constants
// ============================================================================

/// Maximum password length in characters
pub const MAX_PASSWORD_LENGTH: usize = 256;

// ============================================================================
// Error Types
// ============================================================================

/// Password policy violation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PasswordPolicyError {
    /// Password is too long
    #[error("Password must be at most {max} characters (got {actual})")]
    TooLong { max: usize, actual: usize },

    /// Password contains only whitespace
    #[error("Password cannot be empty or contain only whitespace")]
    EmptyOrWhitespace,

    /// Password contains invalid characters (control characters)
    #[error("Password contains invalid control characters")]
    InvalidCharacter,
}

/// Password hashing errors
#[derive(Debug, Error)]
pub enum PasswordHashError {
    /// Hashing operation failed
    #[error("Password hashing failed: {0}")]
    HashingFailed(String),
}

// ============================================================================
// Clear Text Password (Zeroized on drop)
// ============================================================================

/// Clear text password with automatic memory zeroization
///
/// ## Security
/// - Implements `Zeroize` and `ZeroizeOnDrop`
/// - Does not implement `Clone` to prevent accidental copies
/// - Debug output is redacted
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ClearTextPassword(String);

impl ClearTextPassword {
    /// Create a new clear text password with validation
    ///
    /// Unicode is normalized using NFKC before validation so that visually
    /// identical input hashes identically.
    pub fn new(raw: String) -> Result<Self, PasswordPolicyError> {
        let normalized: String = raw.nfkc().collect();

        if normalized.trim().is_empty() {
            return Err(PasswordPolicyError::EmptyOrWhitespace);
        }

        let char_count = normalized.chars().count();
        if char_count > MAX_PASSWORD_LENGTH {
            return Err(PasswordPolicyError::TooLong {
                max: MAX_PASSWORD_LENGTH,
                actual: char_count,
            });
        }

        // Space, tab and newline are allowed
        if normalized
            .chars()
            .any(|ch| ch.is_control() && ch != '\t' && ch != '\n')
        {
            return Err(PasswordPolicyError::InvalidCharacter);
        }

        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ClearTextPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ClearTextPassword")
            .field(&"[REDACTED]")
            .finish()
    }
}

// ============================================================================
// Credential Hasher
// ============================================================================

/// SHA-256 + bcrypt credential hasher
///
/// ## Examples
/// ```rust
/// use platform::password::CredentialHasher;
///
/// let hasher = CredentialHasher::with_cost(4);
/// let stored = hasher.hash("correct horse battery staple").unwrap();
/// assert!(hasher.verify("correct horse battery staple", &stored));
/// assert!(!hasher.verify("Tr0ub4dor&3", &stored));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct CredentialHasher {
    cost: u32,
}

impl Default for CredentialHasher {
    fn default() -> Self {
        Self {
            cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl CredentialHasher {
    /// Hasher with an explicit bcrypt cost (clamped to bcrypt's valid range)
    pub fn with_cost(cost: u32) -> Self {
        Self {
            cost: cost.clamp(4, 31),
        }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// Hash a password for storage
    ///
    /// Returns the bcrypt modular-crypt string (`$2b$<cost>$...`).
    pub fn hash(&self, plain: &str) -> Result<String, PasswordHashError> {
        let digest = prehash(plain);
        bcrypt::hash(digest.as_bytes(), self.cost)
            .map_err(|e| PasswordHashError::HashingFailed(e.to_string()))
    }

    /// Check `plain` against a stored hash
    ///
    /// bcrypt compares in constant time relative to the stored cost.
    pub fn verify(&self, plain: &str, stored: &str) -> bool {
        let digest = prehash(plain);
        bcrypt::verify(digest.as_bytes(), stored).unwrap_or(false)
    }
}

/// SHA-256 of the input, hex encoded: 64 ASCII bytes, below bcrypt's limit
fn prehash(plain: &str) -> zeroize::Zeroizing<String> {
    zeroize::Zeroizing::new(hex::encode(sha256(plain.as_bytes())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    fn hasher() -> CredentialHasher {
        CredentialHasher::with_cost(4)
    }

    #[test]
    fn test_hash_and_verify() {
        let h = hasher();
        let stored = h.hash("pw12345678").unwrap();
        assert!(stored.starts_with("$2"));
        assert!(h.verify("pw12345678", &stored));
        assert!(!h.verify("pw12345679", &stored));
    }

    #[test]
    fn test_long_passwords_do_not_collide() {
        let h = hasher();
        let base = "x".repeat(100);
        let other = format!("{}y", base);
        let stored = h.hash(&base).unwrap();
        assert!(h.verify(&base, &stored));
        assert!(!h.verify(&other, &stored));
    }

    #[test]
    fn test_verify_malformed_hash_is_false() {
        let h = hasher();
        assert!(!h.verify("anything", ""));
        assert!(!h.verify("anything", "not-a-bcrypt-hash"));
        assert!(!h.verify("anything", "$2b$04$tooshort"));
    }

    #[test]
    fn test_salted_hashes_differ() {
        let h = hasher();
        let a = h.hash("same").unwrap();
        let b = h.hash("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_cost_is_clamped() {
        assert_eq!(CredentialHasher::with_cost(1).cost(), 4);
        assert_eq!(CredentialHasher::default().cost(), bcrypt::DEFAULT_COST);
    }

    #[quickcheck]
    fn prop_verify_accepts_own_hash(p: String) -> bool {
        let h = hasher();
        let stored = h.hash(&p).unwrap();
        h.verify(&p, &stored)
    }

    #[quickcheck]
    fn prop_verify_rejects_other_password(p: String, q: String) -> bool {
        if p == q {
            return true;
        }
        let h = hasher();
        let stored = h.hash(&p).unwrap();
        !h.verify(&q, &stored)
    }

    #[test]
    fn test_clear_text_policy() {
        assert!(ClearTextPassword::new("newpw".to_string()).is_ok());
        assert_eq!(
            ClearTextPassword::new("   ".to_string()).unwrap_err(),
            PasswordPolicyError::EmptyOrWhitespace
        );
        assert_eq!(
            ClearTextPassword::new("abc\u{0007}".to_string()).unwrap_err(),
            PasswordPolicyError::InvalidCharacter
        );
        assert!(matches!(
            ClearTextPassword::new("a".repeat(MAX_PASSWORD_LENGTH + 1)).unwrap_err(),
            PasswordPolicyError::TooLong { .. }
        ));
    }

    #[test]
    fn test_clear_text_debug_is_redacted() {
        let pw = ClearTextPassword::new("secret-value".to_string()).unwrap();
        assert!(!format!("{:?}", pw).contains("secret-value"));
    }
}
