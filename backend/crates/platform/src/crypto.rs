//! Cryptographic Utilities

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Compute SHA-256 hash
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Lower-case hex of the SHA-256 digest
///
/// This is the at-rest form of refresh tokens.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Opaque single-use token (random UUIDv4 string)
///
/// Used for refresh tokens and for the verify/reset capabilities.
pub fn opaque_token() -> String {
    Uuid::new_v4().to_string()
}
