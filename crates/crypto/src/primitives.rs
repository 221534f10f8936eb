use rand::RngCore;
use sha2::{Digest, Sha256};

/// Compare two byte slices without branching on the position of the first
/// mismatched byte. Length mismatch returns false immediately; lengths are
/// not secret for the token formats compared here.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }

    result == 0
}

/// Constant-time comparison for token strings.
pub fn constant_time_eq_str(a: &str, b: &str) -> bool {
    constant_time_eq(a.as_bytes(), b.as_bytes())
}

/// Generate `byte_len` cryptographically secure random bytes, hex encoded.
pub fn random_token_hex(byte_len: usize) -> String {
    let mut bytes = vec![0u8; byte_len];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// SHA-256 digest as lowercase hex (for storing token identifiers, never
/// for password-style secrets).
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
