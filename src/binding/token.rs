use sha2::{Digest, Sha256};

/// Hash a session token for use as a store key (SHA-256, lowercase hex).
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Short, non-reversible prefix of a token or hash, safe for logs.
pub(crate) fn log_prefix(value: &str) -> &str {
    let end = value
        .char_indices()
        .nth(8)
        .map_or(value.len(), |(idx, _)| idx);
    &value[..end]
}

/// Equality whose running time depends only on the input lengths.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
