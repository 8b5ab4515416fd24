//! BLAKE3 fingerprints for cache keys and identity fallbacks.

use blake3::Hasher;

/// Computes a hex fingerprint over an ordered list of request parts.
///
/// Parts are length-delimited before hashing so that `["ab", "c"]` and
/// `["a", "bc"]` produce distinct fingerprints.
pub fn fingerprint(parts: &[&str]) -> String {
    let mut hasher = Hasher::new();
    for part in parts {
        hasher.update(&(part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

/// Computes a 64-bit hash of the input, truncated from the 256-bit BLAKE3 output.
///
/// 64 bits is plenty for cache indexing and dedup hints; collisions degrade to
/// a cache miss, never to corruption. Use [`fingerprint`] where full-width
/// uniqueness matters.
#[inline]
pub fn hash_to_u64(data: &[u8]) -> u64 {
    let hash = blake3::hash(data);
    let bytes: [u8; 8] = hash.as_bytes()[0..8]
        .try_into()
        .expect("BLAKE3 always produces at least 8 bytes");
    u64::from_le_bytes(bytes)
}

/// Hashes an API key or bearer token into a short stable identity string.
///
/// Only the first 16 hex characters are kept — enough to key a rate bucket,
/// short enough to keep the raw credential out of logs and metrics.
pub fn hash_api_key(token: &str) -> String {
    let hash = blake3::hash(token.as_bytes());
    let hex = hash.to_hex();
    format!("key-{}", &hex.as_str()[..16])
}
