//! Stable digests used as cache keys.
//!
//! Digests are hex-encoded SHA-256 so they survive process restarts and are
//! safe to use as memcached keys (no whitespace, 64 characters).

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 digest of `bytes`
pub fn stable_hash(bytes: impl AsRef<[u8]>) -> String {
    hex::encode(Sha256::digest(bytes.as_ref()))
}

/// Identity of a logical request, before hashing
///
/// One leading slash on `path` is dropped so `"/index"` and `"index"` name
/// the same request.
pub fn request_key(host: &str, path: &str) -> String {
    format!("{host}/{}", path.strip_prefix('/').unwrap_or(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable_and_hex() {
        let a = stable_hash("module.method");
        assert_eq!(a, stable_hash("module.method"));
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn request_key_joins_host_and_path() {
        assert_eq!(request_key("a.example", "/index"), "a.example/index");
        assert_eq!(request_key("a.example", "index"), "a.example/index");
        assert_ne!(request_key("a.example", "/"), request_key("b.example", "/"));
    }
}
