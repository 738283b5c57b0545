//! Content fingerprints for cache validation
//!
//! A file's fingerprint covers its raw content and the digest of the manifest
//! governing it, so editing a manifest invalidates every file whose bare
//! requires it could re-route.

use sha2::{Digest, Sha256};

/// SHA256 hex digest of `bytes`
pub fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Fingerprint of a file's raw content under a given manifest digest
pub fn file_fingerprint(raw: &str, kind: &str, manifest_digest: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    hasher.update([0]);
    hasher.update(manifest_digest.as_bytes());
    hasher.update([0]);
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

/// File name a cache key is stored under (first 32 hex chars of its digest)
pub fn key_name(id: &str) -> String {
    let hash = digest(id.as_bytes());
    format!("{}.json", &hash[..32])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_sha256() {
        assert_eq!(
            digest(b"Hello World"),
            "a591a6d40bf420404a011733cfb7b190d62c65bf0bcda32b57b277d9ad9f146e"
        );
    }

    #[test]
    fn fingerprint_deterministic() {
        let a = file_fingerprint("module.exports = 1", "js", "");
        let b = file_fingerprint("module.exports = 1", "js", "");
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_tracks_manifest() {
        let a = file_fingerprint("require('type')", "js", &digest(b"{\"a\":1}"));
        let b = file_fingerprint("require('type')", "js", &digest(b"{\"a\":2}"));
        assert_ne!(a, b);
    }

    #[test]
    fn key_names_are_flat() {
        let name = key_name("components/a-b@1.0.0/index.js");
        assert!(!name.contains('/'));
        assert_eq!(name.len(), 32 + ".json".len());
    }
}
