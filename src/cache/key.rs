use std::fmt::{self, Display, Formatter};
use std::path::PathBuf;

use sha2::{Digest, Sha256};

use crate::http::Request;

const KEY_SEPARATOR: &str = ":";

/// Identifies a cached response by its content negotiation header and
/// canonical URL. Requests that only differ in their Accept header get
/// different keys, as the stored representation depends on it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    canonical: String,
}

impl CacheKey {
    pub fn compute(accept: &str, canonical_url: &str) -> Self {
        CacheKey {
            canonical: format!("{accept}{KEY_SEPARATOR}{canonical_url}"),
        }
    }

    pub fn from_request(request: &Request) -> Self {
        Self::compute(request.accept(), request.url())
    }

    /// Pre-hash form, `<accept>:<url>`.
    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// Hex encoded SHA-256 of the canonical form. Safe to use as a file name.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical.as_bytes());
        let hash = hasher.finalize();
        format!("{hash:x}")
    }

    /// Relative directory for this key: `aa/bb/aabbcc...`
    pub fn shard_path(&self) -> PathBuf {
        let digest = self.digest();
        [&digest[0..2], &digest[2..4], digest.as_str()]
            .iter()
            .collect()
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical)
    }
}
