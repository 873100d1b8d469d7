use provdag_types::Digest;
use serde::Serialize;

use crate::canonical::canonical_bytes;

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag (e.g., `"provdag-block-v1"`) that is
/// prepended to every hash computation. A data block and an aggregation
/// block with identical bytes therefore never share a digest.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for unified / data-tier blocks.
    pub const BLOCK: Self = Self {
        domain: "provdag-block-v1",
    };
    /// Hasher for aggregation blocks.
    pub const AGGREGATION: Self = Self {
        domain: "provdag-aggregation-v1",
    };
    /// Hasher for checkpoint blocks.
    pub const CHECKPOINT: Self = Self {
        domain: "provdag-checkpoint-v1",
    };
    /// Hasher for transactions.
    pub const TRANSACTION: Self = Self {
        domain: "provdag-txn-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> Digest {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        Digest::from_hash(*hasher.finalize().as_bytes())
    }

    /// Hash a value through its canonical serialization.
    pub fn hash_canonical<T: Serialize + ?Sized>(&self, value: &T) -> Result<Digest, HasherError> {
        Ok(self.hash(&canonical_bytes(value)?))
    }

    /// Verify that data produces the expected digest.
    pub fn verify(&self, data: &[u8], expected: &Digest) -> bool {
        self.hash(data) == *expected
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}

/// Errors from hashing operations.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum HasherError {
    #[error("serialization error: {0}")]
    Serialization(String),
}
