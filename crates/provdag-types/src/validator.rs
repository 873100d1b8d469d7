use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Public key bytes identifying the validator that produced a block.
///
/// This is kept as raw bytes rather than a parsed curve point so that a block
/// carrying a malformed key can still be decoded, stored, and then rejected by
/// signature verification instead of failing deserialization.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValidatorKey([u8; 32]);

impl ValidatorKey {
    /// Wrap raw public key bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// The empty key (all zeros). Never a valid producer identity.
    pub const fn empty() -> Self {
        Self([0u8; 32])
    }

    /// Returns `true` if this is the empty key.
    pub fn is_empty(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// The raw 32 bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Full hex-encoded string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short identifier (first 8 hex characters).
    pub fn short_id(&self) -> String {
        format!("val:{}", hex::encode(&self.0[..4]))
    }

    /// Parse from a hex string, with or without the `val:` prefix.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let s = s.strip_prefix("val:").unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| TypeError::InvalidLength {
                expected: 32,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }
}

impl Default for ValidatorKey {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for ValidatorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValidatorKey({})", self.short_id())
    }
}

impl fmt::Display for ValidatorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
