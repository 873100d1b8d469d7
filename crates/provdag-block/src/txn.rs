//! Transactions carried inside data blocks.
//!
//! The block core never interprets transaction semantics. All it needs is a
//! stable digest per transaction, which is what [`OpaqueTxn`] exposes. The
//! concrete [`Transaction`] record stores the PROV-O payload as opaque bytes
//! tagged with a free-form kind (e.g. `"prov:Activity"`).

use provdag_crypto::ContentHasher;
use provdag_types::{now_millis, Digest};
use serde::{Deserialize, Serialize};

use crate::error::{BlockError, BlockResult};

/// Anything that can be committed into a block's Merkle root.
pub trait OpaqueTxn {
    /// Stable content digest of the transaction.
    fn digest(&self) -> Digest;
}

/// An opaque provenance transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Content hash over `kind`, `payload`, and `timestamp`.
    pub hash: Digest,
    /// Free-form kind tag supplied by the transaction layer.
    pub kind: String,
    /// Opaque payload bytes.
    pub payload: Vec<u8>,
    /// Milliseconds since epoch, producer-assigned.
    pub timestamp: i64,
}

#[derive(Serialize)]
struct TxnPreimage<'a> {
    kind: &'a str,
    payload: String,
    timestamp: i64,
}

impl Transaction {
    /// Create a transaction stamped with the current time.
    pub fn new(kind: impl Into<String>, payload: Vec<u8>) -> BlockResult<Self> {
        Self::with_timestamp(kind, payload, now_millis())
    }

    /// Create a transaction with an explicit timestamp.
    pub fn with_timestamp(
        kind: impl Into<String>,
        payload: Vec<u8>,
        timestamp: i64,
    ) -> BlockResult<Self> {
        let kind = kind.into();
        if kind.is_empty() {
            return Err(BlockError::InvalidInput("transaction kind is empty".into()));
        }
        let mut txn = Self {
            hash: Digest::zero(),
            kind,
            payload,
            timestamp,
        };
        txn.hash = txn.compute_hash()?;
        Ok(txn)
    }

    /// Create a transaction whose payload is a JSON document.
    pub fn from_json(kind: impl Into<String>, payload: &serde_json::Value) -> BlockResult<Self> {
        let bytes = serde_json::to_vec(payload)
            .map_err(|e| BlockError::InvalidInput(format!("payload is not serializable: {e}")))?;
        Self::new(kind, bytes)
    }

    /// Recompute the content hash from the other fields.
    pub fn compute_hash(&self) -> BlockResult<Digest> {
        let preimage = TxnPreimage {
            kind: &self.kind,
            payload: hex::encode(&self.payload),
            timestamp: self.timestamp,
        };
        Ok(ContentHasher::TRANSACTION.hash_canonical(&preimage)?)
    }

    /// Returns `true` if the stored hash matches the content.
    pub fn verify_hash(&self) -> bool {
        matches!(self.compute_hash(), Ok(h) if h == self.hash)
    }

    /// Decode the payload as JSON, if it is JSON.
    pub fn payload_json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.payload).ok()
    }
}

impl OpaqueTxn for Transaction {
    fn digest(&self) -> Digest {
        self.hash
    }
}

impl OpaqueTxn for Digest {
    fn digest(&self) -> Digest {
        *self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hash_is_deterministic() {
        let a = Transaction::with_timestamp("prov:Activity", b"collect".to_vec(), 10).unwrap();
        let b = Transaction::with_timestamp("prov:Activity", b"collect".to_vec(), 10).unwrap();
        assert_eq!(a.hash, b.hash);
        assert!(a.verify_hash());
    }

    #[test]
    fn hash_covers_every_field() {
        let base = Transaction::with_timestamp("prov:Entity", b"milk".to_vec(), 1).unwrap();
        let other_kind = Transaction::with_timestamp("prov:Agent", b"milk".to_vec(), 1).unwrap();
        let other_payload = Transaction::with_timestamp("prov:Entity", b"whey".to_vec(), 1).unwrap();
        let other_time = Transaction::with_timestamp("prov:Entity", b"milk".to_vec(), 2).unwrap();
        assert_ne!(base.hash, other_kind.hash);
        assert_ne!(base.hash, other_payload.hash);
        assert_ne!(base.hash, other_time.hash);
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let mut txn = Transaction::new("prov:Entity", b"milk".to_vec()).unwrap();
        txn.payload = b"water".to_vec();
        assert!(!txn.verify_hash());
    }

    #[test]
    fn empty_kind_is_rejected() {
        assert!(matches!(
            Transaction::new("", vec![]),
            Err(BlockError::InvalidInput(_))
        ));
    }

    #[test]
    fn json_payload_roundtrip() {
        let payload = json!({"prov:wasGeneratedBy": "collection-17"});
        let txn = Transaction::from_json("prov:Entity", &payload).unwrap();
        assert_eq!(txn.payload_json(), Some(payload));
        assert_eq!(txn.digest(), txn.hash);
    }
}
