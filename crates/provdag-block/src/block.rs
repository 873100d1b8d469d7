//! The unified / data-tier block.

use std::collections::HashSet;

use provdag_crypto::{
    merkle_root, verify_digest, ContentHasher, MerkleProof, MerkleTree, Signature, SigningKey,
};
use provdag_types::{Digest, ValidatorKey};
use serde::{Deserialize, Serialize};

use crate::error::{BlockError, BlockResult};
use crate::meta::{check_metadata, MetaValue, Metadata};
use crate::txn::{OpaqueTxn, Transaction};

/// A block in the DAG.
///
/// `hash` is a pure function of every field except `signature`. Changing any
/// other field leaves the block inconsistent until [`Block::rehash`] runs,
/// and the store refuses blocks whose hash does not match their content.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Content hash, computed last.
    pub hash: Digest,
    /// DAG in-edges. Empty for genesis.
    pub prev_hashes: Vec<Digest>,
    /// Milliseconds since epoch, producer-assigned.
    pub timestamp: i64,
    pub height: u64,
    pub validator: ValidatorKey,
    pub signature: Option<Signature>,
    pub transactions: Vec<Transaction>,
    pub merkle_root: Digest,
    /// Free-form supply-chain tag, e.g. `"milk_collection"`.
    pub supply_chain_type: String,
    pub dag_weight: u64,
    pub metadata: Metadata,
}

/// The leaf tier is the unified block: a data block that also carries a weight.
pub type DataBlock = Block;

/// Inputs to [`Block::assemble`] once height and weight are known.
#[derive(Clone, Debug, Default)]
pub struct BlockDraft {
    pub prev_hashes: Vec<Digest>,
    pub timestamp: i64,
    pub height: u64,
    pub dag_weight: u64,
    pub validator: ValidatorKey,
    pub transactions: Vec<Transaction>,
    pub supply_chain_type: String,
    pub metadata: Metadata,
}

impl BlockDraft {
    /// Reject malformed construction arguments before any hashing happens.
    pub fn validate(&self) -> BlockResult<()> {
        if self.validator.is_empty() {
            return Err(BlockError::InvalidInput("validator is empty".into()));
        }
        if let Some(dup) = first_duplicate(&self.prev_hashes) {
            return Err(BlockError::InvalidInput(format!(
                "prev_hashes lists {} more than once",
                dup.short_hex()
            )));
        }
        if self.prev_hashes.iter().any(Digest::is_zero) {
            return Err(BlockError::InvalidInput("prev_hashes contains the zero digest".into()));
        }
        check_metadata(&self.metadata)
    }
}

#[derive(Serialize)]
struct BlockPreimage<'a> {
    prev_hashes: Vec<String>,
    timestamp: i64,
    height: u64,
    validator: String,
    transactions: Vec<String>,
    merkle_root: String,
    supply_chain_type: &'a str,
    dag_weight: u64,
    metadata: &'a Metadata,
}

impl Block {
    /// Build a block from a validated draft: Merkle root first, hash last.
    pub fn assemble(draft: BlockDraft) -> BlockResult<Self> {
        draft.validate()?;
        let tx_hashes: Vec<Digest> = draft.transactions.iter().map(OpaqueTxn::digest).collect();
        let mut block = Self {
            hash: Digest::zero(),
            prev_hashes: draft.prev_hashes,
            timestamp: draft.timestamp,
            height: draft.height,
            validator: draft.validator,
            signature: None,
            transactions: draft.transactions,
            merkle_root: merkle_root(&tx_hashes),
            supply_chain_type: draft.supply_chain_type,
            dag_weight: draft.dag_weight,
            metadata: draft.metadata,
        };
        block.hash = block.compute_hash()?;
        Ok(block)
    }

    /// Hash of every field except `hash` and `signature`, canonically serialized.
    pub fn compute_hash(&self) -> BlockResult<Digest> {
        check_metadata(&self.metadata)?;
        let preimage = BlockPreimage {
            prev_hashes: self.prev_hashes.iter().map(Digest::to_hex).collect(),
            timestamp: self.timestamp,
            height: self.height,
            validator: self.validator.to_hex(),
            transactions: self.transactions.iter().map(|t| t.digest().to_hex()).collect(),
            merkle_root: self.merkle_root.to_hex(),
            supply_chain_type: &self.supply_chain_type,
            dag_weight: self.dag_weight,
            metadata: &self.metadata,
        };
        Ok(ContentHasher::BLOCK.hash_canonical(&preimage)?)
    }

    /// Returns `true` if the stored hash matches the content.
    pub fn verify_hash(&self) -> bool {
        !self.hash.is_zero() && matches!(self.compute_hash(), Ok(h) if h == self.hash)
    }

    /// Recompute the Merkle root and hash after a field was changed.
    ///
    /// Any existing signature covered the old hash, so it is dropped.
    pub fn rehash(&mut self) -> BlockResult<()> {
        self.merkle_root = merkle_root(&self.transaction_hashes());
        self.hash = self.compute_hash()?;
        self.signature = None;
        Ok(())
    }

    /// Set a metadata entry and rehash.
    pub fn set_metadata(
        &mut self,
        key: impl Into<String>,
        value: impl Into<MetaValue>,
    ) -> BlockResult<()> {
        let (key, value) = (key.into(), value.into());
        if !value.is_finite() {
            return Err(BlockError::InvalidInput(format!(
                "metadata entry {key:?} holds a non-finite number"
            )));
        }
        self.metadata.insert(key, value);
        self.rehash()
    }

    /// Return a copy signed over `hash` with `key`. The hash is untouched.
    pub fn signed(mut self, key: &SigningKey) -> Self {
        self.signature = Some(key.sign_digest(&self.hash));
        self
    }

    /// `true` only if a signature is present, the hash matches the content,
    /// and the signature verifies against `hash` and `validator`.
    pub fn verify_signature(&self) -> bool {
        match &self.signature {
            Some(sig) => self.verify_hash() && verify_digest(&self.hash, sig, &self.validator),
            None => false,
        }
    }

    /// Returns `true` for a block with no parents.
    pub fn is_genesis(&self) -> bool {
        self.prev_hashes.is_empty()
    }

    /// Transaction digests in block order.
    pub fn transaction_hashes(&self) -> Vec<Digest> {
        self.transactions.iter().map(OpaqueTxn::digest).collect()
    }

    /// Merkle inclusion proof for a transaction in this block.
    pub fn inclusion_proof(&self, txn: &Digest) -> Option<MerkleProof> {
        let tree = MerkleTree::from_leaves(self.transaction_hashes());
        tree.position(txn).and_then(|i| tree.proof(i))
    }

    /// Structural integrity checks performed before a block is admitted.
    pub fn check_well_formed(&self) -> BlockResult<()> {
        if self.validator.is_empty() {
            return Err(BlockError::malformed(self.hash, "validator is empty"));
        }
        if first_duplicate(&self.prev_hashes).is_some() {
            return Err(BlockError::malformed(self.hash, "duplicate prev_hashes"));
        }
        if self.is_genesis() {
            if self.height != 0 || self.dag_weight != 0 {
                return Err(BlockError::malformed(
                    self.hash,
                    "genesis block must have height 0 and weight 0",
                ));
            }
        } else if self.height == 0 {
            return Err(BlockError::malformed(self.hash, "non-genesis block at height 0"));
        }
        if let Some(bad) = self.transactions.iter().find(|t| !t.verify_hash()) {
            return Err(BlockError::malformed(
                self.hash,
                format!("transaction {} hash mismatch", bad.hash.short_hex()),
            ));
        }
        if merkle_root(&self.transaction_hashes()) != self.merkle_root {
            return Err(BlockError::malformed(self.hash, "merkle root mismatch"));
        }
        if !self.verify_hash() {
            return Err(BlockError::malformed(self.hash, "hash does not match content"));
        }
        Ok(())
    }

    /// Human-readable one-line summary.
    pub fn summary(&self) -> String {
        format!(
            "{} h={} w={} parents={} txns={} type={}",
            self.hash.short_hex(),
            self.height,
            self.dag_weight,
            self.prev_hashes.len(),
            self.transactions.len(),
            self.supply_chain_type,
        )
    }
}

fn first_duplicate(hashes: &[Digest]) -> Option<Digest> {
    let mut seen = HashSet::with_capacity(hashes.len());
    hashes.iter().find(|h| !seen.insert(**h)).copied()
}
