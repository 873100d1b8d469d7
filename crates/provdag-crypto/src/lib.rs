//! Digest and signature provider for the ProvDAG ledger.
//!
//! Provides domain-separated BLAKE3 hashing over a canonical serialization,
//! binary Merkle roots with inclusion proofs, and Ed25519 signing/verification.
//! Every function here is deterministic and side-effect free.
//!
//! All crypto operations wrap established libraries; there is no custom cryptography.

pub mod canonical;
pub mod hasher;
pub mod merkle;
pub mod signer;

pub use canonical::{canonical_bytes, canonicalize};
pub use hasher::{ContentHasher, HasherError};
pub use merkle::{merkle_root, MerkleProof, MerkleTree, Side};
pub use signer::{verify_digest, Signature, SignatureError, SigningKey, VerifyingKey};
