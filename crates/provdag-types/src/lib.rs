//! Foundation types for the ProvDAG block-DAG ledger.
//!
//! Every other `provdag-*` crate depends on this one.
//!
//! # Key Types
//!
//! - [`Digest`]: 32-byte content hash identifying blocks and transactions
//! - [`ValidatorKey`]: raw public key bytes of a block producer
//! - [`clock`]: millisecond wall-clock helpers used for block timestamps

pub mod clock;
pub mod digest;
pub mod error;
pub mod validator;

pub use clock::now_millis;
pub use digest::Digest;
pub use error::TypeError;
pub use validator::ValidatorKey;
