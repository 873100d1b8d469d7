//! The single shared "current tip set".
//!
//! One versioned value behind a lock; last writer wins. Producers read it to
//! pick parents. It may lag the store, which is tolerated: the true frontier
//! can always be recomputed with `select_tips` over stored blocks.

use parking_lot::RwLock;
use provdag_dag::advance_tips;
use provdag_types::Digest;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A snapshot of the tip registry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TipSet {
    pub tips: Vec<Digest>,
    /// Incremented on every write.
    pub version: u64,
}

#[derive(Debug, Default)]
pub struct TipRegistry {
    current: RwLock<TipSet>,
}

impl TipRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the tip set. Returns the new version.
    pub fn update(&self, tips: Vec<Digest>) -> u64 {
        let mut current = self.current.write();
        current.version += 1;
        current.tips = tips;
        debug!(version = current.version, tips = current.tips.len(), "tip set replaced");
        current.version
    }

    /// Apply an admitted block: drop its parents, add it.
    pub fn advance(&self, parents: &[Digest], new_tip: Digest) -> TipSet {
        let mut current = self.current.write();
        current.tips = advance_tips(&current.tips, parents, new_tip);
        current.version += 1;
        current.clone()
    }

    pub fn get(&self) -> Vec<Digest> {
        self.current.read().tips.clone()
    }

    pub fn snapshot(&self) -> TipSet {
        self.current.read().clone()
    }

    pub fn version(&self) -> u64 {
        self.current.read().version
    }

    pub fn is_empty(&self) -> bool {
        self.current.read().tips.is_empty()
    }

    /// Forget the tip set. The version keeps counting.
    pub fn clear(&self) {
        self.update(Vec::new());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn d(n: u8) -> Digest {
        Digest::of(&[n])
    }

    #[test]
    fn last_writer_wins() {
        let reg = TipRegistry::new();
        assert!(reg.is_empty());
        assert_eq!(reg.update(vec![d(1)]), 1);
        assert_eq!(reg.update(vec![d(2), d(3)]), 2);
        assert_eq!(reg.get(), vec![d(2), d(3)]);
    }

    #[test]
    fn advance_replaces_parents() {
        let reg = TipRegistry::new();
        reg.update(vec![d(1), d(2), d(3)]);
        let snap = reg.advance(&[d(1), d(2)], d(4));
        assert_eq!(snap.tips, vec![d(3), d(4)]);
        assert_eq!(snap.version, 2);
    }

    #[test]
    fn clear_bumps_version() {
        let reg = TipRegistry::new();
        reg.update(vec![d(1)]);
        reg.clear();
        assert!(reg.is_empty());
        assert_eq!(reg.version(), 2);
    }

    #[test]
    fn concurrent_advances_are_serialized() {
        let reg = Arc::new(TipRegistry::new());
        let handles: Vec<_> = (1..=16u8)
            .map(|i| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || {
                    reg.advance(&[], d(i));
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let snap = reg.snapshot();
        assert_eq!(snap.version, 16);
        assert_eq!(snap.tips.len(), 16);
    }
}
