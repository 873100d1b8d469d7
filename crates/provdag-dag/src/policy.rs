//! Producer-side parent choice.
//!
//! Producers reference a handful of current tips. Under high transaction
//! volume a new block references more tips so concurrent branches are
//! merged back quickly. The fan-in is a producer knob and has no effect on
//! validation.

use provdag_types::Digest;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DagResult;
use crate::resolver::BlockResolver;
use crate::tips::GENESIS_SENTINEL;

/// How many tips a new block should reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferencePolicy {
    /// Parents referenced under light load.
    pub min_parents: usize,
    /// Parents referenced once `high_volume_txns` are pending.
    pub max_parents: usize,
    /// Pending transaction count at which fan-in reaches `max_parents`.
    pub high_volume_txns: usize,
}

impl Default for ReferencePolicy {
    fn default() -> Self {
        Self {
            min_parents: 2,
            max_parents: 8,
            high_volume_txns: 256,
        }
    }
}

impl ReferencePolicy {
    /// Fan-in for a block carrying `pending_txns` transactions, scaled
    /// linearly between `min_parents` and `max_parents`.
    pub fn fan_in(&self, pending_txns: usize) -> usize {
        let min = self.min_parents.max(1);
        let max = self.max_parents.max(min);
        if self.high_volume_txns == 0 || pending_txns >= self.high_volume_txns {
            return max;
        }
        min + (max - min) * pending_txns / self.high_volume_txns
    }

    /// Pick parents from `tips`: heaviest first, ties broken by hash.
    ///
    /// An empty tip set, or the genesis sentinel, yields no parents so the
    /// caller builds a genesis block. Tips the resolver does not know are
    /// skipped.
    pub fn choose_parents<R: BlockResolver + ?Sized>(
        &self,
        tips: &[Digest],
        pending_txns: usize,
        resolver: &R,
    ) -> DagResult<Vec<Digest>> {
        let mut ranked = Vec::with_capacity(tips.len());
        for tip in tips {
            if *tip == GENESIS_SENTINEL {
                continue;
            }
            match resolver.resolve(tip)? {
                Some(info) => ranked.push((info.weight, *tip)),
                None => debug!(tip = %tip.short_hex(), "skipping unresolved tip"),
            }
        }
        ranked.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        ranked.dedup_by_key(|(_, h)| *h);

        Ok(ranked
            .into_iter()
            .take(self.fan_in(pending_txns))
            .map(|(_, h)| h)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::VertexInfo;
    use std::collections::HashMap;

    struct Weights(HashMap<Digest, u64>);

    impl BlockResolver for Weights {
        fn resolve(&self, hash: &Digest) -> DagResult<Option<VertexInfo>> {
            Ok(self.0.get(hash).map(|w| VertexInfo {
                height: 1,
                weight: *w,
                references: vec![],
            }))
        }
    }

    #[test]
    fn fan_in_scales_with_volume() {
        let policy = ReferencePolicy {
            min_parents: 2,
            max_parents: 6,
            high_volume_txns: 100,
        };
        assert_eq!(policy.fan_in(0), 2);
        assert_eq!(policy.fan_in(50), 4);
        assert_eq!(policy.fan_in(100), 6);
        assert_eq!(policy.fan_in(10_000), 6);
    }

    #[test]
    fn fan_in_never_zero() {
        let policy = ReferencePolicy {
            min_parents: 0,
            max_parents: 0,
            high_volume_txns: 10,
        };
        assert_eq!(policy.fan_in(0), 1);
    }

    #[test]
    fn sentinel_and_empty_mean_genesis() {
        let resolver = Weights(HashMap::new());
        let policy = ReferencePolicy::default();
        assert!(policy.choose_parents(&[], 0, &resolver).unwrap().is_empty());
        assert!(policy
            .choose_parents(&[GENESIS_SENTINEL], 0, &resolver)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn heaviest_tips_win() {
        let (a, b, c) = (Digest::of(b"a"), Digest::of(b"b"), Digest::of(b"c"));
        let resolver = Weights(HashMap::from([(a, 1), (b, 5), (c, 3)]));
        let policy = ReferencePolicy {
            min_parents: 2,
            max_parents: 2,
            high_volume_txns: 1,
        };
        assert_eq!(policy.choose_parents(&[a, b, c], 0, &resolver).unwrap(), vec![b, c]);
    }

    #[test]
    fn unknown_tips_skipped() {
        let a = Digest::of(b"a");
        let resolver = Weights(HashMap::from([(a, 1)]));
        let chosen = ReferencePolicy::default()
            .choose_parents(&[Digest::of(b"ghost"), a], 0, &resolver)
            .unwrap();
        assert_eq!(chosen, vec![a]);
    }
}
