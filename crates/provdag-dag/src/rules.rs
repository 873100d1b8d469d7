//! Height and weight rules.
//!
//! The default rules are the intended semantics: a block's height is one more
//! than its highest parent, and its weight is the size of its past set (the
//! number of distinct blocks reachable through `prev_hashes`). The legacy
//! rules (`height = 1` for any non-genesis block, `weight = parents + height`)
//! remain selectable so that blocks produced under them can still be
//! validated during a migration.
//!
//! Past-set weight is derived incrementally: the heaviest parent already
//! carries the size of its own past, so only the blocks the other parents
//! add on top of it (the mergeset) are walked.

use std::collections::hash_map::Entry;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use provdag_types::Digest;
use serde::{Deserialize, Serialize};

use crate::error::{DagError, DagResult};
use crate::resolver::{BlockResolver, VertexInfo};

/// How a block's height is derived from its parents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeightRule {
    /// `max(parent heights) + 1`.
    #[default]
    MaxParentPlusOne,
    /// `1` for every non-genesis block.
    LegacyFlat,
}

/// How a block's DAG weight is derived.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightRule {
    /// Number of distinct blocks in the past set.
    #[default]
    PastSet,
    /// `len(prev_hashes) + height`. Not monotonic along every path.
    LegacyLinear,
}

/// The pair of rules a node validates and produces blocks under.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagRules {
    #[serde(default)]
    pub height: HeightRule,
    #[serde(default)]
    pub weight: WeightRule,
}

impl DagRules {
    /// The pre-migration rules.
    pub fn legacy() -> Self {
        Self {
            height: HeightRule::LegacyFlat,
            weight: WeightRule::LegacyLinear,
        }
    }

    /// Compute `(height, weight)` for a new block referencing `prev_hashes`.
    pub fn height_and_weight<R: BlockResolver + ?Sized>(
        &self,
        prev_hashes: &[Digest],
        resolver: &R,
    ) -> DagResult<(u64, u64)> {
        let height = compute_height(prev_hashes, resolver, self.height)?;
        let weight = compute_weight(prev_hashes, height, resolver, self.weight)?;
        Ok((height, weight))
    }
}

fn resolve_required<R: BlockResolver + ?Sized>(
    resolver: &R,
    hash: &Digest,
) -> DagResult<VertexInfo> {
    resolver
        .resolve(hash)?
        .ok_or(DagError::UnresolvedParent(*hash))
}

/// Height of a block referencing `prev_hashes`.
///
/// Every parent must resolve, under either rule; a height is never derived
/// from references the node has not seen.
pub fn compute_height<R: BlockResolver + ?Sized>(
    prev_hashes: &[Digest],
    resolver: &R,
    rule: HeightRule,
) -> DagResult<u64> {
    if prev_hashes.is_empty() {
        return Ok(0);
    }
    let mut max_parent = 0u64;
    for hash in prev_hashes {
        let parent = resolve_required(resolver, hash)?;
        max_parent = max_parent.max(parent.height);
    }
    Ok(match rule {
        HeightRule::MaxParentPlusOne => max_parent + 1,
        HeightRule::LegacyFlat => 1,
    })
}

/// DAG weight of a block referencing `prev_hashes` at `height`.
pub fn compute_weight<R: BlockResolver + ?Sized>(
    prev_hashes: &[Digest],
    height: u64,
    resolver: &R,
    rule: WeightRule,
) -> DagResult<u64> {
    if prev_hashes.is_empty() {
        return Ok(0);
    }
    match rule {
        WeightRule::PastSet => past_set_weight(prev_hashes, resolver),
        WeightRule::LegacyLinear => Ok(prev_hashes.len() as u64 + height),
    }
}

/// Past-set size of a block referencing `prev_hashes`, built on the stored
/// weight of its heaviest parent.
///
/// The walk only visits the mergeset and the slice of the selected parent's
/// past it has to be told apart from, so a block on a single chain costs one
/// lookup. Parent weights are trusted as stored. When heights do not strictly
/// decrease along references (blocks placed under [`HeightRule::LegacyFlat`])
/// this falls back to [`past_set_size`].
pub fn past_set_weight<R: BlockResolver + ?Sized>(
    prev_hashes: &[Digest],
    resolver: &R,
) -> DagResult<u64> {
    let mut parents: Vec<(Digest, VertexInfo)> = Vec::with_capacity(prev_hashes.len());
    for hash in prev_hashes {
        if parents.iter().any(|(known, _)| known == hash) {
            continue;
        }
        parents.push((*hash, resolve_required(resolver, hash)?));
    }
    let selected = parents
        .iter()
        .enumerate()
        .max_by_key(|(_, (hash, info))| (info.weight, *hash))
        .map(|(index, _)| index);
    let Some(selected) = selected else {
        return Ok(0);
    };
    let (selected_hash, selected_info) = parents.swap_remove(selected);
    let selected_weight = selected_info.weight;
    if parents.is_empty() {
        return Ok(selected_weight + 1);
    }

    match mergeset_size((selected_hash, selected_info), parents, resolver)? {
        Some(merged) => Ok(selected_weight + 1 + merged),
        None => past_set_size(prev_hashes, resolver),
    }
}

const SELECTED: u8 = 0b01;
const MERGED: u8 = 0b10;

/// Height-ordered frontier where each block carries which side of the merge
/// reaches it.
#[derive(Default)]
struct Paint {
    colours: HashMap<Digest, u8>,
    infos: HashMap<Digest, VertexInfo>,
    queue: BinaryHeap<(u64, Digest)>,
    merged_only: usize,
}

impl Paint {
    fn mark(&mut self, hash: Digest, height: u64, colour: u8) {
        match self.colours.entry(hash) {
            Entry::Occupied(mut entry) => {
                let before = *entry.get();
                let after = before | colour;
                entry.insert(after);
                if before == MERGED && after != MERGED {
                    self.merged_only -= 1;
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(colour);
                if colour == MERGED {
                    self.merged_only += 1;
                }
                self.queue.push((height, hash));
            }
        }
    }
}

/// Number of blocks reachable from `others` that are neither the selected
/// parent nor in its past. `None` when heights do not strictly decrease
/// along a visited reference.
fn mergeset_size<R: BlockResolver + ?Sized>(
    selected: (Digest, VertexInfo),
    others: Vec<(Digest, VertexInfo)>,
    resolver: &R,
) -> DagResult<Option<u64>> {
    let mut paint = Paint::default();
    paint.mark(selected.0, selected.1.height, SELECTED);
    paint.infos.insert(selected.0, selected.1);
    for (hash, info) in others {
        paint.mark(hash, info.height, MERGED);
        paint.infos.insert(hash, info);
    }

    // Popping highest first means every child of a block is settled before
    // the block itself, so its colour is final when it is popped.
    let mut merged = 0u64;
    while paint.merged_only > 0 {
        let Some((height, current)) = paint.queue.pop() else {
            break;
        };
        let colour = paint.colours.get(&current).copied().unwrap_or(SELECTED);
        if colour == MERGED {
            paint.merged_only -= 1;
            merged += 1;
        }
        let Some(info) = paint.infos.remove(&current) else {
            continue;
        };
        for parent in info.references {
            let parent_height = match paint.infos.get(&parent) {
                Some(known) => known.height,
                None if paint.colours.contains_key(&parent) => return Ok(None),
                None => {
                    let resolved = resolve_required(resolver, &parent)?;
                    let h = resolved.height;
                    paint.infos.insert(parent, resolved);
                    h
                }
            };
            if parent_height >= height {
                return Ok(None);
            }
            paint.mark(parent, parent_height, colour);
        }
    }
    Ok(Some(merged))
}

/// Number of distinct blocks reachable from `prev_hashes`, the parents included.
pub fn past_set_size<R: BlockResolver + ?Sized>(
    prev_hashes: &[Digest],
    resolver: &R,
) -> DagResult<u64> {
    let mut visited: HashSet<Digest> = HashSet::new();
    let mut queue: VecDeque<Digest> = VecDeque::new();
    for hash in prev_hashes {
        if visited.insert(*hash) {
            queue.push_back(*hash);
        }
    }

    while let Some(current) = queue.pop_front() {
        let info = resolve_required(resolver, &current)?;
        for parent in info.references {
            if visited.insert(parent) {
                queue.push_back(parent);
            }
        }
    }

    Ok(visited.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use proptest::prelude::*;
    use std::cell::Cell;

    /// Tiny resolver over (hash -> (height, weight, parents)).
    fn graph(edges: &[(u8, u64, u64, &[u8])]) -> HashMap<Digest, VertexInfo> {
        edges
            .iter()
            .map(|(id, height, weight, parents)| {
                (
                    d(*id),
                    VertexInfo {
                        height: *height,
                        weight: *weight,
                        references: parents.iter().map(|p| d(*p)).collect(),
                    },
                )
            })
            .collect()
    }

    fn d(id: u8) -> Digest {
        Digest::from_hash([id; 32])
    }

    fn n(id: u32) -> Digest {
        let mut bytes = [0u8; 32];
        bytes[..4].copy_from_slice(&id.to_le_bytes());
        Digest::from_hash(bytes)
    }

    struct MapResolver(HashMap<Digest, VertexInfo>);

    impl BlockResolver for MapResolver {
        fn resolve(&self, hash: &Digest) -> DagResult<Option<VertexInfo>> {
            Ok(self.0.get(hash).cloned())
        }
    }

    /// Counts every lookup it serves.
    struct Counting {
        inner: MapResolver,
        lookups: Cell<usize>,
    }

    impl Counting {
        fn new(inner: MapResolver) -> Self {
            Self { inner, lookups: Cell::new(0) }
        }

        fn take(&self) -> usize {
            self.lookups.replace(0)
        }
    }

    impl BlockResolver for Counting {
        fn resolve(&self, hash: &Digest) -> DagResult<Option<VertexInfo>> {
            self.lookups.set(self.lookups.get() + 1);
            self.inner.resolve(hash)
        }
    }

    /// Insert `id` over `parents` with height and weight from the default rules.
    fn place(map: &mut MapResolver, id: Digest, parents: Vec<Digest>) {
        let (height, weight) = DagRules::default().height_and_weight(&parents, &*map).unwrap();
        map.0.insert(
            id,
            VertexInfo {
                height,
                weight,
                references: parents,
            },
        );
    }

    fn chain(len: u32) -> MapResolver {
        let mut map = MapResolver(HashMap::new());
        place(&mut map, n(0), vec![]);
        for i in 1..len {
            place(&mut map, n(i), vec![n(i - 1)]);
        }
        map
    }

    // 1 <- 2 <- 4
    // 1 <- 3 <- 4
    // 4 <- 5, 3 <- 5
    fn diamond() -> MapResolver {
        MapResolver(graph(&[
            (1, 0, 0, &[]),
            (2, 1, 1, &[1]),
            (3, 1, 1, &[1]),
            (4, 2, 3, &[2, 3]),
            (5, 3, 4, &[4, 3]),
        ]))
    }

    #[test]
    fn genesis_height_and_weight_are_zero() {
        let r = diamond();
        assert_eq!(compute_height(&[], &r, HeightRule::MaxParentPlusOne).unwrap(), 0);
        assert_eq!(compute_weight(&[], 0, &r, WeightRule::PastSet).unwrap(), 0);
        assert_eq!(compute_weight(&[], 0, &r, WeightRule::LegacyLinear).unwrap(), 0);
    }

    #[test]
    fn height_is_max_parent_plus_one() {
        let r = diamond();
        let h = compute_height(&[d(2), d(5)], &r, HeightRule::MaxParentPlusOne).unwrap();
        assert_eq!(h, 4);
    }

    #[test]
    fn legacy_height_is_flat() {
        let r = diamond();
        assert_eq!(compute_height(&[d(5)], &r, HeightRule::LegacyFlat).unwrap(), 1);
    }

    #[test]
    fn unresolved_parent_is_an_error() {
        let r = diamond();
        let err = compute_height(&[d(9)], &r, HeightRule::MaxParentPlusOne).unwrap_err();
        assert_eq!(err, DagError::UnresolvedParent(d(9)));
        let err = compute_height(&[d(9)], &r, HeightRule::LegacyFlat).unwrap_err();
        assert_eq!(err, DagError::UnresolvedParent(d(9)));
    }

    #[test]
    fn past_set_counts_distinct_ancestors() {
        let r = diamond();
        assert_eq!(past_set_size(&[d(1)], &r).unwrap(), 1);
        assert_eq!(past_set_size(&[d(4)], &r).unwrap(), 4);
        // 5's past: {5, 4, 3, 2, 1}
        assert_eq!(past_set_size(&[d(5)], &r).unwrap(), 5);
        // Overlapping parents are not double counted.
        assert_eq!(past_set_size(&[d(2), d(3)], &r).unwrap(), 3);
    }

    #[test]
    fn past_set_with_missing_ancestor_fails() {
        let r = MapResolver(graph(&[(2, 1, 1, &[1])]));
        assert_eq!(
            past_set_size(&[d(2)], &r).unwrap_err(),
            DagError::UnresolvedParent(d(1))
        );
    }

    #[test]
    fn legacy_linear_weight() {
        let r = diamond();
        assert_eq!(compute_weight(&[d(2), d(3)], 2, &r, WeightRule::LegacyLinear).unwrap(), 4);
    }

    #[test]
    fn rules_combined() {
        let r = diamond();
        assert_eq!(DagRules::default().height_and_weight(&[d(4)], &r).unwrap(), (3, 4));
        assert_eq!(DagRules::legacy().height_and_weight(&[d(4)], &r).unwrap(), (1, 2));
    }

    #[test]
    fn incremental_weight_matches_full_walk_on_diamond() {
        let r = diamond();
        for parents in [
            vec![d(1)],
            vec![d(4)],
            vec![d(5)],
            vec![d(2), d(3)],
            vec![d(5), d(2)],
            vec![d(2), d(5), d(2)],
            vec![d(3), d(4)],
        ] {
            assert_eq!(
                past_set_weight(&parents, &r).unwrap(),
                past_set_size(&parents, &r).unwrap(),
                "parents {parents:?}"
            );
        }
    }

    #[test]
    fn chain_weight_costs_one_lookup() {
        for len in [10, 100, 1_000, 10_000] {
            let r = Counting::new(chain(len));
            let tip = n(len - 1);
            let (height, weight) = DagRules::default().height_and_weight(&[tip], &r).unwrap();
            assert_eq!((height, weight), (len as u64, len as u64));
            // One lookup for the height, one for the weight.
            assert_eq!(r.take(), 2, "chain of {len}");
        }
    }

    #[test]
    fn merge_cost_tracks_divergence_not_history() {
        // A long chain forks three blocks below its end; the merge only
        // walks the two short branches and their meeting point.
        for len in [100u32, 5_000] {
            let mut map = chain(len);
            let fork = n(len - 1);
            let (a1, a2, b1) = (n(len), n(len + 1), n(len + 2));
            place(&mut map, a1, vec![fork]);
            place(&mut map, a2, vec![a1]);
            place(&mut map, b1, vec![fork]);

            let r = Counting::new(map);
            let weight = past_set_weight(&[a2, b1], &r).unwrap();
            assert_eq!(weight, len as u64 + 3);
            assert!(r.take() <= 6, "chain of {len}");
        }
    }

    #[test]
    fn flat_heights_fall_back_to_full_walk() {
        // Every non-genesis block at height 1, as under the legacy height rule.
        let r = MapResolver(graph(&[
            (1, 0, 0, &[]),
            (2, 1, 1, &[1]),
            (3, 1, 2, &[2]),
            (4, 1, 2, &[2]),
        ]));
        assert_eq!(past_set_weight(&[d(3), d(4)], &r).unwrap(), 4);
        assert_eq!(past_set_size(&[d(3), d(4)], &r).unwrap(), 4);
    }

    proptest! {
        /// Incremental weight agrees with a full ancestor walk for random DAGs
        /// where each block references a subset of earlier blocks.
        #[test]
        fn incremental_matches_full_walk(parent_masks in proptest::collection::vec(any::<u32>(), 1..32)) {
            let mut map = MapResolver(HashMap::new());
            for (i, mask) in parent_masks.iter().enumerate() {
                let parents: Vec<Digest> = (0..i)
                    .filter(|j| mask & (1 << (j % 32)) != 0)
                    .map(|j| n(j as u32))
                    .collect();
                let full = past_set_size(&parents, &map).unwrap();
                let incremental = past_set_weight(&parents, &map).unwrap();
                prop_assert_eq!(incremental, full);
                place(&mut map, n(i as u32), parents);
            }
        }
    }

    #[test]
    fn rules_serde_names() {
        let json = serde_json::to_string(&DagRules::legacy()).unwrap();
        assert_eq!(json, r#"{"height":"legacy_flat","weight":"legacy_linear"}"#);
        let parsed: DagRules = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, DagRules::default());
    }
}
