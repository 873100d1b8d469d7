//! Tip selection.
//!
//! A tip is a known block that no other known block references. The frontier
//! is a pure set difference: every candidate hash minus the union of every
//! candidate's references.

use std::collections::HashSet;

use provdag_block::DagVertex;
use provdag_types::Digest;

/// Well-known parent placeholder for producers that find no tips at all.
///
/// A producer that receives `[GENESIS_SENTINEL]` builds a genesis block
/// (empty `prev_hashes`); the sentinel itself is never stored as an edge.
pub const GENESIS_SENTINEL: Digest = Digest::zero();

/// Hashes in `known` that no member of `known` references.
///
/// Output preserves the input order of `known` and contains each tip once.
/// Reference counts are irrelevant: a block referenced once is excluded just
/// like one referenced many times.
pub fn select_tips<I, V>(known: I) -> Vec<Digest>
where
    I: IntoIterator<Item = V>,
    V: DagVertex,
{
    let vertices: Vec<V> = known.into_iter().collect();
    let referenced: HashSet<Digest> = vertices
        .iter()
        .flat_map(|v| v.references().iter().copied())
        .collect();

    let mut seen = HashSet::with_capacity(vertices.len());
    vertices
        .iter()
        .map(DagVertex::id)
        .filter(|id| !referenced.contains(id) && seen.insert(*id))
        .collect()
}

/// [`select_tips`], falling back to `[GENESIS_SENTINEL]` when nothing is known.
pub fn select_tips_or_genesis<I, V>(known: I) -> Vec<Digest>
where
    I: IntoIterator<Item = V>,
    V: DagVertex,
{
    let tips = select_tips(known);
    if tips.is_empty() {
        vec![GENESIS_SENTINEL]
    } else {
        tips
    }
}

/// Incremental frontier update after admitting `new_tip`.
///
/// Removes every parent of the new block from `current` and appends the new
/// block. Equivalent to re-running [`select_tips`] when `current` was exact.
pub fn advance_tips(
    current: &[Digest],
    new_tip_parents: &[Digest],
    new_tip: Digest,
) -> Vec<Digest> {
    let parents: HashSet<&Digest> = new_tip_parents.iter().collect();
    let mut tips: Vec<Digest> = current
        .iter()
        .filter(|h| !parents.contains(h) && **h != new_tip)
        .copied()
        .collect();
    tips.push(new_tip);
    tips
}
