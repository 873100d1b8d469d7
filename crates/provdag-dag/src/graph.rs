//! In-memory block DAG.
//!
//! [`BlockDag`] stores blocks in a [`HashMap`] and keeps a forward-edge index
//! (`children`) for descendant queries. Genesis blocks are tracked as roots.
//!
//! # Invariants
//!
//! - Every parent of an inserted block is already present.
//! - Block hashes are unique within the DAG.
//! - The graph is acyclic, since a block can only reference earlier blocks.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use provdag_block::Block;
use provdag_types::Digest;
use tracing::debug;

use crate::error::{DagError, DagResult};
use crate::resolver::{BlockResolver, VertexInfo};

/// A fully materialized block DAG.
#[derive(Clone, Debug, Default)]
pub struct BlockDag {
    blocks: HashMap<Digest, Block>,
    /// parent -> children
    children: HashMap<Digest, Vec<Digest>>,
    roots: Vec<Digest>,
}

impl BlockDag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a DAG from blocks given parents-first (e.g. store append order).
    pub fn from_blocks<I: IntoIterator<Item = Block>>(blocks: I) -> DagResult<Self> {
        let mut dag = Self::new();
        for block in blocks {
            dag.add_block(block)?;
        }
        Ok(dag)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Add a block whose parents are all present.
    pub fn add_block(&mut self, block: Block) -> DagResult<()> {
        if self.blocks.contains_key(&block.hash) {
            return Err(DagError::DuplicateBlock(block.hash));
        }
        if let Some(missing) = block
            .prev_hashes
            .iter()
            .find(|p| !self.blocks.contains_key(*p))
        {
            return Err(DagError::UnresolvedParent(*missing));
        }

        for parent in &block.prev_hashes {
            self.children.entry(*parent).or_default().push(block.hash);
        }
        if block.is_genesis() {
            self.roots.push(block.hash);
        }

        debug!(block = %block.hash.short_hex(), height = block.height, "added DAG block");
        self.blocks.insert(block.hash, block);
        Ok(())
    }

    pub fn get(&self, hash: &Digest) -> Option<&Block> {
        self.blocks.get(hash)
    }

    pub fn contains(&self, hash: &Digest) -> bool {
        self.blocks.contains_key(hash)
    }

    pub fn roots(&self) -> Vec<&Block> {
        self.roots.iter().filter_map(|h| self.blocks.get(h)).collect()
    }

    pub fn children_of(&self, hash: &Digest) -> &[Digest] {
        self.children.get(hash).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Blocks nobody references, sorted by hash.
    pub fn tips(&self) -> Vec<Digest> {
        let mut tips: Vec<Digest> = self
            .blocks
            .keys()
            .filter(|h| self.children_of(h).is_empty())
            .copied()
            .collect();
        tips.sort();
        tips
    }

    /// Ancestors of `hash` up to `max_depth` levels, nearest first.
    /// The block itself is not included.
    pub fn ancestors(&self, hash: &Digest, max_depth: usize) -> Vec<&Block> {
        let Some(start) = self.blocks.get(hash) else {
            return Vec::new();
        };
        self.bfs(*hash, start.prev_hashes.iter().copied(), max_depth, |b| {
            b.prev_hashes.clone()
        })
    }

    /// Descendants of `hash` up to `max_depth` levels, nearest first.
    /// The block itself is not included.
    pub fn descendants(&self, hash: &Digest, max_depth: usize) -> Vec<&Block> {
        if !self.blocks.contains_key(hash) {
            return Vec::new();
        }
        self.bfs(*hash, self.children_of(hash).iter().copied(), max_depth, |b| {
            self.children_of(&b.hash).to_vec()
        })
    }

    fn bfs<'a>(
        &'a self,
        origin: Digest,
        seed: impl Iterator<Item = Digest>,
        max_depth: usize,
        next: impl Fn(&'a Block) -> Vec<Digest>,
    ) -> Vec<&'a Block> {
        let mut visited = HashSet::from([origin]);
        let mut queue: VecDeque<(Digest, usize)> = seed
            .filter(|h| visited.insert(*h))
            .map(|h| (h, 1))
            .collect();
        let mut result = Vec::new();

        while let Some((current, depth)) = queue.pop_front() {
            if depth > max_depth {
                continue;
            }
            if let Some(block) = self.blocks.get(&current) {
                result.push(block);
                if depth < max_depth {
                    for h in next(block) {
                        if visited.insert(h) {
                            queue.push_back((h, depth + 1));
                        }
                    }
                }
            }
        }
        result
    }

    /// Every block reachable from `hash` through references, excluding itself.
    pub fn past_set(&self, hash: &Digest) -> HashSet<Digest> {
        self.ancestors(hash, usize::MAX).into_iter().map(|b| b.hash).collect()
    }

    /// All blocks parents-first. Among blocks that are ready at the same
    /// time, lower weight comes first, then lower hash, so the order is
    /// total and identical on every node holding the same blocks.
    pub fn topological_order(&self) -> Vec<&Block> {
        let mut in_degree: HashMap<Digest, usize> = self
            .blocks
            .values()
            .map(|b| (b.hash, b.prev_hashes.len()))
            .collect();
        let mut ready: BTreeSet<(u64, Digest)> = self
            .blocks
            .values()
            .filter(|b| b.prev_hashes.is_empty())
            .map(|b| (b.dag_weight, b.hash))
            .collect();

        let mut result = Vec::with_capacity(self.blocks.len());
        while let Some(entry) = ready.pop_first() {
            let Some(block) = self.blocks.get(&entry.1) else {
                continue;
            };
            result.push(block);
            for child in self.children_of(&block.hash) {
                if let Some(deg) = in_degree.get_mut(child) {
                    *deg -= 1;
                    if *deg == 0 {
                        if let Some(c) = self.blocks.get(child) {
                            ready.insert((c.dag_weight, c.hash));
                        }
                    }
                }
            }
        }
        result
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }
}

impl BlockResolver for BlockDag {
    fn resolve(&self, hash: &Digest) -> DagResult<Option<VertexInfo>> {
        Ok(self.blocks.get(hash).map(VertexInfo::from))
    }
}

/// Order a batch of blocks parents-first.
///
/// References to blocks outside the batch count as already satisfied. Blocks
/// caught in a reference cycle (only possible with forged hashes) are left
/// out of the result.
pub fn order_batch(blocks: Vec<Block>) -> Vec<Block> {
    let in_batch: HashSet<Digest> = blocks.iter().map(|b| b.hash).collect();
    let mut pending: HashMap<Digest, Block> = HashMap::new();
    let mut in_degree: HashMap<Digest, usize> = HashMap::new();
    let mut children: HashMap<Digest, Vec<Digest>> = HashMap::new();
    for block in blocks {
        let local: Vec<Digest> = block
            .prev_hashes
            .iter()
            .filter(|p| in_batch.contains(*p))
            .copied()
            .collect();
        for parent in &local {
            children.entry(*parent).or_default().push(block.hash);
        }
        in_degree.insert(block.hash, local.len());
        pending.insert(block.hash, block);
    }

    let mut ready: BTreeSet<(i64, Digest)> = pending
        .values()
        .filter(|b| in_degree.get(&b.hash) == Some(&0))
        .map(|b| (b.timestamp, b.hash))
        .collect();
    let mut ordered = Vec::with_capacity(pending.len());
    while let Some((_, hash)) = ready.pop_first() {
        let Some(block) = pending.remove(&hash) else {
            continue;
        };
        for child in children.get(&hash).map(Vec::as_slice).unwrap_or(&[]) {
            if let Some(deg) = in_degree.get_mut(child) {
                *deg -= 1;
                if *deg == 0 {
                    if let Some(c) = pending.get(child) {
                        ready.insert((c.timestamp, c.hash));
                    }
                }
            }
        }
        ordered.push(block);
    }
    ordered
}
