use provdag_types::Digest;
use serde::{Deserialize, Serialize};

/// Side of a sibling in a Merkle proof path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Left,
    Right,
}

/// Merkle root over transaction hashes.
///
/// - `[]` yields the all-zero digest.
/// - `[h]` yields `h`.
/// - Otherwise each level is padded to even length by duplicating its last
///   element and adjacent pairs are hashed as `hash(left ++ right)` until a
///   single digest remains.
pub fn merkle_root(leaves: &[Digest]) -> Digest {
    match leaves {
        [] => Digest::zero(),
        [single] => *single,
        _ => {
            let mut current = leaves.to_vec();
            while current.len() > 1 {
                current = next_level(&current);
            }
            current[0]
        }
    }
}

/// Binary Merkle tree for proofs of inclusion.
///
/// Built from the ordered transaction hashes of a block; its root equals
/// [`merkle_root`] over the same leaves.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    root: Digest,
    leaves: Vec<Digest>,
    /// Level 0 = leaves, last element = root.
    levels: Vec<Vec<Digest>>,
}

impl MerkleTree {
    /// Build a Merkle tree from leaf digests.
    pub fn from_leaves(leaves: Vec<Digest>) -> Self {
        if leaves.is_empty() {
            return Self {
                root: Digest::zero(),
                leaves: vec![],
                levels: vec![],
            };
        }

        let mut levels: Vec<Vec<Digest>> = vec![leaves.clone()];
        let mut current = leaves.clone();
        while current.len() > 1 {
            let next = next_level(&current);
            levels.push(next.clone());
            current = next;
        }

        Self {
            root: current[0],
            leaves,
            levels,
        }
    }

    /// The root hash of the tree.
    pub fn root(&self) -> Digest {
        self.root
    }

    /// Number of leaves.
    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Generate an inclusion proof for the leaf at `index`.
    pub fn proof(&self, index: usize) -> Option<MerkleProof> {
        if index >= self.leaves.len() || self.levels.is_empty() {
            return None;
        }

        let mut path = Vec::new();
        let mut idx = index;

        for level in &self.levels[..self.levels.len() - 1] {
            let sibling_idx = if idx % 2 == 0 { idx + 1 } else { idx - 1 };
            // An unpaired last node is paired with itself.
            let sibling = level.get(sibling_idx).copied().unwrap_or(level[idx]);
            let side = if idx % 2 == 0 { Side::Right } else { Side::Left };
            path.push((sibling, side));
            idx /= 2;
        }

        Some(MerkleProof {
            leaf: self.leaves[index],
            path,
            root: self.root,
        })
    }

    /// Position of a leaf, if present.
    pub fn position(&self, leaf: &Digest) -> Option<usize> {
        self.leaves.iter().position(|l| l == leaf)
    }
}

/// Merkle inclusion proof.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// The leaf being proven.
    pub leaf: Digest,
    /// Path of (sibling_hash, sibling_side) pairs from leaf to root.
    pub path: Vec<(Digest, Side)>,
    /// Expected root hash.
    pub root: Digest,
}

impl MerkleProof {
    /// Recompute the root from the leaf and path and compare.
    pub fn verify(&self) -> bool {
        let mut current = self.leaf;
        for (sibling, side) in &self.path {
            current = match side {
                Side::Left => hash_pair(sibling, &current),
                Side::Right => hash_pair(&current, sibling),
            };
        }
        current == self.root
    }
}

fn next_level(current: &[Digest]) -> Vec<Digest> {
    current
        .chunks(2)
        .map(|pair| match pair {
            [left, right] => hash_pair(left, right),
            [odd] => hash_pair(odd, odd),
            _ => unreachable!("chunks(2) yields one or two elements"),
        })
        .collect()
}

fn hash_pair(left: &Digest, right: &Digest) -> Digest {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(left.as_bytes());
    buf[32..].copy_from_slice(right.as_bytes());
    Digest::of(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn leaf(seed: u8) -> Digest {
        Digest::of(&[seed])
    }

    fn concat(a: &Digest, b: &Digest) -> Vec<u8> {
        [a.as_bytes().as_slice(), b.as_bytes().as_slice()].concat()
    }

    #[test]
    fn empty_root_is_zero() {
        assert_eq!(merkle_root(&[]), Digest::zero());
        assert!(MerkleTree::from_leaves(vec![]).root().is_zero());
    }

    #[test]
    fn single_leaf_is_root() {
        let l = leaf(1);
        assert_eq!(merkle_root(&[l]), l);
        assert_eq!(MerkleTree::from_leaves(vec![l]).root(), l);
    }

    #[test]
    fn two_leaves_hash_concatenation() {
        let (a, b) = (leaf(1), leaf(2));
        assert_eq!(merkle_root(&[a, b]), Digest::of(&concat(&a, &b)));
    }

    #[test]
    fn odd_level_duplicates_last() {
        let (a, b, c) = (leaf(1), leaf(2), leaf(3));
        let ab = Digest::of(&concat(&a, &b));
        let cc = Digest::of(&concat(&c, &c));
        let expected = Digest::of(&concat(&ab, &cc));
        assert_eq!(merkle_root(&[a, b, c]), expected);
    }

    #[test]
    fn order_matters() {
        assert_ne!(merkle_root(&[leaf(1), leaf(2)]), merkle_root(&[leaf(2), leaf(1)]));
    }

    #[test]
    fn proof_verifies_for_all_leaves() {
        let leaves: Vec<Digest> = (0..7).map(leaf).collect();
        let tree = MerkleTree::from_leaves(leaves.clone());
        for (i, l) in leaves.iter().enumerate() {
            let proof = tree.proof(i).expect("proof should exist");
            assert_eq!(proof.leaf, *l);
            assert!(proof.verify(), "proof for leaf {i} should verify");
        }
    }

    #[test]
    fn proof_out_of_bounds_returns_none() {
        let tree = MerkleTree::from_leaves(vec![leaf(1), leaf(2)]);
        assert!(tree.proof(5).is_none());
    }

    #[test]
    fn tampered_proof_fails_verification() {
        let tree = MerkleTree::from_leaves(vec![leaf(1), leaf(2), leaf(3), leaf(4)]);
        let mut proof = tree.proof(0).unwrap();
        proof.leaf = leaf(99);
        assert!(!proof.verify());
    }

    #[test]
    fn power_of_two_proof_length() {
        let tree = MerkleTree::from_leaves((0..8).map(leaf).collect());
        for i in 0..8 {
            assert_eq!(tree.proof(i).unwrap().path.len(), 3);
        }
    }

    #[test]
    fn position_finds_leaf() {
        let tree = MerkleTree::from_leaves(vec![leaf(1), leaf(2), leaf(3)]);
        assert_eq!(tree.position(&leaf(3)), Some(2));
        assert_eq!(tree.position(&leaf(9)), None);
    }

    proptest! {
        #[test]
        fn tree_root_matches_free_function(seeds in proptest::collection::vec(any::<u8>(), 0..40)) {
            let leaves: Vec<Digest> = seeds.iter().map(|s| leaf(*s)).collect();
            prop_assert_eq!(MerkleTree::from_leaves(leaves.clone()).root(), merkle_root(&leaves));
        }
    }
}
