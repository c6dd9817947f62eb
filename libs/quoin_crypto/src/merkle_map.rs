use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use slotmap::{SlotMap, new_key_type};

use crate::{
    hashing::{DefaultHash, HashFunction},
    types::StdByteArray,
};

new_key_type! { pub struct NodeKey; }

/// Account balances are committed to with a sparse Merkle map: one leaf per
/// possible 32-byte account key, one tree level per key bit (MSB first).
/// Every path exists implicitly; subtrees never touched by a `set` hash to a
/// precomputed per-level empty hash, so only the nodes along written paths
/// are materialized.
///
/// The root is a pure function of the stored (key, value) entries. A value
/// of zero is the default leaf, which makes `set(key, 0)` indistinguishable
/// from never having written the key.
pub const MAP_DEPTH: usize = 256;

pub(crate) struct MapNode {
    pub(crate) left: Option<NodeKey>,
    pub(crate) right: Option<NodeKey>,
    pub(crate) hash: StdByteArray,
}

impl MapNode {
    fn new(hash: StdByteArray) -> Self {
        MapNode {
            left: None,
            right: None,
            hash,
        }
    }
}

pub struct MerkleMap {
    pub(crate) nodes: SlotMap<NodeKey, MapNode>,
    pub(crate) root: NodeKey,
    entries: HashMap<StdByteArray, u64>,
    // empty[h] is the hash of an untouched subtree of height h
    empty: Vec<StdByteArray>,
}

/// Whether the path for `key` branches right at `depth` (0 = root junction).
pub(crate) fn bit_at(key: &StdByteArray, depth: usize) -> bool {
    (key[depth / 8] >> (7 - (depth % 8))) & 1 == 1
}

fn leaf_hash(value: u64, hasher: &mut impl HashFunction) -> StdByteArray {
    hasher.update(value.to_le_bytes());
    hasher.digest().expect("Hashing failed")
}

impl Default for MerkleMap {
    fn default() -> Self {
        Self::new()
    }
}

impl MerkleMap {
    /// Creates a new empty map. The empty-subtree hashes for every level are
    /// derived once here from the zero-balance leaf.
    pub fn new() -> Self {
        let mut hasher = DefaultHash::new();
        let mut empty = Vec::with_capacity(MAP_DEPTH + 1);
        empty.push(leaf_hash(0, &mut hasher));
        for height in 1..=MAP_DEPTH {
            hasher.update(empty[height - 1]);
            hasher.update(empty[height - 1]);
            empty.push(hasher.digest().expect("Hashing failed"));
        }
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(MapNode::new(empty[MAP_DEPTH]));
        MerkleMap {
            nodes,
            root,
            entries: HashMap::new(),
            empty,
        }
    }

    /// Returns the stored balance for `key`, or 0 if the key was never set.
    pub fn get(&self, key: &StdByteArray) -> u64 {
        self.entries.get(key).copied().unwrap_or(0)
    }

    /// The current root commitment.
    pub fn root(&self) -> StdByteArray {
        self.nodes[self.root].hash
    }

    /// All entries with a non-zero balance.
    pub fn entries(&self) -> impl Iterator<Item = (&StdByteArray, &u64)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Overwrites the leaf at `key` and returns the new root.
    ///
    /// Materializes the path down to the leaf, rewrites the leaf hash, then
    /// recomputes every junction back up to the root. The resulting root
    /// depends only on the final entry set, never on write order.
    pub fn set(&mut self, key: StdByteArray, value: u64) -> StdByteArray {
        if value == 0 {
            self.entries.remove(&key);
        } else {
            self.entries.insert(key, value);
        }
        let mut hasher = DefaultHash::new();
        let mut path = Vec::with_capacity(MAP_DEPTH);
        let mut current = self.root;
        for depth in 0..MAP_DEPTH {
            path.push(current);
            let go_right = bit_at(&key, depth);
            let node = self.nodes.get(current).expect("Node not found");
            let child = if go_right { node.right } else { node.left };
            current = match child {
                Some(child) => child,
                None => {
                    let child = self
                        .nodes
                        .insert(MapNode::new(self.empty[MAP_DEPTH - depth - 1]));
                    let node = self.nodes.get_mut(current).expect("Node not found");
                    if go_right {
                        node.right = Some(child);
                    } else {
                        node.left = Some(child);
                    }
                    child
                }
            };
        }
        self.nodes.get_mut(current).expect("Node not found").hash = leaf_hash(value, &mut hasher);
        for depth in (0..MAP_DEPTH).rev() {
            let junction = path[depth];
            let child_empty = self.empty[MAP_DEPTH - depth - 1];
            let node = self.nodes.get(junction).expect("Node not found");
            let left = node.left.map(|k| self.nodes[k].hash).unwrap_or(child_empty);
            let right = node.right.map(|k| self.nodes[k].hash).unwrap_or(child_empty);
            hasher.update(left);
            hasher.update(right);
            self.nodes.get_mut(junction).expect("Node not found").hash =
                hasher.digest().expect("Hashing failed");
        }
        self.root()
    }

    /// Builds the authentication path for `key` against the current root.
    ///
    /// The witness is only valid for the root at the time of generation and
    /// must be regenerated after any mutation of the map. A witness for an
    /// unset key authenticates the default value 0.
    pub fn witness(&self, key: &StdByteArray) -> LedgerWitness {
        let mut siblings = vec![[0u8; 32]; MAP_DEPTH];
        let mut current = Some(self.root);
        for depth in 0..MAP_DEPTH {
            let child_empty = self.empty[MAP_DEPTH - depth - 1];
            let (sibling, next) = match current {
                Some(node_key) => {
                    let node = &self.nodes[node_key];
                    let (next, sibling) = if bit_at(key, depth) {
                        (node.right, node.left)
                    } else {
                        (node.left, node.right)
                    };
                    (
                        sibling.map(|k| self.nodes[k].hash).unwrap_or(child_empty),
                        next,
                    )
                }
                None => (child_empty, None),
            };
            // stored leaf-adjacent first, the order verification folds in
            siblings[MAP_DEPTH - depth - 1] = sibling;
            current = next;
        }
        LedgerWitness {
            key: *key,
            siblings,
        }
    }
}

/// Authentication path proving one (key, value) pair against a map root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerWitness {
    pub key: StdByteArray,
    // sibling hashes from the leaf level up to the root
    pub siblings: Vec<StdByteArray>,
}

impl LedgerWitness {
    /// Folds `value` up through the sibling path and returns the root the
    /// map would have if this key held `value` and everything else were
    /// unchanged. `None` if the witness is malformed.
    ///
    /// This is how a verifier derives the post-operation root without
    /// holding the map: fold the new balance through the same path.
    pub fn compute_root(
        &self,
        value: u64,
        hasher: &mut impl HashFunction,
    ) -> Option<StdByteArray> {
        if self.siblings.len() != MAP_DEPTH {
            return None;
        }
        let mut current = leaf_hash(value, hasher);
        for (level, sibling) in self.siblings.iter().enumerate() {
            let depth = MAP_DEPTH - level - 1;
            if bit_at(&self.key, depth) {
                hasher.update(sibling);
                hasher.update(current);
            } else {
                hasher.update(current);
                hasher.update(sibling);
            }
            current = hasher.digest().expect("Hashing failed");
        }
        Some(current)
    }

    /// `true` when this witness authenticates `value` against `root`. Any
    /// change to the map after generation breaks verification unless the
    /// root itself was unchanged.
    pub fn verify(&self, value: u64, root: StdByteArray, hasher: &mut impl HashFunction) -> bool {
        self.compute_root(value, hasher) == Some(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(tag: u8) -> StdByteArray {
        let mut k = [0u8; 32];
        k[0] = tag;
        k[31] = tag.wrapping_mul(7);
        k
    }

    #[test]
    fn test_get_unset_is_zero() {
        let map = MerkleMap::new();
        assert_eq!(map.get(&key(1)), 0);
        assert!(map.is_empty());
    }

    #[test]
    fn test_set_and_get() {
        let mut map = MerkleMap::new();
        map.set(key(1), 1000);
        map.set(key(2), 250);
        assert_eq!(map.get(&key(1)), 1000);
        assert_eq!(map.get(&key(2)), 250);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_overwrite_updates_root() {
        let mut map = MerkleMap::new();
        let r1 = map.set(key(1), 100);
        let r2 = map.set(key(1), 200);
        assert_ne!(r1, r2);
        assert_eq!(map.get(&key(1)), 200);
    }

    #[test]
    fn test_root_is_insertion_order_independent() {
        let mut a = MerkleMap::new();
        a.set(key(1), 1);
        a.set(key(2), 2);
        let mut b = MerkleMap::new();
        b.set(key(2), 2);
        b.set(key(1), 1);
        assert_eq!(a.root(), b.root());
    }

    #[test]
    fn test_set_zero_matches_untouched_map() {
        let fresh = MerkleMap::new();
        let mut map = MerkleMap::new();
        map.set(key(3), 500);
        map.set(key(3), 0);
        assert_eq!(map.root(), fresh.root());
        assert_eq!(map.get(&key(3)), 0);
        assert!(map.is_empty());
    }

    #[test]
    fn test_witness_verifies_against_current_root() {
        let mut map = MerkleMap::new();
        map.set(key(1), 1000);
        map.set(key(2), 42);
        let witness = map.witness(&key(1));
        let mut hasher = DefaultHash::new();
        assert!(witness.verify(1000, map.root(), &mut hasher));
        assert!(!witness.verify(999, map.root(), &mut hasher));
    }

    #[test]
    fn test_witness_for_unset_key_proves_zero() {
        let mut map = MerkleMap::new();
        map.set(key(1), 77);
        let witness = map.witness(&key(9));
        let mut hasher = DefaultHash::new();
        assert!(witness.verify(0, map.root(), &mut hasher));
        assert!(!witness.verify(77, map.root(), &mut hasher));
    }

    #[test]
    fn test_witness_goes_stale_after_mutation() {
        let mut map = MerkleMap::new();
        map.set(key(1), 1000);
        let witness = map.witness(&key(1));
        map.set(key(2), 5);
        let mut hasher = DefaultHash::new();
        assert!(!witness.verify(1000, map.root(), &mut hasher));
        // regenerated against the new root, it holds again
        let fresh = map.witness(&key(1));
        assert!(fresh.verify(1000, map.root(), &mut hasher));
    }

    #[test]
    fn test_compute_root_predicts_mutation() {
        let mut map = MerkleMap::new();
        map.set(key(1), 100);
        map.set(key(2), 9);
        let witness = map.witness(&key(1));
        let mut hasher = DefaultHash::new();
        let predicted = witness.compute_root(250, &mut hasher).unwrap();
        assert_eq!(predicted, map.set(key(1), 250));
    }

    #[test]
    fn test_replay_reproduces_root() {
        let mut original = MerkleMap::new();
        original.set(key(1), 1000);
        original.set(key(2), 31);
        original.set(key(5), 8);

        let mut replayed = MerkleMap::new();
        for (k, v) in original.entries() {
            replayed.set(*k, *v);
        }
        assert_eq!(original.root(), replayed.root());
    }
}
