//! Sparse Merkle Tree Implementation
//!
//! Key-value tree over field elements with a fixed maximum depth. The path of
//! a key is given by its bits, least significant first. A leaf sits at the
//! shallowest level where its path no longer collides with another key, so a
//! tree with `n` keys has roughly `log2(n)` levels instead of the full depth.
//!
//! Node hashes:
//! - empty node: `0`
//! - leaf: `H(key, value, 1)`
//! - internal node: `H(left, right)`
//!
//! Nodes are stored content-addressed by hash, and nodes are never removed
//! from the store, so proofs can still be generated against any earlier root
//! of the same tree.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::crypto::hash::{hash_leaf, hash_node};
use crate::types::error::{IdentityError, Result};
use crate::types::field::FieldElement;

/// Depth used by identity trees
pub const DEFAULT_LEVELS: u32 = 32;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Node {
    Empty,
    Leaf {
        key: FieldElement,
        value: FieldElement,
    },
    Middle {
        left: FieldElement,
        right: FieldElement,
    },
}

impl Node {
    fn hash(&self) -> Result<FieldElement> {
        match self {
            Node::Empty => Ok(FieldElement::ZERO),
            Node::Leaf { key, value } => hash_leaf(key, value),
            Node::Middle { left, right } => hash_node(left, right),
        }
    }
}

/// Leaf met at the end of a non-existence path
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAux {
    pub key: FieldElement,
    pub value: FieldElement,
}

/// Existence or non-existence proof for a key
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proof {
    pub existence: bool,
    /// Sibling hashes from the leaf level up to the root
    pub siblings: Vec<FieldElement>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_aux: Option<NodeAux>,
}

impl Proof {
    /// Depth at which the proven path ends.
    pub fn depth(&self) -> usize {
        self.siblings.len()
    }

    /// Recompute the root this proof commits to for `key` (and `value` when
    /// proving existence).
    pub fn root(&self, key: &FieldElement, value: &FieldElement) -> Result<FieldElement> {
        let mut hash = if self.existence {
            hash_leaf(key, value)?
        } else if let Some(aux) = &self.node_aux {
            if aux.key == *key {
                return Err(IdentityError::merkle(
                    "non-existence proof ends at a leaf with the queried key",
                ));
            }
            hash_leaf(&aux.key, &aux.value)?
        } else {
            FieldElement::ZERO
        };

        let depth = self.siblings.len();
        for (offset, sibling) in self.siblings.iter().enumerate() {
            let level = depth - 1 - offset;
            hash = if key.test_bit(level) {
                hash_node(sibling, &hash)?
            } else {
                hash_node(&hash, sibling)?
            };
        }
        Ok(hash)
    }

    /// True when the proof is valid for `key`/`value` under `root`.
    ///
    /// For a non-existence proof the value is ignored.
    pub fn verify(&self, root: &FieldElement, key: &FieldElement, value: &FieldElement) -> bool {
        matches!(self.root(key, value), Ok(computed) if computed == *root)
    }
}

#[derive(Clone, Debug)]
pub struct SparseMerkleTree {
    root: FieldElement,
    nodes: HashMap<FieldElement, Node>,
    max_levels: u32,
    leaf_count: usize,
}

impl Default for SparseMerkleTree {
    fn default() -> Self {
        Self::new(DEFAULT_LEVELS)
    }
}

impl SparseMerkleTree {
    /// Create an empty tree with at most `max_levels` levels
    pub fn new(max_levels: u32) -> Self {
        SparseMerkleTree {
            root: FieldElement::ZERO,
            nodes: HashMap::new(),
            max_levels: max_levels.max(2),
            leaf_count: 0,
        }
    }

    pub fn root(&self) -> FieldElement {
        self.root
    }

    pub fn max_levels(&self) -> u32 {
        self.max_levels
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    fn node(&self, hash: &FieldElement) -> Result<Node> {
        if hash.is_zero() {
            return Ok(Node::Empty);
        }
        self.nodes
            .get(hash)
            .cloned()
            .ok_or_else(|| IdentityError::merkle(format!("node {} not found", hash)))
    }

    fn store(&mut self, node: Node) -> Result<FieldElement> {
        let hash = node.hash()?;
        if node != Node::Empty {
            self.nodes.insert(hash, node);
        }
        Ok(hash)
    }

    /// Insert a new key. Fails with `KeyExists` if the key is present.
    pub fn add(&mut self, key: FieldElement, value: FieldElement) -> Result<FieldElement> {
        let root = self.add_leaf(key, value, self.root, 0)?;
        self.root = root;
        self.leaf_count += 1;
        trace!(%key, %root, "added leaf");
        Ok(root)
    }

    fn add_leaf(
        &mut self,
        key: FieldElement,
        value: FieldElement,
        current: FieldElement,
        level: u32,
    ) -> Result<FieldElement> {
        if level > self.max_levels - 1 {
            return Err(IdentityError::ReachedMaxLevel(self.max_levels));
        }
        match self.node(&current)? {
            Node::Empty => self.store(Node::Leaf { key, value }),
            Node::Leaf {
                key: old_key,
                value: old_value,
            } => {
                if old_key == key {
                    return Err(IdentityError::KeyExists(key.to_string()));
                }
                let old_hash = hash_leaf(&old_key, &old_value)?;
                self.push_leaf(key, value, old_key, old_hash, level)
            }
            Node::Middle { left, right } => {
                let node = if key.test_bit(level as usize) {
                    let right = self.add_leaf(key, value, right, level + 1)?;
                    Node::Middle { left, right }
                } else {
                    let left = self.add_leaf(key, value, left, level + 1)?;
                    Node::Middle { left, right }
                };
                self.store(node)
            }
        }
    }

    /// Push an existing leaf down until its path diverges from the new key.
    fn push_leaf(
        &mut self,
        key: FieldElement,
        value: FieldElement,
        old_key: FieldElement,
        old_hash: FieldElement,
        level: u32,
    ) -> Result<FieldElement> {
        if level > self.max_levels - 2 {
            return Err(IdentityError::ReachedMaxLevel(self.max_levels));
        }
        let new_bit = key.test_bit(level as usize);
        if new_bit == old_key.test_bit(level as usize) {
            let next = self.push_leaf(key, value, old_key, old_hash, level + 1)?;
            let node = if new_bit {
                Node::Middle {
                    left: FieldElement::ZERO,
                    right: next,
                }
            } else {
                Node::Middle {
                    left: next,
                    right: FieldElement::ZERO,
                }
            };
            return self.store(node);
        }

        let new_hash = self.store(Node::Leaf { key, value })?;
        let node = if new_bit {
            Node::Middle {
                left: old_hash,
                right: new_hash,
            }
        } else {
            Node::Middle {
                left: new_hash,
                right: old_hash,
            }
        };
        self.store(node)
    }

    /// Walk the path of `key` from `root`, returning the siblings (top-down)
    /// and the node the path ends at.
    fn walk(&self, key: &FieldElement, root: FieldElement) -> Result<(Vec<FieldElement>, Node)> {
        let mut siblings = Vec::new();
        let mut current = root;
        for level in 0..self.max_levels {
            match self.node(&current)? {
                Node::Middle { left, right } => {
                    if key.test_bit(level as usize) {
                        siblings.push(left);
                        current = right;
                    } else {
                        siblings.push(right);
                        current = left;
                    }
                }
                end => return Ok((siblings, end)),
            }
        }
        Err(IdentityError::ReachedMaxLevel(self.max_levels))
    }

    /// Rebuild the path of `key` bottom-up starting from `hash` at depth
    /// `siblings.len()`.
    fn rebuild_path(
        &mut self,
        key: &FieldElement,
        mut hash: FieldElement,
        siblings: &[FieldElement],
    ) -> Result<FieldElement> {
        for (level, sibling) in siblings.iter().enumerate().rev() {
            let node = if key.test_bit(level) {
                Node::Middle {
                    left: *sibling,
                    right: hash,
                }
            } else {
                Node::Middle {
                    left: hash,
                    right: *sibling,
                }
            };
            hash = self.store(node)?;
        }
        Ok(hash)
    }

    /// Value stored under `key`.
    pub fn get(&self, key: &FieldElement) -> Result<FieldElement> {
        match self.walk(key, self.root)? {
            (_, Node::Leaf { key: found, value }) if found == *key => Ok(value),
            _ => Err(IdentityError::KeyNotFound(key.to_string())),
        }
    }

    pub fn contains(&self, key: &FieldElement) -> Result<bool> {
        match self.get(key) {
            Ok(_) => Ok(true),
            Err(IdentityError::KeyNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Replace the value of an existing key.
    pub fn update(&mut self, key: FieldElement, value: FieldElement) -> Result<FieldElement> {
        let (siblings, end) = self.walk(&key, self.root)?;
        match end {
            Node::Leaf { key: found, .. } if found == key => {
                let leaf = self.store(Node::Leaf { key, value })?;
                self.root = self.rebuild_path(&key, leaf, &siblings)?;
                Ok(self.root)
            }
            _ => Err(IdentityError::KeyNotFound(key.to_string())),
        }
    }

    /// Remove a key, collapsing the path so the tree stays canonical: the
    /// resulting root equals the root of a tree built without the key.
    pub fn delete(&mut self, key: &FieldElement) -> Result<FieldElement> {
        let (siblings, end) = self.walk(key, self.root)?;
        match end {
            Node::Leaf { key: found, .. } if found == *key => {}
            _ => return Err(IdentityError::KeyNotFound(key.to_string())),
        }

        let root = match siblings.split_last() {
            None => FieldElement::ZERO,
            Some((last, upper)) => match self.node(last)? {
                Node::Leaf { .. } => {
                    // A lone leaf sibling moves up past every empty sibling.
                    match upper.iter().rposition(|sibling| !sibling.is_zero()) {
                        Some(level) => self.rebuild_path(key, *last, &siblings[..=level])?,
                        None => *last,
                    }
                }
                _ => self.rebuild_path(key, FieldElement::ZERO, &siblings)?,
            },
        };

        self.root = root;
        self.leaf_count -= 1;
        trace!(%key, %root, "deleted leaf");
        Ok(root)
    }

    /// Proof for `key` against `root` (the current root when `None`).
    ///
    /// Returns the proof and, when the key exists, its value.
    pub fn generate_proof(
        &self,
        key: &FieldElement,
        root: Option<FieldElement>,
    ) -> Result<(Proof, Option<FieldElement>)> {
        let root = root.unwrap_or(self.root);
        let (mut siblings, end) = self.walk(key, root)?;
        siblings.reverse();

        Ok(match end {
            Node::Leaf { key: found, value } if found == *key => (
                Proof {
                    existence: true,
                    siblings,
                    node_aux: None,
                },
                Some(value),
            ),
            Node::Leaf { key: found, value } => (
                Proof {
                    existence: false,
                    siblings,
                    node_aux: Some(NodeAux { key: found, value }),
                },
                None,
            ),
            _ => (
                Proof {
                    existence: false,
                    siblings,
                    node_aux: None,
                },
                None,
            ),
        })
    }

    /// Existence proof for `key` at the current root.
    pub fn prove_existence(&self, key: &FieldElement) -> Result<(Proof, FieldElement)> {
        match self.generate_proof(key, None)? {
            (proof, Some(value)) => Ok((proof, value)),
            _ => Err(IdentityError::KeyNotFound(key.to_string())),
        }
    }

    /// Non-existence proof for `key` at the current root.
    pub fn prove_non_existence(&self, key: &FieldElement) -> Result<Proof> {
        match self.generate_proof(key, None)? {
            (proof, None) => Ok(proof),
            _ => Err(IdentityError::KeyExists(key.to_string())),
        }
    }
}

/// Free-function API over [`SparseMerkleTree`]
pub mod sparse_merkle {
    use super::*;

    /// Create a new tree
    ///
    /// # Arguments
    /// * `max_levels` - The maximum depth of the tree
    pub fn create_tree(max_levels: u32) -> SparseMerkleTree {
        SparseMerkleTree::new(max_levels)
    }

    /// Verify a proof
    ///
    /// # Arguments
    /// * `root` - The root the proof must reproduce
    /// * `proof` - The existence or non-existence proof
    /// * `key` - The proven key
    /// * `value` - The proven value (ignored for non-existence)
    ///
    /// # Returns
    /// * `bool` - Whether the proof is valid
    pub fn verify_proof(
        root: &FieldElement,
        proof: &Proof,
        key: &FieldElement,
        value: &FieldElement,
    ) -> bool {
        proof.verify(root, key, value)
    }

    /// Recompute the root committed to by a proof
    ///
    /// # Returns
    /// * `Result<FieldElement>` - The root, or an error for a malformed proof
    pub fn root_from_proof(
        proof: &Proof,
        key: &FieldElement,
        value: &FieldElement,
    ) -> Result<FieldElement> {
        proof.root(key, value)
    }
}

pub use sparse_merkle::{create_tree, root_from_proof, verify_proof};

#[cfg(test)]
mod tests {
    use super::*;

    fn fe(value: u64) -> FieldElement {
        FieldElement::from_u64(value)
    }

    #[test]
    fn test_empty_tree() {
        let tree = SparseMerkleTree::new(DEFAULT_LEVELS);
        assert_eq!(tree.root(), FieldElement::ZERO);
        assert_eq!(tree.leaf_count(), 0);
    }

    #[test]
    fn test_single_leaf_is_root() -> Result<()> {
        let mut tree = SparseMerkleTree::new(DEFAULT_LEVELS);
        let root = tree.add(fe(1), fe(10))?;
        assert_eq!(root, hash_leaf(&fe(1), &fe(10))?);

        let (proof, value) = tree.generate_proof(&fe(1), None)?;
        assert!(proof.existence);
        assert_eq!(value, Some(fe(10)));
        assert!(proof.siblings.is_empty());
        assert!(proof.verify(&root, &fe(1), &fe(10)));
        Ok(())
    }

    #[test]
    fn test_collision_pushes_leaf_down() -> Result<()> {
        // 0b0001 and 0b0101 share the two lowest bits and split at bit 2.
        let mut tree = SparseMerkleTree::new(DEFAULT_LEVELS);
        tree.add(fe(0b0001), fe(1))?;
        let root = tree.add(fe(0b0101), fe(2))?;

        let (proof, _) = tree.generate_proof(&fe(0b0101), None)?;
        assert_eq!(proof.depth(), 3);
        assert_eq!(proof.siblings[1], FieldElement::ZERO);
        assert_eq!(proof.siblings[2], FieldElement::ZERO);
        assert!(proof.verify(&root, &fe(0b0101), &fe(2)));
        Ok(())
    }

    #[test]
    fn test_duplicate_key() -> Result<()> {
        let mut tree = SparseMerkleTree::new(DEFAULT_LEVELS);
        tree.add(fe(5), fe(1))?;
        assert!(matches!(
            tree.add(fe(5), fe(2)),
            Err(IdentityError::KeyExists(_))
        ));
        assert_eq!(tree.get(&fe(5))?, fe(1));
        assert_eq!(tree.leaf_count(), 1);
        Ok(())
    }

    #[test]
    fn test_max_level() -> Result<()> {
        let mut tree = SparseMerkleTree::new(4);
        tree.add(fe(0b0000), fe(1))?;
        assert!(matches!(
            tree.add(fe(0b1_0000), fe(2)),
            Err(IdentityError::ReachedMaxLevel(4))
        ));
        Ok(())
    }

    #[test]
    fn test_non_existence_proofs() -> Result<()> {
        let mut tree = SparseMerkleTree::new(DEFAULT_LEVELS);
        tree.add(fe(0b01), fe(1))?;
        tree.add(fe(0b10), fe(2))?;
        let root = tree.root();

        // Ends at a different leaf sharing the path prefix.
        let proof = tree.prove_non_existence(&fe(0b11))?;
        assert!(!proof.existence);
        assert_eq!(
            proof.node_aux,
            Some(NodeAux {
                key: fe(0b01),
                value: fe(1)
            })
        );
        assert!(proof.verify(&root, &fe(0b11), &FieldElement::ZERO));

        // The same proof cannot be reused for the leaf it ends at.
        assert!(!proof.verify(&root, &fe(0b01), &fe(1)));
        assert!(tree.prove_non_existence(&fe(0b01)).is_err());
        Ok(())
    }

    #[test]
    fn test_tampered_proof_fails() -> Result<()> {
        let mut tree = SparseMerkleTree::new(DEFAULT_LEVELS);
        for key in 0..8u64 {
            tree.add(fe(key), fe(key * 100))?;
        }
        let root = tree.root();
        let (mut proof, _) = tree.prove_existence(&fe(3))?;
        assert!(proof.verify(&root, &fe(3), &fe(300)));
        assert!(!proof.verify(&root, &fe(3), &fe(301)));

        proof.siblings[0] = fe(12345);
        assert!(!proof.verify(&root, &fe(3), &fe(300)));
        Ok(())
    }

    #[test]
    fn test_update() -> Result<()> {
        let mut tree = SparseMerkleTree::new(DEFAULT_LEVELS);
        tree.add(fe(1), fe(1))?;
        tree.add(fe(2), fe(2))?;
        let before = tree.root();

        let after = tree.update(fe(2), fe(20))?;
        assert_ne!(before, after);
        assert_eq!(tree.get(&fe(2))?, fe(20));
        assert!(matches!(
            tree.update(fe(3), fe(3)),
            Err(IdentityError::KeyNotFound(_))
        ));

        let mut rebuilt = SparseMerkleTree::new(DEFAULT_LEVELS);
        rebuilt.add(fe(1), fe(1))?;
        rebuilt.add(fe(2), fe(20))?;
        assert_eq!(rebuilt.root(), after);
        Ok(())
    }

    #[test]
    fn test_delete_restores_canonical_root() -> Result<()> {
        let keys = [0b0001u64, 0b0101, 0b0011, 0b1000, 0b1101];
        let mut tree = SparseMerkleTree::new(DEFAULT_LEVELS);
        for key in keys {
            tree.add(fe(key), fe(key + 1))?;
        }

        for removed in keys {
            let mut pruned = tree.clone();
            pruned.delete(&fe(removed))?;

            let mut expected = SparseMerkleTree::new(DEFAULT_LEVELS);
            for key in keys.iter().filter(|k| **k != removed) {
                expected.add(fe(*key), fe(*key + 1))?;
            }
            assert_eq!(pruned.root(), expected.root(), "removing {:#b}", removed);
        }

        let mut single = SparseMerkleTree::new(DEFAULT_LEVELS);
        single.add(fe(9), fe(9))?;
        assert_eq!(single.delete(&fe(9))?, FieldElement::ZERO);
        assert!(matches!(
            single.delete(&fe(9)),
            Err(IdentityError::KeyNotFound(_))
        ));
        Ok(())
    }

    #[test]
    fn test_historical_proofs() -> Result<()> {
        let mut tree = SparseMerkleTree::new(DEFAULT_LEVELS);
        tree.add(fe(1), fe(1))?;
        let old_root = tree.root();
        tree.add(fe(2), fe(2))?;

        let (old_proof, _) = tree.generate_proof(&fe(2), Some(old_root))?;
        assert!(!old_proof.existence);
        assert!(old_proof.verify(&old_root, &fe(2), &FieldElement::ZERO));

        let (new_proof, value) = tree.generate_proof(&fe(2), None)?;
        assert!(new_proof.existence);
        assert!(verify_proof(&tree.root(), &new_proof, &fe(2), &value.unwrap_or_default()));
        Ok(())
    }

    #[test]
    fn test_insertion_order_independent() -> Result<()> {
        let mut a = create_tree(DEFAULT_LEVELS);
        let mut b = create_tree(DEFAULT_LEVELS);
        for key in [7u64, 3, 12, 1] {
            a.add(fe(key), fe(key))?;
        }
        for key in [1u64, 12, 3, 7] {
            b.add(fe(key), fe(key))?;
        }
        assert_eq!(a.root(), b.root());
        Ok(())
    }

    #[test]
    fn test_proof_json() -> Result<()> {
        let mut tree = SparseMerkleTree::new(DEFAULT_LEVELS);
        tree.add(fe(1), fe(1))?;
        tree.add(fe(2), fe(2))?;
        let proof = tree.prove_non_existence(&fe(5))?;
        let json = serde_json::to_string(&proof)?;
        let back: Proof = serde_json::from_str(&json)?;
        assert_eq!(back, proof);
        assert_eq!(root_from_proof(&back, &fe(5), &FieldElement::ZERO)?, tree.root());
        Ok(())
    }
}
