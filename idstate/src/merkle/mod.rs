pub mod sparse_merkle_tree;

pub use sparse_merkle_tree::{NodeAux, Proof, SparseMerkleTree, DEFAULT_LEVELS};
