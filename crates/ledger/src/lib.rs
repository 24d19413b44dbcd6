//! The Amber ledger: a sparse Patricia-Merkle trie over 256-bit register
//! paths, plus the forest of candidate tries the indexer advances through.
//!
//! The trie stores one leaf per register. Extensions skip runs of path bits
//! with no branching so a sparse ledger stays shallow in node count, while
//! hashing still folds through all 256 levels using precomputed default
//! hashes for the absent siblings. Payload bytes live outside the tree in a
//! content-addressed [`Store`]; leaves carry only the content key and their
//! hash contribution.

pub mod forest;
pub mod hash;
pub mod node;
pub mod store;
pub mod trie;

pub use forest::Forest;
pub use node::{Branch, Extension, Leaf, Node};
pub use store::{MemStore, Store};
pub use trie::Trie;
