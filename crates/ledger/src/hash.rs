//! Ledger hashing.
//!
//! All node hashes are domain-separated blake3. Internal combines are
//! parametrized by the height of the level being combined (1 at the bottom,
//! 256 at the root), so a value's position in the tree is committed along
//! with its content.

use amber_types::Path;
use once_cell::sync::Lazy;

/// Height of the full tree: one level per path bit.
pub const TREE_HEIGHT: u16 = 256;

/// A 32-byte node hash.
pub type NodeHash = [u8; 32];

const LEAF_DOMAIN: &[u8] = b"amber:ledger:leaf:v1";
const NODE_DOMAIN: &[u8] = b"amber:ledger:node:v1";
const DEFAULT_DOMAIN: &[u8] = b"amber:ledger:default:v1";

// Default hashes for every height, built bottom-up once.
static DEFAULT_HASHES: Lazy<[NodeHash; TREE_HEIGHT as usize + 1]> = Lazy::new(|| {
    let mut table = [[0u8; 32]; TREE_HEIGHT as usize + 1];
    table[0] = *blake3::hash(DEFAULT_DOMAIN).as_bytes();
    for height in 1..=TREE_HEIGHT as usize {
        table[height] = node_hash(height as u16, &table[height - 1], &table[height - 1]);
    }
    table
});

/// Hash of a fully-expanded leaf holding `value` at `path`.
pub fn leaf_hash(path: &Path, value: &[u8]) -> NodeHash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(LEAF_DOMAIN);
    hasher.update(path.as_bytes());
    hasher.update(value);
    *hasher.finalize().as_bytes()
}

/// Combine two child hashes into the parent at `height` (1..=256).
pub fn node_hash(height: u16, left: &NodeHash, right: &NodeHash) -> NodeHash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(NODE_DOMAIN);
    hasher.update(&height.to_be_bytes());
    hasher.update(left);
    hasher.update(right);
    *hasher.finalize().as_bytes()
}

/// The hash of a completely empty subtree of the given height.
///
/// `default_hash(TREE_HEIGHT)` is the root hash of the empty trie.
pub fn default_hash(height: u16) -> NodeHash {
    DEFAULT_HASHES[height as usize]
}

/// The Merkle value of a subtree of `height` levels containing exactly one
/// leaf: the leaf hash folded upward with default siblings, the path bit at
/// each level choosing the side.
pub fn compact_hash(path: &Path, value: &[u8], height: u16) -> NodeHash {
    let mut current = leaf_hash(path, value);
    for level in 1..=height {
        current = fold_level(path, level, current);
    }
    current
}

/// One upward fold at `level`, pairing `current` with the default sibling.
///
/// Level `l` combines subtrees whose position is selected by path bit
/// `256 - l`: level 1 consumes the last bit, level 256 the first.
pub fn fold_level(path: &Path, level: u16, current: NodeHash) -> NodeHash {
    let sibling = default_hash(level - 1);
    if path.bit(TREE_HEIGHT - level) == 1 {
        node_hash(level, &sibling, &current)
    } else {
        node_hash(level, &current, &sibling)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(bytes: [u8; 32]) -> Path {
        Path::new(bytes)
    }

    #[test]
    fn default_hashes_chain_upward() {
        let d0 = default_hash(0);
        assert_eq!(default_hash(1), node_hash(1, &d0, &d0));
        let d255 = default_hash(255);
        assert_eq!(default_hash(256), node_hash(256, &d255, &d255));
    }

    #[test]
    fn combine_is_height_dependent() {
        let left = [1u8; 32];
        let right = [2u8; 32];
        assert_ne!(node_hash(1, &left, &right), node_hash(2, &left, &right));
        assert_ne!(node_hash(1, &left, &right), node_hash(1, &right, &left));
    }

    #[test]
    fn compact_hash_zero_height_is_leaf_hash() {
        let p = path([0; 32]);
        assert_eq!(compact_hash(&p, &[1], 0), leaf_hash(&p, &[1]));
    }

    #[test]
    fn compact_hash_folds_by_path_bits() {
        // All-zero path: every fold keeps the running value on the left.
        let p = path([0; 32]);
        let mut expected = leaf_hash(&p, &[1]);
        for level in 1..=256u16 {
            expected = node_hash(level, &expected, &default_hash(level - 1));
        }
        assert_eq!(compact_hash(&p, &[1], 256), expected);

        // All-one path: every fold keeps it on the right.
        let p = path([0xff; 32]);
        let mut expected = leaf_hash(&p, &[1]);
        for level in 1..=256u16 {
            expected = node_hash(level, &default_hash(level - 1), &expected);
        }
        assert_eq!(compact_hash(&p, &[1], 256), expected);
    }
}
