//! The sparse Patricia-Merkle trie.

use std::collections::VecDeque;
use std::mem;
use std::sync::Arc;

use amber_types::{Commitment, Path, Payload};

use crate::hash::{self, TREE_HEIGHT};
use crate::node::{Branch, Extension, Leaf, Node};
use crate::store::Store;

/// A mutable ledger trie backed by a shared payload store.
///
/// Inserting restructures the tree in place, splitting extensions and
/// forking branches as paths diverge. Invariants maintained throughout:
/// leaves sit below all 256 bits of structure, no branch has two empty
/// children, no extension has an empty child, and no two extensions are
/// adjacent on an edge.
pub struct Trie {
    root: Node,
    store: Arc<dyn Store>,
}

impl Trie {
    /// A trie with no registers.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            root: Node::Empty,
            store,
        }
    }

    /// A trie over an existing root node.
    pub fn with_root(root: Node, store: Arc<dyn Store>) -> Self {
        Self { root, store }
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Root hash of the trie, recomputing any dirty nodes on the way.
    ///
    /// The empty trie hashes to the canonical default for height 256.
    pub fn root_hash(&mut self) -> Commitment {
        Commitment::new(self.root.hash_at(0))
    }

    /// Insert a payload at a path, replacing any previous payload there.
    ///
    /// Restructures the tree as needed and marks every node on the descent
    /// dirty so the next `root_hash` recomputes exactly the touched spine.
    pub fn insert(&mut self, path: Path, payload: &Payload) {
        let payload_key = self.store.put(payload);
        let leaf_hash = hash::leaf_hash(&path, &payload.value);

        let mut current = &mut self.root;
        let mut depth: u16 = 0;
        loop {
            match current {
                // Reached an empty edge: install the leaf, bridging any
                // remaining bits with a single extension.
                Node::Empty => {
                    if depth == TREE_HEIGHT {
                        *current = Node::Leaf(Box::new(Leaf::new(leaf_hash, payload_key)));
                        return;
                    }
                    let count = (TREE_HEIGHT - depth - 1) as u8;
                    *current =
                        Node::Extension(Box::new(Extension::new(path, count, Node::Empty)));
                    let Node::Extension(ext) = current else {
                        unreachable!()
                    };
                    current = &mut ext.child;
                    depth = TREE_HEIGHT;
                }

                // A leaf here means the register is being overwritten: drop
                // it and re-enter the loop on the now-empty edge.
                Node::Leaf(_) => {
                    *current = Node::Empty;
                }

                Node::Branch(branch) => {
                    branch.dirty = true;
                    current = if path.bit(depth) == 0 {
                        &mut branch.left
                    } else {
                        &mut branch.right
                    };
                    depth += 1;
                }

                Node::Extension(_) => {
                    let (available, common) = {
                        let Node::Extension(ext) = &*current else {
                            unreachable!()
                        };
                        let available = ext.bits();
                        let mut common = 0;
                        while common < available
                            && path.bit(depth + common) == ext.path.bit(depth + common)
                        {
                            common += 1;
                        }
                        (available, common)
                    };

                    // Full overlap: skip to the end of the extension.
                    if common == available {
                        let Node::Extension(ext) = current else {
                            unreachable!()
                        };
                        ext.dirty = true;
                        current = &mut ext.child;
                        depth += available;
                        continue;
                    }

                    // Partial overlap: fork. The diverging bit gets a
                    // branch; whatever the extension covered below it stays
                    // on the "other" side, and descent continues on the
                    // empty side.
                    let Node::Extension(ext) = mem::take(current) else {
                        unreachable!()
                    };
                    let ext = *ext;
                    let fork = depth + common;

                    let remainder = available - common - 1;
                    let other = if remainder == 0 {
                        ext.child
                    } else {
                        Node::Extension(Box::new(Extension::new(
                            ext.path,
                            (remainder - 1) as u8,
                            ext.child,
                        )))
                    };

                    let other_bit = ext.path.bit(fork);
                    let branch = if other_bit == 0 {
                        Branch::new(other, Node::Empty)
                    } else {
                        Branch::new(Node::Empty, other)
                    };
                    let branch = Node::Branch(Box::new(branch));

                    // With no bits in common the branch replaces the
                    // extension outright; otherwise the extension shortens
                    // to the common window and adopts the branch.
                    if common == 0 {
                        *current = branch;
                    } else {
                        *current = Node::Extension(Box::new(Extension::new(
                            ext.path,
                            (common - 1) as u8,
                            branch,
                        )));
                        let Node::Extension(shortened) = current else {
                            unreachable!()
                        };
                        current = &mut shortened.child;
                    }
                    let Node::Branch(branch) = current else {
                        unreachable!()
                    };
                    current = if other_bit == 0 {
                        &mut branch.right
                    } else {
                        &mut branch.left
                    };
                    depth = fork + 1;
                }
            }
        }
    }

    /// Read the payload at a path, if present.
    ///
    /// Returns `None` when the path leaves the structure or when the
    /// payload store no longer holds the leaf's content key.
    pub fn read(&self, path: &Path) -> Option<Payload> {
        let mut current = &self.root;
        let mut depth: u16 = 0;
        loop {
            match current {
                Node::Empty => return None,
                Node::Leaf(leaf) => return self.store.get(&leaf.payload_key),
                Node::Branch(branch) => {
                    current = if path.bit(depth) == 0 {
                        &branch.left
                    } else {
                        &branch.right
                    };
                    depth += 1;
                }
                Node::Extension(ext) => {
                    let available = ext.bits();
                    for i in 0..available {
                        if path.bit(depth + i) != ext.path.bit(depth + i) {
                            return None;
                        }
                    }
                    current = &ext.child;
                    depth += available;
                }
            }
        }
    }

    /// Every reachable leaf, in unspecified order.
    pub fn leaves(&self) -> Vec<&Leaf> {
        let mut queue = VecDeque::new();
        if !self.root.is_empty() {
            queue.push_back(&self.root);
        }

        let mut leaves = Vec::new();
        while let Some(node) = queue.pop_front() {
            match node {
                Node::Leaf(leaf) => leaves.push(leaf.as_ref()),
                Node::Extension(ext) => queue.push_back(&ext.child),
                Node::Branch(branch) => {
                    queue.push_back(&branch.left);
                    queue.push_back(&branch.right);
                }
                Node::Empty => {}
            }
        }
        leaves
    }
}

impl Clone for Trie {
    /// Deep-clones the node structure; the payload store is shared.
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            store: Arc::clone(&self.store),
        }
    }
}
