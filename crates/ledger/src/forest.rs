//! The forest of candidate tries.
//!
//! Between the moment a block's parent commitment is known and the moment
//! its height is committed, the in-flight trie lives here, keyed by the
//! commitment it produces. Entries remember their parent commitment so a
//! reset can drop everything no longer reachable from the canonical head.

use std::collections::HashMap;

use amber_types::Commitment;

use crate::trie::Trie;

struct Entry {
    trie: Trie,
    parent: Commitment,
}

/// Candidate tries keyed by the state commitment they hash to.
#[derive(Default)]
pub struct Forest {
    entries: HashMap<Commitment, Entry>,
}

impl Forest {
    pub fn new() -> Self {
        Self::default()
    }

    /// File a trie under the commitment it produced, remembering the
    /// commitment it was derived from.
    pub fn save(&mut self, trie: Trie, commitment: Commitment, parent: Commitment) {
        self.entries.insert(commitment, Entry { trie, parent });
    }

    /// A mutable working copy of the trie at a commitment.
    ///
    /// The stored trie is never handed out by reference: mutation happens
    /// only on the clone, so entries stay valid for their commitment.
    pub fn trie(&self, commitment: &Commitment) -> Option<Trie> {
        self.entries.get(commitment).map(|entry| entry.trie.clone())
    }

    pub fn parent(&self, commitment: &Commitment) -> Option<Commitment> {
        self.entries.get(commitment).map(|entry| entry.parent)
    }

    pub fn contains(&self, commitment: &Commitment) -> bool {
        self.entries.contains_key(commitment)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry not reachable from `root`: an entry survives when
    /// following parent commitments from it arrives at `root`.
    pub fn reset(&mut self, root: &Commitment) {
        let limit = self.entries.len();
        let reachable: Vec<Commitment> = self
            .entries
            .keys()
            .filter(|commitment| self.reaches(commitment, root, limit))
            .copied()
            .collect();
        self.entries.retain(|commitment, _| reachable.contains(commitment));
    }

    fn reaches(&self, from: &Commitment, root: &Commitment, limit: usize) -> bool {
        let mut current = *from;
        for _ in 0..=limit {
            if current == *root {
                return true;
            }
            match self.entries.get(&current) {
                Some(entry) if entry.parent != current => current = entry.parent,
                _ => return false,
            }
        }
        false
    }
}
