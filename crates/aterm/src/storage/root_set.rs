#![forbid(unsafe_code)]

use std::fmt;

use crate::error::consistency_violation;
use crate::storage::NodeRef;

/// The index of a registered root. An index becomes stale once its root is
/// unprotected, and using a stale index is detected by its generation.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct RootIndex {
    index: u32,
    generation: u32,
}

impl fmt::Debug for RootIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RootIndex({}@{})", self.index, self.generation)
    }
}

#[derive(Debug)]
enum Entry {
    Filled { node: NodeRef, generation: u32 },

    /// The generation that the next root stored in this entry receives.
    Free { next: Option<u32>, generation: u32 },
}

/// The nodes that are kept alive by an explicit registration instead of a handle.
///
/// Every root owns one reference to its node, the [super::TermStore] retains
/// and releases it. Indices of removed roots are reused.
#[derive(Debug, Default)]
pub struct RootSet {
    entries: Vec<Entry>,
    free: Option<u32>,
    len: usize,
    number_of_insertions: u64,
}

impl RootSet {
    pub fn new() -> RootSet {
        RootSet::default()
    }

    /// Registers the given node as a root and returns its index.
    pub fn protect(&mut self, node: NodeRef) -> RootIndex {
        self.number_of_insertions += 1;
        self.len += 1;

        match self.free {
            Some(index) => {
                let generation = match self.entries[index as usize] {
                    Entry::Free { next, generation } => {
                        self.free = next;
                        generation
                    }
                    Entry::Filled { .. } => consistency_violation(format!("Free list of roots points to filled {index}")),
                };

                self.entries[index as usize] = Entry::Filled { node, generation };
                RootIndex { index, generation }
            }
            None => {
                let index = u32::try_from(self.entries.len())
                    .unwrap_or_else(|_| consistency_violation("Too many roots".to_string()));
                self.entries.push(Entry::Filled { node, generation: 0 });
                RootIndex { index, generation: 0 }
            }
        }
    }

    /// Removes the root with the given index and returns its node.
    pub fn unprotect(&mut self, root: RootIndex) -> NodeRef {
        let node = self.get(root);
        self.entries[root.index as usize] = Entry::Free {
            next: self.free,
            generation: root.generation.wrapping_add(1),
        };
        self.free = Some(root.index);
        self.len -= 1;
        node
    }

    /// Returns the node of the given root.
    pub fn get(&self, root: RootIndex) -> NodeRef {
        match self.entries.get(root.index as usize) {
            Some(Entry::Filled { node, generation }) if *generation == root.generation => *node,
            _ => consistency_violation(format!("{root:?} is used after it was unprotected")),
        }
    }

    /// Returns the number of roots.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true iff there are no roots.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of roots that were ever registered.
    pub fn number_of_insertions(&self) -> u64 {
        self.number_of_insertions
    }

    /// Returns an iterator over all roots.
    pub fn iter(&self) -> impl Iterator<Item = (RootIndex, NodeRef)> + '_ {
        self.entries.iter().enumerate().filter_map(|(index, entry)| match entry {
            Entry::Filled { node, generation } => Some((
                RootIndex {
                    index: index as u32,
                    generation: *generation,
                },
                *node,
            )),
            Entry::Free { .. } => None,
        })
    }
}
