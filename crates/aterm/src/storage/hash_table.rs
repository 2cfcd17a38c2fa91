#![forbid(unsafe_code)]

use std::iter;

use log::debug;
use log::warn;

use crate::TermPoolError;
use crate::error::consistency_violation;
use crate::storage::Node;
use crate::storage::NodeRef;
use crate::storage::Payload;
use crate::storage::SizeClass;
use crate::storage::SizeClassAllocator;
use crate::storage::SymbolId;

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// Starts a structural hash for a term with the given head symbol.
fn hash_start(symbol: SymbolId) -> u64 {
    (FNV_OFFSET ^ symbol.index() as u64).wrapping_mul(FNV_PRIME)
}

/// Mixes the next word of a term into the hash, the order of the words matters.
fn hash_combine(hash: u64, word: u64) -> u64 {
    (hash ^ word).wrapping_mul(FNV_PRIME)
}

/// Final avalanche so that the low bits, which select the bucket, depend on all input words.
fn hash_finish(mut hash: u64) -> u64 {
    hash ^= hash >> 33;
    hash = hash.wrapping_mul(0xff51afd7ed558ccd);
    hash ^= hash >> 33;
    hash = hash.wrapping_mul(0xc4ceb9fe1a85ec53);
    hash ^= hash >> 33;
    hash
}

/// The structure of a term that is looked up in the [TermHashTable].
/// Arguments are compared by identity since they are canonical already.
#[derive(Clone, Copy, Debug)]
pub enum TermKey<'a> {
    Application { symbol: SymbolId, arguments: &'a [NodeRef] },
    Integer { symbol: SymbolId, value: i64 },
}

impl TermKey<'_> {
    /// Returns the structural hash of the term.
    pub fn hash(&self) -> u64 {
        match self {
            TermKey::Application { symbol, arguments } => hash_finish(
                arguments
                    .iter()
                    .fold(hash_start(*symbol), |hash, argument| hash_combine(hash, argument.identity())),
            ),
            TermKey::Integer { symbol, value } => hash_finish(hash_combine(hash_start(*symbol), *value as u64)),
        }
    }

    /// Returns the size class in which a node with this structure is stored.
    pub fn size_class(&self) -> SizeClass {
        match self {
            TermKey::Application { arguments, .. } => SizeClass::application(arguments.len()),
            TermKey::Integer { .. } => SizeClass::integer(),
        }
    }

    /// Returns the arguments of the term, integers have none.
    pub fn arguments(&self) -> &[NodeRef] {
        match self {
            TermKey::Application { arguments, .. } => arguments,
            TermKey::Integer { .. } => &[],
        }
    }

    /// Returns a fresh node for this structure.
    fn node(&self) -> Node {
        match self {
            TermKey::Application { symbol, .. } => Node::new(*symbol, Payload::Application),
            TermKey::Integer { symbol, value } => Node::new(*symbol, Payload::Integer(*value)),
        }
    }

    /// Returns true iff the given live node has exactly this structure.
    fn matches(&self, allocator: &SizeClassAllocator, reference: NodeRef) -> bool {
        let node = allocator.node(reference);
        match (self, node.payload()) {
            (TermKey::Application { symbol, arguments }, Payload::Application) => {
                node.symbol() == *symbol
                    && reference.size_class() == self.size_class()
                    && allocator.arguments(reference).eq(arguments.iter().copied())
            }
            (TermKey::Integer { symbol, value }, Payload::Integer(other)) => node.symbol() == *symbol && *value == other,
            _ => false,
        }
    }
}

/// Computes the structural hash of a live node.
pub fn node_hash(allocator: &SizeClassAllocator, reference: NodeRef) -> u64 {
    let node = allocator.node(reference);
    match node.payload() {
        Payload::Application => hash_finish(
            allocator
                .argument_words(reference)
                .iter()
                .fold(hash_start(node.symbol()), |hash, word| hash_combine(hash, *word)),
        ),
        Payload::Integer(value) => hash_finish(hash_combine(hash_start(node.symbol()), value as u64)),
    }
}

/// The result of [TermHashTable::find_or_insert].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lookup {
    /// An existing node with the requested structure.
    Found(NodeRef),

    /// A newly allocated node with a reference count of one.
    Inserted(NodeRef),
}

/// Maps the structure of every live term to its unique node.
///
/// # Details
///
/// The buckets are chained through the `next` link of the nodes themselves,
/// so the table only stores the head of every chain. The number of buckets
/// is always a power of two and doubles once the number of nodes reaches it.
/// A node that is found is moved to the front of its chain.
pub struct TermHashTable {
    buckets: Vec<Option<NodeRef>>,
    table_class: u32,
    maximum_class: u32,
    len: usize,

    /// The number of nodes at which the next growth is attempted.
    growth_threshold: usize,
}

impl TermHashTable {
    /// Creates a table with `1 << table_class` buckets that never grows
    /// beyond `1 << maximum_class` buckets.
    pub fn new(table_class: u32, maximum_class: u32) -> Result<TermHashTable, TermPoolError> {
        let capacity = 1usize << table_class;

        let mut buckets = Vec::new();
        buckets
            .try_reserve_exact(capacity)
            .map_err(|_| TermPoolError::OutOfMemory {
                class: 0,
                words: capacity,
            })?;
        buckets.resize(capacity, None);

        Ok(TermHashTable {
            buckets,
            table_class,
            maximum_class,
            len: 0,
            growth_threshold: capacity,
        })
    }

    /// Returns the node with the given structure, allocating and inserting a
    /// new node when there is none.
    pub fn find_or_insert(
        &mut self,
        allocator: &mut SizeClassAllocator,
        key: TermKey<'_>,
    ) -> Result<Lookup, TermPoolError> {
        let hash = key.hash();
        if let Some(reference) = self.find(allocator, &key, hash) {
            return Ok(Lookup::Found(reference));
        }

        if self.len >= self.growth_threshold {
            self.grow(allocator);
        }

        let reference = allocator.allocate(key.size_class(), key.node(), key.arguments())?;
        let bucket = self.bucket_of(hash);
        allocator.node_mut(reference).next = self.buckets[bucket];
        self.buckets[bucket] = Some(reference);
        self.len += 1;

        Ok(Lookup::Inserted(reference))
    }

    /// Unlinks the given node from its bucket. The node must still be live in
    /// the allocator, since its structure determines the bucket.
    pub fn remove(&mut self, allocator: &mut SizeClassAllocator, reference: NodeRef) {
        let bucket = self.bucket_of(node_hash(allocator, reference));

        let mut previous: Option<NodeRef> = None;
        let mut current = self.buckets[bucket];
        while let Some(candidate) = current {
            let next = allocator.node(candidate).next;
            if candidate == reference {
                match previous {
                    Some(previous) => allocator.node_mut(previous).next = next,
                    None => self.buckets[bucket] = next,
                }
                allocator.node_mut(reference).next = None;
                self.len -= 1;
                return;
            }

            previous = Some(candidate);
            current = next;
        }

        consistency_violation(format!("{reference:?} is not present in bucket {bucket} of the term table"))
    }

    /// Returns the number of nodes in the table.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true iff the table contains no nodes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of buckets.
    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    /// Returns the bucket in which a node with the given hash belongs.
    pub fn bucket_of(&self, hash: u64) -> usize {
        hash as usize & (self.buckets.len() - 1)
    }

    /// Returns the nodes in the chain of the given bucket. The walk stops after
    /// a node that is no longer live, so that a broken chain can be inspected.
    pub fn chain(&self, allocator: &SizeClassAllocator, bucket: usize) -> impl Iterator<Item = NodeRef> {
        iter::successors(self.buckets[bucket], move |reference| {
            allocator.try_node(*reference).and_then(|node| node.next)
        })
    }

    /// Returns the length of the longest chain.
    pub fn longest_chain(&self, allocator: &SizeClassAllocator) -> usize {
        (0..self.buckets.len())
            .map(|bucket| self.chain(allocator, bucket).take(self.len + 1).count())
            .max()
            .unwrap_or(0)
    }

    /// Looks for a node with the given structure and moves it to the front of its chain.
    fn find(&mut self, allocator: &mut SizeClassAllocator, key: &TermKey<'_>, hash: u64) -> Option<NodeRef> {
        let bucket = self.bucket_of(hash);

        let mut previous: Option<NodeRef> = None;
        let mut current = self.buckets[bucket];
        while let Some(candidate) = current {
            let next = allocator.node(candidate).next;
            if key.matches(allocator, candidate) {
                if let Some(previous) = previous {
                    allocator.node_mut(previous).next = next;
                    allocator.node_mut(candidate).next = self.buckets[bucket];
                    self.buckets[bucket] = Some(candidate);
                }
                return Some(candidate);
            }

            previous = Some(candidate);
            current = next;
        }

        None
    }

    /// Doubles the number of buckets and rehashes every node. When the new
    /// table cannot be allocated the table keeps its current size.
    fn grow(&mut self, allocator: &mut SizeClassAllocator) {
        let class = self.table_class + 1;
        if class > self.maximum_class {
            self.refuse_growth("the maximum table size is reached");
            return;
        }

        let capacity = 1usize << class;
        let mut buckets: Vec<Option<NodeRef>> = Vec::new();
        if let Err(error) = buckets.try_reserve_exact(capacity) {
            self.refuse_growth(&error.to_string());
            return;
        }
        buckets.resize(capacity, None);

        let mask = capacity - 1;
        for head in std::mem::take(&mut self.buckets) {
            let mut current = head;
            while let Some(reference) = current {
                current = allocator.node(reference).next;

                let bucket = node_hash(allocator, reference) as usize & mask;
                allocator.node_mut(reference).next = buckets[bucket];
                buckets[bucket] = Some(reference);
            }
        }

        self.buckets = buckets;
        self.table_class = class;
        self.growth_threshold = capacity;
        debug!("Resized term table to {capacity} buckets for {} terms", self.len);
    }

    fn refuse_growth(&mut self, reason: &str) {
        warn!(
            "Cannot resize the term table beyond {} buckets ({reason}), continuing with longer chains",
            self.buckets.len()
        );
        self.growth_threshold = self.len.saturating_mul(2);
    }
}
