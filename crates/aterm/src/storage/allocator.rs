#![forbid(unsafe_code)]

use std::fmt;

use log::debug;

use crate::TermPoolError;
use crate::error::consistency_violation;
use crate::storage::SymbolId;

/// The number of words every node occupies besides its arguments: the
/// symbol, the reference count and the link.
pub const NODE_HEADER_WORDS: usize = 3;

/// The layout of a node, given by the number of machine words it occupies.
/// Nodes of the same size class share blocks and free lists.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct SizeClass(usize);

impl SizeClass {
    /// The size class of a function application with the given arity.
    pub fn application(arity: usize) -> SizeClass {
        SizeClass(NODE_HEADER_WORDS + arity)
    }

    /// The size class of an integer term, which stores its value in a single word.
    pub fn integer() -> SizeClass {
        SizeClass(NODE_HEADER_WORDS + 1)
    }

    /// Returns the number of words of a node in this class.
    pub fn words(self) -> usize {
        self.0
    }

    /// Returns the number of argument words of a node in this class.
    pub fn argument_words(self) -> usize {
        self.0 - NODE_HEADER_WORDS
    }
}

impl fmt::Display for SizeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The address of a node: its size class and the number of its slot within
/// the blocks of that class.
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct NodeRef {
    class: u32,
    slot: u32,
}

impl NodeRef {
    /// Returns the size class in which this node is stored.
    pub fn size_class(self) -> SizeClass {
        SizeClass(self.class as usize)
    }

    /// Returns a single word that uniquely identifies the node. This is the
    /// word that is stored as argument of other nodes, and it is never zero.
    pub fn identity(self) -> u64 {
        ((self.class as u64) << 32) | self.slot as u64
    }

    fn from_identity(word: u64) -> NodeRef {
        debug_assert_ne!(word, 0, "Zero is never the identity of a node");
        NodeRef {
            class: (word >> 32) as u32,
            slot: word as u32,
        }
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({}:{})", self.class, self.slot)
    }
}

/// The data of a node besides its argument words.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Payload {
    /// A function application, the arguments are stored in the argument words
    /// of the slot.
    Application,

    /// An integer literal, the argument words are unused.
    Integer(i64),
}

/// A live term node.
#[derive(Debug)]
pub struct Node {
    pub(super) symbol: SymbolId,
    pub(super) reference_count: usize,

    /// The next node in the same bucket of the term table.
    pub(super) next: Option<NodeRef>,
    pub(super) payload: Payload,
}

impl Node {
    /// Creates a node with a reference count of one.
    pub fn new(symbol: SymbolId, payload: Payload) -> Node {
        Node {
            symbol,
            reference_count: 1,
            next: None,
            payload,
        }
    }

    pub fn symbol(&self) -> SymbolId {
        self.symbol
    }

    pub fn reference_count(&self) -> usize {
        self.reference_count
    }

    pub fn payload(&self) -> Payload {
        self.payload
    }
}

enum Slot {
    Occupied(Node),

    /// A reclaimed slot, points to the next slot of the free list.
    Free(Option<NodeRef>),
}

/// A chunk of storage for a single size class. The number of used slots acts
/// as bump pointer.
struct Block {
    slots: Vec<Slot>,

    /// The argument words of all slots, zero initialised.
    arguments: Vec<u64>,
}

/// All the storage of a single size class.
struct SizeClassStorage {
    class: SizeClass,
    slots_per_block: usize,

    /// The most recently allocated block is the last one.
    blocks: Vec<Block>,
    free: Option<NodeRef>,
    free_len: usize,
}

impl SizeClassStorage {
    fn new(class: SizeClass, block_words: usize) -> SizeClassStorage {
        SizeClassStorage {
            class,
            slots_per_block: (block_words / class.words()).max(1),
            blocks: Vec::new(),
            free: None,
            free_len: 0,
        }
    }

    /// Returns the block and the offset within that block of the given slot.
    fn locate(&self, slot: u32) -> (usize, usize) {
        let slot = slot as usize;
        (slot / self.slots_per_block, slot % self.slots_per_block)
    }

    fn node_ref(&self, block: usize, offset: usize) -> Result<NodeRef, TermPoolError> {
        let slot = block
            .checked_mul(self.slots_per_block)
            .and_then(|slot| slot.checked_add(offset))
            .and_then(|slot| u32::try_from(slot).ok())
            .ok_or_else(|| self.out_of_memory())?;

        Ok(NodeRef {
            class: self.class.words() as u32,
            slot,
        })
    }

    /// Allocates a new zeroed block, which becomes the block that is bump allocated from.
    fn allocate_block(&mut self) -> Result<(), TermPoolError> {
        let argument_words = self
            .slots_per_block
            .checked_mul(self.class.argument_words())
            .ok_or_else(|| self.out_of_memory())?;

        let mut slots = Vec::new();
        slots
            .try_reserve_exact(self.slots_per_block)
            .map_err(|_| self.out_of_memory())?;

        let mut arguments = Vec::new();
        arguments
            .try_reserve_exact(argument_words)
            .map_err(|_| self.out_of_memory())?;
        arguments.resize(argument_words, 0);

        self.blocks.push(Block { slots, arguments });
        Ok(())
    }

    fn out_of_memory(&self) -> TermPoolError {
        TermPoolError::OutOfMemory {
            class: self.class.words(),
            words: self.slots_per_block.saturating_mul(self.class.words()),
        }
    }
}

/// Manages the storage of term nodes grouped by [SizeClass].
///
/// # Details
///
/// Every size class has its own list of blocks and its own free list. A new
/// node is bump allocated from the most recent block when it has room, then
/// taken from the free list, and only then a new block is allocated. Freed
/// slots are pushed onto the free list of their class and never merged with
/// slots of other classes.
pub struct SizeClassAllocator {
    block_words: usize,

    /// Indexed by the number of words of the size class.
    classes: Vec<Option<SizeClassStorage>>,
    blocks_allocated: usize,
    live: usize,
}

impl SizeClassAllocator {
    /// Creates an allocator whose blocks contain the given number of words.
    pub fn new(block_words: usize) -> SizeClassAllocator {
        SizeClassAllocator {
            block_words,
            classes: Vec::new(),
            blocks_allocated: 0,
            live: 0,
        }
    }

    /// Stores the given node and its arguments in a slot of the given size
    /// class. The node's payload determines how many argument words are used.
    pub fn allocate(&mut self, class: SizeClass, node: Node, arguments: &[NodeRef]) -> Result<NodeRef, TermPoolError> {
        debug_assert!(
            arguments.len() <= class.argument_words(),
            "Size class {class} cannot store {} arguments",
            arguments.len()
        );

        if self.classes.len() <= class.words() {
            self.classes.resize_with(class.words() + 1, || None);
        }

        let block_words = self.block_words;
        let storage = self.classes[class.words()].get_or_insert_with(|| SizeClassStorage::new(class, block_words));

        let has_room = storage
            .blocks
            .last()
            .is_some_and(|block| block.slots.len() < storage.slots_per_block);

        let reference = if has_room {
            let block = storage.blocks.len() - 1;
            let offset = storage.blocks[block].slots.len();
            let reference = storage.node_ref(block, offset)?;
            storage.blocks[block].slots.push(Slot::Occupied(node));
            reference
        } else if let Some(reference) = storage.free {
            let (block, offset) = storage.locate(reference.slot);
            let slot = std::mem::replace(&mut storage.blocks[block].slots[offset], Slot::Occupied(node));
            match slot {
                Slot::Free(next) => storage.free = next,
                Slot::Occupied(_) => {
                    consistency_violation(format!("Free list of size class {class} points to live {reference:?}"))
                }
            }
            storage.free_len -= 1;
            reference
        } else {
            storage.allocate_block()?;
            self.blocks_allocated += 1;
            debug!(
                "Allocated block {} of size class {class} with {} slots",
                storage.blocks.len(),
                storage.slots_per_block
            );

            let block = storage.blocks.len() - 1;
            let reference = storage.node_ref(block, 0)?;
            storage.blocks[block].slots.push(Slot::Occupied(node));
            reference
        };

        let (block, offset) = storage.locate(reference.slot);
        let words = class.argument_words();
        let start = offset * words;
        for (word, argument) in storage.blocks[block].arguments[start..start + words]
            .iter_mut()
            .zip(arguments)
        {
            *word = argument.identity();
        }

        self.live += 1;
        Ok(reference)
    }

    /// Returns the slot of the given node to the free list of its size class.
    /// The arguments of the node are passed to `on_argument` before the slot
    /// is cleared, and the node itself is returned.
    pub fn free<F>(&mut self, reference: NodeRef, mut on_argument: F) -> Node
    where
        F: FnMut(NodeRef),
    {
        let storage = self.storage_mut(reference);
        let (block, offset) = storage.locate(reference.slot);
        let slot = std::mem::replace(&mut storage.blocks[block].slots[offset], Slot::Free(storage.free));

        let node = match slot {
            Slot::Occupied(node) => node,
            Slot::Free(_) => consistency_violation(format!("{reference:?} is freed twice")),
        };

        let used = used_words(&node, storage.class);
        let start = offset * storage.class.argument_words();
        for word in &mut storage.blocks[block].arguments[start..start + used] {
            on_argument(NodeRef::from_identity(*word));
            *word = 0;
        }

        storage.free = Some(reference);
        storage.free_len += 1;
        self.live -= 1;
        node
    }

    /// Returns the node stored at the given reference.
    pub fn node(&self, reference: NodeRef) -> &Node {
        self.try_node(reference)
            .unwrap_or_else(|| consistency_violation(format!("{reference:?} is used after it was reclaimed")))
    }

    /// Returns the node stored at the given reference mutably.
    pub fn node_mut(&mut self, reference: NodeRef) -> &mut Node {
        let storage = self.storage_mut(reference);
        let (block, offset) = storage.locate(reference.slot);
        match storage.blocks[block].slots.get_mut(offset) {
            Some(Slot::Occupied(node)) => node,
            _ => consistency_violation(format!("{reference:?} is used after it was reclaimed")),
        }
    }

    /// Returns the node stored at the given reference, or None when the slot
    /// does not exist or is free.
    pub fn try_node(&self, reference: NodeRef) -> Option<&Node> {
        let storage = self.classes.get(reference.class as usize)?.as_ref()?;
        let (block, offset) = storage.locate(reference.slot);
        match storage.blocks.get(block)?.slots.get(offset)? {
            Slot::Occupied(node) => Some(node),
            Slot::Free(_) => None,
        }
    }

    /// Returns true iff the given reference points to a live node.
    pub fn is_live(&self, reference: NodeRef) -> bool {
        self.try_node(reference).is_some()
    }

    /// Returns the argument words of the given node, these are the identities
    /// of its arguments.
    pub fn argument_words(&self, reference: NodeRef) -> &[u64] {
        let node = self.node(reference);
        let storage = self.storage(reference);
        let (block, offset) = storage.locate(reference.slot);
        let start = offset * storage.class.argument_words();
        &storage.blocks[block].arguments[start..start + used_words(node, storage.class)]
    }

    /// Returns the argument at the given position of the given node.
    pub fn argument(&self, reference: NodeRef, index: usize) -> NodeRef {
        let words = self.argument_words(reference);
        match words.get(index) {
            Some(word) => NodeRef::from_identity(*word),
            None => panic!("Argument {index} does not exist, {reference:?} has {} arguments", words.len()),
        }
    }

    /// Returns an iterator over the arguments of the given node.
    pub fn arguments(&self, reference: NodeRef) -> impl ExactSizeIterator<Item = NodeRef> + '_ {
        self.argument_words(reference)
            .iter()
            .map(|word| NodeRef::from_identity(*word))
    }

    /// Returns an iterator over all live nodes.
    pub fn iter(&self) -> impl Iterator<Item = (NodeRef, &Node)> {
        self.classes.iter().flatten().flat_map(|storage| {
            storage.blocks.iter().enumerate().flat_map(move |(block, data)| {
                data.slots.iter().enumerate().filter_map(move |(offset, slot)| match slot {
                    Slot::Occupied(node) => Some((
                        NodeRef {
                            class: storage.class.words() as u32,
                            slot: (block * storage.slots_per_block + offset) as u32,
                        },
                        node,
                    )),
                    Slot::Free(_) => None,
                })
            })
        })
    }

    /// Returns the number of live nodes.
    pub fn live(&self) -> usize {
        self.live
    }

    /// Returns the total number of blocks that have been allocated.
    pub fn blocks_allocated(&self) -> usize {
        self.blocks_allocated
    }

    /// Returns, for every size class in use, the number of blocks and the
    /// length of its free list.
    pub fn class_usage(&self) -> impl Iterator<Item = (SizeClass, usize, usize)> + '_ {
        self.classes
            .iter()
            .flatten()
            .map(|storage| (storage.class, storage.blocks.len(), storage.free_len))
    }

    /// Returns the length of the free list of the given size class.
    pub fn free_list_len(&self, class: SizeClass) -> usize {
        self.classes
            .get(class.words())
            .and_then(|storage| storage.as_ref())
            .map_or(0, |storage| storage.free_len)
    }

    fn storage(&self, reference: NodeRef) -> &SizeClassStorage {
        match self.classes.get(reference.class as usize) {
            Some(Some(storage)) => storage,
            _ => consistency_violation(format!("{reference:?} refers to an unused size class")),
        }
    }

    fn storage_mut(&mut self, reference: NodeRef) -> &mut SizeClassStorage {
        match self.classes.get_mut(reference.class as usize) {
            Some(Some(storage)) => storage,
            _ => consistency_violation(format!("{reference:?} refers to an unused size class")),
        }
    }
}

/// Returns the number of argument words that the given node actually uses.
fn used_words(node: &Node, class: SizeClass) -> usize {
    match node.payload {
        Payload::Application => class.argument_words(),
        Payload::Integer(_) => 0,
    }
}
