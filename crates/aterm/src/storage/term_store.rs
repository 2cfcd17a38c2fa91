#![forbid(unsafe_code)]

use std::fmt;

use log::debug;
use rustc_hash::FxHashMap;
use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use hcons_utilities::debug_trace;

use crate::TermPoolConfig;
use crate::TermPoolError;
use crate::error::consistency_violation;
use crate::storage::Lookup;
use crate::storage::NodeRef;
use crate::storage::Payload;
use crate::storage::RootIndex;
use crate::storage::RootSet;
use crate::storage::SizeClassAllocator;
use crate::storage::SymbolId;
use crate::storage::SymbolTable;
use crate::storage::TermHashTable;
use crate::storage::TermKey;
use crate::storage::node_hash;

/// The complete state of a term pool: the symbols, the storage of the
/// nodes, the table that makes them unique and the registered roots.
///
/// # Details
///
/// Every node carries a reference count that is the number of handles to it,
/// plus the number of nodes that have it as argument, plus the number of roots
/// that refer to it. The node is reclaimed as soon as the count becomes zero,
/// which releases its arguments in turn. The cascade uses an explicit stack,
/// so arbitrarily deep terms can be reclaimed.
pub struct TermStore {
    symbols: SymbolTable,
    allocator: SizeClassAllocator,
    table: TermHashTable,
    roots: RootSet,

    /// The nodes whose reference count must still be decremented during a release.
    pending: Vec<NodeRef>,

    /// The empty list, which is held by the store itself and never reclaimed.
    empty_list: NodeRef,
}

impl TermStore {
    /// Creates a store that contains only the reserved symbols and the empty list.
    pub fn new(config: &TermPoolConfig) -> Result<TermStore, TermPoolError> {
        let config = config.clamped();

        let symbols = SymbolTable::new();
        let mut allocator = SizeClassAllocator::new(config.block_words);
        let mut table = TermHashTable::new(config.initial_table_class, config.maximum_table_class)?;

        let empty_list_symbol = symbols.empty_list_symbol();
        let empty_list = match table.find_or_insert(
            &mut allocator,
            TermKey::Application {
                symbol: empty_list_symbol,
                arguments: &[],
            },
        )? {
            Lookup::Inserted(node) => node,
            Lookup::Found(node) => {
                consistency_violation(format!("A new term table already contains the empty list {node:?}"))
            }
        };

        let mut store = TermStore {
            symbols,
            allocator,
            table,
            roots: RootSet::new(),
            pending: Vec::new(),
            empty_list,
        };
        store.symbols.retain(empty_list_symbol);

        debug!(
            "Created term store with {} buckets and blocks of {} words",
            store.table.capacity(),
            config.block_words
        );
        Ok(store)
    }

    /// Returns the symbol with the given name and arity, which has been retained once.
    pub fn create_symbol<N>(&mut self, name: N, arity: usize) -> SymbolId
    where
        N: Into<String> + AsRef<str>,
    {
        self.symbols.create(name, arity)
    }

    /// Increments the reference count of the given symbol.
    pub fn retain_symbol(&mut self, symbol: SymbolId) {
        self.symbols.retain(symbol);
    }

    /// Decrements the reference count of the given symbol.
    pub fn release_symbol(&mut self, symbol: SymbolId) {
        self.symbols.release(symbol);
    }

    /// Returns the function application of the given symbol to the given
    /// arguments. The result has been retained once for the caller.
    pub fn make_application(&mut self, symbol: SymbolId, arguments: &[NodeRef]) -> Result<NodeRef, TermPoolError> {
        let shared = self.symbols.get(symbol);
        if shared.arity() != arguments.len() {
            return Err(TermPoolError::InvalidArity {
                name: shared.name().to_string(),
                arity: shared.arity(),
                given: arguments.len(),
            });
        }

        let lookup = self
            .table
            .find_or_insert(&mut self.allocator, TermKey::Application { symbol, arguments })?;

        let node = self.adopt(lookup, symbol, arguments);
        self.check_consistency();
        Ok(node)
    }

    /// Returns the integer term with the given value, retained once for the caller.
    pub fn make_integer(&mut self, value: i64) -> Result<NodeRef, TermPoolError> {
        let symbol = self.symbols.int_symbol();
        let lookup = self
            .table
            .find_or_insert(&mut self.allocator, TermKey::Integer { symbol, value })?;

        let node = self.adopt(lookup, symbol, &[]);
        self.check_consistency();
        Ok(node)
    }

    /// Returns the list with the given elements, in order, retained once for the caller.
    pub fn make_list(&mut self, elements: &[NodeRef]) -> Result<NodeRef, TermPoolError> {
        let list_symbol = self.symbols.list_symbol();

        let mut list = self.empty_list;
        self.retain(list);

        for element in elements.iter().rev() {
            let result = self.make_application(list_symbol, &[*element, list]);
            self.release(list);
            list = result?;
        }

        Ok(list)
    }

    /// Returns the empty list, which is not retained.
    pub fn empty_list(&self) -> NodeRef {
        self.empty_list
    }

    /// Increments the reference count of the given node.
    pub fn retain(&mut self, node: NodeRef) {
        self.allocator.node_mut(node).reference_count += 1;
    }

    /// Decrements the reference count of the given node, reclaiming it and
    /// every argument that is no longer referenced.
    pub fn release(&mut self, node: NodeRef) {
        debug_assert!(self.pending.is_empty(), "Releases are never nested");
        self.pending.push(node);

        while let Some(node) = self.pending.pop() {
            let entry = self.allocator.node_mut(node);
            if entry.reference_count == 0 {
                consistency_violation(format!("Reference count of {node:?} underflows"));
            }

            entry.reference_count -= 1;
            if entry.reference_count > 0 {
                continue;
            }

            if node == self.empty_list {
                consistency_violation("The empty list was released by its owner".to_string());
            }

            debug_trace!("Reclaiming {node:?}");
            self.table.remove(&mut self.allocator, node);

            let pending = &mut self.pending;
            let reclaimed = self.allocator.free(node, |argument| pending.push(argument));
            self.symbols.release(reclaimed.symbol());
        }

        self.check_consistency();
    }

    /// Returns the head symbol of the given node.
    pub fn symbol(&self, node: NodeRef) -> SymbolId {
        self.allocator.node(node).symbol()
    }

    /// Returns the number of arguments of the given node.
    pub fn arity(&self, node: NodeRef) -> usize {
        self.allocator.argument_words(node).len()
    }

    /// Returns the argument at the given position of the given node.
    pub fn argument(&self, node: NodeRef, index: usize) -> NodeRef {
        self.allocator.argument(node, index)
    }

    /// Returns the value of the given integer node, or None for applications.
    pub fn int_value(&self, node: NodeRef) -> Option<i64> {
        match self.allocator.node(node).payload() {
            Payload::Integer(value) => Some(value),
            Payload::Application => None,
        }
    }

    /// Returns the reference count of the given node.
    pub fn reference_count(&self, node: NodeRef) -> usize {
        self.allocator.node(node).reference_count()
    }

    /// Returns true iff the given node is live.
    pub fn is_live(&self, node: NodeRef) -> bool {
        self.allocator.is_live(node)
    }

    /// Registers the given node as root, which retains it.
    pub fn protect_root(&mut self, node: NodeRef) -> RootIndex {
        self.retain(node);
        let root = self.roots.protect(node);
        debug_trace!("Protected {node:?} as {root:?}");
        root
    }

    /// Removes the given root and releases its node.
    pub fn unprotect_root(&mut self, root: RootIndex) {
        let node = self.roots.unprotect(root);
        debug_trace!("Unprotected {node:?} at {root:?}");
        self.release(node);
    }

    /// Returns the node of the given root.
    pub fn root(&self, root: RootIndex) -> NodeRef {
        self.roots.get(root)
    }

    /// Returns the number of live terms, including the empty list.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns true iff there are no terms, which never happens since the
    /// empty list is always present.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn allocator(&self) -> &SizeClassAllocator {
        &self.allocator
    }

    pub fn table(&self) -> &TermHashTable {
        &self.table
    }

    pub fn roots(&self) -> &RootSet {
        &self.roots
    }

    /// Checks all invariants of the store, and returns a description of the
    /// first violation that is found.
    pub fn verify(&self) -> Result<(), TermPoolError> {
        let live = self.allocator.live();

        // Every bucket only contains live nodes that belong to it, and every
        // node is reachable from exactly one bucket.
        let mut in_table: FxHashSet<NodeRef> = FxHashSet::default();
        for bucket in 0..self.table.capacity() {
            for node in self.table.chain(&self.allocator, bucket).take(live + 1) {
                if !self.allocator.is_live(node) {
                    return inconsistent(format!("Bucket {bucket} reaches reclaimed {node:?}"));
                }

                let expected = self.table.bucket_of(node_hash(&self.allocator, node));
                if expected != bucket {
                    return inconsistent(format!("{node:?} is in bucket {bucket} instead of {expected}"));
                }

                if !in_table.insert(node) {
                    return inconsistent(format!("{node:?} occurs twice in the term table"));
                }
            }
        }

        if in_table.len() != self.table.len() || self.table.len() != live {
            return inconsistent(format!(
                "The table reaches {} nodes and counts {}, but {live} nodes are live",
                in_table.len(),
                self.table.len()
            ));
        }

        // Every structure occurs at most once, and every node is referenced at
        // least as often as it is used as argument or root.
        let mut structures: FxHashMap<(SymbolId, Payload, SmallVec<[NodeRef; 4]>), NodeRef> = FxHashMap::default();
        let mut expected_counts: FxHashMap<NodeRef, usize> = FxHashMap::default();
        let mut symbol_counts: FxHashMap<SymbolId, usize> = FxHashMap::default();

        for (node, entry) in self.allocator.iter() {
            if !in_table.contains(&node) {
                return inconsistent(format!("Live {node:?} is missing from the term table"));
            }

            let arguments: SmallVec<[NodeRef; 4]> = self.allocator.arguments(node).collect();
            if let Payload::Application = entry.payload() {
                let arity = self.symbols.arity(entry.symbol());
                if arity != arguments.len() {
                    return inconsistent(format!(
                        "{node:?} has {} arguments but its symbol has arity {arity}",
                        arguments.len()
                    ));
                }
            }

            for argument in &arguments {
                if !self.allocator.is_live(*argument) {
                    return inconsistent(format!("{node:?} has reclaimed argument {argument:?}"));
                }
                *expected_counts.entry(*argument).or_default() += 1;
            }
            *symbol_counts.entry(entry.symbol()).or_default() += 1;

            if let Some(other) = structures.insert((entry.symbol(), entry.payload(), arguments), node) {
                return inconsistent(format!("{node:?} and {other:?} have the same structure"));
            }
        }

        for (_, node) in self.roots.iter() {
            if !self.allocator.is_live(node) {
                return inconsistent(format!("Root {node:?} has been reclaimed"));
            }
            *expected_counts.entry(node).or_default() += 1;
        }
        *expected_counts.entry(self.empty_list).or_default() += 1;

        for (node, expected) in expected_counts {
            let actual = self.allocator.node(node).reference_count();
            if actual < expected {
                return inconsistent(format!(
                    "{node:?} has reference count {actual}, but is referenced at least {expected} times"
                ));
            }
        }

        for (symbol, expected) in symbol_counts {
            let actual = self.symbols.get(symbol).reference_count();
            if actual < expected {
                return inconsistent(format!(
                    "Symbol {} has reference count {actual}, but is the head of {expected} terms",
                    self.symbols.name(symbol)
                ));
            }
        }

        Ok(())
    }

    /// Runs the verifier after every mutation when the `hcons_debug` feature is enabled.
    fn check_consistency(&self) {
        if cfg!(feature = "hcons_debug") {
            if let Err(error) = self.verify() {
                panic!("{error}");
            }
        }
    }

    /// Establishes the references of a node returned by the table: a found
    /// node gains a reference, a new node references its arguments and symbol.
    fn adopt(&mut self, lookup: Lookup, symbol: SymbolId, arguments: &[NodeRef]) -> NodeRef {
        match lookup {
            Lookup::Found(node) => {
                self.retain(node);
                node
            }
            Lookup::Inserted(node) => {
                for argument in arguments {
                    self.retain(*argument);
                }
                self.symbols.retain(symbol);
                debug_trace!("Created {node:?} with symbol {}", self.symbols.name(symbol));
                node
            }
        }
    }
}

impl fmt::Debug for TermStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TermStore")
            .field("terms", &self.table.len())
            .field("symbols", &self.symbols.len())
            .field("roots", &self.roots.len())
            .field("blocks", &self.allocator.blocks_allocated())
            .finish()
    }
}

fn inconsistent(message: String) -> Result<(), TermPoolError> {
    Err(TermPoolError::InconsistentState(message))
}

#[cfg(test)]
mod tests {
    use hcons_utilities::test_logger;

    use super::*;

    #[test]
    fn test_store_lifecycle() {
        test_logger();

        let mut store = TermStore::new(&TermPoolConfig::default()).unwrap();
        assert_eq!(store.len(), 1, "Only the empty list exists");

        let a = store.create_symbol("a", 0);
        let f = store.create_symbol("f", 2);

        let a_term = store.make_application(a, &[]).unwrap();
        let f_term = store.make_application(f, &[a_term, a_term]).unwrap();
        assert_eq!(store.reference_count(a_term), 3, "One handle and two argument positions");
        assert_eq!(store.argument(f_term, 1), a_term);
        store.verify().unwrap();

        store.release(a_term);
        assert!(store.is_live(a_term), "The argument is still used by f(a, a)");

        store.release(f_term);
        assert!(!store.is_live(f_term));
        assert!(!store.is_live(a_term));
        assert_eq!(store.len(), 1);

        store.release_symbol(f);
        store.release_symbol(a);
        assert_eq!(store.symbols().len(), 3, "Only the reserved symbols remain");
        store.verify().unwrap();
    }

    #[test]
    fn test_invalid_arity_allocates_nothing() {
        test_logger();

        let mut store = TermStore::new(&TermPoolConfig::default()).unwrap();
        let f = store.create_symbol("f", 2);
        let a = store.create_symbol("a", 0);
        let a_term = store.make_application(a, &[]).unwrap();

        let result = store.make_application(f, &[a_term]);
        assert_eq!(
            result,
            Err(TermPoolError::InvalidArity {
                name: "f".to_string(),
                arity: 2,
                given: 1
            })
        );
        assert_eq!(store.len(), 2);
        assert_eq!(store.reference_count(a_term), 1);
    }

    #[test]
    fn test_list_construction() {
        test_logger();

        let mut store = TermStore::new(&TermPoolConfig::default()).unwrap();
        let one = store.make_integer(1).unwrap();
        let two = store.make_integer(2).unwrap();

        let list = store.make_list(&[one, two]).unwrap();
        assert_eq!(store.symbol(list), store.symbols().list_symbol());
        assert_eq!(store.argument(list, 0), one);

        let tail = store.argument(list, 1);
        assert_eq!(store.argument(tail, 0), two);
        assert_eq!(store.argument(tail, 1), store.empty_list());
        store.verify().unwrap();

        store.release(list);
        store.release(one);
        store.release(two);
        assert_eq!(store.len(), 1);
        store.verify().unwrap();
    }

    #[test]
    fn test_roots() {
        test_logger();

        let mut store = TermStore::new(&TermPoolConfig::default()).unwrap();
        let five = store.make_integer(5).unwrap();

        let root = store.protect_root(five);
        store.release(five);
        assert!(store.is_live(five), "The root keeps the term alive");
        assert_eq!(store.root(root), five);

        store.unprotect_root(root);
        assert!(!store.is_live(five));
    }

    #[test]
    #[should_panic(expected = "underflows")]
    fn test_reference_count_underflow() {
        let mut store = TermStore::new(&TermPoolConfig::default()).unwrap();
        let five = store.make_integer(5).unwrap();

        // A live node with a count of zero, as left behind by a release too many elsewhere.
        store.allocator.node_mut(five).reference_count = 0;
        store.release(five);
    }

    #[test]
    #[should_panic(expected = "empty list was released")]
    fn test_empty_list_is_never_reclaimed() {
        let mut store = TermStore::new(&TermPoolConfig::default()).unwrap();
        let empty = store.empty_list();
        store.release(empty);
    }
}
