#![forbid(unsafe_code)]

use std::cell::Ref;
use std::cell::RefCell;
use std::cell::RefMut;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use log::debug;
use log::warn;
use smallvec::SmallVec;

use crate::ATerm;
use crate::ATermList;
use crate::Symb;
use crate::Symbol;
use crate::SymbolRef;
use crate::Term;
use crate::TermPoolConfig;
use crate::TermPoolError;
use crate::storage::NodeRef;
use crate::storage::RootIndex;
use crate::storage::SizeClass;
use crate::storage::TermStore;

/// The context in which terms are created. All terms and symbols created by
/// the same pool are maximally shared, and equality of terms is identity.
///
/// # Details
///
/// The pool is single threaded, cloning it is cheap and yields another handle
/// to the same store. Every [ATerm] and [Symbol] keeps the store alive, so it
/// is only freed once the last handle is dropped. Handles of different pools
/// must not be combined, this is rejected with [TermPoolError::ForeignTerm].
#[derive(Clone)]
pub struct TermPool {
    store: Rc<RefCell<TermStore>>,
}

impl TermPool {
    /// Creates a pool with the default configuration.
    pub fn new() -> Result<TermPool, TermPoolError> {
        TermPool::with_config(&TermPoolConfig::default())
    }

    /// Creates a pool with the given configuration.
    pub fn with_config(config: &TermPoolConfig) -> Result<TermPool, TermPoolError> {
        Ok(TermPool {
            store: Rc::new(RefCell::new(TermStore::new(config)?)),
        })
    }

    /// Returns the function symbol with the given name and arity.
    pub fn create_symbol<N>(&self, name: N, arity: usize) -> Symbol
    where
        N: Into<String> + AsRef<str>,
    {
        let id = self.store_mut().create_symbol(name, arity);
        Symbol::from_id(self.clone(), id)
    }

    /// Creates the application of the given symbol to the given arguments.
    pub fn create_term<'a, 'b, 'c, 'd>(
        &self,
        symbol: &'b impl Symb<'a, 'b>,
        arguments: &'d [impl Term<'c, 'd>],
    ) -> Result<ATerm, TermPoolError> {
        self.check_owner(symbol.pool())?;

        let mut nodes: SmallVec<[NodeRef; 8]> = SmallVec::with_capacity(arguments.len());
        for argument in arguments {
            self.check_owner(argument.pool())?;
            nodes.push(argument.node());
        }

        let node = self.store_mut().make_application(symbol.id(), &nodes)?;
        Ok(ATerm::from_node(self.clone(), node))
    }

    /// Creates the application of the given symbol to the arguments produced by the iterator.
    pub fn create_term_iter<'a, 'b, 'c, 'd, I, T>(
        &self,
        symbol: &'b impl Symb<'a, 'b>,
        arguments: I,
    ) -> Result<ATerm, TermPoolError>
    where
        I: IntoIterator<Item = T>,
        T: Term<'c, 'd>,
    {
        // The arguments are kept until the term is created, since owned
        // arguments might be the only reference to their term.
        let arguments: SmallVec<[T; 8]> = arguments.into_iter().collect();

        self.check_owner(symbol.pool())?;
        let mut nodes: SmallVec<[NodeRef; 8]> = SmallVec::with_capacity(arguments.len());
        for argument in &arguments {
            self.check_owner(argument.pool())?;
            nodes.push(argument.node());
        }

        let node = self.store_mut().make_application(symbol.id(), &nodes)?;
        Ok(ATerm::from_node(self.clone(), node))
    }

    /// Creates the constant term of the given symbol, which must have arity zero.
    pub fn create_constant<'a, 'b>(&self, symbol: &'b impl Symb<'a, 'b>) -> Result<ATerm, TermPoolError> {
        self.create_term(symbol, &[] as &[ATerm])
    }

    /// Creates the integer term with the given value.
    pub fn create_int(&self, value: i64) -> Result<ATerm, TermPoolError> {
        let node = self.store_mut().make_integer(value)?;
        Ok(ATerm::from_node(self.clone(), node))
    }

    /// Creates the list with the given elements, in order.
    pub fn create_list<'c, 'd, I, T>(&self, elements: I) -> Result<ATermList, TermPoolError>
    where
        I: IntoIterator<Item = T>,
        T: Term<'c, 'd>,
    {
        let elements: SmallVec<[T; 8]> = elements.into_iter().collect();

        let mut nodes: SmallVec<[NodeRef; 8]> = SmallVec::with_capacity(elements.len());
        for element in &elements {
            self.check_owner(element.pool())?;
            nodes.push(element.node());
        }

        let node = self.store_mut().make_list(&nodes)?;
        Ok(ATermList::from(ATerm::from_node(self.clone(), node)))
    }

    /// Returns the empty list.
    pub fn empty_list(&self) -> ATermList {
        let node = {
            let mut store = self.store_mut();
            let node = store.empty_list();
            store.retain(node);
            node
        };

        ATermList::from(ATerm::from_node(self.clone(), node))
    }

    /// Returns the pseudo-symbol that is the head of every integer term.
    pub fn int_symbol(&self) -> SymbolRef<'_> {
        let id = self.store().symbols().int_symbol();
        SymbolRef::from_id(self, id)
    }

    /// Returns the binary symbol of non-empty lists.
    pub fn list_symbol(&self) -> SymbolRef<'_> {
        let id = self.store().symbols().list_symbol();
        SymbolRef::from_id(self, id)
    }

    /// Returns the symbol of the empty list.
    pub fn empty_list_symbol(&self) -> SymbolRef<'_> {
        let id = self.store().symbols().empty_list_symbol();
        SymbolRef::from_id(self, id)
    }

    /// Registers the given term as a root, which keeps it alive until
    /// [TermPool::unprotect_root] is called with the returned index.
    pub fn protect_root<'a, 'b>(&self, term: &'b impl Term<'a, 'b>) -> Result<RootIndex, TermPoolError> {
        self.check_owner(term.pool())?;
        Ok(self.store_mut().protect_root(term.node()))
    }

    /// Removes the given root. Using the index afterwards panics.
    pub fn unprotect_root(&self, root: RootIndex) {
        self.store_mut().unprotect_root(root);
    }

    /// Returns the term of the given root.
    pub fn root(&self, root: RootIndex) -> ATerm {
        let node = {
            let mut store = self.store_mut();
            let node = store.root(root);
            store.retain(node);
            node
        };

        ATerm::from_node(self.clone(), node)
    }

    /// Returns the number of live terms, including the empty list.
    pub fn len(&self) -> usize {
        self.store().len()
    }

    /// Returns true iff the pool contains no terms, which never happens since
    /// the empty list is always present.
    pub fn is_empty(&self) -> bool {
        self.store().is_empty()
    }

    /// Returns the number of live symbols, including the reserved ones.
    pub fn number_of_symbols(&self) -> usize {
        self.store().symbols().len()
    }

    /// Returns the number of blocks that the allocator has obtained so far.
    pub fn blocks_allocated(&self) -> usize {
        self.store().allocator().blocks_allocated()
    }

    /// Returns the number of references to the given term, counting handles,
    /// parent terms and roots.
    pub fn reference_count<'a, 'b>(&self, term: &'b impl Term<'a, 'b>) -> usize {
        self.store().reference_count(term.node())
    }

    /// Checks all internal invariants of the pool.
    pub fn verify(&self) -> Result<(), TermPoolError> {
        self.store().verify()
    }

    /// Returns a snapshot of the metrics of the pool, can be formatted and written to output.
    pub fn metrics(&self) -> TermPoolMetrics {
        let store = self.store();

        TermPoolMetrics {
            terms: store.len(),
            symbols: store.symbols().len(),
            roots: store.roots().len(),
            root_insertions: store.roots().number_of_insertions(),
            table_capacity: store.table().capacity(),
            longest_chain: store.table().longest_chain(store.allocator()),
            blocks_allocated: store.allocator().blocks_allocated(),
            size_classes: store.allocator().class_usage().collect(),
        }
    }

    /// Consumes this handle of the pool and reports the terms, symbols and
    /// roots that are still alive besides the reserved ones.
    pub fn shutdown(self) -> Result<(), TermPoolError> {
        let store = self.store();

        let terms = store.len() - 1;
        let symbols = store
            .symbols()
            .iter()
            .filter(|(_, symbol)| !symbol.is_permanent())
            .count();
        let roots = store.roots().len();

        debug!("Shutting down term pool, {}", TermPoolMetrics::fmt_summary(terms, symbols, roots));
        if terms == 0 && symbols == 0 && roots == 0 {
            return Ok(());
        }

        for (node, entry) in store.allocator().iter() {
            if node != store.empty_list() {
                warn!(
                    "Term {node:?} with symbol {} is alive at shutdown with reference count {}",
                    store.symbols().name(entry.symbol()),
                    entry.reference_count()
                );
            }
        }

        for (_, symbol) in store.symbols().iter().filter(|(_, symbol)| !symbol.is_permanent()) {
            warn!(
                "Symbol {} with arity {} is alive at shutdown with reference count {}",
                symbol.name(),
                symbol.arity(),
                symbol.reference_count()
            );
        }

        for (root, node) in store.roots().iter() {
            warn!("Root {root:?} still protects {node:?} at shutdown");
        }

        Err(TermPoolError::LeakedTerms { terms, symbols, roots })
    }

    /// Returns true iff both handles refer to the same pool.
    pub fn ptr_eq(&self, other: &TermPool) -> bool {
        Rc::ptr_eq(&self.store, &other.store)
    }

    /// An arbitrary but fixed order on pools, used to order handles of different pools.
    pub(crate) fn ptr_cmp(&self, other: &TermPool) -> Ordering {
        Rc::as_ptr(&self.store).cmp(&Rc::as_ptr(&other.store))
    }

    pub(crate) fn store(&self) -> Ref<'_, TermStore> {
        self.store.borrow()
    }

    pub(crate) fn store_mut(&self) -> RefMut<'_, TermStore> {
        self.store.borrow_mut()
    }

    fn check_owner(&self, pool: &TermPool) -> Result<(), TermPoolError> {
        if self.ptr_eq(pool) {
            Ok(())
        } else {
            Err(TermPoolError::ForeignTerm)
        }
    }
}

impl fmt::Debug for TermPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.store())
    }
}

/// The metrics of a [TermPool] at the moment [TermPool::metrics] was called.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TermPoolMetrics {
    pub terms: usize,
    pub symbols: usize,
    pub roots: usize,
    pub root_insertions: u64,
    pub table_capacity: usize,
    pub longest_chain: usize,
    pub blocks_allocated: usize,

    /// The number of blocks and the free list length of every size class in use.
    pub size_classes: Vec<(SizeClass, usize, usize)>,
}

impl TermPoolMetrics {
    fn fmt_summary(terms: usize, symbols: usize, roots: usize) -> String {
        format!("there are {terms} terms, {symbols} symbols and {roots} roots")
    }
}

impl fmt::Display for TermPoolMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "There are {} terms, {} symbols and {} roots ({} insertions)",
            self.terms, self.symbols, self.roots, self.root_insertions
        )?;
        write!(
            f,
            "Table: {} buckets, longest chain {}. Allocator: {} blocks",
            self.table_capacity, self.longest_chain, self.blocks_allocated
        )?;

        for (class, blocks, free) in &self.size_classes {
            write!(f, "\n  size class {class}: {blocks} blocks, {free} free slots")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use hcons_utilities::test_logger;

    use super::*;

    #[test]
    fn test_metrics() {
        test_logger();

        let pool = TermPool::new().unwrap();
        let one = pool.create_int(1).unwrap();
        let f = pool.create_symbol("f", 1);
        let term = pool.create_term(&f, &[one]).unwrap();

        let metrics = pool.metrics();
        assert_eq!(metrics.terms, 3);
        assert_eq!(metrics.symbols, 4);
        assert_eq!(metrics.table_capacity, 1 << 14);
        assert!(metrics.blocks_allocated >= 1);
        assert!(metrics.to_string().starts_with("There are 3 terms, 4 symbols and 0 roots"));

        drop(term);
        assert_eq!(pool.metrics().terms, 2);
    }

    #[test]
    fn test_shutdown_without_leaks() {
        test_logger();

        let pool = TermPool::new().unwrap();
        {
            let a = pool.create_symbol("a", 0);
            let _term = pool.create_constant(&a).unwrap();
        }

        assert_eq!(pool.shutdown(), Ok(()));
    }
}
