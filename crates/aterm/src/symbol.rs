#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;
use std::rc::Rc;

use crate::TermPool;
use crate::storage::SymbolId;

/// The public interface for a function symbol. Can be used to write generic
/// functions that accept both [Symbol] and [SymbolRef].
///
/// See [crate::Term] for more information on how to use this trait with two lifetimes.
pub trait Symb<'a, 'b> {
    /// Obtain the symbol's name.
    fn name(&self) -> Rc<str>;

    /// Obtain the symbol's arity.
    fn arity(&self) -> usize;

    /// Create a copy of the symbol reference.
    fn copy(&'b self) -> SymbolRef<'a>;

    /// Returns the identifier of the symbol in its pool.
    fn id(&self) -> SymbolId;

    /// Returns the pool in which the symbol is stored.
    fn pool(&self) -> &TermPool;
}

/// A reference to a function symbol in the symbol table, which is kept alive
/// by a [Symbol] or a term for the lifetime `'a`.
pub struct SymbolRef<'a> {
    pool: &'a TermPool,
    id: SymbolId,
}

impl<'a> SymbolRef<'a> {
    /// Protects the symbol, yielding a [Symbol].
    pub fn protect(&self) -> Symbol {
        self.pool.store_mut().retain_symbol(self.id);
        Symbol::from_id(self.pool.clone(), self.id)
    }

    pub(crate) fn from_id(pool: &'a TermPool, id: SymbolId) -> SymbolRef<'a> {
        SymbolRef { pool, id }
    }
}

impl<'a> Symb<'a, '_> for SymbolRef<'a> {
    fn name(&self) -> Rc<str> {
        self.pool.store().symbols().name(self.id).clone()
    }

    fn arity(&self) -> usize {
        self.pool.store().symbols().arity(self.id)
    }

    fn copy(&self) -> SymbolRef<'a> {
        SymbolRef::from_id(self.pool, self.id)
    }

    fn id(&self) -> SymbolId {
        self.id
    }

    fn pool(&self) -> &TermPool {
        self.pool
    }
}

impl fmt::Display for SymbolRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl fmt::Debug for SymbolRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name(), self.arity())
    }
}

impl PartialEq for SymbolRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.pool.ptr_eq(other.pool)
    }
}

impl Eq for SymbolRef<'_> {}

impl Hash for SymbolRef<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

impl PartialOrd for SymbolRef<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SymbolRef<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id).then_with(|| self.pool.ptr_cmp(other.pool))
    }
}

/// An owning handle to a function symbol, with the same interface as
/// [SymbolRef]. The symbol is destroyed once neither a handle nor a term
/// refers to it.
pub struct Symbol {
    pool: TermPool,
    id: SymbolId,
}

impl Symbol {
    /// Takes over a reference to the given symbol that has already been retained.
    pub(crate) fn from_id(pool: TermPool, id: SymbolId) -> Symbol {
        Symbol { pool, id }
    }

    /// Returns a borrow from the symbol.
    pub fn get(&self) -> SymbolRef<'_> {
        SymbolRef::from_id(&self.pool, self.id)
    }
}

impl<'a, 'b> Symb<'a, 'b> for Symbol
where
    'b: 'a,
{
    fn name(&self) -> Rc<str> {
        self.get().name()
    }

    fn arity(&self) -> usize {
        self.get().arity()
    }

    fn copy(&'b self) -> SymbolRef<'a> {
        self.get()
    }

    fn id(&self) -> SymbolId {
        self.id
    }

    fn pool(&self) -> &TermPool {
        &self.pool
    }
}

impl Drop for Symbol {
    fn drop(&mut self) {
        self.pool.store_mut().release_symbol(self.id);
    }
}

impl Clone for Symbol {
    fn clone(&self) -> Self {
        self.get().protect()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.get())
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.get() == other.get()
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

#[cfg(test)]
mod tests {
    use hcons_utilities::test_logger;

    use crate::aterm::Term;
    use super::*;

    #[test]
    fn test_symbol_handles() {
        test_logger();

        let pool = TermPool::new().unwrap();
        let reserved = pool.number_of_symbols();

        let f = pool.create_symbol("f", 2);
        let g = f.clone();
        assert_eq!(f, g);
        assert_eq!(&*f.name(), "f");
        assert_eq!(f.arity(), 2);
        assert_eq!(format!("{f:?}"), "f/2");
        assert_ne!(f.get(), pool.create_symbol("f", 1).get());

        drop(f);
        assert_eq!(pool.number_of_symbols(), reserved + 1, "The clone keeps the symbol alive");

        drop(g);
        assert_eq!(pool.number_of_symbols(), reserved);
    }

    #[test]
    fn test_symbol_order_across_pools() {
        test_logger();

        let first = TermPool::new().unwrap();
        let second = TermPool::new().unwrap();
        let f = first.create_symbol("f", 2);
        let g = second.create_symbol("f", 2);

        assert_eq!(f.id(), g.id(), "Both pools reuse the same identifier");
        assert_ne!(f.get(), g.get());
        assert_ne!(f.get().cmp(&g.get()), Ordering::Equal, "The order agrees with equality");
    }

    #[test]
    fn test_symbol_kept_alive_by_term() {
        test_logger();

        let pool = TermPool::new().unwrap();
        let reserved = pool.number_of_symbols();

        let term = {
            let a = pool.create_symbol("a", 0);
            pool.create_constant(&a).unwrap()
        };
        assert_eq!(pool.number_of_symbols(), reserved + 1);

        let symbol = term.get().get_head_symbol().protect();
        drop(term);
        assert_eq!(&*symbol.name(), "a");

        drop(symbol);
        assert_eq!(pool.number_of_symbols(), reserved);
    }
}
