#![forbid(unsafe_code)]

use std::fmt;
use std::hash::BuildHasher;
use std::rc::Rc;

use rustc_hash::FxBuildHasher;

use hcons_utilities::debug_trace;

use crate::error::consistency_violation;

/// The number of buckets the symbol table starts with.
const INITIAL_SYMBOL_BUCKETS: usize = 64;

/// The name of the pseudo-symbol that is the head of every integer term.
pub const INT_SYMBOL_NAME: &str = "<aterm_int>";

/// The name of the binary symbol that constructs a non-empty list.
pub const LIST_SYMBOL_NAME: &str = "<list_constructor>";

/// The name of the constant that represents the empty list.
pub const EMPTY_LIST_SYMBOL_NAME: &str = "<empty_list>";

/// The numeric identifier of a function symbol in the [SymbolTable]. The
/// identifier of a destroyed symbol can be handed out again.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct SymbolId(u32);

impl SymbolId {
    /// Returns the identifier as an index into the table.
    pub fn index(self) -> usize {
        self.0 as usize
    }

    fn new(index: usize) -> SymbolId {
        let index = u32::try_from(index)
            .unwrap_or_else(|_| consistency_violation(format!("Symbol index {index} does not fit in 32 bits")));
        SymbolId(index)
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A function symbol as stored in the table.
#[derive(Debug)]
pub struct SharedSymbol {
    name: Rc<str>,
    arity: usize,
    reference_count: usize,

    /// Permanent symbols are never destroyed, regardless of their count.
    permanent: bool,
}

impl SharedSymbol {
    /// Returns the name of the function symbol.
    pub fn name(&self) -> &Rc<str> {
        &self.name
    }

    /// Returns the arity of the function symbol.
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Returns the number of references to this symbol.
    pub fn reference_count(&self) -> usize {
        self.reference_count
    }

    /// Returns true iff the symbol can never be destroyed.
    pub fn is_permanent(&self) -> bool {
        self.permanent
    }
}

enum Entry {
    Used(SharedSymbol),

    /// A destroyed symbol, points to the next entry of the free list.
    Free(Option<SymbolId>),
}

/// Interns `(name, arity)` pairs into reference counted [SymbolId]s, so that
/// two requests for the same name and arity share one entry.
///
/// # Details
///
/// The table is a vector of entries addressed by [SymbolId], with an index of
/// buckets on top. A bucket is scanned linearly, which is fine since there are
/// far fewer symbols than terms. Destroyed entries are chained into a free
/// list and reused.
pub struct SymbolTable {
    entries: Vec<Entry>,
    buckets: Vec<Vec<SymbolId>>,
    free: Option<SymbolId>,
    len: usize,

    int_symbol: SymbolId,
    list_symbol: SymbolId,
    empty_list_symbol: SymbolId,
}

impl SymbolTable {
    /// Creates a table that contains only the permanent symbols.
    pub fn new() -> SymbolTable {
        let mut table = SymbolTable {
            entries: Vec::new(),
            buckets: vec![Vec::new(); INITIAL_SYMBOL_BUCKETS],
            free: None,
            len: 0,
            int_symbol: SymbolId(0),
            list_symbol: SymbolId(0),
            empty_list_symbol: SymbolId(0),
        };

        table.int_symbol = table.create_permanent(INT_SYMBOL_NAME, 0);
        table.list_symbol = table.create_permanent(LIST_SYMBOL_NAME, 2);
        table.empty_list_symbol = table.create_permanent(EMPTY_LIST_SYMBOL_NAME, 0);
        table
    }

    /// Returns the symbol with the given name and arity, creating it when it
    /// does not exist yet. The returned symbol has been retained once.
    pub fn create<N>(&mut self, name: N, arity: usize) -> SymbolId
    where
        N: Into<String> + AsRef<str>,
    {
        let bucket = self.bucket_of(name.as_ref(), arity);

        if let Some(id) = self.buckets[bucket].iter().copied().find(|id| {
            let symbol = self.get(*id);
            symbol.arity == arity && *symbol.name == *name.as_ref()
        }) {
            self.retain(id);
            return id;
        }

        let symbol = SharedSymbol {
            name: Rc::from(name.into()),
            arity,
            reference_count: 1,
            permanent: false,
        };

        self.insert(symbol)
    }

    /// Increments the reference count of the given symbol.
    pub fn retain(&mut self, id: SymbolId) {
        let symbol = self.get_mut(id);
        symbol.reference_count += 1;
    }

    /// Decrements the reference count of the given symbol, and destroys it
    /// when the count becomes zero. Returns true iff the symbol was destroyed.
    pub fn release(&mut self, id: SymbolId) -> bool {
        let symbol = self.get_mut(id);
        if symbol.reference_count == 0 {
            consistency_violation(format!(
                "Reference count of symbol {} with arity {} underflows",
                symbol.name, symbol.arity
            ));
        }

        symbol.reference_count -= 1;
        if symbol.reference_count > 0 || symbol.permanent {
            return false;
        }

        let name = symbol.name.clone();
        let arity = symbol.arity;
        let bucket = self.bucket_of(&name, arity);
        debug_trace!("Destroying symbol {name} with arity {arity}");

        let position = self.buckets[bucket]
            .iter()
            .position(|other| *other == id)
            .unwrap_or_else(|| consistency_violation(format!("Symbol {id} is not in bucket {bucket}")));
        self.buckets[bucket].swap_remove(position);

        self.entries[id.index()] = Entry::Free(self.free);
        self.free = Some(id);
        self.len -= 1;
        true
    }

    /// Returns the stored symbol for the given identifier.
    pub fn get(&self, id: SymbolId) -> &SharedSymbol {
        match self.entries.get(id.index()) {
            Some(Entry::Used(symbol)) => symbol,
            _ => consistency_violation(format!("Symbol {id} is used after it was destroyed")),
        }
    }

    /// Returns the name of the given symbol.
    pub fn name(&self, id: SymbolId) -> &Rc<str> {
        &self.get(id).name
    }

    /// Returns the arity of the given symbol.
    pub fn arity(&self, id: SymbolId) -> usize {
        self.get(id).arity
    }

    /// Returns the number of symbols, including the permanent ones.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true iff the table contains no symbols, which never happens
    /// since the permanent symbols are always present.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns an iterator over all symbols in the table.
    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &SharedSymbol)> {
        self.entries.iter().enumerate().filter_map(|(index, entry)| match entry {
            Entry::Used(symbol) => Some((SymbolId(index as u32), symbol)),
            Entry::Free(_) => None,
        })
    }

    /// Returns the pseudo-symbol of integer terms.
    pub fn int_symbol(&self) -> SymbolId {
        self.int_symbol
    }

    /// Returns the symbol of non-empty lists.
    pub fn list_symbol(&self) -> SymbolId {
        self.list_symbol
    }

    /// Returns the symbol of the empty list.
    pub fn empty_list_symbol(&self) -> SymbolId {
        self.empty_list_symbol
    }

    fn create_permanent(&mut self, name: &str, arity: usize) -> SymbolId {
        self.insert(SharedSymbol {
            name: Rc::from(name),
            arity,
            reference_count: 1,
            permanent: true,
        })
    }

    /// Stores a symbol that is known not to be in the table yet.
    fn insert(&mut self, symbol: SharedSymbol) -> SymbolId {
        if self.len >= self.buckets.len() {
            self.grow();
        }

        let bucket = self.bucket_of(&symbol.name, symbol.arity);
        debug_trace!("Creating symbol {} with arity {}", symbol.name, symbol.arity);

        let id = match self.free {
            Some(id) => {
                match self.entries[id.index()] {
                    Entry::Free(next) => self.free = next,
                    Entry::Used(_) => consistency_violation(format!("Free list of symbols points to used entry {id}")),
                }
                self.entries[id.index()] = Entry::Used(symbol);
                id
            }
            None => {
                self.entries.push(Entry::Used(symbol));
                SymbolId::new(self.entries.len() - 1)
            }
        };

        self.buckets[bucket].push(id);
        self.len += 1;
        id
    }

    /// Doubles the number of buckets and redistributes all symbols.
    fn grow(&mut self) {
        let mut buckets = vec![Vec::new(); self.buckets.len() * 2];
        let mask = buckets.len() - 1;

        for (id, symbol) in self.iter() {
            let bucket = bucket_hash(&symbol.name, symbol.arity) as usize & mask;
            buckets[bucket].push(id);
        }

        self.buckets = buckets;
    }

    fn get_mut(&mut self, id: SymbolId) -> &mut SharedSymbol {
        match self.entries.get_mut(id.index()) {
            Some(Entry::Used(symbol)) => symbol,
            _ => consistency_violation(format!("Symbol {id} is used after it was destroyed")),
        }
    }

    fn bucket_of(&self, name: &str, arity: usize) -> usize {
        bucket_hash(name, arity) as usize & (self.buckets.len() - 1)
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

fn bucket_hash(name: &str, arity: usize) -> u64 {
    FxBuildHasher.hash_one((name, arity))
}

#[cfg(test)]
mod tests {
    use hcons_utilities::test_logger;

    use super::*;

    #[test]
    fn test_symbol_sharing() {
        test_logger();

        let mut table = SymbolTable::new();

        let f1 = table.create("f", 2);
        let f2 = table.create("f", 2);
        let f3 = table.create("f", 1);

        assert_eq!(f1, f2, "Same name and arity should give the same symbol");
        assert_ne!(f1, f3, "The arity is part of the identity of a symbol");
        assert_eq!(table.get(f1).reference_count(), 2);
        assert_eq!(table.arity(f3), 1);
        assert_eq!(&**table.name(f3), "f");
    }

    #[test]
    fn test_symbol_destruction_and_reuse() {
        test_logger();

        let mut table = SymbolTable::new();
        let permanent = table.len();

        let f = table.create("f", 2);
        table.create("f", 2);
        assert!(!table.release(f), "The symbol is still referenced once");
        assert_eq!(table.len(), permanent + 1);

        assert!(table.release(f), "The last reference was released");
        assert_eq!(table.len(), permanent);

        let g = table.create("g", 3);
        assert_eq!(g, f, "The identifier of a destroyed symbol is reused");
        assert_eq!(&**table.name(g), "g");
    }

    #[test]
    fn test_permanent_symbols() {
        test_logger();

        let mut table = SymbolTable::new();
        let int_symbol = table.int_symbol();

        assert!(table.get(int_symbol).is_permanent());
        assert!(!table.release(int_symbol), "Permanent symbols are never destroyed");
        assert_eq!(&**table.name(int_symbol), INT_SYMBOL_NAME);
        assert_eq!(table.arity(table.list_symbol()), 2);
        assert_eq!(table.arity(table.empty_list_symbol()), 0);
    }

    #[test]
    #[should_panic(expected = "underflows")]
    fn test_symbol_reference_count_underflow() {
        let mut table = SymbolTable::new();
        let int_symbol = table.int_symbol();

        // Permanent symbols are not destroyed at zero, so a further release underflows.
        assert!(!table.release(int_symbol));
        table.release(int_symbol);
    }

    #[test]
    fn test_symbol_table_growth() {
        test_logger();

        let mut table = SymbolTable::new();
        let symbols: Vec<SymbolId> = (0..1000).map(|i| table.create(format!("f{i}"), i % 4)).collect();

        for (i, symbol) in symbols.iter().enumerate() {
            assert_eq!(table.create(format!("f{i}"), i % 4), *symbol);
            assert_eq!(table.get(*symbol).reference_count(), 2);
        }
    }
}
