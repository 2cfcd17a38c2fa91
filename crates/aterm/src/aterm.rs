#![forbid(unsafe_code)]

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;

use crate::SymbolRef;
use crate::TermPool;
use crate::storage::NodeRef;

/// The Term trait represents a first-order term of a [TermPool]. It provides
/// methods to access the term's properties.
///
/// # Details
///
/// The trait has two lifetimes so that it can be implemented both by the
/// owning [ATerm], which has no lifetime, and by the borrowed [ATermRef<'a>]
/// whose lifetime is bound by `'a`. For [ATerm] we require that `'b: 'a`,
/// so the returned [ATermRef<'a>] never outlives the term it was obtained from.
pub trait Term<'a, 'b> {
    /// Returns an owning handle to the term, which retains it.
    fn protect(&self) -> ATerm;

    /// Returns the indexed argument of the term.
    fn arg(&'b self, index: usize) -> ATermRef<'a>;

    /// Returns the arguments of the term as an iterator.
    fn arguments(&'b self) -> ATermArgs<'a>;

    /// Makes a copy of the term with the same lifetime as itself.
    fn copy(&'b self) -> ATermRef<'a>;

    /// Returns the function symbol of the term.
    fn get_head_symbol(&'b self) -> SymbolRef<'a>;

    /// Returns an iterator over all subterms in pre order.
    fn iter(&'b self) -> TermIterator<'a>;

    /// Returns the node of the term, which identifies it within its pool.
    fn node(&self) -> NodeRef;

    /// Returns the pool in which the term is stored.
    fn pool(&self) -> &TermPool;

    /// Returns the number of arguments.
    fn arity(&self) -> usize {
        self.pool().store().arity(self.node())
    }

    /// Returns true iff the term is an integer literal.
    fn is_int(&self) -> bool {
        self.int_value().is_some()
    }

    /// Returns the value of an integer literal, or None for an application.
    fn int_value(&self) -> Option<i64> {
        self.pool().store().int_value(self.node())
    }

    /// Returns true iff the term is a non-empty list.
    fn is_list(&self) -> bool {
        let store = self.pool().store();
        store.symbol(self.node()) == store.symbols().list_symbol()
    }

    /// Returns true iff the term is the empty list.
    fn is_empty_list(&self) -> bool {
        self.node() == self.pool().store().empty_list()
    }
}

/// This represents a lifetime bound reference to an existing [ATerm]. It
/// does not change any reference count.
pub struct ATermRef<'a> {
    pool: &'a TermPool,
    node: NodeRef,
}

impl<'a> ATermRef<'a> {
    /// Creates a reference to a node that is kept alive for `'a`.
    pub(crate) fn from_node(pool: &'a TermPool, node: NodeRef) -> ATermRef<'a> {
        ATermRef { pool, node }
    }
}

impl<'a> Term<'a, '_> for ATermRef<'a> {
    fn protect(&self) -> ATerm {
        self.pool.store_mut().retain(self.node);
        ATerm::from_node(self.pool.clone(), self.node)
    }

    fn arg(&self, index: usize) -> ATermRef<'a> {
        let node = self.pool.store().argument(self.node, index);
        ATermRef::from_node(self.pool, node)
    }

    fn arguments(&self) -> ATermArgs<'a> {
        ATermArgs::new(self.copy())
    }

    fn copy(&self) -> ATermRef<'a> {
        ATermRef::from_node(self.pool, self.node)
    }

    fn get_head_symbol(&self) -> SymbolRef<'a> {
        let symbol = self.pool.store().symbol(self.node);
        SymbolRef::from_id(self.pool, symbol)
    }

    fn iter(&self) -> TermIterator<'a> {
        TermIterator::new(self.copy())
    }

    fn node(&self) -> NodeRef {
        self.node
    }

    fn pool(&self) -> &TermPool {
        self.pool
    }
}

/// Pending output of the term printer.
enum Print<'a> {
    Term(ATermRef<'a>),
    Text(&'static str),
}

/// Schedules the given arguments separated by commas, followed by `close`.
fn push_arguments<'a>(stack: &mut Vec<Print<'a>>, arguments: Vec<ATermRef<'a>>, close: &'static str) {
    stack.push(Print::Text(close));
    for (index, argument) in arguments.into_iter().enumerate().rev() {
        stack.push(Print::Term(argument));
        if index > 0 {
            stack.push(Print::Text(", "));
        }
    }
}

/// Prints applications as `f(a, b)`, integers as decimals and lists as `[a, b]`.
/// Uses an explicit stack, so arbitrarily deep terms can be printed.
impl fmt::Display for ATermRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut stack = vec![Print::Term(self.copy())];

        while let Some(item) = stack.pop() {
            match item {
                Print::Text(text) => f.write_str(text)?,
                Print::Term(term) => {
                    if let Some(value) = term.int_value() {
                        write!(f, "{value}")?;
                    } else if term.is_list() || term.is_empty_list() {
                        let mut elements = Vec::new();
                        let mut current = term;
                        while current.is_list() {
                            elements.push(current.arg(0));
                            current = current.arg(1);
                        }

                        f.write_str("[")?;
                        push_arguments(&mut stack, elements, "]");
                    } else if term.arity() == 0 {
                        write!(f, "{}", term.get_head_symbol())?;
                    } else {
                        write!(f, "{}(", term.get_head_symbol())?;
                        push_arguments(&mut stack, term.arguments().collect(), ")");
                    }
                }
            }
        }

        Ok(())
    }
}

impl fmt::Debug for ATermRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl Hash for ATermRef<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.node.hash(state)
    }
}

impl PartialEq for ATermRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.node == other.node && self.pool.ptr_eq(other.pool)
    }
}

impl Eq for ATermRef<'_> {}

impl PartialOrd for ATermRef<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ATermRef<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.node
            .cmp(&other.node)
            .then_with(|| self.pool.ptr_cmp(other.pool))
    }
}

/// An owning handle to a term. Cloning retains the term and dropping releases
/// it, the term is reclaimed as soon as nothing refers to it anymore.
pub struct ATerm {
    pool: TermPool,
    node: NodeRef,
}

impl ATerm {
    /// Takes over a reference to the given node that has already been retained.
    pub(crate) fn from_node(pool: TermPool, node: NodeRef) -> ATerm {
        ATerm { pool, node }
    }

    /// Returns a borrow from the term.
    pub fn get(&self) -> ATermRef<'_> {
        ATermRef::from_node(&self.pool, self.node)
    }
}

impl<'a, 'b> Term<'a, 'b> for ATerm
where
    'b: 'a,
{
    fn protect(&self) -> ATerm {
        self.clone()
    }

    fn arg(&'b self, index: usize) -> ATermRef<'a> {
        self.get().arg(index)
    }

    fn arguments(&'b self) -> ATermArgs<'a> {
        self.get().arguments()
    }

    fn copy(&'b self) -> ATermRef<'a> {
        self.get()
    }

    fn get_head_symbol(&'b self) -> SymbolRef<'a> {
        self.get().get_head_symbol()
    }

    fn iter(&'b self) -> TermIterator<'a> {
        self.get().iter()
    }

    fn node(&self) -> NodeRef {
        self.node
    }

    fn pool(&self) -> &TermPool {
        &self.pool
    }
}

impl Drop for ATerm {
    fn drop(&mut self) {
        self.pool.store_mut().release(self.node);
    }
}

impl Clone for ATerm {
    fn clone(&self) -> Self {
        self.pool.store_mut().retain(self.node);
        ATerm::from_node(self.pool.clone(), self.node)
    }
}

impl fmt::Display for ATerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}

impl fmt::Debug for ATerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.get())
    }
}

impl Hash for ATerm {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.node.hash(state)
    }
}

impl PartialEq for ATerm {
    fn eq(&self, other: &Self) -> bool {
        self.get() == other.get()
    }
}

impl Eq for ATerm {}

impl PartialOrd for ATerm {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ATerm {
    fn cmp(&self, other: &Self) -> Ordering {
        self.get().cmp(&other.get())
    }
}

/// An iterator over the arguments of a term.
pub struct ATermArgs<'a> {
    term: ATermRef<'a>,
    arity: usize,
    index: usize,
}

impl<'a> ATermArgs<'a> {
    fn new(term: ATermRef<'a>) -> ATermArgs<'a> {
        let arity = term.arity();
        ATermArgs { term, arity, index: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.index == self.arity
    }
}

impl<'a> Iterator for ATermArgs<'a> {
    type Item = ATermRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index < self.arity {
            let result = self.term.arg(self.index);
            self.index += 1;
            Some(result)
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.arity - self.index;
        (remaining, Some(remaining))
    }
}

impl DoubleEndedIterator for ATermArgs<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.index < self.arity {
            self.arity -= 1;
            Some(self.term.arg(self.arity))
        } else {
            None
        }
    }
}

impl ExactSizeIterator for ATermArgs<'_> {}

/// An iterator over all subterms of the given [ATerm] in preorder traversal, i.e.,
/// for f(g(a), b) we visit f(g(a), b), g(a), a, b.
pub struct TermIterator<'a> {
    queue: VecDeque<ATermRef<'a>>,
}

impl<'a> TermIterator<'a> {
    pub fn new(term: ATermRef<'a>) -> TermIterator<'a> {
        TermIterator {
            queue: VecDeque::from([term]),
        }
    }
}

impl<'a> Iterator for TermIterator<'a> {
    type Item = ATermRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let term = self.queue.pop_back()?;

        // Put subterms in the queue
        for argument in term.arguments().rev() {
            self.queue.push_back(argument);
        }

        Some(term)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use hcons_utilities::test_logger;

    use super::*;
    use crate::symbol::Symb;

    #[test]
    fn test_term_iterator() {
        test_logger();

        let pool = TermPool::new().unwrap();
        let f = pool.create_symbol("f", 2);
        let g = pool.create_symbol("g", 1);
        let a = pool.create_symbol("a", 0);
        let b = pool.create_symbol("b", 0);

        let a_term = pool.create_constant(&a).unwrap();
        let b_term = pool.create_constant(&b).unwrap();
        let g_term = pool.create_term(&g, &[a_term.clone()]).unwrap();
        let t = pool.create_term(&f, &[g_term, b_term]).unwrap();

        let result: Vec<String> = t.iter().map(|term| term.to_string()).collect();
        assert_eq!(result, vec!["f(g(a), b)", "g(a)", "a", "b"]);
    }

    #[test]
    fn test_accessors() {
        test_logger();

        let pool = TermPool::new().unwrap();
        let f = pool.create_symbol("f", 2);
        let seven = pool.create_int(-7).unwrap();
        let list = pool.create_list([seven.clone()]).unwrap();
        let t = pool.create_term(&f, &[seven.copy(), list.copy()]).unwrap();

        assert_eq!(t.arity(), 2);
        assert!(!t.is_int());
        assert_eq!(t.int_value(), None);
        assert_eq!(t.get_head_symbol(), f.copy());
        assert_eq!(t.arg(0), seven.get());
        assert_eq!(t.arg(0).int_value(), Some(-7));
        assert!(t.arg(1).is_list());
        assert!(t.arg(1).arg(1).is_empty_list());
        assert_eq!(t.to_string(), "f(-7, [-7])");

        let arguments: Vec<ATermRef<'_>> = t.arguments().rev().collect();
        assert_eq!(arguments, vec![list.copy(), seven.copy()]);
        assert_eq!(t.arguments().len(), 2);
    }

    #[test]
    fn test_order_across_pools() {
        test_logger();

        let first = TermPool::new().unwrap();
        let second = TermPool::new().unwrap();
        let a = first.create_int(5).unwrap();
        let b = second.create_int(5).unwrap();

        assert_eq!(a.node(), b.node(), "Both pools use the same slot");
        assert_ne!(a, b);
        assert_ne!(a.cmp(&b), Ordering::Equal, "The order agrees with equality");
        assert_eq!(a.cmp(&b), b.cmp(&a).reverse());
        assert_ne!(a.get().cmp(&b.get()), Ordering::Equal);

        let set: BTreeSet<ATerm> = [a.clone(), b.clone(), a.clone()].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_clone_and_drop() {
        test_logger();

        let pool = TermPool::new().unwrap();
        let five = pool.create_int(5).unwrap();
        let copy = five.clone();
        assert_eq!(pool.reference_count(&five), 2);

        drop(copy);
        assert_eq!(pool.reference_count(&five), 1);

        let protected = five.get().protect();
        assert_eq!(pool.reference_count(&protected), 2);
        assert_eq!(protected, five);
    }
}
