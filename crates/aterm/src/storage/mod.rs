//! The engine behind the [crate::TermPool].
//!
//! A term is either a function application `f(t1, ..., tn)` of a symbol `f`
//! with arity `n`, or an integer literal. Terms are stored maximally shared:
//! the [TermHashTable] guarantees that at most one node exists for every
//! structure, so two terms are equal iff they are the same node.
//!
//! Nodes live in the [SizeClassAllocator] and are addressed by a [NodeRef]
//! instead of a pointer. The [TermStore] combines the components and keeps
//! the reference counts of all nodes and symbols exact.

mod allocator;
mod hash_table;
mod root_set;
mod symbol_table;
mod term_store;

pub use allocator::*;
pub use hash_table::*;
pub use root_set::*;
pub use symbol_table::*;
pub use term_store::*;
