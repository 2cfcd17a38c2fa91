#![forbid(unsafe_code)]

use thiserror::Error;

/// The errors that can be reported by the term pool.
///
/// Only [TermPoolError::OutOfMemory] and the argument errors are returned by
/// term construction. A violated internal invariant is a bug elsewhere in the
/// program and panics with an [TermPoolError::InconsistentState] message,
/// except when it is found by [crate::TermPool::verify].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TermPoolError {
    #[error("Out of memory while allocating a block of {words} words for size class {class}")]
    OutOfMemory { class: usize, words: usize },

    #[error("Function symbol {name} has arity {arity}, but {given} arguments were given")]
    InvalidArity { name: String, arity: usize, given: usize },

    #[error("The argument belongs to a different term pool")]
    ForeignTerm,

    #[error("Internal consistency violation: {0}")]
    InconsistentState(String),

    #[error("{terms} terms, {symbols} symbols and {roots} roots are still alive at shutdown")]
    LeakedTerms { terms: usize, symbols: usize, roots: usize },
}

/// Panics with an [TermPoolError::InconsistentState] message. Used for the
/// invariant violations that must never be silently ignored.
#[cold]
#[track_caller]
pub(crate) fn consistency_violation(message: String) -> ! {
    panic!("{}", TermPoolError::InconsistentState(message))
}
