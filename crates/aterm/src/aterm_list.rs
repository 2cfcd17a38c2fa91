//!
//! Lists of terms, encoded as nested applications of the list constructor.
//!
#![forbid(unsafe_code)]

use std::fmt;

use delegate::delegate;
use itertools::Itertools;

use crate::ATerm;
use crate::ATermArgs;
use crate::ATermRef;
use crate::SymbolRef;
use crate::Term;
use crate::TermIterator;
use crate::TermPool;
use crate::TermPoolError;
use crate::storage::NodeRef;

/// Represents a list of terms.
///
/// # Details
///
/// Internally, uses the two reserved function symbols `<list_constructor>`
/// and `<empty_list>` to represent lists. The list constructor has arity 2,
/// where the first argument is the head of the list and the second argument
/// is the tail of the list. The empty list is a constant that is never
/// reclaimed.
pub struct ATermList {
    term: ATerm,
}

impl ATermList {
    /// Obtain the head, i.e. the first element, of the list.
    pub fn head(&self) -> ATerm {
        debug_assert!(!self.is_empty(), "The empty list has no head");
        self.term.arg(0).protect()
    }

    /// Obtain the tail, i.e. the remainder, of the list.
    pub fn tail(&self) -> ATermList {
        debug_assert!(!self.is_empty(), "The empty list has no tail");
        ATermList::from(self.term.arg(1).protect())
    }

    /// Constructs a new list with the given item as the head and the current list as the tail.
    pub fn cons<'a, 'b>(&self, item: &'b impl Term<'a, 'b>) -> Result<ATermList, TermPoolError> {
        let pool = self.term.pool();
        let term = pool.create_term(&pool.list_symbol(), &[item.copy(), self.term.copy()])?;
        Ok(ATermList::from(term))
    }

    /// Returns true iff the list is empty.
    pub fn is_empty(&self) -> bool {
        self.term.is_empty_list()
    }

    /// Returns the number of elements in the list.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Returns an iterator over all elements in the list.
    pub fn iter(&self) -> ATermListIter {
        ATermListIter {
            current: self.clone(),
        }
    }

    /// Converts the list into a vector.
    pub fn to_vec(&self) -> Vec<ATerm> {
        self.iter().collect()
    }
}

impl<'a, 'b> Term<'a, 'b> for ATermList
where
    'b: 'a,
{
    delegate! {
        to self.term {
            fn protect(&self) -> ATerm;
            fn arg(&'b self, index: usize) -> ATermRef<'a>;
            fn arguments(&'b self) -> ATermArgs<'a>;
            fn copy(&'b self) -> ATermRef<'a>;
            fn get_head_symbol(&'b self) -> SymbolRef<'a>;
            fn iter(&'b self) -> TermIterator<'a>;
            fn node(&self) -> NodeRef;
            fn pool(&self) -> &TermPool;
        }
    }
}

impl Clone for ATermList {
    fn clone(&self) -> Self {
        ATermList {
            term: self.term.clone(),
        }
    }
}

impl PartialEq for ATermList {
    fn eq(&self, other: &Self) -> bool {
        self.term == other.term
    }
}

impl Eq for ATermList {}

impl From<ATermList> for ATerm {
    fn from(value: ATermList) -> Self {
        value.term
    }
}

impl From<ATerm> for ATermList {
    fn from(value: ATerm) -> Self {
        debug_assert!(
            value.is_list() || value.is_empty_list(),
            "Can only convert a list term, got {value}"
        );
        ATermList { term: value }
    }
}

impl IntoIterator for ATermList {
    type IntoIter = ATermListIter;
    type Item = ATerm;

    fn into_iter(self) -> Self::IntoIter {
        ATermListIter { current: self }
    }
}

impl IntoIterator for &ATermList {
    type IntoIter = ATermListIter;
    type Item = ATerm;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Display for ATermList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.iter().format(", "))
    }
}

impl fmt::Debug for ATermList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

/// The iterator over the elements of an [ATermList].
pub struct ATermListIter {
    current: ATermList,
}

impl Iterator for ATermListIter {
    type Item = ATerm;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current.is_empty() {
            None
        } else {
            let head = self.current.head();
            self.current = self.current.tail();
            Some(head)
        }
    }
}
