#![forbid(unsafe_code)]

use std::fmt;

use crate::ATerm;
use crate::ATermRef;
use crate::Term;
use crate::TermPool;
use crate::TermPoolError;
use crate::storage::RootIndex;

/// A scoped registration of a term as root of its [TermPool].
///
/// The term stays alive for as long as the guard exists, independently of
/// any [ATerm] handle. The root is removed when the guard is dropped, which
/// also happens when the scope is left by unwinding.
pub struct Protected {
    pool: TermPool,
    root: RootIndex,
}

impl Protected {
    /// Registers the given term as a root.
    pub fn new<'a, 'b>(term: &'b impl Term<'a, 'b>) -> Result<Protected, TermPoolError> {
        let pool = term.pool().clone();
        let root = pool.protect_root(term)?;
        Ok(Protected { pool, root })
    }

    /// Returns the protected term.
    pub fn get(&self) -> ATermRef<'_> {
        let node = self.pool.store().root(self.root);
        ATermRef::from_node(&self.pool, node)
    }

    /// Returns an owning handle to the protected term.
    pub fn term(&self) -> ATerm {
        self.pool.root(self.root)
    }

    /// Returns the index of the root in the pool.
    pub fn root(&self) -> RootIndex {
        self.root
    }

    /// Protects the given term instead of the current one.
    pub fn replace<'a, 'b>(&mut self, term: &'b impl Term<'a, 'b>) -> Result<(), TermPoolError> {
        let root = self.pool.protect_root(term)?;
        self.pool.unprotect_root(std::mem::replace(&mut self.root, root));
        Ok(())
    }
}

impl Drop for Protected {
    fn drop(&mut self) {
        self.pool.unprotect_root(self.root);
    }
}

impl fmt::Debug for Protected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Protected({:?}, {})", self.root, self.get())
    }
}
