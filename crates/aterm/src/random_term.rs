#![forbid(unsafe_code)]

use rand::Rng;
use rand::prelude::IteratorRandom;
use rustc_hash::FxHashSet;

use crate::ATerm;
use crate::TermPool;
use crate::TermPoolError;

/// Create a random term consisting of the given symbols and constants.
/// Performs iterations number of constructions, where the arguments of every
/// construction are chosen from the terms constructed so far, so subterms
/// are shared frequently.
pub fn random_term(
    pool: &TermPool,
    rng: &mut impl Rng,
    symbols: &[(String, usize)],
    constants: &[String],
    iterations: usize,
) -> Result<ATerm, TermPoolError> {
    assert!(!constants.is_empty(), "We need constants to be able to create a term");

    let mut subterms = FxHashSet::default();
    for name in constants {
        let symbol = pool.create_symbol(name, 0);
        subterms.insert(pool.create_constant(&symbol)?);
    }

    let mut result = subterms.iter().choose(rng).cloned();
    for _ in 0..iterations {
        let Some((name, arity)) = symbols.iter().choose(rng) else {
            break;
        };

        let mut arguments = Vec::with_capacity(*arity);
        for _ in 0..*arity {
            arguments.extend(subterms.iter().choose(rng).cloned());
        }

        let symbol = pool.create_symbol(name, *arity);
        let term = pool.create_term(&symbol, &arguments)?;

        // Make this term available as another subterm that can be used.
        subterms.insert(term.clone());
        result = Some(term);
    }

    Ok(result.expect("There is at least one constant"))
}
