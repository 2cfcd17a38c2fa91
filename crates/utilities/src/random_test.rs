use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::test_logger;

/// The environment variable that fixes the seed of [random_test].
pub const SEED_VARIABLE: &str = "HCONS_SEED";

/// Runs `test_function` for the given number of iterations with a single
/// random number generator. The seed is printed so that a failing run can be
/// reproduced by setting `HCONS_SEED`.
pub fn random_test<F>(iterations: usize, test_function: F)
where
    F: FnMut(&mut StdRng),
{
    let seed = match std::env::var(SEED_VARIABLE) {
        Ok(value) => {
            let seed = value
                .parse::<u64>()
                .unwrap_or_else(|_| panic!("{SEED_VARIABLE} must be a valid u64, got {value}"));
            println!("seed: {seed} (fixed by {SEED_VARIABLE})");
            seed
        }
        Err(_) => {
            let seed: u64 = rand::random();
            println!("random seed: {seed} (use {SEED_VARIABLE}=<seed> to set a fixed seed)");
            seed
        }
    };

    run_seeded(seed, iterations, test_function);
}

/// Same as [random_test], but always uses the given seed.
pub fn random_test_seeded<F>(seed: u64, iterations: usize, test_function: F)
where
    F: FnMut(&mut StdRng),
{
    println!("seed: {seed}");
    run_seeded(seed, iterations, test_function);
}

fn run_seeded<F>(seed: u64, iterations: usize, mut test_function: F)
where
    F: FnMut(&mut StdRng),
{
    test_logger();

    let mut rng = StdRng::seed_from_u64(seed);
    for _ in 0..iterations {
        test_function(&mut rng);
    }
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let mut first = Vec::new();
        random_test_seeded(1234, 10, |rng| first.push(rng.random::<u64>()));

        let mut second = Vec::new();
        random_test_seeded(1234, 10, |rng| second.push(rng.random::<u64>()));

        assert_eq!(first, second, "The same seed should produce the same sequence");
        assert_eq!(first.len(), 10);
    }
}
