//!
//! Benchmarks for the construction, lookup, inspection and reclamation of terms.
//!

use std::array::from_fn;
use std::collections::VecDeque;
use std::hint::black_box;

use criterion::Criterion;
use criterion::criterion_group;
use criterion::criterion_main;
use rand::SeedableRng;
use rand::rngs::StdRng;

use hcons_aterm::ATerm;
use hcons_aterm::ATermRef;
use hcons_aterm::Symb;
use hcons_aterm::Term;
use hcons_aterm::TermPool;
use hcons_aterm::random_term;

/// Creates a nested function application where f_0 = c and f_i = f(f_{i-1}, ..., f_{i-1}). The parameter `depth` sets `i` and `c` is given by `leaf_name`.
fn create_nested_function<const ARITY: usize>(pool: &TermPool, function_name: &str, leaf_name: &str, depth: usize) -> ATerm {
    debug_assert!(depth > 0, "Depth must be greater than 0");

    let f_symbol = pool.create_symbol(function_name, ARITY);
    let c_symbol = pool.create_symbol(leaf_name, 0);

    let c_term = pool.create_constant(&c_symbol).expect("Constant creation failed");

    let mut f_term = pool
        .create_term(&f_symbol, &from_fn::<_, ARITY, _>(|_| c_term.copy()))
        .expect("Term creation failed");

    for _ in 0..depth {
        let next = pool
            .create_term(&f_symbol, &from_fn::<_, ARITY, _>(|_| f_term.copy()))
            .expect("Term creation failed");
        f_term = next;
    }

    debug_assert_eq!(&*f_term.get_head_symbol().name(), function_name);
    debug_assert_eq!(f_term.get_head_symbol().arity(), ARITY);

    f_term
}

/// Builds the list [0, 1, ..., length - 1] of integers.
fn create_list(pool: &TermPool, length: i64) -> ATerm {
    let elements: Vec<ATerm> = (0..length)
        .map(|value| pool.create_int(value).expect("Integer creation failed"))
        .collect();

    pool.create_list(elements.iter().map(|element| element.copy()))
        .expect("List creation failed")
        .into()
}

/// Local function to count the number of subterms in a term.
fn inspect<'a>(term: &'a ATermRef<'a>, iterations: usize) -> u64 {
    let mut queue: VecDeque<ATermRef<'a>> = VecDeque::new();

    let mut count = 0;

    for _ in 0..iterations {
        // Simple breadth-first search to count elements
        queue.push_back(term.copy());

        while let Some(current_term) = queue.pop_front() {
            for arg in current_term.arguments() {
                count += 1;
                queue.push_back(arg);
            }
        }
    }

    count
}

fn benchmark_creation(c: &mut Criterion) {
    const SIZE: usize = 400000;

    c.bench_function("creation", |b| {
        b.iter(|| {
            let pool = TermPool::new().expect("Pool creation failed");
            black_box(create_nested_function::<2>(&pool, "f", "c", SIZE));
        });
    });
}

fn benchmark_lookup(c: &mut Criterion) {
    let _ = env_logger::try_init();

    const SIZE: usize = 400000;

    // Keep one instance alive, so that every construction is a lookup.
    let pool = TermPool::new().expect("Pool creation failed");
    let term = create_nested_function::<2>(&pool, "f", "c", SIZE);

    c.bench_function("lookup", |b| {
        b.iter(|| {
            black_box(create_nested_function::<2>(&pool, "f", "c", SIZE));
        })
    });

    drop(term);
}

fn benchmark_inspect(c: &mut Criterion) {
    const SIZE: usize = 20;
    const ITERATIONS: usize = 10;

    let pool = TermPool::new().expect("Pool creation failed");
    let term = create_nested_function::<2>(&pool, "f", "c", SIZE);
    assert_eq!(inspect(&term.copy(), 1), 4194302);

    c.bench_function("inspect", |b| {
        b.iter(|| {
            black_box(inspect(&term.copy(), ITERATIONS));
        });
    });
}

fn benchmark_reclamation(c: &mut Criterion) {
    const LENGTH: i64 = 100000;

    // The blocks of the first iteration are reused by all later iterations.
    let pool = TermPool::new().expect("Pool creation failed");

    c.bench_function("reclamation", |b| {
        b.iter(|| {
            let list = create_list(&pool, LENGTH);
            drop(black_box(list));
        });
    });
}

fn benchmark_random_terms(c: &mut Criterion) {
    let pool = TermPool::new().expect("Pool creation failed");
    let mut rng = StdRng::seed_from_u64(0);

    c.bench_function("random_terms", |b| {
        b.iter(|| {
            black_box(
                random_term(
                    &pool,
                    &mut rng,
                    &[("f".into(), 2), ("g".into(), 1), ("h".into(), 3)],
                    &["a".to_string(), "b".to_string()],
                    1000,
                )
                .expect("Random term creation failed"),
            );
        });
    });
}

criterion_group!(
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = benchmark_creation,
        benchmark_lookup,
        benchmark_inspect,
        benchmark_reclamation,
        benchmark_random_terms,
);
criterion_main!(benches);
