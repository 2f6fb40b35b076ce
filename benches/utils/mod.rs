//! Key sets and per-thread workloads shared by the benchmarks.
#![allow(dead_code)]
use rand::seq::SliceRandom;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

/// Something the benchmarks can use as a key or a value, and hand to
/// several threads at once.
pub trait BenchData: Clone + Debug + Eq + Hash + Send + Sync {
    /// `count` distinct items, the same ones for the same seed.
    fn distinct(count: usize, seed: u64) -> Vec<Self>;
}

fn distinct_by<A, F>(count: usize, seed: u64, mut make: F) -> Vec<A>
where
    A: Clone + Eq + Hash,
    F: FnMut(&mut SmallRng) -> A,
{
    let mut gen = SmallRng::seed_from_u64(seed);
    let mut seen = HashSet::with_capacity(count);
    let mut out = Vec::with_capacity(count);
    while out.len() < count {
        let next = make(&mut gen);
        if seen.insert(next.clone()) {
            out.push(next);
        }
    }
    out
}

impl BenchData for i64 {
    fn distinct(count: usize, seed: u64) -> Vec<Self> {
        distinct_by(count, seed, |gen| gen.random::<i64>())
    }
}

impl BenchData for Arc<String> {
    fn distinct(count: usize, seed: u64) -> Vec<Self> {
        distinct_by(count, seed, |gen| {
            let len = gen.random_range(5..20);
            Arc::new(
                (0..len)
                    .map(|_| gen.random_range(b'a'..=b'z') as char)
                    .collect(),
            )
        })
    }
}

/// A copy of `items` in a seeded random order.
pub fn shuffled<A: Clone>(items: &[A], seed: u64) -> Vec<A> {
    let mut gen = SmallRng::seed_from_u64(seed);
    let mut out = items.to_vec();
    out.shuffle(&mut gen);
    out
}

/// Deal `items` out round-robin into one batch per thread, so that every
/// thread touches the whole key range.
pub fn deal<A: Clone>(items: &[A], threads: usize) -> Vec<Vec<A>> {
    let mut batches = vec![Vec::with_capacity(items.len() / threads + 1); threads];
    for (i, item) in items.iter().enumerate() {
        batches[i % threads].push(item.clone());
    }
    batches
}
