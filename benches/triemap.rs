use criterion::{criterion_group, criterion_main, Bencher, Criterion};
use primetrie::TrieMap;
use std::collections::HashMap as StdHashMap;
use std::hash::{BuildHasherDefault, Hash};
use std::hint::black_box;
use std::sync::{Arc, RwLock};
use std::thread;

use metrohash::MetroHash64;

mod utils;
use utils::*;

const THREADS: usize = 4;

// Trait to abstract over maps that can be shared between threads
trait BenchMap<K, V>: Sync
where
    K: Clone + Hash + Eq,
    V: Clone,
{
    fn new() -> Self;
    fn insert(&self, k: K, v: V);
    fn remove(&self, k: &K) -> bool;
    fn contains(&self, k: &K) -> bool;
    fn count(&self) -> usize;
}

impl<K, V, S> BenchMap<K, V> for TrieMap<K, V, S>
where
    K: Clone + Hash + Eq + Send + Sync,
    V: Clone + Send + Sync,
    S: std::hash::BuildHasher + Default + Send + Sync,
{
    fn new() -> Self {
        TrieMap::builder()
            .expected_capacity(1024)
            .hasher(S::default())
            .build()
            .expect("valid configuration")
    }

    fn insert(&self, k: K, v: V) {
        self.assign(k, v).expect("no overfull collision lists");
    }

    fn remove(&self, k: &K) -> bool {
        self.erase(k)
    }

    fn contains(&self, k: &K) -> bool {
        self.get(k).is_some()
    }

    fn count(&self) -> usize {
        self.iter().count()
    }
}

// A std HashMap behind a lock, the obvious alternative
impl<K, V> BenchMap<K, V> for RwLock<StdHashMap<K, V>>
where
    K: Clone + Hash + Eq + Send + Sync,
    V: Clone + Send + Sync,
{
    fn new() -> Self {
        RwLock::new(StdHashMap::new())
    }

    fn insert(&self, k: K, v: V) {
        self.write().unwrap().insert(k, v);
    }

    fn remove(&self, k: &K) -> bool {
        self.write().unwrap().remove(k).is_some()
    }

    fn contains(&self, k: &K) -> bool {
        self.read().unwrap().contains_key(k)
    }

    fn count(&self) -> usize {
        self.read().unwrap().iter().count()
    }
}

fn filled<M, K, V>(keys: &[K], values: &[V]) -> M
where
    M: BenchMap<K, V>,
    K: BenchData,
    V: BenchData,
{
    let m = M::new();
    for (k, v) in keys.iter().zip(values) {
        m.insert(k.clone(), v.clone());
    }
    m
}

fn bench_lookup<M, K, V>(b: &mut Bencher<'_>, size: usize)
where
    M: BenchMap<K, V>,
    K: BenchData,
    V: BenchData,
{
    let keys = K::distinct(size, 1);
    let values = V::distinct(size, 2);
    let order = shuffled(&keys, 3);
    let m: M = filled(&keys, &values);
    b.iter(|| {
        for k in &order {
            black_box(m.contains(k));
        }
    })
}

fn bench_lookup_ne<M, K, V>(b: &mut Bencher<'_>, size: usize)
where
    M: BenchMap<K, V>,
    K: BenchData,
    V: BenchData,
{
    let keys = K::distinct(size * 2, 1);
    let values = V::distinct(size, 2);
    let order = shuffled(&keys[size..], 3);
    let m: M = filled(&keys[..size], &values);
    b.iter(|| {
        for k in &order {
            black_box(m.contains(k));
        }
    })
}

fn bench_insert<M, K, V>(b: &mut Bencher<'_>, size: usize)
where
    M: BenchMap<K, V>,
    K: BenchData,
    V: BenchData,
{
    let keys = K::distinct(size, 1);
    let values = V::distinct(size, 2);
    b.iter(|| filled::<M, K, V>(&keys, &values))
}

fn bench_remove<M, K, V>(b: &mut Bencher<'_>, size: usize)
where
    M: BenchMap<K, V>,
    K: BenchData,
    V: BenchData,
{
    let keys = K::distinct(size, 1);
    let values = V::distinct(size, 2);
    let order = shuffled(&keys, 3);
    b.iter(|| {
        let m: M = filled(&keys, &values);
        for k in &order {
            m.remove(k);
        }
        m
    })
}

fn bench_iter<M, K, V>(b: &mut Bencher<'_>, size: usize)
where
    M: BenchMap<K, V>,
    K: BenchData,
    V: BenchData,
{
    let keys = K::distinct(size, 1);
    let values = V::distinct(size, 2);
    let m: M = filled(&keys, &values);
    b.iter(|| black_box(m.count()))
}

fn bench_parallel_insert<M, K, V>(b: &mut Bencher<'_>, size: usize)
where
    M: BenchMap<K, V>,
    K: BenchData,
    V: BenchData,
{
    let keys = K::distinct(size, 1);
    let values = V::distinct(size, 2);
    let chunks = deal(&keys, THREADS);
    b.iter(|| {
        let m = M::new();
        thread::scope(|scope| {
            for chunk in &chunks {
                let m = &m;
                let values = &values;
                scope.spawn(move || {
                    for (k, v) in chunk.iter().zip(values.iter()) {
                        m.insert(k.clone(), v.clone());
                    }
                });
            }
        });
        m
    })
}

fn bench_parallel_mixed<M, K, V>(b: &mut Bencher<'_>, size: usize)
where
    M: BenchMap<K, V>,
    K: BenchData,
    V: BenchData,
{
    let keys = K::distinct(size, 1);
    let values = V::distinct(size, 2);
    let m: M = filled(&keys, &values);
    let chunks = deal(&shuffled(&keys, 3), THREADS);
    b.iter(|| {
        thread::scope(|scope| {
            for (t, chunk) in chunks.iter().enumerate() {
                let m = &m;
                let values = &values;
                scope.spawn(move || {
                    for (i, (k, v)) in chunk.iter().zip(values.iter()).enumerate() {
                        // Mostly reads, one write in eight.
                        if (i + t) % 8 == 0 {
                            m.insert(k.clone(), v.clone());
                        } else {
                            black_box(m.contains(k));
                        }
                    }
                });
            }
        });
    })
}

fn bench_triemap(c: &mut Criterion) {
    bench_group::<TrieMap<i64, i64>, i64, i64>(c, "triemap_i64");
    bench_group::<TrieMap<Arc<String>, Arc<String>>, Arc<String>, Arc<String>>(
        c,
        "triemap_str",
    );
}

fn bench_triemap_metro(c: &mut Criterion) {
    bench_group::<TrieMap<i64, i64, BuildHasherDefault<MetroHash64>>, i64, i64>(
        c,
        "triemap_metro_i64",
    );
}

fn bench_locked_std(c: &mut Criterion) {
    bench_group::<RwLock<StdHashMap<i64, i64>>, i64, i64>(c, "locked_std_i64");
    bench_group::<RwLock<StdHashMap<Arc<String>, Arc<String>>>, Arc<String>, Arc<String>>(
        c,
        "locked_std_str",
    );
}

// Helper function to run all benchmarks for a specific map/key/value type
fn bench_group<M, K, V>(c: &mut Criterion, group_name: &str)
where
    M: BenchMap<K, V>,
    K: BenchData,
    V: BenchData,
{
    let mut group = c.benchmark_group(group_name);

    for size in &[100, 1000, 10000, 100000] {
        group.bench_function(format!("lookup_{}", size), |b| {
            bench_lookup::<M, K, V>(b, *size)
        });
    }

    for size in &[10000, 100000] {
        group.bench_function(format!("lookup_ne_{}", size), |b| {
            bench_lookup_ne::<M, K, V>(b, *size)
        });
    }

    for size in &[100, 1000, 10000] {
        group.bench_function(format!("insert_{}", size), |b| {
            bench_insert::<M, K, V>(b, *size)
        });

        group.bench_function(format!("remove_{}", size), |b| {
            bench_remove::<M, K, V>(b, *size)
        });
    }

    for size in &[1000, 10000] {
        group.bench_function(format!("iter_{}", size), |b| {
            bench_iter::<M, K, V>(b, *size)
        });
    }

    for size in &[10000, 100000] {
        group.bench_function(format!("parallel_insert_{}", size), |b| {
            bench_parallel_insert::<M, K, V>(b, *size)
        });

        group.bench_function(format!("parallel_mixed_{}", size), |b| {
            bench_parallel_mixed::<M, K, V>(b, *size)
        });
    }

    group.finish();
}

// Main benchmark entry point
fn triemap_benches(c: &mut Criterion) {
    bench_triemap(c);

    if std::env::var("BENCH_METRO").is_ok() {
        bench_triemap_metro(c);
    }

    if std::env::var("BENCH_STD").is_ok() {
        bench_locked_std(c);
    }
}

criterion_group!(benches, triemap_benches);
criterion_main!(benches);
