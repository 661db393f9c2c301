use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use std::sync::{Arc, Weak};
use std::time::Duration;
use weak_store::{MultiKeyWeakStore, WeakTable};

fn lcg(mut s: u64) -> impl Iterator<Item = u64> {
    std::iter::from_fn(move || {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        Some(s)
    })
}

fn key(n: u64) -> Arc<String> {
    Arc::new(format!("k{:016x}", n))
}

fn bench_table_insert_fresh_100k(c: &mut Criterion) {
    c.bench_function("table::insert_fresh_100k", |b| {
        b.iter_batched(
            || {
                let keys: Vec<Arc<String>> = lcg(1).take(100_000).map(key).collect();
                (WeakTable::<Weak<String>, u64>::new(), keys)
            },
            |(table, keys)| {
                for (i, k) in keys.iter().enumerate() {
                    table.insert(k, i as u64);
                }
                black_box((table, keys))
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_table_get_hit_10k(c: &mut Criterion) {
    c.bench_function("table::get_hit_10k_on_100k", |b| {
        let table = WeakTable::<Weak<String>, u64>::new();
        let keys: Vec<Arc<String>> = lcg(7).take(100_000).map(key).collect();
        for (i, k) in keys.iter().enumerate() {
            table.insert(k, i as u64);
        }
        // Precompute 10k random query keys using LCG
        let n = keys.len();
        let mut s = 0x9e3779b97f4a7c15u64;
        let queries: Vec<Arc<String>> = (0..10_000)
            .map(|_| {
                s = s.wrapping_mul(2862933555777941757).wrapping_add(3037000493);
                keys[(s as usize) % n].clone()
            })
            .collect();
        b.iter(|| {
            for q in &queries {
                black_box(table.get(q.as_str()));
            }
        })
    });
}

fn bench_table_get_miss_10k(c: &mut Criterion) {
    c.bench_function("table::get_miss_10k_on_100k", |b| {
        let table = WeakTable::<Weak<String>, u64>::new();
        let keys: Vec<Arc<String>> = lcg(11).take(100_000).map(key).collect();
        for (i, k) in keys.iter().enumerate() {
            table.insert(k, i as u64);
        }
        let mut miss = lcg(0xdead_beef);
        b.iter(|| {
            for _ in 0..10_000 {
                let q = format!("k{:016x}", miss.next().unwrap());
                black_box(table.get(q.as_str()));
            }
        })
    });
}

fn bench_table_purge_after_drop_10k(c: &mut Criterion) {
    c.bench_function("table::purge_10k_dead_of_110k", |b| {
        b.iter_batched(
            || {
                let table = WeakTable::<Weak<String>, u64>::new();
                let mut survivors = Vec::with_capacity(100_000);
                for (i, x) in lcg(5).take(110_000).enumerate() {
                    let k = key(x);
                    table.insert(&k, i as u64);
                    if i >= 10_000 {
                        survivors.push(k);
                    }
                }
                // The first 10k keys dropped on the way; their entries are dead.
                (table, survivors)
            },
            |(table, survivors)| {
                black_box(table.purge());
                black_box((table, survivors))
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_multi_insert_pairs_50k(c: &mut Criterion) {
    c.bench_function("multi::insert_pairs_50k", |b| {
        b.iter_batched(
            || {
                let keys: Vec<Arc<u64>> = lcg(3).take(50_001).map(Arc::new).collect();
                (MultiKeyWeakStore::<Weak<u64>, u64>::new(), keys)
            },
            |(store, keys)| {
                for (i, pair) in keys.windows(2).enumerate() {
                    store.insert(&[&pair[0], &pair[1]], i as u64).unwrap();
                }
                black_box((store, keys))
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_multi_get_hit_10k(c: &mut Criterion) {
    c.bench_function("multi::get_hit_10k_on_50k", |b| {
        let store = MultiKeyWeakStore::<Weak<u64>, u64>::new();
        let keys: Vec<Arc<u64>> = lcg(13).take(50_001).map(Arc::new).collect();
        for (i, pair) in keys.windows(2).enumerate() {
            store.insert(&[&pair[0], &pair[1]], i as u64).unwrap();
        }
        let n = keys.len() - 1;
        let mut s = 0x9e3779b97f4a7c15u64;
        let picks: Vec<usize> = (0..10_000)
            .map(|_| {
                s = s.wrapping_mul(2862933555777941757).wrapping_add(3037000493);
                (s as usize) % n
            })
            .collect();
        b.iter(|| {
            for &i in &picks {
                black_box(store.get(&[&keys[i], &keys[i + 1]]).unwrap());
            }
        })
    });
}

fn bench_config() -> Criterion {
    Criterion::default()
        .sample_size(12)
        .measurement_time(Duration::from_secs(5))
        .warm_up_time(Duration::from_secs(1))
}

criterion_group! {
    name = benches_table;
    config = bench_config();
    targets = bench_table_insert_fresh_100k,
              bench_table_get_hit_10k,
              bench_table_get_miss_10k,
              bench_table_purge_after_drop_10k
}
criterion_group! {
    name = benches_multi;
    config = bench_config();
    targets = bench_multi_insert_pairs_50k,
              bench_multi_get_hit_10k
}
criterion_main!(benches_table, benches_multi);
