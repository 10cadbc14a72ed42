use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use core_canopy::*;

pub fn criterion_benchmark(c: &mut Criterion) {
    let key = SampleKey::from((768, 100_000, 64));
    c.bench_function("From", |b| {
        b.iter(|| SampleKey::from(black_box((768usize, 100_000usize, 64usize))))
    });

    c.bench_function("try_new", |b| {
        b.iter(|| SampleKey::try_new(black_box(768), black_box(100_000), black_box(64)))
    });

    c.bench_function("corpus_size", |b| b.iter(|| black_box(key).corpus_size()));

    c.bench_function("row", |b| b.iter(|| black_box(key).row()));
}

fn keys_to_vec(c: &mut Criterion) {
    let mut group = c.benchmark_group("keys_to_vec");
    for size in [2usize, 4, 8, 16, 32, 64, 128, 256].iter() {
        let keys: Vec<SampleKey> = (0..*size).map(|s| (768, 512 << (s % 12), s).into()).collect();
        group.bench_with_input(
            BenchmarkId::new("keys_to_tree_counts", size),
            &keys,
            |b, keys| {
                b.iter(|| keys.to_tree_counts());
            },
        );
        group.bench_with_input(
            BenchmarkId::new("keys_to_corpus_sizes", size),
            &keys,
            |b, keys| {
                b.iter(|| keys.to_corpus_sizes());
            },
        );
    }
    group.finish();
}

criterion_group!(benches, criterion_benchmark, keys_to_vec);
criterion_main!(benches);
