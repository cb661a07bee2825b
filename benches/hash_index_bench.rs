use criterion::{criterion_group, criterion_main, Criterion};
use rand::prelude::*;

use std::sync::Arc;
use tarndb::common::types::Rid;
use tarndb::index::hash::ExtendibleHashTable;
use tarndb::storage::buffer::BufferPoolManager;

fn create_test_hash_table(pool_size: usize) -> Arc<ExtendibleHashTable> {
    let temp_file = tempfile::NamedTempFile::new().unwrap();
    let path = temp_file.path().to_str().unwrap().to_string();
    let buffer_pool = Arc::new(BufferPoolManager::new(pool_size, path).unwrap());

    std::mem::forget(temp_file);

    Arc::new(ExtendibleHashTable::new(buffer_pool).unwrap())
}

fn hash_index_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("HashIndex");

    group.bench_function("insert", |b| {
        let table = create_test_hash_table(256);
        let mut key = 0u64;
        b.iter(|| {
            table.insert(None, key, Rid::new((key >> 8) as u32, key as u32 & 0xFF)).unwrap();
            key += 1;
        });
    });

    group.bench_function("get_value", |b| {
        let table = create_test_hash_table(256);
        for key in 0..10_000u64 {
            table
                .insert(None, key, Rid::new((key >> 8) as u32, key as u32 & 0xFF))
                .unwrap();
        }
        let mut rng = StdRng::seed_from_u64(7);
        b.iter(|| {
            let key = rng.gen_range(0..10_000u64);
            let values = table.get_value(key).unwrap();
            assert_eq!(values.len(), 1);
        });
    });

    group.finish();
}

criterion_group!(benches, hash_index_benchmark);
criterion_main!(benches);
