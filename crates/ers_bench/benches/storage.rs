//! Entity storage benchmarks, run against every backend.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ers_bench::{populate, random_data, BenchBackend, ITEM_TYPE};
use ers_core::{EntityRelationshipStorage, RamErsSettings, ValueExt};
use rand::Rng;

/// Benchmark creating entities in one transaction.
fn bench_create(c: &mut Criterion) {
    let mut group = c.benchmark_group("create");

    for backend in BenchBackend::ALL {
        for batch_size in [10usize, 100] {
            group.throughput(Throughput::Elements(batch_size as u64));
            group.bench_with_input(
                BenchmarkId::new(backend.label(), batch_size),
                &batch_size,
                |b, &batch_size| {
                    let (storage, _dir) = backend.open();
                    let payload = random_data(64);
                    b.iter(|| {
                        storage
                            .transactional(false, |txn| {
                                for i in 0..batch_size {
                                    let item = txn.new_entity(ITEM_TYPE)?;
                                    item.set("rank", (i as i64).compressed())?;
                                    item.set_raw_blob("payload", Some(black_box(&payload[..])))?;
                                }
                                Ok(())
                            })
                            .unwrap();
                    });
                },
            );
        }
    }
    group.finish();
}

/// Benchmark reading a property of a random entity.
fn bench_read_property(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_property");

    for backend in BenchBackend::ALL {
        group.bench_function(backend.label(), |b| {
            let (storage, _dir) = backend.open();
            populate(&storage, 1000, 64).unwrap();
            let ids = storage
                .transactional(true, |txn| txn.all(ITEM_TYPE)?.ids())
                .unwrap();
            let mut rng = rand::thread_rng();

            b.iter(|| {
                let id = ids[rng.gen_range(0..ids.len())];
                let txn = storage.begin_transaction(true).unwrap();
                let entity = txn.get_entity_unsafe(black_box(id));
                black_box(entity.get::<String>("name").unwrap());
            });
        });
    }
    group.finish();
}

/// Benchmark range queries on a compressed property.
fn bench_range_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("range_query");

    for backend in BenchBackend::ALL {
        group.bench_function(backend.label(), |b| {
            let (storage, _dir) = backend.open();
            populate(&storage, 1000, 16).unwrap();

            b.iter(|| {
                let txn = storage.begin_transaction(true).unwrap();
                let range = txn
                    .find_eq_or_gt(ITEM_TYPE, "rank", 250i64.compressed())
                    .unwrap()
                    .intersect(&txn.find_lt(ITEM_TYPE, "rank", 750i64.compressed()).unwrap());
                black_box(range.size().unwrap());
            });
        });
    }
    group.finish();
}

/// Benchmark union and difference over full-type scans.
fn bench_set_algebra(c: &mut Criterion) {
    let mut group = c.benchmark_group("set_algebra");

    for backend in BenchBackend::ALL {
        group.bench_function(backend.label(), |b| {
            let (storage, _dir) = backend.open();
            populate(&storage, 1000, 16).unwrap();

            b.iter(|| {
                let txn = storage.begin_transaction(true).unwrap();
                let low = txn.find_lt(ITEM_TYPE, "rank", 100i64.compressed()).unwrap();
                let high = txn.find_gt(ITEM_TYPE, "rank", 900i64.compressed()).unwrap();
                let rest = txn.all(ITEM_TYPE).unwrap() - (low + high);
                black_box(rest.size().unwrap());
            });
        });
    }
    group.finish();
}

/// Benchmark freezing a populated storage and loading its dump.
fn bench_freeze(c: &mut Criterion) {
    let mut group = c.benchmark_group("freeze");
    group.sample_size(20);

    for backend in BenchBackend::ALL {
        let (storage, _dir) = backend.open();
        populate(&storage, 1000, 64).unwrap();
        group.bench_function(BenchmarkId::new("as_immutable", backend.label()), |b| {
            b.iter(|| black_box(storage.as_immutable("bench").unwrap()));
        });
    }

    let storage = EntityRelationshipStorage::ram();
    populate(&storage, 1000, 64).unwrap();
    let mut dump = Vec::new();
    storage
        .as_immutable("bench")
        .unwrap()
        .dump(&mut dump)
        .unwrap();
    group.throughput(Throughput::Bytes(dump.len() as u64));
    group.bench_function("load", |b| {
        b.iter(|| {
            black_box(
                EntityRelationshipStorage::load(black_box(dump.as_slice()), RamErsSettings::default())
                    .unwrap(),
            )
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_create,
    bench_read_property,
    bench_range_query,
    bench_set_algebra,
    bench_freeze,
);

criterion_main!(benches);
