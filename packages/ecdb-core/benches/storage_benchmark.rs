//! Storage throughput benchmarks: row add/remove, defragment cost, and archetype
//! query cost as table count grows.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ecdb_core::attribute::{AttributeFlags, AttributeRegistry};
use ecdb_core::database::Database;
use ecdb_core::dataset;
use ecdb_core::filter::{AccessMode, Filter};
use ecdb_core::signature::Signature;
use std::hint::black_box;
use std::sync::Arc;

fn test_registry() -> (Arc<AttributeRegistry>, Vec<ecdb_core::attribute::AttributeId>) {
    let registry = Arc::new(AttributeRegistry::new());
    let entity = registry.register_type::<u32>("Entity", 0, AttributeFlags::empty(), None);
    let position = registry.register_type::<[f32; 3]>("Position", [0.0; 3], AttributeFlags::empty(), None);
    let orientation = registry.register_type::<[f32; 4]>("Orientation", [0.0; 4], AttributeFlags::empty(), None);
    let scale = registry.register_type::<[f32; 3]>("Scale", [1.0; 3], AttributeFlags::empty(), None);
    (registry.clone(), vec![entity, position, orientation, scale])
}

fn bench_add_row(c: &mut Criterion) {
    let (registry, reserved) = test_registry();
    let velocity = registry.register_type::<[f32; 3]>("Velocity", [0.0; 3], AttributeFlags::empty(), None);
    let mut db = Database::new(registry.clone(), reserved);
    let table = db.create_table(&[velocity]);

    c.bench_function("add_row", |b| {
        b.iter(|| {
            black_box(db.get_table_mut(table).add_row(&registry));
        })
    });
}

fn bench_remove_row(c: &mut Criterion) {
    let (registry, reserved) = test_registry();
    let velocity = registry.register_type::<[f32; 3]>("Velocity", [0.0; 3], AttributeFlags::empty(), None);
    let mut db = Database::new(registry.clone(), reserved);
    let table = db.create_table_with_capacity(&[velocity], 4096);

    c.bench_function("remove_row", |b| {
        b.iter_batched(
            || db.get_table_mut(table).add_row(&registry),
            |row| {
                db.get_table_mut(table).remove_row(row, &registry);
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

fn bench_defragment(c: &mut Criterion) {
    let (registry, reserved) = test_registry();
    let velocity = registry.register_type::<[f32; 3]>("Velocity", [0.0; 3], AttributeFlags::empty(), None);
    let mut db = Database::new(registry.clone(), reserved);
    let table = db.create_table_with_capacity(&[velocity], 1024);

    c.bench_function("defragment_sparse_partition", |b| {
        b.iter_batched(
            || {
                let rows: Vec<_> = (0..1000).map(|_| db.get_table_mut(table).add_row(&registry)).collect();
                for (i, row) in rows.iter().enumerate() {
                    if i % 2 == 0 {
                        db.get_table_mut(table).remove_row(*row, &registry);
                    }
                }
            },
            |_| {
                db.get_table_mut(table).defragment(|_, _| {});
            },
            criterion::BatchSize::LargeInput,
        )
    });
}

fn bench_query_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("database_query");
    for table_count in [8usize, 64, 256] {
        let (registry, reserved) = test_registry();
        let mut db = Database::new(registry.clone(), reserved);
        let mut last = None;
        for i in 0..table_count {
            let tag = registry.register_tag(&format!("Tag{i}"), AttributeFlags::empty());
            last = Some(db.create_table(&[tag]));
        }
        let filter = Filter::compile(&[], &[]);
        group.bench_with_input(BenchmarkId::from_parameter(table_count), &table_count, |b, _| {
            b.iter(|| black_box(dataset::query(&db, &filter).total_instances()))
        });
        let _ = last;
    }
    group.finish();
}

fn bench_sig_superset(c: &mut Criterion) {
    let sig = Signature::of((0..32).map(ecdb_core::attribute::AttributeId));
    let probe = Signature::of((0..4).map(ecdb_core::attribute::AttributeId));
    c.bench_function("signature_is_superset", |b| {
        b.iter(|| black_box(sig.is_superset(&probe)))
    });
}

criterion_group!(
    benches,
    bench_add_row,
    bench_remove_row,
    bench_defragment,
    bench_query_scaling,
    bench_sig_superset
);
criterion_main!(benches);
