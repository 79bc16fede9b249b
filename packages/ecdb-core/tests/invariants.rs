//! Property-style coverage over fixed, hand-picked workloads for the storage-layer
//! invariants: partition bookkeeping, migration value preservation, defragmentation,
//! filter determinism, and signature order-independence.

use std::sync::Arc;

use ecdb_core::attribute::{AttributeFlags, AttributeId, AttributeRegistry};
use ecdb_core::dataset;
use ecdb_core::database::Database;
use ecdb_core::filter::{AccessMode, Filter};
use ecdb_core::signature::Signature;

fn reserved(registry: &AttributeRegistry) -> Vec<AttributeId> {
    vec![
        registry.register_type::<u32>("Entity", 0, AttributeFlags::empty(), None),
        registry.register_type::<[f32; 3]>("Position", [0.0; 3], AttributeFlags::empty(), None),
        registry.register_type::<[f32; 4]>("Orientation", [0.0; 4], AttributeFlags::empty(), None),
        registry.register_type::<[f32; 3]>("Scale", [1.0; 3], AttributeFlags::empty(), None),
    ]
}

#[test]
fn partition_slot_accounting_holds_under_churn() {
    let registry = Arc::new(AttributeRegistry::new());
    let reserved = reserved(&registry);
    let mut db = Database::new(registry.clone(), reserved);
    let table = db.create_table_with_capacity(&[], 32);

    let mut rows = Vec::new();
    for _ in 0..20 {
        rows.push(db.get_table_mut(table).add_row(&registry));
    }
    for (i, row) in rows.iter().enumerate() {
        if i % 3 == 0 {
            db.get_table_mut(table).remove_row(*row, &registry);
        }
    }

    let table = db.get_table(table);
    for partition in table.partitions() {
        assert_eq!(
            partition.live_count() + partition.free_len(),
            partition.slot_count() as usize
        );
    }
}

#[test]
fn migration_preserves_shared_component_values() {
    let registry = Arc::new(AttributeRegistry::new());
    let reserved = reserved(&registry);
    let velocity = registry.register_type::<f32>("Velocity", 0.0, AttributeFlags::empty(), None);
    let health = registry.register_type::<u32>("Health", 100, AttributeFlags::empty(), None);
    let mut db = Database::new(registry.clone(), reserved);

    let src_table = db.create_table(&[velocity]);
    let row = db.get_table_mut(src_table).add_row(&registry);
    let col = db.get_table(src_table).attribute_index(velocity).unwrap();
    db.get_table_mut(src_table).write_value(col, row, &7.5f32.to_ne_bytes());

    let (dst_table, outcome) = db.migrate_row(src_table, row, &[velocity, health]);
    let dst_velocity_col = db.get_table(dst_table).attribute_index(velocity).unwrap();
    let bytes = db.get_table(dst_table).read_value(dst_velocity_col, outcome.row);
    assert_eq!(f32::from_ne_bytes(bytes.try_into().unwrap()), 7.5);
    assert_eq!(outcome.newly_present, vec![health]);
    assert!(outcome.decayed.is_empty());
}

#[test]
fn migration_decays_dropped_components() {
    let registry = Arc::new(AttributeRegistry::new());
    let reserved = reserved(&registry);
    let clip = registry.register_type::<u32>("Clip", 0, AttributeFlags::DECAY, None);
    let mut db = Database::new(registry.clone(), reserved);

    let src_table = db.create_table(&[clip]);
    let row = db.get_table_mut(src_table).add_row(&registry);
    let col = db.get_table(src_table).attribute_index(clip).unwrap();
    db.get_table_mut(src_table).write_value(col, row, &42u32.to_ne_bytes());

    let (_dst_table, outcome) = db.migrate_row(src_table, row, &[]);
    assert_eq!(outcome.decayed.len(), 1);
    assert_eq!(outcome.decayed[0].0, clip);
    assert_eq!(outcome.decayed[0].1, 42u32.to_ne_bytes());
}

#[test]
fn defragment_compacts_to_a_contiguous_prefix() {
    let registry = Arc::new(AttributeRegistry::new());
    let reserved = reserved(&registry);
    let mut db = Database::new(registry.clone(), reserved);
    let table = db.create_table_with_capacity(&[], 16);

    let rows: Vec<_> = (0..10).map(|_| db.get_table_mut(table).add_row(&registry)).collect();
    for (i, row) in rows.iter().enumerate() {
        if i % 2 == 0 {
            db.get_table_mut(table).remove_row(*row, &registry);
        }
    }

    let erased = db.get_table_mut(table).defragment(|_, _| {});
    assert_eq!(erased, 5);

    let table = db.get_table(table);
    let partition = table.partition(0);
    let live = partition.live_count();
    for i in 0..live as u16 {
        assert!(partition.is_valid_row(i), "prefix slot {i} should be live after defragment");
    }
    for i in live as u16..partition.slot_count() {
        assert!(!partition.is_valid_row(i), "slot {i} should be free after defragment");
    }
}

#[test]
fn filter_determinism_across_set_equal_signatures() {
    let registry = Arc::new(AttributeRegistry::new());
    let reserved = reserved(&registry);
    let a = registry.register_tag("A", AttributeFlags::empty());
    let b = registry.register_tag("B", AttributeFlags::empty());
    let mut db = Database::new(registry.clone(), reserved);
    db.create_table(&[a, b]);
    db.create_table(&[a]);

    let f1 = Filter::compile(&[(a, AccessMode::Read), (b, AccessMode::Read)], &[]);
    let f2 = Filter::compile(&[(b, AccessMode::Read), (a, AccessMode::Read)], &[]);
    let mut r1 = db.query(f1.inclusive(), f1.exclusive());
    let mut r2 = db.query(f2.inclusive(), f2.exclusive());
    r1.sort();
    r2.sort();
    assert_eq!(r1, r2);
    assert_eq!(dataset::query(&db, &f1).total_instances(), dataset::query(&db, &f2).total_instances());
}

#[test]
fn signature_construction_is_order_independent() {
    let ids: Vec<AttributeId> = (0..6).map(AttributeId).collect();
    let mut shuffled = ids.clone();
    shuffled.reverse();
    assert_eq!(Signature::of(ids), Signature::of(shuffled));
}
