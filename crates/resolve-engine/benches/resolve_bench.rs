use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use record_store::MemoryStore;
use resolve_engine::{ResolveEngine, ResolveMode};
use std::collections::BTreeMap;
use std::hint::black_box;
use std::sync::Arc;
use tabletop_core::{
    Cardinality, EntityType, FieldDescriptor, RecordStore, ScalarKind, Schema, StepTable, Value,
};

fn fixture_schema() -> Arc<Schema> {
    Arc::new(
        Schema::builder()
            .entity(EntityType::new(
                "crm.Customer",
                vec![
                    FieldDescriptor::scalar("nk", ScalarKind::Text),
                    FieldDescriptor::scalar("name", ScalarKind::Text),
                ],
            ))
            .entity(EntityType::new(
                "crm.Order",
                vec![
                    FieldDescriptor::scalar("nk", ScalarKind::Text),
                    FieldDescriptor::reference("customer", "crm.Customer", Cardinality::One),
                    FieldDescriptor::scalar("total", ScalarKind::Float),
                ],
            ))
            .build()
            .unwrap(),
    )
}

fn order_table(rows: usize, distinct_customers: usize) -> StepTable {
    let mut raw = vec![vec![
        "nk".to_string(),
        "customer".to_string(),
        "total".to_string(),
    ]];
    for i in 0..rows {
        raw.push(vec![
            format!("O{i}"),
            format!("[C{}]", i % distinct_customers),
            format!("{}.50", i),
        ]);
    }
    StepTable::from_rows(&raw).unwrap()
}

/// Benchmark table materialization across row counts
fn benchmark_materialize(c: &mut Criterion) {
    let mut group = c.benchmark_group("materialize_table");

    let schema = fixture_schema();
    let store = MemoryStore::new(schema.clone());
    for i in 0..10 {
        let mut values = BTreeMap::new();
        values.insert("nk".to_string(), Value::Text(format!("C{i}")));
        values.insert("name".to_string(), Value::Text(format!("Customer {i}")));
        store.create("crm.Customer", values).unwrap();
    }
    let engine = ResolveEngine::new(schema.as_ref(), &store);

    for rows in [1usize, 10, 100, 1000] {
        let table = order_table(rows, 10);
        group.throughput(Throughput::Elements(rows as u64));
        group.bench_with_input(BenchmarkId::new("rows", rows), &table, |b, table| {
            b.iter(|| {
                engine
                    .materialize_table("crm.Order", black_box(table), ResolveMode::Strict)
                    .unwrap()
            })
        });
    }

    group.finish();
}

/// Benchmark reference resolution with a cold store per iteration
fn benchmark_reference_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("reference_resolution");

    let schema = fixture_schema();
    let store = MemoryStore::new(schema.clone());
    for i in 0..100 {
        let mut values = BTreeMap::new();
        values.insert("nk".to_string(), Value::Text(format!("C{i}")));
        store.create("crm.Customer", values).unwrap();
    }
    let engine = ResolveEngine::new(schema.as_ref(), &store);
    let table = order_table(500, 100);

    group.bench_function("distinct_keys_500_rows", |b| {
        b.iter(|| {
            engine
                .resolve_table_references("crm.Order", black_box(&table), ResolveMode::Strict)
                .unwrap()
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_materialize,
    benchmark_reference_resolution
);
criterion_main!(benches);
