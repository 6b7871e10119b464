//! BDD tests for the resolution engine

use cucumber::{gherkin::Step, given, then, when, World};
use record_store::MemoryStore;
use resolve_engine::{MatchMode, ResolveEngine, ResolveMode, ResolvedRow};
use std::collections::BTreeMap;
use std::sync::Arc;
use tabletop_core::{
    Cardinality, EntityType, FieldDescriptor, RecordStore, ScalarKind, Schema, StepTable,
    TabletopError, Value,
};

#[derive(Debug, World)]
#[world(init = Self::new)]
struct ResolveWorld {
    schema: Arc<Schema>,
    store: MemoryStore,
    rows: Vec<ResolvedRow>,
    last_error: Option<TabletopError>,
}

impl ResolveWorld {
    fn new() -> Self {
        let schema = Arc::new(
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
                        FieldDescriptor::scalar("notes", ScalarKind::Text),
                    ],
                ))
                .build()
                .expect("fixture schema is valid"),
        );
        let store = MemoryStore::new(schema.clone());
        Self {
            schema,
            store,
            rows: Vec::new(),
            last_error: None,
        }
    }

    fn table_of(step: &Step) -> StepTable {
        let table = step.table.as_ref().expect("step carries a table");
        StepTable::from_rows(&table.rows).expect("well-formed step table")
    }
}

#[given(expr = "a customer with key {string} named {string}")]
async fn given_customer(world: &mut ResolveWorld, nk: String, name: String) {
    let mut values = BTreeMap::new();
    values.insert("nk".to_string(), Value::Text(nk));
    values.insert("name".to_string(), Value::Text(name));
    world
        .store
        .create("crm.Customer", values)
        .expect("customer created");
}

#[when("I materialize the following order rows:")]
async fn when_materialize(world: &mut ResolveWorld, step: &Step) {
    let table = ResolveWorld::table_of(step);
    let engine = ResolveEngine::new(world.schema.as_ref(), &world.store);
    match engine.materialize_table("crm.Order", &table, ResolveMode::Strict) {
        Ok(rows) => world.rows = rows,
        Err(err) => world.last_error = Some(err),
    }
}

#[when("I compare the customers against:")]
async fn when_compare(world: &mut ResolveWorld, step: &Step) {
    let table = ResolveWorld::table_of(step);
    let engine = ResolveEngine::new(world.schema.as_ref(), &world.store);
    world.last_error = engine
        .compare_records(
            "crm.Customer",
            &table,
            &["nk".to_string()],
            &[],
            MatchMode::Exact,
        )
        .err();
}

#[then(expr = "row {int} resolves {string} to the customer keyed {string}")]
async fn then_row_resolves(world: &mut ResolveWorld, row: usize, field: String, nk: String) {
    let value = world.rows[row].get(&field).expect("field materialized");
    let Value::Ref(entity_ref) = value else {
        panic!("expected a resolved reference, got {value:?}");
    };
    let record = world
        .store
        .fetch_by_ids(&entity_ref.entity, &[entity_ref.id])
        .expect("referenced record loads")
        .pop()
        .expect("referenced record exists");
    assert_eq!(record.value_of("nk"), Value::Text(nk));
}

#[then(expr = "row {int} has a null {string}")]
async fn then_row_null(world: &mut ResolveWorld, row: usize, field: String) {
    assert_eq!(world.rows[row].get(&field), Some(&Value::Null));
}

#[then(expr = "row {int} has an empty string {string}")]
async fn then_row_empty(world: &mut ResolveWorld, row: usize, field: String) {
    assert_eq!(
        world.rows[row].get(&field),
        Some(&Value::Text(String::new()))
    );
}

#[then("the comparison passes")]
async fn then_comparison_passes(world: &mut ResolveWorld) {
    if let Some(err) = &world.last_error {
        panic!("comparison failed: {err}");
    }
}

#[then("the comparison fails with a table mismatch")]
async fn then_comparison_fails(world: &mut ResolveWorld) {
    assert!(matches!(
        world.last_error,
        Some(TabletopError::TableMismatch { .. })
    ));
}

#[then("materialization fails because the reference was not found")]
async fn then_reference_not_found(world: &mut ResolveWorld) {
    assert!(matches!(
        world.last_error,
        Some(TabletopError::ReferenceNotFound { .. })
    ));
}

#[tokio::main]
async fn main() {
    ResolveWorld::run("tests/features").await;
}
