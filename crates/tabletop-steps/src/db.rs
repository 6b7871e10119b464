//! Store steps: fixture loading, row updates, and table assertions.

use crate::world::TabletopWorld;
use cucumber::gherkin::Step;
use cucumber::{given, then, when};
use resolve_engine::{MatchMode, ResolveEngine, ResolveMode};
use tabletop_core::{RecordStore, StepTable};

fn split_fields(raw: &str) -> Vec<String> {
    raw.split(',').map(|field| field.trim().to_string()).collect()
}

fn engine(world: &TabletopWorld) -> ResolveEngine<'_> {
    ResolveEngine::new(world.env.schema.as_ref(), world.env.store.as_ref())
}

fn insert_rows(world: &TabletopWorld, entity: &str, table: &StepTable, clear_first: bool) {
    let store = world.env.store.as_ref();
    if clear_first {
        store
            .delete_all(entity)
            .unwrap_or_else(|err| panic!("{err}"));
        store
            .reset_identifier_sequence(entity, Some(1))
            .unwrap_or_else(|err| panic!("{err}"));
    }

    let rows = engine(world)
        .materialize_table(entity, table, ResolveMode::Strict)
        .unwrap_or_else(|err| panic!("{err}"));
    for row in rows {
        store.create(entity, row).unwrap_or_else(|err| panic!("{err}"));
    }
    store
        .reset_identifier_sequence(entity, None)
        .unwrap_or_else(|err| panic!("{err}"));
}

#[given(expr = "I clear {string}")]
async fn clear_entity(world: &mut TabletopWorld, entity: String) {
    let store = world.env.store.as_ref();
    store
        .delete_all(&entity)
        .unwrap_or_else(|err| panic!("{err}"));
    store
        .reset_identifier_sequence(&entity, None)
        .unwrap_or_else(|err| panic!("{err}"));
}

#[given(expr = "I clear {string} without resetting its sequence")]
async fn clear_entity_keep_sequence(world: &mut TabletopWorld, entity: String) {
    world
        .env
        .store
        .delete_all(&entity)
        .unwrap_or_else(|err| panic!("{err}"));
}

#[given(expr = "I reset the identifier sequence for {string}")]
async fn reset_sequence(world: &mut TabletopWorld, entity: String) {
    world
        .env
        .store
        .reset_identifier_sequence(&entity, None)
        .unwrap_or_else(|err| panic!("{err}"));
}

#[given(expr = "I insert the following rows for {string}:")]
async fn insert(world: &mut TabletopWorld, entity: String, step: &Step) {
    let table = world.table_of(step);
    insert_rows(world, &entity, &table, false);
}

#[given(expr = "I clear and insert the following rows for {string}:")]
async fn clear_and_insert(world: &mut TabletopWorld, entity: String, step: &Step) {
    let table = world.table_of(step);
    insert_rows(world, &entity, &table, true);
}

#[when(expr = "I update the rows for {string} identified by {string}:")]
async fn update_rows(world: &mut TabletopWorld, entity: String, identified: String, step: &Step) {
    let table = world.table_of(step);
    let identifying = split_fields(&identified);
    let rows = engine(world)
        .materialize_table(&entity, &table, ResolveMode::Strict)
        .unwrap_or_else(|err| panic!("{err}"));

    for mut row in rows {
        let mut filters = Vec::with_capacity(identifying.len());
        for field in &identifying {
            let value = row.remove(field).unwrap_or_else(|| {
                panic!("rows cannot be identified by \"{field}\"; ensure it is present in the table")
            });
            filters.push((field.clone(), value));
        }
        let updated = world
            .env
            .store
            .update_where(&entity, &filters, row)
            .unwrap_or_else(|err| panic!("{err}"));
        assert!(updated > 0, "no {entity} row matches the filters {filters:?}");
    }
}

#[then(expr = "there are {int} {string} rows in the store")]
async fn count_rows(world: &mut TabletopWorld, count: u64, entity: String) {
    let actual = world
        .env
        .store
        .count(&entity)
        .unwrap_or_else(|err| panic!("{err}"));
    assert_eq!(actual, count, "{entity} holds {actual} row(s), expected {count}");
}

fn assert_table(
    world: &TabletopWorld,
    entity: &str,
    mode: &str,
    identified: &str,
    ordered: &[String],
    step: &Step,
) {
    let table = world.table_of(step);
    let match_mode = match mode {
        "has exactly" => MatchMode::Exact,
        _ => MatchMode::Contains,
    };
    engine(world)
        .compare_records(entity, &table, &split_fields(identified), ordered, match_mode)
        .unwrap_or_else(|err| panic!("{err}"));
}

#[then(regex = r#"^"([^"]+)" (has exactly|contains) the following rows identified by "([^"]+)":$"#)]
async fn assert_rows(
    world: &mut TabletopWorld,
    entity: String,
    mode: String,
    identified: String,
    step: &Step,
) {
    assert_table(world, &entity, &mode, &identified, &[], step);
}

#[then(
    regex = r#"^"([^"]+)" (has exactly|contains) the following rows identified by "([^"]+)" ordered by "([^"]+)":$"#
)]
async fn assert_rows_ordered(
    world: &mut TabletopWorld,
    entity: String,
    mode: String,
    identified: String,
    ordered: String,
    step: &Step,
) {
    assert_table(world, &entity, &mode, &identified, &split_fields(&ordered), step);
}

#[when("I clear the store operation log")]
async fn clear_operation_log(world: &mut TabletopWorld) {
    world.env.store.clear_operations();
}

#[then(expr = "I see that {int} queries were made against the store")]
async fn count_queries(world: &mut TabletopWorld, expected: usize) {
    let operations = world.env.store.operations();
    assert_eq!(
        operations.len(),
        expected,
        "store saw {} operation(s), expected {expected}:\n{}",
        operations.len(),
        operations.join("\n")
    );
}

#[then(expr = "I see that {int} queries were made against the store while ignoring:")]
async fn count_queries_ignoring(world: &mut TabletopWorld, expected: usize, step: &Step) {
    let table = world.table_of(step);
    let mut filters = Vec::new();
    for row in table.rows() {
        let method = row.get("method").expect("ignore table has a method column");
        let value = row
            .get("value")
            .expect("ignore table has a value column")
            .to_lowercase();
        filters.push((method.to_string(), value));
    }

    let mut included = Vec::new();
    let mut excluded = Vec::new();
    for operation in world.env.store.operations() {
        let lowered = operation.to_lowercase();
        let ignore = filters.iter().any(|(method, value)| match method.as_str() {
            "starts_with" => lowered.starts_with(value),
            "ends_with" => lowered.ends_with(value),
            "contains" => lowered.contains(value),
            other => panic!("unknown ignore method \"{other}\""),
        });
        if ignore {
            excluded.push(operation);
        } else {
            included.push(operation);
        }
    }

    assert_eq!(
        included.len(),
        expected,
        "counted {} operation(s), expected {expected}\n\ncounted:\n{}\n\nignored:\n{}",
        included.len(),
        included.join("\n"),
        excluded.join("\n")
    );
}
