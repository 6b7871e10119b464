//! BDD tests for the Tabletop core schema and key syntax

use cucumber::{given, then, when, World};
use tabletop_core::{
    parse_key_expr, Cardinality, EntityType, FieldDescriptor, FieldKind, KeyAtom, ScalarKind,
    Schema, TabletopError,
};

#[derive(Debug, Default, World)]
struct SchemaWorld {
    schema: Option<Schema>,
    resolved_kind: Option<FieldKind>,
    last_error: Option<TabletopError>,
    parsed_key: Option<Vec<KeyAtom>>,
}

fn poll_schema() -> Schema {
    Schema::builder()
        .entity(EntityType::new(
            "poll.Question",
            vec![
                FieldDescriptor::scalar("nk", ScalarKind::Text),
                FieldDescriptor::scalar("question_text", ScalarKind::Text),
                FieldDescriptor::scalar("pub_date", ScalarKind::Date),
            ],
        ))
        .entity(EntityType::new(
            "poll.Choice",
            vec![
                FieldDescriptor::scalar("nk", ScalarKind::Text),
                FieldDescriptor::reference("question", "poll.Question", Cardinality::One),
                FieldDescriptor::scalar("votes", ScalarKind::Integer),
            ],
        ))
        .build()
        .expect("poll schema is valid")
}

#[given("the poll schema")]
async fn given_poll_schema(world: &mut SchemaWorld) {
    world.schema = Some(poll_schema());
}

#[when(expr = "I resolve the path {string} on {string}")]
async fn when_resolve_path(world: &mut SchemaWorld, path: String, entity: String) {
    let schema = world.schema.as_ref().expect("schema loaded");
    let entity = schema.entity(&entity).expect("entity exists");
    match schema.resolve_path(entity, &path) {
        Ok(field) => world.resolved_kind = Some(field.kind.clone()),
        Err(err) => world.last_error = Some(err),
    }
}

#[when(expr = "I parse the key expression {string}")]
async fn when_parse_key(world: &mut SchemaWorld, raw: String) {
    world.parsed_key = parse_key_expr(&raw);
}

#[then(expr = "the field kind is {word}")]
async fn then_field_kind(world: &mut SchemaWorld, kind: String) {
    let resolved = world.resolved_kind.as_ref().expect("a field was resolved");
    let matches = match kind.as_str() {
        "integer" => *resolved == FieldKind::Scalar(ScalarKind::Integer),
        "text" => *resolved == FieldKind::Scalar(ScalarKind::Text),
        "date" => *resolved == FieldKind::Scalar(ScalarKind::Date),
        "reference" => matches!(resolved, FieldKind::Reference { .. }),
        other => panic!("unknown kind name {other}"),
    };
    assert!(matches, "resolved kind was {resolved:?}, expected {kind}");
}

#[then("resolution fails with an unknown field error")]
async fn then_unknown_field(world: &mut SchemaWorld) {
    assert!(matches!(
        world.last_error,
        Some(TabletopError::UnknownField { .. })
    ));
}

#[then(expr = "the key has {int} parts")]
async fn then_key_parts(world: &mut SchemaWorld, parts: usize) {
    let key = world.parsed_key.as_ref().expect("key parsed");
    assert_eq!(key.len(), parts);
}

#[then("the key does not parse")]
async fn then_key_rejected(world: &mut SchemaWorld) {
    assert!(world.parsed_key.is_none());
}

#[tokio::main]
async fn main() {
    SchemaWorld::run("tests/features").await;
}
