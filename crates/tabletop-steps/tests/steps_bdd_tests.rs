//! Self-test suite for the Tabletop step definitions, run against the
//! in-memory store and stubbed HTTP responses.

use mock_registry::RecordingMock;
use std::sync::Arc;
use tabletop_core::{Cardinality, EntityType, FieldDescriptor, ScalarKind, Schema};
use tabletop_steps::{Environment, Harness};

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
                FieldDescriptor::scalar("choice_text", ScalarKind::Text),
                FieldDescriptor::scalar("votes", ScalarKind::Integer),
            ],
        ))
        .entity(EntityType::new(
            "crm.Customer",
            vec![
                FieldDescriptor::scalar("nk", ScalarKind::Text),
                FieldDescriptor::scalar("name", ScalarKind::Text),
                FieldDescriptor::scalar("notes", ScalarKind::Text),
            ],
        ))
        .entity(EntityType::new(
            "audit.LogEntry",
            vec![
                FieldDescriptor::scalar("message", ScalarKind::Text),
                FieldDescriptor::scalar("target_type", ScalarKind::Text),
                FieldDescriptor::scalar("target_id", ScalarKind::Integer),
                FieldDescriptor::generic_reference("target", "target_type", "target_id"),
            ],
        ))
        .build()
        .expect("fixture schema is valid")
}

fn build_environment() -> Environment {
    let env = Environment::builder(poll_schema()).build();
    env.registry
        .register(
            "app.PaymentGateway",
            Arc::new(RecordingMock::new(env.call_log.clone())),
        )
        .expect("unique mock name");
    env
}

#[tokio::main]
async fn main() {
    Harness::new(build_environment).run("tests/features").await;
}
