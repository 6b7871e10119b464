//! Mock steps: scope-scoped activation, environment variables, the
//! frozen clock, and call-recording assertions.

use crate::world::TabletopWorld;
use cucumber::gherkin::Step;
use cucumber::{given, then, when};
use mock_registry::{EnvVarMock, FrozenClockMock, Mock, RecordingMock, Scope};
use std::collections::BTreeMap;

fn scope_named(name: &str) -> Scope {
    match name {
        "scenario" => Scope::Scenario,
        "feature" => Scope::Feature,
        other => panic!("\"{other}\" is not a valid scope; use \"scenario\" or \"feature\""),
    }
}

/// The single-row argument table a mock activation may carry.
fn args_of(world: &TabletopWorld, step: &Step) -> BTreeMap<String, String> {
    if step.table.is_none() {
        return BTreeMap::new();
    }
    let table = world.table_of(step);
    assert_eq!(
        table.len(),
        1,
        "mock activations accept a single row of arguments"
    );
    let first = table
        .rows()
        .next()
        .map(|row| row.as_map())
        .unwrap_or_default();
    first
}

#[when(expr = "I turn on the mock named {string} for this {string}")]
async fn turn_on(world: &mut TabletopWorld, name: String, scope: String) {
    world
        .env
        .registry
        .begin(scope_named(&scope), &name, &BTreeMap::new())
        .unwrap_or_else(|err| panic!("{err}"));
}

#[when(expr = "I turn on the mock named {string} for this {string} with the arguments:")]
async fn turn_on_with_args(world: &mut TabletopWorld, name: String, scope: String, step: &Step) {
    let args = args_of(world, step);
    world
        .env
        .registry
        .begin(scope_named(&scope), &name, &args)
        .unwrap_or_else(|err| panic!("{err}"));
}

#[when(expr = "I turn off the mock named {string}")]
async fn turn_off(world: &mut TabletopWorld, name: String) {
    world
        .env
        .registry
        .end_named(&name)
        .unwrap_or_else(|err| panic!("{err}"));
}

fn mock_environment(world: &mut TabletopWorld, step: &Step, clear_first: bool) {
    let table = world.table_of(step);
    let mut args = BTreeMap::new();
    for row in table.rows() {
        let key = row.get("key").expect("environment table has a key column");
        let value = row.get("value").expect("environment table has a value column");
        args.insert(key.to_string(), value.to_string());
    }
    let handle = EnvVarMock::new(clear_first)
        .begin(&args)
        .unwrap_or_else(|err| panic!("{err}"));
    world
        .env
        .registry
        .activate(Scope::Scenario, "tabletop.environment", handle)
        .unwrap_or_else(|err| panic!("{err}"));
}

#[given("I mock the following environment variables:")]
async fn mock_env(world: &mut TabletopWorld, step: &Step) {
    mock_environment(world, step, false);
}

#[given("I clear and mock the following environment variables:")]
async fn clear_and_mock_env(world: &mut TabletopWorld, step: &Step) {
    mock_environment(world, step, true);
}

#[given(expr = "today is {string}")]
async fn freeze_time(world: &mut TabletopWorld, moment: String) {
    let mut args = BTreeMap::new();
    args.insert("at".to_string(), moment);
    let handle = FrozenClockMock::new(world.env.clock.clone())
        .begin(&args)
        .unwrap_or_else(|err| panic!("{err}"));
    world
        .env
        .registry
        .activate(Scope::Scenario, "tabletop.frozen-clock", handle)
        .unwrap_or_else(|err| panic!("{err}"));
}

#[given(expr = "a recording mock named {string} is active for this {string}")]
async fn recording_mock(world: &mut TabletopWorld, name: String, scope: String) {
    let handle = RecordingMock::new(world.env.call_log.clone())
        .begin(&BTreeMap::new())
        .unwrap_or_else(|err| panic!("{err}"));
    world
        .env
        .registry
        .activate(scope_named(&scope), &name, handle)
        .unwrap_or_else(|err| panic!("{err}"));
}

/// Seeding step for suites exercising the call assertions without a
/// live collaborator.
#[when("the system under test calls the mocked collaborator with:")]
async fn seed_calls(world: &mut TabletopWorld, step: &Step) {
    let table = world.table_of(step);
    for row in table.rows() {
        world.env.call_log.record(row.as_map());
    }
}

#[then("the mock was called once")]
async fn called_once(world: &mut TabletopWorld) {
    assert_eq!(
        world.env.call_log.len(),
        1,
        "expected exactly one call, saw {}",
        world.env.call_log.len()
    );
}

#[then("the mock was called with the following parameters:")]
async fn called_with(world: &mut TabletopWorld, step: &Step) {
    let table = world.table_of(step);
    let calls = world.env.call_log.calls();
    assert_eq!(
        calls.len(),
        table.len(),
        "mock saw {} call(s), the table expects {}",
        calls.len(),
        table.len()
    );

    for (row, call) in table.rows().zip(&calls) {
        for heading in table.headings() {
            let expected = row.get(heading).unwrap_or_default();
            let actual = call.get(heading).map(String::as_str).unwrap_or_default();
            assert!(
                cell_matches(actual, expected),
                "call argument \"{heading}\" was {actual:?}, expected {expected:?}"
            );
        }
    }
}

#[then(expr = "the environment variable {string} is {string}")]
async fn env_var_is(_world: &mut TabletopWorld, name: String, value: String) {
    assert_eq!(std::env::var(&name).as_deref(), Ok(value.as_str()));
}

#[then(expr = "the environment variable {string} is not set")]
async fn env_var_unset(_world: &mut TabletopWorld, name: String) {
    assert!(std::env::var(&name).is_err(), "{name} is unexpectedly set");
}

#[then(expr = "the clock reads {string}")]
async fn clock_reads(world: &mut TabletopWorld, moment: String) {
    let now = world.env.clock.now();
    assert_eq!(now.to_rfc3339(), format!("{moment}T00:00:00+00:00"));
}

/// Loose cell equality: exact string match, or numeric equality when
/// both sides parse as numbers.
fn cell_matches(actual: &str, expected: &str) -> bool {
    if actual == expected {
        return true;
    }
    match (actual.parse::<f64>(), expected.parse::<f64>()) {
        (Ok(a), Ok(e)) => a == e,
        _ => false,
    }
}
