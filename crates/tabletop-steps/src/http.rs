//! HTTP steps: request assembly, response and header assertions.

use crate::driver::{ApiRequest, ApiResponse};
use crate::world::TabletopWorld;
use cucumber::gherkin::Step;
use cucumber::{given, then, when};
use std::collections::BTreeMap;
use tabletop_core::table::pretty_table;

#[given(expr = "I make requests from the url {string}")]
async fn set_referer(world: &mut TabletopWorld, url: String) {
    world.http.headers.insert("referer".to_string(), url);
}

#[given("I set the request headers:")]
async fn set_headers(world: &mut TabletopWorld, step: &Step) {
    apply_headers(world, step, false);
}

#[given("I set the request headers using literals:")]
async fn set_headers_literals(world: &mut TabletopWorld, step: &Step) {
    apply_headers(world, step, true);
}

fn apply_headers(world: &mut TabletopWorld, step: &Step, literals: bool) {
    let table = world.table_of(step);
    for row in table.rows() {
        let name = row.get("name").expect("headers table has a name column");
        let value = row.get("value").expect("headers table has a value column");
        let value = if literals {
            normalize_literal(value)
        } else {
            value.to_string()
        };
        world.http.headers.insert(name.to_lowercase(), value);
    }
}

/// `using literals` canonicalizes the value through a structured-literal
/// parse, so `'X-Limit': '10'` and `X-Limit: 10` agree.
fn normalize_literal(raw: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::String(s)) => s,
        Ok(value) => value.to_string(),
        Err(_) => raw.to_string(),
    }
}

/// Queue a stubbed response for the next request, served without
/// touching the configured driver.
#[given(expr = "the next HTTP response has status {int} and body:")]
async fn stub_response(world: &mut TabletopWorld, status: u16, step: &Step) {
    let raw = step
        .docstring
        .as_ref()
        .expect("stubbed response requires a docstring body");
    let body: serde_json::Value = serde_json::from_str(raw)
        .unwrap_or_else(|err| panic!("stubbed body is not valid JSON: {err}"));
    world.http.stubbed.push_back(ApiResponse::json(status, body));
}

#[when(expr = "I make a {string} request to {string}")]
async fn request(world: &mut TabletopWorld, method: String, url: String) {
    send(world, &method, &url, None, None).await;
}

#[when(expr = "I make a {string} request to {string} with the parameters {string}")]
async fn request_with_params(
    world: &mut TabletopWorld,
    method: String,
    url: String,
    params: String,
) {
    send(world, &method, &url, Some(&params), None).await;
}

#[when(expr = "I make a {string} request to {string} with body:")]
async fn request_with_body(world: &mut TabletopWorld, method: String, url: String, step: &Step) {
    send(world, &method, &url, None, Some(step)).await;
}

#[when(expr = "I make a {string} request to {string} with the parameters {string} and body:")]
async fn request_with_params_and_body(
    world: &mut TabletopWorld,
    method: String,
    url: String,
    params: String,
    step: &Step,
) {
    send(world, &method, &url, Some(&params), Some(step)).await;
}

async fn send(
    world: &mut TabletopWorld,
    method: &str,
    url: &str,
    params: Option<&str>,
    step: Option<&Step>,
) {
    let mut url = if url.starts_with('/') {
        url.to_string()
    } else {
        format!("/{url}")
    };
    if let Some(params) = params {
        let query: Vec<String> = params
            .split(',')
            .map(|param| param.trim().replace(';', ","))
            .collect();
        url = format!("{url}?{}", query.join("&"));
    }

    let mut headers = world.http.headers.clone();
    headers
        .entry("content-type".to_string())
        .or_insert_with(|| "application/json".to_string());

    let body = step.and_then(|step| request_body(world, step));
    let request = ApiRequest {
        method: method.to_string(),
        url,
        headers,
        body,
    };

    let response = match world.http.stubbed.pop_front() {
        Some(stubbed) => stubbed,
        None => world
            .env
            .driver
            .send(request)
            .await
            .unwrap_or_else(|err| panic!("{err}")),
    };
    world.http.response = Some(response);
}

/// A docstring is raw JSON; a `key`/`value` table is one object; any
/// other table is a list of row objects.
fn request_body(world: &TabletopWorld, step: &Step) -> Option<serde_json::Value> {
    if let Some(raw) = &step.docstring {
        let parsed: serde_json::Value = serde_json::from_str(raw)
            .unwrap_or_else(|err| panic!("request body is not valid JSON: {err}"));
        return Some(parsed);
    }
    step.table.as_ref()?;

    let table = world.table_of(step);
    let headings = table.headings();
    if headings.len() == 2 && headings.contains(&"key".to_string()) && headings.contains(&"value".to_string())
    {
        let mut object = serde_json::Map::new();
        for row in table.rows() {
            let key = row.get("key").unwrap_or_default();
            let value = row.get("value").unwrap_or_default();
            object.insert(key.to_string(), serde_json::Value::String(value.to_string()));
        }
        return Some(serde_json::Value::Object(object));
    }

    let rows: Vec<serde_json::Value> = table
        .rows()
        .map(|row| {
            let object: serde_json::Map<String, serde_json::Value> = row
                .as_map()
                .into_iter()
                .map(|(key, value)| (key, serde_json::Value::String(value)))
                .collect();
            serde_json::Value::Object(object)
        })
        .collect();
    Some(serde_json::Value::Array(rows))
}

fn response_of(world: &TabletopWorld) -> &ApiResponse {
    world
        .http
        .response
        .as_ref()
        .expect("no response captured; make a request first")
}

#[then(expr = "the response status code is {int}")]
async fn assert_status(world: &mut TabletopWorld, status: u16) {
    let response = response_of(world);
    assert_eq!(
        response.status,
        status,
        "unexpected status; body was:\n{}",
        response.text()
    );
}

#[then(expr = "there are {int} elements in the response")]
async fn assert_element_count(world: &mut TabletopWorld, count: usize) {
    let response = response_of(world);
    let body = response.parsed().expect("response body is JSON");
    let results = body
        .get("results")
        .and_then(|value| value.as_array())
        .unwrap_or_else(|| panic!("response has no results array:\n{body}"));
    assert_eq!(results.len(), count);
}

#[then("the response is:")]
async fn assert_response(world: &mut TabletopWorld, step: &Step) {
    assert_response_against(world, step, None);
}

#[then(expr = "using the pointer {string} the response is:")]
async fn assert_response_at_pointer(world: &mut TabletopWorld, pointer: String, step: &Step) {
    assert_response_against(world, step, Some(&pointer));
}

fn assert_response_against(world: &TabletopWorld, step: &Step, pointer: Option<&str>) {
    let response = response_of(world);

    if step.table.is_some() {
        let body = response.parsed().expect("response body is JSON");
        let selected = match pointer {
            Some(pointer) => body
                .pointer(pointer)
                .unwrap_or_else(|| panic!("pointer {pointer:?} selects nothing in:\n{body}"))
                .clone(),
            None => body,
        };
        assert_json_table(world, step, &selected);
        return;
    }

    let Some(docstring) = &step.docstring else {
        panic!("nothing to compare: the step carries neither a table nor a docstring");
    };
    if response.is_json() {
        let expected: serde_json::Value = serde_json::from_str(docstring)
            .unwrap_or_else(|err| panic!("expected body is not valid JSON: {err}"));
        let actual = response.parsed().expect("response body is JSON");
        let actual = match pointer {
            Some(pointer) => actual
                .pointer(pointer)
                .unwrap_or_else(|| panic!("pointer {pointer:?} selects nothing in:\n{actual}"))
                .clone(),
            None => actual,
        };
        assert_eq!(actual, expected);
    } else {
        assert_eq!(
            normalize_text(&response.text()),
            normalize_text(docstring)
        );
    }
}

/// Strip per-line leading whitespace and the space after a colon so
/// indented docstrings compare cleanly against compact bodies.
fn normalize_text(raw: &str) -> String {
    raw.lines()
        .map(str::trim_start)
        .collect::<String>()
        .replace(": ", ":")
}

fn assert_json_table(world: &TabletopWorld, step: &Step, actual: &serde_json::Value) {
    let table = world.table_of(step);
    let fields = table.headings().to_vec();

    let items: Vec<serde_json::Value> = match actual {
        serde_json::Value::Array(items) => items.clone(),
        object => vec![object.clone()],
    };

    let actual_rows: Vec<BTreeMap<String, String>> = items
        .iter()
        .map(|item| {
            fields
                .iter()
                .map(|field| (field.clone(), render_json_path(item, field)))
                .collect()
        })
        .collect();
    let expected_rows: Vec<BTreeMap<String, String>> = table
        .rows()
        .map(|row| {
            fields
                .iter()
                .map(|field| (field.clone(), row.get(field).unwrap_or_default().to_string()))
                .collect()
        })
        .collect();

    assert_eq!(
        actual_rows,
        expected_rows,
        "\n\nWhat we actually got back was:\n{}",
        pretty_table(&fields, &actual_rows)
    );
}

/// Walk a dotted path through objects (and array indices) and render
/// the terminal JSON value as a cell string.
fn render_json_path(value: &serde_json::Value, path: &str) -> String {
    let mut current = value;
    for segment in path.split('.') {
        let next = match current {
            serde_json::Value::Object(map) => map.get(segment),
            serde_json::Value::Array(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index)),
            _ => None,
        };
        let Some(next) = next else {
            return String::new();
        };
        current = next;
    }
    match current {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[then("the response contains the following headers:")]
async fn assert_headers(world: &mut TabletopWorld, step: &Step) {
    let table = world.table_of(step);
    let response = response_of(world);
    for row in table.rows() {
        let key = row
            .get("key")
            .expect("headers table has a key column")
            .to_lowercase();
        let value = row.get("value").expect("headers table has a value column");
        let actual = response
            .headers
            .get(&key)
            .unwrap_or_else(|| panic!("header {key:?} not found; headers: {:?}", response.headers));
        assert_eq!(actual, value, "header {key:?} mismatch");
    }
}
