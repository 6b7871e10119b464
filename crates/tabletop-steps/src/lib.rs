//! # Tabletop Steps
//!
//! Cucumber step definitions for driving a record store and an HTTP API
//! from Gherkin tables.
//!
//! A suite builds an [`Environment`] (schema, store, HTTP driver, mock
//! registry, outbox, clock), hands a factory for it to the [`Harness`],
//! and points the harness at its feature directory:
//!
//! ```no_run
//! # use tabletop_steps::{Environment, Harness};
//! # fn build_environment() -> Environment { unimplemented!() }
//! #[tokio::main]
//! async fn main() {
//!     Harness::new(build_environment).run("tests/features").await;
//! }
//! ```
//!
//! The step vocabulary covers fixture loading, table assertions, query
//! accounting, HTTP requests and response assertions, outbound-mail
//! assertions, and scope-scoped mocks. All table resolution goes through
//! the `resolve-engine` crate.

mod db;
mod driver;
mod http;
mod mail;
mod mocks;
mod world;

pub use driver::{ApiRequest, ApiResponse, HttpDriver, ReqwestDriver};
pub use mail::{EmailMessage, Outbox};
pub use world::{Environment, EnvironmentBuilder, Harness, TabletopWorld};

// Re-export the building blocks suites need to assemble an environment
pub use mock_registry::{CallLog, Mock, MockHandle, MockRegistry, Scope, TestClock};
pub use record_store::MemoryStore;
pub use tabletop_core::{Schema, TabletopError};
