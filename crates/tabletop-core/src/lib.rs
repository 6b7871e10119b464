//! # Tabletop Core
//!
//! Core types for the Tabletop step-definition library.
//!
//! Tabletop turns Gherkin step tables into typed record operations. This
//! crate holds the pieces every other crate agrees on:
//!
//! - the entity schema ([`Schema`], [`EntityType`], [`FieldDescriptor`],
//!   [`FieldKind`]) describing what a step table may address,
//! - the runtime value model ([`Value`], [`Record`], [`EntityRef`]),
//! - natural-key expressions ([`KeyAtom`], bracketed-sequence parsing),
//! - the step-table shape ([`StepTable`]) and its plain-text rendering,
//! - the [`RecordStore`] port implemented by `record-store`,
//! - the shared error taxonomy ([`TabletopError`]).
//!
//! The resolution engine that ties these together lives in
//! `resolve-engine`; the cucumber glue lives in `tabletop-steps`.

pub mod error;
pub mod key;
pub mod schema;
pub mod store;
pub mod table;
pub mod value;

pub use error::{Result, TabletopError};
pub use key::{format_key, is_key_expr, parse_key_expr, KeyAtom};
pub use schema::{Cardinality, EntityType, FieldDescriptor, FieldKind, ScalarKind, Schema};
pub use store::RecordStore;
pub use table::StepTable;
pub use value::{EntityRef, Record, Value};

/// Current Tabletop version for compatibility checks
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Tabletop build information for diagnostics
pub const BUILD_INFO: &str = concat!(
    "Tabletop ",
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("CARGO_PKG_NAME"),
    ")"
);
