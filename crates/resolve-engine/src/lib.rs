//! # Resolve Engine
//!
//! The step-table to record resolution engine.
//!
//! A step table arrives as strings: column headings and string cells.
//! This crate turns it into typed store payloads and back:
//!
//! - [`coerce`] converts one cell into a typed value for a field,
//! - [`ResolveEngine::resolve_table_references`] batch-resolves every
//!   cell naming a related entity into a concrete reference,
//! - [`ResolveEngine::materialize`] combines both into per-row field
//!   mappings ready for create/update,
//! - [`ResolveEngine::render_records`] walks stored records back into the
//!   same string-table shape,
//! - [`ResolveEngine::compare_records`] checks a store's contents against
//!   an expected table, keyed by an identifying field tuple.
//!
//! All of it is synchronous and single-threaded; the engine borrows the
//! schema and the store and owns no state of its own. The
//! [`ReferenceCache`] produced by one resolution pass is consumed by the
//! materializer and cannot outlive the step that built it.

pub use tabletop_core;

mod coerce;
mod compare;
mod materialize;
mod refs;
mod render;

pub use coerce::coerce;
pub use compare::MatchMode;
pub use materialize::ResolvedRow;
pub use refs::{FieldGroup, ReferenceCache, ResolveMode, ResolvedRef};

// Re-export core types for convenience
pub use tabletop_core::{Record, RecordStore, Result, Schema, StepTable, TabletopError, Value};

/// The resolution engine: schema-directed translation between step
/// tables and typed records.
///
/// Borrowing keeps the engine free of shared mutable state; every
/// resolution pass sees the store as it is at that moment.
#[derive(Clone, Copy)]
pub struct ResolveEngine<'a> {
    schema: &'a Schema,
    store: &'a dyn RecordStore,
}

impl std::fmt::Debug for ResolveEngine<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolveEngine")
            .field("entities", &self.schema.entity_names().count())
            .finish()
    }
}

impl<'a> ResolveEngine<'a> {
    pub fn new(schema: &'a Schema, store: &'a dyn RecordStore) -> Self {
        Self { schema, store }
    }

    pub fn schema(&self) -> &'a Schema {
        self.schema
    }

    pub fn store(&self) -> &'a dyn RecordStore {
        self.store
    }

    /// Resolve references and materialize in one pass. The reference
    /// cache lives and dies inside this call.
    pub fn materialize_table(
        &self,
        entity: &str,
        table: &StepTable,
        mode: ResolveMode,
    ) -> Result<Vec<ResolvedRow>> {
        let cache = self.resolve_table_references(entity, table, mode)?;
        self.materialize(entity, table, cache)
    }
}
