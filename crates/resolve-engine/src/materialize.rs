//! Row materialization: string cells plus a reference cache into typed
//! field mappings.

use crate::coerce::coerce;
use crate::refs::{ReferenceCache, ResolvedRef};
use crate::ResolveEngine;
use std::collections::BTreeMap;
use tabletop_core::{Result, StepTable, Value};
use tracing::instrument;

/// One materialized row: field name to typed value, ready for
/// create/update.
pub type ResolvedRow = BTreeMap<String, Value>;

impl ResolveEngine<'_> {
    /// Turn every table row into a typed field mapping.
    ///
    /// Cells with a cache entry take the resolved reference; field-group
    /// replacements expand into their physical fields; identifier
    /// columns are rewritten to the logical relation name. Everything
    /// else goes through the coercer — including reference cells the
    /// cache knows nothing about, which fall back to their raw text so a
    /// bad fixture shows up as a value mismatch instead of a silent
    /// drop.
    ///
    /// The cache is taken by value: it cannot be reused for another
    /// table.
    #[instrument(skip(self, table, cache), fields(entity = entity, rows = table.len()))]
    pub fn materialize(
        &self,
        entity: &str,
        table: &StepTable,
        cache: ReferenceCache,
    ) -> Result<Vec<ResolvedRow>> {
        let entity_type = self.schema().entity(entity)?;
        let mut rows = Vec::with_capacity(table.len());

        for row in table.rows() {
            let mut out = ResolvedRow::new();
            for heading in table.headings() {
                let raw = row.get(heading).unwrap_or("");
                let name = cache.logical_name(heading).unwrap_or(heading);

                match cache.get(heading, raw) {
                    Some(ResolvedRef::Entity(entity_ref)) => {
                        out.insert(name.to_string(), Value::Ref(entity_ref.clone()));
                    }
                    Some(ResolvedRef::Set(refs)) => {
                        out.insert(name.to_string(), Value::RefSet(refs.clone()));
                    }
                    Some(ResolvedRef::Missing) => {
                        out.insert(name.to_string(), Value::Null);
                    }
                    Some(ResolvedRef::Group(group)) => {
                        for (field, value) in &group.entries {
                            out.insert(field.clone(), value.clone());
                        }
                    }
                    None => {
                        let descriptor = self.heading_descriptor(entity_type, heading)?;
                        out.insert(name.to_string(), coerce(descriptor, raw)?);
                    }
                }
            }
            rows.push(out);
        }
        Ok(rows)
    }
}
