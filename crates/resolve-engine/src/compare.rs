//! The assertion comparison contract.
//!
//! Both sides of a comparison are rendered into the same string-table
//! shape and keyed by the caller-declared identifying-field tuple. The
//! key sets must match exactly, then every row must match cell by cell.
//! Failures carry both tables pretty-printed.

use crate::refs::ResolveMode;
use crate::ResolveEngine;
use std::collections::BTreeMap;
use tabletop_core::table::pretty_table;
use tabletop_core::{Result, StepTable, TabletopError};
use tracing::instrument;

/// How the actual set is scoped before comparison.
///
/// `Exact` compares the entire table contents: a row missing from either
/// side fails via the key-set check, never silently. `Contains` first
/// narrows the actual set to rows whose identifying tuple appears in the
/// expected table, then applies the same checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    Exact,
    Contains,
}

impl ResolveEngine<'_> {
    /// Compare the stored contents of `entity` against an expected
    /// table.
    ///
    /// `identified_by` names the fields whose rendered values key each
    /// row; duplicate keys among the actual rows fail fast with
    /// [`TabletopError::NonUniqueIdentifier`]. `order_by` orders the
    /// actual fetch (id order when empty) — ordering does not affect
    /// the outcome, only the dump attached to failures.
    #[instrument(skip(self, expected), fields(entity = entity, mode = ?mode))]
    pub fn compare_records(
        &self,
        entity: &str,
        expected: &StepTable,
        identified_by: &[String],
        order_by: &[String],
        mode: MatchMode,
    ) -> Result<()> {
        let fields: Vec<String> = expected.headings().to_vec();
        for field in identified_by {
            if !fields.contains(field) {
                return Err(TabletopError::InvalidTable {
                    reason: format!(
                        "rows cannot be identified by \"{field}\"; ensure it is present in the table headings"
                    ),
                });
            }
        }

        let cache = self.resolve_table_references(entity, expected, ResolveMode::Lenient)?;
        let expected_rows = self.render_expected(entity, expected, &cache, ResolveMode::Lenient)?;
        let mut expected_by_key = BTreeMap::new();
        for row in expected_rows {
            expected_by_key.insert(key_of(&row, identified_by), row);
        }

        let records = self.store().fetch_all(entity, order_by)?;
        let actual_rows = self.render_records(entity, &records, &fields, ResolveMode::Lenient)?;
        let mut actual_by_key: BTreeMap<Vec<String>, BTreeMap<String, String>> = BTreeMap::new();
        for row in actual_rows {
            let key = key_of(&row, identified_by);
            if mode == MatchMode::Contains && !expected_by_key.contains_key(&key) {
                continue;
            }
            if let Some(existing) = actual_by_key.get(&key) {
                return Err(TabletopError::NonUniqueIdentifier {
                    key: fmt_key(&key),
                    first: pretty_table(&fields, std::slice::from_ref(existing)),
                    second: pretty_table(&fields, &[row]),
                });
            }
            actual_by_key.insert(key, row);
        }

        if expected_by_key.keys().ne(actual_by_key.keys()) {
            let missing: Vec<String> = expected_by_key
                .keys()
                .filter(|k| !actual_by_key.contains_key(*k))
                .map(|k| fmt_key(k))
                .collect();
            let unexpected: Vec<String> = actual_by_key
                .keys()
                .filter(|k| !expected_by_key.contains_key(*k))
                .map(|k| fmt_key(k))
                .collect();
            return Err(TabletopError::TableMismatch {
                detail: format!(
                    "\nidentifying keys differ\n  missing from actual: [{}]\n  not expected: [{}]\n\nExpected:\n{}\nWhat we actually got back was:\n{}",
                    missing.join(", "),
                    unexpected.join(", "),
                    pretty_table(&fields, &expected_by_key.values().cloned().collect::<Vec<_>>()),
                    pretty_table(&fields, &actual_by_key.values().cloned().collect::<Vec<_>>()),
                ),
            });
        }

        for (key, expected_row) in &expected_by_key {
            let actual_row = &actual_by_key[key];
            if expected_row != actual_row {
                let differing: Vec<&str> = fields
                    .iter()
                    .filter(|f| expected_row.get(*f) != actual_row.get(*f))
                    .map(String::as_str)
                    .collect();
                return Err(TabletopError::TableMismatch {
                    detail: format!(
                        "\nrow {} differs in [{}]\n\nExpected:\n{}\nWhat we actually got back was:\n{}",
                        fmt_key(key),
                        differing.join(", "),
                        pretty_table(&fields, std::slice::from_ref(expected_row)),
                        pretty_table(&fields, std::slice::from_ref(actual_row)),
                    ),
                });
            }
        }
        Ok(())
    }
}

fn key_of(row: &BTreeMap<String, String>, identified_by: &[String]) -> Vec<String> {
    identified_by
        .iter()
        .map(|field| row.get(field).cloned().unwrap_or_default())
        .collect()
}

fn fmt_key(key: &[String]) -> String {
    format!("({})", key.join(", "))
}
