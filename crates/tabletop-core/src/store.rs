//! The record-store port.
//!
//! The resolution engine and the step definitions speak to persistence
//! through this trait only. Every call is synchronous; transactions and
//! isolation belong to the implementation. Implementations record each
//! operation in a human-readable log so suites can assert how many
//! queries a step issued.

use crate::error::Result;
use crate::key::KeyAtom;
use crate::value::{Record, Value};
use std::collections::BTreeMap;

pub trait RecordStore: Send + Sync {
    /// Fetch the records of `entity` whose ids appear in `ids`, in id
    /// order. Missing ids are simply absent from the result.
    fn fetch_by_ids(&self, entity: &str, ids: &[u64]) -> Result<Vec<Record>>;

    /// Look one record up by its natural key. Pure with respect to store
    /// state: no side effects beyond the operation log.
    fn fetch_by_natural_key(&self, entity: &str, key: &[KeyAtom]) -> Result<Option<Record>>;

    /// All records of `entity`, ordered by the given field names
    /// (id order when empty).
    fn fetch_all(&self, entity: &str, order_by: &[String]) -> Result<Vec<Record>>;

    /// Records matching every filter (field equality), ordered as in
    /// [`RecordStore::fetch_all`].
    fn fetch_where(
        &self,
        entity: &str,
        filters: &[(String, Value)],
        order_by: &[String],
    ) -> Result<Vec<Record>>;

    /// Create one record from materialized field values. Resolved
    /// references are stored as identifiers; an explicit `id` value wins
    /// over the sequence.
    fn create(&self, entity: &str, values: BTreeMap<String, Value>) -> Result<Record>;

    /// Update every record matching the filters, returning how many rows
    /// changed.
    fn update_where(
        &self,
        entity: &str,
        filters: &[(String, Value)],
        values: BTreeMap<String, Value>,
    ) -> Result<u64>;

    /// Delete all records of `entity`, returning how many were removed.
    fn delete_all(&self, entity: &str) -> Result<u64>;

    /// Reset the id sequence so the next assigned id is `next_value`, or
    /// `max(id) + 1` (1 for an empty table) when unspecified. Returns the
    /// next value now in effect.
    fn reset_identifier_sequence(&self, entity: &str, next_value: Option<u64>)
        -> Result<Option<u64>>;

    fn count(&self, entity: &str) -> Result<u64>;

    /// The operation log since the last clear, one description per call.
    fn operations(&self) -> Vec<String>;

    fn clear_operations(&self);
}
