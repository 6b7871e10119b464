//! The in-memory store.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use tabletop_core::{
    FieldKind, KeyAtom, Record, RecordStore, Result, Schema, TabletopError, Value,
};
use tracing::{debug, info};

#[derive(Debug, Default)]
struct EntityTable {
    rows: BTreeMap<u64, Record>,
    next_id: u64,
}

impl EntityTable {
    fn next_id(&mut self) -> u64 {
        if self.next_id == 0 {
            self.next_id = 1;
        }
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

/// Schema-aware in-memory record store.
///
/// Tables live behind a `DashMap`; the operation log behind a mutex.
/// Suitable for the strictly sequential step execution Tabletop
/// assumes, while staying `Send + Sync` for the async cucumber harness.
pub struct MemoryStore {
    schema: Arc<Schema>,
    tables: DashMap<String, EntityTable>,
    operations: Mutex<Vec<String>>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("entities", &self.tables.len())
            .field("operations", &self.operations.lock().len())
            .finish()
    }
}

impl MemoryStore {
    pub fn new(schema: Arc<Schema>) -> Self {
        info!("initializing in-memory record store");
        Self {
            schema,
            tables: DashMap::new(),
            operations: Mutex::new(Vec::new()),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    fn log(&self, operation: String) {
        debug!(op = %operation, "store operation");
        self.operations.lock().push(operation);
    }

    fn check_entity(&self, entity: &str) -> Result<()> {
        self.schema.entity(entity).map(|_| ())
    }

    /// Normalize a value for storage under `field`: resolved references
    /// become identifiers, explicit integers on reference fields are
    /// accepted as identifiers.
    fn stored_value(&self, entity: &str, field: &str, value: Value) -> Result<Value> {
        let entity_type = self.schema.entity(entity)?;
        let Some(descriptor) = entity_type.field(field) else {
            return Err(TabletopError::UnknownField {
                entity: entity.to_string(),
                path: field.to_string(),
            });
        };
        Ok(match (&descriptor.kind, value) {
            (FieldKind::Reference { .. }, Value::Ref(entity_ref)) => Value::Id(entity_ref.id),
            (FieldKind::Reference { .. }, Value::Int(id)) if id >= 0 => Value::Id(id as u64),
            (_, value) => value,
        })
    }

    fn sorted(&self, mut records: Vec<Record>, order_by: &[String]) -> Vec<Record> {
        if order_by.is_empty() {
            records.sort_by_key(|r| r.id);
            return records;
        }
        records.sort_by(|a, b| {
            for field in order_by {
                let (field, descending) = match field.strip_prefix('-') {
                    Some(rest) => (rest, true),
                    None => (field.as_str(), false),
                };
                let ordering = compare_values(&a.value_of(field), &b.value_of(field));
                let ordering = if descending { ordering.reverse() } else { ordering };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            a.id.cmp(&b.id)
        });
        records
    }
}

impl RecordStore for MemoryStore {
    fn fetch_by_ids(&self, entity: &str, ids: &[u64]) -> Result<Vec<Record>> {
        self.check_entity(entity)?;
        self.log(format!("select {entity} ids={ids:?}"));
        let Some(table) = self.tables.get(entity) else {
            return Ok(Vec::new());
        };
        let mut sorted_ids: Vec<u64> = ids.to_vec();
        sorted_ids.sort_unstable();
        sorted_ids.dedup();
        Ok(sorted_ids
            .into_iter()
            .filter_map(|id| table.rows.get(&id).cloned())
            .collect())
    }

    fn fetch_by_natural_key(&self, entity: &str, key: &[KeyAtom]) -> Result<Option<Record>> {
        let entity_type = self.schema.entity(entity)?;
        self.log(format!("select {entity} nk={key:?}"));
        let Some(nk_fields) = entity_type.natural_key_fields() else {
            return Ok(None);
        };
        if nk_fields.len() != key.len() {
            return Ok(None);
        }

        // Coerce each atom to the kind its key field stores.
        let mut wanted = Vec::with_capacity(key.len());
        for (field, atom) in nk_fields.iter().zip(key) {
            let FieldKind::Scalar(kind) = entity_type
                .field(field)
                .map(|f| f.kind.clone())
                .unwrap_or(FieldKind::Scalar(tabletop_core::ScalarKind::Text))
            else {
                return Ok(None);
            };
            let Some(value) = atom.to_value(kind) else {
                return Ok(None);
            };
            wanted.push(((*field).to_string(), value));
        }

        let Some(table) = self.tables.get(entity) else {
            return Ok(None);
        };
        Ok(table
            .rows
            .values()
            .find(|record| {
                wanted
                    .iter()
                    .all(|(field, value)| record.value_of(field) == *value)
            })
            .cloned())
    }

    fn fetch_all(&self, entity: &str, order_by: &[String]) -> Result<Vec<Record>> {
        self.check_entity(entity)?;
        self.log(format!("select all {entity}"));
        let records = self
            .tables
            .get(entity)
            .map(|table| table.rows.values().cloned().collect())
            .unwrap_or_default();
        Ok(self.sorted(records, order_by))
    }

    fn fetch_where(
        &self,
        entity: &str,
        filters: &[(String, Value)],
        order_by: &[String],
    ) -> Result<Vec<Record>> {
        self.check_entity(entity)?;
        self.log(format!(
            "select {entity} where {:?}",
            filters.iter().map(|(f, _)| f).collect::<Vec<_>>()
        ));
        let mut wanted = Vec::with_capacity(filters.len());
        for (field, value) in filters {
            wanted.push((field.clone(), self.stored_value(entity, field, value.clone())?));
        }
        let records: Vec<Record> = self
            .tables
            .get(entity)
            .map(|table| {
                table
                    .rows
                    .values()
                    .filter(|record| {
                        wanted
                            .iter()
                            .all(|(field, value)| record.value_of(field) == *value)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(self.sorted(records, order_by))
    }

    fn create(&self, entity: &str, values: BTreeMap<String, Value>) -> Result<Record> {
        let entity_type = self.schema.entity(entity)?.clone();
        let mut explicit_id = None;
        let mut fields = BTreeMap::new();

        for (name, value) in values {
            if name == "id" {
                explicit_id = match value {
                    Value::Int(id) if id > 0 => Some(id as u64),
                    Value::Id(id) => Some(id),
                    _ => None,
                };
                continue;
            }
            // Generic-reference logical fields are virtual; the backing
            // columns carry the data.
            if let Some(descriptor) = entity_type.field(&name) {
                if matches!(descriptor.kind, FieldKind::GenericReference { .. }) {
                    continue;
                }
            }
            fields.insert(name.clone(), self.stored_value(entity, &name, value)?);
        }

        let mut table = self.tables.entry(entity.to_string()).or_default();
        let id = match explicit_id {
            Some(id) => {
                table.next_id = table.next_id.max(id + 1);
                id
            }
            None => table.next_id(),
        };
        let record = Record::new(entity, id, fields);
        table.rows.insert(id, record.clone());
        drop(table);
        self.log(format!("insert {entity} id={id}"));
        Ok(record)
    }

    fn update_where(
        &self,
        entity: &str,
        filters: &[(String, Value)],
        values: BTreeMap<String, Value>,
    ) -> Result<u64> {
        self.check_entity(entity)?;
        let mut wanted = Vec::with_capacity(filters.len());
        for (field, value) in filters {
            wanted.push((field.clone(), self.stored_value(entity, field, value.clone())?));
        }
        let mut stored = BTreeMap::new();
        for (name, value) in values {
            stored.insert(name.clone(), self.stored_value(entity, &name, value)?);
        }

        let mut updated = 0;
        if let Some(mut table) = self.tables.get_mut(entity) {
            for record in table.rows.values_mut() {
                let matches = wanted
                    .iter()
                    .all(|(field, value)| record.value_of(field) == *value);
                if matches {
                    for (name, value) in &stored {
                        record.fields.insert(name.clone(), value.clone());
                    }
                    updated += 1;
                }
            }
        }
        self.log(format!("update {entity} rows={updated}"));
        Ok(updated)
    }

    fn delete_all(&self, entity: &str) -> Result<u64> {
        self.check_entity(entity)?;
        let removed = self
            .tables
            .get_mut(entity)
            .map(|mut table| {
                let count = table.rows.len() as u64;
                table.rows.clear();
                count
            })
            .unwrap_or(0);
        self.log(format!("delete {entity} rows={removed}"));
        Ok(removed)
    }

    fn reset_identifier_sequence(
        &self,
        entity: &str,
        next_value: Option<u64>,
    ) -> Result<Option<u64>> {
        self.check_entity(entity)?;
        let mut table = self.tables.entry(entity.to_string()).or_default();
        let next = match next_value {
            Some(value) if value > 0 => value,
            _ => table.rows.keys().next_back().map_or(1, |max| max + 1),
        };
        table.next_id = next;
        drop(table);
        self.log(format!("reset sequence {entity} next={next}"));
        Ok(Some(next))
    }

    fn count(&self, entity: &str) -> Result<u64> {
        self.check_entity(entity)?;
        self.log(format!("count {entity}"));
        Ok(self
            .tables
            .get(entity)
            .map(|table| table.rows.len() as u64)
            .unwrap_or(0))
    }

    fn operations(&self) -> Vec<String> {
        self.operations.lock().clone()
    }

    fn clear_operations(&self) {
        self.operations.lock().clear();
    }
}

/// Total order over heterogeneous values for `order_by`: nulls first,
/// same-kind values by their natural order, mixed kinds by rendered
/// form.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Float(x), Value::Float(y)) => x.total_cmp(y),
        (Value::Text(x), Value::Text(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Date(x), Value::Date(y)) => x.cmp(y),
        (Value::DateTime(x), Value::DateTime(y)) => x.cmp(y),
        (Value::Id(x), Value::Id(y)) => x.cmp(y),
        (x, y) => x.render().cmp(&y.render()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabletop_core::{Cardinality, EntityType, FieldDescriptor, ScalarKind};

    fn schema() -> Arc<Schema> {
        Arc::new(
            Schema::builder()
                .entity(EntityType::new(
                    "crm.Customer",
                    vec![
                        FieldDescriptor::scalar("nk", ScalarKind::Text),
                        FieldDescriptor::scalar("name", ScalarKind::Text),
                    ],
                ))
                .entity(EntityType::new(
                    "crm.Order",
                    vec![
                        FieldDescriptor::scalar("nk", ScalarKind::Text),
                        FieldDescriptor::reference("customer", "crm.Customer", Cardinality::One),
                        FieldDescriptor::scalar("total", ScalarKind::Float),
                    ],
                ))
                .build()
                .unwrap(),
        )
    }

    fn store() -> MemoryStore {
        MemoryStore::new(schema())
    }

    fn customer(store: &MemoryStore, nk: &str) -> Record {
        let mut values = BTreeMap::new();
        values.insert("nk".to_string(), Value::Text(nk.to_string()));
        store.create("crm.Customer", values).unwrap()
    }

    #[test]
    fn ids_are_assigned_sequentially() {
        let store = store();
        assert_eq!(customer(&store, "C1").id, 1);
        assert_eq!(customer(&store, "C2").id, 2);
    }

    #[test]
    fn explicit_id_advances_the_sequence() {
        let store = store();
        let mut values = BTreeMap::new();
        values.insert("id".to_string(), Value::Int(10));
        values.insert("nk".to_string(), Value::Text("C10".to_string()));
        assert_eq!(store.create("crm.Customer", values).unwrap().id, 10);
        assert_eq!(customer(&store, "C11").id, 11);
    }

    #[test]
    fn natural_key_lookup_finds_one_record() {
        let store = store();
        customer(&store, "C1");
        let found = store
            .fetch_by_natural_key("crm.Customer", &[KeyAtom::Text("C1".to_string())])
            .unwrap();
        assert_eq!(found.map(|r| r.id), Some(1));
        let missing = store
            .fetch_by_natural_key("crm.Customer", &[KeyAtom::Text("C9".to_string())])
            .unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn references_are_stored_as_identifiers() {
        let store = store();
        let c1 = customer(&store, "C1");
        let mut values = BTreeMap::new();
        values.insert("nk".to_string(), Value::Text("O1".to_string()));
        values.insert(
            "customer".to_string(),
            Value::Ref(tabletop_core::EntityRef::new("crm.Customer", c1.id)),
        );
        let order = store.create("crm.Order", values).unwrap();
        assert_eq!(order.value_of("customer"), Value::Id(1));
    }

    #[test]
    fn sequence_reset_follows_max_id() {
        let store = store();
        customer(&store, "C1");
        customer(&store, "C2");
        assert_eq!(
            store.reset_identifier_sequence("crm.Customer", None).unwrap(),
            Some(3)
        );
        store.delete_all("crm.Customer").unwrap();
        assert_eq!(
            store.reset_identifier_sequence("crm.Customer", None).unwrap(),
            Some(1)
        );
        assert_eq!(
            store
                .reset_identifier_sequence("crm.Customer", Some(7))
                .unwrap(),
            Some(7)
        );
        assert_eq!(customer(&store, "C7").id, 7);
    }

    #[test]
    fn update_where_filters_on_equality() {
        let store = store();
        customer(&store, "C1");
        customer(&store, "C2");
        let mut values = BTreeMap::new();
        values.insert("name".to_string(), Value::Text("Renamed".to_string()));
        let updated = store
            .update_where(
                "crm.Customer",
                &[("nk".to_string(), Value::Text("C2".to_string()))],
                values,
            )
            .unwrap();
        assert_eq!(updated, 1);
        let rows = store.fetch_all("crm.Customer", &[]).unwrap();
        assert_eq!(rows[1].value_of("name"), Value::Text("Renamed".to_string()));
        assert_eq!(rows[0].value_of("name"), Value::Null);
    }

    #[test]
    fn operation_log_records_every_call() {
        let store = store();
        customer(&store, "C1");
        store.fetch_all("crm.Customer", &[]).unwrap();
        let ops = store.operations();
        assert_eq!(ops, vec!["insert crm.Customer id=1", "select all crm.Customer"]);
        store.clear_operations();
        assert!(store.operations().is_empty());
    }

    #[test]
    fn fetch_all_orders_by_requested_fields() {
        let store = store();
        let mut values = BTreeMap::new();
        values.insert("nk".to_string(), Value::Text("B".to_string()));
        store.create("crm.Customer", values).unwrap();
        let mut values = BTreeMap::new();
        values.insert("nk".to_string(), Value::Text("A".to_string()));
        store.create("crm.Customer", values).unwrap();

        let by_nk = store
            .fetch_all("crm.Customer", &["nk".to_string()])
            .unwrap();
        assert_eq!(by_nk[0].value_of("nk"), Value::Text("A".to_string()));

        let descending = store
            .fetch_all("crm.Customer", &["-nk".to_string()])
            .unwrap();
        assert_eq!(descending[0].value_of("nk"), Value::Text("B".to_string()));
    }

    #[test]
    fn fetch_where_filters_and_orders() {
        let store = store();
        let c1 = customer(&store, "C1");
        customer(&store, "C2");
        let mut values = BTreeMap::new();
        values.insert("nk".to_string(), Value::Text("O1".to_string()));
        values.insert("customer".to_string(), Value::Int(c1.id as i64));
        store.create("crm.Order", values).unwrap();
        let mut values = BTreeMap::new();
        values.insert("nk".to_string(), Value::Text("O2".to_string()));
        values.insert("customer".to_string(), Value::Int(2));
        store.create("crm.Order", values).unwrap();

        let for_c1 = store
            .fetch_where(
                "crm.Order",
                &[("customer".to_string(), Value::Int(c1.id as i64))],
                &[],
            )
            .unwrap();
        assert_eq!(for_c1.len(), 1);
        assert_eq!(for_c1[0].value_of("nk"), Value::Text("O1".to_string()));
    }

    #[test]
    fn unknown_entity_is_an_error() {
        let store = store();
        assert!(matches!(
            store.count("missing.Entity"),
            Err(TabletopError::UnknownEntity { .. })
        ));
    }
}
