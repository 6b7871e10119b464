//! Runtime values and records.
//!
//! A [`Value`] is the typed form of one cell; a [`Record`] is one stored
//! entity instance. Reference fields are persisted as identifiers
//! ([`Value::Id`]) and resolved into [`Value::Ref`] by the resolution
//! engine.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A resolved pointer to one entity instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity: String,
    pub id: u64,
}

impl EntityRef {
    pub fn new(entity: &str, id: u64) -> Self {
        Self {
            entity: entity.to_string(),
            id,
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} id={}>", self.entity, self.id)
    }
}

/// One typed cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    Json(serde_json::Value),
    /// Raw stored identifier of a reference field.
    Id(u64),
    /// A resolved one-cardinality reference.
    Ref(EntityRef),
    /// A resolved many-cardinality reference set, in table order.
    RefSet(Vec<EntityRef>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Canonical string form, the inverse of the coercer for scalar
    /// kinds. `Null` renders as the empty cell; empty text renders as the
    /// `""` sentinel so the round trip through the coercer holds.
    pub fn render(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Text(s) if s.is_empty() => "\"\"".to_string(),
            Self::Text(s) => s.clone(),
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
            Self::DateTime(dt) => dt.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            Self::Json(v) => v.to_string(),
            Self::Id(id) => id.to_string(),
            Self::Ref(r) => r.id.to_string(),
            Self::RefSet(refs) => {
                let ids: Vec<String> = refs.iter().map(|r| r.id.to_string()).collect();
                format!("[{}]", ids.join(", "))
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// One stored entity instance: its type, identifier, and field values.
///
/// Reference fields hold `Value::Id` (or `Value::RefSet` ids for the
/// many case); `value_of` exposes the primary identifier under the `id`
/// name so field paths can address it uniformly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub entity: String,
    pub id: u64,
    pub fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(entity: &str, id: u64, fields: BTreeMap<String, Value>) -> Self {
        Self {
            entity: entity.to_string(),
            id,
            fields,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Field value by name, treating `id` as a synthetic integer field
    /// and absent fields as `Null`.
    pub fn value_of(&self, field: &str) -> Value {
        if field == "id" {
            return Value::Int(self.id as i64);
        }
        self.fields.get(field).cloned().unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn null_renders_as_empty_cell() {
        assert_eq!(Value::Null.render(), "");
    }

    #[test]
    fn empty_text_renders_as_sentinel() {
        assert_eq!(Value::Text(String::new()).render(), "\"\"");
        assert_eq!(Value::Text("plain".into()).render(), "plain");
    }

    #[test]
    fn datetime_renders_rfc3339() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 30, 12, 30, 0).unwrap();
        assert_eq!(Value::DateTime(dt).render(), "2024-01-30T12:30:00Z");
    }

    #[test]
    fn record_exposes_id_as_field() {
        let record = Record::new("poll.Question", 7, BTreeMap::new());
        assert_eq!(record.value_of("id"), Value::Int(7));
        assert_eq!(record.value_of("missing"), Value::Null);
    }
}
