//! Entity schema: the closed description of what a step table may address.
//!
//! The schema is built once at harness start-up and resolved through
//! [`Schema::resolve_path`]; nothing in the workspace inspects live objects
//! to decide how a field behaves.

use crate::error::{Result, TabletopError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Primitive subtypes a scalar field can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarKind {
    Integer,
    Float,
    Boolean,
    Text,
    Date,
    DateTime,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinality {
    One,
    Many,
}

/// Runtime type shape of one field, aligned with the `Value` variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    Scalar(ScalarKind),
    Reference {
        target: String,
        cardinality: Cardinality,
    },
    /// Polymorphic relation persisted as two physical columns: the
    /// type-selector field (entity-type name, text) and the identifier
    /// field (target id).
    GenericReference {
        type_field: String,
        id_field: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldDescriptor {
    pub fn scalar(name: &str, kind: ScalarKind) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::Scalar(kind),
        }
    }

    pub fn reference(name: &str, target: &str, cardinality: Cardinality) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::Reference {
                target: target.to_string(),
                cardinality,
            },
        }
    }

    pub fn generic_reference(name: &str, type_field: &str, id_field: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: FieldKind::GenericReference {
                type_field: type_field.to_string(),
                id_field: id_field.to_string(),
            },
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self.kind, FieldKind::Reference { .. })
    }
}

/// One named entity type: an ordered field list plus an optional declared
/// natural key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityType {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
    /// Ordered field names forming the natural key. When absent, a field
    /// literally named `nk` serves as a single-part fallback.
    pub natural_key: Option<Vec<String>>,
}

impl EntityType {
    pub fn new(name: &str, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            name: name.to_string(),
            fields,
            natural_key: None,
        }
    }

    pub fn with_natural_key(mut self, fields: &[&str]) -> Self {
        self.natural_key = Some(fields.iter().map(|f| (*f).to_string()).collect());
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The ordered natural-key field names, or `None` when this type has
    /// neither a declared key nor an `nk` field.
    pub fn natural_key_fields(&self) -> Option<Vec<&str>> {
        match &self.natural_key {
            Some(fields) => Some(fields.iter().map(String::as_str).collect()),
            None => self.field("nk").map(|f| vec![f.name.as_str()]),
        }
    }

    pub fn supports_natural_key(&self) -> bool {
        self.natural_key_fields().is_some()
    }

    /// The type key used by generic references: the entity name split on
    /// `.` (`poll.Question` becomes `[poll, Question]`).
    pub fn type_key(&self) -> Vec<String> {
        self.name.split('.').map(str::to_string).collect()
    }
}

/// The full entity-type registry, built once at start-up.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    entities: BTreeMap<String, EntityType>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn entity(&self, name: &str) -> Result<&EntityType> {
        self.entities
            .get(name)
            .ok_or_else(|| TabletopError::UnknownEntity {
                entity: name.to_string(),
            })
    }

    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    /// Look an entity type up by its type key (`["poll", "Question"]`).
    pub fn entity_by_type_key(&self, key: &[String]) -> Result<&EntityType> {
        let name = key.join(".");
        self.entity(&name)
    }

    /// Resolve a dotted field path to its terminal descriptor, traversing
    /// reference fields to arbitrary depth.
    ///
    /// `resolve_path(order, "customer.nk")` follows the `customer`
    /// reference into its target type and returns that type's `nk`
    /// descriptor.
    pub fn resolve_path<'a>(
        &'a self,
        entity: &'a EntityType,
        path: &str,
    ) -> Result<&'a FieldDescriptor> {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };

        let descriptor = entity
            .field(head)
            .ok_or_else(|| TabletopError::UnknownField {
                entity: entity.name.clone(),
                path: path.to_string(),
            })?;

        let Some(rest) = rest else {
            return Ok(descriptor);
        };

        match &descriptor.kind {
            FieldKind::Reference { target, .. } => {
                let target = self.entity(target)?;
                self.resolve_path(target, rest)
            }
            _ => Err(TabletopError::UnknownField {
                entity: entity.name.clone(),
                path: path.to_string(),
            }),
        }
    }
}

#[derive(Debug, Default)]
pub struct SchemaBuilder {
    entities: Vec<EntityType>,
}

impl SchemaBuilder {
    pub fn entity(mut self, entity: EntityType) -> Self {
        self.entities.push(entity);
        self
    }

    /// Validate cross-entity invariants and freeze the registry.
    pub fn build(self) -> Result<Schema> {
        let mut entities = BTreeMap::new();
        for entity in &self.entities {
            let mut seen = std::collections::BTreeSet::new();
            for field in &entity.fields {
                if !seen.insert(field.name.as_str()) {
                    return Err(TabletopError::InvalidSchema {
                        reason: format!(
                            "duplicate field \"{}\" on entity \"{}\"",
                            field.name, entity.name
                        ),
                    });
                }
            }
            if let Some(nk) = &entity.natural_key {
                for part in nk {
                    match entity.field(part).map(|f| &f.kind) {
                        Some(FieldKind::Scalar(_)) => {}
                        _ => {
                            return Err(TabletopError::InvalidSchema {
                                reason: format!(
                                    "natural key part \"{}\" of \"{}\" must be a scalar field",
                                    part, entity.name
                                ),
                            })
                        }
                    }
                }
            }
            if entities
                .insert(entity.name.clone(), entity.clone())
                .is_some()
            {
                return Err(TabletopError::InvalidSchema {
                    reason: format!("duplicate entity type \"{}\"", entity.name),
                });
            }
        }

        let schema = Schema { entities };
        for entity in schema.entities.values() {
            for field in &entity.fields {
                match &field.kind {
                    FieldKind::Reference { target, .. } => {
                        let target = schema.entity(target)?;
                        if !target.supports_natural_key() {
                            return Err(TabletopError::InvalidSchema {
                                reason: format!(
                                    "reference target \"{}\" of \"{}.{}\" has no natural key and no nk field",
                                    target.name, entity.name, field.name
                                ),
                            });
                        }
                    }
                    FieldKind::GenericReference {
                        type_field,
                        id_field,
                    } => {
                        for backing in [type_field, id_field] {
                            if entity.field(backing).is_none() {
                                return Err(TabletopError::InvalidSchema {
                                    reason: format!(
                                        "generic reference \"{}.{}\" names missing backing field \"{}\"",
                                        entity.name, field.name, backing
                                    ),
                                });
                            }
                        }
                    }
                    FieldKind::Scalar(_) => {}
                }
            }
        }
        Ok(schema)
    }
}
