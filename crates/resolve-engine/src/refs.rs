//! Batch reference resolution.
//!
//! One pass over the table resolves every cell that names a related
//! entity — by natural key, by numeric identifier, or through a generic
//! (polymorphic) reference — into a [`ReferenceCache`] keyed by
//! `(heading, raw cell)`. Lookups are deduplicated per field, so N rows
//! naming K distinct keys cost K lookups, not N.
//!
//! The cache belongs to exactly one table resolution; it is consumed by
//! the materializer and never stored anywhere shared. Entities mutated by
//! a later step can therefore never be served from a stale cache.

use crate::ResolveEngine;
use std::collections::BTreeMap;
use tabletop_core::{
    format_key, parse_key_expr, EntityRef, EntityType, FieldDescriptor, FieldKind, KeyAtom,
    Result, StepTable, TabletopError, Value,
};
use tracing::{debug, instrument};

/// Whether a failed lookup aborts the step (writes) or degrades to
/// `Null` so the mismatch surfaces as a data diff (reads/asserts).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    Strict,
    Lenient,
}

/// A replacement that expands into several physical field assignments.
/// Generic references persist as two columns but are addressed as one
/// logical column; the group carries both plus the resolved instance.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldGroup {
    pub entries: Vec<(String, Value)>,
}

/// One resolved cell.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedRef {
    /// A concrete one-cardinality reference.
    Entity(EntityRef),
    /// A concrete reference set, in cell order.
    Set(Vec<EntityRef>),
    /// A generic reference expanded into its physical fields.
    Group(FieldGroup),
    /// Lenient lookup found nothing; materializes as `Null`.
    Missing,
}

/// Transient `(heading, raw cell)` to resolved-reference map for one
/// table resolution pass.
#[derive(Debug, Default)]
pub struct ReferenceCache {
    entries: BTreeMap<(String, String), ResolvedRef>,
    logical_names: BTreeMap<String, String>,
}

impl ReferenceCache {
    pub fn get(&self, heading: &str, raw: &str) -> Option<&ResolvedRef> {
        self.entries.get(&(heading.to_string(), raw.to_string()))
    }

    /// The logical relation name for an identifier column heading
    /// (`customer_id` resolves records but materializes as `customer`).
    pub fn logical_name(&self, heading: &str) -> Option<&str> {
        self.logical_names.get(heading).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, heading: &str, raw: &str, resolved: ResolvedRef) {
        self.entries
            .insert((heading.to_string(), raw.to_string()), resolved);
    }
}

/// How one heading participates in resolution.
enum HeadingRole<'s> {
    /// Scalar or dotted path: the coercer handles the cells.
    Plain,
    /// One-cardinality reference addressed by natural key or id.
    Single {
        target: &'s EntityType,
    },
    /// `<field>_id` column: numeric identifiers for reference `field`.
    IdAlias {
        field_name: String,
        target: &'s EntityType,
    },
    /// Many-cardinality reference: the cell is a list of keys.
    Many {
        target: &'s EntityType,
    },
    /// Generic reference: type-selector key plus instance key.
    Generic {
        type_field: String,
        id_field: String,
    },
}

impl<'a> ResolveEngine<'a> {
    /// Resolve every reference-bearing cell of `table` into a cache.
    ///
    /// Issues at most one identifier-set fetch per field and one
    /// natural-key lookup per distinct key expression per field.
    #[instrument(skip(self, table), fields(entity = entity, rows = table.len()))]
    pub fn resolve_table_references(
        &self,
        entity: &str,
        table: &StepTable,
        mode: ResolveMode,
    ) -> Result<ReferenceCache> {
        let entity_type = self.schema().entity(entity)?;
        let mut cache = ReferenceCache::default();

        for heading in table.headings() {
            match self.classify(entity_type, heading)? {
                HeadingRole::Plain => {}
                HeadingRole::Single { target } => {
                    self.resolve_single(heading, target, table, mode, &mut cache)?;
                }
                HeadingRole::IdAlias { field_name, target } => {
                    cache
                        .logical_names
                        .insert(heading.to_string(), field_name);
                    self.resolve_id_alias(heading, target, table, mode, &mut cache)?;
                }
                HeadingRole::Many { target } => {
                    self.resolve_many(heading, target, table, mode, &mut cache)?;
                }
                HeadingRole::Generic {
                    type_field,
                    id_field,
                } => {
                    self.resolve_generic(
                        heading,
                        &type_field,
                        &id_field,
                        table,
                        mode,
                        &mut cache,
                    )?;
                }
            }
        }

        debug!(resolved = cache.len(), "reference cache built");
        Ok(cache)
    }

    /// Terminal descriptor for a heading, accepting the synthetic `id`
    /// column, dotted paths, and `<field>_id` identifier aliases.
    pub(crate) fn heading_descriptor(
        &self,
        entity_type: &'a EntityType,
        heading: &str,
    ) -> Result<&'a FieldDescriptor> {
        if heading == "id" {
            return Ok(id_descriptor());
        }
        if let Some(prefix) = heading.strip_suffix(".id") {
            let field = self.schema().resolve_path(entity_type, prefix)?;
            if field.is_reference() {
                return Ok(id_descriptor());
            }
        }
        if heading.contains('.') {
            return self.schema().resolve_path(entity_type, heading);
        }
        if let Some(field) = entity_type.field(heading) {
            return Ok(field);
        }
        if let Some(base) = heading.strip_suffix("_id") {
            if let Some(field) = entity_type.field(base) {
                if field.is_reference() {
                    return Ok(field);
                }
            }
        }
        Err(TabletopError::UnknownField {
            entity: entity_type.name.clone(),
            path: heading.to_string(),
        })
    }

    fn classify(&self, entity_type: &'a EntityType, heading: &str) -> Result<HeadingRole<'a>> {
        if heading == "id" || heading.contains('.') {
            self.heading_descriptor(entity_type, heading)?;
            return Ok(HeadingRole::Plain);
        }
        if let Some(field) = entity_type.field(heading) {
            return Ok(match &field.kind {
                FieldKind::Scalar(_) => HeadingRole::Plain,
                FieldKind::Reference {
                    target,
                    cardinality,
                } => {
                    let target = self.schema().entity(target)?;
                    match cardinality {
                        tabletop_core::Cardinality::One => HeadingRole::Single { target },
                        tabletop_core::Cardinality::Many => HeadingRole::Many { target },
                    }
                }
                FieldKind::GenericReference {
                    type_field,
                    id_field,
                } => HeadingRole::Generic {
                    type_field: type_field.clone(),
                    id_field: id_field.clone(),
                },
            });
        }
        if let Some(base) = heading.strip_suffix("_id") {
            if let Some(field) = entity_type.field(base) {
                if let FieldKind::Reference { target, .. } = &field.kind {
                    return Ok(HeadingRole::IdAlias {
                        field_name: base.to_string(),
                        target: self.schema().entity(target)?,
                    });
                }
            }
        }
        Err(TabletopError::UnknownField {
            entity: entity_type.name.clone(),
            path: heading.to_string(),
        })
    }

    fn resolve_single(
        &self,
        heading: &str,
        target: &EntityType,
        table: &StepTable,
        mode: ResolveMode,
        cache: &mut ReferenceCache,
    ) -> Result<()> {
        let mut by_id: BTreeMap<String, u64> = BTreeMap::new();
        let mut by_key: BTreeMap<String, Vec<KeyAtom>> = BTreeMap::new();

        for row in table.rows() {
            let Some(raw) = row.get(heading) else { continue };
            if raw.is_empty() {
                continue;
            }
            if let Some(id) = parse_identifier(raw) {
                by_id.insert(raw.to_string(), id);
            } else if let Some(atoms) = parse_key_expr(raw) {
                by_key.insert(raw.to_string(), atoms);
            } else {
                return Err(TabletopError::AmbiguousReference {
                    field: heading.to_string(),
                    raw: raw.to_string(),
                });
            }
        }

        self.resolve_ids(heading, target, &by_id, mode, cache)?;

        for (raw, atoms) in by_key {
            let resolved = self.lookup_natural_key(target, &atoms, mode)?;
            cache.insert(heading, &raw, resolved);
        }
        Ok(())
    }

    fn resolve_id_alias(
        &self,
        heading: &str,
        target: &EntityType,
        table: &StepTable,
        mode: ResolveMode,
        cache: &mut ReferenceCache,
    ) -> Result<()> {
        let mut by_id: BTreeMap<String, u64> = BTreeMap::new();
        for row in table.rows() {
            let Some(raw) = row.get(heading) else { continue };
            if raw.is_empty() {
                continue;
            }
            let Some(id) = parse_identifier(raw) else {
                return Err(TabletopError::AmbiguousReference {
                    field: heading.to_string(),
                    raw: raw.to_string(),
                });
            };
            by_id.insert(raw.to_string(), id);
        }
        self.resolve_ids(heading, target, &by_id, mode, cache)
    }

    /// One fetch for all distinct identifiers of one field.
    fn resolve_ids(
        &self,
        heading: &str,
        target: &EntityType,
        by_id: &BTreeMap<String, u64>,
        mode: ResolveMode,
        cache: &mut ReferenceCache,
    ) -> Result<()> {
        if by_id.is_empty() {
            return Ok(());
        }
        let ids: Vec<u64> = by_id.values().copied().collect();
        let found: BTreeMap<u64, EntityRef> = self
            .store()
            .fetch_by_ids(&target.name, &ids)?
            .into_iter()
            .map(|record| (record.id, EntityRef::new(&record.entity, record.id)))
            .collect();
        debug!(field = heading, ids = ids.len(), "identifier batch resolved");

        for (raw, id) in by_id {
            match found.get(id) {
                Some(entity_ref) => {
                    cache.insert(heading, raw, ResolvedRef::Entity(entity_ref.clone()));
                }
                None if mode == ResolveMode::Strict => {
                    return Err(TabletopError::ReferenceNotFound {
                        entity: target.name.clone(),
                        key: id.to_string(),
                    });
                }
                None => cache.insert(heading, raw, ResolvedRef::Missing),
            }
        }
        Ok(())
    }

    fn resolve_many(
        &self,
        heading: &str,
        target: &EntityType,
        table: &StepTable,
        mode: ResolveMode,
        cache: &mut ReferenceCache,
    ) -> Result<()> {
        // Element-level lookups are shared across cells of this field.
        let mut key_results: BTreeMap<String, Option<EntityRef>> = BTreeMap::new();
        let mut id_elements: BTreeMap<u64, Option<EntityRef>> = BTreeMap::new();
        let mut cells: BTreeMap<String, Vec<KeyAtom>> = BTreeMap::new();

        for row in table.rows() {
            let Some(raw) = row.get(heading) else { continue };
            if raw.is_empty() {
                continue;
            }
            let Some(atoms) = parse_key_expr(raw) else {
                return Err(TabletopError::AmbiguousReference {
                    field: heading.to_string(),
                    raw: raw.to_string(),
                });
            };
            for atom in &atoms {
                match atom {
                    KeyAtom::Int(id) if *id >= 0 => {
                        id_elements.insert(*id as u64, None);
                    }
                    KeyAtom::Text(_) | KeyAtom::Seq(_) => {}
                    _ => {
                        return Err(TabletopError::AmbiguousReference {
                            field: heading.to_string(),
                            raw: raw.to_string(),
                        })
                    }
                }
            }
            cells.insert(raw.to_string(), atoms);
        }

        if !id_elements.is_empty() {
            let ids: Vec<u64> = id_elements.keys().copied().collect();
            for record in self.store().fetch_by_ids(&target.name, &ids)? {
                id_elements.insert(record.id, Some(EntityRef::new(&record.entity, record.id)));
            }
        }

        for (raw, atoms) in cells {
            let mut refs = Vec::new();
            for atom in &atoms {
                let element = match atom {
                    KeyAtom::Int(id) => {
                        let resolved = id_elements.get(&(*id as u64)).cloned().flatten();
                        if resolved.is_none() && mode == ResolveMode::Strict {
                            return Err(TabletopError::ReferenceNotFound {
                                entity: target.name.clone(),
                                key: id.to_string(),
                            });
                        }
                        resolved
                    }
                    KeyAtom::Text(_) | KeyAtom::Seq(_) => {
                        let element_key = match atom {
                            KeyAtom::Seq(parts) => parts.clone(),
                            other => vec![other.clone()],
                        };
                        let cache_key = format_key(&element_key);
                        if !key_results.contains_key(&cache_key) {
                            let looked_up =
                                match self.lookup_natural_key(target, &element_key, mode)? {
                                    ResolvedRef::Entity(entity_ref) => Some(entity_ref),
                                    _ => None,
                                };
                            key_results.insert(cache_key.clone(), looked_up);
                        }
                        key_results.get(&cache_key).cloned().flatten()
                    }
                    _ => None,
                };
                if let Some(entity_ref) = element {
                    refs.push(entity_ref);
                }
            }
            cache.insert(heading, &raw, ResolvedRef::Set(refs));
        }
        Ok(())
    }

    fn resolve_generic(
        &self,
        heading: &str,
        type_field: &str,
        id_field: &str,
        table: &StepTable,
        mode: ResolveMode,
        cache: &mut ReferenceCache,
    ) -> Result<()> {
        for row in table.rows() {
            let Some(raw) = row.get(heading) else { continue };
            if raw.is_empty() || cache.get(heading, raw).is_some() {
                continue;
            }
            let atoms = parse_key_expr(raw).ok_or_else(|| TabletopError::AmbiguousReference {
                field: heading.to_string(),
                raw: raw.to_string(),
            })?;

            // Element 0 is the nested type key, element 1 the instance key.
            let (type_key, instance_key) = match atoms.as_slice() {
                [KeyAtom::Seq(type_parts), instance] => {
                    let instance_key = match instance {
                        KeyAtom::Seq(parts) => parts.clone(),
                        scalar => vec![scalar.clone()],
                    };
                    (type_parts.clone(), instance_key)
                }
                _ => {
                    return Err(TabletopError::AmbiguousReference {
                        field: heading.to_string(),
                        raw: raw.to_string(),
                    })
                }
            };

            let type_parts: Vec<String> = type_key
                .iter()
                .map(|atom| match atom {
                    KeyAtom::Text(s) => Ok(s.clone()),
                    other => Err(TabletopError::AmbiguousReference {
                        field: heading.to_string(),
                        raw: other.to_string(),
                    }),
                })
                .collect::<Result<_>>()?;

            let target = match self.schema().entity_by_type_key(&type_parts) {
                Ok(target) => target,
                Err(_) if mode == ResolveMode::Lenient => {
                    cache.insert(
                        heading,
                        raw,
                        ResolvedRef::Group(null_group(heading, type_field, id_field)),
                    );
                    continue;
                }
                Err(_) => {
                    return Err(TabletopError::ReferenceNotFound {
                        entity: type_parts.join("."),
                        key: raw.to_string(),
                    })
                }
            };

            match self.lookup_natural_key(target, &instance_key, mode)? {
                ResolvedRef::Entity(entity_ref) => {
                    let group = FieldGroup {
                        entries: vec![
                            (type_field.to_string(), Value::Text(target.name.clone())),
                            (id_field.to_string(), Value::Id(entity_ref.id)),
                            (heading.to_string(), Value::Ref(entity_ref)),
                        ],
                    };
                    cache.insert(heading, raw, ResolvedRef::Group(group));
                }
                _ => cache.insert(
                    heading,
                    raw,
                    ResolvedRef::Group(null_group(heading, type_field, id_field)),
                ),
            }
        }
        Ok(())
    }

    /// One natural-key lookup, honoring the resolve mode on not-found.
    fn lookup_natural_key(
        &self,
        target: &EntityType,
        key: &[KeyAtom],
        mode: ResolveMode,
    ) -> Result<ResolvedRef> {
        match self.store().fetch_by_natural_key(&target.name, key)? {
            Some(record) => Ok(ResolvedRef::Entity(EntityRef::new(&record.entity, record.id))),
            None if mode == ResolveMode::Strict => Err(TabletopError::ReferenceNotFound {
                entity: target.name.clone(),
                key: format_key(key),
            }),
            None => Ok(ResolvedRef::Missing),
        }
    }
}

fn null_group(heading: &str, type_field: &str, id_field: &str) -> FieldGroup {
    FieldGroup {
        entries: vec![
            (type_field.to_string(), Value::Null),
            (id_field.to_string(), Value::Null),
            (heading.to_string(), Value::Null),
        ],
    }
}

/// Descriptor for the synthetic `id` column every entity carries.
fn id_descriptor() -> &'static FieldDescriptor {
    use std::sync::OnceLock;
    static ID: OnceLock<FieldDescriptor> = OnceLock::new();
    ID.get_or_init(|| FieldDescriptor::scalar("id", tabletop_core::ScalarKind::Integer))
}

/// A bare numeric cell is a literal identifier, never a natural key.
fn parse_identifier(raw: &str) -> Option<u64> {
    if raw.chars().all(|c| c.is_ascii_digit()) && !raw.is_empty() {
        raw.parse().ok()
    } else {
        None
    }
}
