//! Record serialization back into the string-table shape.
//!
//! The inverse of materialization: walk stored records along requested
//! field paths and produce the same strings a step author would have
//! written, so expected and actual tables can be diffed cell by cell
//! and dumped readably on failure.

use crate::coerce::coerce;
use crate::refs::{ReferenceCache, ResolveMode, ResolvedRef};
use crate::ResolveEngine;
use std::collections::BTreeMap;
use tabletop_core::{
    format_key, EntityType, FieldKind, KeyAtom, Record, Result, StepTable, TabletopError, Value,
};
use tracing::instrument;

impl ResolveEngine<'_> {
    /// Render `records` under the requested field paths, one
    /// heading-to-string map per record.
    #[instrument(skip(self, records, field_paths), fields(entity = entity, count = records.len()))]
    pub fn render_records(
        &self,
        entity: &str,
        records: &[Record],
        field_paths: &[String],
        mode: ResolveMode,
    ) -> Result<Vec<BTreeMap<String, String>>> {
        let entity_type = self.schema().entity(entity)?;
        records
            .iter()
            .map(|record| {
                field_paths
                    .iter()
                    .map(|path| {
                        self.render_field_path(entity_type, record, path, mode)
                            .map(|rendered| (path.clone(), rendered))
                    })
                    .collect()
            })
            .collect()
    }

    /// Render one dotted field path of one record to its canonical
    /// string form. Missing relations render as the empty cell unless
    /// `mode` is strict.
    pub fn render_field_path(
        &self,
        entity_type: &EntityType,
        record: &Record,
        path: &str,
        mode: ResolveMode,
    ) -> Result<String> {
        let mut current_type = entity_type;
        let mut current = record.clone();
        let mut segments = path.split('.').peekable();

        while let Some(segment) = segments.next() {
            if segments.peek().is_none() {
                return self.render_terminal(current_type, &current, segment, mode);
            }
            // Interior segment: follow a one-cardinality reference.
            let field =
                current_type
                    .field(segment)
                    .ok_or_else(|| TabletopError::UnknownField {
                        entity: current_type.name.clone(),
                        path: path.to_string(),
                    })?;
            let FieldKind::Reference { target, .. } = &field.kind else {
                return Err(TabletopError::UnknownField {
                    entity: current_type.name.clone(),
                    path: path.to_string(),
                });
            };
            let target_type = self.schema().entity(target)?;
            match reference_id(&current.value_of(segment)) {
                Some(id) => match self.load(target_type, id)? {
                    Some(next) => {
                        current_type = target_type;
                        current = next;
                    }
                    None if mode == ResolveMode::Strict => {
                        return Err(TabletopError::ReferenceNotFound {
                            entity: target_type.name.clone(),
                            key: id.to_string(),
                        });
                    }
                    None => return Ok(String::new()),
                },
                None if mode == ResolveMode::Strict => {
                    return Err(TabletopError::ReferenceNotFound {
                        entity: target_type.name.clone(),
                        key: format!("{}.{}", current.entity, segment),
                    });
                }
                None => return Ok(String::new()),
            }
        }
        unreachable!("split always yields at least one segment")
    }

    fn render_terminal(
        &self,
        entity_type: &EntityType,
        record: &Record,
        segment: &str,
        mode: ResolveMode,
    ) -> Result<String> {
        if segment == "id" {
            return Ok(record.id.to_string());
        }

        let Some(field) = entity_type.field(segment) else {
            // `<field>_id` renders the stored identifier itself.
            if let Some(base) = segment.strip_suffix("_id") {
                if entity_type.field(base).is_some_and(|f| f.is_reference()) {
                    return Ok(match reference_id(&record.value_of(base)) {
                        Some(id) => id.to_string(),
                        None => String::new(),
                    });
                }
            }
            return Err(TabletopError::UnknownField {
                entity: entity_type.name.clone(),
                path: segment.to_string(),
            });
        };

        match &field.kind {
            FieldKind::Scalar(_) => Ok(record.value_of(segment).render()),
            FieldKind::Reference { target, .. } => {
                let target_type = self.schema().entity(target)?;
                match record.value_of(segment) {
                    Value::RefSet(refs) => {
                        let mut atoms = Vec::with_capacity(refs.len());
                        for entity_ref in refs {
                            atoms.push(self.ref_key_for(target_type, entity_ref.id, mode)?.into_atom());
                        }
                        Ok(format_key(&atoms))
                    }
                    other => match reference_id(&other) {
                        Some(id) => self.render_reference(target_type, id, mode),
                        None => Ok(String::new()),
                    },
                }
            }
            FieldKind::GenericReference {
                type_field,
                id_field,
            } => {
                let type_name = match record.value_of(type_field) {
                    Value::Text(name) => name,
                    _ => return Ok(String::new()),
                };
                let Some(id) = reference_id(&record.value_of(id_field)) else {
                    return Ok(String::new());
                };
                let target_type = self.schema().entity(&type_name)?;
                let type_key: Vec<KeyAtom> = target_type
                    .type_key()
                    .into_iter()
                    .map(KeyAtom::Text)
                    .collect();
                let instance = self.ref_key_for(target_type, id, mode)?.into_instance_key();
                Ok(format_key(&[KeyAtom::Seq(type_key), instance]))
            }
        }
    }

    /// Bracketed natural-key form of one referenced record, falling back
    /// to the bare identifier when the target carries no usable key.
    fn render_reference(
        &self,
        target_type: &EntityType,
        id: u64,
        mode: ResolveMode,
    ) -> Result<String> {
        Ok(match self.ref_key_for(target_type, id, mode)? {
            RefKey::Natural(parts) => format_key(&parts),
            RefKey::Bare(id) => id.to_string(),
        })
    }

    /// The key identifying one record: its natural key, or its bare id
    /// when the record is gone or the key holds a null.
    fn ref_key_for(&self, target_type: &EntityType, id: u64, mode: ResolveMode) -> Result<RefKey> {
        let Some(record) = self.load(target_type, id)? else {
            if mode == ResolveMode::Strict {
                return Err(TabletopError::ReferenceNotFound {
                    entity: target_type.name.clone(),
                    key: id.to_string(),
                });
            }
            return Ok(RefKey::Bare(id));
        };
        let Some(nk_fields) = target_type.natural_key_fields() else {
            return Ok(RefKey::Bare(id));
        };
        let mut atoms = Vec::with_capacity(nk_fields.len());
        for field in nk_fields {
            match value_atom(&record.value_of(field)) {
                Some(atom) => atoms.push(atom),
                None => return Ok(RefKey::Bare(id)),
            }
        }
        Ok(RefKey::Natural(atoms))
    }

    fn load(&self, entity_type: &EntityType, id: u64) -> Result<Option<Record>> {
        Ok(self
            .store()
            .fetch_by_ids(&entity_type.name, &[id])?
            .into_iter()
            .next())
    }

    /// Render the expected side of a comparison: each table row as the
    /// heading-to-string map its cells normalize to, using the same
    /// reference cache and coercer as materialization.
    pub(crate) fn render_expected(
        &self,
        entity: &str,
        table: &StepTable,
        cache: &ReferenceCache,
        mode: ResolveMode,
    ) -> Result<Vec<BTreeMap<String, String>>> {
        let entity_type = self.schema().entity(entity)?;
        let mut rows = Vec::with_capacity(table.len());
        for row in table.rows() {
            let mut out = BTreeMap::new();
            for heading in table.headings() {
                let raw = row.get(heading).unwrap_or("");
                let rendered = match cache.get(heading, raw) {
                    Some(ResolvedRef::Entity(entity_ref)) => {
                        if cache.logical_name(heading).is_some() {
                            entity_ref.id.to_string()
                        } else {
                            let target = self.schema().entity(&entity_ref.entity)?;
                            self.render_reference(target, entity_ref.id, mode)?
                        }
                    }
                    Some(ResolvedRef::Set(refs)) => {
                        let mut atoms = Vec::with_capacity(refs.len());
                        for entity_ref in refs {
                            let target = self.schema().entity(&entity_ref.entity)?;
                            atoms.push(self.ref_key_for(target, entity_ref.id, mode)?.into_atom());
                        }
                        format_key(&atoms)
                    }
                    Some(ResolvedRef::Group(group)) => match group
                        .entries
                        .iter()
                        .find(|(name, _)| name == heading)
                        .map(|(_, value)| value)
                    {
                        Some(Value::Ref(entity_ref)) => {
                            let target = self.schema().entity(&entity_ref.entity)?;
                            let type_key: Vec<KeyAtom> =
                                target.type_key().into_iter().map(KeyAtom::Text).collect();
                            let instance =
                                self.ref_key_for(target, entity_ref.id, mode)?.into_instance_key();
                            format_key(&[KeyAtom::Seq(type_key), instance])
                        }
                        _ => String::new(),
                    },
                    Some(ResolvedRef::Missing) => String::new(),
                    None => {
                        let descriptor = self.heading_descriptor(entity_type, heading)?;
                        coerce(descriptor, raw)?.render()
                    }
                };
                out.insert(heading.clone(), rendered);
            }
            rows.push(out);
        }
        Ok(rows)
    }
}

/// A record's identity for rendering: natural-key parts, or the bare id
/// when no usable key exists.
enum RefKey {
    Natural(Vec<KeyAtom>),
    Bare(u64),
}

impl RefKey {
    /// One element inside a key list: composite keys nest, single-part
    /// keys stay scalar, bare ids become integer elements.
    fn into_atom(self) -> KeyAtom {
        match self {
            Self::Natural(mut parts) if parts.len() == 1 => parts.remove(0),
            Self::Natural(parts) => KeyAtom::Seq(parts),
            Self::Bare(id) => KeyAtom::Int(id as i64),
        }
    }

    /// The instance element of a generic-reference key, always a nested
    /// sequence.
    fn into_instance_key(self) -> KeyAtom {
        match self {
            Self::Natural(parts) => KeyAtom::Seq(parts),
            Self::Bare(id) => KeyAtom::Seq(vec![KeyAtom::Int(id as i64)]),
        }
    }
}

fn reference_id(value: &Value) -> Option<u64> {
    match value {
        Value::Id(id) => Some(*id),
        Value::Ref(entity_ref) => Some(entity_ref.id),
        Value::Int(id) if *id >= 0 => Some(*id as u64),
        _ => None,
    }
}

fn value_atom(value: &Value) -> Option<KeyAtom> {
    match value {
        Value::Text(s) => Some(KeyAtom::Text(s.clone())),
        Value::Int(i) => Some(KeyAtom::Int(*i)),
        Value::Bool(b) => Some(KeyAtom::Bool(*b)),
        Value::Float(f) => Some(KeyAtom::Float(*f)),
        Value::Date(d) => Some(KeyAtom::Text(d.format("%Y-%m-%d").to_string())),
        _ => None,
    }
}
