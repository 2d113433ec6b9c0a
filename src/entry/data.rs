//! Небинарное представление записей: имена вместо номеров, значения без
//! пропуска умолчаний. Используется для диагностики и как JSON-форма
//! содержимого потока.

use std::{collections::BTreeSet, sync::Arc};

use serde::{Deserialize, Serialize};
use trackwire_error::{TrackwireResult, WireError};

use super::{reader::EntryReader, writer::EntryWriter};
use crate::{
    codec::Value,
    schema::{EntityType, FieldDescriptor, RecordState, RelationDescriptor, Schema},
};

/// Одна запись в памяти.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EntryData {
    pub entity_type: String,
    pub state: RecordState,
    #[serde(default)]
    pub fields: Vec<(String, Value)>,
    #[serde(default)]
    pub modified_fields: Vec<(String, Value)>,
    #[serde(default)]
    pub loaded_relations: BTreeSet<String>,
}

impl EntryData {
    pub fn new(
        entity_type: impl Into<String>,
        state: RecordState,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            state,
            ..Default::default()
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Запись
////////////////////////////////////////////////////////////////////////////////

/// Писатель, накапливающий [`EntryData`].
#[derive(Debug, Default)]
pub struct EntryDataWriter {
    entries: Vec<EntryData>,
    open: Option<EntryData>,
    last_type: Option<String>,
}

impl EntryDataWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[EntryData] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<EntryData> {
        self.entries
    }

    fn open(
        &mut self,
        operation: &str,
    ) -> TrackwireResult<&mut EntryData> {
        self.open
            .as_mut()
            .ok_or_else(|| WireError::protocol(format!("{operation} before start_entry")).into())
    }

    fn typed(
        &mut self,
        operation: &str,
    ) -> TrackwireResult<&mut EntryData> {
        if self.last_type.is_none() {
            return Err(WireError::missing_type(operation).into());
        }
        self.open(operation)
    }
}

impl EntryWriter for EntryDataWriter {
    fn start_entry(&mut self) -> TrackwireResult<()> {
        if self.open.is_some() {
            return Err(WireError::protocol("start_entry inside an open entry").into());
        }
        // тип переходит из предыдущей записи, как в бинарном потоке
        self.open = Some(EntryData {
            entity_type: self.last_type.clone().unwrap_or_default(),
            ..Default::default()
        });
        Ok(())
    }

    fn set_type(
        &mut self,
        entity_type: &Arc<EntityType>,
    ) -> TrackwireResult<()> {
        self.open("set_type")?.entity_type = entity_type.name().to_owned();
        self.last_type = Some(entity_type.name().to_owned());
        Ok(())
    }

    fn set_state(
        &mut self,
        state: RecordState,
    ) -> TrackwireResult<()> {
        self.typed("set_state")?.state = state;
        Ok(())
    }

    fn write_field(
        &mut self,
        field: &FieldDescriptor,
        value: &Value,
    ) -> TrackwireResult<()> {
        self.typed("write_field")?
            .fields
            .push((field.name.clone(), value.clone()));
        Ok(())
    }

    fn write_modified_field(
        &mut self,
        field: &FieldDescriptor,
        value: &Value,
    ) -> TrackwireResult<()> {
        self.typed("write_modified_field")?
            .modified_fields
            .push((field.name.clone(), value.clone()));
        Ok(())
    }

    fn write_relation_loaded(
        &mut self,
        relation: &RelationDescriptor,
    ) -> TrackwireResult<()> {
        self.typed("write_relation_loaded")?
            .loaded_relations
            .insert(relation.name.clone());
        Ok(())
    }

    fn end_entry(&mut self) -> TrackwireResult<()> {
        let entry = self
            .open
            .take()
            .ok_or_else(|| WireError::protocol("end_entry before start_entry"))?;
        self.entries.push(entry);
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Чтение
////////////////////////////////////////////////////////////////////////////////

/// Читатель поверх готового набора [`EntryData`].
#[derive(Debug)]
pub struct EntryDataReader {
    entries: std::vec::IntoIter<EntryData>,
    current: Option<EntryData>,
    entity: Option<Arc<EntityType>>,
    next_field: usize,
    next_modified: usize,
    relations: std::vec::IntoIter<String>,
}

impl EntryDataReader {
    pub fn new(entries: Vec<EntryData>) -> Self {
        Self {
            entries: entries.into_iter(),
            current: None,
            entity: None,
            next_field: 0,
            next_modified: 0,
            relations: Vec::new().into_iter(),
        }
    }

    fn current(
        &self,
        operation: &str,
    ) -> TrackwireResult<&EntryData> {
        self.current
            .as_ref()
            .ok_or_else(|| WireError::protocol(format!("{operation} outside of an entry")).into())
    }

    fn entity(
        &self,
        operation: &str,
    ) -> TrackwireResult<Arc<EntityType>> {
        let entry = self.current(operation)?;
        match &self.entity {
            Some(entity) if entity.name() == entry.entity_type => Ok(entity.clone()),
            _ => Err(WireError::missing_type(operation).into()),
        }
    }

    fn resolve_field(
        entity: &EntityType,
        name: &str,
    ) -> TrackwireResult<Arc<FieldDescriptor>> {
        entity.field_by_name(name).cloned().ok_or_else(|| {
            WireError::UnknownField {
                entity_type: entity.name().to_owned(),
                field: name.to_owned(),
            }
            .into()
        })
    }
}

impl EntryReader for EntryDataReader {
    fn next_entry(&mut self) -> TrackwireResult<bool> {
        self.current = self.entries.next();
        self.next_field = 0;
        self.next_modified = 0;
        self.relations = match &self.current {
            Some(entry) => entry
                .loaded_relations
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .into_iter(),
            None => Vec::new().into_iter(),
        };
        Ok(self.current.is_some())
    }

    fn read_type(
        &mut self,
        schema: &dyn Schema,
    ) -> TrackwireResult<Arc<EntityType>> {
        let name = &self.current("read_type")?.entity_type;
        let entity = schema
            .entity_type(name)
            .ok_or_else(|| WireError::UnknownEntityType { name: name.clone() })?;
        self.entity = Some(entity.clone());
        Ok(entity)
    }

    fn read_state(&mut self) -> TrackwireResult<RecordState> {
        Ok(self.current("read_state")?.state)
    }

    fn read_field(&mut self) -> TrackwireResult<Option<(Arc<FieldDescriptor>, Value)>> {
        let entity = self.entity("read_field")?;
        let entry = self.current("read_field")?;
        let Some((name, value)) = entry.fields.get(self.next_field).cloned() else {
            return Ok(None);
        };
        let field = Self::resolve_field(&entity, &name)?;
        self.next_field += 1;
        Ok(Some((field, value)))
    }

    fn read_modified_field(&mut self) -> TrackwireResult<Option<(Arc<FieldDescriptor>, Value)>> {
        let entity = self.entity("read_modified_field")?;
        let entry = self.current("read_modified_field")?;
        let Some((name, value)) = entry.modified_fields.get(self.next_modified).cloned() else {
            return Ok(None);
        };
        let field = Self::resolve_field(&entity, &name)?;
        self.next_modified += 1;
        Ok(Some((field, value)))
    }

    fn read_relation(&mut self) -> TrackwireResult<Option<Arc<RelationDescriptor>>> {
        let entity = self.entity("read_relation")?;
        let Some(name) = self.relations.next() else {
            return Ok(None);
        };
        entity
            .relation_by_name(&name)
            .cloned()
            .map(Some)
            .ok_or_else(|| {
                WireError::UnknownRelation {
                    entity_type: entity.name().to_owned(),
                    relation: name,
                }
                .into()
            })
    }
}
