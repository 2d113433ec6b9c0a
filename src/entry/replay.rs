//! Прогон записей через читатель: разбор целой записи и перекодирование
//! из одного формата в другой.

use std::sync::Arc;

use tracing::debug;
use trackwire_error::TrackwireResult;

use super::{data::EntryData, reader::EntryReader, writer::EntryWriter};
use crate::{
    codec::Value,
    schema::{EntityType, FieldDescriptor, RecordState, RelationDescriptor, Schema},
};

/// Полностью прочитанная запись.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEntry {
    pub entity_type: Arc<EntityType>,
    pub state: RecordState,
    pub fields: Vec<(Arc<FieldDescriptor>, Value)>,
    pub modified_fields: Vec<(Arc<FieldDescriptor>, Value)>,
    pub relations: Vec<Arc<RelationDescriptor>>,
}

impl DecodedEntry {
    /// Записывает запись в `writer`, сохраняя порядок внутри секций.
    pub fn write_to(
        &self,
        writer: &mut dyn EntryWriter,
    ) -> TrackwireResult<()> {
        writer.start_entry()?;
        writer.set_type(&self.entity_type)?;
        writer.set_state(self.state)?;
        for (field, value) in &self.fields {
            writer.write_field(field, value)?;
        }
        for (field, value) in &self.modified_fields {
            writer.write_modified_field(field, value)?;
        }
        for relation in &self.relations {
            writer.write_relation_loaded(relation)?;
        }
        writer.end_entry()
    }

    pub fn to_data(&self) -> EntryData {
        let named = |fields: &[(Arc<FieldDescriptor>, Value)]| {
            fields
                .iter()
                .map(|(f, v)| (f.name.clone(), v.clone()))
                .collect()
        };
        EntryData {
            entity_type: self.entity_type.name().to_owned(),
            state: self.state,
            fields: named(&self.fields),
            modified_fields: named(&self.modified_fields),
            loaded_relations: self.relations.iter().map(|r| r.name.clone()).collect(),
        }
    }
}

/// Читает следующую запись целиком. `None`: поток закончился.
///
/// Поля двух секций в потоке перемежаются; чтение чередует `read_field` и
/// `read_modified_field`, пока ни один из них не продвинется.
pub fn read_entry(
    reader: &mut dyn EntryReader,
    schema: &dyn Schema,
) -> TrackwireResult<Option<DecodedEntry>> {
    if !reader.next_entry()? {
        return Ok(None);
    }
    let entity_type = reader.read_type(schema)?;
    let state = reader.read_state()?;

    let mut fields = Vec::new();
    let mut modified_fields = Vec::new();
    loop {
        let mut progressed = false;
        while let Some(pair) = reader.read_field()? {
            fields.push(pair);
            progressed = true;
        }
        while let Some(pair) = reader.read_modified_field()? {
            modified_fields.push(pair);
            progressed = true;
        }
        if !progressed {
            break;
        }
    }

    let mut relations = Vec::new();
    while let Some(relation) = reader.read_relation()? {
        relations.push(relation);
    }

    Ok(Some(DecodedEntry {
        entity_type,
        state,
        fields,
        modified_fields,
        relations,
    }))
}

pub fn read_all(
    reader: &mut dyn EntryReader,
    schema: &dyn Schema,
) -> TrackwireResult<Vec<DecodedEntry>> {
    let mut entries = Vec::new();
    while let Some(entry) = read_entry(reader, schema)? {
        entries.push(entry);
    }
    Ok(entries)
}

/// Переписывает все записи из `reader` в `writer`. Возвращает их число.
pub fn replay(
    reader: &mut dyn EntryReader,
    writer: &mut dyn EntryWriter,
    schema: &dyn Schema,
) -> TrackwireResult<u64> {
    let mut count = 0;
    while let Some(entry) = read_entry(reader, schema)? {
        entry.write_to(writer)?;
        count += 1;
    }
    debug!(entries = count, "replay finished");
    Ok(count)
}
