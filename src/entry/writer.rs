use std::{io::Write, sync::Arc};

use byteorder::WriteBytesExt;
use tracing::{debug, trace, warn};
use trackwire_error::{TrackwireResult, WireError};

use super::codec::{
    encode_index, state_byte, IndexFlags, RelationBitmap, END_MARKER, END_OF_STREAM,
    NAVIGATION_MARKER,
};
use crate::{
    codec::{
        value::encode::{write_byte_array, write_len_prefixed},
        varint::write_varint_u32,
        write_value, Value, ValueContext,
    },
    schema::{EntityType, FieldDescriptor, RecordState, RelationDescriptor},
};

/// Последовательная запись записей.
///
/// Порядок вызовов на одну запись: `start_entry`, `set_type`, `set_state`,
/// затем любое число `write_field` / `write_modified_field` /
/// `write_relation_loaded` и `end_entry`.
pub trait EntryWriter {
    fn start_entry(&mut self) -> TrackwireResult<()>;

    fn set_type(
        &mut self,
        entity_type: &Arc<EntityType>,
    ) -> TrackwireResult<()>;

    fn set_state(
        &mut self,
        state: RecordState,
    ) -> TrackwireResult<()>;

    fn write_field(
        &mut self,
        field: &FieldDescriptor,
        value: &Value,
    ) -> TrackwireResult<()>;

    fn write_modified_field(
        &mut self,
        field: &FieldDescriptor,
        value: &Value,
    ) -> TrackwireResult<()>;

    fn write_relation_loaded(
        &mut self,
        relation: &RelationDescriptor,
    ) -> TrackwireResult<()>;

    fn end_entry(&mut self) -> TrackwireResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    BeforeEntry,
    Started,
    Body,
}

/// Бинарный писатель поверх `Write`.
///
/// Имя типа пишется только когда тип отличается от типа предыдущей записи.
/// Маркер конца потока пишет [`finish`](Self::finish); если писатель
/// уничтожен без `finish` между записями, маркер пишется из `Drop` без
/// возможности вернуть ошибку. Внутри незавершённой записи маркер не пишется.
pub struct BinaryEntryWriter<W: Write> {
    sink: Option<W>,
    ctx: ValueContext,
    phase: Phase,
    current: Option<Arc<EntityType>>,
    last_type: Option<String>,
    encode_type: bool,
    bitmap: Option<RelationBitmap>,
    entries: u64,
}

impl<W: Write> BinaryEntryWriter<W> {
    pub fn new(
        sink: W,
        ctx: ValueContext,
    ) -> Self {
        Self {
            sink: Some(sink),
            ctx,
            phase: Phase::BeforeEntry,
            current: None,
            last_type: None,
            encode_type: false,
            bitmap: None,
            entries: 0,
        }
    }

    /// Кол-во завершённых записей.
    pub fn entries_written(&self) -> u64 {
        self.entries
    }

    pub fn get_ref(&self) -> Option<&W> {
        self.sink.as_ref()
    }

    /// Пишет маркер конца потока, сбрасывает буферы и возвращает приёмник.
    pub fn finish(mut self) -> TrackwireResult<W> {
        if self.phase != Phase::BeforeEntry {
            return Err(WireError::protocol("finish called inside an unfinished entry").into());
        }
        let mut sink = self
            .sink
            .take()
            .ok_or_else(|| WireError::protocol("writer already finished"))?;
        sink.write_u8(END_OF_STREAM)?;
        sink.flush()?;
        debug!(entries = self.entries, "end of stream written");
        Ok(sink)
    }

    fn sink(&mut self) -> TrackwireResult<&mut W> {
        self.sink
            .as_mut()
            .ok_or_else(|| WireError::protocol("writer already finished").into())
    }

    fn body_entity(
        &self,
        operation: &str,
    ) -> TrackwireResult<Arc<EntityType>> {
        let entity = self
            .current
            .clone()
            .ok_or_else(|| WireError::missing_type(operation))?;
        if self.phase != Phase::Body {
            return Err(WireError::protocol(format!("{operation} before set_state")).into());
        }
        Ok(entity)
    }

    fn write_field_with(
        &mut self,
        field: &FieldDescriptor,
        value: &Value,
        section: IndexFlags,
        operation: &str,
    ) -> TrackwireResult<()> {
        let entity = self.body_entity(operation)?;
        match entity.field(field.index) {
            Some(known) if known.name == field.name => {}
            _ => {
                return Err(WireError::UnknownField {
                    entity_type: entity.name().to_owned(),
                    field: field.name.clone(),
                }
                .into())
            }
        }

        let default = field.value_type.default_value(self.ctx.registry())?;
        let is_default = value.is_identical(&default);
        let mut flags = section;
        if is_default {
            flags |= IndexFlags::DEFAULT_VALUE;
        }

        let index = encode_index(field.index, flags)?;
        // Значение кодируется целиком до записи индекса: при ошибке в
        // приёмник не попадает ни байта.
        let mut scratch = Vec::new();
        write_varint_u32(&mut scratch, index)?;
        if !is_default {
            write_value(&mut scratch, field.value_type.wire_type(), value, &self.ctx)?;
        }
        self.sink()?.write_all(&scratch)?;

        trace!(
            ordinal = field.index,
            field = %field.name,
            modified = section.contains(IndexFlags::MODIFIED),
            elided = is_default,
            "field framed"
        );
        Ok(())
    }
}

impl<W: Write> EntryWriter for BinaryEntryWriter<W> {
    fn start_entry(&mut self) -> TrackwireResult<()> {
        if self.phase != Phase::BeforeEntry {
            return Err(WireError::protocol("start_entry inside an unfinished entry").into());
        }
        self.sink()?;
        self.phase = Phase::Started;
        self.encode_type = false;
        self.bitmap = None;
        Ok(())
    }

    fn set_type(
        &mut self,
        entity_type: &Arc<EntityType>,
    ) -> TrackwireResult<()> {
        if self.phase != Phase::Started {
            return Err(WireError::protocol("set_type outside of entry header").into());
        }
        self.encode_type = self.last_type.as_deref() != Some(entity_type.name());
        self.current = Some(entity_type.clone());
        Ok(())
    }

    fn set_state(
        &mut self,
        state: RecordState,
    ) -> TrackwireResult<()> {
        let entity = self
            .current
            .clone()
            .ok_or_else(|| WireError::missing_type("set_state"))?;
        if self.phase != Phase::Started {
            return Err(WireError::protocol("set_state outside of entry header").into());
        }

        let with_type = self.encode_type;
        let sink = self.sink()?;
        sink.write_u8(state_byte(state, with_type))?;
        if with_type {
            write_len_prefixed(sink, "type name", entity.name().as_bytes())?;
            self.last_type = Some(entity.name().to_owned());
            self.encode_type = false;
        }
        self.phase = Phase::Body;

        debug!(
            entity_type = entity.name(),
            state = %state,
            type_tag = with_type,
            "entry started"
        );
        Ok(())
    }

    fn write_field(
        &mut self,
        field: &FieldDescriptor,
        value: &Value,
    ) -> TrackwireResult<()> {
        self.write_field_with(field, value, IndexFlags::empty(), "write_field")
    }

    fn write_modified_field(
        &mut self,
        field: &FieldDescriptor,
        value: &Value,
    ) -> TrackwireResult<()> {
        self.write_field_with(field, value, IndexFlags::MODIFIED, "write_modified_field")
    }

    fn write_relation_loaded(
        &mut self,
        relation: &RelationDescriptor,
    ) -> TrackwireResult<()> {
        let entity = self.body_entity("write_relation_loaded")?;
        let unknown = || WireError::UnknownRelation {
            entity_type: entity.name().to_owned(),
            relation: relation.name.clone(),
        };
        let known = entity
            .relation(relation.index)
            .is_some_and(|r| r.name == relation.name);
        if !known {
            return Err(unknown().into());
        }
        let bitmap = self
            .bitmap
            .get_or_insert_with(|| RelationBitmap::with_relations(entity.relations().len()));
        if !bitmap.set(relation.index) {
            return Err(unknown().into());
        }
        trace!(ordinal = relation.index, relation = %relation.name, "relation marked loaded");
        Ok(())
    }

    fn end_entry(&mut self) -> TrackwireResult<()> {
        if self.phase != Phase::Body {
            return Err(WireError::protocol("end_entry before set_state").into());
        }
        let bitmap = self.bitmap.take();
        let sink = self.sink()?;
        match bitmap {
            Some(bitmap) => {
                write_varint_u32(sink, NAVIGATION_MARKER)?;
                write_byte_array(sink, bitmap.as_bytes())?;
            }
            None => {
                write_varint_u32(sink, END_MARKER)?;
            }
        }
        self.phase = Phase::BeforeEntry;
        self.entries += 1;
        Ok(())
    }
}

impl<W: Write> Drop for BinaryEntryWriter<W> {
    fn drop(&mut self) {
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        if self.phase != Phase::BeforeEntry {
            // Маркер внутри записи выглядел бы как штатный конец потока.
            warn!(
                entries = self.entries,
                "writer dropped inside an unfinished entry, end-of-stream marker not written"
            );
            return;
        }
        if let Err(e) = sink.write_all(&[END_OF_STREAM]).and_then(|_| sink.flush()) {
            warn!(error = %e, "failed to write end-of-stream marker on drop");
        }
    }
}
