use std::{
    io::{ErrorKind, Read},
    sync::Arc,
};

use tracing::{debug, trace};
use trackwire_error::{TrackwireResult, WireError};

use super::codec::{
    decode_index, split_state_byte, FieldIndex, IndexFlags, RelationBitmap, END_OF_STREAM,
    ENTITY_TYPE_FLAG,
};
use crate::{
    codec::{
        value::decode::{read_byte_array, read_utf8},
        varint::read_varint_u32,
        read_value, Value, ValueContext,
    },
    schema::{EntityType, FieldDescriptor, RecordState, RelationDescriptor, Schema},
};

/// Последовательное чтение записей.
///
/// После `next_entry` вызывающая сторона читает тип и состояние, затем
/// поочерёдно вызывает `read_field` и `read_modified_field`, пока оба не
/// вернут `None`, и наконец `read_relation` до `None`.
pub trait EntryReader {
    /// Переходит к следующей записи. `false`: поток закончился.
    fn next_entry(&mut self) -> TrackwireResult<bool>;

    fn read_type(
        &mut self,
        schema: &dyn Schema,
    ) -> TrackwireResult<Arc<EntityType>>;

    fn read_state(&mut self) -> TrackwireResult<RecordState>;

    fn read_field(&mut self) -> TrackwireResult<Option<(Arc<FieldDescriptor>, Value)>>;

    fn read_modified_field(&mut self) -> TrackwireResult<Option<(Arc<FieldDescriptor>, Value)>>;

    fn read_relation(&mut self) -> TrackwireResult<Option<Arc<RelationDescriptor>>>;
}

/// Индекс, прочитанный из потока, но ещё не принятый ни одной секцией.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct PendingIndex(Option<FieldIndex>);

impl PendingIndex {
    fn peek(&self) -> Option<FieldIndex> {
        self.0
    }

    fn take(&mut self) -> Option<FieldIndex> {
        self.0.take()
    }

    fn set(
        &mut self,
        index: FieldIndex,
    ) {
        self.0 = Some(index);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Cursor {
    /// Поток индексов полей.
    Fields,
    /// Маска связей прочитана, `next`: номер следующего бита для проверки.
    Relations { bitmap: RelationBitmap, next: usize },
    /// Запись дочитана.
    Done,
}

/// Бинарный читатель поверх `Read`.
pub struct BinaryEntryReader<R: Read> {
    source: R,
    ctx: ValueContext,
    state: Option<RecordState>,
    type_name: Option<String>,
    current: Option<Arc<EntityType>>,
    pending: PendingIndex,
    cursor: Cursor,
    finished: bool,
    entries: u64,
}

impl<R: Read> BinaryEntryReader<R> {
    pub fn new(
        source: R,
        ctx: ValueContext,
    ) -> Self {
        Self {
            source,
            ctx,
            state: None,
            type_name: None,
            current: None,
            pending: PendingIndex::default(),
            cursor: Cursor::Done,
            finished: false,
            entries: 0,
        }
    }

    pub fn entries_read(&self) -> u64 {
        self.entries
    }

    pub fn into_inner(self) -> R {
        self.source
    }

    /// Байт состояния или `None` на чистом конце потока.
    fn read_state_byte(&mut self) -> TrackwireResult<Option<u8>> {
        let mut byte = [0u8; 1];
        loop {
            match self.source.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Тип текущей записи; тип, не разрешённый через `read_type`, считается
    /// неустановленным.
    fn entity(
        &self,
        operation: &str,
    ) -> TrackwireResult<Arc<EntityType>> {
        match (&self.current, &self.type_name) {
            (Some(entity), Some(name)) if entity.name() == name => Ok(entity.clone()),
            _ => Err(WireError::missing_type(operation).into()),
        }
    }

    fn ensure_in_entry(
        &self,
        operation: &str,
    ) -> TrackwireResult<()> {
        if self.state.is_none() {
            return Err(WireError::protocol(format!("{operation} outside of an entry")).into());
        }
        Ok(())
    }

    fn peek_index(&mut self) -> TrackwireResult<FieldIndex> {
        if let Some(index) = self.pending.peek() {
            return Ok(index);
        }
        let index = decode_index(read_varint_u32(&mut self.source)?)?;
        self.pending.set(index);
        Ok(index)
    }

    /// Общая часть `read_field` / `read_modified_field`: принимает индекс,
    /// только если он относится к запрошенной секции.
    fn read_section_field(
        &mut self,
        modified: bool,
        operation: &str,
    ) -> TrackwireResult<Option<(Arc<FieldDescriptor>, Value)>> {
        self.ensure_in_entry(operation)?;
        if self.cursor != Cursor::Fields {
            return Ok(None);
        }
        let entity = self.entity(operation)?;

        let (ordinal, flags) = match self.peek_index()? {
            FieldIndex::Field { ordinal, flags }
                if flags.contains(IndexFlags::MODIFIED) == modified =>
            {
                (ordinal, flags)
            }
            _ => return Ok(None),
        };
        self.pending.take();

        let field = entity
            .field(ordinal)
            .cloned()
            .ok_or_else(|| WireError::UnknownField {
                entity_type: entity.name().to_owned(),
                field: format!("#{ordinal}"),
            })?;

        let value = if flags.contains(IndexFlags::DEFAULT_VALUE) {
            field.value_type.default_value(self.ctx.registry())?
        } else {
            read_value(&mut self.source, field.value_type.wire_type(), &self.ctx)?
        };

        trace!(
            ordinal,
            field = %field.name,
            modified,
            elided = flags.contains(IndexFlags::DEFAULT_VALUE),
            "field decoded"
        );
        Ok(Some((field, value)))
    }

    /// Переводит курсор от полей к связям или к концу записи. Вызывается,
    /// когда в ожидании маркер.
    fn leave_fields(
        &mut self,
        entity: &EntityType,
    ) -> TrackwireResult<()> {
        match self.pending.take() {
            Some(FieldIndex::End) => {
                self.cursor = Cursor::Done;
                Ok(())
            }
            Some(FieldIndex::Navigation) => {
                let bytes = read_byte_array(
                    &mut self.source,
                    self.ctx.limits().max_bitmap_bytes,
                    "relation bitmap",
                )?
                .ok_or_else(|| WireError::protocol("null relation bitmap"))?;
                let bitmap = RelationBitmap::from_bytes(bytes);
                if let Some(out_of_range) = bitmap.next_set(entity.relations().len()) {
                    return Err(WireError::UnknownRelation {
                        entity_type: entity.name().to_owned(),
                        relation: format!("#{out_of_range}"),
                    }
                    .into());
                }
                self.cursor = Cursor::Relations { bitmap, next: 0 };
                Ok(())
            }
            other => {
                if let Some(index) = other {
                    self.pending.set(index);
                }
                Err(WireError::protocol("field index pending while reading relations").into())
            }
        }
    }

    /// Дочитывает остаток текущей записи, которую вызывающая сторона не
    /// прочитала до конца.
    /// Значения полей пропускаются чтением, поэтому для них нужен
    /// разрешённый тип; маркеры пропускаются без него.
    fn drain_entry(&mut self) -> TrackwireResult<()> {
        while self.cursor == Cursor::Fields {
            let index = self.peek_index()?;
            match index {
                FieldIndex::Field { .. } => {
                    self.read_section_field(index.is_modified(), "next_entry")?;
                }
                FieldIndex::End => {
                    self.pending.take();
                    self.cursor = Cursor::Done;
                }
                FieldIndex::Navigation => {
                    self.pending.take();
                    read_byte_array(
                        &mut self.source,
                        self.ctx.limits().max_bitmap_bytes,
                        "relation bitmap",
                    )?;
                    self.cursor = Cursor::Done;
                }
            }
        }
        Ok(())
    }
}

impl<R: Read> EntryReader for BinaryEntryReader<R> {
    fn next_entry(&mut self) -> TrackwireResult<bool> {
        if self.finished {
            return Ok(false);
        }
        if self.state.is_some() {
            self.drain_entry()?;
        }
        self.state = None;
        self.pending = PendingIndex::default();
        self.cursor = Cursor::Done;

        let byte = match self.read_state_byte()? {
            None | Some(END_OF_STREAM) => {
                self.finished = true;
                debug!(entries = self.entries, "end of stream reached");
                return Ok(false);
            }
            Some(byte) => byte,
        };

        let (state, with_type) = split_state_byte(byte)?;
        if with_type {
            let name = read_utf8(&mut self.source, self.ctx.limits())?;
            self.type_name = Some(name);
        }

        self.state = Some(state);
        self.cursor = Cursor::Fields;
        self.entries += 1;

        debug!(
            entity_type = self.type_name.as_deref().unwrap_or("<none>"),
            state = %state,
            type_tag = byte & ENTITY_TYPE_FLAG != 0,
            "entry header decoded"
        );
        Ok(true)
    }

    fn read_type(
        &mut self,
        schema: &dyn Schema,
    ) -> TrackwireResult<Arc<EntityType>> {
        self.ensure_in_entry("read_type")?;
        let name = self
            .type_name
            .as_deref()
            .ok_or_else(|| WireError::missing_type("read_type"))?;

        if let Some(current) = &self.current {
            if current.name() == name {
                return Ok(current.clone());
            }
        }

        let entity = schema
            .entity_type(name)
            .ok_or_else(|| WireError::UnknownEntityType {
                name: name.to_owned(),
            })?;
        self.current = Some(entity.clone());
        Ok(entity)
    }

    fn read_state(&mut self) -> TrackwireResult<RecordState> {
        self.state
            .ok_or_else(|| WireError::protocol("read_state outside of an entry").into())
    }

    fn read_field(&mut self) -> TrackwireResult<Option<(Arc<FieldDescriptor>, Value)>> {
        self.read_section_field(false, "read_field")
    }

    fn read_modified_field(&mut self) -> TrackwireResult<Option<(Arc<FieldDescriptor>, Value)>> {
        self.read_section_field(true, "read_modified_field")
    }

    fn read_relation(&mut self) -> TrackwireResult<Option<Arc<RelationDescriptor>>> {
        self.ensure_in_entry("read_relation")?;
        let entity = self.entity("read_relation")?;

        if self.cursor == Cursor::Fields {
            match self.peek_index()? {
                FieldIndex::Field { .. } => {
                    return Err(
                        WireError::protocol("field index pending while reading relations").into(),
                    )
                }
                FieldIndex::End | FieldIndex::Navigation => self.leave_fields(&entity)?,
            }
        }

        let Cursor::Relations { bitmap, next } = &mut self.cursor else {
            return Ok(None);
        };
        match bitmap.next_set(*next) {
            Some(ordinal) => {
                *next = ordinal + 1;
                let relation = entity.relation(ordinal).cloned().ok_or_else(|| {
                    WireError::UnknownRelation {
                        entity_type: entity.name().to_owned(),
                        relation: format!("#{ordinal}"),
                    }
                })?;
                trace!(ordinal, relation = %relation.name, "relation decoded");
                Ok(Some(relation))
            }
            None => {
                self.cursor = Cursor::Done;
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use trackwire_error::StatusCode;

    use super::*;
    use crate::codec::ValueType;

    fn schema() -> HashMap<String, Arc<EntityType>> {
        let item = EntityType::builder("Item")
            .key("Id", ValueType::I32)
            .field("Price", ValueType::I32)
            .field("Title", ValueType::String)
            .relation("Owner")
            .relation("Tags")
            .build();
        HashMap::from([("Item".to_owned(), Arc::new(item))])
    }

    fn reader(bytes: Vec<u8>) -> BinaryEntryReader<std::io::Cursor<Vec<u8>>> {
        BinaryEntryReader::new(std::io::Cursor::new(bytes), ValueContext::default())
    }

    fn header() -> Vec<u8> {
        let mut bytes = vec![0x84, 4];
        bytes.extend_from_slice(b"Item");
        bytes
    }

    #[test]
    fn test_empty_stream_variants() {
        assert!(!reader(vec![]).next_entry().unwrap());
        let mut r = reader(vec![0xFF, 0x01]);
        assert!(!r.next_entry().unwrap());
        assert!(!r.next_entry().unwrap());
    }

    #[test]
    fn test_demultiplexes_sections() {
        let schema = schema();
        // Id=5 (full), Price=9 (modified), Title default (full), END.
        let mut bytes = header();
        bytes.extend_from_slice(&[4, 5, 10, 9, 13, 0, 0xFF]);
        let mut r = reader(bytes);

        assert!(r.next_entry().unwrap());
        r.read_type(&schema).unwrap();
        assert_eq!(r.read_state().unwrap(), RecordState::Added);

        let (f, v) = r.read_field().unwrap().unwrap();
        assert_eq!((f.name.as_str(), v), ("Id", Value::I32(5)));
        assert!(r.read_field().unwrap().is_none());

        let (f, v) = r.read_modified_field().unwrap().unwrap();
        assert_eq!((f.name.as_str(), v), ("Price", Value::I32(9)));
        assert!(r.read_modified_field().unwrap().is_none());

        let (f, v) = r.read_field().unwrap().unwrap();
        assert_eq!((f.name.as_str(), v), ("Title", Value::Null));
        assert!(r.read_field().unwrap().is_none());
        assert!(r.read_modified_field().unwrap().is_none());
        assert!(r.read_relation().unwrap().is_none());

        assert!(!r.next_entry().unwrap());
    }

    #[test]
    fn test_relation_while_field_pending_is_protocol_error() {
        let schema = schema();
        let mut bytes = header();
        bytes.extend_from_slice(&[4, 5, 0, 0xFF]);
        let mut r = reader(bytes);
        r.next_entry().unwrap();
        r.read_type(&schema).unwrap();
        let err = r.read_relation().unwrap_err();
        assert_eq!(err.status_code(), StatusCode::ProtocolError);

        // индекс не потерян
        assert!(r.read_field().unwrap().is_some());
    }

    #[test]
    fn test_field_without_type_is_missing_context() {
        let mut r = reader(vec![0x04, 4, 5, 0, 0xFF]);
        assert!(r.next_entry().unwrap());
        let err = r.read_field().unwrap_err();
        assert_eq!(err.status_code(), StatusCode::MissingTypeContext);
        let err = r.read_type(&schema()).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::MissingTypeContext);
    }

    #[test]
    fn test_unknown_type_and_field() {
        let mut bytes = vec![0x81, 5];
        bytes.extend_from_slice(b"Ghost");
        bytes.push(0);
        let mut r = reader(bytes);
        r.next_entry().unwrap();
        let err = r.read_type(&schema()).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NotFound);

        let mut bytes = header();
        bytes.extend_from_slice(&[(10 << 2), 1, 0]);
        let mut r = reader(bytes);
        r.next_entry().unwrap();
        r.read_type(&schema()).unwrap();
        let err = r.read_field().unwrap_err();
        assert_eq!(err.status_code(), StatusCode::UnknownField);
    }

    #[test]
    fn test_next_entry_drains_unread_remainder() {
        let schema = schema();
        let mut bytes = header();
        bytes.extend_from_slice(&[4, 5, 10, 9, 1, 2, 0b10]);
        // вторая запись того же типа, без имени
        bytes.extend_from_slice(&[0x01, 0, 0xFF]);
        let mut r = reader(bytes);

        assert!(r.next_entry().unwrap());
        r.read_type(&schema).unwrap();
        assert!(r.next_entry().unwrap());
        assert_eq!(r.read_type(&schema).unwrap().name(), "Item");
        assert_eq!(r.read_state().unwrap(), RecordState::Unchanged);
        assert!(!r.next_entry().unwrap());
        assert_eq!(r.entries_read(), 2);
    }

    #[test]
    fn test_relation_bitmap_out_of_range() {
        let mut bytes = header();
        bytes.extend_from_slice(&[1, 2, 0b1000, 0xFF]);
        let mut r = reader(bytes);
        r.next_entry().unwrap();
        r.read_type(&schema()).unwrap();
        let err = r.read_relation().unwrap_err();
        assert_eq!(err.status_code(), StatusCode::UnknownField);
    }

    #[test]
    fn test_null_bitmap_is_protocol_error() {
        let mut bytes = header();
        bytes.extend_from_slice(&[1, 0, 0xFF]);
        let mut r = reader(bytes);
        r.next_entry().unwrap();
        r.read_type(&schema()).unwrap();
        assert_eq!(
            r.read_relation().unwrap_err().status_code(),
            StatusCode::ProtocolError
        );
    }

    #[test]
    fn test_truncated_entry_is_eof_error() {
        let mut bytes = header();
        bytes.push(4);
        let mut r = reader(bytes);
        r.next_entry().unwrap();
        r.read_type(&schema()).unwrap();
        assert_eq!(
            r.read_field().unwrap_err().status_code(),
            StatusCode::UnexpectedEof
        );
    }
}
