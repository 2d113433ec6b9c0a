//! Снимок отслеживаемой записи и выбор того, что из него попадает в поток.
//!
//! Снимок хранит исходные и текущие значения полей, флаги изменения и
//! загруженные связи, всё по номерам из [`EntityType`]. Какие поля писать,
//! решает [`SerializationMode`].

use std::sync::Arc;

use tracing::debug;
use trackwire_error::{bail, StatusCode, TrackwireResult, WireError};

use crate::{
    codec::Value,
    entry::EntryWriter,
    schema::{EntityType, FieldDescriptor, RecordState, ValueGenerated},
};

/// Что писать из снимка.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SerializationMode {
    /// Все поля и загруженные связи.
    #[default]
    Full,
    /// Ключи, маркеры конкурентности и изменённые поля.
    Changes,
    /// Значения, сгенерированные хранилищем при добавлении.
    ValuesGeneratedOnAdd,
    /// Значения, сгенерированные хранилищем при обновлении.
    ValuesGeneratedOnUpdate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordSnapshot {
    entity_type: Arc<EntityType>,
    state: RecordState,
    original_values: Vec<Value>,
    current_values: Vec<Value>,
    modified: Vec<bool>,
    loaded_relations: Vec<bool>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl RecordSnapshot {
    /// Все векторы индексируются номерами полей / связей и должны совпадать
    /// по длине с описанием типа.
    pub fn new(
        entity_type: Arc<EntityType>,
        state: RecordState,
        original_values: Vec<Value>,
        current_values: Vec<Value>,
        modified: Vec<bool>,
        loaded_relations: Vec<bool>,
    ) -> TrackwireResult<Self> {
        let fields = entity_type.fields().len();
        let relations = entity_type.relations().len();
        for (what, len, expected) in [
            ("original values", original_values.len(), fields),
            ("current values", current_values.len(), fields),
            ("modified flags", modified.len(), fields),
            ("loaded relations", loaded_relations.len(), relations),
        ] {
            if len != expected {
                bail!(
                    StatusCode::InvalidArgs,
                    "snapshot of `{}`: {what} has {len} items, expected {expected}",
                    entity_type.name()
                );
            }
        }
        Ok(Self {
            entity_type,
            state,
            original_values,
            current_values,
            modified,
            loaded_relations,
        })
    }

    /// Снимок без изменений: текущие значения совпадают с исходными.
    pub fn unchanged(
        entity_type: Arc<EntityType>,
        values: Vec<Value>,
    ) -> TrackwireResult<Self> {
        let fields = entity_type.fields().len();
        let relations = entity_type.relations().len();
        Self::new(
            entity_type,
            RecordState::Unchanged,
            values.clone(),
            values,
            vec![false; fields],
            vec![false; relations],
        )
    }

    pub fn entity_type(&self) -> &Arc<EntityType> {
        &self.entity_type
    }

    pub fn state(&self) -> RecordState {
        self.state
    }

    pub fn with_state(
        mut self,
        state: RecordState,
    ) -> Self {
        self.state = state;
        self
    }

    pub fn original_value(
        &self,
        ordinal: usize,
    ) -> Option<&Value> {
        self.original_values.get(ordinal)
    }

    pub fn current_value(
        &self,
        ordinal: usize,
    ) -> Option<&Value> {
        self.current_values.get(ordinal)
    }

    pub fn is_modified(
        &self,
        ordinal: usize,
    ) -> bool {
        self.modified.get(ordinal).copied().unwrap_or(false)
    }

    /// Меняет текущее значение поля и помечает его изменённым.
    pub fn set_current(
        &mut self,
        name: &str,
        value: Value,
    ) -> TrackwireResult<()> {
        let ordinal = self.field_ordinal(name)?;
        self.current_values[ordinal] = value;
        self.modified[ordinal] = true;
        Ok(())
    }

    pub fn mark_loaded(
        &mut self,
        relation: &str,
    ) -> TrackwireResult<()> {
        let ordinal = self
            .entity_type
            .relation_by_name(relation)
            .map(|r| r.index)
            .ok_or_else(|| WireError::UnknownRelation {
                entity_type: self.entity_type.name().to_owned(),
                relation: relation.to_owned(),
            })?;
        self.loaded_relations[ordinal] = true;
        Ok(())
    }

    /// Есть ли у записи значения, которые хранилище сгенерирует при
    /// сохранении в её текущем состоянии.
    pub fn has_generated_values(&self) -> bool {
        let flag = match self.state {
            RecordState::Added => ValueGenerated::ON_ADD,
            RecordState::Modified => ValueGenerated::ON_UPDATE,
            _ => return false,
        };
        self.entity_type
            .fields()
            .iter()
            .any(|f| f.value_generated.contains(flag))
    }

    fn field_ordinal(
        &self,
        name: &str,
    ) -> TrackwireResult<usize> {
        self.entity_type
            .field_by_name(name)
            .map(|f| f.index)
            .ok_or_else(|| {
                WireError::UnknownField {
                    entity_type: self.entity_type.name().to_owned(),
                    field: name.to_owned(),
                }
                .into()
            })
    }

    fn writes_all_fields(
        &self,
        mode: SerializationMode,
    ) -> bool {
        (mode == SerializationMode::Full && self.state != RecordState::Deleted)
            || self.state == RecordState::Added
    }

    fn in_modified_section(
        &self,
        field: &FieldDescriptor,
        mode: SerializationMode,
    ) -> bool {
        match mode {
            SerializationMode::ValuesGeneratedOnAdd => {
                field.value_generated.contains(ValueGenerated::ON_ADD)
            }
            SerializationMode::ValuesGeneratedOnUpdate => {
                field.value_generated.contains(ValueGenerated::ON_UPDATE)
            }
            SerializationMode::Full | SerializationMode::Changes => self.is_modified(field.index),
        }
    }
}

/// Пишет одну запись из снимка.
///
/// Основная секция получает исходные значения: все поля, если режим `Full`
/// и запись не удалена, или запись добавлена; иначе только ключи и маркеры
/// конкурентности. Секция изменённых полей получает текущие значения.
/// Связи пишутся только в режиме `Full`.
pub fn write_snapshot(
    writer: &mut dyn EntryWriter,
    snapshot: &RecordSnapshot,
    mode: SerializationMode,
) -> TrackwireResult<()> {
    let entity = &snapshot.entity_type;
    writer.start_entry()?;
    writer.set_type(entity)?;
    writer.set_state(snapshot.state)?;

    let all = snapshot.writes_all_fields(mode);
    for field in entity.fields() {
        if all || field.is_key || field.is_concurrency_token {
            writer.write_field(field, &snapshot.original_values[field.index])?;
        }
    }

    for field in entity.fields() {
        if snapshot.in_modified_section(field, mode) {
            writer.write_modified_field(field, &snapshot.current_values[field.index])?;
        }
    }

    if mode == SerializationMode::Full {
        for relation in entity.relations() {
            if snapshot.loaded_relations[relation.index] {
                writer.write_relation_loaded(relation)?;
            }
        }
    }

    writer.end_entry()
}

/// Пишет набор снимков. В режиме `Changes` записи без ожидающих изменений
/// пропускаются. Возвращает число записанных записей.
pub fn write_snapshots<'a>(
    writer: &mut dyn EntryWriter,
    snapshots: impl IntoIterator<Item = &'a RecordSnapshot>,
    mode: SerializationMode,
) -> TrackwireResult<u64> {
    let mut written = 0;
    for snapshot in snapshots {
        if mode == SerializationMode::Changes && !snapshot.state.is_pending() {
            continue;
        }
        write_snapshot(writer, snapshot, mode)?;
        written += 1;
    }
    debug!(entries = written, ?mode, "snapshots written");
    Ok(written)
}

/// Пишет значения, сгенерированные хранилищем при сохранении записи,
/// которая до сохранения была в состоянии `original_state`.
pub fn write_generated_values(
    writer: &mut dyn EntryWriter,
    snapshot: &RecordSnapshot,
    original_state: RecordState,
) -> TrackwireResult<()> {
    let mode = match original_state {
        RecordState::Added => SerializationMode::ValuesGeneratedOnAdd,
        RecordState::Modified => SerializationMode::ValuesGeneratedOnUpdate,
        other => {
            return Err(WireError::protocol(format!(
                "generated values exist only for added or modified records, got {other}"
            ))
            .into())
        }
    };
    write_snapshot(writer, snapshot, mode)
}
