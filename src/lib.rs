//! Компактный бинарный формат для записей с отслеживанием изменений.
//!
//! Поток состоит из записей: байт состояния, имя типа (только при смене
//! типа), поля с номерами и флагами, битовая маска загруженных связей и
//! маркер конца потока.

/// Varint и кодек значений.
pub mod codec;
/// Лимиты декодера и настройки процесса.
pub mod config;
/// Кадрирование записей, писатели и читатели.
pub mod entry;
/// Инициализация `tracing` для бинарников.
pub mod logging;
/// Описание типов сущностей.
pub mod schema;
/// Снимки записей и выбор полей для записи.
pub mod snapshot;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// Value codec.
pub use codec::{
    read_value, write_value, CompositeDescriptor, CompositeKind, CompositeValue, Surrogate,
    SurrogateTable, TypeRegistry, Value, ValueContext, ValueType,
};
/// Settings and limits.
pub use config::{CodecLimits, Settings};
/// Entry stream.
pub use entry::{
    read_all, read_entry, replay, BinaryEntryReader, BinaryEntryWriter, DecodedEntry, EntryData,
    EntryDataReader, EntryDataWriter, EntryReader, EntryWriter,
};
/// Schema contracts and the reference model.
pub use schema::{
    EntityType, FieldDescriptor, FieldSpec, Model, RecordState, RelationDescriptor, Schema,
    ValueGenerated,
};
/// Snapshot driver.
pub use snapshot::{
    write_generated_values, write_snapshot, write_snapshots, RecordSnapshot, SerializationMode,
};
pub use trackwire_error::{StackError, StatusCode, TrackwireResult, WireError};
