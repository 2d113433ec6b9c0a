//! Листовые кодеки: varint и значения. Без состояния сессии.

pub mod value;
pub mod varint;

pub use value::{
    read_value, write_value, CompositeDescriptor, CompositeKind, CompositeValue, Surrogate,
    SurrogateTable, TypeRegistry, Value, ValueContext, ValueType,
};
