use std::{collections::BTreeMap, fmt};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use trackwire_error::{TrackwireResult, WireError};

use super::registry::{CompositeKind, TypeRegistry};

/// Объявленный тип значения.
///
/// Определяет, как значение раскладывается на провод. Значение само по себе
/// не несёт тега типа: писатель и читатель должны договориться о типе заранее
/// (через схему сущности или явный вызов).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Decimal,
    Char,
    String,
    Array(Box<ValueType>),
    Nullable(Box<ValueType>),
    /// Перечисление пишется как его целочисленный тип.
    Enum {
        name: String,
        repr: Box<ValueType>,
    },
    /// Составной тип, описанный в [`TypeRegistry`].
    Composite(String),
}

/// Значение, которое кодек умеет писать и читать.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Decimal(Decimal),
    Char(char),
    Str(String),
    Array(Vec<Value>),
    Composite(CompositeValue),
}

/// Экземпляр составного типа: имя типа и значения его полей по имени.
///
/// Отсутствующие поля при записи заменяются значениями по умолчанию.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompositeValue {
    pub type_name: String,
    pub fields: BTreeMap<String, Value>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl ValueType {
    pub fn array(element: ValueType) -> Self {
        Self::Array(Box::new(element))
    }

    pub fn nullable(inner: ValueType) -> Self {
        Self::Nullable(Box::new(inner))
    }

    pub fn enumeration(
        name: impl Into<String>,
        repr: ValueType,
    ) -> Self {
        Self::Enum {
            name: name.into(),
            repr: Box::new(repr),
        }
    }

    pub fn composite(name: impl Into<String>) -> Self {
        Self::Composite(name.into())
    }

    /// Тип, через который значение поля сущности идёт на провод: один слой
    /// `Nullable` снимается, `null` поля всегда совпадает со значением по
    /// умолчанию и на провод не попадает.
    pub fn wire_type(&self) -> &ValueType {
        match self {
            Self::Nullable(inner) => inner,
            other => other,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Self::I8 | Self::U8 | Self::I16 | Self::U16 | Self::I32 | Self::U32 | Self::I64 | Self::U64
        )
    }

    /// Значение по умолчанию для типа.
    ///
    /// Ссылочные типы (строки, массивы, классы, `Nullable`) по умолчанию
    /// `null`; структура по умолчанию: структура из значений по умолчанию её
    /// полей.
    pub fn default_value(
        &self,
        registry: &TypeRegistry,
    ) -> TrackwireResult<Value> {
        let value = match self {
            Self::Bool => Value::Bool(false),
            Self::I8 => Value::I8(0),
            Self::U8 => Value::U8(0),
            Self::I16 => Value::I16(0),
            Self::U16 => Value::U16(0),
            Self::I32 => Value::I32(0),
            Self::U32 => Value::U32(0),
            Self::I64 => Value::I64(0),
            Self::U64 => Value::U64(0),
            Self::F32 => Value::F32(0.0),
            Self::F64 => Value::F64(0.0),
            Self::Decimal => Value::Decimal(Decimal::ZERO),
            Self::Char => Value::Char('\0'),
            Self::String | Self::Array(_) | Self::Nullable(_) => Value::Null,
            Self::Enum { repr, .. } => repr.default_value(registry)?,
            Self::Composite(name) => {
                let descriptor = registry.get(name)?;
                match descriptor.kind {
                    CompositeKind::Class => Value::Null,
                    CompositeKind::Struct => {
                        let mut composite = CompositeValue::new(name.clone());
                        for member in registry.layout(name)?.iter() {
                            composite
                                .fields
                                .insert(member.name.clone(), member.value_type.default_value(registry)?);
                        }
                        Value::Composite(composite)
                    }
                }
            }
        };
        Ok(value)
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Короткое имя формы значения для сообщений об ошибках.
    pub fn kind_name(&self) -> String {
        match self {
            Self::Null => "null".into(),
            Self::Bool(_) => "bool".into(),
            Self::I8(_) => "i8".into(),
            Self::U8(_) => "u8".into(),
            Self::I16(_) => "i16".into(),
            Self::U16(_) => "u16".into(),
            Self::I32(_) => "i32".into(),
            Self::U32(_) => "u32".into(),
            Self::I64(_) => "i64".into(),
            Self::U64(_) => "u64".into(),
            Self::F32(_) => "f32".into(),
            Self::F64(_) => "f64".into(),
            Self::Decimal(_) => "decimal".into(),
            Self::Char(_) => "char".into(),
            Self::Str(_) => "string".into(),
            Self::Array(_) => "array".into(),
            Self::Composite(c) => c.type_name.clone(),
        }
    }

    /// Строгое сравнение: числа с плавающей точкой сравниваются побитно,
    /// поэтому `-0.0` не равно `0.0`, а `NaN` равно самому себе.
    pub fn is_identical(
        &self,
        other: &Value,
    ) -> bool {
        match (self, other) {
            (Self::F32(a), Self::F32(b)) => a.to_bits() == b.to_bits(),
            (Self::F64(a), Self::F64(b)) => a.to_bits() == b.to_bits(),
            (Self::Array(a), Self::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.is_identical(y))
            }
            (Self::Composite(a), Self::Composite(b)) => {
                a.type_name == b.type_name
                    && a.fields.len() == b.fields.len()
                    && a.fields
                        .iter()
                        .zip(&b.fields)
                        .all(|((ka, va), (kb, vb))| ka == kb && va.is_identical(vb))
            }
            _ => self == other,
        }
    }

    pub(crate) fn mismatch(
        &self,
        expected: &ValueType,
    ) -> WireError {
        WireError::mismatch(expected.to_string(), self.kind_name())
    }
}

impl CompositeValue {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with(
        mut self,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn get(
        &self,
        name: &str,
    ) -> Option<&Value> {
        self.fields.get(name)
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl fmt::Display for ValueType {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Self::Bool => f.write_str("bool"),
            Self::I8 => f.write_str("i8"),
            Self::U8 => f.write_str("u8"),
            Self::I16 => f.write_str("i16"),
            Self::U16 => f.write_str("u16"),
            Self::I32 => f.write_str("i32"),
            Self::U32 => f.write_str("u32"),
            Self::I64 => f.write_str("i64"),
            Self::U64 => f.write_str("u64"),
            Self::F32 => f.write_str("f32"),
            Self::F64 => f.write_str("f64"),
            Self::Decimal => f.write_str("decimal"),
            Self::Char => f.write_str("char"),
            Self::String => f.write_str("string"),
            Self::Array(inner) => write!(f, "[{inner}]"),
            Self::Nullable(inner) => write!(f, "{inner}?"),
            Self::Enum { name, .. } => f.write_str(name),
            Self::Composite(name) => f.write_str(name),
        }
    }
}

macro_rules! impl_from_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from_scalar! {
    bool => Bool,
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    Decimal => Decimal,
    char => Char,
    String => Str,
    Vec<Value> => Array,
    CompositeValue => Composite,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::value::registry::CompositeDescriptor;

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        registry
            .register(
                CompositeDescriptor::structure("Point")
                    .field("X", ValueType::I32)
                    .field("Label", ValueType::String),
            )
            .unwrap();
        registry
            .register(CompositeDescriptor::class("Node").field("Next", ValueType::composite("Node")))
            .unwrap();
        registry
    }

    #[test]
    fn test_scalar_defaults() {
        let registry = TypeRegistry::new();
        assert_eq!(ValueType::I32.default_value(&registry).unwrap(), Value::I32(0));
        assert_eq!(ValueType::String.default_value(&registry).unwrap(), Value::Null);
        assert_eq!(
            ValueType::enumeration("Color", ValueType::U8)
                .default_value(&registry)
                .unwrap(),
            Value::U8(0)
        );
        assert_eq!(
            ValueType::nullable(ValueType::I64)
                .default_value(&registry)
                .unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_struct_default_is_member_defaults() {
        let registry = registry();
        let expected = CompositeValue::new("Point")
            .with("X", 0i32)
            .with("Label", Value::Null);
        assert_eq!(
            ValueType::composite("Point")
                .default_value(&registry)
                .unwrap(),
            Value::Composite(expected)
        );
        assert_eq!(
            ValueType::composite("Node").default_value(&registry).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_wire_type_strips_one_nullable() {
        let ty = ValueType::nullable(ValueType::nullable(ValueType::I32));
        assert_eq!(ty.wire_type(), &ValueType::nullable(ValueType::I32));
        assert_eq!(ValueType::I32.wire_type(), &ValueType::I32);
    }

    #[test]
    fn test_identical_distinguishes_signed_zero() {
        assert!(Value::F64(0.0) == Value::F64(-0.0));
        assert!(!Value::F64(0.0).is_identical(&Value::F64(-0.0)));
        assert!(Value::F32(f32::NAN).is_identical(&Value::F32(f32::NAN)));
    }

    #[test]
    fn test_display() {
        assert_eq!(ValueType::array(ValueType::nullable(ValueType::I32)).to_string(), "[i32?]");
        assert_eq!(ValueType::composite("Money").to_string(), "Money");
    }

    #[test]
    fn test_from_option() {
        assert_eq!(Value::from(Some(5u16)), Value::U16(5));
        assert_eq!(Value::from(None::<String>), Value::Null);
    }
}
