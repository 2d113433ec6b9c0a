//! Подмена кодирования для отдельных составных типов.
//!
//! Суррогат опрашивается перед структурной раскладкой. Если он сообщает,
//! что обработал тип, кодек дальше в значение не заходит.

use std::{
    collections::HashMap,
    fmt,
    io::{Read, Write},
    sync::Arc,
};

use trackwire_error::{TrackwireResult, WireError};

use super::types::{CompositeValue, Value};

pub trait Surrogate: Send + Sync {
    /// Пишет значение, если тип обслуживается. `Ok(false)`: не обслуживается,
    /// кодек переходит к структурной раскладке.
    fn try_write(
        &self,
        w: &mut dyn Write,
        type_name: &str,
        value: &Value,
    ) -> TrackwireResult<bool>;

    /// Читает значение, если тип обслуживается.
    fn try_read(
        &self,
        r: &mut dyn Read,
        type_name: &str,
    ) -> TrackwireResult<Option<Value>>;
}

pub type ReadConverter = Arc<dyn Fn(&mut dyn Read) -> TrackwireResult<CompositeValue> + Send + Sync>;
pub type WriteConverter =
    Arc<dyn Fn(&mut dyn Write, &CompositeValue) -> TrackwireResult<()> + Send + Sync>;

#[derive(Clone)]
struct Converter {
    read: ReadConverter,
    write: WriteConverter,
}

/// Таблица конвертеров по имени типа.
#[derive(Clone, Default)]
pub struct SurrogateTable {
    converters: HashMap<String, Converter>,
}

impl SurrogateTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_converter<R, W>(
        &mut self,
        type_name: impl Into<String>,
        read: R,
        write: W,
    ) where
        R: Fn(&mut dyn Read) -> TrackwireResult<CompositeValue> + Send + Sync + 'static,
        W: Fn(&mut dyn Write, &CompositeValue) -> TrackwireResult<()> + Send + Sync + 'static,
    {
        self.converters.insert(
            type_name.into(),
            Converter {
                read: Arc::new(read),
                write: Arc::new(write),
            },
        );
    }

    pub fn remove_converter(
        &mut self,
        type_name: &str,
    ) -> bool {
        self.converters.remove(type_name).is_some()
    }

    pub fn handles(
        &self,
        type_name: &str,
    ) -> bool {
        self.converters.contains_key(type_name)
    }

    pub fn len(&self) -> usize {
        self.converters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }
}

impl Surrogate for SurrogateTable {
    fn try_write(
        &self,
        w: &mut dyn Write,
        type_name: &str,
        value: &Value,
    ) -> TrackwireResult<bool> {
        let Some(converter) = self.converters.get(type_name) else {
            return Ok(false);
        };
        match value {
            Value::Composite(composite) if composite.type_name == type_name => {
                (converter.write)(w, composite)?;
                Ok(true)
            }
            other => Err(WireError::mismatch(type_name, other.kind_name()).into()),
        }
    }

    fn try_read(
        &self,
        r: &mut dyn Read,
        type_name: &str,
    ) -> TrackwireResult<Option<Value>> {
        let Some(converter) = self.converters.get(type_name) else {
            return Ok(None);
        };
        let composite = (converter.read)(r)?;
        if composite.type_name != type_name {
            return Err(WireError::mismatch(type_name, composite.type_name).into());
        }
        Ok(Some(Value::Composite(composite)))
    }
}

impl fmt::Debug for SurrogateTable {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let mut names: Vec<&str> = self.converters.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("SurrogateTable")
            .field("converters", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
    use trackwire_error::StatusCode;

    use super::*;

    fn celsius_table() -> SurrogateTable {
        let mut table = SurrogateTable::new();
        table.add_converter(
            "Celsius",
            |r| {
                let tenths = r.read_i16::<LittleEndian>()?;
                Ok(CompositeValue::new("Celsius").with("Tenths", tenths))
            },
            |w, v| {
                let tenths = match v.get("Tenths") {
                    Some(Value::I16(t)) => *t,
                    _ => 0,
                };
                w.write_i16::<LittleEndian>(tenths)?;
                Ok(())
            },
        );
        table
    }

    #[test]
    fn test_unhandled_type_falls_through() {
        let table = celsius_table();
        let mut buf = Vec::new();
        let handled = table
            .try_write(&mut buf, "Kelvin", &Value::Null)
            .unwrap();
        assert!(!handled);
        assert!(buf.is_empty());
        assert!(table
            .try_read(&mut Cursor::new(&buf), "Kelvin")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_handled_roundtrip() {
        let table = celsius_table();
        let value = Value::Composite(CompositeValue::new("Celsius").with("Tenths", -15i16));

        let mut buf = Vec::new();
        assert!(table.try_write(&mut buf, "Celsius", &value).unwrap());
        assert_eq!(buf, vec![0xF1, 0xFF]);

        let back = table
            .try_read(&mut Cursor::new(&buf), "Celsius")
            .unwrap();
        assert_eq!(back, Some(value));
    }

    #[test]
    fn test_runtime_type_mismatch() {
        let table = celsius_table();
        let wrong = Value::Composite(CompositeValue::new("Kelvin"));
        let err = table
            .try_write(&mut Vec::new(), "Celsius", &wrong)
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::TypeMismatch);

        let err = table
            .try_write(&mut Vec::new(), "Celsius", &Value::I32(1))
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::TypeMismatch);
    }

    #[test]
    fn test_reader_returning_other_type_is_mismatch() {
        let mut table = SurrogateTable::new();
        table.add_converter(
            "A",
            |_| Ok(CompositeValue::new("B")),
            |_, _| Ok(()),
        );
        let err = table
            .try_read(&mut Cursor::new(Vec::<u8>::new()), "A")
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::TypeMismatch);
    }

    #[test]
    fn test_remove_converter() {
        let mut table = celsius_table();
        assert!(table.handles("Celsius"));
        assert!(table.remove_converter("Celsius"));
        assert!(!table.remove_converter("Celsius"));
        assert!(table.is_empty());
    }
}
