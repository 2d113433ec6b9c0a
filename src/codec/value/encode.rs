//! Запись значений в поток.
//!
//! | Тип | Формат |
//! |---|---|
//! | `bool`, `i8`, `u8` | 1 байт |
//! | `i16`, `u16`, `f32`, `f64` | little-endian фиксированной ширины |
//! | `i32`, `u32`, `i64`, `u64` | varint без zig-zag |
//! | `decimal` | 16 байт: lo, mid, hi, flags |
//! | `char` | UTF-8 |
//! | `string` | флаг присутствия, varint длины в байтах, UTF-8 |
//! | массив | varint `len + 1`, `0`: `null` |
//! | `Nullable` | флаг присутствия, затем значение |
//! | класс | флаг присутствия, затем суррогат или поля по раскладке |
//! | структура | суррогат или поля по раскладке |

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};
use rust_decimal::Decimal;
use trackwire_error::{TrackwireResult, WireError};

use super::{
    registry::CompositeKind,
    types::{Value, ValueType},
    ValueContext,
};
use crate::codec::varint::{
    write_varint_i32, write_varint_i64, write_varint_u32, write_varint_u64,
};

/// Записывает `value` как значение типа `ty`.
pub fn write_value<W: Write>(
    w: &mut W,
    ty: &ValueType,
    value: &Value,
    ctx: &ValueContext,
) -> TrackwireResult<()> {
    encode(w, ty, value, ctx, 0)
}

pub(crate) fn write_bool(
    w: &mut dyn Write,
    value: bool,
) -> TrackwireResult<()> {
    w.write_u8(u8::from(value))?;
    Ok(())
}

/// Длина-префикс (varint u32) и байты. Используется и для строк, и для имени
/// типа в заголовке записи.
pub(crate) fn write_len_prefixed(
    w: &mut dyn Write,
    what: &str,
    bytes: &[u8],
) -> TrackwireResult<()> {
    let len = u32::try_from(bytes.len())
        .map_err(|_| WireError::size_limit(what, bytes.len() as u64, u64::from(u32::MAX)))?;
    write_varint_u32(w, len)?;
    w.write_all(bytes)?;
    Ok(())
}

/// Байтовый массив по правилу массивов: `len + 1`, затем байты.
pub(crate) fn write_byte_array(
    w: &mut dyn Write,
    bytes: &[u8],
) -> TrackwireResult<()> {
    let len = u32::try_from(bytes.len())
        .ok()
        .and_then(|n| n.checked_add(1))
        .ok_or_else(|| WireError::size_limit("array", bytes.len() as u64, u64::from(u32::MAX - 1)))?;
    write_varint_u32(w, len)?;
    w.write_all(bytes)?;
    Ok(())
}

pub(crate) fn write_decimal(
    w: &mut dyn Write,
    value: &Decimal,
) -> TrackwireResult<()> {
    // serialize(): flags, lo, mid, hi. На проводе flags идут последними.
    let bytes = value.serialize();
    w.write_all(&bytes[4..16])?;
    w.write_all(&bytes[0..4])?;
    Ok(())
}

fn encode(
    w: &mut dyn Write,
    ty: &ValueType,
    value: &Value,
    ctx: &ValueContext,
    depth: usize,
) -> TrackwireResult<()> {
    ctx.limits().check_depth(depth)?;

    match (ty, value) {
        (ValueType::Enum { name, repr }, _) => {
            if !repr.is_integer() {
                return Err(
                    WireError::construction(name, "enum underlying type must be an integer").into(),
                );
            }
            encode(w, repr, value, ctx, depth)
        }

        (ValueType::Bool, Value::Bool(v)) => write_bool(w, *v),
        (ValueType::I8, Value::I8(v)) => Ok(w.write_i8(*v)?),
        (ValueType::U8, Value::U8(v)) => Ok(w.write_u8(*v)?),
        (ValueType::I16, Value::I16(v)) => Ok(w.write_i16::<LittleEndian>(*v)?),
        (ValueType::U16, Value::U16(v)) => Ok(w.write_u16::<LittleEndian>(*v)?),
        (ValueType::I32, Value::I32(v)) => write_varint_i32(w, *v).map(drop),
        (ValueType::U32, Value::U32(v)) => write_varint_u32(w, *v).map(drop),
        (ValueType::I64, Value::I64(v)) => write_varint_i64(w, *v).map(drop),
        (ValueType::U64, Value::U64(v)) => write_varint_u64(w, *v).map(drop),
        (ValueType::F32, Value::F32(v)) => Ok(w.write_f32::<LittleEndian>(*v)?),
        (ValueType::F64, Value::F64(v)) => Ok(w.write_f64::<LittleEndian>(*v)?),
        (ValueType::Decimal, Value::Decimal(v)) => write_decimal(w, v),
        (ValueType::Char, Value::Char(c)) => {
            let mut buf = [0u8; 4];
            w.write_all(c.encode_utf8(&mut buf).as_bytes())?;
            Ok(())
        }

        (ValueType::String, Value::Null) => write_bool(w, false),
        (ValueType::String, Value::Str(s)) => {
            write_bool(w, true)?;
            write_len_prefixed(w, "string", s.as_bytes())
        }

        (ValueType::Array(_), Value::Null) => write_varint_u32(w, 0).map(drop),
        (ValueType::Array(element), Value::Array(items)) => {
            let len = u32::try_from(items.len())
                .ok()
                .and_then(|n| n.checked_add(1))
                .ok_or_else(|| {
                    WireError::size_limit("array", items.len() as u64, u64::from(u32::MAX - 1))
                })?;
            write_varint_u32(w, len)?;
            for item in items {
                encode(w, element, item, ctx, depth + 1)?;
            }
            Ok(())
        }

        (ValueType::Nullable(_), Value::Null) => write_bool(w, false),
        (ValueType::Nullable(inner), _) => {
            write_bool(w, true)?;
            encode(w, inner, value, ctx, depth + 1)
        }

        (ValueType::Composite(name), _) => encode_composite(w, name, value, ctx, depth),

        _ => Err(value.mismatch(ty).into()),
    }
}

fn encode_composite(
    w: &mut dyn Write,
    name: &str,
    value: &Value,
    ctx: &ValueContext,
    depth: usize,
) -> TrackwireResult<()> {
    let descriptor = ctx.registry().get(name)?;

    if descriptor.kind == CompositeKind::Class {
        if value.is_null() {
            return write_bool(w, false);
        }
        write_bool(w, true)?;
    }

    if let Some(surrogate) = ctx.surrogate() {
        if surrogate.try_write(w, name, value)? {
            return Ok(());
        }
    }

    let composite = match value {
        Value::Composite(c) if c.type_name == name => c,
        other => return Err(WireError::mismatch(name, other.kind_name()).into()),
    };

    for member in ctx.registry().layout(name)?.iter() {
        match composite.fields.get(&member.name) {
            Some(field) => encode(w, &member.value_type, field, ctx, depth + 1)?,
            None => {
                let default = member.value_type.default_value(ctx.registry())?;
                encode(w, &member.value_type, &default, ctx, depth + 1)?;
            }
        }
    }
    Ok(())
}
