//! Чтение значений из потока. Формат описан в [`super::encode`].

use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};
use rust_decimal::Decimal;
use trackwire_error::{bail, StatusCode, TrackwireResult, WireError};

use super::{
    registry::CompositeKind,
    types::{CompositeValue, Value, ValueType},
    ValueContext,
};
use crate::{
    codec::varint::{read_varint_i32, read_varint_i64, read_varint_u32, read_varint_u64},
    config::CodecLimits,
};

/// Максимальный масштаб `decimal`.
pub const MAX_DECIMAL_SCALE: u8 = 28;

const DECIMAL_SIGN: u8 = 0x80;

/// Читает значение типа `ty`.
pub fn read_value<R: Read>(
    r: &mut R,
    ty: &ValueType,
    ctx: &ValueContext,
) -> TrackwireResult<Value> {
    decode(r, ty, ctx, 0)
}

pub(crate) fn read_bool(r: &mut dyn Read) -> TrackwireResult<bool> {
    Ok(r.read_u8()? != 0)
}

pub(crate) fn read_len_prefixed(
    r: &mut dyn Read,
    limit: usize,
    what: &str,
) -> TrackwireResult<Vec<u8>> {
    let len = read_varint_u32(r)? as usize;
    if len > limit {
        return Err(WireError::size_limit(what, len as u64, limit as u64).into());
    }
    read_exact_len(r, len)
}

/// Читает ровно `len` байт. Буфер растёт по мере чтения, поэтому ложный
/// префикс длины в коротком потоке не выделяет память заранее.
fn read_exact_len(
    r: &mut dyn Read,
    len: usize,
) -> TrackwireResult<Vec<u8>> {
    let mut buf = Vec::with_capacity(len.min(4096));
    Read::take(&mut *r, len as u64).read_to_end(&mut buf)?;
    if buf.len() < len {
        return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
    }
    Ok(buf)
}

pub(crate) fn read_utf8(
    r: &mut dyn Read,
    limits: &CodecLimits,
) -> TrackwireResult<String> {
    let bytes = read_len_prefixed(r, limits.max_string_bytes, "string")?;
    Ok(String::from_utf8(bytes)?)
}

/// Байтовый массив по правилу массивов. `None`: нулевой префикс (`null`).
pub(crate) fn read_byte_array(
    r: &mut dyn Read,
    limit: usize,
    what: &str,
) -> TrackwireResult<Option<Vec<u8>>> {
    let prefix = read_varint_u32(r)? as usize;
    let Some(len) = prefix.checked_sub(1) else {
        return Ok(None);
    };
    if len > limit {
        return Err(WireError::size_limit(what, len as u64, limit as u64).into());
    }
    read_exact_len(r, len).map(Some)
}

pub(crate) fn read_decimal(r: &mut dyn Read) -> TrackwireResult<Decimal> {
    let mut wire = [0u8; 16];
    r.read_exact(&mut wire)?;

    // На проводе lo, mid, hi, flags; Decimal::deserialize ждёт flags первыми.
    let mut bytes = [0u8; 16];
    bytes[0..4].copy_from_slice(&wire[12..16]);
    bytes[4..16].copy_from_slice(&wire[0..12]);

    let scale = bytes[2];
    if bytes[0] != 0 || bytes[1] != 0 || bytes[3] & !DECIMAL_SIGN != 0 || scale > MAX_DECIMAL_SCALE
    {
        bail!(
            StatusCode::InvalidData,
            "invalid decimal flags {:02x?}",
            &bytes[0..4]
        );
    }
    Ok(Decimal::deserialize(bytes))
}

pub(crate) fn read_char(r: &mut dyn Read) -> TrackwireResult<char> {
    let first = r.read_u8()?;
    let width = match first {
        0x00..=0x7F => 1,
        0xC2..=0xDF => 2,
        0xE0..=0xEF => 3,
        0xF0..=0xF4 => 4,
        _ => return Err(WireError::InvalidChar { bytes: vec![first] }.into()),
    };

    let mut buf = [first, 0, 0, 0];
    r.read_exact(&mut buf[1..width])?;
    std::str::from_utf8(&buf[..width])
        .ok()
        .and_then(|s| s.chars().next())
        .ok_or_else(|| {
            WireError::InvalidChar {
                bytes: buf[..width].to_vec(),
            }
            .into()
        })
}

fn decode(
    r: &mut dyn Read,
    ty: &ValueType,
    ctx: &ValueContext,
    depth: usize,
) -> TrackwireResult<Value> {
    ctx.limits().check_depth(depth)?;

    let value = match ty {
        ValueType::Enum { name, repr } => {
            if !repr.is_integer() {
                return Err(
                    WireError::construction(name, "enum underlying type must be an integer").into(),
                );
            }
            decode(r, repr, ctx, depth)?
        }

        ValueType::Bool => Value::Bool(read_bool(r)?),
        ValueType::I8 => Value::I8(r.read_i8()?),
        ValueType::U8 => Value::U8(r.read_u8()?),
        ValueType::I16 => Value::I16(r.read_i16::<LittleEndian>()?),
        ValueType::U16 => Value::U16(r.read_u16::<LittleEndian>()?),
        ValueType::I32 => Value::I32(read_varint_i32(r)?),
        ValueType::U32 => Value::U32(read_varint_u32(r)?),
        ValueType::I64 => Value::I64(read_varint_i64(r)?),
        ValueType::U64 => Value::U64(read_varint_u64(r)?),
        ValueType::F32 => Value::F32(r.read_f32::<LittleEndian>()?),
        ValueType::F64 => Value::F64(r.read_f64::<LittleEndian>()?),
        ValueType::Decimal => Value::Decimal(read_decimal(r)?),
        ValueType::Char => Value::Char(read_char(r)?),

        ValueType::String => {
            if read_bool(r)? {
                Value::Str(read_utf8(r, ctx.limits())?)
            } else {
                Value::Null
            }
        }

        ValueType::Array(element) => {
            let prefix = read_varint_u32(r)? as usize;
            match prefix.checked_sub(1) {
                None => Value::Null,
                Some(len) => {
                    ctx.limits().check_array(len)?;
                    // Ёмкость ограничена: длина ещё не подтверждена данными.
                    let mut items = Vec::with_capacity(len.min(1024));
                    for _ in 0..len {
                        items.push(decode(r, element, ctx, depth + 1)?);
                    }
                    Value::Array(items)
                }
            }
        }

        ValueType::Nullable(inner) => {
            if read_bool(r)? {
                decode(r, inner, ctx, depth + 1)?
            } else {
                Value::Null
            }
        }

        ValueType::Composite(name) => decode_composite(r, name, ctx, depth)?,
    };
    Ok(value)
}

fn decode_composite(
    r: &mut dyn Read,
    name: &str,
    ctx: &ValueContext,
    depth: usize,
) -> TrackwireResult<Value> {
    let descriptor = ctx.registry().get(name)?;

    if descriptor.kind == CompositeKind::Class && !read_bool(r)? {
        return Ok(Value::Null);
    }

    if let Some(surrogate) = ctx.surrogate() {
        if let Some(value) = surrogate.try_read(r, name)? {
            return Ok(value);
        }
    }

    if !descriptor.constructible {
        return Err(WireError::construction(name, "type has no parameterless construction path").into());
    }

    let mut composite = CompositeValue::new(name);
    for member in ctx.registry().layout(name)?.iter() {
        let value = decode(r, &member.value_type, ctx, depth + 1)?;
        composite.fields.insert(member.name.clone(), value);
    }
    Ok(Value::Composite(composite))
}
