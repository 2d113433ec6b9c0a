//! Отдельные точки входа кодека значений: в буфер и из буфера, в поток и из
//! потока. Не зависят от протокола записей.

use std::io::{Read, Write};

use trackwire_error::TrackwireResult;

use super::{read_value, write_value, Value, ValueContext, ValueType};

pub fn serialize_value(
    ty: &ValueType,
    value: &Value,
    ctx: &ValueContext,
) -> TrackwireResult<Vec<u8>> {
    let mut buf = Vec::new();
    write_value(&mut buf, ty, value, ctx)?;
    Ok(buf)
}

pub fn serialize_into<W: Write>(
    w: &mut W,
    ty: &ValueType,
    value: &Value,
    ctx: &ValueContext,
) -> TrackwireResult<()> {
    write_value(w, ty, value, ctx)?;
    w.flush()?;
    Ok(())
}

/// Читает одно значение из начала `bytes`. Хвост после значения не
/// проверяется.
pub fn deserialize_value(
    ty: &ValueType,
    mut bytes: &[u8],
    ctx: &ValueContext,
) -> TrackwireResult<Value> {
    read_value(&mut bytes, ty, ctx)
}

pub fn deserialize_from<R: Read>(
    r: &mut R,
    ty: &ValueType,
    ctx: &ValueContext,
) -> TrackwireResult<Value> {
    read_value(r, ty, ctx)
}
