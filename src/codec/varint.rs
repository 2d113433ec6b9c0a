//! Variable-length integer encoding (LEB128-style).
//!
//! Каждый байт несёт 7 бит данных, старший бит означает «дальше есть ещё
//! байты». Знаковые значения не перекодируются через zig-zag: пишется их
//! битовое представление в дополнительном коде, поэтому любое отрицательное
//! `i32` занимает 5 байт, а `i64`: 10.
//!
//! - 0-127: 1 байт
//! - 128-16383: 2 байта
//! - 16384-2097151: 3 байта
//! - до u32::MAX: 5 байт, до u64::MAX: 10 байт

use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt};
use trackwire_error::{TrackwireResult, WireError};

/// Максимальное кол-во 7-битных групп для 32-битного значения.
pub const MAX_VARINT32_LEN: usize = 5;
/// Максимальное кол-во 7-битных групп для 64-битного значения.
pub const MAX_VARINT64_LEN: usize = 10;

const CONTINUATION: u8 = 0x80;
const PAYLOAD: u8 = 0x7F;

fn write_groups<W: Write + ?Sized>(
    w: &mut W,
    mut value: u64,
) -> TrackwireResult<usize> {
    let mut written = 0;
    loop {
        let mut byte = (value as u8) & PAYLOAD;
        value >>= 7;
        if value != 0 {
            byte |= CONTINUATION;
        }
        w.write_u8(byte)?;
        written += 1;
        if value == 0 {
            return Ok(written);
        }
    }
}

/// Читает не более `max_groups` групп. В последней группе допустимы только
/// биты, помещающиеся в `bits` разрядов.
fn read_groups<R: Read + ?Sized>(
    r: &mut R,
    max_groups: usize,
    bits: u8,
) -> TrackwireResult<u64> {
    let mut result: u64 = 0;
    let mut shift: u32 = 0;

    for offset in 0..max_groups {
        let byte = r.read_u8()?;
        let payload = byte & PAYLOAD;
        if offset + 1 == max_groups && u32::from(payload) >> (u32::from(bits) - shift) != 0 {
            return Err(malformed(bits, offset));
        }
        result |= u64::from(payload) << shift;
        if byte & CONTINUATION == 0 {
            return Ok(result);
        }
        shift += 7;
    }

    Err(malformed(bits, max_groups - 1))
}

fn malformed(
    bits: u8,
    offset: usize,
) -> trackwire_error::StackError {
    WireError::MalformedVarint {
        bits,
        offset: offset as u64,
    }
    .into()
}

/// Записывает `u32`, возвращает кол-во записанных байт.
///
/// ```
/// use trackwire::codec::varint::write_varint_u32;
///
/// let mut buf = Vec::new();
/// write_varint_u32(&mut buf, 128).unwrap();
/// assert_eq!(buf, vec![0x80, 0x01]);
/// ```
pub fn write_varint_u32<W: Write + ?Sized>(
    w: &mut W,
    value: u32,
) -> TrackwireResult<usize> {
    write_groups(w, u64::from(value))
}

pub fn write_varint_u64<W: Write + ?Sized>(
    w: &mut W,
    value: u64,
) -> TrackwireResult<usize> {
    write_groups(w, value)
}

/// Записывает `i32` как битовый образ `u32` (без zig-zag).
pub fn write_varint_i32<W: Write + ?Sized>(
    w: &mut W,
    value: i32,
) -> TrackwireResult<usize> {
    write_groups(w, u64::from(value as u32))
}

/// Записывает `i64` как битовый образ `u64` (без zig-zag).
pub fn write_varint_i64<W: Write + ?Sized>(
    w: &mut W,
    value: i64,
) -> TrackwireResult<usize> {
    write_groups(w, value as u64)
}

/// Читает `u32`.
///
/// # Errors
/// - `MalformedVarint`, если после 5 групп всё ещё стоит бит продолжения
///   или пятая группа несёт биты старше 32-го;
/// - `UnexpectedEof`, если поток кончился посреди значения.
pub fn read_varint_u32<R: Read + ?Sized>(r: &mut R) -> TrackwireResult<u32> {
    read_groups(r, MAX_VARINT32_LEN, 32).map(|v| v as u32)
}

pub fn read_varint_u64<R: Read + ?Sized>(r: &mut R) -> TrackwireResult<u64> {
    read_groups(r, MAX_VARINT64_LEN, 64)
}

pub fn read_varint_i32<R: Read + ?Sized>(r: &mut R) -> TrackwireResult<i32> {
    read_varint_u32(r).map(|v| v as i32)
}

pub fn read_varint_i64<R: Read + ?Sized>(r: &mut R) -> TrackwireResult<i64> {
    read_varint_u64(r).map(|v| v as i64)
}

/// Размер varint для числа (без записи).
pub fn varint_size(mut value: u64) -> usize {
    let mut size = 1;
    while value >= u64::from(CONTINUATION) {
        value >>= 7;
        size += 1;
    }
    size
}
