//! Разметка записи: байт состояния, индексы полей с флагами, служебные
//! маркеры и битовая маска загруженных связей.
//!
//! ```text
//! stream  := entry* 0xFF
//! entry   := state_byte type_name? (index value?)* (0 | 1 bitmap)
//! index   := varint((ordinal + 1) << 2 | MODIFIED | DEFAULT_VALUE)
//! ```

use trackwire_error::{TrackwireResult, WireError};

use crate::schema::RecordState;

/// Бит байта состояния: далее следует имя типа.
pub const ENTITY_TYPE_FLAG: u8 = 0b1000_0000;
/// Младшие биты байта состояния.
pub const STATE_MASK: u8 = 0b0111_1111;
/// Индекс «конец записи».
pub const END_MARKER: u32 = 0;
/// Индекс «далее битовая маска связей».
pub const NAVIGATION_MARKER: u32 = 1;
/// Байт состояния «записей больше нет».
pub const END_OF_STREAM: u8 = 0xFF;

const FLAG_BITS: u32 = 2;
const FLAG_MASK: u32 = (1 << FLAG_BITS) - 1;
/// Наибольший номер поля, индекс которого помещается в `u32`.
pub const MAX_ORDINAL: usize = ((u32::MAX >> FLAG_BITS) - 1) as usize;

bitflags::bitflags! {
    /// Флаги в младших битах индекса поля.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct IndexFlags: u32 {
        /// Значение опущено, читатель восстанавливает значение по умолчанию.
        const DEFAULT_VALUE = 0b01;
        /// Поле относится к секции изменённых полей.
        const MODIFIED = 0b10;
    }
}

/// Разобранный индекс из потока полей.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldIndex {
    End,
    Navigation,
    Field { ordinal: usize, flags: IndexFlags },
}

impl FieldIndex {
    pub fn is_modified(&self) -> bool {
        matches!(self, Self::Field { flags, .. } if flags.contains(IndexFlags::MODIFIED))
    }
}

pub fn encode_index(
    ordinal: usize,
    flags: IndexFlags,
) -> TrackwireResult<u32> {
    if ordinal > MAX_ORDINAL {
        return Err(WireError::size_limit("field ordinal", ordinal as u64, MAX_ORDINAL as u64).into());
    }
    Ok(((ordinal as u32 + 1) << FLAG_BITS) | flags.bits())
}

/// Разбирает индекс. Значения 2 и 3 (номер `-1` с флагами) зарезервированы
/// и в корректном потоке не встречаются.
pub fn decode_index(raw: u32) -> TrackwireResult<FieldIndex> {
    match raw {
        END_MARKER => Ok(FieldIndex::End),
        NAVIGATION_MARKER => Ok(FieldIndex::Navigation),
        _ => {
            let slot = raw >> FLAG_BITS;
            if slot == 0 {
                return Err(WireError::protocol(format!("reserved field index {raw}")).into());
            }
            Ok(FieldIndex::Field {
                ordinal: (slot - 1) as usize,
                flags: IndexFlags::from_bits_truncate(raw & FLAG_MASK),
            })
        }
    }
}

pub fn state_byte(
    state: RecordState,
    with_type: bool,
) -> u8 {
    let byte = state.as_u8();
    if with_type {
        byte | ENTITY_TYPE_FLAG
    } else {
        byte
    }
}

/// Разбирает байт состояния: состояние и признак «далее имя типа».
/// `END_OF_STREAM` сюда не передаётся.
pub fn split_state_byte(byte: u8) -> TrackwireResult<(RecordState, bool)> {
    let state = RecordState::from_bits(byte & STATE_MASK)?;
    Ok((state, byte & ENTITY_TYPE_FLAG != 0))
}

/// Битовая маска загруженных связей: бит N: связь с номером N.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RelationBitmap {
    bytes: Vec<u8>,
}

impl RelationBitmap {
    /// Маска на `relation_count` связей: `ceil(relation_count / 8)` байт.
    pub fn with_relations(relation_count: usize) -> Self {
        Self {
            bytes: vec![0; relation_count.div_ceil(8)],
        }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Устанавливает бит. `false`, если номер за пределами маски.
    pub fn set(
        &mut self,
        ordinal: usize,
    ) -> bool {
        match self.bytes.get_mut(ordinal / 8) {
            Some(byte) => {
                *byte |= 1 << (ordinal % 8);
                true
            }
            None => false,
        }
    }

    pub fn contains(
        &self,
        ordinal: usize,
    ) -> bool {
        self.bytes
            .get(ordinal / 8)
            .is_some_and(|b| b & (1 << (ordinal % 8)) != 0)
    }

    /// Первый установленный бит с номером не меньше `from`.
    pub fn next_set(
        &self,
        from: usize,
    ) -> Option<usize> {
        (from..self.bytes.len() * 8).find(|&i| self.contains(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.bytes.len() * 8).filter(|&i| self.contains(i))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.iter().all(|&b| b == 0)
    }
}
