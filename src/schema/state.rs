use std::fmt;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use trackwire_error::{TrackwireResult, WireError};

/// Состояние записи в жизненном цикле отслеживания изменений.
///
/// Значение занимает младшие биты байта состояния; старший бит отдан под
/// флаг «далее имя типа».
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    TryFromPrimitive,
    IntoPrimitive,
)]
#[repr(u8)]
pub enum RecordState {
    #[default]
    Detached = 0,
    Unchanged = 1,
    Deleted = 2,
    Modified = 3,
    Added = 4,
}

impl RecordState {
    /// Разбирает младшие биты байта состояния.
    pub fn from_bits(bits: u8) -> TrackwireResult<Self> {
        Self::try_from(bits).map_err(|_| WireError::InvalidRecordState { byte: bits }.into())
    }

    pub fn as_u8(self) -> u8 {
        self.into()
    }

    /// Участвует ли запись в наборе изменений.
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Added | Self::Modified | Self::Deleted)
    }
}

impl fmt::Display for RecordState {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
