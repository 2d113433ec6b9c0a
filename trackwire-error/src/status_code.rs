use std::fmt;

use num_enum::TryFromPrimitive;
#[cfg(feature = "strum")]
use strum_macros::{AsRefStr, EnumIter};

/// Коды статуса для категоризации ошибок кодека.
///
/// # Диапазоны:
/// - 0xxx: Успех
/// - 1xxx: Общие ошибки
/// - 2xxx: Ошибки данных и схемы
/// - 6xxx: IO
/// - 8xxx: Ошибки формата (wire protocol)
///
/// `num_enum::TryFromPrimitive` даёт `TryFrom<u32>`, что удобно, когда код
/// нужно передать за пределы процесса.
#[cfg_attr(feature = "strum", derive(AsRefStr, EnumIter))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[repr(u32)]
#[non_exhaustive]
pub enum StatusCode {
    // === 0xxx: Успех ===
    Success = 0,

    // === 1xxx: Общие ошибки ===
    Unknown = 1000,
    Unsupported = 1001,
    Unexpected = 1002,
    Internal = 1003,
    InvalidArgs = 1004,

    // === 2xxx: Данные и схема ===
    NotFound = 2000,
    TypeMismatch = 2001,
    TypeConstruction = 2002,
    MissingTypeContext = 2003,
    UnknownField = 2004,
    InvalidData = 2005,

    // === 6xxx: IO ===
    Io = 6000,
    PermissionDenied = 6001,
    Timeout = 6002,
    ConnectionFailed = 6003,
    UnexpectedEof = 6004,

    // === 8xxx: Формат ===
    ProtocolError = 8000,
    MalformedVarint = 8001,
    InvalidUtf8 = 8002,
    SizeLimit = 8003,
    DepthLimit = 8004,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl StatusCode {
    /// Числовое представление кода статуса.
    pub const fn code(self) -> u32 {
        self as u32
    }

    /// Пытается получить вариант `StatusCode` из `u32`.
    pub fn from_u32(v: u32) -> Option<Self> {
        Self::try_from(v).ok()
    }

    /// Вернёт `true`, если переданный `code` означает успешный результат.
    pub fn is_success(code: u32) -> bool {
        Self::Success as u32 == code
    }

    /// Ошибки, которые имеет смысл повторить: кодек детерминирован, поэтому
    /// повторять можно только транспортные сбои.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::ConnectionFailed)
    }

    /// Несовпадение схемы или значения с объявленным типом (диапазон 2xxx).
    pub fn is_schema_error(&self) -> bool {
        (2000..=2999).contains(&self.code())
    }

    /// Ошибка формата потока (диапазон 8xxx).
    pub fn is_protocol_error(&self) -> bool {
        (8000..=8999).contains(&self.code())
    }

    /// Требуется ли логировать как критическую ошибку.
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::Internal | Self::Unexpected)
    }

    /// Рекомендуемый уровень логирования для данного кода.
    pub fn log_level(&self) -> LogLevel {
        match self {
            Self::Success => LogLevel::Trace,
            Self::NotFound | Self::UnexpectedEof => LogLevel::Debug,
            Self::InvalidArgs | Self::InvalidData | Self::InvalidUtf8 => LogLevel::Info,
            Self::Internal | Self::Unexpected => LogLevel::Error,
            _ => LogLevel::Warn,
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для StatusCode
////////////////////////////////////////////////////////////////////////////////

impl From<StatusCode> for u32 {
    fn from(c: StatusCode) -> Self {
        c.code()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        #[cfg(feature = "strum")]
        {
            write!(f, "{} ({})", self.as_ref(), self.code())
        }
        #[cfg(not(feature = "strum"))]
        {
            write!(f, "{:?} ({})", self, self.code())
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    /// Тест проверяет, что повторять имеет смысл только транспортные сбои.
    #[test]
    fn test_retryable() {
        assert!(StatusCode::Timeout.is_retryable());
        assert!(!StatusCode::MalformedVarint.is_retryable());
        assert!(!StatusCode::UnknownField.is_retryable());
    }

    /// Тест проверяет разделение ошибок схемы и ошибок формата.
    #[test]
    fn test_schema_vs_protocol() {
        assert!(StatusCode::UnknownField.is_schema_error());
        assert!(StatusCode::TypeMismatch.is_schema_error());
        assert!(!StatusCode::UnknownField.is_protocol_error());
        assert!(StatusCode::MalformedVarint.is_protocol_error());
        assert!(StatusCode::DepthLimit.is_protocol_error());
    }

    #[test]
    fn test_from_try_from_u32() {
        let n = StatusCode::MissingTypeContext.code();
        assert_eq!(
            StatusCode::try_from(n).unwrap(),
            StatusCode::MissingTypeContext
        );
        assert!(StatusCode::from_u32(99999).is_none());
        assert!(StatusCode::is_success(0));
    }

    #[test]
    fn test_log_level_mappings() {
        assert_eq!(StatusCode::Success.log_level(), LogLevel::Trace);
        assert_eq!(StatusCode::UnexpectedEof.log_level(), LogLevel::Debug);
        assert_eq!(StatusCode::Internal.log_level(), LogLevel::Error);
        assert_eq!(StatusCode::ProtocolError.log_level(), LogLevel::Warn);
    }

    /// Тест проверяет формат `Display`: имя варианта и числовой код.
    #[test]
    fn test_display_contains_name_and_code() {
        let s = format!("{}", StatusCode::MalformedVarint);
        assert!(s.contains("8001"), "got: {s}");
        assert!(s.contains("MalformedVarint"), "got: {s}");
    }
}
