use std::any::Any;

use thiserror::Error;

use crate::{ErrorExt, StatusCode};

/// Ошибки формата потока и несовпадения схемы.
///
/// Кодек детерминирован: любая из этих ошибок означает ошибку программы или
/// рассинхрон версий схемы у писателя и читателя, а не временный сбой.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// `offset`: номер байта внутри varint, на котором чтение прервано.
    #[error("malformed {bits}-bit varint at byte {offset}")]
    MalformedVarint { bits: u8, offset: u64 },

    #[error("cannot construct instance of `{type_name}`: {reason}")]
    TypeConstruction { type_name: String, reason: String },

    #[error("type mismatch: expected `{expected}`, found `{found}`")]
    TypeMismatch { expected: String, found: String },

    #[error("no entity type established before `{operation}`")]
    MissingTypeContext { operation: String },

    #[error("unknown field `{field}` for entity type `{entity_type}`")]
    UnknownField { entity_type: String, field: String },

    #[error("unknown relation `{relation}` for entity type `{entity_type}`")]
    UnknownRelation {
        entity_type: String,
        relation: String,
    },

    #[error("unknown entity type `{name}`")]
    UnknownEntityType { name: String },

    #[error("invalid record state byte 0x{byte:02x}")]
    InvalidRecordState { byte: u8 },

    #[error("invalid UTF-8 char encoding {bytes:02x?}")]
    InvalidChar { bytes: Vec<u8> },

    #[error("{what} size {size} exceeds limit {limit}")]
    SizeLimit {
        what: String,
        size: u64,
        limit: u64,
    },

    #[error("value nesting exceeds depth limit {limit}")]
    DepthLimit { limit: usize },

    #[error("protocol error: {reason}")]
    Protocol { reason: String },
}

impl WireError {
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol {
            reason: reason.into(),
        }
    }

    pub fn missing_type(operation: impl Into<String>) -> Self {
        Self::MissingTypeContext {
            operation: operation.into(),
        }
    }

    pub fn mismatch(
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn construction(
        type_name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::TypeConstruction {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }

    pub fn size_limit(
        what: impl Into<String>,
        size: u64,
        limit: u64,
    ) -> Self {
        Self::SizeLimit {
            what: what.into(),
            size,
            limit,
        }
    }
}

impl ErrorExt for WireError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::MalformedVarint { .. } => StatusCode::MalformedVarint,
            Self::TypeConstruction { .. } => StatusCode::TypeConstruction,
            Self::TypeMismatch { .. } => StatusCode::TypeMismatch,
            Self::MissingTypeContext { .. } => StatusCode::MissingTypeContext,
            Self::UnknownField { .. } | Self::UnknownRelation { .. } => StatusCode::UnknownField,
            Self::UnknownEntityType { .. } => StatusCode::NotFound,
            Self::InvalidRecordState { .. } => StatusCode::InvalidData,
            Self::InvalidChar { .. } => StatusCode::InvalidUtf8,
            Self::SizeLimit { .. } => StatusCode::SizeLimit,
            Self::DepthLimit { .. } => StatusCode::DepthLimit,
            Self::Protocol { .. } => StatusCode::ProtocolError,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn metrics_tags(&self) -> Vec<(&'static str, String)> {
        let mut tags = vec![
            ("error_type", "wire".to_string()),
            ("status_code", self.status_code().to_string()),
        ];
        match self {
            Self::UnknownField { entity_type, .. }
            | Self::UnknownRelation { entity_type, .. } => {
                tags.push(("entity_type", entity_type.clone()));
            }
            Self::UnknownEntityType { name } => tags.push(("entity_type", name.clone())),
            _ => {}
        }
        tags
    }
}

////////////////////////////////////////////////////////////////////////////////
// Тесты
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StackError;

    #[test]
    fn test_status_code_mapping() {
        let cases = vec![
            (
                WireError::MalformedVarint {
                    bits: 64,
                    offset: 3,
                },
                StatusCode::MalformedVarint,
            ),
            (
                WireError::construction("Money", "no descriptor"),
                StatusCode::TypeConstruction,
            ),
            (WireError::mismatch("i32", "string"), StatusCode::TypeMismatch),
            (
                WireError::missing_type("read_field"),
                StatusCode::MissingTypeContext,
            ),
            (
                WireError::UnknownRelation {
                    entity_type: "Order".into(),
                    relation: "Lines".into(),
                },
                StatusCode::UnknownField,
            ),
            (
                WireError::UnknownEntityType {
                    name: "Ghost".into(),
                },
                StatusCode::NotFound,
            ),
            (
                WireError::InvalidRecordState { byte: 0x17 },
                StatusCode::InvalidData,
            ),
            (
                WireError::InvalidChar { bytes: vec![0xc0] },
                StatusCode::InvalidUtf8,
            ),
            (WireError::DepthLimit { limit: 8 }, StatusCode::DepthLimit),
            (WireError::protocol("x"), StatusCode::ProtocolError),
        ];

        for (err, code) in cases {
            assert_eq!(err.status_code(), code, "{err}");
        }
    }

    #[test]
    fn test_display_messages() {
        let e = WireError::MalformedVarint {
            bits: 32,
            offset: 4,
        };
        assert_eq!(e.to_string(), "malformed 32-bit varint at byte 4");

        let e = WireError::InvalidRecordState { byte: 0x0f };
        assert_eq!(e.to_string(), "invalid record state byte 0x0f");

        let e = WireError::size_limit("string", 100, 10);
        assert_eq!(e.to_string(), "string size 100 exceeds limit 10");
    }

    #[test]
    fn test_metrics_tags_carry_entity_type() {
        let e = WireError::UnknownField {
            entity_type: "Customer".into(),
            field: "#9".into(),
        };
        let tags = e.metrics_tags();
        assert!(tags.contains(&("entity_type", "Customer".to_string())));
    }

    #[test]
    fn test_roundtrip_through_stack_error() {
        let stack: StackError = WireError::protocol("null relation bitmap").into();
        assert_eq!(stack.status_code(), StatusCode::ProtocolError);
        assert_eq!(
            stack.wire_error(),
            Some(&WireError::protocol("null relation bitmap"))
        );
        assert_eq!(stack.client_message(), "protocol error: null relation bitmap");
    }
}
