use serde::{Deserialize, Serialize};
use trackwire_error::{TrackwireResult, WireError};

pub const DEFAULT_MAX_STRING_BYTES: usize = 16 * 1024 * 1024;
pub const DEFAULT_MAX_ARRAY_LEN: usize = 16 * 1024 * 1024;
pub const DEFAULT_MAX_BITMAP_BYTES: usize = 8 * 1024;
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Ограничения, которые ридер проверяет до выделения памяти.
///
/// Поток без заголовка и общей длины, поэтому размеры строк, массивов и
/// битовых масок приходится ограничивать по отдельности.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecLimits {
    pub max_string_bytes: usize,
    pub max_array_len: usize,
    pub max_bitmap_bytes: usize,
    pub max_depth: usize,
}

impl Default for CodecLimits {
    fn default() -> Self {
        Self {
            max_string_bytes: DEFAULT_MAX_STRING_BYTES,
            max_array_len: DEFAULT_MAX_ARRAY_LEN,
            max_bitmap_bytes: DEFAULT_MAX_BITMAP_BYTES,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl CodecLimits {
    pub fn check_string(
        &self,
        len: usize,
    ) -> TrackwireResult<()> {
        check("string", len, self.max_string_bytes)
    }

    pub fn check_array(
        &self,
        len: usize,
    ) -> TrackwireResult<()> {
        check("array", len, self.max_array_len)
    }

    pub fn check_bitmap(
        &self,
        len: usize,
    ) -> TrackwireResult<()> {
        check("relation bitmap", len, self.max_bitmap_bytes)
    }

    pub fn check_depth(
        &self,
        depth: usize,
    ) -> TrackwireResult<()> {
        if depth > self.max_depth {
            return Err(WireError::DepthLimit {
                limit: self.max_depth,
            }
            .into());
        }
        Ok(())
    }
}

fn check(
    what: &str,
    size: usize,
    limit: usize,
) -> TrackwireResult<()> {
    if size > limit {
        return Err(WireError::size_limit(what, size as u64, limit as u64).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use trackwire_error::StatusCode;

    use super::*;

    #[test]
    fn test_defaults() {
        let limits = CodecLimits::default();
        assert_eq!(limits.max_string_bytes, 16 * 1024 * 1024);
        assert_eq!(limits.max_bitmap_bytes, 8192);
        assert_eq!(limits.max_depth, 64);
    }

    #[test]
    fn test_boundaries() {
        let limits = CodecLimits {
            max_string_bytes: 4,
            max_array_len: 2,
            max_bitmap_bytes: 1,
            max_depth: 3,
        };
        assert!(limits.check_string(4).is_ok());
        assert_eq!(
            limits.check_string(5).unwrap_err().status_code(),
            StatusCode::SizeLimit
        );
        assert!(limits.check_array(3).is_err());
        assert!(limits.check_bitmap(2).is_err());
        assert!(limits.check_depth(3).is_ok());
        assert_eq!(
            limits.check_depth(4).unwrap_err().status_code(),
            StatusCode::DepthLimit
        );
    }

    #[test]
    fn test_partial_deserialize_keeps_defaults() {
        let limits: CodecLimits = serde_json::from_str(r#"{ "max_depth": 8 }"#).unwrap();
        assert_eq!(limits.max_depth, 8);
        assert_eq!(limits.max_array_len, DEFAULT_MAX_ARRAY_LEN);
    }
}
