//! Numeric element types for captured embedding rows.

use serde::Deserialize;
use std::fmt;

/// Element type of the rows captured during an eviction cycle.
///
/// The cache itself stores opaque bytes. The element type only fixes the
/// byte stride of the capture buffer, once, when a cycle begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    /// 32-bit float.
    #[default]
    #[serde(alias = "float", alias = "float32")]
    F32,
    /// 16-bit float.
    #[serde(alias = "half", alias = "float16")]
    F16,
    /// Single byte (quantized rows).
    #[serde(alias = "byte", alias = "uint8")]
    U8,
}

impl ElementType {
    /// Size of one element in bytes.
    #[inline]
    pub const fn size(self) -> usize {
        match self {
            Self::F32 => 4,
            Self::F16 => 2,
            Self::U8 => 1,
        }
    }

    /// Byte length of a row of `width` elements, or `None` on overflow.
    #[inline]
    pub fn row_bytes(self, width: usize) -> Option<usize> {
        width.checked_mul(self.size())
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::F32 => write!(f, "f32"),
            Self::F16 => write!(f, "f16"),
            Self::U8 => write!(f, "u8"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes() {
        assert_eq!(ElementType::F32.size(), 4);
        assert_eq!(ElementType::F16.size(), 2);
        assert_eq!(ElementType::U8.size(), 1);
    }

    #[test]
    fn test_row_bytes() {
        assert_eq!(ElementType::F32.row_bytes(16), Some(64));
        assert_eq!(ElementType::F16.row_bytes(16), Some(32));
        assert_eq!(ElementType::F32.row_bytes(usize::MAX), None);
    }

    #[test]
    fn test_deserialize_aliases() {
        #[derive(Deserialize)]
        struct Wrapper {
            element: ElementType,
        }

        for (text, expected) in [
            ("f32", ElementType::F32),
            ("float", ElementType::F32),
            ("half", ElementType::F16),
            ("f16", ElementType::F16),
            ("byte", ElementType::U8),
            ("u8", ElementType::U8),
        ] {
            let parsed: Wrapper = toml::from_str(&format!("element = \"{}\"", text)).unwrap();
            assert_eq!(parsed.element, expected, "parsing {}", text);
        }
    }
}
