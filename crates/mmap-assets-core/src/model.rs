use serde::{Deserialize, Serialize};

/// Result of a dimension probe.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Dimensions {
    Recognized { width: u16, height: u16 },
    Unknown,
}

impl Dimensions {
    /// `(width, height)` as stored in the index table; unknown is `(0, 0)`.
    pub fn or_zero(self) -> (u16, u16) {
        match self {
            Dimensions::Recognized { width, height } => (width, height),
            Dimensions::Unknown => (0, 0),
        }
    }

    pub fn is_recognized(self) -> bool {
        matches!(self, Dimensions::Recognized { .. })
    }
}

/// One file placed into the merged blob.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BundleEntry {
    /// File name as found on disk (before fixed-width truncation).
    pub name: String,
    /// Offset of the entry marker within the merged data region.
    pub offset: u32,
    /// Length of the file content, marker excluded.
    pub size: u32,
    pub width: u16,
    pub height: u16,
}

impl BundleEntry {
    /// Name as written into the index table: exactly `max_name_len` bytes,
    /// NUL padded or truncated.
    pub fn stored_name(&self, max_name_len: usize) -> Vec<u8> {
        let mut out = self.name.as_bytes().to_vec();
        out.resize(max_name_len, 0);
        out
    }
}

/// Recoverable conditions found while building a bundle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BundleWarning {
    /// The name did not fit the index table and was truncated.
    NameTooLong { name: String, max_name_len: usize },
    /// Two names collapse to the same bytes after truncation; lookups by name hit the first.
    NameCollision { first: String, second: String },
}

impl std::fmt::Display for BundleWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BundleWarning::NameTooLong { name, max_name_len } => write!(
                f,
                "\"{name}\" exceeds {max_name_len} bytes and will be truncated"
            ),
            BundleWarning::NameCollision { first, second } => write!(
                f,
                "\"{second}\" is indistinguishable from \"{first}\" after truncation"
            ),
        }
    }
}
