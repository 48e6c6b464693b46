//! Tiled image container (`.sjpg` / `.spng` / `.sqoi`).
//!
//! Layout, little-endian throughout:
//!
//! | offset | size | field |
//! |-------:|-----:|-------|
//! | 0 | 8 | magic (`_SJPG__\0`, `_SPNG__\0`, `_SQOI__\0`) |
//! | 8 | 6 | version (`V1.00\0`) |
//! | 14 | 2 | width |
//! | 16 | 2 | height |
//! | 18 | 2 | strip count |
//! | 20 | 2 | strip height |
//! | 22 | 2 * count | strip lengths |
//! | .. | sum(lengths) | strip payloads |
//!
//! A single QOI strip is stored without any header (see [`SplitOutput`](crate::SplitOutput)),
//! so readers probe the magic before parsing.

use std::ops::Range;

use crate::config::StripEncoding;
use crate::error::{AssetError, Result};
use crate::model::Dimensions;

pub const VERSION: [u8; 6] = *b"V1.00\0";
/// Bytes of the magic that identify the encoding.
pub const MAGIC_PROBE_LEN: usize = 7;
pub const DIMENSIONS_OFFSET: usize = 14;
pub const HEADER_LEN: usize = 22;

/// One source image split into independently encoded horizontal strips.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub encoding: StripEncoding,
    pub width: u16,
    pub height: u16,
    pub strip_height: u16,
    pub strip_count: u16,
    pub strip_lengths: Vec<u16>,
    /// Concatenated strip payloads, in `strip_lengths` order.
    pub payload: Vec<u8>,
}

impl Container {
    /// Assembles a container from already encoded strips.
    pub fn from_strips(
        encoding: StripEncoding,
        width: u16,
        height: u16,
        strip_height: u16,
        strips: &[Vec<u8>],
    ) -> Result<Self> {
        let strip_count = u16::try_from(strips.len()).map_err(|_| {
            AssetError::InvalidGeometry(format!("{} strips exceed u16 range", strips.len()))
        })?;
        let mut strip_lengths = Vec::with_capacity(strips.len());
        for (i, s) in strips.iter().enumerate() {
            let len = u16::try_from(s.len()).map_err(|_| {
                AssetError::InvalidGeometry(format!(
                    "strip {i} is {} bytes, larger than the 16-bit length field; use a smaller strip height",
                    s.len()
                ))
            })?;
            strip_lengths.push(len);
        }
        let container = Self {
            encoding,
            width,
            height,
            strip_height,
            strip_count,
            strip_lengths,
            payload: strips.concat(),
        };
        container.validate()?;
        Ok(container)
    }

    /// Checks the geometry and strip table against each other.
    pub fn validate(&self) -> Result<()> {
        if self.strip_lengths.len() != self.strip_count as usize {
            return Err(AssetError::InvalidGeometry(format!(
                "strip_count is {} but {} lengths were given",
                self.strip_count,
                self.strip_lengths.len()
            )));
        }
        if self.strip_height == 0 {
            if self.strip_count > 1 {
                return Err(AssetError::InvalidGeometry(format!(
                    "strip_height is 0 with {} strips",
                    self.strip_count
                )));
            }
        } else {
            let expected = (self.height as usize).div_ceil(self.strip_height as usize);
            if expected != self.strip_count as usize {
                return Err(AssetError::InvalidGeometry(format!(
                    "height {} / strip_height {} needs {expected} strips, got {}",
                    self.height, self.strip_height, self.strip_count
                )));
            }
        }
        let total: usize = self.strip_lengths.iter().map(|&l| l as usize).sum();
        if total != self.payload.len() {
            return Err(AssetError::InvalidGeometry(format!(
                "strip lengths sum to {total} but payload is {} bytes",
                self.payload.len()
            )));
        }
        Ok(())
    }

    /// Serializes header, strip table and payloads.
    pub fn encode(&self) -> Result<Vec<u8>> {
        self.validate()?;
        let mut out =
            Vec::with_capacity(HEADER_LEN + self.strip_lengths.len() * 2 + self.payload.len());
        out.extend_from_slice(&self.encoding.magic());
        out.extend_from_slice(&VERSION);
        out.extend_from_slice(&self.width.to_le_bytes());
        out.extend_from_slice(&self.height.to_le_bytes());
        out.extend_from_slice(&self.strip_count.to_le_bytes());
        out.extend_from_slice(&self.strip_height.to_le_bytes());
        for len in &self.strip_lengths {
            out.extend_from_slice(&len.to_le_bytes());
        }
        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    /// Parses a headered container. The headerless QOI variant is rejected;
    /// call [`probe_encoding`] first when both may occur.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let encoding = probe_encoding(bytes)
            .ok_or_else(|| AssetError::Malformed("missing container magic".into()))?;
        if bytes.len() < HEADER_LEN {
            return Err(AssetError::Malformed(format!(
                "container header truncated: {} bytes",
                bytes.len()
            )));
        }
        let width = read_u16(bytes, DIMENSIONS_OFFSET);
        let height = read_u16(bytes, DIMENSIONS_OFFSET + 2);
        let strip_count = read_u16(bytes, DIMENSIONS_OFFSET + 4);
        let strip_height = read_u16(bytes, DIMENSIONS_OFFSET + 6);

        let table_end = HEADER_LEN + strip_count as usize * 2;
        if bytes.len() < table_end {
            return Err(AssetError::Malformed(format!(
                "strip table needs {table_end} bytes, have {}",
                bytes.len()
            )));
        }
        let strip_lengths: Vec<u16> = (0..strip_count as usize)
            .map(|i| read_u16(bytes, HEADER_LEN + i * 2))
            .collect();
        let total: usize = strip_lengths.iter().map(|&l| l as usize).sum();
        let payload = bytes
            .get(table_end..table_end + total)
            .ok_or_else(|| {
                AssetError::Malformed(format!(
                    "strip payloads need {total} bytes, have {}",
                    bytes.len() - table_end
                ))
            })?
            .to_vec();

        let container = Self {
            encoding,
            width,
            height,
            strip_height,
            strip_count,
            strip_lengths,
            payload,
        };
        container
            .validate()
            .map_err(|e| AssetError::Malformed(e.to_string()))?;
        Ok(container)
    }

    /// Payload bytes of strip `index`.
    pub fn strip(&self, index: usize) -> Option<&[u8]> {
        let len = *self.strip_lengths.get(index)? as usize;
        let start: usize = self.strip_lengths[..index].iter().map(|&l| l as usize).sum();
        self.payload.get(start..start + len)
    }

    /// Image rows covered by strip `index`.
    pub fn strip_rows(&self, index: usize) -> Option<Range<u32>> {
        if index >= self.strip_count as usize {
            return None;
        }
        Some(strip_rows(
            self.height as u32,
            self.strip_height as u32,
            self.strip_count as u32,
            index as u32,
        ))
    }
}

/// Rows `[top, bottom)` of strip `index` out of `count`. The last strip is clamped
/// to `height`; a zero strip height means the whole image is one strip.
pub fn strip_rows(height: u32, strip_height: u32, count: u32, index: u32) -> Range<u32> {
    if strip_height == 0 {
        return 0..height;
    }
    let top = index * strip_height;
    if index + 1 < count {
        top..top + strip_height
    } else {
        top..height
    }
}

/// Encoding named by the container magic, if any.
pub fn probe_encoding(bytes: &[u8]) -> Option<StripEncoding> {
    let head = bytes.get(..MAGIC_PROBE_LEN)?;
    StripEncoding::ALL
        .into_iter()
        .find(|e| &e.magic()[..MAGIC_PROBE_LEN] == head)
}

/// Reads width and height from a container header without touching the strip table.
/// Anything that is not a headered container is `Unknown`.
pub fn decode_dimensions(bytes: &[u8]) -> Dimensions {
    if probe_encoding(bytes).is_none() || bytes.len() < DIMENSIONS_OFFSET + 4 {
        return Dimensions::Unknown;
    }
    Dimensions::Recognized {
        width: read_u16(bytes, DIMENSIONS_OFFSET),
        height: read_u16(bytes, DIMENSIONS_OFFSET + 2),
    }
}

fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}
