//! Merged asset blob with a fixed-width lookup table.
//!
//! Layout, little-endian:
//! `[file_count:u32][checksum:u32][combined_len:u32][index_table][merged_data]`
//!
//! Each index record is `name[max_name_len] size:u32 offset:u32 width:u16 height:u16`.
//! `merged_data` holds, per entry, the marker `5A 5A` followed by the file bytes;
//! `offset` points at the marker. `checksum` is the byte sum of
//! `index_table ++ merged_data` modulo 65536, stored in the low half of its field.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use crate::error::{AssetError, Result};
use crate::model::{BundleEntry, BundleWarning, Dimensions};
use crate::output::write_atomic;
use crate::probe::{DimensionProbe, default_probes, probe_dimensions};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

pub const ENTRY_MARKER: [u8; 2] = [0x5A, 0x5A];
/// `file_count`, `checksum` and `combined_len`.
pub const BLOB_HEADER_LEN: usize = 12;
/// Bytes of an index record after the name.
pub const RECORD_TAIL_LEN: usize = 12;

/// In-memory file to place into a bundle.
#[derive(Debug, Clone)]
pub struct Asset {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Sort key giving the entry order: `(extension, stem)`, both as they appear in the file name.
/// The extension keeps its leading dot, so `a.` (extension `.`) sorts after extensionless names.
pub fn sort_key(file_name: &str) -> (String, String) {
    let path = Path::new(file_name);
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    (ext, stem)
}

/// Unsigned byte sum modulo 65536 over all `chunks`.
pub fn checksum16(chunks: &[&[u8]]) -> u16 {
    chunks
        .iter()
        .flat_map(|c| c.iter())
        .fold(0u16, |acc, &b| acc.wrapping_add(b as u16))
}

/// Builds [`Bundle`]s. Holds the index name width and the ordered dimension probes.
pub struct BundleBuilder {
    max_name_len: usize,
    probes: Vec<Box<dyn DimensionProbe>>,
}

impl BundleBuilder {
    pub fn new(max_name_len: usize) -> Self {
        Self {
            max_name_len,
            probes: default_probes(),
        }
    }

    /// Replaces the dimension probes; they run in the given order.
    pub fn with_probes(mut self, probes: Vec<Box<dyn DimensionProbe>>) -> Self {
        self.probes = probes;
        self
    }

    #[instrument(skip_all, fields(files = paths.len()))]
    /// Reads every file in `paths` and bundles them. Any unreadable file aborts the build.
    pub fn build_from_paths(&self, paths: &[PathBuf]) -> Result<Bundle> {
        let mut sorted: Vec<(String, &PathBuf)> = paths
            .iter()
            .map(|p| (file_name_of(p), p))
            .collect();
        sorted.sort_by(|a, b| {
            sort_key(&a.0)
                .cmp(&sort_key(&b.0))
                .then_with(|| a.1.cmp(b.1))
        });

        let load = |(name, path): &(String, &PathBuf)| -> Result<Prepared> {
            let bytes = fs::read(path).map_err(|e| AssetError::io(*path, e))?;
            let dims = probe_dimensions(&self.probes, &bytes);
            debug!(%name, size = bytes.len(), ?dims, "asset loaded");
            Ok(Prepared {
                name: name.clone(),
                bytes,
                dims,
            })
        };

        #[cfg(feature = "parallel")]
        let prepared = sorted.par_iter().map(load).collect::<Result<Vec<_>>>()?;
        #[cfg(not(feature = "parallel"))]
        let prepared = sorted.iter().map(load).collect::<Result<Vec<_>>>()?;

        self.assemble(prepared)
    }

    /// Bundles in-memory assets, ordering them by [`sort_key`] of their names.
    pub fn build_from_assets(&self, assets: Vec<Asset>) -> Result<Bundle> {
        let mut prepared: Vec<Prepared> = assets
            .into_iter()
            .map(|a| Prepared {
                dims: probe_dimensions(&self.probes, &a.bytes),
                name: a.name,
                bytes: a.bytes,
            })
            .collect();
        prepared.sort_by(|a, b| {
            sort_key(&a.name)
                .cmp(&sort_key(&b.name))
                .then_with(|| a.name.cmp(&b.name))
        });
        self.assemble(prepared)
    }

    fn assemble(&self, prepared: Vec<Prepared>) -> Result<Bundle> {
        if self.max_name_len == 0 {
            return Err(AssetError::InvalidParameter(
                "max_name_len must be at least 1".into(),
            ));
        }
        let total: usize = prepared
            .iter()
            .map(|p| p.bytes.len() + ENTRY_MARKER.len())
            .sum();
        let mut merged_data = Vec::with_capacity(total);
        let mut entries = Vec::with_capacity(prepared.len());
        let mut warnings = Vec::new();
        let mut seen: HashMap<Vec<u8>, String> = HashMap::new();

        for p in prepared {
            let offset = to_u32(merged_data.len(), "merged data")?;
            let size = to_u32(p.bytes.len(), &p.name)?;
            let (width, height) = p.dims.or_zero();
            merged_data.extend_from_slice(&ENTRY_MARKER);
            merged_data.extend_from_slice(&p.bytes);

            let entry = BundleEntry {
                name: p.name,
                offset,
                size,
                width,
                height,
            };
            if entry.name.len() > self.max_name_len {
                let w = BundleWarning::NameTooLong {
                    name: entry.name.clone(),
                    max_name_len: self.max_name_len,
                };
                warn!("{w}");
                warnings.push(w);
            }
            let stored = entry.stored_name(self.max_name_len);
            if let Some(first) = seen.get(&stored) {
                let w = BundleWarning::NameCollision {
                    first: first.clone(),
                    second: entry.name.clone(),
                };
                warn!("{w}");
                warnings.push(w);
            } else {
                seen.insert(stored, entry.name.clone());
            }
            entries.push(entry);
        }

        let mut index_table =
            Vec::with_capacity(entries.len() * (self.max_name_len + RECORD_TAIL_LEN));
        for e in &entries {
            index_table.extend_from_slice(&e.stored_name(self.max_name_len));
            index_table.extend_from_slice(&e.size.to_le_bytes());
            index_table.extend_from_slice(&e.offset.to_le_bytes());
            index_table.extend_from_slice(&e.width.to_le_bytes());
            index_table.extend_from_slice(&e.height.to_le_bytes());
        }
        to_u32(index_table.len() + merged_data.len(), "bundle")?;
        let checksum = checksum16(&[index_table.as_slice(), merged_data.as_slice()]);
        info!(
            files = entries.len(),
            bytes = index_table.len() + merged_data.len(),
            checksum = %format!("0x{checksum:04X}"),
            "bundle assembled"
        );
        Ok(Bundle {
            entries,
            max_name_len: self.max_name_len,
            index_table,
            merged_data,
            checksum,
            warnings,
        })
    }
}

/// Reads and bundles `paths` with the default probes.
pub fn build_bundle(paths: &[PathBuf], max_name_len: usize) -> Result<Bundle> {
    BundleBuilder::new(max_name_len).build_from_paths(paths)
}

struct Prepared {
    name: String,
    bytes: Vec<u8>,
    dims: Dimensions,
}

fn file_name_of(p: &Path) -> String {
    p.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| p.to_string_lossy().into_owned())
}

fn to_u32(v: usize, what: &str) -> Result<u32> {
    u32::try_from(v).map_err(|_| {
        AssetError::InvalidParameter(format!("{what} is {v} bytes, beyond the 32-bit offset range"))
    })
}

/// A finished bundle. Fields are fixed once built; the checksum covers exactly
/// the bytes [`Bundle::to_bytes`] returns.
#[derive(Debug, Clone)]
pub struct Bundle {
    entries: Vec<BundleEntry>,
    max_name_len: usize,
    index_table: Vec<u8>,
    merged_data: Vec<u8>,
    checksum: u16,
    warnings: Vec<BundleWarning>,
}

impl Bundle {
    pub fn entries(&self) -> &[BundleEntry] {
        &self.entries
    }
    pub fn warnings(&self) -> &[BundleWarning] {
        &self.warnings
    }
    pub fn checksum(&self) -> u16 {
        self.checksum
    }
    pub fn max_name_len(&self) -> usize {
        self.max_name_len
    }
    pub fn file_count(&self) -> u32 {
        self.entries.len() as u32
    }
    pub fn index_table(&self) -> &[u8] {
        &self.index_table
    }
    pub fn merged_data(&self) -> &[u8] {
        &self.merged_data
    }
    /// Length of `index_table ++ merged_data`.
    pub fn combined_len(&self) -> u32 {
        (self.index_table.len() + self.merged_data.len()) as u32
    }
    /// Size of the serialized blob.
    pub fn total_len(&self) -> usize {
        BLOB_HEADER_LEN + self.index_table.len() + self.merged_data.len()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.total_len());
        out.extend_from_slice(&self.file_count().to_le_bytes());
        out.extend_from_slice(&(self.checksum as u32).to_le_bytes());
        out.extend_from_slice(&self.combined_len().to_le_bytes());
        out.extend_from_slice(&self.index_table);
        out.extend_from_slice(&self.merged_data);
        out
    }

    /// Writes the blob to `path` atomically and returns its size.
    pub fn write_to(&self, path: &Path) -> Result<u64> {
        let bytes = self.to_bytes();
        write_atomic(path, &bytes)?;
        info!(path = %path.display(), size = bytes.len(), "bundle written");
        Ok(bytes.len() as u64)
    }
}

/// Borrowed, validated view over a serialized bundle.
#[derive(Debug, Clone)]
pub struct BundleView<'a> {
    checksum: u16,
    max_name_len: usize,
    entries: Vec<BundleEntry>,
    /// Index-table names without NUL padding; may end inside a UTF-8 sequence.
    raw_names: Vec<&'a [u8]>,
    merged_data: &'a [u8],
}

impl<'a> BundleView<'a> {
    /// Parses `bytes` and verifies the length, checksum and every entry marker.
    /// Trailing bytes past `combined_len` (partition padding) are ignored.
    pub fn parse(bytes: &'a [u8], max_name_len: usize) -> Result<Self> {
        if bytes.len() < BLOB_HEADER_LEN {
            return Err(AssetError::Malformed(format!(
                "bundle header truncated: {} bytes",
                bytes.len()
            )));
        }
        let file_count = read_u32(bytes, 0) as usize;
        let stored_checksum = read_u32(bytes, 4);
        let combined_len = read_u32(bytes, 8) as usize;
        let combined = bytes
            .get(BLOB_HEADER_LEN..BLOB_HEADER_LEN + combined_len)
            .ok_or_else(|| {
                AssetError::Malformed(format!(
                    "combined length {combined_len} exceeds {} available bytes",
                    bytes.len() - BLOB_HEADER_LEN
                ))
            })?;
        if stored_checksum > u16::MAX as u32 {
            return Err(AssetError::Malformed(format!(
                "checksum field 0x{stored_checksum:08X} has upper bytes set"
            )));
        }
        let actual = checksum16(&[combined]);
        if actual as u32 != stored_checksum {
            return Err(AssetError::Malformed(format!(
                "checksum mismatch: stored 0x{stored_checksum:04X}, computed 0x{actual:04X}"
            )));
        }

        let record_len = max_name_len + RECORD_TAIL_LEN;
        let index_len = file_count
            .checked_mul(record_len)
            .filter(|&l| l <= combined.len())
            .ok_or_else(|| {
                AssetError::Malformed(format!(
                    "{file_count} records of {record_len} bytes do not fit in {} bytes",
                    combined.len()
                ))
            })?;
        let (index, merged_data) = combined.split_at(index_len);

        let mut entries = Vec::with_capacity(file_count);
        let mut raw_names = Vec::with_capacity(file_count);
        for record in index.chunks_exact(record_len) {
            let (name, tail) = record.split_at(max_name_len);
            let name_end = name.iter().position(|&b| b == 0).unwrap_or(name.len());
            let raw_name = &name[..name_end];
            let entry = BundleEntry {
                name: String::from_utf8_lossy(raw_name).into_owned(),
                size: read_u32(tail, 0),
                offset: read_u32(tail, 4),
                width: read_u16(tail, 8),
                height: read_u16(tail, 10),
            };
            let start = entry.offset as usize;
            let end = start + ENTRY_MARKER.len() + entry.size as usize;
            match merged_data.get(start..end) {
                Some(region) if region[..2] == ENTRY_MARKER => {}
                Some(_) => {
                    return Err(AssetError::Malformed(format!(
                        "entry {:?} at offset {start} lacks the 5A5A marker",
                        entry.name
                    )));
                }
                None => {
                    return Err(AssetError::Malformed(format!(
                        "entry {:?} spans {start}..{end} beyond {} data bytes",
                        entry.name,
                        merged_data.len()
                    )));
                }
            }
            entries.push(entry);
            raw_names.push(raw_name);
        }
        Ok(Self {
            checksum: actual,
            max_name_len,
            entries,
            raw_names,
            merged_data,
        })
    }

    pub fn checksum(&self) -> u16 {
        self.checksum
    }
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
    pub fn entries(&self) -> &[BundleEntry] {
        &self.entries
    }

    /// File content of entry `index`, marker excluded.
    pub fn data(&self, index: usize) -> Option<&'a [u8]> {
        let e = self.entries.get(index)?;
        let start = e.offset as usize + ENTRY_MARKER.len();
        self.merged_data.get(start..start + e.size as usize)
    }

    /// Index of the first entry whose stored name matches `name` (truncated the same way).
    /// Compares raw index bytes, so names cut inside a multi-byte character still match.
    pub fn find(&self, name: &str) -> Option<usize> {
        let bytes = name.as_bytes();
        let wanted = &bytes[..bytes.len().min(self.max_name_len)];
        self.raw_names.iter().position(|&raw| raw == wanted)
    }
}

fn read_u32(b: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
}

fn read_u16(b: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([b[at], b[at + 1]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_key_splits_last_extension() {
        assert_eq!(sort_key("a.tar.gz"), (".gz".into(), "a.tar".into()));
        assert_eq!(sort_key("README"), (String::new(), "README".into()));
        assert_eq!(sort_key("a."), (".".into(), "a".into()));
    }

    #[test]
    fn checksum_wraps_at_16_bits() {
        let data = vec![0xFFu8; 300];
        assert_eq!(checksum16(&[data.as_slice()]), ((300u32 * 255) % 65536) as u16);
    }

    #[test]
    fn files_without_extension_sort_first() {
        let b = BundleBuilder::new(8)
            .build_from_assets(vec![
                Asset {
                    name: "a.png".into(),
                    bytes: vec![1],
                },
                Asset {
                    name: "z".into(),
                    bytes: vec![2],
                },
                Asset {
                    name: "b.bin".into(),
                    bytes: vec![3],
                },
            ])
            .unwrap();
        let names: Vec<&str> = b.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["z", "b.bin", "a.png"]);
    }

    #[test]
    fn trailing_dot_sorts_after_extensionless() {
        let b = BundleBuilder::new(8)
            .build_from_assets(
                ["b.bin", "a.", "z"]
                    .into_iter()
                    .map(|n| Asset {
                        name: n.into(),
                        bytes: vec![0],
                    })
                    .collect(),
            )
            .unwrap();
        let names: Vec<&str> = b.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["z", "a.", "b.bin"]);
    }
}
