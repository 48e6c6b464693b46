use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{AssetError, Result};

/// Codec used for every strip of a tiled container.
/// Selects the container magic tag and the suffixes used on disk.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StripEncoding {
    Jpeg,
    Png,
    Qoi,
}

impl StripEncoding {
    pub const ALL: [StripEncoding; 3] = [Self::Jpeg, Self::Png, Self::Qoi];

    /// 8-byte tag at the start of a headered container (7 ASCII chars + NUL).
    pub fn magic(self) -> [u8; 8] {
        match self {
            Self::Jpeg => *b"_SJPG__\0",
            Self::Png => *b"_SPNG__\0",
            Self::Qoi => *b"_SQOI__\0",
        }
    }

    /// Suffix of a headered container file.
    pub fn container_extension(self) -> &'static str {
        match self {
            Self::Jpeg => "sjpg",
            Self::Png => "spng",
            Self::Qoi => "sqoi",
        }
    }

    /// Suffix of a single encoded strip (and of the headerless QOI variant).
    pub fn strip_extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Qoi => "qoi",
        }
    }

    pub fn image_format(self) -> image::ImageFormat {
        match self {
            Self::Jpeg => image::ImageFormat::Jpeg,
            Self::Png => image::ImageFormat::Png,
            Self::Qoi => image::ImageFormat::Qoi,
        }
    }
}

impl FromStr for StripEncoding {
    type Err = ();
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" | "sjpg" => Ok(Self::Jpeg),
            "png" | "spng" => Ok(Self::Png),
            "qoi" | "sqoi" => Ok(Self::Qoi),
            _ => Err(()),
        }
    }
}

/// Settings for one asset build: staging, splitting, bundling and the partition budget.
/// Field names follow the asset-config JSON emitted by the firmware build; `main_path`
/// and `assets_size` are accepted as aliases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory holding the source assets.
    pub assets_path: PathBuf,
    /// Output path of the merged blob.
    pub image_file: PathBuf,
    /// Directory receiving the generated reference header.
    #[serde(alias = "main_path")]
    pub header_dir: PathBuf,
    /// Directory the assets are copied and converted into before bundling.
    /// Defaults to `<image_file dir>/staging`. Cleaned at the start of every run.
    #[serde(default)]
    pub staging_dir: Option<PathBuf>,
    /// Flash partition budget in bytes. `None` skips the size check.
    #[serde(
        default,
        alias = "assets_size",
        deserialize_with = "deserialize_partition_size"
    )]
    pub partition_size: Option<u64>,
    /// Fixed width of every name in the index table.
    #[serde(default = "default_name_length")]
    pub name_length: usize,
    /// Strip height in rows. `None` keeps every image as a single strip.
    #[serde(default)]
    pub split_height: Option<i64>,
    /// File suffixes (without the dot) copied into the bundle.
    #[serde(
        default = "default_support_format",
        deserialize_with = "deserialize_format_list"
    )]
    pub support_format: Vec<String>,
    #[serde(default)]
    pub support_spng: bool,
    #[serde(default)]
    pub support_sjpg: bool,
    #[serde(default)]
    pub support_qoi: bool,
    /// Accepted for compatibility with the firmware asset config and logged at
    /// staging time. QOI conversion, tiled or not, is governed by `support_qoi`.
    #[serde(default)]
    pub support_sqoi: bool,
    /// Include line written into the reference header; `None` omits it.
    #[serde(default = "default_header_include")]
    pub header_include: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            assets_path: PathBuf::from("assets"),
            image_file: PathBuf::from("build/assets.bin"),
            header_dir: PathBuf::from("main"),
            staging_dir: None,
            partition_size: None,
            name_length: default_name_length(),
            split_height: None,
            support_format: default_support_format(),
            support_spng: false,
            support_sjpg: false,
            support_qoi: false,
            support_sqoi: false,
            header_include: default_header_include(),
        }
    }
}

impl PipelineConfig {
    /// Validates the configuration before any file is touched.
    ///
    /// Returns an error if:
    /// - `split_height` is present but not a positive row count that fits in u16
    /// - `name_length` is zero
    /// - no suffix is listed in `support_format`
    pub fn validate(&self) -> Result<()> {
        self.strip_height()?;
        if self.name_length == 0 {
            return Err(AssetError::InvalidParameter(
                "name_length must be at least 1".into(),
            ));
        }
        if self.support_format.is_empty() {
            return Err(AssetError::Config("support_format is empty".into()));
        }
        Ok(())
    }

    /// Strip height requested by the config, checked for range.
    pub fn strip_height(&self) -> Result<Option<u16>> {
        checked_strip_height(self.split_height)
    }

    pub fn staging_dir(&self) -> PathBuf {
        match &self.staging_dir {
            Some(dir) => dir.clone(),
            None => self
                .image_file
                .parent()
                .unwrap_or_else(|| Path::new("."))
                .join("staging"),
        }
    }

    /// Symbol used in the reference header, taken from the assets directory name.
    pub fn bundle_symbol(&self) -> String {
        self.assets_path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "assets".into())
    }

    /// Target encoding for a staged file, or `None` to copy it untouched.
    /// Dedicated SJPG/SPNG switches win over the generic QOI switch.
    pub fn conversion_for(&self, path: &Path) -> Option<StripEncoding> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" if self.support_sjpg => Some(StripEncoding::Jpeg),
            "png" if self.support_spng => Some(StripEncoding::Png),
            "jpg" | "jpeg" | "png" if self.support_qoi => Some(StripEncoding::Qoi),
            _ => None,
        }
    }

    /// True if the file name ends with one of the supported suffixes.
    pub fn is_supported(&self, path: &Path) -> bool {
        let name = match path.file_name().and_then(|s| s.to_str()) {
            Some(n) => n,
            None => return false,
        };
        self.support_format
            .iter()
            .any(|suffix| name.ends_with(&format!(".{}", suffix.trim_start_matches('.'))))
    }

    /// Create a fluent builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::new()
    }
}

/// Range-checks a user supplied strip height; `None` means "do not split".
pub fn checked_strip_height(height: Option<i64>) -> Result<Option<u16>> {
    match height {
        None => Ok(None),
        Some(h) if h <= 0 => Err(AssetError::InvalidParameter(format!(
            "split_height must be a positive integer, got {h}"
        ))),
        Some(h) => u16::try_from(h).map(Some).map_err(|_| {
            AssetError::InvalidParameter(format!("split_height {h} exceeds {}", u16::MAX))
        }),
    }
}

fn default_name_length() -> usize {
    32
}
fn default_support_format() -> Vec<String> {
    vec!["png".into(), "jpg".into()]
}
fn default_header_include() -> Option<String> {
    Some("esp_mmap_assets.h".into())
}

/// Accepts `"0x100000"`, `"1048576"` or a bare integer.
fn deserialize_partition_size<'de, D>(de: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(u64),
        Text(String),
    }
    match Option::<Raw>::deserialize(de)? {
        None => Ok(None),
        Some(Raw::Int(v)) => Ok(Some(v)),
        Some(Raw::Text(s)) => parse_size(&s).map(Some).map_err(serde::de::Error::custom),
    }
}

/// Accepts a list of suffixes or one comma-separated string.
fn deserialize_format_list<'de, D>(de: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        Text(String),
    }
    let list = match Raw::deserialize(de)? {
        Raw::List(v) => v,
        Raw::Text(s) => s.split(',').map(str::to_string).collect(),
    };
    Ok(list
        .into_iter()
        .map(|s| s.trim().trim_start_matches('.').to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

/// Parses a byte count written in hex (`0x...`) or decimal.
pub fn parse_size(s: &str) -> std::result::Result<u64, String> {
    let t = s.trim();
    let parsed = match t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => t.parse::<u64>(),
    };
    parsed.map_err(|e| format!("invalid size {s:?}: {e}"))
}

/// Builder for `PipelineConfig` for ergonomic construction.
#[derive(Debug, Default, Clone)]
pub struct PipelineConfigBuilder {
    cfg: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn new() -> Self {
        Self {
            cfg: PipelineConfig::default(),
        }
    }
    pub fn assets_path(mut self, v: impl Into<PathBuf>) -> Self {
        self.cfg.assets_path = v.into();
        self
    }
    pub fn image_file(mut self, v: impl Into<PathBuf>) -> Self {
        self.cfg.image_file = v.into();
        self
    }
    pub fn header_dir(mut self, v: impl Into<PathBuf>) -> Self {
        self.cfg.header_dir = v.into();
        self
    }
    pub fn staging_dir(mut self, v: impl Into<PathBuf>) -> Self {
        self.cfg.staging_dir = Some(v.into());
        self
    }
    pub fn partition_size(mut self, v: Option<u64>) -> Self {
        self.cfg.partition_size = v;
        self
    }
    pub fn name_length(mut self, v: usize) -> Self {
        self.cfg.name_length = v;
        self
    }
    pub fn split_height(mut self, v: Option<i64>) -> Self {
        self.cfg.split_height = v;
        self
    }
    pub fn support_format<I, S>(mut self, v: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cfg.support_format = v.into_iter().map(Into::into).collect();
        self
    }
    pub fn sjpg(mut self, v: bool) -> Self {
        self.cfg.support_sjpg = v;
        self
    }
    pub fn spng(mut self, v: bool) -> Self {
        self.cfg.support_spng = v;
        self
    }
    pub fn qoi(mut self, v: bool) -> Self {
        self.cfg.support_qoi = v;
        self
    }
    pub fn sqoi(mut self, v: bool) -> Self {
        self.cfg.support_sqoi = v;
        self
    }
    pub fn header_include(mut self, v: Option<String>) -> Self {
        self.cfg.header_include = v;
        self
    }
    pub fn build(self) -> PipelineConfig {
        self.cfg
    }
}
