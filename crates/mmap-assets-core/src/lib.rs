//! Core library for building flashable asset bundles.
//!
//! - Containers: images split into horizontal strips, each strip encoded on its own (SJPG/SPNG/SQOI)
//! - Bundles: many files merged into one blob with a fixed-width index table and a 16-bit checksum
//! - Reference header: a C enumeration mapping asset names to bundle indices
//! - Pipeline: `run_pipeline` stages an asset directory, bundles it and checks the partition budget
//!
//! Quick example:
//! ```ignore
//! use mmap_assets_core::prelude::*;
//! # fn main() -> mmap_assets_core::Result<()> {
//! let img = image::open("splash.png")?;
//! let out = split_image(&img, 32, StripEncoding::Jpeg, &ImageStripEncoder::default())?;
//! std::fs::write("splash.sjpg", out.to_bytes()?).unwrap();
//!
//! let bundle = build_bundle(&["splash.sjpg".into(), "font.bin".into()], 32)?;
//! bundle.write_to("assets.bin".as_ref())?;
//! println!("{}", emit_reference_header(&bundle, "assets", None));
//! # Ok(()) }
//! ```

pub mod bundle;
pub mod config;
pub mod container;
pub mod error;
pub mod export;
pub mod header;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod probe;
pub mod splitter;

pub use bundle::*;
pub use config::*;
pub use container::{Container, decode_dimensions, probe_encoding};
pub use error::*;
pub use export::*;
pub use header::*;
pub use model::*;
pub use pipeline::*;
pub use probe::*;
pub use splitter::*;

/// Convenience prelude for common types and functions.
/// Importing `mmap_assets_core::prelude::*` brings the primary APIs into scope.
pub mod prelude {
    pub use crate::bundle::{Asset, Bundle, BundleBuilder, BundleView, build_bundle};
    pub use crate::config::{PipelineConfig, PipelineConfigBuilder, StripEncoding};
    pub use crate::container::{Container, decode_dimensions, probe_encoding};
    pub use crate::header::emit_reference_header;
    pub use crate::model::{BundleEntry, BundleWarning, Dimensions};
    pub use crate::pipeline::{check_partition, run_pipeline};
    pub use crate::splitter::{ImageStripEncoder, SplitOutput, StripEncoder, split_image};
    pub use crate::{AssetError, Result};
}
