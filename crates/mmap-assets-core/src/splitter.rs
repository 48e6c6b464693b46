use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::qoi::QoiEncoder;
use image::{DynamicImage, GenericImageView, ImageReader};
use tracing::{debug, instrument};

use crate::config::StripEncoding;
use crate::container::{Container, strip_rows};
use crate::error::{AssetError, BoxError, Result};
use crate::output::write_atomic;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Compresses one strip of pixels. Implementations must be pure: the same
/// pixels and encoding always give the same bytes.
pub trait StripEncoder: Send + Sync {
    fn encode_strip(
        &self,
        strip: &DynamicImage,
        encoding: StripEncoding,
    ) -> std::result::Result<Vec<u8>, BoxError>;
}

/// Strip encoder backed by the `image` crate codecs.
#[derive(Debug, Clone, Copy)]
pub struct ImageStripEncoder {
    pub jpeg_quality: u8,
}

impl Default for ImageStripEncoder {
    fn default() -> Self {
        Self { jpeg_quality: 100 }
    }
}

impl StripEncoder for ImageStripEncoder {
    fn encode_strip(
        &self,
        strip: &DynamicImage,
        encoding: StripEncoding,
    ) -> std::result::Result<Vec<u8>, BoxError> {
        let mut buf = Vec::new();
        match encoding {
            // JPEG has no alpha channel
            StripEncoding::Jpeg => DynamicImage::ImageRgb8(strip.to_rgb8())
                .write_with_encoder(JpegEncoder::new_with_quality(&mut buf, self.jpeg_quality))?,
            StripEncoding::Png => strip.write_with_encoder(PngEncoder::new(&mut buf))?,
            StripEncoding::Qoi => DynamicImage::ImageRgba8(strip.to_rgba8())
                .write_with_encoder(QoiEncoder::new(&mut buf))?,
        }
        Ok(buf)
    }
}

/// Result of splitting one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitOutput {
    /// Header, strip table and payloads.
    Tiled(Container),
    /// A single QOI strip stored as a plain `.qoi` file with no container header.
    Headerless {
        encoding: StripEncoding,
        payload: Vec<u8>,
    },
}

impl SplitOutput {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            SplitOutput::Tiled(c) => c.encode(),
            SplitOutput::Headerless { payload, .. } => Ok(payload.clone()),
        }
    }

    /// File suffix the output is stored under.
    pub fn extension(&self) -> &'static str {
        match self {
            SplitOutput::Tiled(c) => c.encoding.container_extension(),
            SplitOutput::Headerless { encoding, .. } => encoding.strip_extension(),
        }
    }

    pub fn strip_count(&self) -> usize {
        match self {
            SplitOutput::Tiled(c) => c.strip_count as usize,
            SplitOutput::Headerless { .. } => 1,
        }
    }
}

/// Number of strips for `height` rows cut every `strip_height` rows.
pub fn strip_count(height: u32, strip_height: u32) -> u32 {
    if strip_height == 0 {
        1
    } else {
        height.div_ceil(strip_height)
    }
}

#[instrument(skip(image, encoder))]
/// Cuts `image` into horizontal strips of `strip_height` rows, encodes each with
/// `encoder`, and assembles the container.
///
/// Notes:
/// - `strip_height` must be positive; zero is rejected before any encoding.
/// - The last strip covers the remaining rows and may be shorter.
/// - Any strip failure aborts the whole image.
/// - A single QOI strip yields [`SplitOutput::Headerless`].
pub fn split_image(
    image: &DynamicImage,
    strip_height: u32,
    encoding: StripEncoding,
    encoder: &dyn StripEncoder,
) -> Result<SplitOutput> {
    if strip_height == 0 {
        return Err(AssetError::InvalidParameter(
            "strip height must be a positive integer".into(),
        ));
    }
    let (width, height) = image.dimensions();
    let (w16, h16, sh16) = match (
        u16::try_from(width),
        u16::try_from(height),
        u16::try_from(strip_height),
    ) {
        (Ok(w), Ok(h), Ok(s)) => (w, h, s),
        _ => {
            return Err(AssetError::InvalidParameter(format!(
                "{width}x{height} with strip height {strip_height} does not fit 16-bit header fields"
            )));
        }
    };

    let count = strip_count(height, strip_height);
    debug!(width, height, count, "splitting image");

    let encode_one = |i: u32| -> Result<Vec<u8>> {
        let rows = strip_rows(height, strip_height, count, i);
        let strip = image.crop_imm(0, rows.start, width, rows.end - rows.start);
        encoder
            .encode_strip(&strip, encoding)
            .map_err(|source| AssetError::EncodingFailure {
                strip: i as usize,
                source,
            })
    };

    #[cfg(feature = "parallel")]
    let strips: Vec<Vec<u8>> = (0..count)
        .into_par_iter()
        .map(encode_one)
        .collect::<Result<Vec<_>>>()?;
    #[cfg(not(feature = "parallel"))]
    let strips: Vec<Vec<u8>> = (0..count).map(encode_one).collect::<Result<Vec<_>>>()?;

    if strips.len() == 1 && encoding == StripEncoding::Qoi {
        let payload = strips.into_iter().next().unwrap_or_default();
        return Ok(SplitOutput::Headerless { encoding, payload });
    }
    let container = Container::from_strips(encoding, w16, h16, sh16, &strips)?;
    Ok(SplitOutput::Tiled(container))
}

#[instrument(skip_all, fields(src = %src.display()))]
/// Decodes `src`, splits it and writes `<out_dir>/<stem>.<ext>`.
///
/// `strip_height = None` keeps the image whole (one strip as tall as the image).
/// The output file is written only after every strip encoded successfully.
pub fn split_file(
    src: &Path,
    out_dir: &Path,
    strip_height: Option<u16>,
    encoding: StripEncoding,
    encoder: &dyn StripEncoder,
) -> Result<PathBuf> {
    if strip_height == Some(0) {
        return Err(AssetError::InvalidParameter(
            "strip height must be a positive integer".into(),
        ));
    }
    let image = ImageReader::open(src)
        .map_err(|e| AssetError::io(src, e))?
        .with_guessed_format()
        .map_err(|e| AssetError::io(src, e))?
        .decode()?;
    let rows = match strip_height {
        Some(h) => h as u32,
        None => image.height().max(1),
    };
    let out = split_image(&image, rows, encoding, encoder)?;

    let stem = src
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".into());
    let dest = out_dir.join(format!("{stem}.{}", out.extension()));
    write_atomic(&dest, &out.to_bytes()?)?;
    debug!(dest = %dest.display(), strips = out.strip_count(), "container written");
    Ok(dest)
}
