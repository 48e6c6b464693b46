use std::io::Cursor;

use image::ImageReader;

use crate::container::decode_dimensions;
use crate::model::Dimensions;

/// One way of recovering image dimensions from file content.
pub trait DimensionProbe: Send + Sync {
    fn name(&self) -> &'static str;
    fn probe(&self, bytes: &[u8]) -> Dimensions;
}

/// Formats the `image` crate can read a header of (PNG, JPEG, QOI, ...).
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeImageProbe;

impl DimensionProbe for NativeImageProbe {
    fn name(&self) -> &'static str {
        "native"
    }

    fn probe(&self, bytes: &[u8]) -> Dimensions {
        let reader = match ImageReader::new(Cursor::new(bytes)).with_guessed_format() {
            Ok(r) if r.format().is_some() => r,
            _ => return Dimensions::Unknown,
        };
        match reader.into_dimensions() {
            Ok((w, h)) => match (u16::try_from(w), u16::try_from(h)) {
                (Ok(width), Ok(height)) => Dimensions::Recognized { width, height },
                _ => Dimensions::Unknown,
            },
            Err(_) => Dimensions::Unknown,
        }
    }
}

/// Headered strip containers (`.sjpg`, `.spng`, `.sqoi`).
#[derive(Debug, Default, Clone, Copy)]
pub struct ContainerProbe;

impl DimensionProbe for ContainerProbe {
    fn name(&self) -> &'static str {
        "container"
    }

    fn probe(&self, bytes: &[u8]) -> Dimensions {
        decode_dimensions(bytes)
    }
}

/// Native decode first, then the container header.
pub fn default_probes() -> Vec<Box<dyn DimensionProbe>> {
    vec![Box::new(NativeImageProbe), Box::new(ContainerProbe)]
}

/// Runs `probes` in order and returns the first recognized result.
pub fn probe_dimensions(probes: &[Box<dyn DimensionProbe>], bytes: &[u8]) -> Dimensions {
    probes
        .iter()
        .map(|p| p.probe(bytes))
        .find(|d| d.is_recognized())
        .unwrap_or(Dimensions::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_bytes_are_unknown() {
        let probes = default_probes();
        assert_eq!(
            probe_dimensions(&probes, b"not an image at all"),
            Dimensions::Unknown
        );
        assert_eq!(probe_dimensions(&probes, &[]), Dimensions::Unknown);
    }
}
