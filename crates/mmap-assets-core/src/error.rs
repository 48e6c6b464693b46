use std::path::PathBuf;
use thiserror::Error;

/// Boxed error returned by external strip encoders.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Invalid container geometry: {0}")]
    InvalidGeometry(String),
    #[error("Strip {strip} failed to encode: {source}")]
    EncodingFailure {
        strip: usize,
        #[source]
        source: BoxError,
    },
    #[error(
        "Partition too small: bundle is {actual} bytes, budget is {budget} bytes (recommended {recommended_kib}K)"
    )]
    PartitionTooSmall {
        actual: u64,
        budget: u64,
        recommended_kib: u64,
    },
    #[error("Malformed data: {0}")]
    Malformed(String),
    #[error("Invalid config: {0}")]
    Config(String),
}

impl AssetError {
    /// Wraps an `io::Error` with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AssetError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, AssetError>;
