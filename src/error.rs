use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeatPlotError {
    #[error("{0}")]
    Error(String),
    #[error("unsupported element size {0}, size must be 4 or 8")]
    UnsupportedEncoding(u64),
    #[error("truncated input: expected {expected} bytes, found {found}")]
    TruncatedInput { expected: u64, found: u64 },
    #[error("invalid shape: expected {expected} values, found {found}")]
    InvalidShape { expected: usize, found: usize },
    #[error("cannot render an empty matrix ({num_frames} frames x {feature_dim} dims)")]
    EmptyMatrix { num_frames: u32, feature_dim: u32 },
    #[error("invalid scale {0}: must be at least 1 and keep the image within the pixel limit")]
    InvalidScale(u32),

    #[error(transparent)]
    ImageImageError(#[from] image::ImageError),
    #[error(transparent)]
    StdIOError(#[from] std::io::Error),
}

impl FeatPlotError {
    pub fn new<S: ToString>(err: S) -> Self {
        FeatPlotError::Error(err.to_string())
    }
}

pub type FeatPlotResult<T> = Result<T, FeatPlotError>;
