use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while loading samples, training or
/// reading back a cascade. Training itself never recovers internally;
/// errors travel up to the caller.
#[derive(Debug, Error)]
pub enum Error {
    #[error("bitmap of {len} pixels cannot be {width}x{height}")]
    BitmapSize {
        len: usize,
        width: usize,
        height: usize,
    },

    #[error(
        "sample {}: expected {}x{}, got {}x{}",
        .path.display(), .expected.0, .expected.1, .actual.0, .actual.1
    )]
    SampleSizeMismatch {
        path: PathBuf,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error(
        "negative {}: {}x{} is smaller than the {}x{} window",
        .path.display(), .actual.0, .actual.1, .window.0, .window.1
    )]
    NegativeTooSmall {
        path: PathBuf,
        actual: (usize, usize),
        window: (usize, usize),
    },

    #[error(
        "positive samples are {}x{} but the cascade window is {}x{}",
        .actual.0, .actual.1, .expected.0, .expected.1
    )]
    WindowMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("feature values contain NaN")]
    NanValue,

    #[error("window admits no Haar features")]
    NoFeatures,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("image: {0}")]
    Image(#[from] image::ImageError),

    #[error("cascade: {0}")]
    Json(#[from] serde_json::Error),
}
