//! Export error type.

use thiserror::Error;

/// Errors that can occur while exporting a snapshot.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Unknown post-processing filter: {0}")]
    UnknownFilter(String),

    #[error("Cannot export an empty {width}x{height} image")]
    EmptyImage { width: u32, height: u32 },

    #[error("Pixel data has {actual} values, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),
}

pub type ExportResult<T> = Result<T, ExportError>;
