//! Error types for the PDF shrinker

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal errors: any of these ends the run without a trusted output file.
#[derive(Error, Debug)]
pub enum Error {
    /// The input PDF could not be opened or parsed
    #[error("Failed to load PDF {}: {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: lopdf::Error,
    },

    /// PDF processing error on an in-memory document
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    /// Writing the output PDF failed
    #[error("Failed to save PDF {}: {message}", path.display())]
    Save { path: PathBuf, message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// File not found
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Output path points at the input file
    #[error("Output path must differ from input path: {}", .0.display())]
    SameInputOutput(PathBuf),

    /// Invalid recompression settings
    #[error(transparent)]
    Image(#[from] ImageError),

    /// No Ghostscript executable could be located
    #[error("Ghostscript executable not found: {0}")]
    GhostscriptNotFound(String),

    /// Ghostscript ran but reported failure
    #[error("Ghostscript failed (exit code {}): {stderr}", code.map_or_else(|| "unknown".to_string(), |c| c.to_string()))]
    GhostscriptFailed { code: Option<i32>, stderr: String },

    /// The external tool reported success but wrote nothing
    #[error("Output file was not created: {}", .0.display())]
    OutputMissing(PathBuf),
}

/// Per-image failures. The document pass recovers from all of these by
/// keeping the original stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    #[error("Quality must be between 1 and 100, got {0}")]
    InvalidQuality(u8),

    #[error("Maximum dimension must be at least 1")]
    InvalidMaxDimension,

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Unsupported image: {0}")]
    Unsupported(String),

    #[error("Failed to encode JPEG: {0}")]
    Encode(String),
}
