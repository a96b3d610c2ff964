//! PDF Shrinker Library
//!
//! Makes PDFs smaller in one of two ways:
//! - recompress every embedded raster image to JPEG (transparency
//!   flattened onto white, longest edge bounded), replacing a stream only
//!   when the result is smaller, then save with cleanup;
//! - hand the whole file to Ghostscript's `pdfwrite` device.
//!
//! # Example
//!
//! ```no_run
//! use pdf_shrink::{shrink_file, ImagePreset, ShrinkOptions};
//! use std::path::Path;
//!
//! let options = ShrinkOptions::from(ImagePreset::Moderate);
//! let outcome = shrink_file(Path::new("input.pdf"), Path::new("output.pdf"), &options)?;
//! println!("{} images optimized", outcome.images.optimized);
//! # Ok::<(), pdf_shrink::Error>(())
//! ```

pub mod config;
pub mod decode;
pub mod document;
pub mod error;
pub mod ghostscript;
pub mod pass;
pub mod recompress;

pub use config::{Cleanup, ImagePreset, RecompressConfig, ShrinkOptions};
pub use decode::{ColorSpace, EmbeddedImage, ImageFormatInfo};
pub use document::{ImageInfo, PageImages, PdfDocument};
pub use error::{Error, ImageError, Result};
pub use ghostscript::{
    CommandOutput, CommandRunner, DownsampleType, GhostscriptCompressor, GhostscriptConfig,
    GhostscriptPreset, PdfSettings, SystemRunner,
};
pub use pass::{shrink_document, shrink_file, FileReport, ShrinkOutcome, ShrinkReport};
pub use recompress::{
    recompress_bytes, recompress_embedded, recompress_image, JpegImage, JpegRecompressor,
    Recompressor,
};
