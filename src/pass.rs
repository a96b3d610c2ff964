//! The per-image replacement pass over a whole document.

use crate::config::ShrinkOptions;
use crate::document::PdfDocument;
use crate::error::{Error, Result};
use crate::recompress::{JpegRecompressor, Recompressor};
use lopdf::ObjectId;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Counters for one document pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShrinkReport {
    pub pages: usize,
    /// Image references seen across all pages, repeats included
    pub image_references: usize,
    pub unique_images: usize,
    /// Images whose stream was replaced
    pub optimized: usize,
    /// Recompressed fine but was not smaller; original kept
    pub not_smaller: usize,
    /// Could not be extracted, decoded or encoded; original kept
    pub failed: usize,
    /// Stored bytes of the replaced images before replacement
    pub bytes_before: usize,
    /// Stored bytes of the replaced images after replacement
    pub bytes_after: usize,
}

impl ShrinkReport {
    /// Images left untouched for any reason
    pub fn skipped(&self) -> usize {
        self.not_smaller + self.failed
    }
}

/// Input and output file sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileReport {
    pub input_bytes: u64,
    pub output_bytes: u64,
}

impl FileReport {
    pub fn from_paths(input: &Path, output: &Path) -> Result<Self> {
        Ok(Self {
            input_bytes: fs::metadata(input)?.len(),
            output_bytes: fs::metadata(output)?.len(),
        })
    }

    /// Output size as a fraction of the input size
    pub fn ratio(&self) -> f64 {
        if self.input_bytes == 0 {
            return 1.0;
        }
        self.output_bytes as f64 / self.input_bytes as f64
    }
}

/// Result of shrinking a file with the image strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShrinkOutcome {
    pub images: ShrinkReport,
    pub file: FileReport,
}

/// Recompress every image reachable from the document's pages.
///
/// Each image object is handed to the recompressor at most once, however
/// many pages use it, and its stream is only replaced when the result is
/// strictly smaller than what is stored. Per-image failures are counted
/// and never abort the pass.
pub fn shrink_document<R: Recompressor + ?Sized>(
    doc: &mut PdfDocument,
    recompressor: &R,
) -> ShrinkReport {
    let mut report = ShrinkReport::default();
    let mut visited: HashSet<ObjectId> = HashSet::new();

    for (page_number, page_id) in doc.pages() {
        report.pages += 1;
        let images = doc.page_images(page_id);
        if images.is_empty() {
            continue;
        }
        log::info!("Scanning page {} ({} images)", page_number, images.len());

        for id in images {
            report.image_references += 1;
            if !visited.insert(id) {
                continue;
            }
            report.unique_images += 1;
            process_image(doc, recompressor, id, &mut report);
        }
    }

    report
}

fn process_image<R: Recompressor + ?Sized>(
    doc: &mut PdfDocument,
    recompressor: &R,
    id: ObjectId,
    report: &mut ShrinkReport,
) {
    let image = match doc.embedded_image(id) {
        Ok(image) => image,
        Err(e) => {
            log::warn!("Image {:?}: could not extract: {}", id, e);
            report.failed += 1;
            return;
        }
    };
    let original_len = image.data.len();

    let jpeg = match recompressor.recompress(&image) {
        Ok(jpeg) => jpeg,
        Err(e) => {
            log::warn!("Image {:?}: skipped, {}", id, e);
            report.failed += 1;
            return;
        }
    };

    if jpeg.data.len() >= original_len {
        log::debug!(
            "Image {:?}: kept original ({} bytes, recompressed {} bytes)",
            id,
            original_len,
            jpeg.data.len()
        );
        report.not_smaller += 1;
        return;
    }

    match doc.replace_image(id, &jpeg) {
        Ok(()) => {
            log::debug!(
                "Image {:?}: {:.1}KB -> {:.1}KB ({}x{})",
                id,
                original_len as f64 / 1024.0,
                jpeg.data.len() as f64 / 1024.0,
                jpeg.width,
                jpeg.height
            );
            report.optimized += 1;
            report.bytes_before += original_len;
            report.bytes_after += jpeg.data.len();
        }
        Err(e) => {
            log::warn!("Image {:?}: could not replace stream: {}", id, e);
            report.failed += 1;
        }
    }
}

/// Shrink `input` into a new file at `output` using the image strategy
pub fn shrink_file(input: &Path, output: &Path, options: &ShrinkOptions) -> Result<ShrinkOutcome> {
    options.recompress.validate()?;
    ensure_distinct(input, output)?;

    let mut doc = PdfDocument::load(input)?;
    let recompressor = JpegRecompressor::new(options.recompress);
    let images = shrink_document(&mut doc, &recompressor);

    doc.save_with_cleanup(output, &options.cleanup)?;
    let file = FileReport::from_paths(input, output)?;

    Ok(ShrinkOutcome { images, file })
}

/// Refuse to overwrite the input
pub fn ensure_distinct(input: &Path, output: &Path) -> Result<()> {
    if !input.exists() {
        return Err(Error::FileNotFound(input.to_path_buf()));
    }
    let same = match (fs::canonicalize(input), fs::canonicalize(output)) {
        (Ok(a), Ok(b)) => a == b,
        _ => input == output,
    };
    if same {
        return Err(Error::SameInputOutput(output.to_path_buf()));
    }
    Ok(())
}
