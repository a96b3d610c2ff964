//! Tunables for image recompression and document cleanup.

use crate::error::ImageError;
use image::imageops::FilterType;

/// Settings for recompressing a single image
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecompressConfig {
    /// JPEG quality (1-100)
    pub quality: u8,
    /// Longest allowed edge in pixels; larger images are scaled down to it
    pub max_dimension: u32,
    /// Resampling filter used when shrinking
    pub filter: FilterType,
}

impl Default for RecompressConfig {
    fn default() -> Self {
        ImagePreset::Moderate.recompress_config()
    }
}

impl RecompressConfig {
    pub fn validate(&self) -> Result<(), ImageError> {
        if self.quality == 0 || self.quality > 100 {
            return Err(ImageError::InvalidQuality(self.quality));
        }
        if self.max_dimension == 0 {
            return Err(ImageError::InvalidMaxDimension);
        }
        Ok(())
    }
}

/// Whole-document cleanup applied when saving
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cleanup {
    /// Drop objects no longer reachable from the trailer
    pub prune_unreferenced: bool,
    /// Merge byte-identical image streams into one object
    pub coalesce_duplicates: bool,
    /// Flate-compress streams that carry no filter yet
    pub compress_streams: bool,
}

impl Cleanup {
    pub fn full() -> Self {
        Self {
            prune_unreferenced: true,
            coalesce_duplicates: true,
            compress_streams: true,
        }
    }

    pub fn none() -> Self {
        Self {
            prune_unreferenced: false,
            coalesce_duplicates: false,
            compress_streams: false,
        }
    }
}

impl Default for Cleanup {
    fn default() -> Self {
        Self::full()
    }
}

/// Named policies for the image strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImagePreset {
    /// Quality 75, longest edge 1500 px
    #[default]
    Moderate,
    /// Quality 60, longest edge 1200 px
    Robust,
}

impl ImagePreset {
    pub fn recompress_config(self) -> RecompressConfig {
        match self {
            ImagePreset::Moderate => RecompressConfig {
                quality: 75,
                max_dimension: 1500,
                filter: FilterType::Lanczos3,
            },
            ImagePreset::Robust => RecompressConfig {
                quality: 60,
                max_dimension: 1200,
                filter: FilterType::Lanczos3,
            },
        }
    }
}

/// Options for the per-image document pass
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ShrinkOptions {
    pub recompress: RecompressConfig,
    pub cleanup: Cleanup,
}

impl From<ImagePreset> for ShrinkOptions {
    fn from(preset: ImagePreset) -> Self {
        Self {
            recompress: preset.recompress_config(),
            cleanup: Cleanup::full(),
        }
    }
}
