//! Image normalizer/recompressor.
//!
//! Decoded image -> flattened onto white -> scaled down to the maximum edge
//! -> baseline JPEG with 4:2:0 chroma subsampling.

use crate::config::RecompressConfig;
use crate::decode::{decode_embedded, EmbeddedImage};
use crate::error::ImageError;
use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage};

/// A recompressed image ready to be stored as a `DCTDecode` stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JpegImage {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Anything that can turn an embedded image into JPEG bytes.
///
/// The document pass is generic over this so tests can count invocations.
pub trait Recompressor {
    fn recompress(&self, image: &EmbeddedImage) -> Result<JpegImage, ImageError>;
}

/// The standard recompressor
#[derive(Debug, Clone, Default)]
pub struct JpegRecompressor {
    pub config: RecompressConfig,
}

impl JpegRecompressor {
    pub fn new(config: RecompressConfig) -> Self {
        Self { config }
    }
}

impl Recompressor for JpegRecompressor {
    fn recompress(&self, image: &EmbeddedImage) -> Result<JpegImage, ImageError> {
        recompress_embedded(image, &self.config)
    }
}

/// Recompress an embedded PDF image stream
pub fn recompress_embedded(
    image: &EmbeddedImage,
    config: &RecompressConfig,
) -> Result<JpegImage, ImageError> {
    config.validate()?;
    let img = decode_embedded(image)?;
    recompress_image(img, config)
}

/// Recompress an encoded image file (JPEG, PNG, WebP, ...)
pub fn recompress_bytes(bytes: &[u8], config: &RecompressConfig) -> Result<JpegImage, ImageError> {
    config.validate()?;
    let img = image::load_from_memory(bytes).map_err(|e| ImageError::Decode(e.to_string()))?;
    recompress_image(img, config)
}

/// Recompress an already decoded image
pub fn recompress_image(img: DynamicImage, config: &RecompressConfig) -> Result<JpegImage, ImageError> {
    config.validate()?;
    let rgb = flatten_to_rgb(img);
    let rgb = downscale(rgb, config.max_dimension, config.filter);
    encode_jpeg(&rgb, config.quality)
}

/// Composite any alpha over opaque white; convert everything else to RGB8.
///
/// Converting a transparent image straight to RGB would turn transparent
/// pixels black.
pub fn flatten_to_rgb(img: DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.into_rgb8();
    }

    let rgba = img.into_rgba8();
    let (width, height) = rgba.dimensions();
    let mut canvas = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
    for (dst, src) in canvas.pixels_mut().zip(rgba.pixels()) {
        let alpha = src[3] as u32;
        for c in 0..3 {
            dst[c] = ((src[c] as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        }
    }
    canvas
}

/// Dimensions after bounding the longest edge to `max_dimension`.
///
/// Never enlarges. The shorter edge is rounded and kept at least 1 px.
pub fn target_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let larger = width.max(height);
    if larger <= max_dimension || max_dimension == 0 {
        return (width, height);
    }

    let scale = |side: u32| -> u32 {
        let scaled = (side as u64 * max_dimension as u64 + larger as u64 / 2) / larger as u64;
        scaled.max(1) as u32
    };
    if width >= height {
        (max_dimension, scale(height))
    } else {
        (scale(width), max_dimension)
    }
}

fn downscale(rgb: RgbImage, max_dimension: u32, filter: FilterType) -> RgbImage {
    let (width, height) = rgb.dimensions();
    let (target_width, target_height) = target_dimensions(width, height, max_dimension);
    if (target_width, target_height) == (width, height) {
        return rgb;
    }
    log::debug!(
        "Downscaling {}x{} to {}x{}",
        width,
        height,
        target_width,
        target_height
    );
    image::imageops::resize(&rgb, target_width, target_height, filter)
}

fn encode_jpeg(rgb: &RgbImage, quality: u8) -> Result<JpegImage, ImageError> {
    let (width, height) = rgb.dimensions();
    if width > u16::MAX as u32 || height > u16::MAX as u32 {
        return Err(ImageError::Encode(format!(
            "{}x{} exceeds the JPEG size limit",
            width, height
        )));
    }

    let mut jpeg_bytes = Vec::new();
    let mut encoder = jpeg_encoder::Encoder::new(&mut jpeg_bytes, quality);
    encoder.set_sampling_factor(jpeg_encoder::SamplingFactor::R_4_2_0);
    encoder
        .encode(
            rgb.as_raw(),
            width as u16,
            height as u16,
            jpeg_encoder::ColorType::Rgb,
        )
        .map_err(|e| ImageError::Encode(e.to_string()))?;

    Ok(JpegImage {
        data: jpeg_bytes,
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ColorType, GrayAlphaImage, ImageFormat, LumaA, Rgba, RgbaImage};
    use std::io::Cursor;

    fn config(quality: u8, max_dimension: u32) -> RecompressConfig {
        RecompressConfig {
            quality,
            max_dimension,
            filter: FilterType::Lanczos3,
        }
    }

    fn decode_jpeg(data: &[u8]) -> DynamicImage {
        image::load_from_memory_with_format(data, ImageFormat::Jpeg).unwrap()
    }

    fn assert_close(actual: [u8; 3], expected: [u8; 3], tolerance: u8) {
        for (a, e) in actual.iter().zip(expected.iter()) {
            assert!(
                a.abs_diff(*e) <= tolerance,
                "got {:?}, expected {:?} within {}",
                actual,
                expected,
                tolerance
            );
        }
    }

    fn png_bytes(img: &DynamicImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
        bytes
    }

    #[test]
    fn transparent_pixels_become_white_not_black() {
        let rgba = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 0]));
        let flat = flatten_to_rgb(DynamicImage::ImageRgba8(rgba));
        assert!(flat.pixels().all(|p| p.0 == [255, 255, 255]));
    }

    #[test]
    fn partial_alpha_blends_toward_white() {
        let mut rgba = RgbaImage::from_pixel(2, 1, Rgba([0, 0, 0, 255]));
        rgba.put_pixel(1, 0, Rgba([0, 0, 0, 128]));
        let flat = flatten_to_rgb(DynamicImage::ImageRgba8(rgba));
        assert_eq!(flat.get_pixel(0, 0).0, [0, 0, 0]);
        assert_eq!(flat.get_pixel(1, 0).0, [127, 127, 127]);
    }

    #[test]
    fn gray_alpha_is_flattened() {
        let la = GrayAlphaImage::from_pixel(4, 4, LumaA([10, 0]));
        let flat = flatten_to_rgb(DynamicImage::ImageLumaA8(la));
        assert_eq!(flat.get_pixel(3, 3).0, [255, 255, 255]);
    }

    #[test]
    fn target_dimensions_bounds_longest_edge() {
        assert_eq!(target_dimensions(2000, 1000, 1500), (1500, 750));
        assert_eq!(target_dimensions(1000, 3000, 1500), (500, 1500));
        assert_eq!(target_dimensions(1500, 1500, 1500), (1500, 1500));
        assert_eq!(target_dimensions(800, 600, 1500), (800, 600));
        assert_eq!(target_dimensions(10000, 1, 1200), (1200, 1));
        assert_eq!(target_dimensions(1333, 1000, 1200), (1200, 900));
    }

    #[test]
    fn aspect_ratio_is_preserved_within_a_pixel() {
        for (w, h) in [(1999, 1001), (3001, 1777), (1501, 13), (640, 4096)] {
            let (tw, th) = target_dimensions(w, h, 1500);
            assert_eq!(tw.max(th), 1500);
            let expected_short = (w.min(h) as f64) * 1500.0 / (w.max(h) as f64);
            assert!((tw.min(th) as f64 - expected_short).abs() <= 1.0);
        }
    }

    #[test]
    fn opaque_rgb_stays_opaque_and_valid() {
        let rgb = RgbImage::from_fn(64, 48, |x, y| Rgb([x as u8 * 4, y as u8 * 5, 128]));
        let out = recompress_image(DynamicImage::ImageRgb8(rgb), &config(75, 1500)).unwrap();
        assert_eq!((out.width, out.height), (64, 48));

        let decoded = decode_jpeg(&out.data);
        assert_eq!(decoded.color(), ColorType::Rgb8);
        assert_eq!((decoded.width(), decoded.height()), (64, 48));

        let rgb = decoded.to_rgb8();
        for (x, y) in [(8, 8), (32, 24), (56, 40)] {
            assert_close(rgb.get_pixel(x, y).0, [x as u8 * 4, y as u8 * 5, 128], 16);
        }
    }

    #[test]
    fn solid_colours_survive_encoding() {
        for colour in [[255, 255, 255], [0, 0, 0], [220, 20, 20], [30, 120, 200]] {
            let rgb = RgbImage::from_pixel(64, 64, Rgb(colour));
            let out = recompress_image(DynamicImage::ImageRgb8(rgb), &config(75, 1500)).unwrap();
            let decoded = decode_jpeg(&out.data).to_rgb8();
            assert_close(decoded.get_pixel(0, 0).0, colour, 6);
            assert_close(decoded.get_pixel(40, 33).0, colour, 6);
        }
    }

    #[test]
    fn small_images_keep_their_size() {
        let rgb = RgbImage::from_pixel(1500, 20, Rgb([200, 10, 10]));
        let out = recompress_image(DynamicImage::ImageRgb8(rgb), &config(60, 1500)).unwrap();
        assert_eq!((out.width, out.height), (1500, 20));
    }

    #[test]
    fn transparent_border_scenario() {
        let border = 100;
        let rgba = RgbaImage::from_fn(2000, 1000, |x, y| {
            let inside = x >= border && x < 2000 - border && y >= border && y < 1000 - border;
            if inside {
                Rgba([20, 40, 160, 255])
            } else {
                Rgba([0, 0, 0, 0])
            }
        });
        let png = png_bytes(&DynamicImage::ImageRgba8(rgba));

        let out = recompress_bytes(&png, &config(75, 1500)).unwrap();
        assert_eq!((out.width, out.height), (1500, 750));

        let decoded = decode_jpeg(&out.data);
        assert_eq!(decoded.color(), ColorType::Rgb8);
        let rgb = decoded.to_rgb8();
        for (x, y) in [(0, 0), (1499, 0), (0, 749), (1499, 749), (750, 10)] {
            let p = rgb.get_pixel(x, y).0;
            assert!(p.iter().all(|&c| c >= 245), "pixel ({}, {}) = {:?}", x, y, p);
        }
        let center = rgb.get_pixel(750, 375).0;
        assert!(center[2] > 120 && center[0] < 80);
    }

    #[test]
    fn rerun_on_own_output_keeps_dimensions() {
        let rgb = RgbImage::from_fn(1800, 900, |x, _| Rgb([(x % 256) as u8, 90, 30]));
        let cfg = config(75, 1500);
        let first = recompress_image(DynamicImage::ImageRgb8(rgb), &cfg).unwrap();
        let second = recompress_bytes(&first.data, &cfg).unwrap();
        assert_eq!((first.width, first.height), (1500, 750));
        assert_eq!((second.width, second.height), (1500, 750));
    }

    #[test]
    fn corrupt_bytes_report_failure() {
        let mut png = png_bytes(&DynamicImage::ImageRgb8(RgbImage::new(32, 32)));
        png.truncate(png.len() / 3);
        assert!(matches!(
            recompress_bytes(&png, &config(75, 1500)),
            Err(ImageError::Decode(_))
        ));
        assert!(matches!(
            recompress_bytes(b"garbage", &config(75, 1500)),
            Err(ImageError::Decode(_))
        ));
    }

    #[test]
    fn invalid_quality_is_rejected_before_decoding() {
        assert_eq!(
            recompress_bytes(b"garbage", &config(0, 1500)),
            Err(ImageError::InvalidQuality(0))
        );
    }
}
