//! Decoding of PDF image XObject streams into pixel buffers.
//!
//! Handles unfiltered and Flate-compressed samples (with PNG/TIFF
//! predictors) in gray, RGB, CMYK and indexed colour spaces, plus
//! DCT (JPEG) streams. `/Decode` inversion is applied, and a colour-key
//! `/Mask` becomes an alpha channel. Everything else is reported as unsupported so the
//! caller can leave the image alone.

use crate::error::ImageError;
use flate2::read::ZlibDecoder;
use image::{DynamicImage, GrayAlphaImage, GrayImage, ImageFormat, LumaA, RgbImage};
use lopdf::ObjectId;
use std::io::Read;

/// Colour space of an image XObject, resolved far enough to decode samples
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColorSpace {
    DeviceGray,
    DeviceRGB,
    DeviceCMYK,
    /// Palette image: each sample indexes `lookup`, which holds `hival + 1`
    /// colours in the base space
    Indexed {
        base: Box<ColorSpace>,
        hival: u8,
        lookup: Vec<u8>,
    },
    Other(String),
}

impl ColorSpace {
    /// Number of colour components per sample
    pub fn components(&self) -> Option<usize> {
        match self {
            ColorSpace::DeviceGray => Some(1),
            ColorSpace::DeviceRGB => Some(3),
            ColorSpace::DeviceCMYK => Some(4),
            ColorSpace::Indexed { .. } => Some(1),
            ColorSpace::Other(_) => None,
        }
    }

    pub fn name(&self) -> String {
        match self {
            ColorSpace::DeviceGray => "DeviceGray".to_string(),
            ColorSpace::DeviceRGB => "DeviceRGB".to_string(),
            ColorSpace::DeviceCMYK => "DeviceCMYK".to_string(),
            ColorSpace::Indexed { base, .. } => format!("Indexed({})", base.name()),
            ColorSpace::Other(name) => name.clone(),
        }
    }
}

/// `/DecodeParms` predictor settings for a Flate filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredictorParams {
    /// 1 = none, 2 = TIFF, 10-15 = PNG
    pub predictor: i64,
    pub colors: usize,
    pub bits_per_component: usize,
    pub columns: usize,
}

impl Default for PredictorParams {
    fn default() -> Self {
        Self {
            predictor: 1,
            colors: 1,
            bits_per_component: 8,
            columns: 1,
        }
    }
}

/// Format metadata of an embedded image, as stored in its stream dictionary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFormatInfo {
    pub width: u32,
    pub height: u32,
    pub color_space: Option<ColorSpace>,
    pub bits_per_component: u8,
    /// Filter chain in application order
    pub filters: Vec<String>,
    pub predictor: Option<PredictorParams>,
    /// `/Decode` maps every component from its maximum down to 0
    pub inverted: bool,
    /// Colour-key `/Mask`: one `(min, max)` range of raw sample values per
    /// component. Pixels inside every range are transparent.
    pub color_key: Option<Vec<(u16, u16)>>,
    pub image_mask: bool,
    pub has_smask: bool,
}

/// An image as stored inside the document: still-encoded bytes plus format
#[derive(Debug, Clone)]
pub struct EmbeddedImage {
    pub id: ObjectId,
    pub data: Vec<u8>,
    pub format: ImageFormatInfo,
}

/// Decode an embedded image stream into a pixel buffer
pub fn decode_embedded(image: &EmbeddedImage) -> Result<DynamicImage, ImageError> {
    let format = &image.format;
    if format.image_mask {
        return Err(ImageError::Unsupported("stencil image mask".to_string()));
    }

    let mut data = image.data.clone();
    for (i, filter) in format.filters.iter().enumerate() {
        match filter.as_str() {
            "FlateDecode" | "Fl" => {
                data = inflate(&data)?;
                if let Some(params) = &format.predictor {
                    data = undo_predictor(&data, params)?;
                }
            }
            "DCTDecode" | "DCT" => {
                if i + 1 != format.filters.len() {
                    return Err(ImageError::Unsupported(
                        "DCTDecode followed by another filter".to_string(),
                    ));
                }
                let img = image::load_from_memory_with_format(&data, ImageFormat::Jpeg)
                    .map_err(|e| ImageError::Decode(format!("JPEG stream: {}", e)))?;
                return decoded_jpeg(img, format);
            }
            other => {
                return Err(ImageError::Unsupported(format!("filter {}", other)));
            }
        }
    }

    samples_to_image(&data, format)
}

/// Apply the colour key and `/Decode` inversion to a decoded DCT stream
fn decoded_jpeg(mut img: DynamicImage, format: &ImageFormatInfo) -> Result<DynamicImage, ImageError> {
    let transparent = match &format.color_key {
        Some(key) => {
            let (samples, components) = match &img {
                DynamicImage::ImageLuma8(gray) => (gray.as_raw().as_slice(), 1),
                DynamicImage::ImageRgb8(rgb) => (rgb.as_raw().as_slice(), 3),
                _ => {
                    return Err(ImageError::Unsupported(
                        "colour-key mask on this JPEG layout".to_string(),
                    ))
                }
            };
            Some(color_key_mask(samples, components, key, 8)?)
        }
        None => None,
    };
    if format.inverted {
        img.invert();
    }
    Ok(match transparent {
        Some(mask) => with_alpha(img, &mask),
        None => img,
    })
}

fn inflate(data: &[u8]) -> Result<Vec<u8>, ImageError> {
    let mut decoder = ZlibDecoder::new(data);
    let mut decoded = Vec::new();
    decoder
        .read_to_end(&mut decoded)
        .map_err(|e| ImageError::Decode(format!("FlateDecode: {}", e)))?;
    Ok(decoded)
}

/// Reverse TIFF or PNG prediction applied before Flate compression
pub fn undo_predictor(data: &[u8], params: &PredictorParams) -> Result<Vec<u8>, ImageError> {
    let pixel_bits = params
        .colors
        .checked_mul(params.bits_per_component)
        .ok_or_else(|| ImageError::Decode("predictor pixel size overflows".to_string()))?;
    let row_len = params
        .columns
        .checked_mul(pixel_bits)
        .ok_or_else(|| ImageError::Decode("predictor row length overflows".to_string()))?
        .div_ceil(8);
    let bpp = pixel_bits.div_ceil(8).max(1);
    if row_len == 0 {
        return Err(ImageError::Decode("predictor row length is zero".to_string()));
    }

    match params.predictor {
        1 => Ok(data.to_vec()),
        2 => {
            if params.bits_per_component != 8 {
                return Err(ImageError::Unsupported(format!(
                    "TIFF predictor with {} bits per component",
                    params.bits_per_component
                )));
            }
            let mut out = data.to_vec();
            for row in out.chunks_mut(row_len) {
                for i in bpp..row.len() {
                    row[i] = row[i].wrapping_add(row[i - bpp]);
                }
            }
            Ok(out)
        }
        10..=15 => {
            let stride = row_len + 1;
            let rows = data.len() / stride;
            let mut out = vec![0u8; rows * row_len];
            for r in 0..rows {
                let src = &data[r * stride..(r + 1) * stride];
                let (done, rest) = out.split_at_mut(r * row_len);
                let prior = if r == 0 { None } else { Some(&done[(r - 1) * row_len..]) };
                let cur = &mut rest[..row_len];
                cur.copy_from_slice(&src[1..]);
                for i in 0..row_len {
                    let left = if i >= bpp { cur[i - bpp] } else { 0 };
                    let up = prior.map_or(0, |p| p[i]);
                    let up_left = match prior {
                        Some(p) if i >= bpp => p[i - bpp],
                        _ => 0,
                    };
                    let predicted = match src[0] {
                        0 => 0,
                        1 => left,
                        2 => up,
                        3 => ((left as u16 + up as u16) / 2) as u8,
                        4 => paeth(left, up, up_left),
                        tag => {
                            return Err(ImageError::Decode(format!("invalid PNG predictor tag {}", tag)))
                        }
                    };
                    cur[i] = cur[i].wrapping_add(predicted);
                }
            }
            Ok(out)
        }
        other => Err(ImageError::Unsupported(format!("predictor {}", other))),
    }
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

/// Unpack byte-aligned rows of `components`-sample pixels into one byte per
/// sample. Sub-byte samples keep their raw value (not scaled).
fn unpack_samples(
    data: &[u8],
    width: u32,
    height: u32,
    components: usize,
    bpc: u8,
) -> Result<Vec<u8>, ImageError> {
    if !matches!(bpc, 1 | 2 | 4 | 8 | 16) {
        return Err(ImageError::Unsupported(format!("{} bits per component", bpc)));
    }
    let too_large = || ImageError::Decode(format!("image dimensions {}x{} too large", width, height));
    let samples_per_row = (width as usize)
        .checked_mul(components)
        .ok_or_else(too_large)?;
    let row_len = samples_per_row
        .checked_mul(bpc as usize)
        .ok_or_else(too_large)?
        .div_ceil(8);
    let needed = row_len.checked_mul(height as usize).ok_or_else(too_large)?;
    if data.len() < needed {
        return Err(ImageError::Decode(format!(
            "truncated image data: got {} bytes, expected {}",
            data.len(),
            needed
        )));
    }

    let capacity = samples_per_row
        .saturating_mul(height as usize)
        .min(needed.saturating_mul(8));
    let mut out = Vec::with_capacity(capacity);
    for row in data[..needed].chunks_exact(row_len) {
        match bpc {
            8 => out.extend_from_slice(&row[..samples_per_row]),
            16 => out.extend(row.chunks_exact(2).take(samples_per_row).map(|pair| pair[0])),
            _ => {
                let per_byte = 8 / bpc as usize;
                let mask = (1u8 << bpc) - 1;
                for i in 0..samples_per_row {
                    let shift = 8 - bpc as usize * (i % per_byte + 1);
                    out.push((row[i / per_byte] >> shift) & mask);
                }
            }
        }
    }
    Ok(out)
}

fn scale_to_byte(samples: &mut [u8], bpc: u8) {
    if bpc < 8 {
        let max = (1u16 << bpc) - 1;
        for s in samples.iter_mut() {
            *s = (*s as u16 * 255 / max) as u8;
        }
    }
}

fn cmyk_to_rgb(cmyk: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(cmyk.len() / 4 * 3);
    for chunk in cmyk.chunks_exact(4) {
        let c = chunk[0] as f32 / 255.0;
        let m = chunk[1] as f32 / 255.0;
        let y = chunk[2] as f32 / 255.0;
        let k = chunk[3] as f32 / 255.0;

        rgb.push(((1.0 - c) * (1.0 - k) * 255.0) as u8);
        rgb.push(((1.0 - m) * (1.0 - k) * 255.0) as u8);
        rgb.push(((1.0 - y) * (1.0 - k) * 255.0) as u8);
    }
    rgb
}

fn samples_to_image(data: &[u8], format: &ImageFormatInfo) -> Result<DynamicImage, ImageError> {
    let (width, height) = (format.width, format.height);
    if width == 0 || height == 0 {
        return Err(ImageError::Decode("invalid dimensions".to_string()));
    }
    let color_space = format
        .color_space
        .as_ref()
        .ok_or_else(|| ImageError::Unsupported("missing colour space".to_string()))?;
    let components = color_space
        .components()
        .ok_or_else(|| ImageError::Unsupported(format!("colour space {}", color_space.name())))?;

    let bpc = format.bits_per_component;
    let mut samples = unpack_samples(data, width, height, components, bpc)?;
    let transparent = match &format.color_key {
        Some(key) => Some(color_key_mask(&samples, components, key, bpc)?),
        None => None,
    };

    let img = if let ColorSpace::Indexed { base, hival, lookup } = color_space {
        if format.inverted {
            let max = ((1u16 << bpc.min(8)) - 1) as u8;
            for s in samples.iter_mut() {
                *s = max.saturating_sub(*s);
            }
        }
        indexed_to_image(&samples, width, height, base, *hival, lookup)?
    } else {
        scale_to_byte(&mut samples, bpc);
        if format.inverted {
            for s in samples.iter_mut() {
                *s = 255 - *s;
            }
        }
        device_to_image(samples, width, height, color_space)?
    };

    Ok(match transparent {
        Some(mask) => with_alpha(img, &mask),
        None => img,
    })
}

/// Which pixels fall inside the colour-key ranges. Compared on raw samples,
/// before any `/Decode` mapping; 16-bit samples by their high byte.
fn color_key_mask(
    samples: &[u8],
    components: usize,
    key: &[(u16, u16)],
    bpc: u8,
) -> Result<Vec<bool>, ImageError> {
    if key.len() != components {
        return Err(ImageError::Decode(format!(
            "colour-key mask has {} ranges for {} components",
            key.len(),
            components
        )));
    }
    let shift = if bpc == 16 { 8 } else { 0 };
    Ok(samples
        .chunks_exact(components)
        .map(|pixel| {
            pixel
                .iter()
                .zip(key)
                .all(|(&s, &(min, max))| (min >> shift..=max >> shift).contains(&(s as u16)))
        })
        .collect())
}

/// Attach an alpha channel that is zero where `transparent` is set
fn with_alpha(img: DynamicImage, transparent: &[bool]) -> DynamicImage {
    match img {
        DynamicImage::ImageLuma8(gray) => {
            let (width, height) = gray.dimensions();
            let mut la = GrayAlphaImage::new(width, height);
            for ((dst, src), &clear) in la.pixels_mut().zip(gray.pixels()).zip(transparent) {
                *dst = LumaA([src[0], if clear { 0 } else { 255 }]);
            }
            DynamicImage::ImageLumaA8(la)
        }
        other => {
            let mut rgba = other.into_rgba8();
            for (pixel, &clear) in rgba.pixels_mut().zip(transparent) {
                if clear {
                    pixel[3] = 0;
                }
            }
            DynamicImage::ImageRgba8(rgba)
        }
    }
}

fn device_to_image(
    samples: Vec<u8>,
    width: u32,
    height: u32,
    color_space: &ColorSpace,
) -> Result<DynamicImage, ImageError> {
    match color_space {
        ColorSpace::DeviceGray => GrayImage::from_raw(width, height, samples)
            .map(DynamicImage::ImageLuma8)
            .ok_or_else(|| ImageError::Decode("grayscale buffer size mismatch".to_string())),
        ColorSpace::DeviceRGB => RgbImage::from_raw(width, height, samples)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| ImageError::Decode("RGB buffer size mismatch".to_string())),
        ColorSpace::DeviceCMYK => RgbImage::from_raw(width, height, cmyk_to_rgb(&samples))
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| ImageError::Decode("CMYK buffer size mismatch".to_string())),
        _ => Err(ImageError::Unsupported(format!("colour space {}", color_space.name()))),
    }
}

fn indexed_to_image(
    indices: &[u8],
    width: u32,
    height: u32,
    base: &ColorSpace,
    hival: u8,
    lookup: &[u8],
) -> Result<DynamicImage, ImageError> {
    let base_components = match base {
        ColorSpace::DeviceGray | ColorSpace::DeviceRGB | ColorSpace::DeviceCMYK => {
            base.components().unwrap_or(0)
        }
        other => {
            return Err(ImageError::Unsupported(format!("indexed over {}", other.name())));
        }
    };
    let entries = hival as usize + 1;
    if lookup.len() < entries * base_components {
        return Err(ImageError::Decode(format!(
            "palette too short: {} bytes for {} entries",
            lookup.len(),
            entries
        )));
    }

    let mut base_samples = Vec::with_capacity(indices.len() * base_components);
    for &index in indices {
        let entry = (index as usize).min(entries - 1) * base_components;
        base_samples.extend_from_slice(&lookup[entry..entry + base_components]);
    }

    let rgb = match base {
        ColorSpace::DeviceGray => {
            return GrayImage::from_raw(width, height, base_samples)
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(|| ImageError::Decode("palette buffer size mismatch".to_string()));
        }
        ColorSpace::DeviceCMYK => cmyk_to_rgb(&base_samples),
        _ => base_samples,
    };
    RgbImage::from_raw(width, height, rgb)
        .map(DynamicImage::ImageRgb8)
        .ok_or_else(|| ImageError::Decode("palette buffer size mismatch".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn raw_format(width: u32, height: u32, color_space: ColorSpace, bpc: u8) -> ImageFormatInfo {
        ImageFormatInfo {
            width,
            height,
            color_space: Some(color_space),
            bits_per_component: bpc,
            filters: Vec::new(),
            predictor: None,
            inverted: false,
            color_key: None,
            image_mask: false,
            has_smask: false,
        }
    }

    fn embedded(data: Vec<u8>, format: ImageFormatInfo) -> EmbeddedImage {
        EmbeddedImage {
            id: (1, 0),
            data,
            format,
        }
    }

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn decodes_raw_rgb() {
        let pixels = vec![255, 0, 0, 0, 255, 0, 0, 0, 255, 10, 20, 30];
        let img = decode_embedded(&embedded(pixels, raw_format(2, 2, ColorSpace::DeviceRGB, 8))).unwrap();
        let rgb = img.to_rgb8();
        assert_eq!(rgb.dimensions(), (2, 2));
        assert_eq!(rgb.get_pixel(1, 1).0, [10, 20, 30]);
    }

    #[test]
    fn decodes_flate_gray_with_png_predictor() {
        // Two rows, "Up" predictor on the second row.
        let encoded = vec![0, 10, 20, 30, 2, 1, 1, 1];
        let mut format = raw_format(3, 2, ColorSpace::DeviceGray, 8);
        format.filters = vec!["FlateDecode".to_string()];
        format.predictor = Some(PredictorParams {
            predictor: 15,
            colors: 1,
            bits_per_component: 8,
            columns: 3,
        });

        let img = decode_embedded(&embedded(zlib(&encoded), format)).unwrap();
        let gray = img.to_luma8();
        assert_eq!(gray.as_raw(), &vec![10, 20, 30, 11, 21, 31]);
    }

    #[test]
    fn paeth_and_sub_rows() {
        let params = PredictorParams {
            predictor: 15,
            colors: 1,
            bits_per_component: 8,
            columns: 3,
        };
        let encoded = vec![1, 5, 5, 5, 4, 1, 1, 1];
        let decoded = undo_predictor(&encoded, &params).unwrap();
        assert_eq!(&decoded[..3], &[5, 10, 15]);
        // Paeth picks the byte above for every column of row two.
        assert_eq!(&decoded[3..], &[6, 11, 16]);
    }

    #[test]
    fn one_bit_gray_is_scaled() {
        let format = raw_format(8, 1, ColorSpace::DeviceGray, 1);
        let img = decode_embedded(&embedded(vec![0b1010_0000], format)).unwrap();
        let gray = img.to_luma8();
        assert_eq!(&gray.as_raw()[..4], &[255, 0, 255, 0]);
    }

    #[test]
    fn inverted_decode_array_flips_samples() {
        let mut format = raw_format(2, 1, ColorSpace::DeviceGray, 8);
        format.inverted = true;
        let img = decode_embedded(&embedded(vec![0, 200], format)).unwrap();
        assert_eq!(img.to_luma8().as_raw(), &vec![255, 55]);
    }

    #[test]
    fn indexed_palette_lookup() {
        let palette = ColorSpace::Indexed {
            base: Box::new(ColorSpace::DeviceRGB),
            hival: 1,
            lookup: vec![255, 0, 0, 0, 0, 255],
        };
        let format = raw_format(4, 1, palette, 2);
        // indices 0, 1, 1, 0 packed at 2 bits each
        let img = decode_embedded(&embedded(vec![0b00_01_01_00], format)).unwrap();
        let rgb = img.to_rgb8();
        assert_eq!(rgb.get_pixel(0, 0).0, [255, 0, 0]);
        assert_eq!(rgb.get_pixel(1, 0).0, [0, 0, 255]);
        assert_eq!(rgb.get_pixel(3, 0).0, [255, 0, 0]);
    }

    #[test]
    fn cmyk_converts_to_rgb() {
        let format = raw_format(2, 1, ColorSpace::DeviceCMYK, 8);
        let img = decode_embedded(&embedded(vec![0, 0, 0, 0, 0, 0, 0, 255], format)).unwrap();
        let rgb = img.to_rgb8();
        assert_eq!(rgb.get_pixel(0, 0).0, [255, 255, 255]);
        assert_eq!(rgb.get_pixel(1, 0).0, [0, 0, 0]);
    }

    #[test]
    fn truncated_samples_fail() {
        let format = raw_format(10, 10, ColorSpace::DeviceRGB, 8);
        let err = decode_embedded(&embedded(vec![0; 20], format)).unwrap_err();
        assert!(matches!(err, ImageError::Decode(_)));
    }

    #[test]
    fn corrupt_jpeg_fails() {
        let mut format = raw_format(10, 10, ColorSpace::DeviceRGB, 8);
        format.filters = vec!["DCTDecode".to_string()];
        let err = decode_embedded(&embedded(b"not a jpeg at all".to_vec(), format)).unwrap_err();
        assert!(matches!(err, ImageError::Decode(_)));
    }

    #[test]
    fn color_key_on_indexed_image_becomes_alpha() {
        let palette = ColorSpace::Indexed {
            base: Box::new(ColorSpace::DeviceRGB),
            hival: 1,
            lookup: vec![0, 0, 0, 255, 0, 0],
        };
        let mut format = raw_format(3, 1, palette, 8);
        format.color_key = Some(vec![(0, 0)]);
        let img = decode_embedded(&embedded(vec![0, 1, 0], format)).unwrap();

        assert!(img.color().has_alpha());
        let rgba = img.to_rgba8();
        assert_eq!(rgba.get_pixel(0, 0)[3], 0);
        assert_eq!(rgba.get_pixel(1, 0).0, [255, 0, 0, 255]);
        assert_eq!(rgba.get_pixel(2, 0)[3], 0);
    }

    #[test]
    fn color_key_ranges_cover_every_component() {
        let mut format = raw_format(2, 1, ColorSpace::DeviceRGB, 8);
        format.color_key = Some(vec![(250, 255), (250, 255), (250, 255)]);
        let img = decode_embedded(&embedded(vec![252, 255, 251, 252, 10, 251], format)).unwrap();
        let rgba = img.to_rgba8();
        assert_eq!(rgba.get_pixel(0, 0)[3], 0);
        assert_eq!(rgba.get_pixel(1, 0)[3], 255);
    }

    #[test]
    fn color_key_on_gray_keeps_gray_channel() {
        let mut format = raw_format(2, 1, ColorSpace::DeviceGray, 1);
        format.color_key = Some(vec![(1, 1)]);
        let img = decode_embedded(&embedded(vec![0b1000_0000], format)).unwrap();
        let la = img.to_luma_alpha8();
        assert_eq!(la.get_pixel(0, 0).0, [255, 0]);
        assert_eq!(la.get_pixel(1, 0).0, [0, 255]);
    }

    #[test]
    fn mismatched_color_key_fails() {
        let mut format = raw_format(1, 1, ColorSpace::DeviceRGB, 8);
        format.color_key = Some(vec![(0, 0)]);
        let err = decode_embedded(&embedded(vec![0, 0, 0], format)).unwrap_err();
        assert!(matches!(err, ImageError::Decode(_)));
    }

    #[test]
    fn inverted_indexed_flips_indices() {
        let palette = ColorSpace::Indexed {
            base: Box::new(ColorSpace::DeviceRGB),
            hival: 1,
            lookup: vec![255, 0, 0, 0, 0, 255],
        };
        let mut format = raw_format(2, 1, palette, 1);
        format.inverted = true;
        let img = decode_embedded(&embedded(vec![0b1000_0000], format)).unwrap();
        let rgb = img.to_rgb8();
        assert_eq!(rgb.get_pixel(0, 0).0, [255, 0, 0]);
        assert_eq!(rgb.get_pixel(1, 0).0, [0, 0, 255]);
    }

    #[test]
    fn inverted_jpeg_is_flipped_after_decoding() {
        let mut jpeg = Vec::new();
        jpeg_encoder::Encoder::new(&mut jpeg, 90)
            .encode(&[20u8; 16 * 16], 16, 16, jpeg_encoder::ColorType::Luma)
            .unwrap();
        let mut format = raw_format(16, 16, ColorSpace::DeviceGray, 8);
        format.filters = vec!["DCTDecode".to_string()];

        let plain = decode_embedded(&embedded(jpeg.clone(), format.clone())).unwrap();
        format.inverted = true;
        let flipped = decode_embedded(&embedded(jpeg, format)).unwrap();

        let plain = plain.to_luma8().get_pixel(8, 8)[0];
        let flipped = flipped.to_luma8().get_pixel(8, 8)[0];
        assert!(plain.abs_diff(20) <= 3, "plain sample {}", plain);
        assert_eq!(flipped, 255 - plain);
    }

    #[test]
    fn oversized_dimensions_fail_without_panicking() {
        let format = raw_format(u32::MAX, u32::MAX, ColorSpace::DeviceRGB, 16);
        let err = decode_embedded(&embedded(vec![0; 64], format)).unwrap_err();
        assert!(matches!(err, ImageError::Decode(_)));

        let params = PredictorParams {
            predictor: 15,
            colors: 4,
            bits_per_component: 16,
            columns: usize::MAX,
        };
        assert!(matches!(
            undo_predictor(&[0; 16], &params),
            Err(ImageError::Decode(_))
        ));
    }

    #[test]
    fn zero_bits_per_component_is_unsupported() {
        let format = raw_format(4, 4, ColorSpace::DeviceGray, 0);
        let err = decode_embedded(&embedded(vec![0; 16], format)).unwrap_err();
        assert!(matches!(err, ImageError::Unsupported(_)));
    }

    #[test]
    fn unknown_filter_and_masks_are_unsupported() {
        let mut format = raw_format(10, 10, ColorSpace::DeviceRGB, 8);
        format.filters = vec!["JBIG2Decode".to_string()];
        assert!(matches!(
            decode_embedded(&embedded(vec![0; 300], format)),
            Err(ImageError::Unsupported(_))
        ));

        let mut mask = raw_format(8, 1, ColorSpace::DeviceGray, 1);
        mask.image_mask = true;
        assert!(matches!(
            decode_embedded(&embedded(vec![0], mask)),
            Err(ImageError::Unsupported(_))
        ));
    }
}
