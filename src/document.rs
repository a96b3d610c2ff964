//! Thin layer over `lopdf::Document`: page-ordered image enumeration,
//! extraction, stream replacement and saving with cleanup.

use crate::config::Cleanup;
use crate::decode::{ColorSpace, EmbeddedImage, ImageFormatInfo, PredictorParams};
use crate::error::{Error, ImageError, Result};
use crate::recompress::JpegImage;
use flate2::read::ZlibDecoder;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::io::Read;
use std::path::Path;

/// Information about a single image in the PDF
#[derive(Debug, Clone)]
pub struct ImageInfo {
    pub object_id: ObjectId,
    pub width: u32,
    pub height: u32,
    pub color_space: String,
    pub bits_per_component: u32,
    /// Filter chain, "raw" when unfiltered
    pub filter: String,
    /// Stored (encoded) size in bytes
    pub size_bytes: usize,
    pub has_smask: bool,
}

/// Images grouped by page
#[derive(Debug, Clone)]
pub struct PageImages {
    pub page_number: u32,
    pub images: Vec<ImageInfo>,
}

/// A loaded PDF whose image streams can be replaced in place
pub struct PdfDocument {
    doc: Document,
}

impl PdfDocument {
    pub fn load(path: &Path) -> Result<Self> {
        let doc = Document::load(path).map_err(|source| Error::Load {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { doc })
    }

    pub fn load_mem(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            doc: Document::load_mem(bytes)?,
        })
    }

    pub fn from_document(doc: Document) -> Self {
        Self { doc }
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn into_document(self) -> Document {
        self.doc
    }

    /// Pages in document order as (page number, page object id)
    pub fn pages(&self) -> Vec<(u32, ObjectId)> {
        self.doc.get_pages().into_iter().collect()
    }

    /// Image XObjects referenced by a page, including those drawn from
    /// nested Form XObjects, in resource order without repeats
    pub fn page_images(&self, page_id: ObjectId) -> Vec<ObjectId> {
        let mut images = Vec::new();
        let mut seen = HashSet::new();

        let page_dict = match self.doc.get_object(page_id) {
            Ok(Object::Dictionary(d)) => d,
            _ => return images,
        };

        let resources = self.page_resources(page_dict);
        for obj_id in self.xobject_refs(&resources) {
            self.collect_images_recursive(obj_id, &mut images, &mut seen);
        }
        images
    }

    fn collect_images_recursive(
        &self,
        obj_id: ObjectId,
        images: &mut Vec<ObjectId>,
        seen: &mut HashSet<ObjectId>,
    ) {
        if !seen.insert(obj_id) {
            return;
        }

        let stream = match self.doc.get_object(obj_id) {
            Ok(Object::Stream(s)) => s,
            _ => return,
        };

        match name_of(&stream.dict, b"Subtype").as_deref() {
            Some("Image") => images.push(obj_id),
            Some("Form") => {
                if let Ok(res) = stream.dict.get(b"Resources") {
                    for child_id in self.xobject_refs(res) {
                        self.collect_images_recursive(child_id, images, seen);
                    }
                }
            }
            _ => {}
        }
    }

    /// Page resources, following the `/Parent` chain for inherited ones
    fn page_resources(&self, page_dict: &Dictionary) -> Object {
        let mut current = page_dict;
        let mut visited = HashSet::new();
        loop {
            if let Ok(resources) = current.get(b"Resources") {
                return resources.clone();
            }
            let parent_id = match current.get(b"Parent") {
                Ok(Object::Reference(id)) if visited.insert(*id) => *id,
                _ => return Object::Null,
            };
            current = match self.doc.get_object(parent_id) {
                Ok(Object::Dictionary(d)) => d,
                _ => return Object::Null,
            };
        }
    }

    fn xobject_refs(&self, resources: &Object) -> Vec<ObjectId> {
        let res_dict = match self.resolve(resources) {
            Some(Object::Dictionary(d)) => d,
            _ => return Vec::new(),
        };
        let xobj_dict = match res_dict.get(b"XObject").ok().and_then(|x| self.resolve(x)) {
            Some(Object::Dictionary(d)) => d,
            _ => return Vec::new(),
        };
        xobj_dict
            .iter()
            .filter_map(|(_, value)| match value {
                Object::Reference(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    fn resolve<'a>(&'a self, obj: &'a Object) -> Option<&'a Object> {
        match obj {
            Object::Reference(id) => self.doc.get_object(*id).ok(),
            _ => Some(obj),
        }
    }

    /// Stored byte length of an image stream
    pub fn stored_len(&self, id: ObjectId) -> Option<usize> {
        match self.doc.get_object(id) {
            Ok(Object::Stream(s)) => Some(s.content.len()),
            _ => None,
        }
    }

    /// Raw stored bytes plus format metadata for an image XObject
    pub fn embedded_image(&self, id: ObjectId) -> std::result::Result<EmbeddedImage, ImageError> {
        let stream = match self.doc.get_object(id) {
            Ok(Object::Stream(s)) => s,
            Ok(_) => return Err(ImageError::Unsupported(format!("{:?} is not a stream", id))),
            Err(e) => return Err(ImageError::Decode(format!("{:?}: {}", id, e))),
        };

        let dict = &stream.dict;
        let width = int_of(dict, b"Width").unwrap_or(0).max(0) as u32;
        let height = int_of(dict, b"Height").unwrap_or(0).max(0) as u32;
        let image_mask = matches!(dict.get(b"ImageMask"), Ok(Object::Boolean(true)));
        let bits_per_component = int_of(dict, b"BitsPerComponent")
            .unwrap_or(if image_mask { 1 } else { 8 }) as u8;
        let filters = filters_of(dict);
        let color_space = dict
            .get(b"ColorSpace")
            .ok()
            .map(|cs| self.parse_color_space(cs, 0));
        let predictor = self.predictor_params(dict, &filters);
        let inverted = match &color_space {
            Some(ColorSpace::Indexed { .. }) => {
                let max_index = (1u32 << bits_per_component.min(8)) - 1;
                is_inverted_decode(dict, 1, max_index as f32)
            }
            Some(cs) => cs
                .components()
                .map_or(false, |n| is_inverted_decode(dict, n, 1.0)),
            None => false,
        };

        Ok(EmbeddedImage {
            id,
            data: stream.content.clone(),
            format: ImageFormatInfo {
                width,
                height,
                color_space,
                bits_per_component,
                filters,
                predictor,
                inverted,
                color_key: self.color_key(dict),
                image_mask,
                has_smask: dict.has(b"SMask"),
            },
        })
    }

    /// Colour-key ranges from a `/Mask` array. A malformed array yields an
    /// empty key, which fails decoding and leaves the image untouched.
    fn color_key(&self, dict: &Dictionary) -> Option<Vec<(u16, u16)>> {
        let arr = match dict.get(b"Mask").ok().and_then(|m| self.resolve(m)) {
            Some(Object::Array(arr)) => arr,
            _ => return None,
        };
        let values: Vec<u16> = arr
            .iter()
            .filter_map(|v| match self.resolve(v) {
                Some(Object::Integer(n)) => Some((*n).clamp(0, u16::MAX as i64) as u16),
                _ => None,
            })
            .collect();
        if values.is_empty() || values.len() != arr.len() || values.len() % 2 != 0 {
            return Some(Vec::new());
        }
        Some(values.chunks_exact(2).map(|pair| (pair[0], pair[1])).collect())
    }

    fn predictor_params(&self, dict: &Dictionary, filters: &[String]) -> Option<PredictorParams> {
        let flate_index = filters
            .iter()
            .position(|f| f == "FlateDecode" || f == "Fl")?;
        let parms = match dict.get(b"DecodeParms").ok().and_then(|p| self.resolve(p))? {
            Object::Dictionary(d) => d,
            Object::Array(arr) => match arr.get(flate_index).and_then(|p| self.resolve(p)) {
                Some(Object::Dictionary(d)) => d,
                _ => return None,
            },
            _ => return None,
        };
        let predictor = int_of(parms, b"Predictor").unwrap_or(1);
        if predictor <= 1 {
            return None;
        }
        Some(PredictorParams {
            predictor,
            colors: int_of(parms, b"Colors").unwrap_or(1).max(1) as usize,
            bits_per_component: int_of(parms, b"BitsPerComponent").unwrap_or(8).max(1) as usize,
            columns: int_of(parms, b"Columns").unwrap_or(1).max(1) as usize,
        })
    }

    fn parse_color_space(&self, obj: &Object, depth: u8) -> ColorSpace {
        if depth > 8 {
            return ColorSpace::Other("nested too deeply".to_string());
        }
        let obj = match self.resolve(obj) {
            Some(o) => o,
            None => return ColorSpace::Other("unresolved".to_string()),
        };
        match obj {
            Object::Name(name) => device_space(&String::from_utf8_lossy(name)),
            Object::Array(arr) => {
                let family = match arr.first() {
                    Some(Object::Name(n)) => String::from_utf8_lossy(n).to_string(),
                    _ => return ColorSpace::Other("Unknown".to_string()),
                };
                match family.as_str() {
                    "ICCBased" => match arr.get(1).and_then(|s| self.resolve(s)) {
                        Some(Object::Stream(icc)) => match int_of(&icc.dict, b"N") {
                            Some(1) => ColorSpace::DeviceGray,
                            Some(3) => ColorSpace::DeviceRGB,
                            Some(4) => ColorSpace::DeviceCMYK,
                            _ => match icc.dict.get(b"Alternate") {
                                Ok(alt) => self.parse_color_space(alt, depth + 1),
                                Err(_) => ColorSpace::Other("ICCBased".to_string()),
                            },
                        },
                        _ => ColorSpace::Other("ICCBased".to_string()),
                    },
                    "Indexed" | "I" if arr.len() >= 4 => {
                        let base = self.parse_color_space(&arr[1], depth + 1);
                        let hival = match self.resolve(&arr[2]) {
                            Some(Object::Integer(n)) => (*n).clamp(0, 255) as u8,
                            _ => return ColorSpace::Other("Indexed".to_string()),
                        };
                        let lookup = match self.resolve(&arr[3]) {
                            Some(Object::String(bytes, _)) => bytes.clone(),
                            Some(Object::Stream(s)) => stream_bytes(s),
                            _ => return ColorSpace::Other("Indexed".to_string()),
                        };
                        ColorSpace::Indexed {
                            base: Box::new(base),
                            hival,
                            lookup,
                        }
                    }
                    other => device_space(other),
                }
            }
            _ => ColorSpace::Other("Unknown".to_string()),
        }
    }

    /// Swap an image's stream for recompressed JPEG data
    pub fn replace_image(&mut self, id: ObjectId, jpeg: &JpegImage) -> std::result::Result<(), ImageError> {
        let stream = match self.doc.get_object_mut(id) {
            Ok(Object::Stream(s)) => s,
            _ => return Err(ImageError::Unsupported(format!("{:?} is not a stream", id))),
        };

        let dict = &mut stream.dict;
        dict.set("Type", Object::Name(b"XObject".to_vec()));
        dict.set("Subtype", Object::Name(b"Image".to_vec()));
        dict.set("Width", Object::Integer(jpeg.width as i64));
        dict.set("Height", Object::Integer(jpeg.height as i64));
        dict.set("ColorSpace", Object::Name(b"DeviceRGB".to_vec()));
        dict.set("BitsPerComponent", Object::Integer(8));
        dict.set("Filter", Object::Name(b"DCTDecode".to_vec()));
        dict.remove(b"DecodeParms");
        dict.remove(b"Decode");
        if matches!(dict.get(b"Mask"), Ok(Object::Array(_))) {
            dict.remove(b"Mask");
        }
        stream.set_content(jpeg.data.clone());
        // DCT data must not be Flate-wrapped again by cleanup.
        stream.allows_compression = false;
        Ok(())
    }

    /// Every image on every page, for inspection
    pub fn images_info(&self) -> Vec<PageImages> {
        let mut result = Vec::new();
        for (page_number, page_id) in self.pages() {
            let images: Vec<ImageInfo> = self
                .page_images(page_id)
                .into_iter()
                .filter_map(|id| self.image_info(id))
                .collect();
            if !images.is_empty() {
                result.push(PageImages {
                    page_number,
                    images,
                });
            }
        }
        result
    }

    fn image_info(&self, id: ObjectId) -> Option<ImageInfo> {
        let stream = match self.doc.get_object(id) {
            Ok(Object::Stream(s)) => s,
            _ => return None,
        };
        let color_space = stream
            .dict
            .get(b"ColorSpace")
            .ok()
            .map(|cs| self.parse_color_space(cs, 0).name())
            .unwrap_or_else(|| "Unknown".to_string());
        let filters = filters_of(&stream.dict);

        Some(ImageInfo {
            object_id: id,
            width: int_of(&stream.dict, b"Width").unwrap_or(0).max(0) as u32,
            height: int_of(&stream.dict, b"Height").unwrap_or(0).max(0) as u32,
            color_space,
            bits_per_component: int_of(&stream.dict, b"BitsPerComponent").unwrap_or(8).max(0) as u32,
            filter: if filters.is_empty() {
                "raw".to_string()
            } else {
                filters.join("+")
            },
            size_bytes: stream.content.len(),
            has_smask: stream.dict.has(b"SMask"),
        })
    }

    /// Apply cleanup, then write to `path`
    pub fn save_with_cleanup(&mut self, path: &Path, cleanup: &Cleanup) -> Result<()> {
        self.cleanup(cleanup);
        self.doc.save(path).map_err(|e| Error::Save {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Apply cleanup, then serialize to bytes
    pub fn save_to_bytes(&mut self, cleanup: &Cleanup) -> Result<Vec<u8>> {
        self.cleanup(cleanup);
        let mut output = Vec::new();
        self.doc.save_to(&mut output).map_err(|e| Error::Save {
            path: "<memory>".into(),
            message: e.to_string(),
        })?;
        Ok(output)
    }

    fn cleanup(&mut self, cleanup: &Cleanup) {
        if cleanup.coalesce_duplicates {
            let merged = coalesce_duplicate_images(&mut self.doc);
            log::debug!("Coalesced {} duplicate image streams", merged);
        }
        if cleanup.prune_unreferenced {
            let pruned = self.doc.prune_objects();
            let empty = self.doc.delete_zero_length_streams();
            log::debug!(
                "Pruned {} unreferenced objects and {} empty streams",
                pruned.len(),
                empty.len()
            );
        }
        if cleanup.compress_streams {
            self.doc.compress();
        }
        if cleanup.prune_unreferenced || cleanup.coalesce_duplicates {
            self.doc.renumber_objects();
        }
    }
}

/// Merge image streams with identical dictionaries and content.
///
/// References to later copies are rewritten to the first copy and the
/// copies are removed. Returns the number of objects removed.
pub fn coalesce_duplicate_images(doc: &mut Document) -> usize {
    let mut buckets: HashMap<u64, Vec<ObjectId>> = HashMap::new();
    let mut replacements: HashMap<ObjectId, ObjectId> = HashMap::new();

    for (id, object) in doc.objects.iter() {
        let stream = match object {
            Object::Stream(s) if name_of(&s.dict, b"Subtype").as_deref() == Some("Image") => s,
            _ => continue,
        };
        let mut keys: Vec<&Vec<u8>> = stream.dict.iter().map(|(key, _)| key).collect();
        keys.sort();
        let mut hasher = DefaultHasher::new();
        keys.hash(&mut hasher);
        stream.content.hash(&mut hasher);

        let bucket = buckets.entry(hasher.finish()).or_default();
        let original = bucket.iter().copied().find(|candidate| {
            matches!(doc.objects.get(candidate), Some(Object::Stream(other))
                if other.content == stream.content && dicts_equal(&other.dict, &stream.dict))
        });
        match original {
            Some(original) => {
                replacements.insert(*id, original);
            }
            None => bucket.push(*id),
        }
    }

    if replacements.is_empty() {
        return 0;
    }
    for object in doc.objects.values_mut() {
        rewrite_references(object, &replacements);
    }
    for value in doc.trailer.iter_mut().map(|(_, v)| v) {
        rewrite_references(value, &replacements);
    }
    for id in replacements.keys() {
        doc.objects.remove(id);
    }
    replacements.len()
}

/// Same keys with equal values, regardless of key order
fn dicts_equal(a: &Dictionary, b: &Dictionary) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .all(|(key, value)| b.get(key).map_or(false, |other| objects_equal(value, other)))
}

fn objects_equal(a: &Object, b: &Object) -> bool {
    match (a, b) {
        (Object::Dictionary(a), Object::Dictionary(b)) => dicts_equal(a, b),
        (Object::Array(a), Object::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| objects_equal(x, y))
        }
        (Object::Stream(a), Object::Stream(b)) => a.content == b.content && dicts_equal(&a.dict, &b.dict),
        (Object::Integer(a), Object::Integer(b)) => a == b,
        (Object::Real(a), Object::Real(b)) => a == b,
        (Object::Boolean(a), Object::Boolean(b)) => a == b,
        (Object::Name(a), Object::Name(b)) => a == b,
        (Object::String(a, _), Object::String(b, _)) => a == b,
        (Object::Reference(a), Object::Reference(b)) => a == b,
        (Object::Null, Object::Null) => true,
        _ => false,
    }
}

fn rewrite_references(object: &mut Object, replacements: &HashMap<ObjectId, ObjectId>) {
    match object {
        Object::Reference(id) => {
            if let Some(target) = replacements.get(id) {
                *id = *target;
            }
        }
        Object::Array(items) => {
            for item in items.iter_mut() {
                rewrite_references(item, replacements);
            }
        }
        Object::Dictionary(dict) => {
            for (_, value) in dict.iter_mut() {
                rewrite_references(value, replacements);
            }
        }
        Object::Stream(stream) => {
            for (_, value) in stream.dict.iter_mut() {
                rewrite_references(value, replacements);
            }
        }
        _ => {}
    }
}

fn device_space(name: &str) -> ColorSpace {
    match name {
        "DeviceGray" | "G" | "CalGray" => ColorSpace::DeviceGray,
        "DeviceRGB" | "RGB" | "CalRGB" => ColorSpace::DeviceRGB,
        "DeviceCMYK" | "CMYK" => ColorSpace::DeviceCMYK,
        other => ColorSpace::Other(other.to_string()),
    }
}

/// `/Decode [max 0 max 0 ...]` on every component
fn is_inverted_decode(dict: &Dictionary, components: usize, max: f32) -> bool {
    let arr = match dict.get(b"Decode") {
        Ok(Object::Array(arr)) if arr.len() == components * 2 => arr,
        _ => return false,
    };
    arr.chunks(2)
        .all(|pair| number_of(&pair[0]) == Some(max) && number_of(&pair[1]) == Some(0.0))
}

fn stream_bytes(stream: &Stream) -> Vec<u8> {
    if filters_of(&stream.dict).iter().any(|f| f == "FlateDecode") {
        let mut decoder = ZlibDecoder::new(&stream.content[..]);
        let mut decoded = Vec::new();
        if decoder.read_to_end(&mut decoded).is_ok() {
            return decoded;
        }
    }
    stream.content.clone()
}

fn filters_of(dict: &Dictionary) -> Vec<String> {
    match dict.get(b"Filter") {
        Ok(Object::Name(n)) => vec![String::from_utf8_lossy(n).to_string()],
        Ok(Object::Array(arr)) => arr
            .iter()
            .filter_map(|f| match f {
                Object::Name(n) => Some(String::from_utf8_lossy(n).to_string()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn name_of(dict: &Dictionary, key: &[u8]) -> Option<String> {
    match dict.get(key) {
        Ok(Object::Name(n)) => Some(String::from_utf8_lossy(n).to_string()),
        _ => None,
    }
}

fn int_of(dict: &Dictionary, key: &[u8]) -> Option<i64> {
    match dict.get(key) {
        Ok(Object::Integer(n)) => Some(*n),
        Ok(Object::Real(n)) => Some(*n as i64),
        _ => None,
    }
}

fn number_of(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(n) => Some(*n as f32),
        Object::Real(n) => Some(*n),
        _ => None,
    }
}
