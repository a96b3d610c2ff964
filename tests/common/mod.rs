//! Builders for small in-memory PDFs used by the integration tests

#![allow(dead_code)]

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};

/// Uncompressed RGB image XObject
pub fn raw_rgb_image(width: u32, height: u32, pixel: impl Fn(u32, u32) -> [u8; 3]) -> Stream {
    let mut data = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            data.extend_from_slice(&pixel(x, y));
        }
    }
    Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        },
        data,
    )
}

/// JPEG-filtered image XObject holding arbitrary bytes
pub fn dct_image(width: u32, height: u32, data: Vec<u8>) -> Stream {
    Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width as i64,
            "Height" => height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        data,
    )
}

/// A document whose page `n` draws the images at the indices in `pages[n]`.
/// Returns the document and the object ids of `images`, in order.
pub fn build_pdf(images: Vec<Stream>, pages: &[Vec<usize>]) -> (Document, Vec<ObjectId>) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let image_ids: Vec<ObjectId> = images.into_iter().map(|s| doc.add_object(s)).collect();

    let mut kids: Vec<Object> = Vec::new();
    for refs in pages {
        let mut xobjects = Dictionary::new();
        let mut content = String::new();
        for (n, index) in refs.iter().enumerate() {
            xobjects.set(format!("Im{}", n), image_ids[*index]);
            content.push_str(&format!("q 200 0 0 100 0 {} cm /Im{} Do Q\n", n * 110, n));
        }
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! { "XObject" => xobjects },
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    (doc, image_ids)
}

/// All image XObject streams in a document
pub fn image_streams(doc: &Document) -> Vec<&Stream> {
    doc.objects
        .values()
        .filter_map(|obj| match obj {
            Object::Stream(s) => match s.dict.get(b"Subtype") {
                Ok(Object::Name(n)) if n == b"Image" => Some(s),
                _ => None,
            },
            _ => None,
        })
        .collect()
}
