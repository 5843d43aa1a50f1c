//! Page-to-image conversion for scanned PDFs.
//!
//! Scanned PDFs typically carry one full-page image XObject per page. We pull
//! that image out directly instead of rasterizing, which covers the common
//! scanner output formats (JPEG via DCTDecode, deflated TIFF/PNG, raw pixels).

use image::ImageOutputFormat;
use lopdf::{Document, Object, ObjectId};

use super::types::PdfPageRenderer;
use super::ExtractionError;

pub struct EmbeddedImageRenderer;

impl PdfPageRenderer for EmbeddedImageRenderer {
    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_number: usize,
    ) -> Result<Vec<u8>, ExtractionError> {
        let doc = Document::load_mem(pdf_bytes)
            .map_err(|e| ExtractionError::PdfParsing(format!("Failed to parse PDF: {e}")))?;

        let page_ids: Vec<ObjectId> = doc.page_iter().collect();
        let &page_id = page_ids.get(page_number).ok_or_else(|| {
            ExtractionError::PdfParsing(format!(
                "Page {page_number} out of range ({} pages)",
                page_ids.len()
            ))
        })?;

        let image_bytes = largest_page_image(&doc, page_id)?;

        // Normalize everything to PNG before handing to the OCR engine.
        let img = image::load_from_memory(&image_bytes).map_err(|e| {
            ExtractionError::ImageProcessing(format!("Cannot decode page image: {e}"))
        })?;

        let mut png = std::io::Cursor::new(Vec::new());
        img.write_to(&mut png, ImageOutputFormat::Png)
            .map_err(|e| ExtractionError::ImageProcessing(format!("PNG encode failed: {e}")))?;

        Ok(png.into_inner())
    }
}

/// Find the largest /Image XObject on a page; the page scan dwarfs any
/// logos or stamps also embedded there.
fn largest_page_image(doc: &Document, page_id: ObjectId) -> Result<Vec<u8>, ExtractionError> {
    let page_dict = doc
        .get_object(page_id)
        .ok()
        .and_then(|obj| obj.as_dict().ok())
        .ok_or_else(|| ExtractionError::PdfParsing("Page is not a dictionary".into()))?;

    let resources = deref_dict(doc, page_dict, b"Resources")?;
    let xobjects = deref_dict(doc, resources, b"XObject")?;

    let mut best: Option<Vec<u8>> = None;

    for (_name, entry) in xobjects.iter() {
        let object = match entry {
            Object::Reference(id) => match doc.get_object(*id) {
                Ok(obj) => obj,
                Err(_) => continue,
            },
            other => other,
        };
        let stream = match object {
            Object::Stream(s) => s,
            _ => continue,
        };

        let is_image = stream
            .dict
            .get(b"Subtype")
            .map(|o| matches!(o, Object::Name(n) if n == b"Image"))
            .unwrap_or(false);
        if !is_image {
            continue;
        }

        let bytes = decode_image_stream(stream)?;
        if best.as_ref().map_or(true, |prev| bytes.len() > prev.len()) {
            best = Some(bytes);
        }
    }

    best.ok_or_else(|| ExtractionError::PdfParsing("No page image found".into()))
}

/// Recover decodable image bytes from an XObject stream.
fn decode_image_stream(stream: &lopdf::Stream) -> Result<Vec<u8>, ExtractionError> {
    let is_jpeg = stream
        .dict
        .get(b"Filter")
        .map(|f| match f {
            Object::Name(n) => n == b"DCTDecode",
            Object::Array(arr) => arr
                .iter()
                .any(|o| matches!(o, Object::Name(n) if n == b"DCTDecode")),
            _ => false,
        })
        .unwrap_or(false);

    // DCTDecode streams are complete JPEG files.
    let content = stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone());
    if is_jpeg || image::load_from_memory(&content).is_ok() {
        return Ok(content);
    }

    // Raw pixels: rebuild from /Width, /Height and /ColorSpace.
    rebuild_raw_pixels(&stream.dict, &content)
}

fn rebuild_raw_pixels(
    dict: &lopdf::Dictionary,
    pixels: &[u8],
) -> Result<Vec<u8>, ExtractionError> {
    let width = dict_int(dict, b"Width")? as u32;
    let height = dict_int(dict, b"Height")? as u32;

    let channels = match dict.get(b"ColorSpace") {
        Ok(Object::Name(n)) if n == b"DeviceGray" => 1u32,
        Ok(Object::Name(n)) if n == b"DeviceCMYK" => 4,
        _ => 3,
    };

    let expected = (width * height * channels) as usize;
    if pixels.len() < expected {
        return Err(ExtractionError::ImageProcessing(format!(
            "Pixel buffer too small: {} bytes for {width}x{height}x{channels}",
            pixels.len()
        )));
    }

    let img = match channels {
        1 => image::GrayImage::from_raw(width, height, pixels[..expected].to_vec())
            .map(image::DynamicImage::ImageLuma8),
        4 => image::RgbaImage::from_raw(width, height, pixels[..expected].to_vec())
            .map(image::DynamicImage::ImageRgba8),
        _ => image::RgbImage::from_raw(width, height, pixels[..expected].to_vec())
            .map(image::DynamicImage::ImageRgb8),
    }
    .ok_or_else(|| ExtractionError::ImageProcessing("Raw pixel rebuild failed".into()))?;

    let mut png = std::io::Cursor::new(Vec::new());
    img.write_to(&mut png, ImageOutputFormat::Png)
        .map_err(|e| ExtractionError::ImageProcessing(format!("PNG encode failed: {e}")))?;
    Ok(png.into_inner())
}

fn deref_dict<'a>(
    doc: &'a Document,
    dict: &'a lopdf::Dictionary,
    key: &[u8],
) -> Result<&'a lopdf::Dictionary, ExtractionError> {
    let obj = dict.get(key).map_err(|_| {
        ExtractionError::PdfParsing(format!("Missing /{}", String::from_utf8_lossy(key)))
    })?;
    let resolved = match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    };
    resolved.as_dict().map_err(|_| {
        ExtractionError::PdfParsing(format!("/{} is not a dictionary", String::from_utf8_lossy(key)))
    })
}

fn dict_int(dict: &lopdf::Dictionary, key: &[u8]) -> Result<i64, ExtractionError> {
    dict.get(key)
        .ok()
        .and_then(|o| o.as_i64().ok())
        .ok_or_else(|| {
            ExtractionError::PdfParsing(format!(
                "Missing integer /{}",
                String::from_utf8_lossy(key)
            ))
        })
}

#[cfg(test)]
pub(crate) mod fixtures {
    use lopdf::{dictionary, Document, Object, Stream};

    pub fn make_test_jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([200u8, 200, 200]));
        let mut buf = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, image::ImageOutputFormat::Jpeg(85))
            .unwrap();
        buf.into_inner()
    }

    /// Build a PDF with one image-only page per JPEG, like scanner output.
    pub fn make_scanned_pdf(pages: &[Vec<u8>]) -> Vec<u8> {
        let mut doc = Document::with_version("1.4");

        let mut page_ids = Vec::new();
        for jpeg in pages {
            let mut img_stream = Stream::new(
                dictionary! {
                    "Type" => Object::Name(b"XObject".to_vec()),
                    "Subtype" => Object::Name(b"Image".to_vec()),
                    "Width" => Object::Integer(200),
                    "Height" => Object::Integer(300),
                    "ColorSpace" => Object::Name(b"DeviceRGB".to_vec()),
                    "BitsPerComponent" => Object::Integer(8),
                    "Filter" => Object::Name(b"DCTDecode".to_vec()),
                    "Length" => Object::Integer(jpeg.len() as i64),
                },
                jpeg.clone(),
            );
            img_stream.allows_compression = false;
            let img_id = doc.add_object(Object::Stream(img_stream));

            let content = Stream::new(
                dictionary! {},
                b"q 612 0 0 792 0 0 cm /Img1 Do Q".to_vec(),
            );
            let content_id = doc.add_object(Object::Stream(content));

            let page_id = doc.add_object(dictionary! {
                "Type" => Object::Name(b"Page".to_vec()),
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Contents" => Object::Reference(content_id),
                "Resources" => dictionary! {
                    "XObject" => dictionary! {
                        "Img1" => Object::Reference(img_id),
                    },
                },
            });
            page_ids.push(page_id);
        }

        let pages_id = doc.add_object(dictionary! {
            "Type" => Object::Name(b"Pages".to_vec()),
            "Kids" => page_ids.iter().map(|id| Object::Reference(*id)).collect::<Vec<_>>(),
            "Count" => Object::Integer(page_ids.len() as i64),
        });

        for page_id in &page_ids {
            if let Ok(Object::Dictionary(ref mut dict)) = doc.get_object_mut(*page_id) {
                dict.set("Parent", Object::Reference(pages_id));
            }
        }

        let catalog_id = doc.add_object(dictionary! {
            "Type" => Object::Name(b"Catalog".to_vec()),
            "Pages" => Object::Reference(pages_id),
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }
}
