//! PDF text and image extraction using lopdf and pdf-extract.

use image::{DynamicImage, GrayImage, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, trace};

use super::Result;
use crate::error::PdfError;

/// A loaded PDF document.
///
/// Encrypted files are opened with the empty user password, which is how
/// most issuing systems "protect" their DANFEs.
pub struct PdfDocument {
    document: Document,
    /// Bytes handed to pdf-extract (decrypted copy when needed).
    raw_data: Vec<u8>,
}

impl PdfDocument {
    pub fn load(data: &[u8]) -> Result<Self> {
        let mut document = Document::load_mem(data).map_err(|e| PdfError::Parse(e.to_string()))?;

        let raw_data = if document.is_encrypted() {
            if document.decrypt("").is_err() {
                return Err(PdfError::Encrypted);
            }
            debug!("Decrypted PDF with empty password");

            let mut decrypted = Vec::new();
            document
                .save_to(&mut decrypted)
                .map_err(|e| PdfError::Parse(format!("failed to save decrypted PDF: {}", e)))?;
            decrypted
        } else {
            data.to_vec()
        };

        let page_count = document.get_pages().len();
        if page_count == 0 {
            return Err(PdfError::NoPages);
        }

        debug!("Loaded PDF with {} pages", page_count);
        Ok(Self { document, raw_data })
    }

    pub fn page_count(&self) -> u32 {
        self.document.get_pages().len() as u32
    }

    /// Embedded text layer of the whole document.
    pub fn text(&self) -> Result<String> {
        pdf_extract::extract_text_from_mem(&self.raw_data)
            .map_err(|e| PdfError::TextExtraction(e.to_string()))
    }

    /// Largest decodable image of each page, at most `max_pages` pages
    /// (0 = all).
    ///
    /// A scanned DANFE carries one full-page raster per page; smaller images
    /// (logos, barcodes) are skipped in favour of the largest one.
    pub fn page_images(&self, max_pages: usize) -> Result<Vec<DynamicImage>> {
        let pages = self.document.get_pages();
        let limit = if max_pages == 0 { pages.len() } else { max_pages };

        let mut images = Vec::new();
        for (number, page_id) in pages.iter().take(limit) {
            let largest = self
                .images_on_page(*page_id)
                .into_iter()
                .max_by_key(|img| img.width() as u64 * img.height() as u64);

            match largest {
                Some(img) => {
                    trace!("Page {}: {}x{} image", number, img.width(), img.height());
                    images.push(img);
                }
                None => trace!("Page {}: no decodable image", number),
            }
        }

        if images.is_empty() {
            debug!("No page-level images found, scanning all objects");
            images = self.all_images();
        }

        Ok(images)
    }

    fn images_on_page(&self, page_id: ObjectId) -> Vec<DynamicImage> {
        let mut images = Vec::new();
        let Some(resources) = self.page_resources(page_id) else {
            return images;
        };
        let Ok(xobjects) = resources.get(b"XObject") else {
            return images;
        };
        if let Ok((_, Object::Dictionary(xobjects))) = self.document.dereference(xobjects) {
            for (_name, reference) in xobjects.iter() {
                if let Ok((_, object)) = self.document.dereference(reference) {
                    if let Some(img) = self.decode_image(object) {
                        images.push(img);
                    }
                }
            }
        }
        images
    }

    fn all_images(&self) -> Vec<DynamicImage> {
        self.document
            .objects
            .values()
            .filter_map(|object| self.decode_image(object))
            .collect()
    }

    /// Resources of a page, following `Parent` inheritance.
    fn page_resources(&self, node_id: ObjectId) -> Option<Dictionary> {
        let Ok(Object::Dictionary(dict)) = self.document.get_object(node_id) else {
            return None;
        };

        if let Ok(resources) = dict.get(b"Resources") {
            if let Ok((_, Object::Dictionary(resources))) = self.document.dereference(resources) {
                return Some(resources.clone());
            }
        }

        match dict.get(b"Parent") {
            Ok(Object::Reference(parent)) => self.page_resources(*parent),
            _ => None,
        }
    }

    fn decode_image(&self, object: &Object) -> Option<DynamicImage> {
        let Object::Stream(stream) = object else {
            return None;
        };
        let dict = &stream.dict;
        if dict.get(b"Subtype").ok()?.as_name().ok()? != b"Image" {
            return None;
        }

        let width = dict.get(b"Width").ok()?.as_i64().ok()? as u32;
        let height = dict.get(b"Height").ok()?.as_i64().ok()? as u32;

        let filter = dict.get(b"Filter").ok().and_then(|f| match f {
            Object::Name(name) => Some(name.as_slice()),
            Object::Array(arr) => arr.last().and_then(|o| o.as_name().ok()),
            _ => None,
        });

        match filter {
            Some(b"DCTDecode") => {
                return image::load_from_memory_with_format(&stream.content, image::ImageFormat::Jpeg)
                    .ok();
            }
            Some(b"JPXDecode") | Some(b"CCITTFaxDecode") | Some(b"JBIG2Decode") => {
                trace!("Skipping unsupported image filter {:?}", filter.map(String::from_utf8_lossy));
                return None;
            }
            _ => {}
        }

        let data = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());

        let color_space = dict
            .get(b"ColorSpace")
            .ok()
            .and_then(|o| match o {
                Object::Name(name) => Some(name.as_slice()),
                Object::Array(arr) => arr.first().and_then(|o| o.as_name().ok()),
                Object::Reference(r) => self.document.get_object(*r).ok().and_then(|o| o.as_name().ok()),
                _ => None,
            })
            .unwrap_or(b"DeviceRGB");

        let bits = dict
            .get(b"BitsPerComponent")
            .ok()
            .and_then(|o| o.as_i64().ok())
            .unwrap_or(8);

        decode_raw(&data, width, height, color_space, bits)
    }
}

/// Build an image from uncompressed 8-bit samples.
fn decode_raw(
    data: &[u8],
    width: u32,
    height: u32,
    color_space: &[u8],
    bits_per_component: i64,
) -> Option<DynamicImage> {
    if bits_per_component != 8 {
        trace!("Unsupported bits per component: {}", bits_per_component);
        return None;
    }

    let pixels = width as usize * height as usize;
    match color_space {
        b"DeviceRGB" | b"RGB" | b"ICCBased" if data.len() >= pixels * 3 => {
            RgbImage::from_raw(width, height, data[..pixels * 3].to_vec()).map(DynamicImage::ImageRgb8)
        }
        b"DeviceGray" | b"G" if data.len() >= pixels => {
            GrayImage::from_raw(width, height, data[..pixels].to_vec()).map(DynamicImage::ImageLuma8)
        }
        _ => {
            trace!(
                "Could not decode {:?} image: {} bytes for {}x{}",
                String::from_utf8_lossy(color_space),
                data.len(),
                width,
                height
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_rejects_garbage() {
        let err = PdfDocument::load(b"not a pdf").err().unwrap();
        assert!(matches!(err, PdfError::Parse(_)));
    }

    #[test]
    fn test_decode_raw_gray() {
        let data = vec![10u8; 6];
        let img = decode_raw(&data, 3, 2, b"DeviceGray", 8).unwrap();
        assert_eq!((img.width(), img.height()), (3, 2));
    }

    #[test]
    fn test_decode_raw_rejects_short_or_unsupported() {
        assert!(decode_raw(&[0u8; 5], 3, 2, b"DeviceGray", 8).is_none());
        assert!(decode_raw(&[0u8; 18], 3, 2, b"DeviceRGB", 1).is_none());
        assert!(decode_raw(&[0u8; 24], 3, 2, b"DeviceCMYK", 8).is_none());
    }
}
