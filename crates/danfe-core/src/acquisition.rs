//! Text acquisition: embedded text first, OCR backends as fallbacks.

use image::DynamicImage;
use tracing::{debug, info, warn};

use crate::error::{OcrError, Result};
use crate::models::config::AcquisitionConfig;
use crate::models::{DanfeConfig, ExtractionMethod};
use crate::ocr::{self, OcrBackend};
use crate::pdf::PdfDocument;

/// What the input bytes look like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Image,
    PlainText,
    Unknown,
}

impl DocumentKind {
    pub fn sniff(bytes: &[u8]) -> Self {
        if bytes.starts_with(b"%PDF") {
            DocumentKind::Pdf
        } else if image::guess_format(bytes).is_ok() {
            DocumentKind::Image
        } else if std::str::from_utf8(bytes).is_ok() {
            DocumentKind::PlainText
        } else {
            DocumentKind::Unknown
        }
    }
}

/// Access to a document's embedded text and page images.
pub trait DocumentReader {
    /// Text available without OCR; empty when there is none.
    fn embedded_text(&self) -> Result<String>;

    /// Page images for OCR, at most `max_pages` (0 = all).
    fn page_images(&self, max_pages: usize) -> Result<Vec<DynamicImage>>;

    /// Method recorded when the embedded text is accepted.
    fn text_method(&self) -> ExtractionMethod {
        ExtractionMethod::NativeText
    }
}

pub struct PdfReader {
    document: PdfDocument,
}

impl PdfReader {
    pub fn load(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            document: PdfDocument::load(bytes)?,
        })
    }
}

impl DocumentReader for PdfReader {
    fn embedded_text(&self) -> Result<String> {
        Ok(self.document.text()?)
    }

    fn page_images(&self, max_pages: usize) -> Result<Vec<DynamicImage>> {
        Ok(self.document.page_images(max_pages)?)
    }
}

/// A single raster image (scan or photo).
pub struct ImageReader {
    image: DynamicImage,
}

impl ImageReader {
    pub fn load(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            image: image::load_from_memory(bytes)?,
        })
    }
}

impl DocumentReader for ImageReader {
    fn embedded_text(&self) -> Result<String> {
        Ok(String::new())
    }

    fn page_images(&self, _max_pages: usize) -> Result<Vec<DynamicImage>> {
        Ok(vec![self.image.clone()])
    }
}

/// Already-extracted text (e.g. a `.txt` dump of a DANFE).
pub struct PlainTextReader {
    text: String,
}

impl PlainTextReader {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl DocumentReader for PlainTextReader {
    fn embedded_text(&self) -> Result<String> {
        Ok(self.text.clone())
    }

    fn page_images(&self, _max_pages: usize) -> Result<Vec<DynamicImage>> {
        Ok(Vec::new())
    }

    fn text_method(&self) -> ExtractionMethod {
        ExtractionMethod::PlainText
    }
}

/// Open the right reader for `bytes`.
pub fn open_reader(bytes: &[u8]) -> Result<Box<dyn DocumentReader>> {
    match DocumentKind::sniff(bytes) {
        DocumentKind::Pdf => Ok(Box::new(PdfReader::load(bytes)?)),
        DocumentKind::Image => Ok(Box::new(ImageReader::load(bytes)?)),
        DocumentKind::PlainText => Ok(Box::new(PlainTextReader::new(
            String::from_utf8_lossy(bytes).into_owned(),
        ))),
        DocumentKind::Unknown => Err(crate::DanfeError::Config(
            "unrecognized document format".to_string(),
        )),
    }
}

/// Outcome of text acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquisition {
    Text {
        text: String,
        method: ExtractionMethod,
    },
    /// Every method failed or produced too little text.
    NoText { attempts: Vec<String> },
}

impl Acquisition {
    pub fn text(&self) -> Option<&str> {
        match self {
            Acquisition::Text { text, .. } => Some(text),
            Acquisition::NoText { .. } => None,
        }
    }
}

/// Runs the acquisition chain over a document.
pub struct TextAcquirer {
    min_text_length: usize,
    max_pages: usize,
    backends: Vec<Box<dyn OcrBackend>>,
    /// Backends that could not be built, reported as attempts.
    unavailable: Vec<String>,
}

impl TextAcquirer {
    /// Acquirer without OCR fallbacks.
    pub fn new(config: &AcquisitionConfig) -> Self {
        Self {
            min_text_length: config.min_text_length,
            max_pages: config.max_pages,
            backends: Vec::new(),
            unavailable: Vec::new(),
        }
    }

    /// Acquirer with the configured OCR backends, in order.
    pub fn from_config(config: &DanfeConfig) -> Self {
        let mut acquirer = Self::new(&config.acquisition);
        for &method in &config.acquisition.ocr_backends {
            match ocr::build_backend(method, config) {
                Ok(backend) => acquirer.backends.push(backend),
                Err(e) => {
                    debug!("OCR backend {} unavailable: {}", method, e);
                    acquirer.unavailable.push(format!("{}: {}", method, e));
                }
            }
        }
        acquirer
    }

    pub fn with_backend(mut self, backend: Box<dyn OcrBackend>) -> Self {
        self.backends.push(backend);
        self
    }

    fn is_usable(&self, text: &str) -> bool {
        text.trim().chars().count() >= self.min_text_length
    }

    /// Acquire text from raw document bytes.
    pub fn acquire(&self, bytes: &[u8]) -> Acquisition {
        match open_reader(bytes) {
            Ok(reader) => self.acquire_from(reader.as_ref()),
            Err(e) => {
                warn!("Could not open document: {}", e);
                Acquisition::NoText {
                    attempts: vec![format!("open: {}", e)],
                }
            }
        }
    }

    /// Acquire text through an already-opened reader.
    pub fn acquire_from(&self, reader: &dyn DocumentReader) -> Acquisition {
        let mut attempts = Vec::new();
        let method = reader.text_method();

        match reader.embedded_text() {
            Ok(text) if self.is_usable(&text) => {
                debug!("Accepted {} ({} chars)", method, text.trim().len());
                return Acquisition::Text { text, method };
            }
            Ok(text) => attempts.push(format!(
                "{}: {} chars, below threshold of {}",
                method,
                text.trim().chars().count(),
                self.min_text_length
            )),
            Err(e) => attempts.push(format!("{}: {}", method, e)),
        }

        if self.backends.is_empty() {
            attempts.extend(self.unavailable.iter().cloned());
            return Acquisition::NoText { attempts };
        }

        let images = match reader.page_images(self.max_pages) {
            Ok(images) if !images.is_empty() => images,
            Ok(_) => {
                attempts.push("ocr: no page images".to_string());
                attempts.extend(self.unavailable.iter().cloned());
                return Acquisition::NoText { attempts };
            }
            Err(e) => {
                attempts.push(format!("ocr: {}", e));
                attempts.extend(self.unavailable.iter().cloned());
                return Acquisition::NoText { attempts };
            }
        };

        for backend in &self.backends {
            let method = backend.method();
            match recognize_pages(backend.as_ref(), &images) {
                Ok(text) if self.is_usable(&text) => {
                    info!("Acquired text with {} from {} page(s)", method, images.len());
                    return Acquisition::Text {
                        text,
                        method: method.extraction_method(),
                    };
                }
                Ok(text) => attempts.push(format!(
                    "{}: {} chars, below threshold of {}",
                    method,
                    text.trim().chars().count(),
                    self.min_text_length
                )),
                Err(e) => attempts.push(format!("{}: {}", method, e)),
            }
        }

        attempts.extend(self.unavailable.iter().cloned());
        warn!("No usable text after {} attempt(s)", attempts.len());
        Acquisition::NoText { attempts }
    }
}

/// OCR every page and join the results with blank lines.
fn recognize_pages(
    backend: &dyn OcrBackend,
    images: &[DynamicImage],
) -> std::result::Result<String, OcrError> {
    let mut pages = Vec::with_capacity(images.len());
    for image in images {
        pages.push(backend.recognize(image)?);
    }
    Ok(pages.join("\n\n"))
}
