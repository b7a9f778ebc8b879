//! OCR backends used when a document has no usable text layer.
//!
//! Two Tesseract-based backends shell out to the `tesseract` executable; the
//! neural backend runs ONNX detection and recognition models in-process
//! (feature `native`).

mod preprocessing;
#[cfg(feature = "native")]
mod pure_engine;
mod tesseract;

pub use preprocessing::ImagePreprocessor;
#[cfg(feature = "native")]
pub use pure_engine::PureOcrEngine;
pub use tesseract::TesseractBackend;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::OcrError;
use crate::models::{DanfeConfig, ExtractionMethod};

/// OCR strategy, in the order the acquirer usually tries them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrMethod {
    /// Tesseract on the page image as-is.
    Basic,
    /// Tesseract after grayscale, contrast stretch, sharpening and thresholding.
    Enhanced,
    /// ONNX text detection and recognition.
    Neural,
}

impl OcrMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            OcrMethod::Basic => "basic_ocr",
            OcrMethod::Enhanced => "enhanced_ocr",
            OcrMethod::Neural => "neural_ocr",
        }
    }

    /// Extraction method recorded when this backend wins.
    pub fn extraction_method(&self) -> ExtractionMethod {
        match self {
            OcrMethod::Basic => ExtractionMethod::BasicOcr,
            OcrMethod::Enhanced => ExtractionMethod::EnhancedOcr,
            OcrMethod::Neural => ExtractionMethod::NeuralOcr,
        }
    }
}

impl fmt::Display for OcrMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something that turns a page image into text.
pub trait OcrBackend: Send + Sync {
    fn method(&self) -> OcrMethod;

    fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError>;
}

/// Build the backend for `method` from configuration.
///
/// The neural backend loads its models here, so a missing model directory
/// surfaces as [`OcrError::ModelLoad`] instead of failing on every page.
pub fn build_backend(method: OcrMethod, config: &DanfeConfig) -> Result<Box<dyn OcrBackend>, OcrError> {
    let acquisition = &config.acquisition;
    match method {
        OcrMethod::Basic => Ok(Box::new(
            TesseractBackend::new(&acquisition.tesseract_binary)
                .with_language(&acquisition.tesseract_language),
        )),
        OcrMethod::Enhanced => Ok(Box::new(
            TesseractBackend::new(&acquisition.tesseract_binary)
                .with_language(&acquisition.tesseract_language)
                .with_preprocessor(ImagePreprocessor::new()),
        )),
        #[cfg(feature = "native")]
        OcrMethod::Neural => Ok(Box::new(PureOcrEngine::from_config(config)?)),
        #[cfg(not(feature = "native"))]
        OcrMethod::Neural => Err(OcrError::Unavailable(
            "neural OCR requires the `native` feature".to_string(),
        )),
    }
}
