//! Tesseract command-line backend.

use image::DynamicImage;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;
use tracing::{debug, trace};

use super::{ImagePreprocessor, OcrBackend, OcrMethod};
use crate::error::OcrError;

/// Runs the `tesseract` executable on a temporary PNG.
///
/// With a preprocessor attached this is the enhanced backend, otherwise the
/// basic one.
pub struct TesseractBackend {
    binary: PathBuf,
    language: String,
    preprocessor: Option<ImagePreprocessor>,
}

impl TesseractBackend {
    pub fn new(binary: impl AsRef<Path>) -> Self {
        Self {
            binary: binary.as_ref().to_path_buf(),
            language: "por".to_string(),
            preprocessor: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_preprocessor(mut self, preprocessor: ImagePreprocessor) -> Self {
        self.preprocessor = Some(preprocessor);
        self
    }

    fn run(&self, image: &DynamicImage) -> Result<String, OcrError> {
        let file = tempfile::Builder::new()
            .prefix("danfe-page-")
            .suffix(".png")
            .tempfile()
            .map_err(|e| OcrError::Preprocessing(format!("temp file: {}", e)))?;

        image
            .save_with_format(file.path(), image::ImageFormat::Png)
            .map_err(|e| OcrError::InvalidImage(e.to_string()))?;

        trace!(
            "Running {} on {} (-l {})",
            self.binary.display(),
            file.path().display(),
            self.language
        );

        let output = Command::new(&self.binary)
            .arg(file.path())
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => {
                    OcrError::Unavailable(format!("{} not found", self.binary.display()))
                }
                _ => OcrError::Unavailable(e.to_string()),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Recognition(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl OcrBackend for TesseractBackend {
    fn method(&self) -> OcrMethod {
        if self.preprocessor.is_some() {
            OcrMethod::Enhanced
        } else {
            OcrMethod::Basic
        }
    }

    fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError> {
        let start = Instant::now();

        let text = match &self.preprocessor {
            Some(preprocessor) => self.run(&preprocessor.enhance(image))?,
            None => self.run(image)?,
        };

        debug!(
            "{} recognized {} chars in {}ms",
            self.method(),
            text.trim().len(),
            start.elapsed().as_millis()
        );

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_depends_on_preprocessor() {
        let basic = TesseractBackend::new("tesseract");
        assert_eq!(basic.method(), OcrMethod::Basic);

        let enhanced = TesseractBackend::new("tesseract").with_preprocessor(ImagePreprocessor::new());
        assert_eq!(enhanced.method(), OcrMethod::Enhanced);
    }

    #[test]
    fn test_missing_binary_is_unavailable() {
        let backend = TesseractBackend::new("/nonexistent/danfe-tesseract");
        let image = DynamicImage::new_luma8(8, 8);

        let err = backend.recognize(&image).unwrap_err();
        assert!(matches!(err, OcrError::Unavailable(_)));
    }
}
