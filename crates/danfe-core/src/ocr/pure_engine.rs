//! Neural OCR backend using `pure-onnx-ocr`.

use image::{DynamicImage, GenericImageView};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

use super::{OcrBackend, OcrMethod};
use crate::error::OcrError;
use crate::models::DanfeConfig;
use crate::models::config::ModelConfig;

/// Pixel rows treated as the same text line when ordering boxes.
const ROW_HEIGHT: f64 = 20.0;

/// ONNX detection + recognition engine (pure Rust, no external runtime).
pub struct PureOcrEngine {
    engine: pure_onnx_ocr::engine::OcrEngine,
}

struct Region {
    x: f64,
    y: f64,
    text: String,
}

impl PureOcrEngine {
    /// Load the models named in `models` from its model directory.
    pub fn from_models(models: &ModelConfig) -> Result<Self, OcrError> {
        Self::from_paths(
            &models.model_dir.join(&models.detection_model),
            &models.model_dir.join(&models.recognition_model),
            &models.model_dir.join(&models.dictionary),
        )
    }

    pub fn from_config(config: &DanfeConfig) -> Result<Self, OcrError> {
        Self::from_models(&config.models)
    }

    fn from_paths(det_path: &Path, rec_path: &Path, dict_path: &Path) -> Result<Self, OcrError> {
        for path in [det_path, rec_path, dict_path] {
            if !path.exists() {
                return Err(OcrError::ModelLoad(format!(
                    "model file not found: {}",
                    path.display()
                )));
            }
        }

        let engine = pure_onnx_ocr::engine::OcrEngineBuilder::new()
            .det_model_path(det_path)
            .rec_model_path(rec_path)
            .dictionary_path(dict_path)
            .build()
            .map_err(|e| OcrError::ModelLoad(format!("pure-onnx-ocr: {}", e)))?;

        info!("Loaded neural OCR models from {}", det_path.display());

        Ok(Self { engine })
    }
}

impl OcrBackend for PureOcrEngine {
    fn method(&self) -> OcrMethod {
        OcrMethod::Neural
    }

    fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError> {
        let start = Instant::now();
        let (width, height) = image.dimensions();

        let results = self
            .engine
            .run_from_image(image)
            .map_err(|e| OcrError::Recognition(format!("pure-onnx-ocr: {}", e)))?;

        let mut regions: Vec<Region> = results
            .iter()
            .map(|r| {
                let (x, y) = r
                    .bounding_box
                    .exterior()
                    .coords()
                    .fold((f64::INFINITY, f64::INFINITY), |(x, y), c| (x.min(c.x), y.min(c.y)));
                Region {
                    x,
                    y,
                    text: r.text.replace("[UNK]", " "),
                }
            })
            .collect();

        // Reading order: rows top to bottom, then left to right
        regions.sort_by(|a, b| {
            let row_a = (a.y / ROW_HEIGHT) as i64;
            let row_b = (b.y / ROW_HEIGHT) as i64;
            row_a
                .cmp(&row_b)
                .then(a.x.partial_cmp(&b.x).unwrap_or(std::cmp::Ordering::Equal))
        });

        let text = regions
            .iter()
            .map(|r| r.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        debug!(
            "Neural OCR on {}x{}: {} regions in {}ms",
            width,
            height,
            regions.len(),
            start.elapsed().as_millis()
        );

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_models_fail_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let models = ModelConfig {
            model_dir: dir.path().to_path_buf(),
            ..Default::default()
        };

        let err = PureOcrEngine::from_models(&models).err().unwrap();
        assert!(matches!(err, OcrError::ModelLoad(_)));
    }
}
