//! Configuration structures for the DANFE pipeline.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::lookup::RegistrySource;
use crate::ocr::OcrMethod;

/// Main configuration for the danfe pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DanfeConfig {
    /// Text acquisition (native text and OCR fallback).
    pub acquisition: AcquisitionConfig,

    /// Field extraction heuristics.
    pub extraction: ExtractionConfig,

    /// Legal-entity registry lookups.
    pub lookup: LookupConfig,

    /// Credit determination policy.
    pub fiscal: FiscalConfig,

    /// Persistent caches.
    pub cache: CacheConfig,

    /// Neural OCR model files.
    pub models: ModelConfig,

    /// Batch processing.
    pub batch: BatchConfig,
}

/// Text acquisition configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Minimum trimmed text length to accept a method's output.
    pub min_text_length: usize,

    /// OCR backends tried in order when the text layer is too short.
    pub ocr_backends: Vec<OcrMethod>,

    /// Tesseract executable.
    pub tesseract_binary: PathBuf,

    /// Tesseract language pack.
    pub tesseract_language: String,

    /// Maximum pages to OCR (0 = unlimited).
    pub max_pages: usize,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            min_text_length: 50,
            ocr_backends: vec![OcrMethod::Basic, OcrMethod::Enhanced, OcrMethod::Neural],
            tesseract_binary: PathBuf::from("tesseract"),
            tesseract_language: "por".to_string(),
            max_pages: 10,
        }
    }
}

/// Field extraction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Earliest plausible issue year.
    pub min_year: i32,

    /// Latest plausible issue year.
    pub max_year: i32,

    /// Lines inspected below a total heading.
    pub total_lookahead: usize,

    /// Largest value accepted as an invoice number.
    pub max_invoice_number: u32,

    /// Drop tax ids whose check digits do not verify instead of tagging them.
    pub require_valid_tax_ids: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_year: 2006,
            max_year: 2035,
            total_lookahead: 6,
            max_invoice_number: 999_999,
            require_valid_tax_ids: false,
        }
    }
}

/// Registry lookup configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    /// Query external registries at all.
    pub enabled: bool,

    /// Registries tried in order.
    pub sources: Vec<RegistrySource>,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,

    /// Pause between falling back to the next registry, in milliseconds.
    pub pause_ms: u64,

    /// User-Agent header sent to registries.
    pub user_agent: String,

    /// Query the head office instead of the branch printed on the document.
    pub use_root_establishment: bool,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sources: vec![
                RegistrySource::BrasilApi,
                RegistrySource::CnpjWs,
                RegistrySource::ReceitaWs,
            ],
            timeout_secs: 10,
            pause_ms: 0,
            user_agent: format!("danfe/{}", env!("CARGO_PKG_VERSION")),
            use_root_establishment: true,
        }
    }
}

/// Reference rates for the misclassification exposure report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceRates {
    pub icms: Decimal,
    pub pis: Decimal,
    pub cofins: Decimal,
}

impl Default for ReferenceRates {
    fn default() -> Self {
        Self {
            icms: Decimal::new(18, 2),
            pis: Decimal::new(165, 4),
            cofins: Decimal::new(765, 4),
        }
    }
}

/// Chart of accounts used by the suggested accounting entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartOfAccounts {
    pub inventory: String,
    pub icms_recoverable: String,
    pub pis_recoverable: String,
    pub cofins_recoverable: String,
    pub payables: String,
}

impl Default for ChartOfAccounts {
    fn default() -> Self {
        Self {
            inventory: "1.1.1.2.001 - Estoque de Mercadorias".to_string(),
            icms_recoverable: "1.1.2.1.001 - ICMS a Recuperar".to_string(),
            pis_recoverable: "1.1.2.1.002 - PIS a Recuperar".to_string(),
            cofins_recoverable: "1.1.2.1.003 - COFINS a Recuperar".to_string(),
            payables: "2.1.1.001 - Fornecedores a Pagar".to_string(),
        }
    }
}

/// Credit determination policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FiscalConfig {
    /// Rates used for the "undue tax if miscoded" exposure.
    pub reference_rates: ReferenceRates,

    /// Treat a normal-regime recipient of unknown profit method as non-cumulative.
    pub unspecified_normal_is_non_cumulative: bool,

    pub accounts: ChartOfAccounts,
}

impl Default for FiscalConfig {
    fn default() -> Self {
        Self {
            reference_rates: ReferenceRates::default(),
            unspecified_normal_is_non_cumulative: true,
            accounts: ChartOfAccounts::default(),
        }
    }
}

/// Persistent cache configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory for extraction and lookup caches; in-memory only when unset.
    pub directory: Option<PathBuf>,
}

/// Neural OCR model files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Directory containing model files.
    pub model_dir: PathBuf,

    /// Text detection model file name.
    pub detection_model: String,

    /// Text recognition model file name.
    pub recognition_model: String,

    /// Character dictionary file name.
    pub dictionary: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            detection_model: "det.onnx".to_string(),
            recognition_model: "latin_rec.onnx".to_string(),
            dictionary: "latin_dict.txt".to_string(),
        }
    }
}

/// Batch processing configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Worker threads (0 = one per core).
    pub workers: usize,
}

impl DanfeConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }

    /// Get full path to a model file.
    pub fn model_path(&self, model_name: &str) -> PathBuf {
        self.models.model_dir.join(model_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: DanfeConfig =
            serde_json::from_str(r#"{"extraction": {"min_year": 2010}}"#).unwrap();
        assert_eq!(config.extraction.min_year, 2010);
        assert_eq!(config.extraction.max_year, 2035);
        assert_eq!(config.acquisition.min_text_length, 50);
        assert_eq!(config.fiscal.reference_rates.icms, Decimal::new(18, 2));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = DanfeConfig::default();
        config.lookup.enabled = false;
        config.batch.workers = 3;
        config.save(&path).unwrap();

        let loaded = DanfeConfig::from_file(&path).unwrap();
        assert!(!loaded.lookup.enabled);
        assert_eq!(loaded.batch.workers, 3);
        assert_eq!(loaded.acquisition.ocr_backends.len(), 3);
    }
}
