//! Core library for DANFE (Brazilian electronic invoice) processing.
//!
//! This crate provides:
//! - Text acquisition from PDFs and scans (embedded text, Tesseract, ONNX OCR)
//! - DANFE field extraction (parties, number, series, date, totals, products, taxes)
//! - Fiscal code tables (CFOP, NCM, CSOSN, CST, state ICMS rates)
//! - Registry lookups of legal entities and their tax regime
//! - ICMS, PIS and COFINS credit determination with a suggested accounting entry

pub mod acquisition;
pub mod cache;
pub mod error;
pub mod fiscal;
pub mod invoice;
pub mod lookup;
pub mod models;
pub mod ocr;
pub mod pdf;
pub mod pipeline;
pub mod semantic;

pub use acquisition::{Acquisition, DocumentKind, DocumentReader, TextAcquirer};
pub use cache::{CacheStore, JsonDirStore, MemoryStore};
pub use error::{DanfeError, Result};
pub use fiscal::{BatchAnalysis, CreditDetermination, CreditEngine, CreditInput, TaxRegime};
pub use invoice::{DanfeParser, ExtractionResult, InvoiceParser};
pub use lookup::{EntityInfo, EntityLookupService, EntityRegistry, RegistrySource};
pub use models::{DanfeConfig, ExtractionMethod, InvoiceRecord, LineItem, Party};
pub use ocr::{OcrBackend, OcrMethod};
pub use pipeline::{Pipeline, ProcessedDocument};
pub use semantic::{SemanticExtractor, SemanticPayload};
