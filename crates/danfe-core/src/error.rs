//! Error types for the danfe-core library.

use thiserror::Error;

/// Main error type for the danfe library.
#[derive(Error, Debug)]
pub enum DanfeError {
    /// PDF processing error.
    #[error("PDF error: {0}")]
    Pdf(#[from] PdfError),

    /// OCR processing error.
    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    /// Registry lookup error.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Cache store error.
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// Semantic extraction collaborator error.
    #[error("semantic extraction error: {0}")]
    Semantic(#[from] SemanticError),

    /// Image processing error.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors related to PDF processing.
#[derive(Error, Debug)]
pub enum PdfError {
    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// Failed to extract text from PDF.
    #[error("failed to extract text: {0}")]
    TextExtraction(String),

    /// Failed to extract images from PDF.
    #[error("failed to extract images: {0}")]
    ImageExtraction(String),

    /// The PDF is encrypted and cannot be processed.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// Invalid page number requested.
    #[error("invalid page number: {0}")]
    InvalidPage(u32),
}

/// Errors related to OCR processing.
#[derive(Error, Debug)]
pub enum OcrError {
    /// Failed to load OCR models.
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// The OCR engine is not installed or not reachable.
    #[error("OCR engine unavailable: {0}")]
    Unavailable(String),

    /// Text recognition failed.
    #[error("text recognition failed: {0}")]
    Recognition(String),

    /// Image preprocessing failed.
    #[error("preprocessing failed: {0}")]
    Preprocessing(String),

    /// Invalid image format or dimensions.
    #[error("invalid image: {0}")]
    InvalidImage(String),
}

/// Errors returned by an external legal-entity registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Network or HTTP transport error (includes timeouts).
    #[error("network error: {0}")]
    Network(String),

    /// The registry throttled the request.
    #[error("rate limited by {0}")]
    RateLimited(String),

    /// The registry has no record for the identifier.
    #[error("not found: {0}")]
    NotFound(String),

    /// The registry answered with a non-success status or an error payload.
    #[error("API error: {0}")]
    Api(String),

    /// The response body could not be decoded.
    #[error("parse error: {0}")]
    Parse(String),

    /// The identifier kind is not supported by this registry.
    #[error("unsupported identifier: {0}")]
    Unsupported(String),
}

/// Errors from a cache store backend.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Filesystem error.
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Entry could not be encoded or decoded.
    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A writer panicked while holding the store's lock.
    #[error("cache lock poisoned")]
    Poisoned,
}

/// Errors from the semantic extraction collaborator.
#[derive(Error, Debug)]
pub enum SemanticError {
    /// The collaborator could not be reached or refused the request.
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),

    /// The payload was not valid JSON in the expected shape.
    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// Result type for the danfe library.
pub type Result<T> = std::result::Result<T, DanfeError>;
