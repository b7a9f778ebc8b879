//! Rule-based field extractors for DANFE documents.

pub mod tax_id;
pub mod dates;
pub mod money;
pub mod patterns;

pub use tax_id::{
    cnpj_check_digits, cpf_check_digits, format_cnpj, format_cpf, normalize_to_root_establishment,
    validate_cnpj, validate_cpf, validate_or_derive_check_digits, TaxId, TaxIdExtractor, TaxIdKind,
    Validation,
};
pub use dates::{extract_issue_date, DateExtractor};
pub use money::{
    format_money, last_nonzero_money, parse_money, parse_quantity, MoneyExtractor, MoneyParseError,
};
pub use patterns::*;

/// Trait for field extractors.
pub trait FieldExtractor {
    /// The type of value this extractor produces.
    type Output;

    /// Extract the field from text.
    fn extract(&self, text: &str) -> Option<Self::Output>;

    /// Extract all occurrences of the field.
    fn extract_all(&self, text: &str) -> Vec<Self::Output>;
}

/// Extraction context with confidence scores.
#[derive(Debug, Clone)]
pub struct ExtractionMatch<T> {
    /// Extracted value.
    pub value: T,
    /// Confidence score (0.0 - 1.0).
    pub confidence: f32,
    /// Byte range in the source text.
    pub position: Option<(usize, usize)>,
    /// Source text that was matched.
    pub source: String,
}

impl<T> ExtractionMatch<T> {
    pub fn new(value: T, confidence: f32, source: impl Into<String>) -> Self {
        Self {
            value,
            confidence,
            position: None,
            source: source.into(),
        }
    }

    pub fn with_position(mut self, start: usize, end: usize) -> Self {
        self.position = Some((start, end));
        self
    }
}
