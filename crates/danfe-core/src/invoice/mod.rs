//! DANFE field extraction module.

mod items;
mod parser;
pub mod rules;

pub use items::{extract_line_items, parse_product_row};
pub use parser::{DanfeParser, ExtractionResult, Section};

/// Trait for turning acquired document text into an invoice record.
///
/// Parsing never fails: fields that cannot be recovered are left absent and
/// reported in the record's warnings.
pub trait InvoiceParser {
    /// Parse the text of the document identified by `source`.
    fn parse(&self, source: &str, text: &str) -> ExtractionResult;
}
