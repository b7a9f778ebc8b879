//! Data models and configuration.

pub mod config;
pub mod invoice;

pub use config::DanfeConfig;
pub use invoice::{DeclaredTaxes, ExtractionMethod, InvoiceRecord, LineItem, Party};
