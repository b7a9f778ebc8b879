//! Invoice record produced from a DANFE.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::fiscal::TaxRegime;
use crate::invoice::rules::TaxId;

/// Structured data recovered from one DANFE.
///
/// Every field may be absent; a record with nothing but `source` and
/// `method = None` is the legitimate outcome for a document without text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    /// Caller-supplied source identifier (usually a file name).
    pub source: String,

    /// Hex blake3 digest of the document bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,

    /// Invoice number without leading zeros or thousands separators.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_date: Option<NaiveDate>,

    /// Issuing party (emitente).
    #[serde(default)]
    pub issuer: Party,

    /// Receiving party (destinatário).
    #[serde(default)]
    pub recipient: Party,

    /// Declared total of the invoice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<Decimal>,

    /// Which acquisition path produced the text.
    #[serde(default)]
    pub method: ExtractionMethod,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<LineItem>,

    #[serde(default, skip_serializing_if = "DeclaredTaxes::is_empty")]
    pub taxes: DeclaredTaxes,

    /// Fields that could not be recovered and other soft failures.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// A party (issuer or recipient) on the invoice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Party {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_id: Option<TaxId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Set only by enrichment (registry lookup or caller override).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regime: Option<TaxRegime>,

    /// State registration (IE) exemption, when a registry reported it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_registration_exempt: Option<bool>,
}

impl Party {
    pub fn is_empty(&self) -> bool {
        self.tax_id.is_none() && self.name.is_none()
    }

    /// Masked tax id or an empty string.
    pub fn tax_id_display(&self) -> String {
        self.tax_id.as_ref().map(TaxId::formatted).unwrap_or_default()
    }
}

/// A single product row of the DANFE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    /// Product code as printed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    pub description: String,

    pub quantity: Decimal,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    pub unit_value: Decimal,

    /// Line total.
    pub total: Decimal,

    /// Operation code (CFOP).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cfop: Option<String>,

    /// Product classification (NCM), 8 digits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ncm: Option<String>,

    /// CSOSN or O-CST as printed, possibly with the origin digit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub situation_code: Option<String>,
}

/// Tax amounts declared in the "cálculo do imposto" block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredTaxes {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icms: Option<Decimal>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipi: Option<Decimal>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pis: Option<Decimal>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cofins: Option<Decimal>,
}

impl DeclaredTaxes {
    pub fn is_empty(&self) -> bool {
        self.icms.is_none() && self.ipi.is_none() && self.pis.is_none() && self.cofins.is_none()
    }

    /// Fill fields that are still absent from `other`.
    pub fn fill_missing(&mut self, other: &DeclaredTaxes) {
        self.icms = self.icms.or(other.icms);
        self.ipi = self.ipi.or(other.ipi);
        self.pis = self.pis.or(other.pis);
        self.cofins = self.cofins.or(other.cofins);
    }
}

/// Acquisition path that produced the text a record was extracted from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Embedded PDF text layer.
    NativeText,
    /// Tesseract on the raw page image.
    BasicOcr,
    /// Tesseract after contrast and sharpening preprocessing.
    EnhancedOcr,
    /// ONNX detection and recognition models.
    NeuralOcr,
    /// Input was already plain text.
    PlainText,
    /// No method produced usable text.
    #[default]
    None,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::NativeText => "native_text",
            ExtractionMethod::BasicOcr => "basic_ocr",
            ExtractionMethod::EnhancedOcr => "enhanced_ocr",
            ExtractionMethod::NeuralOcr => "neural_ocr",
            ExtractionMethod::PlainText => "plain_text",
            ExtractionMethod::None => "none",
        }
    }
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl InvoiceRecord {
    /// Create an empty record for `source`.
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            content_hash: None,
            number: None,
            series: None,
            issue_date: None,
            issuer: Party::default(),
            recipient: Party::default(),
            total: None,
            method: ExtractionMethod::None,
            items: Vec::new(),
            taxes: DeclaredTaxes::default(),
            warnings: Vec::new(),
        }
    }

    /// Record for a document from which no text could be acquired.
    pub fn without_text(source: impl Into<String>, attempts: Vec<String>) -> Self {
        let mut record = Self::new(source);
        record.warnings.push("no usable text could be acquired".to_string());
        record.warnings.extend(attempts);
        record
    }

    pub fn with_content_hash(mut self, hash: impl Into<String>) -> Self {
        self.content_hash = Some(hash.into());
        self
    }

    pub fn with_issuer_regime(mut self, regime: TaxRegime) -> Self {
        self.issuer.regime = Some(regime);
        self
    }

    pub fn with_recipient_regime(mut self, regime: TaxRegime) -> Self {
        self.recipient.regime = Some(regime);
        self
    }

    /// Whether any field beyond the source was recovered.
    pub fn has_data(&self) -> bool {
        self.number.is_some()
            || self.issue_date.is_some()
            || !self.issuer.is_empty()
            || !self.recipient.is_empty()
            || self.total.is_some()
    }

    /// First operation code printed on a product row.
    pub fn primary_cfop(&self) -> Option<&str> {
        self.items.iter().find_map(|i| i.cfop.as_deref())
    }

    /// First tax-situation code printed on a product row.
    pub fn primary_situation_code(&self) -> Option<&str> {
        self.items.iter().find_map(|i| i.situation_code.as_deref())
    }

    /// Names of the header fields that were not recovered.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();

        if self.number.is_none() {
            missing.push("number");
        }
        if self.series.is_none() {
            missing.push("series");
        }
        if self.issue_date.is_none() {
            missing.push("issue_date");
        }
        if self.issuer.tax_id.is_none() {
            missing.push("issuer.tax_id");
        }
        if self.issuer.name.is_none() {
            missing.push("issuer.name");
        }
        if self.recipient.tax_id.is_none() {
            missing.push("recipient.tax_id");
        }
        if self.recipient.name.is_none() {
            missing.push("recipient.name");
        }
        if self.total.is_none() {
            missing.push("total");
        }

        missing
    }

    /// Consistency checks that do not block extraction.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if let Some(total) = self.total {
            if total.is_sign_negative() {
                issues.push(format!("Total is negative ({})", total));
            }

            if !self.items.is_empty() {
                let lines: Decimal = self.items.iter().map(|i| i.total).sum();
                // IPI, freight and discounts make the note differ from the
                // product sum, so only flag a line sum above the note total.
                if lines - total > Decimal::new(1, 2) {
                    issues.push(format!(
                        "Line item total ({}) exceeds invoice total ({})",
                        lines, total
                    ));
                }
            }
        }

        for party in [&self.issuer, &self.recipient] {
            if let Some(id) = &party.tax_id {
                if !id.is_validated() {
                    issues.push(format!("Tax id {} has inconsistent check digits", id));
                }
            }
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item(total: Decimal) -> LineItem {
        LineItem {
            code: None,
            description: "Produto".to_string(),
            quantity: dec!(1),
            unit: None,
            unit_value: total,
            total,
            cfop: Some("1102".to_string()),
            ncm: None,
            situation_code: Some("00".to_string()),
        }
    }

    #[test]
    fn test_empty_record_has_no_data() {
        let record = InvoiceRecord::without_text("a.pdf", vec!["basic_ocr: failed".to_string()]);
        assert!(!record.has_data());
        assert_eq!(record.method, ExtractionMethod::None);
        assert_eq!(record.warnings.len(), 2);
        assert_eq!(record.missing_fields().len(), 8);
    }

    #[test]
    fn test_validate_flags_line_sum_above_total() {
        let mut record = InvoiceRecord::new("a.pdf");
        record.total = Some(dec!(100.00));
        record.items = vec![item(dec!(80.00)), item(dec!(30.00))];
        assert_eq!(record.validate().len(), 1);

        record.total = Some(dec!(120.00));
        assert!(record.validate().is_empty());
    }

    #[test]
    fn test_primary_codes() {
        let mut record = InvoiceRecord::new("a.pdf");
        record.items = vec![item(dec!(1.00))];
        assert_eq!(record.primary_cfop(), Some("1102"));
        assert_eq!(record.primary_situation_code(), Some("00"));
    }

    #[test]
    fn test_fill_missing_taxes() {
        let mut taxes = DeclaredTaxes {
            icms: Some(dec!(10)),
            ..Default::default()
        };
        taxes.fill_missing(&DeclaredTaxes {
            icms: Some(dec!(99)),
            pis: Some(dec!(1.65)),
            ..Default::default()
        });
        assert_eq!(taxes.icms, Some(dec!(10)));
        assert_eq!(taxes.pis, Some(dec!(1.65)));
    }

    #[test]
    fn test_serialization_skips_absent_fields() {
        let record = InvoiceRecord::new("a.pdf");
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("number").is_none());
        assert!(json.get("taxes").is_none());
        assert_eq!(json["method"], "none");
    }
}
