//! Optional semantic extraction collaborator.
//!
//! A collaborator (typically a language model behind an API) reads the raw
//! document text and returns line items and declared tax amounts. Its output
//! is validated before use and only fills what deterministic extraction
//! left empty.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::SemanticError;
use crate::models::invoice::{DeclaredTaxes, InvoiceRecord, LineItem};

/// Collaborator contract.
pub trait SemanticExtractor: Send + Sync {
    fn extract(&self, text: &str) -> Result<SemanticPayload, SemanticError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticItem {
    #[serde(default, alias = "codigo")]
    pub code: Option<String>,
    #[serde(default, alias = "descricao")]
    pub description: String,
    #[serde(default)]
    pub ncm: Option<String>,
    #[serde(default)]
    pub cfop: Option<String>,
    #[serde(default, alias = "csosn_ou_cst")]
    pub situation_code: Option<String>,
    #[serde(default, alias = "quantidade")]
    pub quantity: Option<Decimal>,
    #[serde(default, alias = "valor_unitario")]
    pub unit_value: Option<Decimal>,
    #[serde(default, alias = "valor_total")]
    pub total: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemanticTaxes {
    #[serde(default, alias = "valor_icms")]
    pub icms: Option<Decimal>,
    #[serde(default, alias = "valor_ipi")]
    pub ipi: Option<Decimal>,
    #[serde(default, alias = "valor_pis")]
    pub pis: Option<Decimal>,
    #[serde(default, alias = "valor_cofins")]
    pub cofins: Option<Decimal>,
}

/// Best-effort structured payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SemanticPayload {
    #[serde(default, alias = "itens")]
    pub items: Vec<SemanticItem>,
    #[serde(default, alias = "impostos")]
    pub taxes: SemanticTaxes,
}

fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}

impl SemanticPayload {
    /// Decode a collaborator response.
    ///
    /// Markdown code fences are tolerated. A bare array is read as the item
    /// list.
    pub fn from_json(raw: &str) -> Result<Self, SemanticError> {
        let value: Value = serde_json::from_str(strip_fences(raw))
            .map_err(|e| SemanticError::Malformed(e.to_string()))?;

        match value {
            Value::Array(_) => {
                let items = serde_json::from_value(value)
                    .map_err(|e| SemanticError::Malformed(e.to_string()))?;
                Ok(Self {
                    items,
                    taxes: SemanticTaxes::default(),
                })
            }
            Value::Object(_) => {
                serde_json::from_value(value).map_err(|e| SemanticError::Malformed(e.to_string()))
            }
            other => Err(SemanticError::Malformed(format!(
                "expected an object or array, got {}",
                other
            ))),
        }
    }

    /// Drop items without a description or with a non-positive total, and
    /// negative tax amounts.
    pub fn validated(self) -> Self {
        let before = self.items.len();
        let items: Vec<SemanticItem> = self
            .items
            .into_iter()
            .filter(|item| !item.description.trim().is_empty() && item.total > Decimal::ZERO)
            .collect();
        if items.len() < before {
            debug!("Discarded {} invalid semantic items", before - items.len());
        }

        let non_negative = |v: Option<Decimal>| v.filter(|a| !a.is_sign_negative());
        Self {
            items,
            taxes: SemanticTaxes {
                icms: non_negative(self.taxes.icms),
                ipi: non_negative(self.taxes.ipi),
                pis: non_negative(self.taxes.pis),
                cofins: non_negative(self.taxes.cofins),
            },
        }
    }

    pub fn line_items(&self) -> Vec<LineItem> {
        self.items
            .iter()
            .map(|item| {
                let quantity = item.quantity.filter(|q| *q > Decimal::ZERO).unwrap_or(Decimal::ONE);
                LineItem {
                    code: item.code.clone().filter(|c| !c.trim().is_empty()),
                    description: item.description.trim().to_string(),
                    quantity,
                    unit: None,
                    unit_value: item.unit_value.unwrap_or_else(|| item.total / quantity),
                    total: item.total,
                    cfop: item.cfop.clone().filter(|c| !c.trim().is_empty()),
                    ncm: item.ncm.clone().filter(|c| !c.trim().is_empty()),
                    situation_code: item.situation_code.clone().filter(|c| !c.trim().is_empty()),
                }
            })
            .collect()
    }

    /// Fill the items and taxes that deterministic extraction did not find.
    pub fn enrich(self, mut record: InvoiceRecord) -> InvoiceRecord {
        let payload = self.validated();

        if record.items.is_empty() && !payload.items.is_empty() {
            record.items = payload.line_items();
        }
        record.taxes.fill_missing(&DeclaredTaxes {
            icms: payload.taxes.icms,
            ipi: payload.taxes.ipi,
            pis: payload.taxes.pis,
            cofins: payload.taxes.cofins,
        });
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const RESPONSE: &str = r#"```json
{
  "itens": [
    {"codigo": "10", "descricao": "Cimento CP II", "ncm": "25232910", "cfop": "1102",
     "quantidade": 10, "valor_unitario": 32.5, "valor_total": 325.0, "csosn_ou_cst": "00"},
    {"descricao": "", "valor_total": 10},
    {"descricao": "Frete", "valor_total": 0}
  ],
  "impostos": {"valor_icms": 58.5, "valor_pis": -1}
}
```"#;

    #[test]
    fn test_fenced_payload_is_decoded() {
        let payload = SemanticPayload::from_json(RESPONSE).unwrap();
        assert_eq!(payload.items.len(), 3);
        assert_eq!(payload.taxes.icms, Some(dec!(58.5)));
    }

    #[test]
    fn test_validation_discards_bad_entries() {
        let payload = SemanticPayload::from_json(RESPONSE).unwrap().validated();
        assert_eq!(payload.items.len(), 1);
        assert_eq!(payload.taxes.pis, None);

        let items = payload.line_items();
        assert_eq!(items[0].quantity, dec!(10));
        assert_eq!(items[0].situation_code.as_deref(), Some("00"));
    }

    #[test]
    fn test_bare_array() {
        let payload =
            SemanticPayload::from_json(r#"[{"descricao": "Areia", "valor_total": 80}]"#).unwrap();
        assert_eq!(payload.items.len(), 1);
        assert!(payload.taxes.icms.is_none());
    }

    #[test]
    fn test_malformed() {
        assert!(SemanticPayload::from_json("not json").is_err());
        assert!(SemanticPayload::from_json("42").is_err());
    }

    #[test]
    fn test_enrich_only_fills_gaps() {
        let mut record = InvoiceRecord::new("nf.pdf");
        record.taxes.icms = Some(dec!(60.00));

        let record = SemanticPayload::from_json(RESPONSE).unwrap().enrich(record);
        assert_eq!(record.items.len(), 1);
        assert_eq!(record.taxes.icms, Some(dec!(60.00)));
        assert!(record.taxes.pis.is_none());
    }
}
