//! Batch-level financial metrics and supplier compatibility alerts.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::invoice::rules::format_money;
use crate::models::invoice::InvoiceRecord;

use super::regime::TaxRegime;

/// Share of the value at risk when a normal-regime supplier bills an
/// IE-exempt recipient with ICMS highlighted.
const EXEMPT_RECIPIENT_EXPOSURE: Decimal = Decimal::from_parts(205, 0, 0, false, 3);

/// Share above which purchases count as concentrated, in percent.
const CONCENTRATION_THRESHOLD: Decimal = Decimal::from_parts(70, 0, 0, false, 0);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinancialMetrics {
    pub total: Decimal,
    pub mean: Decimal,
    pub max: Decimal,
    pub min: Decimal,
    pub count: usize,
    /// Share of the three largest invoices in the total, in percent.
    pub top3_concentration: Decimal,
}

impl FinancialMetrics {
    /// Invoices without a total count as zero.
    pub fn from_records(records: &[InvoiceRecord]) -> Self {
        let mut values: Vec<Decimal> = records
            .iter()
            .map(|r| r.total.unwrap_or(Decimal::ZERO))
            .collect();
        if values.is_empty() {
            return Self::default();
        }

        values.sort_by(|a, b| b.cmp(a));
        let total: Decimal = values.iter().copied().sum();
        let top3: Decimal = values.iter().take(3).copied().sum();

        Self {
            total,
            mean: (total / Decimal::from(values.len())).round_dp(2),
            max: values[0],
            min: values[values.len() - 1],
            count: values.len(),
            top3_concentration: if total > Decimal::ZERO {
                (top3 / total * Decimal::ONE_HUNDRED).round_dp(1)
            } else {
                Decimal::ZERO
            },
        }
    }

    pub fn is_concentrated(&self) -> bool {
        self.top3_concentration > CONCENTRATION_THRESHOLD
    }
}

/// Purchases aggregated per supplier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplierSummary {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_id: Option<String>,
    pub total: Decimal,
    pub mean: Decimal,
    pub count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regime: Option<TaxRegime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_registration_exempt: Option<bool>,
}

impl SupplierSummary {
    pub fn is_simplified(&self) -> bool {
        matches!(self.regime, Some(TaxRegime::Simplified))
    }

    pub fn regime_known(&self) -> bool {
        self.regime.is_some_and(|r| r.is_known())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Medium,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// IE-exempt recipient billed by a supplier that highlights ICMS.
    IcmsOnExemptRecipient,
    /// Simplified supplier; no PIS/COFINS credit available.
    SimplifiedSupplier,
    /// Supplier regime could not be determined.
    UnknownSupplierRegime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityAlert {
    pub kind: AlertKind,
    pub severity: Severity,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    pub supplier: String,
    pub value: Decimal,
    pub message: String,
    pub impact: String,
}

/// The receiving company the batch is analyzed for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecipientProfile {
    pub regime: TaxRegime,
    pub state_registration_exempt: bool,
}

/// Financial and compatibility analysis of a batch of invoices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchAnalysis {
    pub metrics: FinancialMetrics,
    pub suppliers: Vec<SupplierSummary>,
    pub alerts: Vec<CompatibilityAlert>,
}

impl BatchAnalysis {
    pub fn from_records(records: &[InvoiceRecord], recipient: RecipientProfile) -> Self {
        Self {
            metrics: FinancialMetrics::from_records(records),
            suppliers: suppliers(records),
            alerts: records
                .iter()
                .flat_map(|r| compatibility_alerts(r, recipient))
                .collect(),
        }
    }

    pub fn simplified_suppliers(&self) -> usize {
        self.suppliers.iter().filter(|s| s.is_simplified()).count()
    }

    pub fn unknown_regime_suppliers(&self) -> usize {
        self.suppliers.iter().filter(|s| !s.regime_known()).count()
    }

    /// The `n` largest invoices of the batch.
    pub fn largest<'a>(records: &'a [InvoiceRecord], n: usize) -> Vec<&'a InvoiceRecord> {
        let mut sorted: Vec<&InvoiceRecord> = records.iter().collect();
        sorted.sort_by(|a, b| b.total.unwrap_or_default().cmp(&a.total.unwrap_or_default()));
        sorted.truncate(n);
        sorted
    }
}

fn supplier_label(record: &InvoiceRecord) -> String {
    record
        .issuer
        .name
        .clone()
        .or_else(|| record.issuer.tax_id.as_ref().map(|id| id.formatted()))
        .unwrap_or_else(|| "(desconhecido)".to_string())
}

fn suppliers(records: &[InvoiceRecord]) -> Vec<SupplierSummary> {
    let mut groups: HashMap<String, SupplierSummary> = HashMap::new();

    for record in records {
        let name = supplier_label(record);
        let summary = groups.entry(name.clone()).or_insert_with(|| SupplierSummary {
            name,
            tax_id: record.issuer.tax_id.as_ref().map(|id| id.formatted()),
            total: Decimal::ZERO,
            mean: Decimal::ZERO,
            count: 0,
            regime: record.issuer.regime,
            state_registration_exempt: record.issuer.state_registration_exempt,
        });
        summary.total += record.total.unwrap_or(Decimal::ZERO);
        summary.count += 1;
    }

    let mut summaries: Vec<SupplierSummary> = groups
        .into_values()
        .map(|mut s| {
            s.mean = (s.total / Decimal::from(s.count)).round_dp(2);
            s
        })
        .collect();
    summaries.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.name.cmp(&b.name)));
    summaries
}

/// Alerts for one invoice as seen by `recipient`.
pub fn compatibility_alerts(
    record: &InvoiceRecord,
    recipient: RecipientProfile,
) -> Vec<CompatibilityAlert> {
    let mut alerts = Vec::new();
    let value = record.total.unwrap_or(Decimal::ZERO);
    let regime = record.issuer.regime.filter(TaxRegime::is_known);

    let alert = |kind, severity, message: &str, impact: String| CompatibilityAlert {
        kind,
        severity,
        source: record.source.clone(),
        number: record.number.clone(),
        supplier: supplier_label(record),
        value,
        message: message.to_string(),
        impact,
    };

    if recipient.state_registration_exempt && !regime.is_some_and(|r| r.is_simplified()) {
        let impact = if value > Decimal::ZERO {
            format!("R$ {}", format_money(value * EXEMPT_RECIPIENT_EXPOSURE))
        } else {
            "Not computed".to_string()
        };
        alerts.push(alert(
            AlertKind::IcmsOnExemptRecipient,
            Severity::Critical,
            "Normal-regime supplier billing an IE-exempt recipient; check the CFOP (expected 5.949)",
            impact,
        ));
    }

    if regime == Some(TaxRegime::Simplified) && !recipient.regime.is_simplified() {
        alerts.push(alert(
            AlertKind::SimplifiedSupplier,
            Severity::Info,
            "Simplified-regime supplier; no PIS/COFINS credit",
            "No credit available".to_string(),
        ));
    }

    if regime.is_none() {
        alerts.push(alert(
            AlertKind::UnknownSupplierRegime,
            Severity::Medium,
            "Supplier regime not identified; validate through the registry or manually",
            "Compliance cannot be assessed".to_string(),
        ));
    }

    alerts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fiscal::NormalRegime;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn record(supplier: &str, total: Decimal, regime: Option<TaxRegime>) -> InvoiceRecord {
        let mut r = InvoiceRecord::new(format!("{}.pdf", supplier));
        r.issuer.name = Some(supplier.to_string());
        r.total = Some(total);
        r.issuer.regime = regime;
        r
    }

    #[test]
    fn test_metrics() {
        let records = vec![
            record("A", dec!(100), None),
            record("B", dec!(300), None),
            record("C", dec!(200), None),
            record("D", dec!(400), None),
        ];
        let m = FinancialMetrics::from_records(&records);

        assert_eq!(m.total, dec!(1000));
        assert_eq!(m.mean, dec!(250));
        assert_eq!(m.max, dec!(400));
        assert_eq!(m.min, dec!(100));
        assert_eq!(m.count, 4);
        assert_eq!(m.top3_concentration, dec!(90.0));
        assert!(m.is_concentrated());
    }

    #[test]
    fn test_empty_batch() {
        let m = FinancialMetrics::from_records(&[]);
        assert_eq!(m, FinancialMetrics::default());
    }

    #[test]
    fn test_suppliers_grouped_and_sorted() {
        let records = vec![
            record("ALFA", dec!(100), Some(TaxRegime::Simplified)),
            record("BETA", dec!(500), None),
            record("ALFA", dec!(300), Some(TaxRegime::Simplified)),
        ];
        let analysis = BatchAnalysis::from_records(&records, RecipientProfile::default());

        assert_eq!(analysis.suppliers.len(), 2);
        assert_eq!(analysis.suppliers[0].name, "BETA");
        assert_eq!(analysis.suppliers[1].total, dec!(400));
        assert_eq!(analysis.suppliers[1].mean, dec!(200));
        assert_eq!(analysis.simplified_suppliers(), 1);
        assert_eq!(analysis.unknown_regime_suppliers(), 1);
    }

    #[test]
    fn test_alerts_for_exempt_recipient() {
        let recipient = RecipientProfile {
            regime: TaxRegime::Normal(NormalRegime::RealProfit),
            state_registration_exempt: true,
        };

        let normal = record("N", dec!(1000), Some(TaxRegime::Normal(NormalRegime::RealProfit)));
        let alerts = compatibility_alerts(&normal, recipient);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::IcmsOnExemptRecipient);
        assert_eq!(alerts[0].impact, "R$ 205,00");

        let unknown = record("U", dec!(10), Some(TaxRegime::Unknown));
        let kinds: Vec<_> = compatibility_alerts(&unknown, recipient)
            .into_iter()
            .map(|a| a.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![AlertKind::IcmsOnExemptRecipient, AlertKind::UnknownSupplierRegime]
        );

        let simplified = record("S", dec!(10), Some(TaxRegime::Simplified));
        let alerts = compatibility_alerts(&simplified, recipient);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::SimplifiedSupplier);
    }

    #[test]
    fn test_no_simplified_alert_between_simplified_parties() {
        let recipient = RecipientProfile {
            regime: TaxRegime::Simplified,
            state_registration_exempt: false,
        };
        let simplified = record("S", dec!(10), Some(TaxRegime::Simplified));
        assert!(compatibility_alerts(&simplified, recipient).is_empty());
    }

    #[test]
    fn test_largest() {
        let records = vec![
            record("A", dec!(1), None),
            record("B", dec!(3), None),
            record("C", dec!(2), None),
        ];
        let top: Vec<_> = BatchAnalysis::largest(&records, 2)
            .into_iter()
            .map(|r| r.source.as_str())
            .collect();
        assert_eq!(top, vec!["B.pdf", "C.pdf"]);
    }
}
