//! Credit eligibility decisions for a received invoice.
//!
//! The engine is a pure function of its input and configuration. Missing or
//! unrecognized codes never abort a decision; they downgrade it to "no
//! credit" with the reason recorded.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::config::FiscalConfig;
use crate::models::invoice::{DeclaredTaxes, InvoiceRecord};

use super::accounting::{suggest_entry, AccountingEntry, RecoverableTaxes};
use super::regime::{NormalRegime, TaxRegime};
use super::registry::{self, OperationKind};

/// Decision for one tax.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxCredit {
    pub admitted: bool,
    pub amount: Decimal,
    pub reason: String,
}

impl TaxCredit {
    fn denied(reason: impl Into<String>) -> Self {
        Self {
            admitted: false,
            amount: Decimal::ZERO,
            reason: reason.into(),
        }
    }

    fn admitted(amount: Decimal, reason: impl Into<String>) -> Self {
        Self {
            admitted: true,
            amount,
            reason: reason.into(),
        }
    }

    /// Amount that can actually be recovered.
    pub fn recoverable(&self) -> Decimal {
        if self.admitted {
            self.amount
        } else {
            Decimal::ZERO
        }
    }
}

/// Tax that would be undue if the operation should have been exempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MisclassificationImpact {
    pub icms: Decimal,
    pub pis: Decimal,
    pub cofins: Decimal,
    pub total: Decimal,
    /// Number of lines the figures were computed over.
    pub lines: usize,
}

/// Everything the engine decided about one invoice or line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditDetermination {
    pub icms: TaxCredit,
    pub pis: TaxCredit,
    pub cofins: TaxCredit,
    pub recipient_regime: TaxRegime,
    pub issuer_regime: TaxRegime,
    /// Absent when the issuer is on the simplified regime.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact: Option<MisclassificationImpact>,
    pub accounting: AccountingEntry,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alerts: Vec<String>,
}

impl CreditDetermination {
    pub fn total_credit(&self) -> Decimal {
        self.icms.recoverable() + self.pis.recoverable() + self.cofins.recoverable()
    }
}

/// Input of one decision.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreditInput {
    pub cfop: Option<String>,
    pub situation_code: Option<String>,
    pub recipient_regime: TaxRegime,
    pub issuer_regime: TaxRegime,
    /// Declared value of the operation.
    pub value: Decimal,
    pub taxes: DeclaredTaxes,
    /// Values of the individual lines; the whole value is one line when empty.
    pub line_values: Vec<Decimal>,
}

impl CreditInput {
    pub fn new(value: Decimal) -> Self {
        Self {
            value,
            ..Default::default()
        }
    }

    pub fn with_codes(mut self, cfop: &str, situation_code: &str) -> Self {
        self.cfop = Some(cfop.to_string());
        self.situation_code = Some(situation_code.to_string());
        self
    }

    pub fn with_regimes(mut self, recipient: TaxRegime, issuer: TaxRegime) -> Self {
        self.recipient_regime = recipient;
        self.issuer_regime = issuer;
        self
    }

    pub fn with_taxes(mut self, taxes: DeclaredTaxes) -> Self {
        self.taxes = taxes;
        self
    }

    /// Build the input for a whole invoice.
    ///
    /// Codes come from the first product row; the value is the declared
    /// total, or the line sum when no total was found.
    pub fn from_record(record: &InvoiceRecord) -> Self {
        let line_values: Vec<Decimal> = record.items.iter().map(|i| i.total).collect();
        let value = record
            .total
            .unwrap_or_else(|| line_values.iter().copied().sum());

        Self {
            cfop: record.primary_cfop().map(str::to_string),
            situation_code: record.primary_situation_code().map(str::to_string),
            recipient_regime: record.recipient.regime.unwrap_or_default(),
            issuer_regime: record.issuer.regime.unwrap_or_default(),
            value,
            taxes: record.taxes.clone(),
            line_values,
        }
    }
}

/// Decision for one product row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineDetermination {
    pub index: usize,
    pub description: String,
    pub value: Decimal,
    pub determination: CreditDetermination,
}

/// Credit eligibility engine.
#[derive(Debug, Clone, Default)]
pub struct CreditEngine {
    config: FiscalConfig,
}

impl CreditEngine {
    pub fn new(config: FiscalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FiscalConfig {
        &self.config
    }

    /// Decide ICMS, PIS and COFINS credit for one operation.
    pub fn evaluate(&self, input: &CreditInput) -> CreditDetermination {
        let mut alerts = Vec::new();

        if !input.recipient_regime.is_known() {
            alerts.push("Recipient regime unknown; normal regime assumed".to_string());
        }
        if !input.issuer_regime.is_known() {
            alerts.push("Issuer regime unknown; normal regime assumed".to_string());
        }

        let cfop_code = input.cfop.as_deref().map(str::trim).filter(|c| !c.is_empty());
        let operation = cfop_code.and_then(registry::cfop);
        match cfop_code {
            None => alerts.push("Operation code (CFOP) missing".to_string()),
            Some(code) if operation.is_none() => {
                alerts.push(format!("Operation code (CFOP) {} not found", code))
            }
            Some(_) => {}
        }

        let icms = self.icms_credit(input, cfop_code, &mut alerts);
        let pis = self.contribution_credit("PIS", input.taxes.pis, input, cfop_code);
        let cofins = self.contribution_credit("COFINS", input.taxes.cofins, input, cfop_code);

        let impact = self.misclassification_impact(input);

        let (accounting, accounting_alerts) = suggest_entry(
            &input.recipient_regime,
            input.value,
            RecoverableTaxes {
                icms: icms.recoverable(),
                pis: pis.recoverable(),
                cofins: cofins.recoverable(),
            },
            operation,
            &self.config.accounts,
        );
        alerts.extend(accounting_alerts);

        debug!(
            "credit decision: icms={} pis={} cofins={} ({} alerts)",
            icms.admitted,
            pis.admitted,
            cofins.admitted,
            alerts.len()
        );

        CreditDetermination {
            icms,
            pis,
            cofins,
            recipient_regime: input.recipient_regime,
            issuer_regime: input.issuer_regime,
            impact,
            accounting,
            alerts,
        }
    }

    /// Decide credits for a whole invoice.
    pub fn evaluate_record(&self, record: &InvoiceRecord) -> CreditDetermination {
        self.evaluate(&CreditInput::from_record(record))
    }

    /// Decide credits per product row.
    ///
    /// Document-level taxes are apportioned by each line's share of the
    /// line sum. Rows without their own codes use the document's.
    pub fn evaluate_lines(&self, record: &InvoiceRecord) -> Vec<LineDetermination> {
        let document = CreditInput::from_record(record);
        let line_sum: Decimal = record.items.iter().map(|i| i.total).sum();

        record
            .items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                let share = if line_sum > Decimal::ZERO {
                    item.total / line_sum
                } else {
                    Decimal::ZERO
                };
                let apportion = |amount: Option<Decimal>| amount.map(|a| (a * share).round_dp(2));

                let input = CreditInput {
                    cfop: item.cfop.clone().or_else(|| document.cfop.clone()),
                    situation_code: item
                        .situation_code
                        .clone()
                        .or_else(|| document.situation_code.clone()),
                    recipient_regime: document.recipient_regime,
                    issuer_regime: document.issuer_regime,
                    value: item.total,
                    taxes: DeclaredTaxes {
                        icms: apportion(document.taxes.icms),
                        ipi: apportion(document.taxes.ipi),
                        pis: apportion(document.taxes.pis),
                        cofins: apportion(document.taxes.cofins),
                    },
                    line_values: vec![item.total],
                };

                LineDetermination {
                    index,
                    description: item.description.clone(),
                    value: item.total,
                    determination: self.evaluate(&input),
                }
            })
            .collect()
    }

    fn icms_credit(
        &self,
        input: &CreditInput,
        cfop_code: Option<&str>,
        alerts: &mut Vec<String>,
    ) -> TaxCredit {
        if input.recipient_regime.is_simplified() {
            return TaxCredit::denied("simplified-regime recipients do not recover ICMS");
        }

        let Some(code) = cfop_code else {
            return TaxCredit::denied("operation code missing");
        };
        let Some(operation) = registry::cfop(code) else {
            return TaxCredit::denied(format!("operation code {} not found", code));
        };
        if !operation.icms_applies {
            return TaxCredit::denied(format!("operation code {} does not carry ICMS", code));
        }

        let table = if input.issuer_regime.is_simplified() { "CSOSN" } else { "O-CST" };
        let situation_code = input
            .situation_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());
        let Some(situation_code) = situation_code else {
            alerts.push(format!("Tax situation code ({}) missing", table));
            return TaxCredit::denied("tax situation code missing");
        };
        let Some(situation) = registry::tax_situation(situation_code, &input.issuer_regime) else {
            alerts.push(format!("{} {} not found", table, situation_code));
            return TaxCredit::denied(format!("{} {} not found", table, situation_code));
        };
        if !situation.credit_icms() {
            return TaxCredit::denied(format!(
                "{} {} ({}) does not admit ICMS credit",
                situation.table_name(),
                situation.code(),
                situation.description()
            ));
        }

        match input.taxes.icms {
            Some(amount) if amount > Decimal::ZERO => {
                TaxCredit::admitted(amount, "ICMS credit admitted for normal-regime recipient")
            }
            _ => TaxCredit::admitted(Decimal::ZERO, "ICMS credit admitted but no ICMS declared"),
        }
    }

    fn contribution_credit(
        &self,
        tax: &str,
        declared: Option<Decimal>,
        input: &CreditInput,
        cfop_code: Option<&str>,
    ) -> TaxCredit {
        let recipient = input.recipient_regime;
        match recipient {
            TaxRegime::Simplified => {
                return TaxCredit::denied(format!(
                    "simplified-regime recipients do not recover {}",
                    tax
                ));
            }
            TaxRegime::Normal(NormalRegime::PresumedProfit) => {
                return TaxCredit::denied(format!(
                    "presumed-profit recipients are cumulative and do not recover {}",
                    tax
                ));
            }
            _ => {}
        }
        if !recipient.is_non_cumulative(self.config.unspecified_normal_is_non_cumulative) {
            return TaxCredit::denied(format!(
                "recipient profit method unknown; {} treated as cumulative",
                tax
            ));
        }

        let Some(code) = cfop_code else {
            return TaxCredit::denied("operation code missing");
        };
        let Some(operation) = registry::cfop(code) else {
            return TaxCredit::denied(format!("operation code {} not found", code));
        };
        if operation.kind != OperationKind::Entry {
            return TaxCredit::denied(format!(
                "{} credit only applies to entry operations ({} is {})",
                tax,
                code,
                operation.kind.label()
            ));
        }

        match declared {
            Some(amount) if amount > Decimal::ZERO => {
                TaxCredit::admitted(amount, format!("{} credit admitted (non-cumulative)", tax))
            }
            _ => TaxCredit::admitted(
                Decimal::ZERO,
                format!("{} credit admitted but no {} declared", tax, tax),
            ),
        }
    }

    fn misclassification_impact(&self, input: &CreditInput) -> Option<MisclassificationImpact> {
        if input.issuer_regime.is_simplified() {
            return None;
        }

        let lines: &[Decimal] = if input.line_values.is_empty() {
            std::slice::from_ref(&input.value)
        } else {
            &input.line_values
        };

        let rates = &self.config.reference_rates;
        let mut impact = MisclassificationImpact {
            lines: lines.len(),
            ..Default::default()
        };
        for &value in lines {
            impact.icms += value * rates.icms;
            impact.pis += value * rates.pis;
            impact.cofins += value * rates.cofins;
        }
        impact.icms = impact.icms.round_dp(2);
        impact.pis = impact.pis.round_dp(2);
        impact.cofins = impact.cofins.round_dp(2);
        impact.total = impact.icms + impact.pis + impact.cofins;

        Some(impact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::invoice::LineItem;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    const REAL: TaxRegime = TaxRegime::Normal(NormalRegime::RealProfit);
    const PRESUMED: TaxRegime = TaxRegime::Normal(NormalRegime::PresumedProfit);

    fn taxes() -> DeclaredTaxes {
        DeclaredTaxes {
            icms: Some(dec!(180.00)),
            ipi: None,
            pis: Some(dec!(16.50)),
            cofins: Some(dec!(76.00)),
        }
    }

    #[test]
    fn test_simplified_recipient_never_gets_icms() {
        let engine = CreditEngine::default();
        for issuer in [TaxRegime::Simplified, REAL, PRESUMED, TaxRegime::Unknown] {
            for (cfop, cst) in [("1102", "00"), ("1100", "101"), ("5102", "90"), ("9999", "??")] {
                let input = CreditInput::new(dec!(1000))
                    .with_codes(cfop, cst)
                    .with_regimes(TaxRegime::Simplified, issuer)
                    .with_taxes(taxes());
                let d = engine.evaluate(&input);
                assert!(!d.icms.admitted);
                assert_eq!(d.icms.reason, "simplified-regime recipients do not recover ICMS");
                assert!(!d.pis.admitted);
                assert!(d.accounting.is_balanced());
            }
        }
    }

    #[test]
    fn test_normal_recipient_entry_with_credit_code() {
        let input = CreditInput::new(dec!(1000.00))
            .with_codes("1102", "00")
            .with_regimes(REAL, REAL)
            .with_taxes(taxes());
        let d = CreditEngine::default().evaluate(&input);

        assert!(d.icms.admitted);
        assert_eq!(d.icms.amount, dec!(180.00));
        assert!(d.pis.admitted);
        assert_eq!(d.pis.amount, dec!(16.50));
        assert_eq!(d.cofins.amount, dec!(76.00));
        assert_eq!(d.total_credit(), dec!(272.50));
        assert_eq!(d.accounting.debits[0].amount, dec!(727.50));
        assert!(d.accounting.is_balanced());
        assert!(d.alerts.is_empty());
    }

    #[test]
    fn test_situation_without_credit() {
        let input = CreditInput::new(dec!(100))
            .with_codes("1102", "060")
            .with_regimes(REAL, REAL)
            .with_taxes(taxes());
        let d = CreditEngine::default().evaluate(&input);
        assert!(!d.icms.admitted);
        assert!(d.icms.reason.contains("does not admit"));
    }

    #[test]
    fn test_simplified_issuer_uses_csosn() {
        let engine = CreditEngine::default();
        let base = CreditInput::new(dec!(100))
            .with_regimes(REAL, TaxRegime::Simplified)
            .with_taxes(taxes());

        let d = engine.evaluate(&base.clone().with_codes("1102", "0201"));
        assert!(d.icms.admitted);
        assert!(d.impact.is_none());

        let d = engine.evaluate(&base.with_codes("1102", "101"));
        assert!(!d.icms.admitted);
    }

    #[test]
    fn test_pis_cofins_require_entry_and_non_cumulative() {
        let engine = CreditEngine::default();

        let exit = CreditInput::new(dec!(100))
            .with_codes("5102", "00")
            .with_regimes(REAL, REAL)
            .with_taxes(taxes());
        let d = engine.evaluate(&exit);
        assert!(d.icms.admitted);
        assert!(!d.pis.admitted);
        assert!(!d.cofins.admitted);

        let presumed = CreditInput::new(dec!(100))
            .with_codes("1102", "00")
            .with_regimes(PRESUMED, REAL)
            .with_taxes(taxes());
        let d = engine.evaluate(&presumed);
        assert!(d.icms.admitted);
        assert!(!d.pis.admitted);
    }

    #[test]
    fn test_unspecified_normal_policy() {
        let input = CreditInput::new(dec!(100))
            .with_codes("1102", "00")
            .with_regimes(TaxRegime::Normal(NormalRegime::Unspecified), REAL)
            .with_taxes(taxes());

        assert!(CreditEngine::default().evaluate(&input).pis.admitted);

        let strict = CreditEngine::new(FiscalConfig {
            unspecified_normal_is_non_cumulative: false,
            ..Default::default()
        });
        assert!(!strict.evaluate(&input).pis.admitted);
    }

    #[test]
    fn test_missing_codes_degrade_to_no_credit() {
        let input = CreditInput::new(dec!(100)).with_regimes(REAL, REAL).with_taxes(taxes());
        let d = CreditEngine::default().evaluate(&input);

        assert!(!d.icms.admitted);
        assert!(!d.pis.admitted);
        assert!(d.alerts.iter().any(|a| a.contains("CFOP")));

        let input = input.with_codes("4321", "00");
        let d = CreditEngine::default().evaluate(&input);
        assert_eq!(d.icms.reason, "operation code 4321 not found");
    }

    #[test]
    fn test_admitted_without_declared_amount() {
        let input = CreditInput::new(dec!(100))
            .with_codes("1102", "00")
            .with_regimes(REAL, REAL);
        let d = CreditEngine::default().evaluate(&input);
        assert!(d.icms.admitted);
        assert_eq!(d.icms.amount, Decimal::ZERO);
        assert!(d.icms.reason.contains("no ICMS declared"));
    }

    #[test]
    fn test_misclassification_impact() {
        let mut input = CreditInput::new(dec!(1000.00)).with_regimes(REAL, REAL);
        let d = CreditEngine::default().evaluate(&input);
        let impact = d.impact.unwrap();
        assert_eq!(impact.icms, dec!(180.00));
        assert_eq!(impact.pis, dec!(16.50));
        assert_eq!(impact.cofins, dec!(76.50));
        assert_eq!(impact.total, dec!(273.00));
        assert_eq!(impact.lines, 1);

        input.line_values = vec![dec!(600.00), dec!(400.00)];
        let impact = CreditEngine::default().evaluate(&input).impact.unwrap();
        assert_eq!(impact.lines, 2);
        assert_eq!(impact.total, dec!(273.00));
    }

    #[test]
    fn test_unknown_regimes_are_alerted() {
        let input = CreditInput::new(dec!(10)).with_codes("1102", "00");
        let d = CreditEngine::default().evaluate(&input);
        assert!(d.icms.admitted);
        assert_eq!(d.alerts.len(), 2);
    }

    #[test]
    fn test_evaluate_lines_apportions_taxes() {
        let item = |total: Decimal, cfop: &str| LineItem {
            code: None,
            description: format!("Item {}", cfop),
            quantity: dec!(1),
            unit: None,
            unit_value: total,
            total,
            cfop: Some(cfop.to_string()),
            ncm: None,
            situation_code: Some("00".to_string()),
        };

        let mut record = InvoiceRecord::new("nf.pdf")
            .with_recipient_regime(REAL)
            .with_issuer_regime(REAL);
        record.total = Some(dec!(1000.00));
        record.taxes = taxes();
        record.items = vec![item(dec!(750.00), "1102"), item(dec!(250.00), "5102")];

        let lines = CreditEngine::default().evaluate_lines(&record);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].determination.icms.amount, dec!(135.00));
        assert_eq!(lines[1].determination.icms.amount, dec!(45.00));
        assert!(lines[0].determination.pis.admitted);
        assert!(!lines[1].determination.pis.admitted);
    }
}
