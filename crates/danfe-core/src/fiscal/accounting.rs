//! Suggested accounting entry for a received invoice.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::invoice::rules::format_money;
use crate::models::config::ChartOfAccounts;

use super::regime::TaxRegime;
use super::registry::CfopEntry;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountingLine {
    pub account: String,
    pub amount: Decimal,
    pub description: String,
}

/// Debit and credit lines that balance to the invoice value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountingEntry {
    /// Operation description from the CFOP table, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    pub debits: Vec<AccountingLine>,
    pub credits: Vec<AccountingLine>,
    pub summary: String,
}

impl AccountingEntry {
    pub fn total_debits(&self) -> Decimal {
        self.debits.iter().map(|l| l.amount).sum()
    }

    pub fn total_credits(&self) -> Decimal {
        self.credits.iter().map(|l| l.amount).sum()
    }

    pub fn is_balanced(&self) -> bool {
        self.total_debits() == self.total_credits()
    }
}

/// Recoverable amounts to break out of the inventory cost.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoverableTaxes {
    pub icms: Decimal,
    pub pis: Decimal,
    pub cofins: Decimal,
}

impl RecoverableTaxes {
    pub fn total(&self) -> Decimal {
        self.icms + self.pis + self.cofins
    }
}

/// Build the entry for a purchase of `value`.
///
/// Returns the entry and any alerts raised while building it.
pub fn suggest_entry(
    recipient: &TaxRegime,
    value: Decimal,
    recoverable: RecoverableTaxes,
    operation: Option<&CfopEntry>,
    accounts: &ChartOfAccounts,
) -> (AccountingEntry, Vec<String>) {
    let mut alerts = Vec::new();
    let operation_text = operation.map(|op| op.description.to_string());
    let goods = operation_text.clone().unwrap_or_else(|| "CFOP".to_string());

    let payables = AccountingLine {
        account: accounts.payables.clone(),
        amount: value,
        description: "Fornecedor".to_string(),
    };

    if recipient.is_simplified() {
        let entry = AccountingEntry {
            operation: operation_text,
            debits: vec![AccountingLine {
                account: accounts.inventory.clone(),
                amount: value,
                description: format!("Mercadoria recebida ({})", goods),
            }],
            credits: vec![payables],
            summary: format!("Compra de R$ {} (ICMS incluso)", format_money(value)),
        };
        return (entry, alerts);
    }

    let recoverable = if recoverable.total() > value {
        alerts.push(format!(
            "Credits (R$ {}) exceed the invoice value (R$ {}); posted at full cost",
            format_money(recoverable.total()),
            format_money(value)
        ));
        RecoverableTaxes::default()
    } else {
        recoverable
    };

    let cost = value - recoverable.total();
    let mut debits = vec![AccountingLine {
        account: accounts.inventory.clone(),
        amount: cost,
        description: "Custo da mercadoria (sem impostos)".to_string(),
    }];
    let mut breakout = Vec::new();

    for (amount, account, tax) in [
        (recoverable.icms, &accounts.icms_recoverable, "ICMS"),
        (recoverable.pis, &accounts.pis_recoverable, "PIS"),
        (recoverable.cofins, &accounts.cofins_recoverable, "COFINS"),
    ] {
        if amount > Decimal::ZERO {
            debits.push(AccountingLine {
                account: account.clone(),
                amount,
                description: format!("Crédito de {}", tax),
            });
            breakout.push(format!("{} R$ {}", tax, format_money(amount)));
        }
    }

    let credits_text = if breakout.is_empty() {
        "nenhum".to_string()
    } else {
        breakout.join(", ")
    };

    let entry = AccountingEntry {
        operation: operation_text,
        debits,
        credits: vec![payables],
        summary: format!(
            "Compra de R$ {} (custo R$ {} + créditos: {})",
            format_money(value),
            format_money(cost),
            credits_text
        ),
    };
    (entry, alerts)
}
