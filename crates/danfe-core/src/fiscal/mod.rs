//! Fiscal code registry and credit determination.

pub mod accounting;
pub mod analysis;
pub mod engine;
pub mod regime;
pub mod registry;

pub use accounting::{AccountingEntry, AccountingLine, RecoverableTaxes};
pub use analysis::{BatchAnalysis, CompatibilityAlert, FinancialMetrics, RecipientProfile, SupplierSummary};
pub use engine::{
    CreditDetermination, CreditEngine, CreditInput, LineDetermination, MisclassificationImpact,
    TaxCredit,
};
pub use regime::{NormalRegime, NormalizedRegime, TaxRegime};
pub use registry::{
    CfopEntry, CodeTable, CsosnEntry, CstEntry, FiscalCodeEntry, NcmEntry, OperationKind,
    OperationProfile, TaxSituationEntry,
};
