//! Static fiscal code tables: CFOP, NCM, CSOSN, O-CST and state ICMS rates.
//!
//! Tables are built once on first use and never mutated. Every lookup
//! returns `None` for unknown codes; callers turn that into a warning.

use lazy_static::lazy_static;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;

use super::regime::TaxRegime;

/// Direction of an operation code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Entry,
    Exit,
    Transfer,
    Return,
}

impl OperationKind {
    pub fn label(&self) -> &'static str {
        match self {
            OperationKind::Entry => "Entrada",
            OperationKind::Exit => "Saída",
            OperationKind::Transfer => "Transferência",
            OperationKind::Return => "Devolução",
        }
    }
}

/// Nature of the document an operation code describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationNature {
    Regular,
    Cancellation,
    Return,
}

/// Tax exigibility of a product classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Exigibility {
    Normal,
    /// Subject to CIDE (fuels).
    Cide,
    Immunity,
    Deferral,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CfopEntry {
    pub code: &'static str,
    pub description: &'static str,
    pub kind: OperationKind,
    pub nature: OperationNature,
    pub icms_applies: bool,
    pub ipi_applies: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NcmEntry {
    pub code: &'static str,
    pub description: &'static str,
    /// Default ICMS rate, in percent.
    pub icms_rate: Decimal,
    /// IPI rate, in percent.
    pub ipi_rate: Decimal,
    pub exigibility: Exigibility,
}

/// Tax-situation code of a simplified-regime issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CsosnEntry {
    pub code: &'static str,
    pub description: &'static str,
    pub applies_icms: bool,
    pub applies_pis: bool,
    pub applies_cofins: bool,
    pub credit_icms: bool,
}

/// Tax-situation code of a normal-regime issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CstEntry {
    pub code: &'static str,
    pub description: &'static str,
    pub applies_icms: bool,
    pub credit_icms: bool,
    pub tax_substitution: bool,
}

/// A tax-situation entry from either table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "table", rename_all = "snake_case")]
pub enum TaxSituationEntry {
    Csosn(&'static CsosnEntry),
    Cst(&'static CstEntry),
}

impl TaxSituationEntry {
    pub fn code(&self) -> &'static str {
        match self {
            TaxSituationEntry::Csosn(e) => e.code,
            TaxSituationEntry::Cst(e) => e.code,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            TaxSituationEntry::Csosn(e) => e.description,
            TaxSituationEntry::Cst(e) => e.description,
        }
    }

    pub fn applies_icms(&self) -> bool {
        match self {
            TaxSituationEntry::Csosn(e) => e.applies_icms,
            TaxSituationEntry::Cst(e) => e.applies_icms,
        }
    }

    pub fn credit_icms(&self) -> bool {
        match self {
            TaxSituationEntry::Csosn(e) => e.credit_icms,
            TaxSituationEntry::Cst(e) => e.credit_icms,
        }
    }

    pub fn table_name(&self) -> &'static str {
        match self {
            TaxSituationEntry::Csosn(_) => "CSOSN",
            TaxSituationEntry::Cst(_) => "O-CST",
        }
    }
}

/// Any registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "entry", rename_all = "snake_case")]
pub enum FiscalCodeEntry {
    Operation(&'static CfopEntry),
    Classification(&'static NcmEntry),
    TaxSituation(TaxSituationEntry),
}

/// The tables [`lookup`] can search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeTable {
    Cfop,
    Ncm,
    Csosn,
    Cst,
}

use OperationKind::{Entry, Exit, Return as ReturnKind, Transfer};
use OperationNature::{Cancellation, Regular, Return as ReturnNature};

// code, description, kind, nature, icms, ipi
const CFOP_DATA: &[(&str, &str, OperationKind, OperationNature, bool, bool)] = &[
    ("1100", "Compra para revenda", Entry, Regular, true, true),
    ("1101", "Compra para revenda - Cancelamento", Entry, Cancellation, true, true),
    ("1102", "Compra para revenda - Devolução", Entry, ReturnNature, true, true),
    ("1111", "Compra para revenda - Tributada pelo ICMS", Entry, Regular, true, true),
    ("1120", "Compra para industrialização", Entry, Regular, true, true),
    ("1200", "Devolução de vendas de mercadoria produzida ou industrializada", Entry, ReturnNature, true, true),
    ("1300", "Compra de Ativo Imobilizado", Entry, Regular, true, false),
    ("1400", "Compra de matéria-prima para uso na industrialização", Entry, Regular, true, true),
    ("1500", "Compra de material de embalagem", Entry, Regular, true, true),
    ("1600", "Compra de material de uso e consumo", Entry, Regular, true, false),
    ("1900", "Outra operação com entrada de mercadoria ou serviço", Entry, Regular, true, true),
    ("5100", "Venda de mercadoria produzida ou industrializada", Exit, Regular, true, true),
    ("5101", "Venda de produto industrializado - Cancelamento", Exit, Cancellation, true, true),
    ("5102", "Venda de produto industrializado - Devolução", Exit, ReturnNature, true, true),
    ("5111", "Venda de produto industrializado - Tributada pelo ICMS", Exit, Regular, true, true),
    ("5120", "Venda para revenda", Exit, Regular, true, true),
    ("5200", "Devolução de compras", Exit, ReturnNature, true, true),
    ("5300", "Venda de Ativo Imobilizado", Exit, Regular, true, false),
    ("5500", "Venda de Ativo Circulante", Exit, Regular, false, false),
    ("5900", "Outra operação com saída de mercadoria ou serviço", Exit, Regular, true, true),
    ("6100", "Transferência de produto industrializado", Transfer, Regular, true, false),
    ("6200", "Devolução de produto recebido em transferência", Transfer, ReturnNature, true, false),
    ("2100", "Devolução de venda de mercadoria produzida ou industrializada", ReturnKind, ReturnNature, true, true),
    ("7100", "Aquisição de serviço de transporte", Entry, Regular, true, false),
];

// code, description, icms %, ipi %, exigibility
const NCM_DATA: &[(&str, &str, i64, i64, Exigibility)] = &[
    ("01010000", "Cavalos, vivos", 7, 0, Exigibility::Normal),
    ("04011000", "Leite de vaca fresco", 12, 0, Exigibility::Normal),
    ("07010000", "Batatas frescas ou refrigeradas", 12, 0, Exigibility::Normal),
    ("15179090", "Óleo de soja em bruto", 7, 0, Exigibility::Normal),
    ("27101100", "Gasolina comum", 12, 0, Exigibility::Cide),
    ("27101950", "Diesel", 12, 0, Exigibility::Cide),
    ("29051000", "Metanol (álcool metílico)", 12, 0, Exigibility::Normal),
    ("30021000", "Medicamentos com antibióticos", 0, 0, Exigibility::Immunity),
    ("48021010", "Papel de jornal", 12, 0, Exigibility::Normal),
    ("62019000", "Vestuário de algodão", 12, 25, Exigibility::Normal),
    ("84021000", "Caldeiras a vapor", 7, 5, Exigibility::Normal),
    ("84717050", "Máquinas para processamento de dados", 0, 0, Exigibility::Deferral),
    ("85171100", "Telefones celulares", 7, 30, Exigibility::Normal),
    ("85176000", "Monitores e televisores", 7, 15, Exigibility::Normal),
    ("87039000", "Partes e peças para veículos automotores", 7, 20, Exigibility::Normal),
    ("90186010", "Equipamentos de diagnóstico", 0, 0, Exigibility::Immunity),
];

// code, description, icms, pis, cofins, credit
const CSOSN_DATA: &[(&str, &str, bool, bool, bool, bool)] = &[
    ("101", "Tributada pelo Simples Nacional - ICMS normal", true, true, true, false),
    ("102", "Tributada pelo Simples Nacional - ICMS com ST", true, true, true, false),
    ("103", "Tributada pelo Simples Nacional - Regime de substituição tributária", true, true, true, false),
    ("201", "Tributada pelo Simples Nacional - ICMS normal (entrada)", true, true, true, true),
    ("202", "Tributada pelo Simples Nacional - ICMS com ST (entrada)", true, true, true, true),
    ("203", "Tributada pelo Simples Nacional - ST (entrada)", true, true, true, false),
    ("300", "Tributada pelo Simples Nacional - Imune", false, false, false, false),
    ("400", "Não tributada pelo Simples Nacional", false, false, false, false),
    ("500", "Excluída do Simples Nacional", true, true, true, true),
    ("900", "Outras operações", true, true, true, true),
];

// code, description, applies, credit, substitution
const CST_DATA: &[(&str, &str, bool, bool, bool)] = &[
    ("00", "Entrada com Crédito", true, true, false),
    ("10", "Tributada com Substituição Tributária", true, false, true),
    ("20", "Com redução de base de cálculo", true, true, false),
    ("30", "Isenta ou não tributada e com ST", false, false, true),
    ("40", "Isenta", false, false, false),
    ("41", "Não tributada", false, false, false),
    ("50", "Suspensão", false, false, false),
    ("60", "Diferimento", true, false, false),
    ("70", "Com redução de base - Substituição", true, false, true),
    ("90", "Outras", true, true, false),
];

// ICMS internal rate per state, in tenths of a percent
const STATE_DATA: &[(&str, i64)] = &[
    ("AC", 170), ("AL", 170), ("AP", 180), ("AM", 180), ("BA", 180),
    ("CE", 170), ("DF", 180), ("ES", 170), ("GO", 140), ("MA", 180),
    ("MT", 145), ("MS", 140), ("MG", 180), ("PA", 170), ("PB", 180),
    ("PR", 180), ("PE", 170), ("PI", 170), ("RJ", 200), ("RN", 170),
    ("RS", 180), ("RO", 175), ("RR", 150), ("SC", 170), ("SP", 180),
    ("SE", 170), ("TO", 140),
];

lazy_static! {
    static ref CFOP_TABLE: HashMap<&'static str, CfopEntry> = CFOP_DATA
        .iter()
        .map(|&(code, description, kind, nature, icms_applies, ipi_applies)| {
            (code, CfopEntry { code, description, kind, nature, icms_applies, ipi_applies })
        })
        .collect();

    static ref NCM_TABLE: HashMap<&'static str, NcmEntry> = NCM_DATA
        .iter()
        .map(|&(code, description, icms, ipi, exigibility)| {
            (code, NcmEntry {
                code,
                description,
                icms_rate: Decimal::from(icms),
                ipi_rate: Decimal::from(ipi),
                exigibility,
            })
        })
        .collect();

    static ref CSOSN_TABLE: HashMap<&'static str, CsosnEntry> = CSOSN_DATA
        .iter()
        .map(|&(code, description, applies_icms, applies_pis, applies_cofins, credit_icms)| {
            (code, CsosnEntry { code, description, applies_icms, applies_pis, applies_cofins, credit_icms })
        })
        .collect();

    static ref CST_TABLE: HashMap<&'static str, CstEntry> = CST_DATA
        .iter()
        .map(|&(code, description, applies_icms, credit_icms, tax_substitution)| {
            (code, CstEntry { code, description, applies_icms, credit_icms, tax_substitution })
        })
        .collect();

    static ref STATE_RATES: HashMap<&'static str, Decimal> = STATE_DATA
        .iter()
        .map(|&(uf, tenths)| (uf, Decimal::new(tenths, 1)))
        .collect();
}

/// Strip the separators codes are printed with (`5.102`, `8471.70.50`).
pub fn normalize_code(code: &str) -> String {
    code.chars()
        .filter(|c| !matches!(c, '.' | ',' | '/' | '-') && !c.is_whitespace())
        .collect()
}

pub fn cfop(code: &str) -> Option<&'static CfopEntry> {
    CFOP_TABLE.get(normalize_code(code).as_str())
}

/// Operation codes of one kind, ordered by code.
pub fn cfops_by_kind(kind: OperationKind) -> Vec<&'static CfopEntry> {
    let mut entries: Vec<_> = CFOP_TABLE.values().filter(|e| e.kind == kind).collect();
    entries.sort_by_key(|e| e.code);
    entries
}

pub fn ncm(code: &str) -> Option<&'static NcmEntry> {
    NCM_TABLE.get(normalize_code(code).as_str())
}

/// Format an 8-digit NCM as `XX.XX.XX.XX`; other inputs are returned cleaned.
pub fn format_ncm(code: &str) -> String {
    let digits = normalize_code(code);
    if digits.len() == 8 && digits.bytes().all(|b| b.is_ascii_digit()) {
        format!("{}.{}.{}.{}", &digits[0..2], &digits[2..4], &digits[4..6], &digits[6..8])
    } else {
        digits
    }
}

pub fn csosn(code: &str) -> Option<&'static CsosnEntry> {
    CSOSN_TABLE.get(normalize_code(code).as_str())
}

pub fn cst(code: &str) -> Option<&'static CstEntry> {
    CST_TABLE.get(normalize_code(code).as_str())
}

/// Resolve a tax-situation code against the table matching the issuer.
///
/// Simplified issuers use CSOSN, everyone else O-CST. DANFEs print the
/// goods-origin digit in front of the code (`0102`, `060`), so the
/// origin-prefixed length is accepted too.
pub fn tax_situation(code: &str, issuer_regime: &TaxRegime) -> Option<TaxSituationEntry> {
    let code = normalize_code(code);

    if issuer_regime.is_simplified() {
        let found = csosn(&code).or_else(|| match code.len() {
            4 => code.get(1..).and_then(csosn),
            _ => None,
        });
        found.map(TaxSituationEntry::Csosn)
    } else {
        let found = cst(&code).or_else(|| match code.len() {
            3 => code.get(1..).and_then(cst),
            _ => None,
        });
        found.map(TaxSituationEntry::Cst)
    }
}

/// Internal ICMS rate of a state, in percent.
pub fn state_icms_rate(uf: &str) -> Option<Decimal> {
    STATE_RATES.get(uf.trim().to_uppercase().as_str()).copied()
}

/// All states with their ICMS rates, ordered by state code.
pub fn state_rates() -> Vec<(&'static str, Decimal)> {
    let mut rates: Vec<_> = STATE_RATES.iter().map(|(uf, rate)| (*uf, *rate)).collect();
    rates.sort_by_key(|(uf, _)| *uf);
    rates
}

/// PIS and COFINS rates in percent; zero outside the normal regime.
pub fn pis_cofins_rates(regime: &TaxRegime) -> (Decimal, Decimal) {
    if regime.is_normal() {
        (Decimal::new(165, 2), Decimal::new(76, 1))
    } else {
        (Decimal::ZERO, Decimal::ZERO)
    }
}

/// Look a code up in one table.
pub fn lookup(table: CodeTable, code: &str) -> Option<FiscalCodeEntry> {
    match table {
        CodeTable::Cfop => cfop(code).map(FiscalCodeEntry::Operation),
        CodeTable::Ncm => ncm(code).map(FiscalCodeEntry::Classification),
        CodeTable::Csosn => {
            csosn(code).map(|e| FiscalCodeEntry::TaxSituation(TaxSituationEntry::Csosn(e)))
        }
        CodeTable::Cst => {
            cst(code).map(|e| FiscalCodeEntry::TaxSituation(TaxSituationEntry::Cst(e)))
        }
    }
}

/// Default rates for one operation, consolidated from the tables.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cfop: Option<&'static CfopEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ncm: Option<&'static NcmEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub situation: Option<TaxSituationEntry>,
    /// Rates in percent.
    pub icms_rate: Decimal,
    pub ipi_rate: Decimal,
    pub pis_rate: Decimal,
    pub cofins_rate: Decimal,
    pub warnings: Vec<String>,
}

/// Consolidate the default rates of an operation.
///
/// The ICMS rate starts at the NCM default, drops to zero when the
/// situation code does not apply ICMS and is capped by the destination
/// state rate.
pub fn profile_operation(
    cfop_code: &str,
    ncm_code: &str,
    situation_code: &str,
    destination_uf: &str,
    regime: &TaxRegime,
) -> OperationProfile {
    let mut warnings = Vec::new();

    let cfop_entry = cfop(cfop_code);
    if cfop_entry.is_none() {
        warnings.push(format!("CFOP {} not found", cfop_code));
    }

    let ncm_entry = ncm(ncm_code);
    let (mut icms_rate, ipi_rate) = match ncm_entry {
        Some(e) => (e.icms_rate, e.ipi_rate),
        None => {
            warnings.push(format!("NCM {} not found", ncm_code));
            (Decimal::ZERO, Decimal::ZERO)
        }
    };

    let situation = tax_situation(situation_code, regime);
    match situation {
        Some(entry) if !entry.applies_icms() => icms_rate = Decimal::ZERO,
        Some(_) => {}
        None => warnings.push(format!(
            "{} {} not found",
            if regime.is_simplified() { "CSOSN" } else { "O-CST" },
            situation_code
        )),
    }

    match state_icms_rate(destination_uf) {
        Some(state_rate) if icms_rate > Decimal::ZERO => icms_rate = icms_rate.min(state_rate),
        Some(_) => {}
        None => warnings.push(format!("State {} not found", destination_uf)),
    }

    let (pis_rate, cofins_rate) = pis_cofins_rates(regime);

    OperationProfile {
        cfop: cfop_entry,
        ncm: ncm_entry,
        situation,
        icms_rate,
        ipi_rate,
        pis_rate,
        cofins_rate,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fiscal::NormalRegime;
    use rust_decimal_macros::dec;

    #[test]
    fn test_table_sizes() {
        assert_eq!(CFOP_TABLE.len(), 24);
        assert_eq!(NCM_TABLE.len(), 16);
        assert_eq!(CSOSN_TABLE.len(), 10);
        assert_eq!(CST_TABLE.len(), 10);
        assert_eq!(STATE_RATES.len(), 27);
    }

    #[test]
    fn test_cfop_lookup_normalizes() {
        let entry = cfop("1.102").unwrap();
        assert_eq!(entry.kind, OperationKind::Entry);
        assert_eq!(entry.nature, OperationNature::Return);
        assert!(cfop("9999").is_none());
        assert!(!cfop("5500").unwrap().icms_applies);
    }

    #[test]
    fn test_cfops_by_kind_sorted() {
        let transfers = cfops_by_kind(OperationKind::Transfer);
        let codes: Vec<_> = transfers.iter().map(|e| e.code).collect();
        assert_eq!(codes, vec!["6100", "6200"]);
    }

    #[test]
    fn test_ncm_lookup_and_format() {
        let entry = ncm("8517.11.00").unwrap();
        assert_eq!(entry.ipi_rate, dec!(30));
        assert_eq!(format_ncm("85171100"), "85.17.11.00");
        assert_eq!(format_ncm("123"), "123");
    }

    #[test]
    fn test_tax_situation_by_issuer_regime() {
        let simplified = TaxRegime::Simplified;
        let normal = TaxRegime::Normal(NormalRegime::RealProfit);

        let entry = tax_situation("0102", &simplified).unwrap();
        assert_eq!(entry.code(), "102");
        assert!(!entry.credit_icms());

        let entry = tax_situation("000", &normal).unwrap();
        assert_eq!(entry.code(), "00");
        assert!(entry.credit_icms());

        assert!(tax_situation("102", &normal).is_none());
        assert_eq!(tax_situation("060", &TaxRegime::Unknown).unwrap().code(), "60");
    }

    #[test]
    fn test_state_rates() {
        assert_eq!(state_icms_rate("sp"), Some(dec!(18.0)));
        assert_eq!(state_icms_rate("MT"), Some(dec!(14.5)));
        assert_eq!(state_icms_rate("XX"), None);
        assert_eq!(state_rates().first().map(|(uf, _)| *uf), Some("AC"));
    }

    #[test]
    fn test_profile_caps_icms_by_state() {
        let regime = TaxRegime::Normal(NormalRegime::RealProfit);
        let profile = profile_operation("1102", "04011000", "00", "GO", &regime);
        assert_eq!(profile.icms_rate, dec!(12));
        assert_eq!(profile.pis_rate, dec!(1.65));
        assert_eq!(profile.cofins_rate, dec!(7.6));
        assert!(profile.warnings.is_empty());

    }

    #[test]
    fn test_profile_zeroes_icms_when_not_applied() {
        let profile = profile_operation("5100", "62019000", "400", "SP", &TaxRegime::Simplified);
        assert_eq!(profile.icms_rate, Decimal::ZERO);
        assert_eq!(profile.ipi_rate, dec!(25));
        assert_eq!(profile.pis_rate, Decimal::ZERO);
    }

    #[test]
    fn test_profile_warns_on_unknown_codes() {
        let profile = profile_operation("0000", "00000000", "77", "ZZ", &TaxRegime::Unknown);
        assert_eq!(profile.warnings.len(), 4);
        assert!(profile.cfop.is_none());
    }

    #[test]
    fn test_lookup_dispatch() {
        assert!(matches!(
            lookup(CodeTable::Cst, "41"),
            Some(FiscalCodeEntry::TaxSituation(TaxSituationEntry::Cst(_)))
        ));
        assert!(lookup(CodeTable::Csosn, "41").is_none());
    }
}
