//! CNPJ/CPF (Brazilian tax ID) recognition, formatting and check-digit validation.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::patterns::{CNPJ_PATTERN, CPF_PATTERN};
use super::{ExtractionMatch, FieldExtractor};

const CNPJ_WEIGHTS_FIRST: [u32; 12] = [5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];
const CNPJ_WEIGHTS_SECOND: [u32; 13] = [6, 5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];

/// Establishment sequence of the head office.
const ROOT_ESTABLISHMENT: [u8; 4] = [0, 0, 0, 1];

/// Kind of national tax identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxIdKind {
    /// 14-digit legal entity identifier.
    Cnpj,
    /// 11-digit individual identifier.
    Cpf,
}

/// Whether the check digits of a [`TaxId`] were verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Validation {
    /// Check digits match the base digits.
    Validated,
    /// Read from noisy text; check digits do not match.
    Unvalidated,
}

/// A CNPJ or CPF.
///
/// Built with [`TaxId::parse`] the check digits are guaranteed consistent.
/// Built with [`TaxId::from_extracted`] an inconsistent id is kept but tagged
/// [`Validation::Unvalidated`]; [`TaxId::rederived`] repairs it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaxId {
    digits: String,
    kind: TaxIdKind,
    validation: Validation,
}

impl TaxId {
    /// Parse a strictly valid id, masked or plain.
    pub fn parse(s: &str) -> Option<Self> {
        Self::from_extracted(s).filter(TaxId::is_validated)
    }

    /// Accept any 14- or 11-digit id, tagging it by check-digit validity.
    pub fn from_extracted(s: &str) -> Option<Self> {
        let digits = only_digits(s);
        let (kind, valid) = match digits.len() {
            14 => (TaxIdKind::Cnpj, validate_cnpj(&digits)),
            11 => (TaxIdKind::Cpf, validate_cpf(&digits)),
            _ => return None,
        };
        Some(Self {
            digits,
            kind,
            validation: if valid {
                Validation::Validated
            } else {
                Validation::Unvalidated
            },
        })
    }

    pub fn digits(&self) -> &str {
        &self.digits
    }

    pub fn kind(&self) -> TaxIdKind {
        self.kind
    }

    pub fn validation(&self) -> Validation {
        self.validation
    }

    pub fn is_validated(&self) -> bool {
        self.validation == Validation::Validated
    }

    pub fn is_cnpj(&self) -> bool {
        self.kind == TaxIdKind::Cnpj
    }

    /// Masked representation (`XX.XXX.XXX/XXXX-XX` or `XXX.XXX.XXX-XX`).
    pub fn formatted(&self) -> String {
        match self.kind {
            TaxIdKind::Cnpj => format_cnpj(&self.digits),
            TaxIdKind::Cpf => format_cpf(&self.digits),
        }
    }

    /// Same base digits with freshly computed check digits.
    pub fn rederived(&self) -> Self {
        let values = digit_values(&self.digits);
        let (dv1, dv2) = match self.kind {
            TaxIdKind::Cnpj => {
                let mut base = [0u8; 12];
                base.copy_from_slice(&values[..12]);
                cnpj_check_digits(&base)
            }
            TaxIdKind::Cpf => {
                let mut base = [0u8; 9];
                base.copy_from_slice(&values[..9]);
                cpf_check_digits(&base)
            }
        };
        let base_len = self.digits.len() - 2;
        Self {
            digits: format!("{}{}{}", &self.digits[..base_len], dv1, dv2),
            kind: self.kind,
            validation: Validation::Validated,
        }
    }

    /// Head-office id for a CNPJ; `None` for a CPF.
    pub fn root_establishment(&self) -> Option<Self> {
        match self.kind {
            TaxIdKind::Cnpj => normalize_to_root_establishment(&self.digits).map(|digits| Self {
                digits,
                kind: TaxIdKind::Cnpj,
                validation: Validation::Validated,
            }),
            TaxIdKind::Cpf => None,
        }
    }
}

impl fmt::Display for TaxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.formatted())
    }
}

/// Tax ID field extractor.
pub struct TaxIdExtractor {
    validate: bool,
    include_cpf: bool,
}

impl TaxIdExtractor {
    /// Create a new extractor that accepts CNPJs only.
    pub fn new() -> Self {
        Self {
            validate: true,
            include_cpf: false,
        }
    }

    /// Set whether ids with inconsistent check digits are dropped.
    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// Also recognize 11-digit CPFs.
    pub fn with_cpf(mut self, include: bool) -> Self {
        self.include_cpf = include;
        self
    }
}

impl Default for TaxIdExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for TaxIdExtractor {
    type Output = ExtractionMatch<TaxId>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        let mut results: Vec<Self::Output> = Vec::new();

        for m in CNPJ_PATTERN.find_iter(text) {
            if let Some(id) = TaxId::from_extracted(m.as_str()) {
                if self.validate && !id.is_validated() {
                    continue;
                }
                // Masked form is far less likely to be an unrelated digit run
                let confidence = if m.as_str().contains('/') { 0.95 } else { 0.8 };
                results.push(
                    ExtractionMatch::new(id, confidence, m.as_str())
                        .with_position(m.start(), m.end()),
                );
            }
        }

        if self.include_cpf {
            for m in CPF_PATTERN.find_iter(text) {
                let overlaps = results.iter().any(|r| {
                    r.position
                        .is_some_and(|(start, end)| m.start() < end && start < m.end())
                });
                if overlaps {
                    continue;
                }
                if let Some(id) = TaxId::from_extracted(m.as_str()) {
                    if self.validate && !id.is_validated() {
                        continue;
                    }
                    results.push(
                        ExtractionMatch::new(id, 0.75, m.as_str())
                            .with_position(m.start(), m.end()),
                    );
                }
            }
        }

        results.sort_by_key(|r| r.position.map(|(start, _)| start).unwrap_or(usize::MAX));
        results
    }
}

/// Compute both CNPJ check digits for a 12-digit base.
pub fn cnpj_check_digits(base: &[u8; 12]) -> (u8, u8) {
    let dv1 = mod11_digit(base, &CNPJ_WEIGHTS_FIRST);
    let mut extended = [0u8; 13];
    extended[..12].copy_from_slice(base);
    extended[12] = dv1;
    let dv2 = mod11_digit(&extended, &CNPJ_WEIGHTS_SECOND);
    (dv1, dv2)
}

/// Compute both CPF check digits for a 9-digit base.
pub fn cpf_check_digits(base: &[u8; 9]) -> (u8, u8) {
    let first_weights: Vec<u32> = (2..=10).rev().collect();
    let dv1 = mod11_digit(base, &first_weights);
    let mut extended = [0u8; 10];
    extended[..9].copy_from_slice(base);
    extended[9] = dv1;
    let second_weights: Vec<u32> = (2..=11).rev().collect();
    let dv2 = mod11_digit(&extended, &second_weights);
    (dv1, dv2)
}

/// Derive the CNPJ check digits from the first 12 digits of `entity_id`.
///
/// Accepts masked or plain input with at least 12 digits; the existing check
/// digits, if any, are ignored.
pub fn validate_or_derive_check_digits(entity_id: &str) -> Option<(u8, u8)> {
    let values = digit_values(entity_id);
    if values.len() != 12 && values.len() != 14 {
        return None;
    }
    let mut base = [0u8; 12];
    base.copy_from_slice(&values[..12]);
    Some(cnpj_check_digits(&base))
}

/// Validate a CNPJ (masked or plain).
pub fn validate_cnpj(cnpj: &str) -> bool {
    let values = digit_values(cnpj);
    if values.len() != 14 || values.iter().all(|&d| d == values[0]) {
        return false;
    }
    validate_or_derive_check_digits(cnpj) == Some((values[12], values[13]))
}

/// Validate a CPF (masked or plain).
pub fn validate_cpf(cpf: &str) -> bool {
    let values = digit_values(cpf);
    if values.len() != 11 || values.iter().all(|&d| d == values[0]) {
        return false;
    }
    let mut base = [0u8; 9];
    base.copy_from_slice(&values[..9]);
    cpf_check_digits(&base) == (values[9], values[10])
}

/// Replace the establishment sequence with `0001` and re-derive both check digits.
///
/// Returns the plain 14-digit head-office CNPJ.
pub fn normalize_to_root_establishment(id: &str) -> Option<String> {
    let values = digit_values(id);
    if values.len() != 14 {
        return None;
    }
    let mut base = [0u8; 12];
    base[..8].copy_from_slice(&values[..8]);
    base[8..].copy_from_slice(&ROOT_ESTABLISHMENT);
    let (dv1, dv2) = cnpj_check_digits(&base);

    let mut root: String = base.iter().map(|d| char::from(b'0' + d)).collect();
    root.push(char::from(b'0' + dv1));
    root.push(char::from(b'0' + dv2));
    Some(root)
}

/// Format CNPJ as XX.XXX.XXX/XXXX-XX.
pub fn format_cnpj(cnpj: &str) -> String {
    let digits = only_digits(cnpj);

    if digits.len() != 14 {
        return cnpj.to_string();
    }

    format!(
        "{}.{}.{}/{}-{}",
        &digits[0..2],
        &digits[2..5],
        &digits[5..8],
        &digits[8..12],
        &digits[12..14]
    )
}

/// Format CPF as XXX.XXX.XXX-XX.
pub fn format_cpf(cpf: &str) -> String {
    let digits = only_digits(cpf);

    if digits.len() != 11 {
        return cpf.to_string();
    }

    format!(
        "{}.{}.{}-{}",
        &digits[0..3],
        &digits[3..6],
        &digits[6..9],
        &digits[9..11]
    )
}

fn mod11_digit(digits: &[u8], weights: &[u32]) -> u8 {
    let sum: u32 = digits
        .iter()
        .zip(weights.iter())
        .map(|(d, w)| u32::from(*d) * w)
        .sum();
    let remainder = sum % 11;
    if remainder < 2 {
        0
    } else {
        (11 - remainder) as u8
    }
}

fn only_digits(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_digit()).collect()
}

fn digit_values(s: &str) -> Vec<u8> {
    s.bytes()
        .filter(u8::is_ascii_digit)
        .map(|b| b - b'0')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_validate_cnpj() {
        assert!(validate_cnpj("11.222.333/0001-81"));
        assert!(validate_cnpj("11222333000181"));
        assert!(!validate_cnpj("11.222.333/0001-82"));
        assert!(!validate_cnpj("11111111111111"));
        assert!(!validate_cnpj("1122233300018"));
    }

    #[test]
    fn test_derive_check_digits() {
        assert_eq!(validate_or_derive_check_digits("112223330001"), Some((8, 1)));
        assert_eq!(validate_or_derive_check_digits("123456780001"), Some((9, 5)));
        assert_eq!(validate_or_derive_check_digits("1234"), None);
    }

    #[test]
    fn test_derive_is_idempotent_on_valid_ids() {
        for id in ["11222333000181", "12345678000195", "11222333000262"] {
            let (dv1, dv2) = validate_or_derive_check_digits(id).unwrap();
            assert_eq!(format!("{}{}", dv1, dv2), &id[12..]);
            assert_eq!(validate_or_derive_check_digits(id), Some((dv1, dv2)));
        }
    }

    #[test]
    fn test_validate_cpf() {
        assert!(validate_cpf("529.982.247-25"));
        assert!(!validate_cpf("529.982.247-24"));
        assert!(!validate_cpf("000.000.000-00"));
    }

    #[test]
    fn test_root_establishment() {
        assert_eq!(
            normalize_to_root_establishment("11.222.333/0002-62"),
            Some("11222333000181".to_string())
        );
        assert_eq!(normalize_to_root_establishment("123"), None);
    }

    #[test]
    fn test_format() {
        assert_eq!(format_cnpj("11222333000181"), "11.222.333/0001-81");
        assert_eq!(format_cpf("52998224725"), "529.982.247-25");
        assert_eq!(format_cnpj("123"), "123");
    }

    #[test]
    fn test_unvalidated_id_is_kept_and_rederived() {
        let id = TaxId::from_extracted("12.345.678/0001-99").unwrap();
        assert!(!id.is_validated());
        assert_eq!(id.formatted(), "12.345.678/0001-99");
        assert!(TaxId::parse("12.345.678/0001-99").is_none());

        let repaired = id.rederived();
        assert!(repaired.is_validated());
        assert_eq!(repaired.digits(), "12345678000195");
    }

    #[test]
    fn test_extract_in_position_order() {
        let text = "Tomador 529.982.247-25 e emitente 11.222.333/0001-81";
        let extractor = TaxIdExtractor::new().with_cpf(true);
        let results = extractor.extract_all(text);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].value.kind(), TaxIdKind::Cpf);
        assert_eq!(results[1].value.kind(), TaxIdKind::Cnpj);
    }

    #[test]
    fn test_extract_skips_invalid_when_validating() {
        let text = "CNPJ 12.345.678/0001-99";
        assert!(TaxIdExtractor::new().extract(text).is_none());
        assert!(TaxIdExtractor::new().with_validation(false).extract(text).is_some());
    }
}
