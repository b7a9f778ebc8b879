//! Money parsing for Brazilian-notation amounts (`1.234,56`).

use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

use super::patterns::{MONEY_STRICT, MONEY_TOKEN};
use super::{ExtractionMatch, FieldExtractor};

/// Why a money string was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyParseError {
    #[error("empty amount")]
    Empty,

    #[error("malformed amount: {0:?}")]
    Malformed(String),
}

/// Money field extractor.
pub struct MoneyExtractor {
    skip_zero: bool,
}

impl MoneyExtractor {
    pub fn new() -> Self {
        Self { skip_zero: false }
    }

    /// Drop `0,00` tokens, which DANFE templates print for every empty box.
    pub fn with_skip_zero(mut self, skip: bool) -> Self {
        self.skip_zero = skip;
        self
    }
}

impl Default for MoneyExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl FieldExtractor for MoneyExtractor {
    type Output = ExtractionMatch<Decimal>;

    fn extract(&self, text: &str) -> Option<Self::Output> {
        self.extract_all(text).into_iter().next()
    }

    fn extract_all(&self, text: &str) -> Vec<Self::Output> {
        let mut results = Vec::new();

        for caps in MONEY_TOKEN.captures_iter(text) {
            let Some(token) = caps.get(1) else { continue };
            let Ok(amount) = parse_money(token.as_str()) else {
                continue;
            };
            if self.skip_zero && amount.is_zero() {
                continue;
            }
            // Explicit currency prefix is a stronger hint than a bare number
            let confidence = if caps[0].starts_with("R$") { 0.9 } else { 0.8 };
            results.push(
                ExtractionMatch::new(amount, confidence, token.as_str())
                    .with_position(token.start(), token.end()),
            );
        }

        results
    }
}

/// Parse a strict Brazilian-notation amount.
///
/// Currency symbols and whitespace are removed first; what remains must be
/// digits with optional `.` thousands groups and exactly two decimals after `,`.
pub fn parse_money(text: &str) -> Result<Decimal, MoneyParseError> {
    let cleaned: String = text
        .replace("R$", "")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '$' && *c != '\u{00a0}')
        .collect();

    if cleaned.is_empty() {
        return Err(MoneyParseError::Empty);
    }
    if !MONEY_STRICT.is_match(&cleaned) {
        return Err(MoneyParseError::Malformed(text.to_string()));
    }

    let normalized = cleaned.replace('.', "").replace(',', ".");
    Decimal::from_str(&normalized).map_err(|_| MoneyParseError::Malformed(text.to_string()))
}

/// Parse a quantity or unit value, which may carry up to ten decimals or none.
///
/// Accepts `10`, `10,5`, `1.000,0000`. A lone `.` with exactly three digits
/// after it is a thousands separator; otherwise it is the decimal point.
pub fn parse_quantity(text: &str) -> Option<Decimal> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();

    if cleaned.is_empty() {
        return None;
    }

    let normalized = if cleaned.contains(',') {
        cleaned.replace('.', "").replace(',', ".")
    } else if let Some(dot) = cleaned.rfind('.') {
        let decimals = cleaned.len() - dot - 1;
        if cleaned.matches('.').count() > 1 || decimals == 3 {
            cleaned.replace('.', "")
        } else {
            cleaned
        }
    } else {
        cleaned
    };

    Decimal::from_str(&normalized).ok()
}

/// Last non-zero money token on a line, if any.
pub fn last_nonzero_money(line: &str) -> Option<Decimal> {
    MoneyExtractor::new()
        .with_skip_zero(true)
        .extract_all(line)
        .pop()
        .map(|m| m.value)
}

/// Format an amount in Brazilian style (1.234,56).
pub fn format_money(amount: Decimal) -> String {
    let s = format!("{:.2}", amount.round_dp(2));
    let (sign, unsigned) = match s.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", s.as_str()),
    };

    let Some((integer_part, decimal_part)) = unsigned.split_once('.') else {
        return s;
    };

    let chars: Vec<char> = integer_part.chars().collect();
    let mut formatted = String::new();

    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            formatted.push('.');
        }
        formatted.push(*c);
    }

    format!("{}{},{}", sign, formatted, decimal_part)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_money() {
        assert_eq!(parse_money("1.234,56"), Ok(dec!(1234.56)));
        assert_eq!(parse_money("0,00"), Ok(dec!(0.00)));
        assert_eq!(parse_money("R$ 1.500,00"), Ok(dec!(1500.00)));
        assert_eq!(parse_money("12.345.678,90"), Ok(dec!(12345678.90)));
        assert_eq!(parse_money("1500,00"), Ok(dec!(1500.00)));
    }

    #[test]
    fn test_parse_money_rejects_malformed() {
        assert!(matches!(parse_money("12,3,4"), Err(MoneyParseError::Malformed(_))));
        assert!(matches!(parse_money("1.234,5"), Err(MoneyParseError::Malformed(_))));
        assert!(matches!(parse_money("12.34,56"), Err(MoneyParseError::Malformed(_))));
        assert!(matches!(parse_money("abc"), Err(MoneyParseError::Malformed(_))));
        assert_eq!(parse_money("  "), Err(MoneyParseError::Empty));
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("10"), Some(dec!(10)));
        assert_eq!(parse_quantity("10,5000"), Some(dec!(10.5)));
        assert_eq!(parse_quantity("1.000,00"), Some(dec!(1000)));
        assert_eq!(parse_quantity("2.5"), Some(dec!(2.5)));
        assert_eq!(parse_quantity("1.000"), Some(dec!(1000)));
        assert_eq!(parse_quantity(""), None);
    }

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(dec!(1234.56)), "1.234,56");
        assert_eq!(format_money(dec!(0)), "0,00");
        assert_eq!(format_money(dec!(1000000)), "1.000.000,00");
        assert_eq!(format_money(dec!(-42.5)), "-42,50");
    }

    #[test]
    fn test_last_nonzero_money() {
        assert_eq!(last_nonzero_money("0,00 150,00 R$ 1.500,00 0,00"), Some(dec!(1500.00)));
        assert_eq!(last_nonzero_money("0,00 0,00"), None);
        assert_eq!(last_nonzero_money("VALOR TOTAL DA NOTA"), None);
    }

    #[test]
    fn test_extractor_positions() {
        let results = MoneyExtractor::new().extract_all("A 1,00 B 2,50");
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].value, dec!(2.50));
        assert_eq!(results[1].position, Some((9, 13)));
    }
}
