//! Section-aware DANFE parser.
//!
//! The text is split into trimmed lines and each line is tagged with the
//! section it belongs to by a small state machine driven only by heading
//! text. Field rules then run over the tagged lines; each rule has a fixed
//! priority order and the first successful rule for a field wins.

use std::time::Instant;

use regex::Regex;
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::models::config::ExtractionConfig;
use crate::models::invoice::{DeclaredTaxes, InvoiceRecord, Party};

use super::items::extract_line_items;
use super::rules::dates::{DEFAULT_MAX_YEAR, DEFAULT_MIN_YEAR};
use super::rules::{
    extract_issue_date, last_nonzero_money, patterns::*, FieldExtractor, MoneyExtractor, TaxId,
    TaxIdExtractor,
};
use super::InvoiceParser;

/// Words that mark page furniture rather than a party name.
const BOILERPLATE_WORDS: &[&str] = &[
    "DANFE",
    "DOCUMENTO",
    "AUXILIAR",
    "NOTA",
    "FISCAL",
    "ELETRONICA",
    "EMITENTE",
    "DESTINATARIO",
    "REMETENTE",
    "PROTOCOLO",
    "AUTORIZACAO",
    "CHAVE",
    "ACESSO",
    "SEFAZ",
    "RECEBEMOS",
    "FOLHA",
];

/// Vocabulary of form labels; a line made only of these is a label line.
const LABEL_WORDS: &[&str] = &[
    "NOME", "RAZAO", "SOCIAL", "CNPJ", "CPF", "DATA", "DA", "DE", "DO", "DOS", "E", "EMISSAO",
    "ENDERECO", "BAIRRO", "DISTRITO", "CEP", "MUNICIPIO", "UF", "FONE", "FAX", "TELEFONE",
    "INSCRICAO", "INSC", "ESTADUAL", "EST", "IE", "HORA", "SAIDA", "ENTRADA", "NATUREZA",
    "OPERACAO", "SITE", "SUBSTITUTO", "TRIBUTARIO",
];

const LABEL_PHRASES: &[&str] = &[
    "RAZAO SOCIAL",
    "INSCRICAO ESTADUAL",
    "CNPJ/CPF",
    "CNPJ / CPF",
    "DATA DA EMISSAO",
    "NATUREZA DA OPERACAO",
    "CHAVE DE ACESSO",
];

const NAME_SEPARATORS: &[char] = &[' ', '-', '–', '—', ':', '\t', '|'];

lazy_static::lazy_static! {
    static ref LEADING_LABEL: Regex = Regex::new(
        r"(?i)^(?:(?:NOME\s*/?\s*RAZ[ÃA]O\s+SOCIAL|RAZ[ÃA]O\s+SOCIAL)\s*[:\-]?|(?:NOME|CNPJ\s*/?\s*CPF|CNPJ|CPF)\s*[:\-])\s*"
    ).unwrap();
    static ref TRAILING_LABEL: Regex = Regex::new(
        r"(?i)\s+(?:CNPJ\s*/\s*CPF|CNPJ|CPF)$"
    ).unwrap();
}

/// Block of the DANFE a line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    /// Outside any party block.
    None,
    /// "Identificação do emitente".
    Issuer,
    /// "Destinatário / remetente".
    Recipient,
}

impl Section {
    /// Section a heading line switches to, or `None` when the line is not a heading.
    pub fn transition(line: &str) -> Option<Section> {
        let folded = fold(line.trim());

        if folded.contains("IDENTIFICACAO DO EMITENTE") || folded == "EMITENTE" {
            Some(Section::Issuer)
        } else if folded.starts_with("DESTINAT") {
            Some(Section::Recipient)
        } else if folded.contains("DADOS DOS PRODUTOS") || folded.contains("CALCULO DO IMPOSTO") {
            Some(Section::None)
        } else {
            None
        }
    }
}

/// A trimmed line tagged with its section.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TaggedLine<'a> {
    pub text: &'a str,
    pub section: Section,
    pub heading: bool,
}

/// Run the section state machine over `text`.
pub(crate) fn tag_lines(text: &str) -> Vec<TaggedLine<'_>> {
    let mut state = Section::None;

    text.lines()
        .map(|raw| {
            let text = raw.trim();
            match Section::transition(text) {
                Some(next) => {
                    state = next;
                    TaggedLine {
                        text,
                        section: next,
                        heading: true,
                    }
                }
                None => TaggedLine {
                    text,
                    section: state,
                    heading: false,
                },
            }
        })
        .collect()
}

/// Result of parsing one document's text.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    /// Extracted record; missing fields are listed in its warnings.
    pub record: InvoiceRecord,
    /// Processing time in milliseconds.
    pub processing_time_ms: u64,
}

/// Rule-based DANFE parser.
pub struct DanfeParser {
    min_year: i32,
    max_year: i32,
    total_lookahead: usize,
    max_invoice_number: u32,
    validate_tax_ids: bool,
}

impl DanfeParser {
    /// Create a new parser with default settings.
    pub fn new() -> Self {
        Self {
            min_year: DEFAULT_MIN_YEAR,
            max_year: DEFAULT_MAX_YEAR,
            total_lookahead: 6,
            max_invoice_number: 999_999,
            validate_tax_ids: false,
        }
    }

    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self::new()
            .with_year_window(config.min_year, config.max_year)
            .with_total_lookahead(config.total_lookahead)
            .with_max_invoice_number(config.max_invoice_number)
            .with_tax_id_validation(config.require_valid_tax_ids)
    }

    /// Set the accepted issue-date year range.
    pub fn with_year_window(mut self, min_year: i32, max_year: i32) -> Self {
        self.min_year = min_year;
        self.max_year = max_year;
        self
    }

    /// Set how many lines below a total heading are inspected.
    pub fn with_total_lookahead(mut self, lines: usize) -> Self {
        self.total_lookahead = lines;
        self
    }

    pub fn with_max_invoice_number(mut self, max: u32) -> Self {
        self.max_invoice_number = max;
        self
    }

    /// Drop tax ids with inconsistent check digits instead of tagging them.
    pub fn with_tax_id_validation(mut self, validate: bool) -> Self {
        self.validate_tax_ids = validate;
        self
    }

    fn accept_number(&self, candidate: &str) -> Option<String> {
        let digits = candidate.replace('.', "");
        let value: u32 = digits.parse().ok()?;
        (1..=self.max_invoice_number)
            .contains(&value)
            .then(|| value.to_string())
    }

    fn extract_number(&self, lines: &[TaggedLine]) -> Option<String> {
        // Labeled number, first match wins
        for (i, line) in lines.iter().enumerate() {
            for caps in INVOICE_NUMBER.captures_iter(line.text) {
                let Some(value) = caps.get(1) else {
                    continue;
                };
                // Access-key digit groups and dates are not invoice numbers
                let after = &line.text[value.end()..];
                if after.starts_with('/') || after.trim_start().starts_with(|c: char| c.is_ascii_digit()) {
                    continue;
                }
                if let Some(number) = self.accept_number(value.as_str()) {
                    debug!("number -> {} (line {})", number, i);
                    return Some(number);
                }
            }
        }

        // Bare 3-6 digit token on a line without a tax id
        for (i, line) in lines.iter().enumerate() {
            if contains_tax_id(line.text) {
                continue;
            }
            for m in BARE_NUMBER.find_iter(line.text) {
                if is_part_of_larger_number(line.text, m.start(), m.end()) {
                    continue;
                }
                if let Some(number) = self.accept_number(m.as_str()) {
                    debug!("number (bare fallback) -> {} (line {})", number, i);
                    return Some(number);
                }
            }
        }

        None
    }

    fn extract_series(&self, lines: &[TaggedLine]) -> Option<String> {
        lines.iter().find_map(|line| {
            let caps = SERIES.captures(line.text)?;
            let digits = caps[1].replace('.', "");
            digits.parse::<u32>().ok().map(|v| v.to_string())
        })
    }

    /// Issuer id and the index of the line it was found on.
    fn extract_issuer_id(&self, lines: &[TaggedLine]) -> Option<(usize, TaxId)> {
        let extractor = TaxIdExtractor::new().with_validation(self.validate_tax_ids);
        let mut outside_blocks = None;

        for (i, line) in lines.iter().enumerate() {
            if line.section == Section::Recipient {
                continue;
            }
            let Some(found) = extractor.extract(line.text) else {
                continue;
            };
            if line.section == Section::Issuer {
                return Some((i, found.value));
            }
            if outside_blocks.is_none() {
                outside_blocks = Some((i, found.value));
            }
        }

        outside_blocks
    }

    fn extract_issuer(&self, lines: &[TaggedLine]) -> Party {
        let mut issuer = Party::default();
        let id = self.extract_issuer_id(lines);

        // Names met directly inside the issuer block take priority
        issuer.name = lines
            .iter()
            .filter(|l| l.section == Section::Issuer && !l.heading)
            .find(|l| is_name_like(l.text))
            .map(|l| l.text.to_string());

        if let Some((line_idx, tax_id)) = id {
            debug!("issuer id -> {} (line {})", tax_id, line_idx);

            if issuer.name.is_none() {
                issuer.name = lines[..line_idx]
                    .iter()
                    .rev()
                    .filter(|l| !l.heading && l.section != Section::Recipient)
                    .find(|l| is_name_like(l.text))
                    .map(|l| l.text.to_string());
            }
            issuer.tax_id = Some(tax_id);
        }

        if let Some(name) = &issuer.name {
            debug!("issuer name -> {}", name);
        }
        issuer
    }

    fn extract_recipient(&self, lines: &[TaggedLine]) -> Party {
        let mut recipient = Party::default();
        let extractor = TaxIdExtractor::new()
            .with_validation(self.validate_tax_ids)
            .with_cpf(true);

        let block: Vec<&TaggedLine> = lines
            .iter()
            .filter(|l| l.section == Section::Recipient && !l.heading)
            .collect();

        for line in &block {
            let Some(found) = extractor.extract(line.text) else {
                continue;
            };
            let start = found.position.map(|(s, _)| s).unwrap_or(0);
            recipient.name = clean_name_prefix(&line.text[..start]);
            debug!("recipient id -> {}", found.value);
            recipient.tax_id = Some(found.value);
            break;
        }

        if recipient.name.is_none() {
            if let Some(label_pos) = block.iter().position(|l| NAME_LABEL.is_match(l.text)) {
                recipient.name = block[label_pos + 1..]
                    .iter()
                    .find(|l| is_name_like(l.text))
                    .map(|l| l.text.to_string());
            }
        }

        if let Some(name) = &recipient.name {
            debug!("recipient name -> {}", name);
        }
        recipient
    }

    /// Value printed after a heading.
    ///
    /// A non-zero amount in the heading's own line is the value of that
    /// cell. Otherwise the last non-zero amount of the look-ahead window wins,
    /// since running subtotals precede the final figure.
    fn money_after_heading(&self, lines: &[TaggedLine], idx: usize, heading_end: usize) -> Option<Decimal> {
        if let Some(value) = last_nonzero_money(&lines[idx].text[heading_end..]) {
            return Some(value);
        }
        lines
            .iter()
            .skip(idx + 1)
            .take(self.total_lookahead)
            .filter_map(|l| last_nonzero_money(l.text))
            .last()
    }

    fn extract_total(&self, lines: &[TaggedLine]) -> Option<Decimal> {
        for (i, line) in lines.iter().enumerate() {
            if let Some(m) = TOTAL_INVOICE.find(line.text) {
                if let Some(value) = self.money_after_heading(lines, i, m.end()) {
                    debug!("total -> {} (line {})", value, i);
                    return Some(value);
                }
            }
        }

        // Products total, last candidate wins
        let mut fallback = None;
        for (i, line) in lines.iter().enumerate() {
            if TOTAL_INVOICE.is_match(line.text) {
                continue;
            }
            if let Some(m) = TOTAL_PRODUCTS.find(line.text) {
                if let Some(value) = self.money_after_heading(lines, i, m.end()) {
                    fallback = Some(value);
                }
            }
        }
        if let Some(value) = fallback {
            debug!("total (products fallback) -> {}", value);
        }
        fallback
    }

    fn declared_tax(&self, lines: &[TaggedLine], heading: &Regex, skip_substitution: bool) -> Option<Decimal> {
        let money = MoneyExtractor::new();

        for (i, line) in lines.iter().enumerate() {
            let Some(m) = heading
                .find_iter(line.text)
                .find(|m| !skip_substitution || !is_substitution(&line.text[m.end()..]))
            else {
                continue;
            };

            // Value printed in the heading's own cell
            let rest = &line.text[m.end()..];
            let cell_end = COLUMN_LABEL.find(rest).map(|c| c.start()).unwrap_or(rest.len());
            if let Some(value) = money.extract(&rest[..cell_end]) {
                return Some(value.value);
            }

            let columns: Vec<usize> = COLUMN_LABEL.find_iter(line.text).map(|c| c.start()).collect();
            let following = lines.iter().skip(i + 1).take(self.total_lookahead);

            if columns.len() <= 1 {
                return following
                    .filter(|l| !l.text.is_empty())
                    .take(1)
                    .find_map(|l| money.extract(l.text))
                    .map(|v| v.value);
            }

            // Header row with several columns: align with the next value row
            let column = columns.iter().position(|&start| start == m.start())?;
            return following
                .map(|l| money.extract_all(l.text))
                .find(|values| !values.is_empty())
                .filter(|values| values.len() == columns.len())
                .map(|values| values[column].value);
        }

        None
    }

    fn extract_taxes(&self, lines: &[TaggedLine]) -> DeclaredTaxes {
        DeclaredTaxes {
            icms: self.declared_tax(lines, &TAX_ICMS, true),
            ipi: self.declared_tax(lines, &TAX_IPI, false),
            pis: self.declared_tax(lines, &TAX_PIS, false),
            cofins: self.declared_tax(lines, &TAX_COFINS, false),
        }
    }
}

impl Default for DanfeParser {
    fn default() -> Self {
        Self::new()
    }
}

impl InvoiceParser for DanfeParser {
    fn parse(&self, source: &str, text: &str) -> ExtractionResult {
        let start = Instant::now();

        info!("Parsing {} characters of DANFE text from {}", text.len(), source);

        let lines = tag_lines(text);
        let mut record = InvoiceRecord::new(source);

        record.number = self.extract_number(&lines);
        record.series = self.extract_series(&lines);
        record.issue_date = extract_issue_date(text, self.min_year, self.max_year);
        record.issuer = self.extract_issuer(&lines);
        record.recipient = self.extract_recipient(&lines);
        record.total = self.extract_total(&lines);
        record.taxes = self.extract_taxes(&lines);
        record.items = extract_line_items(
            lines
                .iter()
                .filter(|l| l.section == Section::None)
                .map(|l| l.text),
        );

        let mut warnings: Vec<String> = record
            .missing_fields()
            .into_iter()
            .map(|field| format!("Could not extract {}", field))
            .collect();
        warnings.extend(record.validate());
        record.warnings = warnings;

        debug!(
            "Extracted invoice {:?} with {} warnings",
            record.number,
            record.warnings.len()
        );

        ExtractionResult {
            record,
            processing_time_ms: start.elapsed().as_millis() as u64,
        }
    }
}

/// Uppercase with Portuguese accents removed.
pub(crate) fn fold(s: &str) -> String {
    s.chars()
        .flat_map(char::to_uppercase)
        .map(|c| match c {
            'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'A',
            'É' | 'È' | 'Ê' | 'Ë' => 'E',
            'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
            'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
            'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
            'Ç' => 'C',
            other => other,
        })
        .collect()
}

fn words(s: &str) -> Vec<String> {
    fold(s)
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_label_line(s: &str) -> bool {
    let folded = fold(s);
    if LABEL_PHRASES.iter().any(|p| folded.contains(p)) {
        return true;
    }
    words(s).iter().all(|w| LABEL_WORDS.contains(&w.as_str()))
}

/// Whether a line looks like a company or person name.
fn is_name_like(s: &str) -> bool {
    let text = s.trim();
    if text.is_empty() || text.chars().any(|c| c.is_ascii_digit()) {
        return false;
    }
    if words(text).iter().any(|w| BOILERPLATE_WORDS.contains(&w.as_str())) {
        return false;
    }
    if is_label_line(text) {
        return false;
    }

    let alphabetic = text.chars().filter(|c| c.is_alphabetic()).count();
    let total = text.chars().count();
    alphabetic >= 3 && alphabetic * 2 >= total
}

fn clean_name_prefix(prefix: &str) -> Option<String> {
    let trimmed = prefix.trim_matches(NAME_SEPARATORS);
    let without_label = LEADING_LABEL.replace(trimmed, "");
    let without_label = TRAILING_LABEL.replace(without_label.trim_matches(NAME_SEPARATORS), "");
    let name = without_label.trim_matches(NAME_SEPARATORS);

    if name.is_empty() || is_label_line(name) {
        None
    } else {
        Some(name.to_string())
    }
}

fn contains_tax_id(line: &str) -> bool {
    CNPJ_PATTERN.is_match(line) || CPF_PATTERN.is_match(line)
}

/// Digits glued to a date, money amount, postal code or similar.
fn is_part_of_larger_number(line: &str, start: usize, end: usize) -> bool {
    let glue = |c: char| matches!(c, '/' | ',' | '.' | '-');
    let before = line[..start].chars().next_back().is_some_and(glue);
    let after = line[end..].chars().next().is_some_and(glue);
    before || after
}

fn is_substitution(after_heading: &str) -> bool {
    let folded = fold(after_heading.trim_start());
    folded.starts_with("ST") || folded.starts_with("S.T") || folded.starts_with("SUBST")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    const ISSUER_FIRST: &str = r#"
        DANFE
        DOCUMENTO AUXILIAR DA NOTA FISCAL ELETRÔNICA
        Nº: 102 SÉRIE: 001
        IDENTIFICAÇÃO DO EMITENTE
        EMPRESA EMISSORA LTDA
        RUA DAS FLORES, 100 - CENTRO
        CNPJ: 11.222.333/0001-81
        DESTINATÁRIO / REMETENTE
        NOME / RAZÃO SOCIAL CNPJ / CPF DATA DA EMISSÃO
        NOME LTDA 12.345.678/0001-99 15/01/2024
        CÁLCULO DO IMPOSTO
        VALOR TOTAL DA NOTA
        0,00
        1.500,00
    "#;

    const RECIPIENT_FIRST: &str = r#"
        DESTINATÁRIO / REMETENTE
        NOME LTDA 12.345.678/0001-99
        EMITENTE
        EMPRESA EMISSORA LTDA
        11.222.333/0001-81
        DADOS DOS PRODUTOS
    "#;

    fn parse(text: &str) -> InvoiceRecord {
        DanfeParser::new().parse("test.pdf", text).record
    }

    #[test]
    fn test_section_transitions() {
        assert_eq!(Section::transition("IDENTIFICAÇÃO DO EMITENTE"), Some(Section::Issuer));
        assert_eq!(Section::transition("identificacao do emitente"), Some(Section::Issuer));
        assert_eq!(Section::transition("EMITENTE"), Some(Section::Issuer));
        assert_eq!(Section::transition("DESTINATÁRIO / REMETENTE"), Some(Section::Recipient));
        assert_eq!(Section::transition("DADOS DOS PRODUTOS / SERVIÇOS"), Some(Section::None));
        assert_eq!(Section::transition("CÁLCULO DO IMPOSTO"), Some(Section::None));
        assert_eq!(Section::transition("EMPRESA EMISSORA LTDA"), None);
    }

    #[test]
    fn test_parties_from_blocks() {
        let record = parse(ISSUER_FIRST);

        assert_eq!(record.issuer.name.as_deref(), Some("EMPRESA EMISSORA LTDA"));
        assert_eq!(record.issuer.tax_id_display(), "11.222.333/0001-81");
        assert_eq!(record.recipient.name.as_deref(), Some("NOME LTDA"));
        assert_eq!(record.recipient.tax_id_display(), "12.345.678/0001-99");
    }

    #[test]
    fn test_parties_independent_of_block_order() {
        let record = parse(RECIPIENT_FIRST);

        assert_eq!(record.issuer.name.as_deref(), Some("EMPRESA EMISSORA LTDA"));
        assert_eq!(record.issuer.tax_id_display(), "11.222.333/0001-81");
        assert_eq!(record.recipient.name.as_deref(), Some("NOME LTDA"));
        assert_eq!(record.recipient.tax_id_display(), "12.345.678/0001-99");
    }

    #[test]
    fn test_header_fields() {
        let record = parse(ISSUER_FIRST);

        assert_eq!(record.number.as_deref(), Some("102"));
        assert_eq!(record.series.as_deref(), Some("1"));
        assert_eq!(record.issue_date, NaiveDate::from_ymd_opt(2024, 1, 15));
        assert_eq!(record.total, Some(dec!(1500.00)));
    }

    #[test]
    fn test_number_first_match_wins() {
        let record = parse("Nº: 102\nEXERCÍCIO 2024\nNº 555");
        assert_eq!(record.number.as_deref(), Some("102"));
    }

    #[test]
    fn test_number_with_thousands_and_degree_sign() {
        assert_eq!(parse("NF-e N° 000.001.234").number.as_deref(), Some("1234"));
        assert_eq!(parse("NÚMERO - 4321").number.as_deref(), Some("4321"));
    }

    #[test]
    fn test_number_ignores_prepositions_and_access_keys() {
        assert_eq!(parse("ENTREGA NO 15/01/2024").number, None);
        assert_eq!(
            parse("NF-E 3524 0112 3456\nNº 000.004.512").number.as_deref(),
            Some("4512")
        );
        assert_eq!(parse("NO. 321").number.as_deref(), Some("321"));
    }

    #[test]
    fn test_number_out_of_range_skipped() {
        let record = parse("Nº 0\nNº 1.234.567\nNº 77");
        assert_eq!(record.number.as_deref(), Some("77"));
    }

    #[test]
    fn test_number_bare_fallback_skips_ids_and_dates() {
        let text = "11.222.333/0001-81 12345\nEMISSÃO 15/01/2024\nPEDIDO 4567";
        assert_eq!(parse(text).number.as_deref(), Some("4567"));
    }

    #[test]
    fn test_issuer_name_backward_scan() {
        let text = "EMPRESA TESTE COMERCIO LTDA\nAV PAULISTA 1000\n11.222.333/0001-81";
        let record = parse(text);
        assert_eq!(record.issuer.name.as_deref(), Some("EMPRESA TESTE COMERCIO LTDA"));
    }

    #[test]
    fn test_boilerplate_is_not_a_name() {
        assert!(!is_name_like("DOCUMENTO AUXILIAR DA NOTA FISCAL ELETRÔNICA"));
        assert!(!is_name_like("NOME / RAZÃO SOCIAL"));
        assert!(!is_name_like("RUA A, 12"));
        assert!(!is_name_like("A.B"));
        assert!(is_name_like("NOME LTDA"));
        assert!(is_name_like("Distribuidora São João"));
    }

    #[test]
    fn test_recipient_name_after_label_prefix() {
        let text = "DESTINATÁRIO\nRAZÃO SOCIAL: COMERCIAL ABC ME CPF: 529.982.247-25";
        let record = parse(text);
        assert_eq!(record.recipient.name.as_deref(), Some("COMERCIAL ABC ME"));
        assert_eq!(record.recipient.tax_id_display(), "529.982.247-25");
    }

    #[test]
    fn test_recipient_name_below_label() {
        let text = "DESTINATÁRIO / REMETENTE\nNOME / RAZÃO SOCIAL\nMERCADO CENTRAL LTDA\nCNPJ 11.222.333/0001-81";
        let record = parse(text);
        assert_eq!(record.recipient.name.as_deref(), Some("MERCADO CENTRAL LTDA"));
        assert_eq!(record.recipient.tax_id_display(), "11.222.333/0001-81");
        assert!(record.issuer.tax_id.is_none());
    }

    #[test]
    fn test_total_last_nonzero_in_window() {
        let text = "VALOR TOTAL DA NOTA\n0,00\n1.500,00";
        assert_eq!(parse(text).total, Some(dec!(1500.00)));

        let same_line = "VALOR TOTAL DA NOTA 10,00 250,00 0,00";
        assert_eq!(parse(same_line).total, Some(dec!(250.00)));
    }

    #[test]
    fn test_total_running_subtotal_then_final_figure() {
        let text = "VALOR TOTAL DA NOTA\n1.000,00\n1.500,00";
        assert_eq!(parse(text).total, Some(dec!(1500.00)));
    }

    #[test]
    fn test_total_outside_window_ignored() {
        let text = "VALOR TOTAL DA NOTA\na\nb\nc\nd\ne\nf\n99,00";
        assert_eq!(parse(text).total, None);
    }

    #[test]
    fn test_total_products_fallback() {
        let text = "VALOR TOTAL DOS PRODUTOS\n80,00\nVALOR TOTAL DOS PRODUTOS 90,00";
        assert_eq!(parse(text).total, Some(dec!(90.00)));

        let both = "VALOR TOTAL DOS PRODUTOS 90,00\nVALOR TOTAL DA NOTA 95,00";
        assert_eq!(parse(both).total, Some(dec!(95.00)));
    }

    #[test]
    fn test_products_fallback_ignores_other_value_headings() {
        let text = "VALOR TOTAL DOS PRODUTOS 1.000,00\nVALOR TOTAL DO IPI 50,00";
        assert_eq!(parse(text).total, Some(dec!(1000.00)));

        let column = "VALOR TOTAL DOS PRODUTOS 1.000,00\nDESCRIÇÃO QTD VALOR UNIT VALOR TOTAL\n2,00 12,50 25,00";
        assert_eq!(parse(column).total, Some(dec!(1000.00)));
    }

    #[test]
    fn test_declared_taxes_column_layout() {
        let text = "\
CÁLCULO DO IMPOSTO
BASE DE CÁLCULO DO ICMS VALOR DO ICMS BASE DE CÁLC. ICMS S.T. VALOR DO ICMS SUBST. VALOR TOTAL DOS PRODUTOS
1.000,00 180,00 0,00 0,00 1.000,00
VALOR DO FRETE VALOR DO SEGURO DESCONTO OUTRAS DESPESAS VALOR TOTAL DO IPI VALOR TOTAL DA NOTA
0,00 0,00 0,00 0,00 50,00 1.050,00";
        let record = parse(text);

        assert_eq!(record.taxes.icms, Some(dec!(180.00)));
        assert_eq!(record.taxes.ipi, Some(dec!(50.00)));
        assert_eq!(record.taxes.pis, None);
        assert_eq!(record.total, Some(dec!(1050.00)));
    }

    #[test]
    fn test_declared_taxes_label_rows() {
        let text = "VALOR DO ICMS\n\n180,00\nVALOR DO PIS: 16,50\nVALOR DA COFINS - 76,00";
        let record = parse(text);

        assert_eq!(record.taxes.icms, Some(dec!(180.00)));
        assert_eq!(record.taxes.pis, Some(dec!(16.50)));
        assert_eq!(record.taxes.cofins, Some(dec!(76.00)));
    }

    #[test]
    fn test_missing_fields_become_warnings() {
        let record = parse("texto sem campos reconheciveis");
        assert!(record.number.is_none());
        assert!(record.total.is_none());
        assert!(record.warnings.iter().any(|w| w == "Could not extract number"));
        assert!(record.warnings.iter().any(|w| w == "Could not extract total"));
    }

    #[test]
    fn test_strict_tax_id_validation_drops_bad_ids() {
        let record = DanfeParser::new()
            .with_tax_id_validation(true)
            .parse("x", RECIPIENT_FIRST)
            .record;
        assert!(record.recipient.tax_id.is_none());
        assert_eq!(record.issuer.tax_id_display(), "11.222.333/0001-81");
    }
}
