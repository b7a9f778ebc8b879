//! Common regex patterns for DANFE field extraction.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // CNPJ (entity tax ID), masked or plain
    pub static ref CNPJ_PATTERN: Regex = Regex::new(
        r"\b(\d{2})\.?(\d{3})\.?(\d{3})/?(\d{4})-?(\d{2})\b"
    ).unwrap();

    // CPF (individual tax ID), masked or plain
    pub static ref CPF_PATTERN: Regex = Regex::new(
        r"\b(\d{3})\.?(\d{3})\.?(\d{3})-?(\d{2})\b"
    ).unwrap();

    // Invoice number label (NF-e, Nº, N., NO., NO:, NÚMERO, NRO) and the number
    pub static ref INVOICE_NUMBER: Regex = Regex::new(
        r"(?i)(?:\bNF-?E\b|\bN\s?[°º]|\bNO?\.|\bNO\s*:|\bN[ÚU]M(?:ERO)?\b|\bNRO\b)\.?\s*[:\-]?\s*(\d{1,3}(?:\.\d{3})+|\d{1,9})\b"
    ).unwrap();

    // Bare 3-6 digit token used only when no labeled number exists
    pub static ref BARE_NUMBER: Regex = Regex::new(
        r"\b(\d{3,6})\b"
    ).unwrap();

    // Series label
    pub static ref SERIES: Regex = Regex::new(
        r"(?i)S[ÉE]RIE\s*[:\-.]?\s*([0-9.]{1,5})"
    ).unwrap();

    // DD/MM/YYYY
    pub static ref DATE_DMY: Regex = Regex::new(
        r"\b(\d{2})/(\d{2})/(\d{4})\b"
    ).unwrap();

    // Money token in Brazilian notation (1.234,56), optional currency prefix
    pub static ref MONEY_TOKEN: Regex = Regex::new(
        r"(?:R\$\s*)?\b(\d{1,3}(?:\.\d{3})+,\d{2}|\d+,\d{2})\b"
    ).unwrap();

    // Strict money shape after currency and whitespace removal
    pub static ref MONEY_STRICT: Regex = Regex::new(
        r"^(?:\d{1,3}(?:\.\d{3})+|\d+),\d{2}$"
    ).unwrap();

    // Totals
    pub static ref TOTAL_INVOICE: Regex = Regex::new(
        r"(?i)(?:VALOR\s+TOTAL\s+DA\s+NOTA|TOTAL\s+DA\s+NOTA|VALOR\s+TOTAL\s+DA\s+NF|TOTAL\s+DA\s+NF|VALOR\s+TOTAL\s+NF)"
    ).unwrap();

    pub static ref TOTAL_PRODUCTS: Regex = Regex::new(
        r"(?i)(?:VALOR\s+TOTAL\s+DOS\s+PRODUTOS|TOTAL\s+DOS\s+PRODUTOS)"
    ).unwrap();

    // Declared tax headings in the tax computation block
    pub static ref TAX_ICMS: Regex = Regex::new(
        r"(?i)VALOR\s+DO\s+ICMS\b"
    ).unwrap();

    pub static ref TAX_IPI: Regex = Regex::new(
        r"(?i)VALOR\s+(?:TOTAL\s+)?DO\s+IPI"
    ).unwrap();

    pub static ref TAX_PIS: Regex = Regex::new(
        r"(?i)VALOR\s+DO\s+PIS"
    ).unwrap();

    pub static ref TAX_COFINS: Regex = Regex::new(
        r"(?i)VALOR\s+DA\s+COFINS"
    ).unwrap();

    // Start of any column label in the tax computation header row
    pub static ref COLUMN_LABEL: Regex = Regex::new(
        r"(?i)\b(?:BASE\s+DE\s+C[ÁA]LC|VALOR\b|V\.\s*TOTAL|DESCONTO|OUTRAS\s+DESP)"
    ).unwrap();

    // Product row: code, description, NCM, CST/CSOSN, CFOP, unit, qty, unit value, total
    pub static ref PRODUCT_ROW: Regex = Regex::new(
        r"^(?P<code>\S+)\s+(?P<description>.+?)\s+(?P<ncm>\d{8})\s+(?P<cst>\d{2,4})\s+(?P<cfop>[1-7]\d{3})\s+(?P<unit>[A-Za-z]{1,6})\s+(?P<qty>\d[\d.]*(?:,\d{1,4})?)\s+(?P<unit_value>\d[\d.]*,\d{2,10})\s+(?P<total>\d{1,3}(?:\.\d{3})*,\d{2}|\d+,\d{2})\b"
    ).unwrap();

    // Recipient label row ("NOME / RAZÃO SOCIAL ... CNPJ/CPF ... DATA DA EMISSÃO")
    pub static ref NAME_LABEL: Regex = Regex::new(
        r"(?i)NOME\s*/?\s*RAZ[ÃA]O\s+SOCIAL"
    ).unwrap();
}
