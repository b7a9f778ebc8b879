//! Product rows of the "dados dos produtos" block.

use tracing::trace;

use crate::models::invoice::LineItem;

use super::rules::{parse_money, parse_quantity, PRODUCT_ROW};

/// Parse one product row:
/// `CODE DESCRIPTION NCM CST CFOP UNIT QTY UNIT_VALUE TOTAL [...]`.
pub fn parse_product_row(line: &str) -> Option<LineItem> {
    let caps = PRODUCT_ROW.captures(line.trim())?;

    let quantity = parse_quantity(&caps["qty"])?;
    let unit_value = parse_quantity(&caps["unit_value"])?;
    let total = parse_money(&caps["total"]).ok()?;

    Some(LineItem {
        code: Some(caps["code"].to_string()),
        description: caps["description"].trim().to_string(),
        quantity,
        unit: Some(caps["unit"].to_uppercase()),
        unit_value,
        total,
        cfop: Some(caps["cfop"].to_string()),
        ncm: Some(caps["ncm"].to_string()),
        situation_code: Some(caps["cst"].to_string()),
    })
}

/// Collect every line that parses as a product row.
pub fn extract_line_items<'a>(lines: impl IntoIterator<Item = &'a str>) -> Vec<LineItem> {
    lines
        .into_iter()
        .filter_map(|line| {
            let item = parse_product_row(line);
            if let Some(item) = &item {
                trace!("product row -> {} ({})", item.description, item.total);
            }
            item
        })
        .collect()
}
