//! Tolerant accessors over the provider's report JSON.
//!
//! QBO reports share one shape: a `Header`, a `Columns` list, and a
//! `Rows.Row` array where each row is either `type: "Data"` (a line item
//! whose `ColData` holds name and amount cells) or `type: "Section"` (a
//! `group`-tagged node with nested `Rows` and an optional `Summary` row).
//! Every accessor returns an Option (or an empty slice) instead of
//! failing so that absent sections are skipped, never fatal.

use serde_json::Value;

/// The `Rows.Row` children of a report or section node. Empty when the
/// node has no `Rows` key.
pub fn rows(node: &Value) -> &[Value] {
    node.get("Rows")
        .and_then(|r| r.get("Row"))
        .and_then(|r| r.as_array())
        .map(|v| v.as_slice())
        .unwrap_or(&[])
}

/// The `Summary` row of a section, if present.
pub fn summary(node: &Value) -> Option<&Value> {
    node.get("Summary")
}

/// The `group` tag of a section ("Income", "Expenses", "NetIncome", ...).
pub fn group(node: &Value) -> Option<&str> {
    node.get("group").and_then(|g| g.as_str())
}

/// The `type` tag of a row ("Data", "Section").
pub fn row_type(node: &Value) -> Option<&str> {
    node.get("type").and_then(|t| t.as_str())
}

/// The `id` of a row's first ColData cell, when the provider links the
/// line item to an account.
pub fn col_id(node: &Value, idx: usize) -> Option<&str> {
    node.get("ColData")
        .and_then(|c| c.get(idx))
        .and_then(|c| c.get("id"))
        .and_then(|v| v.as_str())
}

/// Text value of the `idx`-th ColData cell.
pub fn col_text(node: &Value, idx: usize) -> Option<&str> {
    node.get("ColData")
        .and_then(|c| c.get(idx))
        .and_then(|c| c.get("value"))
        .and_then(|v| v.as_str())
}

/// Numeric value of the `idx`-th ColData cell. Empty cells ("") parse to
/// None, not zero, so callers can tell absent from zero.
pub fn col_amount(node: &Value, idx: usize) -> Option<f64> {
    col_text(node, idx).and_then(|s| s.trim().parse::<f64>().ok())
}

/// The report name from the header ("ProfitAndLoss", "BalanceSheet", ...).
pub fn report_name(report: &Value) -> Option<&str> {
    report
        .get("Header")
        .and_then(|h| h.get("ReportName"))
        .and_then(|v| v.as_str())
}

/// Depth-first search for a section with the given `group` tag.
pub fn find_section<'a>(rows: &'a [Value], group_tag: &str) -> Option<&'a Value> {
    for row in rows {
        if group(row) == Some(group_tag) {
            return Some(row);
        }
        if let Some(found) = find_section(self::rows(row), group_tag) {
            return Some(found);
        }
    }
    None
}

/// Amount of a section's Summary row (label in cell 0, amount in cell 1).
pub fn summary_amount(section: &Value) -> Option<f64> {
    summary(section).and_then(|s| col_amount(s, 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rows_of_report_without_rows_is_empty() {
        assert!(rows(&json!({ "Header": {} })).is_empty());
        assert!(rows(&json!({ "Rows": {} })).is_empty());
    }

    #[test]
    fn col_amount_treats_empty_cell_as_absent() {
        let row = json!({ "ColData": [{ "value": "Sales" }, { "value": "" }] });
        assert_eq!(col_amount(&row, 1), None);
        let row = json!({ "ColData": [{ "value": "Sales" }, { "value": "12.50" }] });
        assert_eq!(col_amount(&row, 1), Some(12.5));
    }

    #[test]
    fn find_section_descends_into_nested_rows() {
        let report = json!({
            "Rows": { "Row": [
                { "type": "Section", "group": "Outer", "Rows": { "Row": [
                    { "type": "Section", "group": "Inner",
                      "Summary": { "ColData": [{ "value": "Total Inner" }, { "value": "7.00" }] } }
                ]}}
            ]}
        });
        let inner = find_section(rows(&report), "Inner").unwrap();
        assert_eq!(summary_amount(inner), Some(7.0));
    }
}
