//! Narrative summarizer: flattens a nested report into plain text bullet
//! lines for LLM consumption. Pure; tolerates missing sections by
//! skipping them; emitted line order follows source row order.

use serde_json::Value;

use super::tree;

/// Flatten a report's row tree into "- Name: $amount" lines.
///
/// Data rows become one line each; section summaries become one line for
/// the section total. A report without "Rows" yields an empty list.
pub fn summarize_report(report: &Value) -> Vec<String> {
    let mut lines = Vec::new();
    walk(tree::rows(report), &mut lines);
    lines
}

fn walk(rows: &[Value], lines: &mut Vec<String>) {
    for row in rows {
        match tree::row_type(row) {
            Some("Data") => push_line(row, lines),
            _ => {
                walk(tree::rows(row), lines);
                if let Some(summary) = tree::summary(row) {
                    push_line(summary, lines);
                }
            }
        }
    }
}

fn push_line(row: &Value, lines: &mut Vec<String>) {
    if let Some(name) = tree::col_text(row, 0) {
        if name.is_empty() {
            return;
        }
        let amount = tree::col_amount(row, 1).unwrap_or(0.0);
        lines.push(format!("- {}: ${}", name, format_money(amount)));
    }
}

/// Flatten a chart-of-accounts payload into "- Name (Type): $balance"
/// lines. Accepts the query-shaped response (`QueryResponse.Account`), a
/// pre-flattened `accounts` array, or a report-shaped AccountList.
pub fn summarize_accounts(payload: &Value) -> Vec<String> {
    let accounts = payload
        .get("accounts")
        .and_then(|a| a.as_array())
        .or_else(|| {
            payload
                .get("QueryResponse")
                .and_then(|q| q.get("Account"))
                .and_then(|a| a.as_array())
        });

    let accounts = match accounts {
        Some(list) => list,
        // Report-shaped AccountList payload.
        None => return summarize_report(payload),
    };

    let mut lines = Vec::new();
    for account in accounts {
        let name = account
            .get("Name")
            .or_else(|| account.get("name"))
            .and_then(|v| v.as_str())
            .unwrap_or("Unnamed Account");
        let account_type = account
            .get("AccountType")
            .or_else(|| account.get("type"))
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown");
        let balance = account
            .get("CurrentBalance")
            .or_else(|| account.get("balance"))
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0);

        lines.push(format!(
            "- {} ({}): ${}",
            name,
            account_type,
            format_money(balance)
        ));
    }
    lines
}

/// Join flattened lines into the prompt body.
pub fn to_text(lines: &[String]) -> String {
    lines.join("\n")
}

/// "1234567.5" → "1,234,567.50". Negative amounts keep a leading minus.
pub fn format_money(amount: f64) -> String {
    let negative = amount.is_sign_negative() && amount != 0.0;
    let fixed = format!("{:.2}", amount.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some(parts) => parts,
        None => (fixed.as_str(), "00"),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    format!("{}{}.{}", if negative { "-" } else { "" }, grouped, frac_part)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_report_yields_no_lines() {
        assert!(summarize_report(&json!({})).is_empty());
        assert!(summarize_report(&json!({ "Header": {}, "Rows": {} })).is_empty());
    }

    #[test]
    fn lines_follow_source_row_order() {
        let report = json!({
            "Rows": { "Row": [
                { "type": "Section", "group": "Income",
                  "Rows": { "Row": [
                      { "type": "Data", "ColData": [{ "value": "Sales" }, { "value": "1000.00" }] },
                      { "type": "Data", "ColData": [{ "value": "Services" }, { "value": "250.50" }] }
                  ]},
                  "Summary": { "ColData": [{ "value": "Total Income" }, { "value": "1250.50" }] } },
                { "type": "Data", "ColData": [{ "value": "Net Income" }, { "value": "1250.50" }] }
            ]}
        });

        assert_eq!(
            summarize_report(&report),
            vec![
                "- Sales: $1,000.00",
                "- Services: $250.50",
                "- Total Income: $1,250.50",
                "- Net Income: $1,250.50",
            ]
        );
    }

    #[test]
    fn section_without_summary_is_skipped_not_fatal() {
        let report = json!({
            "Rows": { "Row": [
                { "type": "Section", "group": "Expenses",
                  "Rows": { "Row": [
                      { "type": "Data", "ColData": [{ "value": "Rent" }, { "value": "800" }] }
                  ]} }
            ]}
        });
        assert_eq!(summarize_report(&report), vec!["- Rent: $800.00"]);
    }

    #[test]
    fn accounts_from_query_response() {
        let payload = json!({
            "QueryResponse": { "Account": [
                { "Name": "Checking", "AccountType": "Bank", "CurrentBalance": 12075.25 },
                { "Name": "Payroll", "AccountType": "Expense" }
            ]}
        });
        assert_eq!(
            summarize_accounts(&payload),
            vec![
                "- Checking (Bank): $12,075.25",
                "- Payroll (Expense): $0.00",
            ]
        );
    }

    #[test]
    fn money_formatting() {
        assert_eq!(format_money(0.0), "0.00");
        assert_eq!(format_money(999.999), "1,000.00");
        assert_eq!(format_money(1234567.5), "1,234,567.50");
        assert_eq!(format_money(-500.0), "-500.00");
    }
}
