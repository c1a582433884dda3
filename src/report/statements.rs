//! Standardized financial statements derived from provider reports.
//!
//! The walks are tolerant: a section absent from the report yields empty
//! line items and a zero total. Derived P&L figures are always computed
//! from the section totals rather than read back from the report, so they
//! hold exactly for fixed inputs.

use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;

use super::tree;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineItem {
    pub id: String,
    pub name: String,
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatementPeriod {
    pub start_date: String,
    pub end_date: String,
}

impl StatementPeriod {
    fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start_date: start.format("%Y-%m-%d").to_string(),
            end_date: end.format("%Y-%m-%d").to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProfitAndLossStatement {
    pub statement_type: String,
    pub company_name: String,
    pub period: StatementPeriod,
    pub income: Vec<LineItem>,
    pub total_income: f64,
    pub cost_of_goods_sold: Vec<LineItem>,
    pub total_cogs: f64,
    pub gross_profit: f64,
    pub expenses: Vec<LineItem>,
    pub total_expenses: f64,
    pub operating_income: f64,
    pub other_income: Vec<LineItem>,
    pub total_other_income: f64,
    pub other_expenses: Vec<LineItem>,
    pub total_other_expenses: f64,
    pub net_income: f64,
}

#[derive(Debug, Serialize)]
pub struct BalanceSheetStatement {
    pub statement_type: String,
    pub company_name: String,
    pub as_of_date: String,
    pub assets: Vec<LineItem>,
    pub total_assets: f64,
    pub liabilities: Vec<LineItem>,
    pub total_liabilities: f64,
    pub equity: Vec<LineItem>,
    pub total_equity: f64,
    pub liabilities_and_equity: f64,
}

#[derive(Debug, Serialize)]
pub struct CashFlowStatement {
    pub statement_type: String,
    pub company_name: String,
    pub period: StatementPeriod,
    pub operating_activities: Vec<LineItem>,
    pub total_operating_cash_flow: f64,
    pub investing_activities: Vec<LineItem>,
    pub total_investing_cash_flow: f64,
    pub financing_activities: Vec<LineItem>,
    pub total_financing_cash_flow: f64,
    pub net_cash_change: f64,
    pub beginning_cash_balance: f64,
    pub ending_cash_balance: f64,
}

/// Build the standardized P&L from a ProfitAndLoss report.
pub fn profit_and_loss(
    report: &Value,
    start: NaiveDate,
    end: NaiveDate,
) -> ProfitAndLossStatement {
    let rows = tree::rows(report);

    let (income, total_income) = section(rows, "Income");
    let (cost_of_goods_sold, total_cogs) = section(rows, "COGS");
    let (expenses, total_expenses) = section(rows, "Expenses");
    let (other_income, total_other_income) = section(rows, "OtherIncome");
    let (other_expenses, total_other_expenses) = section(rows, "OtherExpenses");

    // Derived figures come from the totals, not from the report's own
    // GrossProfit/NetIncome rows.
    let gross_profit = total_income - total_cogs;
    let operating_income = gross_profit - total_expenses;
    let net_income = operating_income + total_other_income - total_other_expenses;

    ProfitAndLossStatement {
        statement_type: "Profit and Loss".into(),
        company_name: company_name(report),
        period: StatementPeriod::new(start, end),
        income,
        total_income,
        cost_of_goods_sold,
        total_cogs,
        gross_profit,
        expenses,
        total_expenses,
        operating_income,
        other_income,
        total_other_income,
        other_expenses,
        total_other_expenses,
        net_income,
    }
}

/// Build the standardized balance sheet from a BalanceSheet report.
pub fn balance_sheet(report: &Value, as_of: NaiveDate) -> BalanceSheetStatement {
    let rows = tree::rows(report);

    let (assets, total_assets) = section(rows, "TotalAssets");
    let (assets, total_assets) = if assets.is_empty() && total_assets == 0.0 {
        section(rows, "Assets")
    } else {
        (assets, total_assets)
    };
    let (liabilities, total_liabilities) = section(rows, "Liabilities");
    let (equity, total_equity) = section(rows, "Equity");

    BalanceSheetStatement {
        statement_type: "Balance Sheet".into(),
        company_name: company_name(report),
        as_of_date: as_of.format("%Y-%m-%d").to_string(),
        assets,
        total_assets,
        liabilities,
        total_liabilities,
        equity,
        total_equity,
        liabilities_and_equity: total_liabilities + total_equity,
    }
}

/// Build the standardized cash flow statement from a CashFlow report.
pub fn cash_flow(report: &Value, start: NaiveDate, end: NaiveDate) -> CashFlowStatement {
    let rows = tree::rows(report);

    let (operating_activities, total_operating) = section(rows, "OperatingActivities");
    let (investing_activities, total_investing) = section(rows, "InvestingActivities");
    let (financing_activities, total_financing) = section(rows, "FinancingActivities");

    let net_cash_change = tree::find_section(rows, "CashIncrease")
        .and_then(tree::summary_amount)
        .unwrap_or(total_operating + total_investing + total_financing);
    let beginning_cash_balance = tree::find_section(rows, "BeginningCash")
        .and_then(tree::summary_amount)
        .unwrap_or(0.0);
    let ending_cash_balance = tree::find_section(rows, "EndingCash")
        .and_then(tree::summary_amount)
        .unwrap_or(beginning_cash_balance + net_cash_change);

    CashFlowStatement {
        statement_type: "Statement of Cash Flows".into(),
        company_name: company_name(report),
        period: StatementPeriod::new(start, end),
        operating_activities,
        total_operating_cash_flow: total_operating,
        investing_activities,
        total_investing_cash_flow: total_investing,
        financing_activities,
        total_financing_cash_flow: total_financing,
        net_cash_change,
        beginning_cash_balance,
        ending_cash_balance,
    }
}

/// Line items and total for one `group`-tagged section. Missing section
/// yields an empty list and zero. The total prefers the section's
/// Summary row; without one it is the sum of the collected items.
fn section(rows: &[Value], group_tag: &str) -> (Vec<LineItem>, f64) {
    let node = match tree::find_section(rows, group_tag) {
        Some(node) => node,
        None => return (Vec::new(), 0.0),
    };

    let mut items = Vec::new();
    collect_items(tree::rows(node), &mut items);

    let total = tree::summary_amount(node)
        .unwrap_or_else(|| items.iter().map(|i| i.amount).sum());

    (items, total)
}

fn collect_items(rows: &[Value], items: &mut Vec<LineItem>) {
    for row in rows {
        match tree::row_type(row) {
            Some("Data") => {
                if let Some(name) = tree::col_text(row, 0) {
                    items.push(LineItem {
                        id: tree::col_id(row, 0).unwrap_or("").to_string(),
                        name: name.to_string(),
                        amount: tree::col_amount(row, 1).unwrap_or(0.0),
                    });
                }
            }
            _ => collect_items(tree::rows(row), items),
        }
    }
}

fn company_name(report: &Value) -> String {
    let name = tree::report_name(report)
        .unwrap_or("")
        .replace("ProfitAndLoss", "")
        .replace("Profit and Loss", "")
        .replace("BalanceSheet", "")
        .replace("CashFlow", "")
        .trim()
        .to_string();
    if name.is_empty() {
        "Your Company".into()
    } else {
        name
    }
}
