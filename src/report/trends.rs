//! Month-over-month profit & loss trend analysis.
//!
//! Pure percentage-change arithmetic over per-period metric snapshots;
//! the async driver that fetches one report per window lives with the
//! API handlers.

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;
use serde_json::Value;

use super::tree;

/// Key metrics extracted from one period's P&L report.
#[derive(Debug, Clone, Serialize)]
pub struct PeriodMetrics {
    pub period: String,
    pub total_revenue: f64,
    pub total_expenses: f64,
    pub gross_profit: f64,
    pub net_income: f64,
    pub gross_margin: f64,
    pub net_margin: f64,
}

#[derive(Debug, Serialize)]
pub struct GrowthPoint {
    pub period: String,
    pub growth: f64,
}

#[derive(Debug, Serialize)]
pub struct TrendAnalysis {
    pub revenue_growth: Vec<GrowthPoint>,
    pub expense_growth: Vec<GrowthPoint>,
    pub profit_growth: Vec<GrowthPoint>,
    pub overall_trend: String,
    pub insights: Vec<String>,
}

/// One month window for the trend sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthWindow {
    pub label: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// The last `months` month windows, oldest first. The newest window ends
/// at `today`; earlier windows cover whole months.
pub fn month_windows(today: NaiveDate, months: usize) -> Vec<MonthWindow> {
    let mut windows = Vec::with_capacity(months);
    let mut end = today;
    for _ in 0..months {
        let start = end.with_day(1).unwrap_or(end);
        windows.push(MonthWindow {
            label: start.format("%b %Y").to_string(),
            start,
            end,
        });
        end = start - Duration::days(1);
    }
    windows.reverse();
    windows
}

/// Pull the summary metrics out of a P&L report via the tolerant walker.
pub fn extract_metrics(report: &Value, period_label: &str) -> PeriodMetrics {
    let rows = tree::rows(report);

    let total_revenue = tree::find_section(rows, "Income")
        .and_then(tree::summary_amount)
        .unwrap_or(0.0);
    let gross_profit = tree::find_section(rows, "GrossProfit")
        .and_then(tree::summary_amount)
        .unwrap_or(0.0);
    let total_expenses = tree::find_section(rows, "Expenses")
        .and_then(tree::summary_amount)
        .unwrap_or(0.0);
    let net_income = tree::find_section(rows, "NetIncome")
        .and_then(tree::summary_amount)
        .unwrap_or(0.0);

    let (gross_margin, net_margin) = if total_revenue > 0.0 {
        (
            gross_profit / total_revenue * 100.0,
            net_income / total_revenue * 100.0,
        )
    } else {
        (0.0, 0.0)
    };

    PeriodMetrics {
        period: period_label.to_string(),
        total_revenue,
        total_expenses,
        gross_profit,
        net_income,
        gross_margin,
        net_margin,
    }
}

/// Period-over-period growth and rule-based insights.
pub fn analyze(points: &[PeriodMetrics]) -> TrendAnalysis {
    if points.len() < 2 {
        return TrendAnalysis {
            revenue_growth: Vec::new(),
            expense_growth: Vec::new(),
            profit_growth: Vec::new(),
            overall_trend: "insufficient_data".into(),
            insights: Vec::new(),
        };
    }

    let mut analysis = TrendAnalysis {
        revenue_growth: Vec::new(),
        expense_growth: Vec::new(),
        profit_growth: Vec::new(),
        overall_trend: String::new(),
        insights: Vec::new(),
    };

    for pair in points.windows(2) {
        let (previous, current) = (&pair[0], &pair[1]);

        // A zero-revenue base period has no meaningful growth rate.
        if previous.total_revenue == 0.0 {
            continue;
        }

        let revenue_growth =
            (current.total_revenue - previous.total_revenue) / previous.total_revenue * 100.0;
        let expense_growth = if previous.total_expenses > 0.0 {
            (current.total_expenses - previous.total_expenses) / previous.total_expenses * 100.0
        } else {
            0.0
        };
        let profit_growth = if previous.net_income > 0.0 {
            (current.net_income - previous.net_income) / previous.net_income * 100.0
        } else {
            0.0
        };

        analysis.revenue_growth.push(GrowthPoint {
            period: current.period.clone(),
            growth: revenue_growth,
        });
        analysis.expense_growth.push(GrowthPoint {
            period: current.period.clone(),
            growth: expense_growth,
        });
        analysis.profit_growth.push(GrowthPoint {
            period: current.period.clone(),
            growth: profit_growth,
        });
    }

    if !analysis.revenue_growth.is_empty() {
        let avg_revenue_growth = analysis.revenue_growth.iter().map(|p| p.growth).sum::<f64>()
            / analysis.revenue_growth.len() as f64;
        let avg_profit_growth = analysis.profit_growth.iter().map(|p| p.growth).sum::<f64>()
            / analysis.profit_growth.len() as f64;

        if avg_revenue_growth > 10.0 && avg_profit_growth > 10.0 {
            analysis.overall_trend = "strong_growth".into();
            analysis
                .insights
                .push("Your business is showing strong growth in both revenue and profit.".into());
        } else if avg_revenue_growth > 5.0 {
            analysis.overall_trend = "moderate_growth".into();
            analysis
                .insights
                .push("Your business is showing moderate growth.".into());
        } else if avg_revenue_growth < 0.0 {
            analysis.overall_trend = "decline".into();
            analysis.insights.push(
                "Your revenue has been declining. Consider reviewing your sales strategy.".into(),
            );
        } else {
            analysis.overall_trend = "stable".into();
            analysis
                .insights
                .push("Your business appears stable with minimal growth.".into());
        }
    } else {
        analysis.overall_trend = "insufficient_data".into();
    }

    if let Some(latest) = points.last() {
        if latest.total_revenue > 0.0 && latest.gross_margin < 30.0 {
            analysis.insights.push(
                "Your gross margin is below industry average. Consider ways to reduce direct costs."
                    .into(),
            );
        }
    }

    if points.len() >= 3 {
        let recent = &points[points.len() - 3..];
        if recent[2].total_expenses > recent[1].total_expenses
            && recent[1].total_expenses > recent[0].total_expenses
        {
            analysis.insights.push(
                "Your expenses have been consistently increasing. Review your cost structure."
                    .into(),
            );
        }
    }

    analysis
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(period: &str, revenue: f64, expenses: f64, net: f64) -> PeriodMetrics {
        PeriodMetrics {
            period: period.into(),
            total_revenue: revenue,
            total_expenses: expenses,
            gross_profit: revenue - expenses,
            net_income: net,
            gross_margin: if revenue > 0.0 {
                (revenue - expenses) / revenue * 100.0
            } else {
                0.0
            },
            net_margin: if revenue > 0.0 { net / revenue * 100.0 } else { 0.0 },
        }
    }

    #[test]
    fn growth_is_percentage_change() {
        let analysis = analyze(&[
            metrics("Jan 2026", 100.0, 50.0, 40.0),
            metrics("Feb 2026", 110.0, 55.0, 44.0),
        ]);

        assert_eq!(analysis.revenue_growth.len(), 1);
        assert!((analysis.revenue_growth[0].growth - 10.0).abs() < 1e-9);
        assert!((analysis.expense_growth[0].growth - 10.0).abs() < 1e-9);
        assert!((analysis.profit_growth[0].growth - 10.0).abs() < 1e-9);
    }

    #[test]
    fn zero_revenue_base_periods_are_skipped() {
        let analysis = analyze(&[
            metrics("Jan 2026", 0.0, 50.0, -50.0),
            metrics("Feb 2026", 100.0, 50.0, 50.0),
            metrics("Mar 2026", 110.0, 50.0, 60.0),
        ]);

        // Only Feb→Mar produces a growth point.
        assert_eq!(analysis.revenue_growth.len(), 1);
        assert_eq!(analysis.revenue_growth[0].period, "Mar 2026");
    }

    #[test]
    fn fewer_than_two_periods_is_insufficient() {
        let analysis = analyze(&[metrics("Jan 2026", 100.0, 50.0, 40.0)]);
        assert_eq!(analysis.overall_trend, "insufficient_data");
        assert!(analysis.revenue_growth.is_empty());
    }

    #[test]
    fn strong_growth_classification() {
        let analysis = analyze(&[
            metrics("Jan 2026", 100.0, 20.0, 50.0),
            metrics("Feb 2026", 120.0, 22.0, 62.0),
        ]);
        assert_eq!(analysis.overall_trend, "strong_growth");
    }

    #[test]
    fn declining_revenue_classification() {
        let analysis = analyze(&[
            metrics("Jan 2026", 100.0, 50.0, 40.0),
            metrics("Feb 2026", 80.0, 50.0, 20.0),
        ]);
        assert_eq!(analysis.overall_trend, "decline");
    }

    #[test]
    fn consistently_rising_expenses_flagged() {
        let analysis = analyze(&[
            metrics("Jan 2026", 100.0, 40.0, 40.0),
            metrics("Feb 2026", 100.0, 45.0, 35.0),
            metrics("Mar 2026", 100.0, 50.0, 30.0),
        ]);
        assert!(analysis
            .insights
            .iter()
            .any(|i| i.contains("consistently increasing")));
    }

    #[test]
    fn month_windows_cover_trailing_months_oldest_first() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 6).unwrap();
        let windows = month_windows(today, 3);

        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0].label, "Jun 2026");
        assert_eq!(windows[2].label, "Aug 2026");
        // Newest window is truncated at today.
        assert_eq!(windows[2].start, NaiveDate::from_ymd_opt(2026, 8, 1).unwrap());
        assert_eq!(windows[2].end, today);
        // Earlier windows are whole months.
        assert_eq!(windows[1].start, NaiveDate::from_ymd_opt(2026, 7, 1).unwrap());
        assert_eq!(windows[1].end, NaiveDate::from_ymd_opt(2026, 7, 31).unwrap());
    }

    #[test]
    fn extract_metrics_reads_summary_rows() {
        let report = serde_json::json!({
            "Rows": { "Row": [
                { "type": "Section", "group": "Income",
                  "Summary": { "ColData": [{ "value": "Total Income" }, { "value": "200.00" }] } },
                { "type": "Section", "group": "GrossProfit",
                  "Summary": { "ColData": [{ "value": "Gross Profit" }, { "value": "120.00" }] } },
                { "type": "Section", "group": "Expenses",
                  "Summary": { "ColData": [{ "value": "Total Expenses" }, { "value": "80.00" }] } },
                { "type": "Section", "group": "NetIncome",
                  "Summary": { "ColData": [{ "value": "Net Income" }, { "value": "40.00" }] } }
            ]}
        });

        let metrics = extract_metrics(&report, "Jul 2026");
        assert_eq!(metrics.total_revenue, 200.0);
        assert_eq!(metrics.gross_profit, 120.0);
        assert_eq!(metrics.total_expenses, 80.0);
        assert_eq!(metrics.net_income, 40.0);
        assert_eq!(metrics.gross_margin, 60.0);
        assert_eq!(metrics.net_margin, 20.0);
    }
}
