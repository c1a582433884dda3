use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::FinsightError;

/// A set of tokens returned from the provider after code exchange or refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub expires_in: Option<u64>,
}

/// The report types retrievable from the accounting provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportKind {
    ProfitAndLoss,
    BalanceSheet,
    CashFlow,
    AccountList,
}

impl ReportKind {
    /// Path segment used by the provider's report endpoint.
    pub fn as_provider_str(&self) -> &'static str {
        match self {
            ReportKind::ProfitAndLoss => "ProfitAndLoss",
            ReportKind::BalanceSheet => "BalanceSheet",
            ReportKind::CashFlow => "CashFlow",
            ReportKind::AccountList => "AccountList",
        }
    }

    /// Parse a URL path segment ("profit-and-loss", "balance-sheet", ...).
    pub fn from_path(s: &str) -> Option<Self> {
        match s {
            "profit-and-loss" | "profitandloss" | "pnl" => Some(ReportKind::ProfitAndLoss),
            "balance-sheet" | "balancesheet" => Some(ReportKind::BalanceSheet),
            "cash-flow" | "cashflow" => Some(ReportKind::CashFlow),
            "accounts" | "account-list" | "accountlist" => Some(ReportKind::AccountList),
            _ => None,
        }
    }
}

/// Reporting period. Profit & loss and cash flow take a date range;
/// balance sheet takes a point-in-time date; the account list takes none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Range { start: NaiveDate, end: NaiveDate },
    AsOf(NaiveDate),
    None,
}

/// A single report request. Transient, never persisted.
#[derive(Debug, Clone)]
pub struct ReportQuery {
    pub kind: ReportKind,
    pub period: Period,
}

impl ReportQuery {
    /// Serialize to the provider's query parameters
    /// (`start_date`/`end_date` or `as_of`, plus `minorversion`).
    pub fn params(&self, minor_version: &str) -> Vec<(String, String)> {
        let mut params = Vec::new();
        match self.period {
            Period::Range { start, end } => {
                params.push(("start_date".into(), start.format("%Y-%m-%d").to_string()));
                params.push(("end_date".into(), end.format("%Y-%m-%d").to_string()));
            }
            Period::AsOf(date) => {
                params.push(("as_of".into(), date.format("%Y-%m-%d").to_string()));
            }
            Period::None => {}
        }
        params.push(("minorversion".into(), minor_version.to_string()));
        params
    }
}

/// Trait for the external accounting provider.
///
/// One implementation per provider; the orchestration above this seam
/// (expiry detection, refresh-and-retry) is provider-agnostic and is
/// tested against an in-memory stub.
#[async_trait]
pub trait AccountingProvider: Send + Sync {
    /// Build the consent URL the user is redirected to.
    ///
    /// `state` is an opaque, HMAC-signed string for CSRF protection.
    fn authorize_url(&self, state: &str) -> String;

    /// Exchange an authorization code for a token pair.
    async fn exchange_code(&self, code: &str) -> Result<TokenSet, FinsightError>;

    /// Exchange a refresh token for a new token pair.
    ///
    /// A rejected grant is terminal: surfaces `AuthExpired`, never retried.
    async fn refresh_tokens(&self, refresh_token: &str) -> Result<TokenSet, FinsightError>;

    /// Revoke a token. Best-effort, used on disconnect.
    async fn revoke(&self, _token: &str) -> Result<(), FinsightError> {
        Ok(())
    }

    /// GET one report as the provider's opaque nested JSON.
    ///
    /// Non-2xx surfaces as `FetchFailed` carrying the status; the caller
    /// decides whether a 401 warrants a refresh-and-retry.
    async fn fetch_report(
        &self,
        access_token: &str,
        realm_id: &str,
        query: &ReportQuery,
    ) -> Result<serde_json::Value, FinsightError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_kind_path_parsing() {
        assert_eq!(
            ReportKind::from_path("profit-and-loss"),
            Some(ReportKind::ProfitAndLoss)
        );
        assert_eq!(
            ReportKind::from_path("balance-sheet"),
            Some(ReportKind::BalanceSheet)
        );
        assert_eq!(ReportKind::from_path("cash-flow"), Some(ReportKind::CashFlow));
        assert_eq!(ReportKind::from_path("accounts"), Some(ReportKind::AccountList));
        assert_eq!(ReportKind::from_path("ledger"), None);
    }

    #[test]
    fn range_query_params() {
        let query = ReportQuery {
            kind: ReportKind::ProfitAndLoss,
            period: Period::Range {
                start: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
                end: NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
            },
        };
        assert_eq!(
            query.params("75"),
            vec![
                ("start_date".to_string(), "2026-01-01".to_string()),
                ("end_date".to_string(), "2026-01-31".to_string()),
                ("minorversion".to_string(), "75".to_string()),
            ]
        );
    }

    #[test]
    fn as_of_query_params() {
        let query = ReportQuery {
            kind: ReportKind::BalanceSheet,
            period: Period::AsOf(NaiveDate::from_ymd_opt(2026, 6, 30).unwrap()),
        };
        assert_eq!(
            query.params("75"),
            vec![
                ("as_of".to_string(), "2026-06-30".to_string()),
                ("minorversion".to_string(), "75".to_string()),
            ]
        );
    }
}
