//! API route handlers. Thin pass-throughs over the store, the provider,
//! the report processors, and the insight engine; all handlers receive
//! `SharedState` via Axum state extraction.

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::{Datelike, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::error::FinsightError;
use crate::insight::InsightEngine;
use crate::providers::{Period, ReportKind, ReportQuery};
use crate::report::{statements, summary, trends};
use crate::SharedState;

/// How long a signed OAuth state parameter stays valid.
const STATE_MAX_AGE_SECS: i64 = 600;

// =============================================================================
// V1 Router
// =============================================================================

pub fn v1_router(state: SharedState) -> Router {
    Router::new()
        // ── Health ───────────────────────────────────────────────────────
        .route("/status", get(status))
        // ── Connect (OAuth lifecycle) ────────────────────────────────────
        .route("/connect/url", get(connect_url))
        .route("/connect/callback", get(connect_callback))
        .route("/connect/status", get(connect_status))
        .route("/connect/{realm_id}", delete(connect_delete))
        // ── Reports ──────────────────────────────────────────────────────
        .route("/accounts/{realm_id}", get(accounts))
        .route("/statements/{kind}", get(statement))
        .route("/trends/{realm_id}", get(trend_report))
        // ── Insights ─────────────────────────────────────────────────────
        .route("/analyze/{kind}", post(analyze))
        .route("/ask", post(ask))
        .route("/questions", get(questions))
        .route("/history/{realm_id}", get(history))
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

async fn status() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "finsight",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// =============================================================================
// Connect Endpoints
// =============================================================================

/// GET /v1/connect/url — Build the QuickBooks consent URL.
async fn connect_url(
    State(state): State<SharedState>,
) -> Result<Json<serde_json::Value>, FinsightError> {
    let issued_at = Utc::now().timestamp();
    let signed_state = state.vault.sign_state(&issued_at.to_string())?;
    let auth_url = state.provider.authorize_url(&signed_state);

    Ok(Json(json!({ "auth_url": auth_url })))
}

#[derive(Deserialize)]
struct CallbackQuery {
    code: String,
    state: String,
    #[serde(rename = "realmId")]
    realm_id: Option<String>,
}

/// GET /v1/connect/callback — Handle the provider's OAuth callback.
///
/// Always redirects: to the dashboard on success, to the dashboard's
/// oauth-error page on failure (the browser is mid-flow here, not an API
/// client).
async fn connect_callback(
    State(state): State<SharedState>,
    Query(q): Query<CallbackQuery>,
) -> Response {
    match handle_callback(&state, &q).await {
        Ok(realm_id) => {
            let url = format!("{}?realm_id={}", state.config.dashboard_url, realm_id);
            Redirect::temporary(&url).into_response()
        }
        Err(e) => {
            tracing::warn!("OAuth callback failed: {e}");
            let url = format!(
                "{}/oauth-error?error={}",
                state.config.dashboard_url,
                urlencode(&e.to_string())
            );
            Redirect::temporary(&url).into_response()
        }
    }
}

async fn handle_callback(
    state: &SharedState,
    q: &CallbackQuery,
) -> Result<String, FinsightError> {
    let issued_at: i64 = state
        .vault
        .verify_state(&q.state)?
        .parse()
        .map_err(|_| FinsightError::InvalidState)?;

    if Utc::now().timestamp() - issued_at > STATE_MAX_AGE_SECS {
        return Err(FinsightError::InvalidState);
    }

    let realm_id = q
        .realm_id
        .clone()
        .ok_or_else(|| FinsightError::MissingInput("realmId".into()))?;

    let tokens = state.provider.exchange_code(&q.code).await?;
    let expires_at =
        Utc::now() + chrono::Duration::seconds(tokens.expires_in.unwrap_or(3600) as i64);

    state
        .store
        .upsert_tokens(
            &state.vault,
            &realm_id,
            &tokens.access_token,
            tokens.refresh_token.as_deref(),
            expires_at,
        )
        .await?;

    tracing::info!("Connected realm {realm_id}");
    Ok(realm_id)
}

#[derive(Deserialize)]
struct StatusQuery {
    realm_id: String,
}

/// GET /v1/connect/status — Whether a realm holds a live token pair.
async fn connect_status(
    State(state): State<SharedState>,
    Query(q): Query<StatusQuery>,
) -> Result<Json<serde_json::Value>, FinsightError> {
    let status = state.store.connection_status(&q.realm_id).await?;
    Ok(Json(json!(status)))
}

/// DELETE /v1/connect/:realm_id — Disconnect a realm.
///
/// Revokes the refresh token best-effort, then deletes the row. After
/// this, report fetches for the realm fail with AuthExpired.
async fn connect_delete(
    State(state): State<SharedState>,
    Path(realm_id): Path<String>,
) -> Result<Json<serde_json::Value>, FinsightError> {
    if let Ok(Some(tokens)) = state.store.get_tokens(&state.vault, &realm_id).await {
        if let Err(e) = state.provider.revoke(&tokens.refresh_token).await {
            tracing::warn!("Revoke for realm {realm_id} failed: {e}");
        }
    }

    state.store.delete_tokens(&realm_id).await?;

    Ok(Json(json!({ "success": true })))
}

// =============================================================================
// Report Endpoints
// =============================================================================

/// GET /v1/accounts/:realm_id — Chart of accounts, raw provider JSON.
async fn accounts(
    State(state): State<SharedState>,
    Path(realm_id): Path<String>,
) -> Result<Json<serde_json::Value>, FinsightError> {
    let query = ReportQuery {
        kind: ReportKind::AccountList,
        period: Period::None,
    };
    let report = state.fetcher().fetch(&realm_id, &query).await?;
    Ok(Json(report))
}

#[derive(Deserialize)]
struct StatementQuery {
    realm_id: String,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    as_of: Option<NaiveDate>,
}

/// GET /v1/statements/:kind — Standardized statement for a period.
async fn statement(
    State(state): State<SharedState>,
    Path(kind): Path<String>,
    Query(q): Query<StatementQuery>,
) -> Result<Json<serde_json::Value>, FinsightError> {
    let kind = parse_kind(&kind)?;
    let today = Utc::now().date_naive();
    let period = period_for(kind, q.start_date, q.end_date, q.as_of, today);

    let query = ReportQuery { kind, period };
    let report = state.fetcher().fetch(&q.realm_id, &query).await?;

    let body = match (kind, period) {
        (ReportKind::ProfitAndLoss, Period::Range { start, end }) => {
            json!(statements::profit_and_loss(&report, start, end))
        }
        (ReportKind::BalanceSheet, Period::AsOf(as_of)) => {
            json!(statements::balance_sheet(&report, as_of))
        }
        (ReportKind::CashFlow, Period::Range { start, end }) => {
            json!(statements::cash_flow(&report, start, end))
        }
        // AccountList is served by /accounts; every statement kind carries
        // the period produced by period_for above.
        _ => return Err(FinsightError::NotFound("statement kind".into())),
    };

    Ok(Json(body))
}

#[derive(Deserialize)]
struct TrendQuery {
    #[serde(default = "default_months")]
    months: usize,
}

fn default_months() -> usize {
    6
}

/// GET /v1/trends/:realm_id — Month-over-month P&L trend analysis.
async fn trend_report(
    State(state): State<SharedState>,
    Path(realm_id): Path<String>,
    Query(q): Query<TrendQuery>,
) -> Result<Json<serde_json::Value>, FinsightError> {
    let months = q.months.clamp(2, 24);
    let windows = trends::month_windows(Utc::now().date_naive(), months);

    let fetcher = state.fetcher();
    let mut points = Vec::with_capacity(windows.len());
    for window in &windows {
        let query = ReportQuery {
            kind: ReportKind::ProfitAndLoss,
            period: Period::Range {
                start: window.start,
                end: window.end,
            },
        };
        let report = fetcher.fetch(&realm_id, &query).await?;
        points.push(trends::extract_metrics(&report, &window.label));
    }

    let analysis = trends::analyze(&points);
    Ok(Json(json!({ "trend_data": points, "analysis": analysis })))
}

// =============================================================================
// Insight Endpoints
// =============================================================================

#[derive(Deserialize)]
struct AnalyzeRequest {
    realm_id: Option<String>,
    /// Pre-fetched report payload; when present the provider is not called.
    data: Option<serde_json::Value>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    as_of: Option<NaiveDate>,
}

/// POST /v1/analyze/:kind — Flatten a report and generate insights.
///
/// Always returns the structured result shape; LLM failures surface in
/// its `error` field, never as an HTTP error.
async fn analyze(
    State(state): State<SharedState>,
    Path(kind): Path<String>,
    Json(body): Json<AnalyzeRequest>,
) -> Result<Json<serde_json::Value>, FinsightError> {
    let kind = parse_kind(&kind)?;

    let report = match (&body.data, &body.realm_id) {
        (Some(data), _) => data.clone(),
        (None, Some(realm_id)) => {
            let today = Utc::now().date_naive();
            let query = ReportQuery {
                kind,
                period: period_for(kind, body.start_date, body.end_date, body.as_of, today),
            };
            state.fetcher().fetch(realm_id, &query).await?
        }
        (None, None) => {
            return Err(FinsightError::MissingInput(
                "report data or realm_id".into(),
            ))
        }
    };

    let lines = flatten_for(kind, &report);
    let result = state
        .insights
        .analyze(kind_label(kind), &summary::to_text(&lines))
        .await;

    if let Some(realm_id) = &body.realm_id {
        if let Err(e) = state
            .store
            .save_analysis(
                realm_id,
                kind.as_provider_str(),
                &result.summary,
                &result.insights,
                &result.recommendations,
                result.error.as_deref(),
            )
            .await
        {
            tracing::warn!("Failed to persist analysis for {realm_id}: {e}");
        }
    }

    Ok(Json(json!(result)))
}

#[derive(Deserialize)]
struct AskRequest {
    realm_id: Option<String>,
    data: Option<serde_json::Value>,
    #[serde(default)]
    question: String,
}

/// POST /v1/ask — Answer a free-form question about the accounts.
async fn ask(
    State(state): State<SharedState>,
    Json(body): Json<AskRequest>,
) -> Result<Json<serde_json::Value>, FinsightError> {
    if body.question.trim().is_empty() {
        return Err(FinsightError::MissingInput("question".into()));
    }

    let payload = match (&body.data, &body.realm_id) {
        (Some(data), _) => data.clone(),
        (None, Some(realm_id)) => {
            let query = ReportQuery {
                kind: ReportKind::AccountList,
                period: Period::None,
            };
            state.fetcher().fetch(realm_id, &query).await?
        }
        (None, None) => {
            return Err(FinsightError::MissingInput(
                "accounts data or realm_id".into(),
            ))
        }
    };

    let lines = summary::summarize_accounts(&payload);
    let result = state
        .insights
        .answer(&summary::to_text(&lines), &body.question)
        .await;

    Ok(Json(json!(result)))
}

/// GET /v1/questions — Suggested financial questions.
async fn questions() -> impl IntoResponse {
    Json(json!({ "questions": InsightEngine::suggested_questions() }))
}

#[derive(Deserialize)]
struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    limit: i64,
}

fn default_history_limit() -> i64 {
    20
}

/// GET /v1/history/:realm_id — Past analyses, newest first.
async fn history(
    State(state): State<SharedState>,
    Path(realm_id): Path<String>,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<serde_json::Value>, FinsightError> {
    let records = state
        .store
        .list_analyses(&realm_id, q.limit.clamp(1, 100))
        .await?;
    Ok(Json(json!({ "analyses": records })))
}

// =============================================================================
// Helpers
// =============================================================================

fn parse_kind(segment: &str) -> Result<ReportKind, FinsightError> {
    ReportKind::from_path(segment)
        .ok_or_else(|| FinsightError::NotFound(format!("report kind '{segment}'")))
}

/// Default period resolution: ranged reports cover the current month to
/// date, point-in-time reports are as of today.
fn period_for(
    kind: ReportKind,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    as_of: Option<NaiveDate>,
    today: NaiveDate,
) -> Period {
    match kind {
        ReportKind::ProfitAndLoss | ReportKind::CashFlow => {
            let first_of_month = today.with_day(1).unwrap_or(today);
            Period::Range {
                start: start.unwrap_or(first_of_month),
                end: end.unwrap_or(today),
            }
        }
        ReportKind::BalanceSheet => Period::AsOf(as_of.unwrap_or(today)),
        ReportKind::AccountList => Period::None,
    }
}

fn flatten_for(kind: ReportKind, report: &serde_json::Value) -> Vec<String> {
    match kind {
        ReportKind::AccountList => summary::summarize_accounts(report),
        _ => summary::summarize_report(report),
    }
}

fn kind_label(kind: ReportKind) -> &'static str {
    match kind {
        ReportKind::ProfitAndLoss => "Profit and Loss report",
        ReportKind::BalanceSheet => "Balance Sheet",
        ReportKind::CashFlow => "Statement of Cash Flows",
        ReportKind::AccountList => "Chart of Accounts",
    }
}

fn urlencode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranged_kinds_default_to_month_to_date() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 6).unwrap();
        let period = period_for(ReportKind::ProfitAndLoss, None, None, None, today);
        assert_eq!(
            period,
            Period::Range {
                start: NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(),
                end: today,
            }
        );
    }

    #[test]
    fn balance_sheet_defaults_to_today() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 6).unwrap();
        assert_eq!(
            period_for(ReportKind::BalanceSheet, None, None, None, today),
            Period::AsOf(today)
        );
    }

    #[test]
    fn explicit_dates_win_over_defaults() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 6).unwrap();
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 6, 30).unwrap();
        assert_eq!(
            period_for(ReportKind::CashFlow, Some(start), Some(end), None, today),
            Period::Range { start, end }
        );
    }
}
