use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Unified error type for the finsight service.
#[derive(Debug, thiserror::Error)]
pub enum FinsightError {
    // ── Connection Errors ───────────────────────────────────────────────
    /// No stored tokens for the realm, or the provider rejected the
    /// refresh grant. Terminal: the user must reconnect QuickBooks.
    #[error("QuickBooks authorization expired; reconnect required")]
    AuthExpired,

    #[error("Report fetch failed: HTTP {status}: {body}")]
    FetchFailed { status: u16, body: String },

    // ── Client Errors ───────────────────────────────────────────────────
    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Invalid state parameter")]
    InvalidState,

    // ── Provider Errors ─────────────────────────────────────────────────
    #[error("Provider error: {0}")]
    Provider(String),

    // ── Crypto Errors ───────────────────────────────────────────────────
    #[error("Sealing error: {0}")]
    Sealing(String),

    #[error("Unsealing error: {0}")]
    Unsealing(String),

    // ── Internal ────────────────────────────────────────────────────────
    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for FinsightError {
    fn from(e: sqlx::Error) -> Self {
        tracing::error!("Database error: {e}");
        FinsightError::Database(e.to_string())
    }
}

impl From<anyhow::Error> for FinsightError {
    fn from(e: anyhow::Error) -> Self {
        FinsightError::Internal(e.to_string())
    }
}

impl IntoResponse for FinsightError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            FinsightError::AuthExpired => (StatusCode::UNAUTHORIZED, "auth_expired"),
            FinsightError::FetchFailed { .. } => (StatusCode::BAD_GATEWAY, "fetch_failed"),
            FinsightError::MissingInput(_) => (StatusCode::BAD_REQUEST, "missing_input"),
            FinsightError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            FinsightError::InvalidState => (StatusCode::BAD_REQUEST, "invalid_state"),
            FinsightError::Provider(_) => (StatusCode::BAD_GATEWAY, "provider_error"),
            FinsightError::Sealing(_) => (StatusCode::INTERNAL_SERVER_ERROR, "sealing_error"),
            FinsightError::Unsealing(_) => (StatusCode::INTERNAL_SERVER_ERROR, "unsealing_error"),
            FinsightError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            FinsightError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Truncate a provider response body for inclusion in an error.
///
/// QBO fault payloads can run to several KB of XML; keep enough to
/// diagnose, not enough to flood the log line.
pub fn truncate_body(body: &str) -> String {
    const MAX: usize = 512;
    if body.len() <= MAX {
        return body.to_string();
    }
    let mut end = MAX;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_leaves_short_bodies_alone() {
        assert_eq!(truncate_body("fault"), "fault");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let body = "é".repeat(600);
        let truncated = truncate_body(&body);
        assert!(truncated.ends_with('…'));
        assert!(truncated.len() <= 512 + '…'.len_utf8());
    }
}
