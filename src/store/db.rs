//! PostgreSQL-backed store for QuickBooks OAuth tokens and analysis history.
//!
//! Tables:
//! - `quickbooks_tokens`: sealed token pair per realm, one live row each
//! - `analysis_history`: persisted insight results per (realm, timestamp)

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, Row};

use crate::crypto::Vault;
use crate::error::FinsightError;

/// Token store backed by PostgreSQL.
pub struct TokenStore {
    pub pool: PgPool,
}

impl TokenStore {
    pub async fn new(db_url: &str) -> Result<Self, FinsightError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(db_url)
            .await
            .map_err(|e| {
                FinsightError::Database(format!("Failed to connect to PostgreSQL: {e}"))
            })?;

        Ok(Self { pool })
    }

    /// Run schema migrations. Idempotent; safe against an existing database.
    pub async fn migrate(&self) -> Result<(), FinsightError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS quickbooks_tokens (
                id              UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                realm_id        TEXT NOT NULL,
                access_token    TEXT NOT NULL,
                refresh_token   TEXT NOT NULL,
                expires_at      TIMESTAMPTZ NOT NULL,
                failure_count   INT DEFAULT 0,
                created_at      TIMESTAMPTZ DEFAULT NOW(),
                updated_at      TIMESTAMPTZ DEFAULT NOW(),
                UNIQUE(realm_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS analysis_history (
                id              UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                realm_id        TEXT NOT NULL,
                report_kind     TEXT NOT NULL,
                summary         TEXT NOT NULL DEFAULT '',
                insights        JSONB NOT NULL DEFAULT '[]',
                recommendations JSONB NOT NULL DEFAULT '[]',
                error           TEXT,
                created_at      TIMESTAMPTZ DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_quickbooks_tokens_expiry ON quickbooks_tokens(expires_at) WHERE failure_count < 3"
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_analysis_history_realm ON analysis_history(realm_id, created_at DESC)"
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Upsert the token pair for a realm (stores sealed tokens).
    ///
    /// One live row per realm: a reconnect overwrites in place. A missing
    /// refresh token in the new pair keeps the stored one.
    pub async fn upsert_tokens(
        &self,
        vault: &Vault,
        realm_id: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> Result<(), FinsightError> {
        let sealed_access = vault.seal(access_token)?;
        let sealed_refresh = match refresh_token {
            Some(rt) => Some(vault.seal(rt)?),
            None => None,
        };

        sqlx::query(
            r#"
            INSERT INTO quickbooks_tokens (realm_id, access_token, refresh_token, expires_at, failure_count)
            VALUES ($1, $2, COALESCE($3, ''), $4, 0)
            ON CONFLICT (realm_id)
            DO UPDATE SET
                access_token = EXCLUDED.access_token,
                refresh_token = COALESCE($3, quickbooks_tokens.refresh_token),
                expires_at = EXCLUDED.expires_at,
                failure_count = 0,
                updated_at = NOW()
            "#,
        )
        .bind(realm_id)
        .bind(&sealed_access)
        .bind(&sealed_refresh)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get the unsealed token pair for a realm, if connected.
    pub async fn get_tokens(
        &self,
        vault: &Vault,
        realm_id: &str,
    ) -> Result<Option<StoredTokens>, FinsightError> {
        let row = sqlx::query(
            "SELECT access_token, refresh_token, expires_at FROM quickbooks_tokens WHERE realm_id = $1",
        )
        .bind(realm_id)
        .fetch_optional(&self.pool)
        .await?;

        let row = match row {
            Some(r) => r,
            None => return Ok(None),
        };

        let sealed_access: String = row.get(0);
        let sealed_refresh: String = row.get(1);
        let expires_at: DateTime<Utc> = row.get(2);

        Ok(Some(StoredTokens {
            realm_id: realm_id.to_string(),
            access_token: vault.open(&sealed_access)?,
            refresh_token: vault.open(&sealed_refresh)?,
            expires_at,
        }))
    }

    /// Connection status for a realm without unsealing anything.
    pub async fn connection_status(
        &self,
        realm_id: &str,
    ) -> Result<ConnectionStatus, FinsightError> {
        let row = sqlx::query(
            "SELECT expires_at FROM quickbooks_tokens WHERE realm_id = $1",
        )
        .bind(realm_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some(r) => {
                let expires_at: DateTime<Utc> = r.get(0);
                ConnectionStatus {
                    connected: expires_at > Utc::now(),
                    realm_id: Some(realm_id.to_string()),
                    expires_at: Some(expires_at),
                }
            }
            None => ConnectionStatus {
                connected: false,
                realm_id: None,
                expires_at: None,
            },
        })
    }

    /// Delete the token row for a realm (explicit disconnect).
    pub async fn delete_tokens(&self, realm_id: &str) -> Result<(), FinsightError> {
        let affected = sqlx::query("DELETE FROM quickbooks_tokens WHERE realm_id = $1")
            .bind(realm_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if affected == 0 {
            return Err(FinsightError::NotFound("connection".into()));
        }

        Ok(())
    }

    /// Realms whose tokens expire soon (for the refresh daemon).
    pub async fn expiring_within(
        &self,
        within_minutes: i64,
    ) -> Result<Vec<ExpiringConnection>, FinsightError> {
        let rows = sqlx::query(
            r#"
            SELECT realm_id, refresh_token
            FROM quickbooks_tokens
            WHERE expires_at < NOW() + ($1 || ' minutes')::interval
              AND failure_count < 3
            "#,
        )
        .bind(within_minutes.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| ExpiringConnection {
                realm_id: row.get(0),
                sealed_refresh_token: row.get(1),
            })
            .collect())
    }

    /// Update the token pair after a refresh.
    pub async fn update_refreshed_tokens(
        &self,
        vault: &Vault,
        realm_id: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(), FinsightError> {
        let sealed_access = vault.seal(access_token)?;
        let sealed_refresh = match refresh_token {
            Some(rt) => Some(vault.seal(rt)?),
            None => None,
        };

        sqlx::query(
            r#"
            UPDATE quickbooks_tokens
            SET access_token = $1,
                refresh_token = COALESCE($2, refresh_token),
                expires_at = COALESCE($3, expires_at),
                failure_count = 0,
                updated_at = NOW()
            WHERE realm_id = $4
            "#,
        )
        .bind(&sealed_access)
        .bind(&sealed_refresh)
        .bind(expires_at)
        .bind(realm_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Increment the consecutive refresh failure count for a realm.
    pub async fn increment_failure(&self, realm_id: &str) -> Result<(), FinsightError> {
        sqlx::query(
            "UPDATE quickbooks_tokens SET failure_count = failure_count + 1, updated_at = NOW() WHERE realm_id = $1",
        )
        .bind(realm_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Persist an insight result as an analysis-history row.
    pub async fn save_analysis(
        &self,
        realm_id: &str,
        report_kind: &str,
        summary: &str,
        insights: &[String],
        recommendations: &[String],
        error: Option<&str>,
    ) -> Result<(), FinsightError> {
        sqlx::query(
            r#"
            INSERT INTO analysis_history (realm_id, report_kind, summary, insights, recommendations, error)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(realm_id)
        .bind(report_kind)
        .bind(summary)
        .bind(serde_json::json!(insights))
        .bind(serde_json::json!(recommendations))
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// List past analyses for a realm, newest first.
    pub async fn list_analyses(
        &self,
        realm_id: &str,
        limit: i64,
    ) -> Result<Vec<AnalysisRecord>, FinsightError> {
        let rows = sqlx::query(
            r#"
            SELECT id::text, report_kind, summary, insights, recommendations, error, created_at
            FROM analysis_history
            WHERE realm_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(realm_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| AnalysisRecord {
                id: row.get(0),
                report_kind: row.get(1),
                summary: row.get(2),
                insights: row.get(3),
                recommendations: row.get(4),
                error: row.try_get(5).ok(),
                created_at: row.get(6),
            })
            .collect())
    }
}

// ── Types ────────────────────────────────────────────────────────────────────

/// Unsealed token pair for a connected realm.
#[derive(Debug)]
pub struct StoredTokens {
    pub realm_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub realm_id: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Row picked up by the refresh daemon. The refresh token stays sealed
/// until the daemon actually needs it.
#[derive(Debug)]
pub struct ExpiringConnection {
    pub realm_id: String,
    pub sealed_refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct AnalysisRecord {
    pub id: String,
    pub report_kind: String,
    pub summary: String,
    pub insights: serde_json::Value,
    pub recommendations: serde_json::Value,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}
