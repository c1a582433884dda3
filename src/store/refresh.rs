//! Background token refresh daemon.
//!
//! Runs every 5 minutes. Finds realms whose tokens expire within 10
//! minutes, refreshes them through the provider, and tracks consecutive
//! failures. Foreground requests refresh on their own inside the 5-minute
//! margin; the daemon keeps idle connections alive between requests.

use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Start the refresh daemon loop.
pub async fn refresh_daemon(state: Arc<crate::AppState>) {
    let interval = tokio::time::Duration::from_secs(5 * 60);
    info!("Token refresh daemon started (interval: 5m)");

    loop {
        tokio::time::sleep(interval).await;
        if let Err(e) = refresh_cycle(&state).await {
            error!("Refresh cycle error: {e}");
        }
    }
}

async fn refresh_cycle(state: &crate::AppState) -> Result<(), crate::error::FinsightError> {
    let expiring = state.store.expiring_within(10).await?;

    if expiring.is_empty() {
        return Ok(());
    }

    info!("Found {} connections to refresh", expiring.len());

    for conn in expiring {
        let refresh_token = match state.vault.open(&conn.sealed_refresh_token) {
            Ok(rt) => rt,
            Err(e) => {
                warn!("Unsealing refresh token for {} failed: {e}", conn.realm_id);
                continue;
            }
        };

        match state.provider.refresh_tokens(&refresh_token).await {
            Ok(tokens) => {
                let expires_at = tokens
                    .expires_in
                    .map(|secs| Utc::now() + chrono::Duration::seconds(secs as i64));

                state
                    .store
                    .update_refreshed_tokens(
                        &state.vault,
                        &conn.realm_id,
                        &tokens.access_token,
                        tokens.refresh_token.as_deref(),
                        expires_at,
                    )
                    .await?;

                info!("Refreshed tokens for realm {}", conn.realm_id);
            }
            Err(e) => {
                error!("Failed to refresh realm {}: {e}", conn.realm_id);
                state.store.increment_failure(&conn.realm_id).await?;
            }
        }
    }

    Ok(())
}
