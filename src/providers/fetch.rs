//! Report fetch orchestration: resolve a valid access token (refreshing
//! proactively inside the expiry margin), issue the report request, and
//! on a 401 perform exactly one refresh-and-retry.
//!
//! The token-free core (`fetch_with_refresh`) is separated from the
//! store-backed wrapper so the retry policy is testable against a stub
//! provider.

use chrono::{DateTime, Duration, Utc};

use super::traits::{AccountingProvider, ReportQuery};
use crate::crypto::Vault;
use crate::error::FinsightError;
use crate::store::TokenStore;

/// Time-before-expiry threshold that triggers a proactive refresh.
pub const REFRESH_MARGIN_MINUTES: i64 = 5;

/// Whether a stored token must be refreshed before use.
pub fn needs_refresh(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expires_at - now <= Duration::minutes(REFRESH_MARGIN_MINUTES)
}

/// Tokens loaded from the store for one fetch.
#[derive(Debug, Clone)]
pub struct LiveTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

/// A refreshed pair obtained mid-fetch, persisted after the call.
/// Last write wins; concurrent refreshes for one realm are benign.
#[derive(Debug, Clone)]
pub struct RefreshedTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

async fn refresh(
    provider: &dyn AccountingProvider,
    refresh_token: &str,
    now: DateTime<Utc>,
) -> Result<RefreshedTokens, FinsightError> {
    let set = provider.refresh_tokens(refresh_token).await?;
    Ok(RefreshedTokens {
        access_token: set.access_token,
        refresh_token: set.refresh_token,
        expires_at: set.expires_in.map(|secs| now + Duration::seconds(secs as i64)),
    })
}

fn apply(tokens: &mut LiveTokens, fresh: &RefreshedTokens) {
    tokens.access_token = fresh.access_token.clone();
    // The provider does not always return a new refresh token; keep the old one.
    if let Some(rt) = &fresh.refresh_token {
        tokens.refresh_token = rt.clone();
    }
    if let Some(at) = fresh.expires_at {
        tokens.expires_at = at;
    }
}

/// Store-free fetch core.
///
/// Returns the fetch result plus the last refreshed pair (if any), which
/// the caller must persist even when the fetch itself failed.
pub(crate) async fn fetch_with_refresh(
    provider: &dyn AccountingProvider,
    realm_id: &str,
    query: &ReportQuery,
    tokens: Option<LiveTokens>,
    now: DateTime<Utc>,
) -> (
    Result<serde_json::Value, FinsightError>,
    Option<RefreshedTokens>,
) {
    let mut tokens = match tokens {
        Some(t) => t,
        None => return (Err(FinsightError::AuthExpired), None),
    };
    let mut obtained: Option<RefreshedTokens> = None;

    if needs_refresh(tokens.expires_at, now) {
        match refresh(provider, &tokens.refresh_token, now).await {
            Ok(fresh) => {
                apply(&mut tokens, &fresh);
                obtained = Some(fresh);
            }
            Err(e) => return (Err(e), None),
        }
    }

    match provider
        .fetch_report(&tokens.access_token, realm_id, query)
        .await
    {
        Err(FinsightError::FetchFailed { status: 401, .. }) => {
            // Token rejected despite apparent validity: one refresh-and-retry.
            let fresh = match refresh(provider, &tokens.refresh_token, now).await {
                Ok(f) => f,
                Err(e) => return (Err(e), obtained),
            };
            apply(&mut tokens, &fresh);
            obtained = Some(fresh);
            let retried = provider
                .fetch_report(&tokens.access_token, realm_id, query)
                .await;
            (retried, obtained)
        }
        other => (other, obtained),
    }
}

/// Store-backed report fetcher. One parameterized path for every report
/// kind; thin wrapper over [`fetch_with_refresh`] that loads and persists
/// the token row.
pub struct ReportFetcher<'a> {
    store: &'a TokenStore,
    vault: &'a Vault,
    provider: &'a dyn AccountingProvider,
}

impl<'a> ReportFetcher<'a> {
    pub fn new(store: &'a TokenStore, vault: &'a Vault, provider: &'a dyn AccountingProvider) -> Self {
        Self {
            store,
            vault,
            provider,
        }
    }

    pub async fn fetch(
        &self,
        realm_id: &str,
        query: &ReportQuery,
    ) -> Result<serde_json::Value, FinsightError> {
        let live = self
            .store
            .get_tokens(self.vault, realm_id)
            .await?
            .map(|t| LiveTokens {
                access_token: t.access_token,
                refresh_token: t.refresh_token,
                expires_at: t.expires_at,
            });

        let (result, refreshed) =
            fetch_with_refresh(self.provider, realm_id, query, live, Utc::now()).await;

        if let Some(fresh) = refreshed {
            self.store
                .update_refreshed_tokens(
                    self.vault,
                    realm_id,
                    &fresh.access_token,
                    fresh.refresh_token.as_deref(),
                    fresh.expires_at,
                )
                .await?;
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::traits::{Period, ReportKind, TokenSet};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted outcome for one fetch_report call.
    enum FetchScript {
        Ok,
        Http(u16),
    }

    struct StubProvider {
        calls: Mutex<Vec<&'static str>>,
        fetches: Mutex<VecDeque<FetchScript>>,
        refresh_ok: bool,
    }

    impl StubProvider {
        fn new(fetches: Vec<FetchScript>, refresh_ok: bool) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fetches: Mutex::new(fetches.into()),
                refresh_ok,
            }
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }

        fn refresh_count(&self) -> usize {
            self.calls().iter().filter(|c| **c == "refresh").count()
        }
    }

    #[async_trait]
    impl AccountingProvider for StubProvider {
        fn authorize_url(&self, _state: &str) -> String {
            String::new()
        }

        async fn exchange_code(&self, _code: &str) -> Result<TokenSet, FinsightError> {
            unimplemented!("not exercised")
        }

        async fn refresh_tokens(&self, _refresh_token: &str) -> Result<TokenSet, FinsightError> {
            self.calls.lock().unwrap().push("refresh");
            if self.refresh_ok {
                Ok(TokenSet {
                    access_token: "fresh-access".into(),
                    refresh_token: Some("fresh-refresh".into()),
                    token_type: "bearer".into(),
                    expires_in: Some(3600),
                })
            } else {
                Err(FinsightError::AuthExpired)
            }
        }

        async fn fetch_report(
            &self,
            access_token: &str,
            _realm_id: &str,
            _query: &ReportQuery,
        ) -> Result<serde_json::Value, FinsightError> {
            self.calls.lock().unwrap().push("fetch");
            match self.fetches.lock().unwrap().pop_front() {
                Some(FetchScript::Ok) => Ok(json!({ "Header": {}, "token": access_token })),
                Some(FetchScript::Http(status)) => Err(FinsightError::FetchFailed {
                    status,
                    body: "rejected".into(),
                }),
                None => panic!("fetch_report called more times than scripted"),
            }
        }
    }

    fn query() -> ReportQuery {
        ReportQuery {
            kind: ReportKind::ProfitAndLoss,
            period: Period::None,
        }
    }

    fn tokens_expiring_at(expires_at: DateTime<Utc>) -> Option<LiveTokens> {
        Some(LiveTokens {
            access_token: "stored-access".into(),
            refresh_token: "stored-refresh".into(),
            expires_at,
        })
    }

    #[test]
    fn margin_boundaries() {
        let now = Utc::now();
        assert!(needs_refresh(now - Duration::hours(1), now));
        assert!(needs_refresh(now + Duration::minutes(4), now));
        assert!(needs_refresh(now + Duration::minutes(5), now));
        assert!(!needs_refresh(now + Duration::minutes(6), now));
    }

    #[tokio::test]
    async fn expired_token_refreshes_exactly_once_before_fetch() {
        let provider = StubProvider::new(vec![FetchScript::Ok], true);
        let now = Utc::now();

        let (result, refreshed) = fetch_with_refresh(
            &provider,
            "realm-1",
            &query(),
            tokens_expiring_at(now - Duration::hours(1)),
            now,
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(provider.calls(), vec!["refresh", "fetch"]);
        // The fetch used the refreshed access token, and the new pair is
        // handed back for persistence.
        assert_eq!(result.unwrap()["token"], "fresh-access");
        assert_eq!(refreshed.unwrap().access_token, "fresh-access");
    }

    #[tokio::test]
    async fn valid_token_skips_refresh() {
        let provider = StubProvider::new(vec![FetchScript::Ok], true);
        let now = Utc::now();

        let (result, refreshed) = fetch_with_refresh(
            &provider,
            "realm-1",
            &query(),
            tokens_expiring_at(now + Duration::minutes(30)),
            now,
        )
        .await;

        assert!(result.is_ok());
        assert!(refreshed.is_none());
        assert_eq!(provider.calls(), vec!["fetch"]);
    }

    #[tokio::test]
    async fn single_401_triggers_one_refresh_and_retry() {
        let provider = StubProvider::new(vec![FetchScript::Http(401), FetchScript::Ok], true);
        let now = Utc::now();

        let (result, refreshed) = fetch_with_refresh(
            &provider,
            "realm-1",
            &query(),
            tokens_expiring_at(now + Duration::minutes(30)),
            now,
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(provider.calls(), vec!["fetch", "refresh", "fetch"]);
        assert_eq!(provider.refresh_count(), 1);
        assert_eq!(refreshed.unwrap().access_token, "fresh-access");
    }

    #[tokio::test]
    async fn second_401_propagates_without_further_retry() {
        let provider =
            StubProvider::new(vec![FetchScript::Http(401), FetchScript::Http(401)], true);
        let now = Utc::now();

        let (result, refreshed) = fetch_with_refresh(
            &provider,
            "realm-1",
            &query(),
            tokens_expiring_at(now + Duration::minutes(30)),
            now,
        )
        .await;

        match result {
            Err(FinsightError::FetchFailed { status: 401, .. }) => {}
            other => panic!("expected FetchFailed(401), got {other:?}"),
        }
        assert_eq!(provider.calls(), vec!["fetch", "refresh", "fetch"]);
        assert_eq!(provider.refresh_count(), 1);
        // The refreshed pair is still handed back for persistence.
        assert!(refreshed.is_some());
    }

    #[tokio::test]
    async fn non_401_surfaces_immediately() {
        let provider = StubProvider::new(vec![FetchScript::Http(500)], true);
        let now = Utc::now();

        let (result, _) = fetch_with_refresh(
            &provider,
            "realm-1",
            &query(),
            tokens_expiring_at(now + Duration::minutes(30)),
            now,
        )
        .await;

        match result {
            Err(FinsightError::FetchFailed { status: 500, .. }) => {}
            other => panic!("expected FetchFailed(500), got {other:?}"),
        }
        assert_eq!(provider.calls(), vec!["fetch"]);
    }

    #[tokio::test]
    async fn missing_tokens_fail_as_auth_expired() {
        // Disconnect deletes the row; the next fetch must surface
        // AuthExpired without touching the provider.
        let provider = StubProvider::new(vec![], true);

        let (result, refreshed) =
            fetch_with_refresh(&provider, "realm-1", &query(), None, Utc::now()).await;

        assert!(matches!(result, Err(FinsightError::AuthExpired)));
        assert!(refreshed.is_none());
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn rejected_refresh_is_terminal() {
        let provider = StubProvider::new(vec![], false);
        let now = Utc::now();

        let (result, refreshed) = fetch_with_refresh(
            &provider,
            "realm-1",
            &query(),
            tokens_expiring_at(now - Duration::minutes(1)),
            now,
        )
        .await;

        assert!(matches!(result, Err(FinsightError::AuthExpired)));
        assert!(refreshed.is_none());
        // No report request was attempted after the rejected grant.
        assert_eq!(provider.calls(), vec!["refresh"]);
    }
}
