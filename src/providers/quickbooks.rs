use async_trait::async_trait;
use serde::Deserialize;

use super::traits::{AccountingProvider, ReportQuery, TokenSet};
use crate::config::QuickBooksConfig;
use crate::error::{truncate_body, FinsightError};

const AUTHORIZE_ENDPOINT: &str = "https://appcenter.intuit.com/connect/oauth2";
const TOKEN_ENDPOINT: &str = "https://oauth.platform.intuit.com/oauth2/v1/tokens/bearer";
const REVOKE_ENDPOINT: &str = "https://oauth.platform.intuit.com/oauth2/v1/tokens/revoke";

/// QuickBooks Online provider.
///
/// OAuth2 authorization-code + refresh-token grants against Intuit's
/// bearer-token endpoint (client-credential basic auth), report retrieval
/// at `/v3/company/{realm}/reports/{Kind}`.
/// Access tokens live 1 hour; refresh tokens ~100 days.
pub struct QuickBooksProvider {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    api_base: String,
    minor_version: String,
    http: reqwest::Client,
}

// Raw token response from Intuit's bearer-token endpoint
#[derive(Debug, Deserialize)]
struct BearerTokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    token_type: String,
    expires_in: Option<u64>,
}

impl QuickBooksProvider {
    pub fn new(config: &QuickBooksConfig) -> Self {
        Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            api_base: config.environment.api_base().to_string(),
            minor_version: config.minor_version.clone(),
            http: reqwest::Client::new(),
        }
    }

    /// POST a grant to the bearer-token endpoint and parse the reply.
    async fn token_grant(
        &self,
        form: &[(&str, &str)],
        on_reject: impl FnOnce(String) -> FinsightError,
    ) -> Result<TokenSet, FinsightError> {
        let resp = self
            .http
            .post(TOKEN_ENDPOINT)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| FinsightError::Provider(format!("Token request failed: {e}")))?;

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(on_reject(truncate_body(&body)));
        }

        let token_resp: BearerTokenResponse = resp
            .json()
            .await
            .map_err(|e| FinsightError::Provider(format!("Failed to parse token response: {e}")))?;

        Ok(TokenSet {
            access_token: token_resp.access_token,
            refresh_token: token_resp.refresh_token,
            token_type: token_resp.token_type,
            expires_in: token_resp.expires_in,
        })
    }
}

#[async_trait]
impl AccountingProvider for QuickBooksProvider {
    fn authorize_url(&self, state: &str) -> String {
        format!(
            "{endpoint}?\
             client_id={client_id}\
             &response_type=code\
             &scope={scope}\
             &redirect_uri={redirect_uri}\
             &state={state}",
            endpoint = AUTHORIZE_ENDPOINT,
            client_id = urlencoding(&self.client_id),
            scope = urlencoding("com.intuit.quickbooks.accounting openid profile email"),
            redirect_uri = urlencoding(&self.redirect_uri),
            state = urlencoding(state),
        )
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenSet, FinsightError> {
        self.token_grant(
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", &self.redirect_uri),
            ],
            |body| FinsightError::Provider(format!("Code exchange rejected: {body}")),
        )
        .await
    }

    async fn refresh_tokens(&self, refresh_token: &str) -> Result<TokenSet, FinsightError> {
        self.token_grant(
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ],
            |body| {
                tracing::warn!("Refresh grant rejected: {body}");
                FinsightError::AuthExpired
            },
        )
        .await
    }

    async fn revoke(&self, token: &str) -> Result<(), FinsightError> {
        let resp = self
            .http
            .post(REVOKE_ENDPOINT)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .header("Accept", "application/json")
            .form(&[("token", token)])
            .send()
            .await
            .map_err(|e| FinsightError::Provider(format!("Revoke request failed: {e}")))?;

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FinsightError::Provider(format!(
                "Revoke rejected: {}",
                truncate_body(&body)
            )));
        }

        Ok(())
    }

    async fn fetch_report(
        &self,
        access_token: &str,
        realm_id: &str,
        query: &ReportQuery,
    ) -> Result<serde_json::Value, FinsightError> {
        let url = format!(
            "{}/v3/company/{}/reports/{}",
            self.api_base,
            realm_id,
            query.kind.as_provider_str()
        );

        let resp = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .header("Accept", "application/json")
            .query(&query.params(&self.minor_version))
            .send()
            .await
            .map_err(|e| FinsightError::Provider(format!("Report request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FinsightError::FetchFailed {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        resp.json()
            .await
            .map_err(|e| FinsightError::Provider(format!("Failed to parse report response: {e}")))
    }
}

/// Simple percent-encoding for URL parameters.
fn urlencoding(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QboEnvironment;

    fn test_provider() -> QuickBooksProvider {
        QuickBooksProvider::new(&QuickBooksConfig {
            client_id: "test-client".into(),
            client_secret: "test-secret".into(),
            redirect_uri: "http://localhost:8430/v1/connect/callback".into(),
            environment: QboEnvironment::Sandbox,
            minor_version: "75".into(),
        })
    }

    #[test]
    fn authorize_url_carries_scope_and_state() {
        let url = test_provider().authorize_url("signed-state");
        assert!(url.starts_with("https://appcenter.intuit.com/connect/oauth2?"));
        assert!(url.contains("client_id=test-client"));
        assert!(url.contains("scope=com.intuit.quickbooks.accounting+openid+profile+email"));
        assert!(url.contains("state=signed-state"));
        assert!(url.contains("response_type=code"));
    }

    #[test]
    fn sandbox_api_base() {
        assert_eq!(
            test_provider().api_base,
            "https://sandbox-quickbooks.api.intuit.com"
        );
    }
}
