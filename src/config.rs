use anyhow::{Context, Result};

/// Application configuration, loaded once from environment variables at
/// startup and passed into each component's constructor.
#[derive(Debug, Clone)]
pub struct Config {
    // ── Server ──────────────────────────────────────────────────────────
    pub host: String,
    pub port: u16,
    pub base_url: String,
    /// Dashboard frontend URL for post-OAuth redirects
    pub dashboard_url: String,

    // ── Database ────────────────────────────────────────────────────────
    pub database_url: String,

    // ── Crypto ──────────────────────────────────────────────────────────
    /// 32-byte base64-encoded master key for AES-256-GCM token sealing.
    pub master_key: String,
    /// 32-byte base64-encoded HMAC key for state parameter signing.
    pub hmac_secret: String,

    // ── External collaborators ──────────────────────────────────────────
    pub quickbooks: QuickBooksConfig,
    pub llm: LlmConfig,
}

/// QuickBooks Online OAuth app credentials and API environment.
#[derive(Debug, Clone)]
pub struct QuickBooksConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Callback URL registered with the Intuit developer app.
    pub redirect_uri: String,
    pub environment: QboEnvironment,
    /// `minorversion` query parameter sent with every report request.
    pub minor_version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QboEnvironment {
    Sandbox,
    Production,
}

impl QboEnvironment {
    /// Base URL for the company/report API in this environment.
    pub fn api_base(&self) -> &'static str {
        match self {
            QboEnvironment::Sandbox => "https://sandbox-quickbooks.api.intuit.com",
            QboEnvironment::Production => "https://quickbooks.api.intuit.com",
        }
    }
}

/// Chat-completion backend settings (OpenAI-style API).
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:8430".into());

        let environment = match std::env::var("QUICKBOOKS_ENVIRONMENT")
            .unwrap_or_else(|_| "sandbox".into())
            .to_lowercase()
            .as_str()
        {
            "production" | "prod" => QboEnvironment::Production,
            _ => QboEnvironment::Sandbox,
        };

        Ok(Config {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8430".into())
                .parse()
                .context("Invalid PORT")?,
            dashboard_url: std::env::var("DASHBOARD_URL")
                .unwrap_or_else(|_| format!("{base_url}/dashboard")),

            database_url: std::env::var("DATABASE_URL")
                .context("DATABASE_URL is required (PostgreSQL connection string)")?,
            master_key: std::env::var("MASTER_KEY")
                .context("MASTER_KEY is required (32 bytes, base64)")?,
            hmac_secret: std::env::var("HMAC_SECRET")
                .context("HMAC_SECRET is required (32 bytes, base64)")?,

            quickbooks: QuickBooksConfig {
                client_id: std::env::var("QUICKBOOKS_CLIENT_ID")
                    .context("QUICKBOOKS_CLIENT_ID is required")?,
                client_secret: std::env::var("QUICKBOOKS_CLIENT_SECRET")
                    .context("QUICKBOOKS_CLIENT_SECRET is required")?,
                redirect_uri: std::env::var("QUICKBOOKS_REDIRECT_URI")
                    .unwrap_or_else(|_| format!("{base_url}/v1/connect/callback")),
                environment,
                minor_version: std::env::var("QUICKBOOKS_MINOR_VERSION")
                    .unwrap_or_else(|_| "75".into()),
            },

            llm: LlmConfig {
                api_key: std::env::var("LLM_API_KEY")
                    .or_else(|_| std::env::var("OPENAI_API_KEY"))
                    .context("LLM_API_KEY (or OPENAI_API_KEY) is required")?,
                base_url: std::env::var("LLM_BASE_URL")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".into()),
                model: std::env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4".into()),
            },

            base_url,
        })
    }
}
