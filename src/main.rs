use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use finsight::config::Config;
use finsight::crypto::Vault;
use finsight::insight::{InsightEngine, OpenAiBackend};
use finsight::providers::QuickBooksProvider;
use finsight::store::TokenStore;
use finsight::{api, store, AppState, SharedState};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "finsight=info".into()),
        )
        .init();

    // Load config
    let config = Config::from_env()?;
    info!("finsight v{}", env!("CARGO_PKG_VERSION"));
    info!("Listening on {}:{}", config.host, config.port);

    // Initialize components
    let vault = Vault::new(&config.master_key, &config.hmac_secret)?;
    let store = TokenStore::new(&config.database_url).await?;
    store.migrate().await?;
    info!("Database connected and migrated ✓");

    let provider = Arc::new(QuickBooksProvider::new(&config.quickbooks));
    info!(
        "QuickBooks provider ready ({:?} environment)",
        config.quickbooks.environment
    );

    let insights = InsightEngine::new(Box::new(OpenAiBackend::new(&config.llm)));

    // Build shared state
    let state: SharedState = Arc::new(AppState {
        config: config.clone(),
        store,
        vault,
        provider,
        insights,
    });

    // Start refresh daemon
    let daemon_state = state.clone();
    tokio::spawn(async move {
        store::refresh_daemon(daemon_state).await;
    });

    // Build router
    let app = api::router(state);

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server ready ✓");
    axum::serve(listener, app).await?;

    Ok(())
}
