pub mod api;
pub mod config;
pub mod crypto;
pub mod error;
pub mod insight;
pub mod providers;
pub mod report;
pub mod store;

pub use config::Config;
pub use error::FinsightError;

use std::sync::Arc;

use crypto::Vault;
use insight::InsightEngine;
use providers::{AccountingProvider, ReportFetcher};
use store::TokenStore;

/// Shared application state passed to all API handlers.
pub struct AppState {
    pub config: Config,
    pub store: TokenStore,
    pub vault: Vault,
    pub provider: Arc<dyn AccountingProvider>,
    pub insights: InsightEngine,
}

impl AppState {
    /// Report fetcher bound to this state's store, vault and provider.
    pub fn fetcher(&self) -> ReportFetcher<'_> {
        ReportFetcher::new(&self.store, &self.vault, self.provider.as_ref())
    }
}

pub type SharedState = Arc<AppState>;
