mod fetch;
mod quickbooks;
mod traits;

pub use fetch::{needs_refresh, ReportFetcher, REFRESH_MARGIN_MINUTES};
pub use quickbooks::QuickBooksProvider;
pub use traits::{AccountingProvider, Period, ReportKind, ReportQuery, TokenSet};
