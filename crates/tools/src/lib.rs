//! External retrieval tools for askdoc.
//!
//! - `WebSearchTool`: keyword search through the Serper API
//! - `PageScrapeTool`: main-content extraction of one URL through Firecrawl
//!
//! Both read their credential once at construction and never fail per call:
//! provider errors come back as diagnostics next to an empty result.

pub mod page_scrape;
pub mod retry;
pub mod web_search;

pub use page_scrape::{PageScrapeTool, ScrapeOutcome, INVALID_URL_MESSAGE};
pub use retry::{RetryPolicy, ToolCallError};
pub use web_search::{WebResult, WebSearchOutcome, WebSearchTool};

/// User agent sent with every provider request.
pub(crate) const USER_AGENT: &str = concat!("askdoc/", env!("CARGO_PKG_VERSION"));

pub(crate) fn build_client() -> askdoc_core::AppResult<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| askdoc_core::AppError::Config(format!("Failed to build HTTP client: {}", e)))
}
