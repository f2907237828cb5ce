//! Retrieval tools and the registry the retrieval stage routes over.

use askdoc_core::AppResult;
use askdoc_knowledge::{DocumentIndex, Passage};
use askdoc_tools::{PageScrapeTool, ScrapeOutcome, WebSearchOutcome, WebSearchTool};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The tools a query can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    DocumentSearch,
    WebSearch,
    PageScrape,
}

impl ToolKind {
    pub const ALL: [ToolKind; 3] = [Self::DocumentSearch, Self::WebSearch, Self::PageScrape];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DocumentSearch => "document_search",
            Self::WebSearch => "web_search",
            Self::PageScrape => "page_scrape",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Search over the bound document.
#[async_trait]
pub trait DocumentSearch: Send + Sync {
    /// Relevant passages, best first. Empty when nothing is relevant.
    async fn search_passages(&self, query: &str) -> AppResult<Vec<Passage>>;
}

/// Keyword web search. Failures come back as an empty outcome.
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, keywords: &str) -> WebSearchOutcome;
}

/// Main-content extraction of one URL. Never fails.
#[async_trait]
pub trait PageScrape: Send + Sync {
    async fn scrape(&self, url: &str) -> ScrapeOutcome;
}

#[async_trait]
impl DocumentSearch for DocumentIndex {
    async fn search_passages(&self, query: &str) -> AppResult<Vec<Passage>> {
        self.search(query).await
    }
}

#[async_trait]
impl WebSearch for WebSearchTool {
    async fn search(&self, keywords: &str) -> WebSearchOutcome {
        WebSearchTool::search(self, keywords).await
    }
}

#[async_trait]
impl PageScrape for PageScrapeTool {
    async fn scrape(&self, url: &str) -> ScrapeOutcome {
        PageScrapeTool::scrape(self, url).await
    }
}

/// Which tools are available to one pipeline.
///
/// Built once per pipeline; the retrieval stage asks it what it may call
/// instead of probing for tool objects.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    document: Option<Arc<dyn DocumentSearch>>,
    web_search: Option<Arc<dyn WebSearch>>,
    page_scrape: Option<Arc<dyn PageScrape>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, document: Arc<dyn DocumentSearch>) -> Self {
        self.document = Some(document);
        self
    }

    pub fn with_web_search(mut self, web_search: Arc<dyn WebSearch>) -> Self {
        self.web_search = Some(web_search);
        self
    }

    pub fn with_page_scrape(mut self, page_scrape: Arc<dyn PageScrape>) -> Self {
        self.page_scrape = Some(page_scrape);
        self
    }

    pub fn is_available(&self, kind: ToolKind) -> bool {
        match kind {
            ToolKind::DocumentSearch => self.document.is_some(),
            ToolKind::WebSearch => self.web_search.is_some(),
            ToolKind::PageScrape => self.page_scrape.is_some(),
        }
    }

    /// Available tools in routing priority order.
    pub fn available(&self) -> Vec<ToolKind> {
        ToolKind::ALL
            .into_iter()
            .filter(|kind| self.is_available(*kind))
            .collect()
    }

    pub fn document(&self) -> Option<&Arc<dyn DocumentSearch>> {
        self.document.as_ref()
    }

    pub fn web_search(&self) -> Option<&Arc<dyn WebSearch>> {
        self.web_search.as_ref()
    }

    pub fn page_scrape(&self) -> Option<&Arc<dyn PageScrape>> {
        self.page_scrape.as_ref()
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("available", &self.available())
            .finish()
    }
}
