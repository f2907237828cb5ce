//! Query routing over the document, web search and page scrape tools.
//!
//! The policy is fixed:
//! 1. the bound document is searched first, and relevant passages end the search;
//! 2. otherwise the web is searched with the query text;
//! 3. a page scrape follows only a URL returned by that web search, when the
//!    configured [`ScrapeTrigger`] says the snippets are not enough.
//!
//! Tool failures are logged and contribute no evidence; `run` always returns.

use askdoc_core::config::{RetrievalSettings, ScrapeTrigger};
use askdoc_knowledge::content_terms;
use askdoc_tools::{ScrapeOutcome, WebResult};
use tracing::{debug, info, instrument, warn};

use crate::tool::{ToolKind, ToolRegistry};
use crate::types::{Evidence, RetrievalResult, SourceKind};

/// Escalation thresholds of the retrieval stage.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalPolicy {
    pub scrape_trigger: ScrapeTrigger,
    /// Snippets shorter than this in total are not enough
    pub min_snippet_chars: usize,
    /// Fraction of query terms that must appear in the snippets
    pub min_query_term_coverage: f32,
    /// URLs tried per query before giving up on scraping
    pub max_scrapes: usize,
}

impl RetrievalPolicy {
    pub fn from_settings(settings: &RetrievalSettings) -> Self {
        Self {
            scrape_trigger: settings.scrape_trigger,
            min_snippet_chars: settings.min_snippet_chars,
            min_query_term_coverage: settings.min_query_term_coverage,
            max_scrapes: settings.max_scrapes,
        }
    }

    /// Whether web snippets alone are too thin to answer `query`.
    pub fn snippets_insufficient(&self, query: &str, results: &[WebResult]) -> bool {
        let snippet_chars: usize = results.iter().map(|r| r.snippet.chars().count()).sum();
        if snippet_chars < self.min_snippet_chars {
            debug!(snippet_chars, "Snippets below minimum length");
            return true;
        }

        let coverage = query_term_coverage(query, results);
        if coverage < self.min_query_term_coverage {
            debug!(coverage, "Snippets miss most query terms");
            return true;
        }

        false
    }

    fn should_scrape(&self, query: &str, results: &[WebResult]) -> bool {
        match self.scrape_trigger {
            ScrapeTrigger::Never => false,
            ScrapeTrigger::Always => true,
            ScrapeTrigger::InsufficientSnippets => self.snippets_insufficient(query, results),
        }
    }
}

impl Default for RetrievalPolicy {
    fn default() -> Self {
        Self::from_settings(&RetrievalSettings::default())
    }
}

/// Fraction of the query's content terms found in result titles or snippets.
/// A query without content terms is fully covered.
pub fn query_term_coverage(query: &str, results: &[WebResult]) -> f32 {
    let mut terms = content_terms(query);
    terms.sort();
    terms.dedup();
    if terms.is_empty() {
        return 1.0;
    }

    let haystack = results
        .iter()
        .map(|r| format!("{} {}", r.title, r.snippet))
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    let found = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
    found as f32 / terms.len() as f32
}

/// First stage of a pipeline: gathers evidence for a query.
#[derive(Debug, Clone)]
pub struct RetrievalStage {
    tools: ToolRegistry,
    policy: RetrievalPolicy,
}

impl RetrievalStage {
    pub fn new(tools: ToolRegistry, policy: RetrievalPolicy) -> Self {
        Self { tools, policy }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn policy(&self) -> &RetrievalPolicy {
        &self.policy
    }

    /// Gather evidence for `query`.
    #[instrument(skip(self), fields(tools = ?self.tools.available()))]
    pub async fn run(&self, query: &str) -> RetrievalResult {
        let mut result = RetrievalResult::default();

        if let Some(document) = self.tools.document() {
            match document.search_passages(query).await {
                Ok(passages) => {
                    result
                        .trace
                        .record(ToolKind::DocumentSearch, query, passages.len(), None);
                    if !passages.is_empty() {
                        info!("Answering from {} document passages", passages.len());
                        result.evidence = passages
                            .iter()
                            .map(|p| Evidence::new(SourceKind::Document, p.text.clone(), p.origin()))
                            .collect();
                        return result;
                    }
                    info!("Document has nothing relevant, falling back to the web");
                }
                Err(e) => {
                    warn!("Document search failed: {}", e);
                    result
                        .trace
                        .record(ToolKind::DocumentSearch, query, 0, Some(e.to_string()));
                }
            }
        }

        let Some(web_search) = self.tools.web_search() else {
            debug!("Web search unavailable");
            return result;
        };

        let outcome = web_search.search(query).await;
        if let Some(ref diagnostic) = outcome.diagnostic {
            warn!("Web search degraded: {}", diagnostic);
        }
        result.trace.record(
            ToolKind::WebSearch,
            query,
            outcome.results.len(),
            outcome.diagnostic.clone(),
        );

        result.evidence.extend(outcome.results.iter().map(|r| {
            Evidence::new(
                SourceKind::WebSearch,
                format!("{}\n{}", r.title, r.snippet),
                r.url.clone(),
            )
        }));

        if outcome.results.is_empty() {
            info!("Web search returned nothing");
            return result;
        }

        if self.policy.should_scrape(query, &outcome.results) {
            let urls: Vec<String> = outcome.results.iter().map(|r| r.url.clone()).collect();
            self.scrape_first(&urls, &mut result).await;
        } else {
            debug!("Web snippets are sufficient");
        }

        result
    }

    /// Follow web-search URLs of `previous` with a page scrape.
    ///
    /// Used when synthesis could not answer from snippets. URLs already
    /// scraped are skipped; the previous evidence is kept.
    #[instrument(skip(self, previous))]
    pub async fn deepen(&self, query: &str, previous: &RetrievalResult) -> RetrievalResult {
        let mut result = previous.clone();

        let urls: Vec<String> = previous
            .evidence
            .iter()
            .filter(|e| e.source == SourceKind::WebSearch)
            .map(|e| e.origin.clone())
            .filter(|url| {
                !previous
                    .trace
                    .calls
                    .iter()
                    .any(|c| c.tool == ToolKind::PageScrape && &c.input == url)
            })
            .collect();

        if urls.is_empty() {
            debug!("No web results left to follow");
            return result;
        }

        self.scrape_first(&urls, &mut result).await;
        result
    }

    /// Scrape `urls` in order until one yields content or `max_scrapes`
    /// attempts are spent.
    async fn scrape_first(&self, urls: &[String], result: &mut RetrievalResult) {
        let Some(page_scrape) = self.tools.page_scrape() else {
            debug!("Page scrape unavailable");
            return;
        };

        for url in urls.iter().take(self.policy.max_scrapes) {
            match page_scrape.scrape(url).await {
                ScrapeOutcome::Content(content) => {
                    info!("Scraped {} for deeper content", url);
                    result.trace.record(ToolKind::PageScrape, url, 1, None);
                    result
                        .evidence
                        .push(Evidence::new(SourceKind::PageScrape, content, url.clone()));
                    return;
                }
                ScrapeOutcome::InvalidInput(message) | ScrapeOutcome::Failed(message) => {
                    warn!("Scrape of {} produced no evidence: {}", url, message);
                    result.trace.record(ToolKind::PageScrape, url, 0, Some(message));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(title: &str, snippet: &str) -> WebResult {
        WebResult {
            title: title.to_string(),
            snippet: snippet.to_string(),
            url: "https://example.com".to_string(),
        }
    }

    #[test]
    fn test_query_term_coverage() {
        let results = vec![result("Paris", "Paris is the capital and largest city of France.")];
        assert_eq!(query_term_coverage("What is the capital of France?", &results), 1.0);
        assert_eq!(query_term_coverage("capital of Peru", &results), 0.5);
        assert_eq!(query_term_coverage("is it?", &results), 1.0);
    }

    #[test]
    fn test_short_snippets_are_insufficient() {
        let policy = RetrievalPolicy::default();
        let results = vec![result("Paris", "Capital of France.")];
        assert!(policy.snippets_insufficient("capital of France", &results));
    }

    #[test]
    fn test_long_covering_snippets_are_sufficient() {
        let policy = RetrievalPolicy {
            min_snippet_chars: 40,
            ..RetrievalPolicy::default()
        };
        let results = vec![result(
            "Paris - Wikipedia",
            "Paris is the capital and largest city of France, on the Seine.",
        )];
        assert!(!policy.snippets_insufficient("capital of France", &results));
        assert!(policy.snippets_insufficient("population of Lyon", &results));
    }

    #[test]
    fn test_trigger_overrides_heuristic() {
        let results = vec![result("t", "short")];
        let never = RetrievalPolicy {
            scrape_trigger: ScrapeTrigger::Never,
            ..RetrievalPolicy::default()
        };
        let always = RetrievalPolicy {
            scrape_trigger: ScrapeTrigger::Always,
            min_snippet_chars: 0,
            ..RetrievalPolicy::default()
        };
        assert!(!never.should_scrape("anything", &results));
        assert!(always.should_scrape("short", &results));
    }
}
