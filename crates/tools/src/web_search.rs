//! Web search through the Serper API.

use askdoc_core::config::{require_env_credential, WebSearchSettings};
use askdoc_core::AppResult;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::retry::{RetryPolicy, ToolCallError};

/// One organic search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebResult {
    pub title: String,
    pub snippet: String,
    pub url: String,
}

/// Results of a search, possibly empty.
///
/// `diagnostic` explains an empty result caused by a provider failure; it is
/// meant for logs, not for the answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebSearchOutcome {
    pub results: Vec<WebResult>,
    pub diagnostic: Option<String>,
}

impl WebSearchOutcome {
    fn failed(diagnostic: String) -> Self {
        Self {
            results: Vec::new(),
            diagnostic: Some(diagnostic),
        }
    }
}

#[derive(Debug, Serialize)]
struct SerperRequest<'a> {
    q: &'a str,
    num: u32,
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperOrganic>,
}

#[derive(Debug, Deserialize)]
struct SerperOrganic {
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    link: String,
}

/// Serper web search client.
pub struct WebSearchTool {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    result_count: u32,
    retry: RetryPolicy,
}

impl std::fmt::Debug for WebSearchTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSearchTool")
            .field("endpoint", &self.endpoint)
            .field("result_count", &self.result_count)
            .finish_non_exhaustive()
    }
}

impl WebSearchTool {
    /// Construct from settings, reading the API key from the configured
    /// environment variable. A missing key is a configuration error.
    pub fn new(settings: &WebSearchSettings) -> AppResult<Self> {
        let api_key = require_env_credential(&settings.api_key_env, "Web search")?;
        Self::with_api_key(settings, api_key)
    }

    pub fn with_api_key(settings: &WebSearchSettings, api_key: impl Into<String>) -> AppResult<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(askdoc_core::AppError::Config(
                "Web search API key is empty".to_string(),
            ));
        }

        Ok(Self {
            client: crate::build_client()?,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            api_key,
            result_count: settings.result_count.max(1),
            retry: RetryPolicy::new(settings.timeout_secs, settings.max_retries),
        })
    }

    /// Search the web for `keywords`. Never fails: provider errors yield an
    /// empty outcome with a diagnostic.
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    pub async fn search(&self, keywords: &str) -> WebSearchOutcome {
        let keywords = keywords.trim();
        if keywords.is_empty() {
            return WebSearchOutcome::failed("empty search keywords".to_string());
        }

        match self.retry.run("web_search", || self.request(keywords)).await {
            Ok(results) => {
                info!("Web search returned {} results", results.len());
                WebSearchOutcome {
                    results,
                    diagnostic: None,
                }
            }
            Err(e) => {
                warn!("Web search failed: {}", e);
                WebSearchOutcome::failed(format!("web search failed: {}", e))
            }
        }
    }

    async fn request(&self, keywords: &str) -> Result<Vec<WebResult>, ToolCallError> {
        let response = self
            .client
            .post(format!("{}/search", self.endpoint))
            .header("X-API-KEY", &self.api_key)
            .json(&SerperRequest {
                q: keywords,
                num: self.result_count,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolCallError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: SerperResponse = response
            .json()
            .await
            .map_err(|e| ToolCallError::Decode(e.to_string()))?;

        Ok(body
            .organic
            .into_iter()
            .filter(|r| !r.link.is_empty())
            .take(self.result_count as usize)
            .map(|r| WebResult {
                title: r.title,
                snippet: r.snippet,
                url: r.link,
            })
            .collect())
    }
}
