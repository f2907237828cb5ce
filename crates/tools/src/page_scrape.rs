//! Page scraping through the Firecrawl API.

use askdoc_core::config::{require_env_credential, PageScrapeSettings};
use askdoc_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use url::Url;

use crate::retry::{RetryPolicy, ToolCallError};

/// Returned, without any network call, for input that is not an
/// absolute http(s) URL.
pub const INVALID_URL_MESSAGE: &str =
    "Page scrape requires a valid URL starting with http:// or https://. No content scraped.";

/// Result of a scrape. Never an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScrapeOutcome {
    /// Main content of the page as markdown
    Content(String),
    /// Input rejected before any request was made
    InvalidInput(String),
    /// Provider or network failure
    Failed(String),
}

impl ScrapeOutcome {
    pub fn content(&self) -> Option<&str> {
        match self {
            Self::Content(text) => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScrapeRequest<'a> {
    url: &'a str,
    formats: [&'static str; 1],
    only_main_content: bool,
}

#[derive(Debug, Deserialize)]
struct ScrapeResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<ScrapeData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScrapeData {
    #[serde(default)]
    markdown: Option<String>,
}

/// Accept only absolute http(s) URLs with a host.
pub fn validate_url(input: &str) -> Option<Url> {
    let input = input.trim();
    if !(input.starts_with("http://") || input.starts_with("https://")) {
        return None;
    }

    Url::parse(input)
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https") && url.host_str().is_some())
}

/// Firecrawl scrape client.
pub struct PageScrapeTool {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    max_chars: usize,
    retry: RetryPolicy,
}

impl std::fmt::Debug for PageScrapeTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageScrapeTool")
            .field("endpoint", &self.endpoint)
            .field("max_chars", &self.max_chars)
            .finish_non_exhaustive()
    }
}

impl PageScrapeTool {
    /// Construct from settings, reading the API key from the configured
    /// environment variable. A missing key is a configuration error.
    pub fn new(settings: &PageScrapeSettings) -> AppResult<Self> {
        let api_key = require_env_credential(&settings.api_key_env, "Page scrape")?;
        Self::with_api_key(settings, api_key)
    }

    pub fn with_api_key(settings: &PageScrapeSettings, api_key: impl Into<String>) -> AppResult<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(AppError::Config("Page scrape API key is empty".to_string()));
        }

        Ok(Self {
            client: crate::build_client()?,
            endpoint: settings.endpoint.trim_end_matches('/').to_string(),
            api_key,
            max_chars: settings.max_chars.max(1),
            retry: RetryPolicy::new(settings.timeout_secs, settings.max_retries),
        })
    }

    /// Scrape the main content of `url`.
    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    pub async fn scrape(&self, url: &str) -> ScrapeOutcome {
        let Some(url) = validate_url(url) else {
            info!("Rejected scrape input that is not an http(s) URL");
            return ScrapeOutcome::InvalidInput(INVALID_URL_MESSAGE.to_string());
        };

        match self.retry.run("page_scrape", || self.request(url.as_str())).await {
            Ok(markdown) if markdown.trim().is_empty() => {
                warn!("Scrape of {} returned no content", url);
                ScrapeOutcome::Failed(format!("no content scraped from {}", url))
            }
            Ok(markdown) => {
                let content = truncate_chars(&markdown, self.max_chars);
                info!("Scraped {} chars from {}", content.len(), url);
                ScrapeOutcome::Content(content)
            }
            Err(e) => {
                warn!("Scrape of {} failed: {}", url, e);
                ScrapeOutcome::Failed(format!("page scrape failed: {}", e))
            }
        }
    }

    async fn request(&self, url: &str) -> Result<String, ToolCallError> {
        let response = self
            .client
            .post(format!("{}/v1/scrape", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(&ScrapeRequest {
                url,
                formats: ["markdown"],
                only_main_content: true,
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

        let body: ScrapeResponse = response
            .json()
            .await
            .map_err(|e| ToolCallError::Decode(e.to_string()))?;

        if !body.success {
            return Err(ToolCallError::Decode(
                body.error
                    .unwrap_or_else(|| "provider reported failure".to_string()),
            ));
        }

        Ok(body.data.and_then(|d| d.markdown).unwrap_or_default())
    }
}

/// Truncate to at most `max_chars` characters, on a char boundary.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}
