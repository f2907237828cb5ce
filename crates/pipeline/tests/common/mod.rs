//! Fakes with call counters, shared by the pipeline integration tests.
#![allow(dead_code)]

use askdoc_core::{AppConfig, AppError, AppResult};
use askdoc_knowledge::{EmbeddingProvider, Passage, TrigramProvider};
use askdoc_llm::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage};
use askdoc_pipeline::{
    DocumentSearch, PageScrape, PromptSet, SessionConfig, SessionManager, SessionServices,
    WebSearch, SENTINEL,
};
use askdoc_tools::{ScrapeOutcome, WebResult, WebSearchOutcome};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type ReplyFn = dyn Fn(&LlmRequest) -> Option<String> + Send + Sync;

/// Language model whose reply is computed from the request.
pub struct FakeLlm {
    reply: Box<ReplyFn>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl FakeLlm {
    pub fn new(reply: impl Fn(&LlmRequest) -> Option<String> + Send + Sync + 'static) -> Self {
        Self {
            reply: Box::new(reply),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Answers with the text of the first evidence item, or the sentinel
    /// when the prompt holds none.
    pub fn quoting_evidence() -> Self {
        Self::new(|request| Some(first_evidence(&request.prompt).unwrap_or_else(|| SENTINEL.to_string())))
    }

    pub fn failing() -> Self {
        Self::new(|_| None)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most calls that were running at the same time.
    pub fn max_concurrent(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    async fn reply(&self, request: &LlmRequest) -> AppResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.prompt.clone());
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        (self.reply)(request).ok_or_else(|| AppError::Llm("model unavailable".to_string()))
    }
}

#[async_trait]
impl LlmClient for FakeLlm {
    fn provider_name(&self) -> &str {
        "fake"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        Ok(LlmResponse {
            content: self.reply(request).await?,
            model: request.model.clone(),
            usage: LlmUsage::default(),
        })
    }

    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        let reply = self.reply(request).await?;
        let mut chunks: Vec<AppResult<LlmStreamChunk>> = reply
            .split_inclusive(' ')
            .map(|word| Ok(LlmStreamChunk::delta(word)))
            .collect();
        chunks.push(Ok(LlmStreamChunk::finished(None)));
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}

/// Text of the first evidence item in a rendered answer prompt.
pub fn first_evidence(prompt: &str) -> Option<String> {
    let mut lines = prompt.lines().skip_while(|line| !is_evidence_header(line));
    lines.next()?;
    let text: Vec<&str> = lines
        .take_while(|line| line.trim() != "---" && line.trim() != "Answer:")
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(text.join(" "))
    }
}

fn is_evidence_header(line: &str) -> bool {
    ["[Document ", "[Web ", "[Page "]
        .iter()
        .any(|label| line.starts_with(label))
}

/// Document search returning fixed passages.
pub struct FakeDocument {
    passages: AppResult<Vec<Passage>>,
    calls: AtomicUsize,
}

impl FakeDocument {
    pub fn with_passages(texts: &[&str]) -> Self {
        let passages = texts
            .iter()
            .enumerate()
            .map(|(i, text)| Passage {
                text: text.to_string(),
                score: 0.9 - i as f32 * 0.1,
                position: i as u32,
                document: "manual.pdf".to_string(),
            })
            .collect();
        Self {
            passages: Ok(passages),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            passages: Err(AppError::Indexing("index corrupted".to_string())),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentSearch for FakeDocument {
    async fn search_passages(&self, _query: &str) -> AppResult<Vec<Passage>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.passages {
            Ok(passages) => Ok(passages.clone()),
            Err(e) => Err(AppError::Indexing(e.to_string())),
        }
    }
}

/// Web search returning fixed results and recording its keywords.
pub struct FakeWeb {
    results: Vec<WebResult>,
    keywords: Mutex<Vec<String>>,
}

impl FakeWeb {
    pub fn new(results: Vec<WebResult>) -> Self {
        Self {
            results,
            keywords: Mutex::new(Vec::new()),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn calls(&self) -> usize {
        self.keywords.lock().unwrap().len()
    }

    pub fn keywords(&self) -> Vec<String> {
        self.keywords.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebSearch for FakeWeb {
    async fn search(&self, keywords: &str) -> WebSearchOutcome {
        self.keywords.lock().unwrap().push(keywords.to_string());
        WebSearchOutcome {
            results: self.results.clone(),
            diagnostic: None,
        }
    }
}

/// Page scrape answering per URL and recording what it was asked for.
pub struct FakeScrape {
    pages: Vec<(String, ScrapeOutcome)>,
    urls: Mutex<Vec<String>>,
}

impl FakeScrape {
    pub fn new(pages: Vec<(&str, ScrapeOutcome)>) -> Self {
        Self {
            pages: pages
                .into_iter()
                .map(|(url, outcome)| (url.to_string(), outcome))
                .collect(),
            urls: Mutex::new(Vec::new()),
        }
    }

    pub fn unused() -> Self {
        Self::new(Vec::new())
    }

    pub fn calls(&self) -> usize {
        self.urls.lock().unwrap().len()
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageScrape for FakeScrape {
    async fn scrape(&self, url: &str) -> ScrapeOutcome {
        self.urls.lock().unwrap().push(url.to_string());
        self.pages
            .iter()
            .find(|(page, _)| page == url)
            .map(|(_, outcome)| outcome.clone())
            .unwrap_or_else(|| ScrapeOutcome::Failed(format!("no page at {}", url)))
    }
}

/// Trigram embeddings that take their time on texts mentioning "slow".
#[derive(Debug)]
pub struct SlowEmbeddings {
    inner: TrigramProvider,
    delay: Duration,
}

impl SlowEmbeddings {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: TrigramProvider::new(384),
            delay,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for SlowEmbeddings {
    fn provider_name(&self) -> &str {
        "slow-trigram"
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        if texts.iter().any(|t| t.contains("slow")) {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.embed_batch(texts).await
    }
}

pub fn web_result(title: &str, snippet: &str, url: &str) -> WebResult {
    WebResult {
        title: title.to_string(),
        snippet: snippet.to_string(),
        url: url.to_string(),
    }
}

/// Three results about Paris, long enough to need no scrape.
pub fn paris_results() -> Vec<WebResult> {
    vec![
        web_result(
            "Paris - Wikipedia",
            "Paris is the capital and largest city of France. With an estimated population of \
             two million residents, it is the centre of the Ile-de-France region.",
            "https://en.wikipedia.org/wiki/Paris",
        ),
        web_result(
            "Capital of France",
            "The capital of France is Paris, which has been the seat of government for most \
             of the country's history.",
            "https://example.org/france/capital",
        ),
        web_result(
            "Paris travel guide",
            "Plan a trip to the French capital with our guide to museums and neighbourhoods.",
            "https://travel.example.com/paris",
        ),
    ]
}

/// Services around the given fakes, with offline embeddings and built-in prompts.
pub fn services(
    llm: Arc<FakeLlm>,
    web_search: Option<Arc<dyn WebSearch>>,
    page_scrape: Option<Arc<dyn PageScrape>>,
) -> SessionServices {
    SessionServices {
        llm,
        web_search,
        page_scrape,
        embeddings: Arc::new(TrigramProvider::new(384)),
        prompts: PromptSet::builtin().unwrap(),
        tool_errors: Vec::new(),
    }
}

pub fn session_config() -> SessionConfig {
    let mut config = SessionConfig::from_app_config(&AppConfig::default());
    config.index.chunk_size = 120;
    config.index.chunk_overlap = 0;
    config
}

pub fn session(services: SessionServices) -> SessionManager {
    SessionManager::new(session_config(), services)
}

pub const MANUAL: &str = "\
The warranty covers parts and labor for two years from the date of purchase.

Mount the bracket with a Phillips screwdriver before attaching the panel.

Clean the filter monthly with warm water and mild soap.";

/// Single-page PDF with one line of Helvetica text.
pub fn minimal_pdf(phrase: &str) -> Vec<u8> {
    let content = format!("BT /F1 12 Tf 72 700 Td ({}) Tj ET", phrase);

    let mut out = Vec::new();
    let mut offsets = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");

    offsets.push(out.len());
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    offsets.push(out.len());
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    offsets.push(out.len());
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    offsets.push(out.len());
    out.extend_from_slice(
        format!(
            "4 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
            content.len(),
            content
        )
        .as_bytes(),
    );
    offsets.push(out.len());
    out.extend_from_slice(b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n");

    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}
