//! Per-session state: the bound document, its pipeline and the conversation.
//!
//! ```text
//! Empty --upload--> DocumentLoading --indexed--> Ready
//!   ^                  |   ^                        |
//!   |   failed/reset   |   +--different upload------+
//!   +------------------+
//! reset: any phase --> Empty
//! ```
//!
//! Every upload and every reset starts a new epoch. Work started in an older
//! epoch is cancelled, and its result is discarded if it finishes anyway.

use askdoc_core::config::EmbeddingSettings;
use askdoc_core::{AppConfig, AppError, AppResult};
use askdoc_knowledge::{
    create_provider, Document, DocumentIdentity, DocumentIndex, DocumentUpload, EmbeddingProvider,
    IndexConfig, IndexStats, ProgressReporter,
};
use askdoc_llm::{create_client, LlmClient};
use askdoc_tools::{PageScrapeTool, WebSearchTool};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::pipeline::Pipeline;
use crate::retrieval::{RetrievalPolicy, RetrievalStage};
use crate::synthesis::{GenerationParams, PromptSet, SynthesisStage};
use crate::tool::{PageScrape, ToolKind, ToolRegistry, WebSearch};
use crate::types::{Answer, ConversationTurn, PipelineId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// No document bound
    Empty,
    /// A document is being indexed; queries are refused
    DocumentLoading,
    /// A document is indexed and queries run against it
    Ready,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Empty => "empty",
            Self::DocumentLoading => "indexing",
            Self::Ready => "ready",
        })
    }
}

/// Result of an upload.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    /// The document was indexed and is now bound
    Indexed(IndexStats),
    /// The same document is already bound; nothing was rebuilt
    Unchanged,
    /// A newer upload or a reset won; this upload's work was discarded
    Superseded,
}

/// Session parameters, resolved once from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub workspace: PathBuf,
    pub index: IndexConfig,
    pub embedding: EmbeddingSettings,
    pub retrieval: RetrievalPolicy,
    pub escalate_on_not_found: bool,
    pub generation: GenerationParams,
}

impl SessionConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            workspace: config.workspace.clone(),
            index: IndexConfig::from_settings(&config.index, &config.retrieval),
            embedding: config.index.embedding.clone(),
            retrieval: RetrievalPolicy::from_settings(&config.retrieval),
            escalate_on_not_found: config.retrieval.escalate_on_not_found,
            generation: GenerationParams::new(&config.model, &config.generation),
        }
    }
}

/// An enabled tool left out of the session because it could not be set up,
/// typically for a missing credential.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSetupError {
    pub tool: ToolKind,
    pub message: String,
}

impl fmt::Display for ToolSetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.tool, self.message)
    }
}

/// External services a session calls, constructed once at startup.
#[derive(Clone)]
pub struct SessionServices {
    pub llm: Arc<dyn LlmClient>,
    pub web_search: Option<Arc<dyn WebSearch>>,
    pub page_scrape: Option<Arc<dyn PageScrape>>,
    pub embeddings: Arc<dyn EmbeddingProvider>,
    pub prompts: PromptSet,
    /// Enabled tools that failed to construct and are unavailable
    pub tool_errors: Vec<ToolSetupError>,
}

impl SessionServices {
    /// Construct every enabled service from configuration.
    ///
    /// Credentials are read here and only here. A configuration error of an
    /// enabled tool disables that tool alone and is kept in `tool_errors`;
    /// document search never depends on tool credentials.
    pub async fn from_config(config: &AppConfig) -> AppResult<Self> {
        let api_key = config.resolve_api_key(&config.provider);
        let llm = create_client(&config.provider, config.provider_endpoint(), api_key.as_deref())
            .map_err(AppError::Config)?;

        let mut tool_errors = Vec::new();

        let web_search: Option<Arc<dyn WebSearch>> = if config.tools.web_search.enabled {
            optional_tool(
                ToolKind::WebSearch,
                WebSearchTool::new(&config.tools.web_search),
                &mut tool_errors,
            )?
            .map(|tool| Arc::new(tool) as Arc<dyn WebSearch>)
        } else {
            info!("Web search disabled");
            None
        };

        let page_scrape: Option<Arc<dyn PageScrape>> = if config.tools.page_scrape.enabled {
            optional_tool(
                ToolKind::PageScrape,
                PageScrapeTool::new(&config.tools.page_scrape),
                &mut tool_errors,
            )?
            .map(|tool| Arc::new(tool) as Arc<dyn PageScrape>)
        } else {
            info!("Page scrape disabled");
            None
        };

        let embeddings = create_provider(&config.index.embedding).await?;
        let prompts = PromptSet::load(&config.workspace)?;

        Ok(Self {
            llm,
            web_search,
            page_scrape,
            embeddings,
            prompts,
            tool_errors,
        })
    }
}

/// Keep a constructed tool, or record its configuration error and go on
/// without it. Other errors still fail the session.
fn optional_tool<T>(
    kind: ToolKind,
    built: AppResult<T>,
    errors: &mut Vec<ToolSetupError>,
) -> AppResult<Option<T>> {
    match built {
        Ok(tool) => Ok(Some(tool)),
        Err(AppError::Config(message)) => {
            warn!("{} unavailable: {}", kind, message);
            errors.push(ToolSetupError {
                tool: kind,
                message,
            });
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

impl fmt::Debug for SessionServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionServices")
            .field("llm", &self.llm.provider_name())
            .field("web_search", &self.web_search.is_some())
            .field("page_scrape", &self.page_scrape.is_some())
            .field("embeddings", &self.embeddings)
            .field("tool_errors", &self.tool_errors)
            .finish_non_exhaustive()
    }
}

/// A document together with its index. Dropping it removes the upload.
#[derive(Debug)]
struct BoundDocument {
    // Kept alive for the temporary directory holding the upload
    _document: Document,
    index: Arc<DocumentIndex>,
}

#[derive(Debug)]
struct SessionState {
    phase: SessionPhase,
    epoch: u64,
    cancel: CancellationToken,
    loading: Option<DocumentIdentity>,
    document: Option<BoundDocument>,
    pipeline: Option<Arc<Pipeline>>,
    history: Vec<ConversationTurn>,
}

impl SessionState {
    fn new() -> Self {
        Self {
            phase: SessionPhase::Empty,
            epoch: 0,
            cancel: CancellationToken::new(),
            loading: None,
            document: None,
            pipeline: None,
            history: Vec::new(),
        }
    }

    /// Cancel the current epoch's work and start a new epoch.
    fn next_epoch(&mut self) -> (u64, CancellationToken) {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.epoch += 1;
        (self.epoch, self.cancel.clone())
    }
}

/// Owns one user's document, pipeline and conversation.
///
/// Queries are serialized: a second `ask` waits for the first to finish.
/// `reset` never waits; it cancels whatever is running.
pub struct SessionManager {
    config: SessionConfig,
    services: SessionServices,
    state: Mutex<SessionState>,
    query_gate: tokio::sync::Mutex<()>,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("phase", &self.phase())
            .field("services", &self.services)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    pub fn new(config: SessionConfig, services: SessionServices) -> Self {
        Self {
            config,
            services,
            state: Mutex::new(SessionState::new()),
            query_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Build a session and its services from application configuration.
    pub async fn from_app_config(config: &AppConfig) -> AppResult<Self> {
        let services = SessionServices::from_config(config).await?;
        Ok(Self::new(SessionConfig::from_app_config(config), services))
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        // State stays consistent across a panicking holder: every critical
        // section only assigns fields.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Enabled tools that could not be set up and are left out.
    pub fn tool_errors(&self) -> &[ToolSetupError] {
        &self.services.tool_errors
    }

    pub fn phase(&self) -> SessionPhase {
        self.state().phase
    }

    pub fn history(&self) -> Vec<ConversationTurn> {
        self.state().history.clone()
    }

    /// Identity of the bound document, if any.
    pub fn document_identity(&self) -> Option<DocumentIdentity> {
        self.state()
            .document
            .as_ref()
            .map(|d| d.index.identity().clone())
    }

    pub fn document_stats(&self) -> Option<IndexStats> {
        self.state()
            .document
            .as_ref()
            .map(|d| d.index.stats().clone())
    }

    /// Identity of the current pipeline, if one has been built.
    pub fn pipeline_id(&self) -> Option<PipelineId> {
        self.state().pipeline.as_ref().map(|p| p.id())
    }

    pub async fn upload(&self, upload: DocumentUpload) -> AppResult<UploadOutcome> {
        self.upload_with_progress(upload, &ProgressReporter::noop()).await
    }

    /// Bind a new document, indexing it first.
    ///
    /// Uploading the bound document again is a no-op. Any other upload
    /// replaces the bound document and supersedes an upload still indexing.
    /// On failure the session is left `Empty`.
    pub async fn upload_with_progress(
        &self,
        upload: DocumentUpload,
        progress: &ProgressReporter,
    ) -> AppResult<UploadOutcome> {
        let identity = upload.identity();

        let (epoch, cancel) = {
            let mut state = self.state();

            let bound = state.document.as_ref().map(|d| d.index.identity());
            if state.phase == SessionPhase::Ready && bound == Some(&identity) {
                info!("{} is already indexed, reusing pipeline", identity);
                return Ok(UploadOutcome::Unchanged);
            }

            if let Some(ref previous) = state.loading {
                info!("Upload of {} supersedes {}", identity, previous);
            }

            let next = state.next_epoch();
            state.phase = SessionPhase::DocumentLoading;
            state.loading = Some(identity.clone());
            state.document = None;
            state.pipeline = None;
            next
        };

        let config = self.config.index.clone();
        let embeddings = self.services.embeddings.clone();
        let build = async move {
            let document = Document::materialize(upload)?;
            let index = DocumentIndex::build_with_progress(&document, &config, embeddings, progress)
                .await?;
            Ok::<_, AppError>((document, index))
        };

        let built = tokio::select! {
            _ = cancel.cancelled() => {
                info!("Indexing of {} cancelled", identity);
                return Ok(UploadOutcome::Superseded);
            }
            built = build => built,
        };

        let mut state = self.state();
        if state.epoch != epoch {
            debug!("Discarding index of {} from an old epoch", identity);
            return Ok(UploadOutcome::Superseded);
        }
        state.loading = None;

        match built {
            Ok((document, index)) => {
                let stats = index.stats().clone();
                state.document = Some(BoundDocument {
                    _document: document,
                    index: Arc::new(index),
                });
                state.phase = SessionPhase::Ready;
                info!("Session ready with {}", identity);
                Ok(UploadOutcome::Indexed(stats))
            }
            Err(e) => {
                state.phase = SessionPhase::Empty;
                warn!("Indexing of {} failed: {}", identity, e);
                Err(match e {
                    AppError::Indexing(message) => AppError::Indexing(message),
                    other => AppError::Indexing(format!("{}: {}", identity.name, other)),
                })
            }
        }
    }

    /// Answer `query` in one piece.
    pub async fn ask(&self, query: &str) -> AppResult<Answer> {
        self.run_query(query, |pipeline, query| async move { pipeline.answer(&query).await })
            .await
    }

    /// Answer `query`, sending text to `tx` as it is produced.
    pub async fn ask_streaming(&self, query: &str, tx: mpsc::Sender<String>) -> AppResult<Answer> {
        self.run_query(query, |pipeline, query| async move {
            pipeline.answer_streaming(&query, tx).await
        })
        .await
    }

    async fn run_query<F, Fut>(&self, query: &str, answer: F) -> AppResult<Answer>
    where
        F: FnOnce(Arc<Pipeline>, String) -> Fut,
        Fut: Future<Output = Answer>,
    {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::InvalidInput("Query must not be empty".to_string()));
        }

        let _gate = self.query_gate.lock().await;

        let (pipeline, epoch, cancel) = {
            let mut state = self.state();
            if state.phase == SessionPhase::DocumentLoading {
                let name = state
                    .loading
                    .as_ref()
                    .map(|d| d.name.clone())
                    .unwrap_or_default();
                return Err(AppError::StillIndexing(name));
            }

            let pipeline = match state.pipeline {
                Some(ref pipeline) => pipeline.clone(),
                None => {
                    let index = state.document.as_ref().map(|d| d.index.clone());
                    let pipeline = Arc::new(self.build_pipeline(index));
                    state.pipeline = Some(pipeline.clone());
                    pipeline
                }
            };
            (pipeline, state.epoch, state.cancel.clone())
        };

        let answer = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(AppError::Cancelled("session was reset".to_string()));
            }
            answer = answer(pipeline, query.to_string()) => answer,
        };

        let mut state = self.state();
        if state.epoch != epoch {
            return Err(AppError::Cancelled("session was reset".to_string()));
        }
        state.history.push(ConversationTurn::user(query));
        state.history.push(ConversationTurn::assistant(answer.text.clone()));

        Ok(answer)
    }

    fn build_pipeline(&self, index: Option<Arc<DocumentIndex>>) -> Pipeline {
        let document = index.as_ref().map(|i| i.identity().clone());

        let mut tools = ToolRegistry::new();
        if let Some(index) = index {
            tools = tools.with_document(index);
        }
        if let Some(ref web_search) = self.services.web_search {
            tools = tools.with_web_search(web_search.clone());
        }
        if let Some(ref page_scrape) = self.services.page_scrape {
            tools = tools.with_page_scrape(page_scrape.clone());
        }

        Pipeline::new(
            document,
            RetrievalStage::new(tools, self.config.retrieval.clone()),
            SynthesisStage::new(
                self.services.llm.clone(),
                self.config.generation.clone(),
                self.services.prompts.clone(),
            ),
            self.config.escalate_on_not_found,
        )
    }

    /// Return to `Empty`: cancel running work, forget the conversation and
    /// drop the document and pipeline. Always succeeds.
    pub fn reset(&self) {
        let mut state = self.state();
        state.next_epoch();
        state.phase = SessionPhase::Empty;
        state.loading = None;
        state.document = None;
        state.pipeline = None;
        state.history.clear();
        info!("Session reset");
    }
}
