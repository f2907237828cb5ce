//! Retrieve-then-synthesize question answering over one document and the web.
//!
//! - [`RetrievalStage`]: routes a query to the document, web search or page scrape
//! - [`SynthesisStage`]: turns the evidence into one answer, or the sentinel
//! - [`Pipeline`]: both stages bound to the current document
//! - [`SessionManager`]: document lifecycle, lazy pipeline, conversation history

pub mod pipeline;
pub mod retrieval;
pub mod session;
pub mod synthesis;
pub mod tool;
pub mod types;

pub use pipeline::Pipeline;
pub use retrieval::{query_term_coverage, RetrievalPolicy, RetrievalStage};
pub use session::{
    SessionConfig, SessionManager, SessionPhase, SessionServices, ToolSetupError, UploadOutcome,
};
pub use synthesis::{GenerationParams, PromptSet, SynthesisStage};
pub use tool::{DocumentSearch, PageScrape, ToolKind, ToolRegistry, WebSearch};
pub use types::{
    Answer, ConversationTurn, Evidence, Outcome, PipelineId, RetrievalResult, RetrievalTrace, Role,
    SourceKind, SourceRef, ToolCall, SENTINEL,
};
