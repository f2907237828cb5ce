//! Evidence, answers and conversation turns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::tool::ToolKind;

/// Answer given when no evidence answers the question.
pub const SENTINEL: &str = "I'm sorry, I couldn't find the information you're looking for.";

/// Where a piece of evidence came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Document,
    WebSearch,
    PageScrape,
}

impl SourceKind {
    /// Label used in the evidence block handed to the model.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Document => "Document",
            Self::WebSearch => "Web",
            Self::PageScrape => "Page",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Document => "document",
            Self::WebSearch => "web-search",
            Self::PageScrape => "page-scrape",
        })
    }
}

/// One retrieved piece of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub source: SourceKind,
    pub text: String,
    /// `manual.pdf#3` for passages, the URL for web results and pages
    pub origin: String,
}

impl Evidence {
    pub fn new(source: SourceKind, text: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            source,
            text: text.into(),
            origin: origin.into(),
        }
    }
}

/// One tool invocation made while retrieving.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: ToolKind,
    /// Query, keywords or URL the tool was called with
    pub input: String,
    /// Evidence items the call contributed
    pub evidence: usize,
    /// Diagnostic when the call failed or was rejected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

/// Tools called for one query, in call order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalTrace {
    pub calls: Vec<ToolCall>,
}

impl RetrievalTrace {
    pub(crate) fn record(&mut self, tool: ToolKind, input: &str, evidence: usize, diagnostic: Option<String>) {
        self.calls.push(ToolCall {
            tool,
            input: input.to_string(),
            evidence,
            diagnostic,
        });
    }

    pub fn count(&self, tool: ToolKind) -> usize {
        self.calls.iter().filter(|c| c.tool == tool).count()
    }

    pub fn tools(&self) -> Vec<ToolKind> {
        self.calls.iter().map(|c| c.tool).collect()
    }
}

/// Evidence gathered for one query, best source first. May be empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub evidence: Vec<Evidence>,
    pub trace: RetrievalTrace,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.evidence.is_empty()
    }

    pub fn len(&self) -> usize {
        self.evidence.len()
    }

    pub fn has_source(&self, source: SourceKind) -> bool {
        self.evidence.iter().any(|e| e.source == source)
    }

    /// Whether every piece of evidence is a web search snippet.
    pub fn only_web_snippets(&self) -> bool {
        !self.is_empty() && self.evidence.iter().all(|e| e.source == SourceKind::WebSearch)
    }
}

/// Whether the answer was synthesized from evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Synthesized,
    NotFound,
}

/// Reference to evidence an answer was built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub kind: SourceKind,
    pub origin: String,
    pub excerpt: String,
}

const EXCERPT_CHARS: usize = 160;

impl From<&Evidence> for SourceRef {
    fn from(evidence: &Evidence) -> Self {
        let flat = evidence.text.split_whitespace().collect::<Vec<_>>().join(" ");
        let excerpt = match flat.char_indices().nth(EXCERPT_CHARS) {
            Some((idx, _)) => format!("{}...", &flat[..idx]),
            None => flat,
        };
        Self {
            kind: evidence.source,
            origin: evidence.origin.clone(),
            excerpt,
        }
    }
}

/// The one answer given per query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub outcome: Outcome,
    pub sources: Vec<SourceRef>,
    /// Tools called to gather the evidence, in order
    #[serde(default)]
    pub tools_used: Vec<ToolKind>,
}

impl Answer {
    pub fn not_found() -> Self {
        Self {
            text: SENTINEL.to_string(),
            outcome: Outcome::NotFound,
            sources: Vec::new(),
            tools_used: Vec::new(),
        }
    }

    /// Classify a model reply against the evidence it was given.
    ///
    /// A blank reply, or one that is the sentinel in any quoting, means not
    /// found and carries the exact sentinel text.
    pub(crate) fn from_reply(text: String, result: &RetrievalResult) -> Self {
        if text.trim().is_empty() || is_sentinel(&text) {
            return Self::not_found();
        }

        Self {
            text,
            outcome: Outcome::Synthesized,
            sources: result.evidence.iter().map(SourceRef::from).collect(),
            tools_used: Vec::new(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.outcome == Outcome::NotFound
    }

    pub(crate) fn with_tools(mut self, trace: &RetrievalTrace) -> Self {
        self.tools_used = trace.tools();
        self
    }
}

/// Models sometimes quote the sentinel or drop its final period.
pub(crate) fn is_sentinel(text: &str) -> bool {
    let trimmed = text.trim().trim_matches('"');
    trimmed == SENTINEL || trimmed == SENTINEL.trim_end_matches('.')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One entry of the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            at: Utc::now(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            at: Utc::now(),
        }
    }
}

/// Identity of one built pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipelineId(Uuid);

impl PipelineId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PipelineId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PipelineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
