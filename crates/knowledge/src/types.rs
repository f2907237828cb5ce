//! Document index types.

use askdoc_core::config::{IndexSettings, RetrievalSettings};
use serde::{Deserialize, Serialize};

/// Chunking and search parameters of a `DocumentIndex`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Maximum passages returned per search
    pub top_k: usize,
    /// Passages scoring below this cosine similarity are dropped
    pub min_relevance: f32,
}

impl IndexConfig {
    pub fn from_settings(index: &IndexSettings, retrieval: &RetrievalSettings) -> Self {
        Self {
            chunk_size: index.chunk_size,
            chunk_overlap: index.chunk_overlap,
            top_k: retrieval.top_k,
            min_relevance: retrieval.min_relevance,
        }
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self::from_settings(&IndexSettings::default(), &RetrievalSettings::default())
    }
}

/// A chunk of the document that matched a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    pub text: String,

    /// Cosine similarity to the query
    pub score: f32,

    /// Chunk position within the document
    pub position: u32,

    /// Name of the document the passage came from
    pub document: String,
}

impl Passage {
    /// Human-readable origin, e.g. `manual.pdf#3`.
    pub fn origin(&self) -> String {
        format!("{}#{}", self.document, self.position)
    }
}

/// Size and model information for a built index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub document: String,
    pub chunk_count: usize,
    /// Size of the uploaded file
    pub size_bytes: u64,
    /// Length of the extracted text
    pub text_bytes: usize,
    pub embedding_provider: String,
    pub embedding_model: String,
    pub dimensions: usize,
    pub build_secs: f64,
}
