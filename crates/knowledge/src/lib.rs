//! Document indexing for askdoc.
//!
//! Turns one uploaded document into a searchable in-memory index:
//! text extraction (PDF, markdown, HTML, plain text), chunking, embedding and
//! cosine-similarity search. The index lives as long as the session keeps
//! the document; nothing is persisted.

pub mod chunker;
pub mod document;
pub mod embeddings;
pub mod index;
pub mod parser;
pub mod progress;
pub mod types;

// Re-export commonly used types
pub use document::{Document, DocumentIdentity, DocumentUpload};
pub use embeddings::providers::trigram::content_terms;
pub use embeddings::{create_provider, EmbeddingProvider, TrigramProvider};
pub use index::DocumentIndex;
pub use progress::{IndexPhase, ProgressCallback, ProgressEvent, ProgressReporter};
pub use types::{IndexConfig, IndexStats, Passage};
