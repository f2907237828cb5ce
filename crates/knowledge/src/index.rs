//! In-memory vector index over one document.

use crate::chunker::chunk_text;
use crate::document::{Document, DocumentIdentity};
use crate::embeddings::EmbeddingProvider;
use crate::parser::extract_text;
use crate::progress::ProgressReporter;
use crate::types::{IndexConfig, IndexStats, Passage};
use askdoc_core::{AppError, AppResult};
use std::sync::Arc;
use std::time::Instant;

/// Chunks embedded per provider call, so progress advances steadily.
const EMBED_BATCH_SIZE: usize = 32;

#[derive(Debug)]
struct IndexedChunk {
    position: u32,
    text: String,
    embedding: Vec<f32>,
}

/// Searchable index for a single uploaded document.
///
/// Built once per document and read-only afterwards; `search` takes `&self`
/// and may be called concurrently.
#[derive(Debug)]
pub struct DocumentIndex {
    identity: DocumentIdentity,
    config: IndexConfig,
    provider: Arc<dyn EmbeddingProvider>,
    chunks: Vec<IndexedChunk>,
    stats: IndexStats,
}

impl DocumentIndex {
    /// Extract, chunk and embed a document.
    ///
    /// Extraction runs on the blocking pool. Fails with `AppError::Indexing`
    /// when the document cannot be parsed or holds no text.
    pub async fn build(
        document: &Document,
        config: &IndexConfig,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> AppResult<Self> {
        Self::build_with_progress(document, config, provider, &ProgressReporter::noop()).await
    }

    pub async fn build_with_progress(
        document: &Document,
        config: &IndexConfig,
        provider: Arc<dyn EmbeddingProvider>,
        progress: &ProgressReporter,
    ) -> AppResult<Self> {
        let start = Instant::now();
        let name = document.name().to_string();

        tracing::info!("Indexing {}", document.identity());

        progress.extract(&name, document.size_bytes());
        let path = document.path().to_path_buf();
        let extract_name = name.clone();
        let text = tokio::task::spawn_blocking(move || {
            let bytes = std::fs::read(&path)
                .map_err(|e| AppError::Indexing(format!("Failed to read {:?}: {}", path, e)))?;
            extract_text(&extract_name, &bytes)
        })
        .await
        .map_err(|e| AppError::Indexing(format!("Text extraction of '{}' aborted: {}", name, e)))??;

        let text_chunks = chunk_text(&text, config.chunk_size, config.chunk_overlap)?;
        progress.chunk(text_chunks.len() as u64);

        let total = text_chunks.len() as u64;
        let mut chunks = Vec::with_capacity(text_chunks.len());
        for batch in text_chunks.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embeddings = provider.embed_batch(&texts).await?;

            if embeddings.len() != batch.len() {
                return Err(AppError::Indexing(format!(
                    "Embedding provider returned {} vectors for {} chunks",
                    embeddings.len(),
                    batch.len()
                )));
            }

            for (chunk, embedding) in batch.iter().zip(embeddings) {
                chunks.push(IndexedChunk {
                    position: chunk.position,
                    text: chunk.text.clone(),
                    embedding,
                });
            }
            progress.embed(chunks.len() as u64, total, provider.model_name());
        }

        let stats = IndexStats {
            document: name,
            chunk_count: chunks.len(),
            size_bytes: document.size_bytes(),
            text_bytes: text.len(),
            embedding_provider: provider.provider_name().to_string(),
            embedding_model: provider.model_name().to_string(),
            dimensions: provider.dimensions(),
            build_secs: start.elapsed().as_secs_f64(),
        };

        tracing::info!(
            "Indexed {}: {} chunks, {} text bytes in {:.2}s",
            stats.document,
            stats.chunk_count,
            stats.text_bytes,
            stats.build_secs
        );

        Ok(Self {
            identity: document.identity().clone(),
            config: config.clone(),
            provider,
            chunks,
            stats,
        })
    }

    /// Passages relevant to `query`, best first.
    ///
    /// Only passages scoring at least `min_relevance` are returned, at most
    /// `top_k` of them. An empty result means the document has nothing
    /// relevant; it is not an error.
    pub async fn search(&self, query: &str) -> AppResult<Vec<Passage>> {
        if query.trim().is_empty() || self.chunks.is_empty() {
            return Ok(Vec::new());
        }

        let query_embedding = self.provider.embed(query).await?;

        let mut scored: Vec<(&IndexedChunk, f32)> = self
            .chunks
            .iter()
            .map(|chunk| (chunk, cosine_similarity(&query_embedding, &chunk.embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.position.cmp(&b.0.position)));

        if let Some((_, top)) = scored.first() {
            tracing::debug!("Best passage score for query: {:.3}", top);
        }

        let passages: Vec<Passage> = scored
            .into_iter()
            .filter(|(_, score)| *score >= self.config.min_relevance)
            .take(self.config.top_k)
            .map(|(chunk, score)| Passage {
                text: chunk.text.clone(),
                score,
                position: chunk.position,
                document: self.identity.name.clone(),
            })
            .collect();

        if passages.is_empty() {
            tracing::info!(
                "No relevant passages (all scores below {:.2} threshold)",
                self.config.min_relevance
            );
        }

        Ok(passages)
    }

    pub fn identity(&self) -> &DocumentIdentity {
        &self.identity
    }

    pub fn stats(&self) -> &IndexStats {
        &self.stats
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}
