//! Index command handler.
//!
//! Builds the index of one document and runs a document-only search, without
//! a language model or web tools. Useful to tune chunking and relevance.

use crate::display::{print_index_stats, print_json, BusyIndicator};
use crate::ingress::read_document;
use askdoc_core::config::AppConfig;
use askdoc_knowledge::{create_provider, Document, DocumentIndex, IndexConfig};
use clap::Args;
use serde_json::json;
use std::path::PathBuf;

/// Index a document and search it
#[derive(Args, Debug)]
pub struct IndexCommand {
    /// Document to index (PDF)
    pub file: PathBuf,

    /// Search the index for this query
    #[arg(short, long)]
    pub query: Option<String>,

    /// Maximum passages to show
    #[arg(long)]
    pub top_k: Option<usize>,

    /// Minimum relevance score of shown passages
    #[arg(long)]
    pub min_relevance: Option<f32>,

    /// Also accept .txt and .md documents
    #[arg(long)]
    pub allow_text: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl IndexCommand {
    pub async fn execute(&self, config: &AppConfig) -> anyhow::Result<()> {
        tracing::info!("Executing index command for {:?}", self.file);

        let upload = read_document(&self.file, self.allow_text).await?;

        let mut index_config = IndexConfig::from_settings(&config.index, &config.retrieval);
        if let Some(top_k) = self.top_k {
            index_config.top_k = top_k;
        }
        if let Some(min_relevance) = self.min_relevance {
            index_config.min_relevance = min_relevance;
        }

        let embeddings = create_provider(&config.index.embedding).await?;
        let document = Document::materialize(upload)?;

        let busy = BusyIndicator::start(format!("Indexing {}", document.name()));
        let index =
            DocumentIndex::build_with_progress(&document, &index_config, embeddings, &busy.reporter())
                .await;
        busy.finish();
        let index = index?;

        let passages = match self.query {
            Some(ref query) => index.search(query).await?,
            None => Vec::new(),
        };

        if self.json {
            return print_json(&json!({
                "document": index.identity(),
                "stats": index.stats(),
                "query": self.query,
                "passages": passages,
            }));
        }

        print_index_stats(index.stats());
        if let Some(ref query) = self.query {
            if passages.is_empty() {
                println!(
                    "No passage scores at least {:.2} for {:?}",
                    index_config.min_relevance, query
                );
            }
            for passage in &passages {
                println!("[{:.3}] {}", passage.score, passage.origin());
                println!("{}\n", passage.text.trim());
            }
        }
        Ok(())
    }
}
