//! The bound retrieve-then-synthesize unit for one document.

use askdoc_knowledge::DocumentIdentity;
use tokio::sync::mpsc;
use tracing::{info, instrument};

use crate::retrieval::RetrievalStage;
use crate::synthesis::SynthesisStage;
use crate::tool::ToolKind;
use crate::types::{Answer, PipelineId, RetrievalResult, SENTINEL};

/// Retrieval and synthesis bound to the current document, or to no document.
///
/// Reused for every query until the document changes; a new document always
/// gets a new pipeline with a new [`PipelineId`].
#[derive(Debug)]
pub struct Pipeline {
    id: PipelineId,
    document: Option<DocumentIdentity>,
    retrieval: RetrievalStage,
    synthesis: SynthesisStage,
    escalate_on_not_found: bool,
}

impl Pipeline {
    pub fn new(
        document: Option<DocumentIdentity>,
        retrieval: RetrievalStage,
        synthesis: SynthesisStage,
        escalate_on_not_found: bool,
    ) -> Self {
        let id = PipelineId::new();
        info!(
            pipeline = %id,
            document = ?document.as_ref().map(|d| d.name.as_str()),
            tools = ?retrieval.tools().available(),
            "Built pipeline"
        );

        Self {
            id,
            document,
            retrieval,
            synthesis,
            escalate_on_not_found,
        }
    }

    pub fn id(&self) -> PipelineId {
        self.id
    }

    pub fn document(&self) -> Option<&DocumentIdentity> {
        self.document.as_ref()
    }

    pub fn retrieval(&self) -> &RetrievalStage {
        &self.retrieval
    }

    /// Whether a not-found answer over `result` is worth a page scrape and a
    /// second synthesis.
    fn can_escalate(&self, result: &RetrievalResult) -> bool {
        self.escalate_on_not_found
            && result.only_web_snippets()
            && self.retrieval.tools().is_available(ToolKind::PageScrape)
    }

    /// Answer `query` in one piece.
    #[instrument(skip(self), fields(pipeline = %self.id))]
    pub async fn answer(&self, query: &str) -> Answer {
        let result = self.retrieval.run(query).await;
        let answer = self.synthesis.synthesize(query, &result).await;

        if !(answer.is_not_found() && self.can_escalate(&result)) {
            return answer.with_tools(&result.trace);
        }

        let deeper = self.retrieval.deepen(query, &result).await;
        if deeper.len() == result.len() {
            return answer.with_tools(&deeper.trace);
        }

        info!("Snippets were not enough, answering again from the scraped page");
        self.synthesis
            .synthesize(query, &deeper)
            .await
            .with_tools(&deeper.trace)
    }

    /// Answer `query`, sending text to `tx` as it is produced.
    ///
    /// The chunks sent concatenate to the returned answer's text, also when a
    /// not-found first attempt is replaced by an answer from a scraped page.
    #[instrument(skip(self, tx), fields(pipeline = %self.id))]
    pub async fn answer_streaming(&self, query: &str, tx: mpsc::Sender<String>) -> Answer {
        let result = self.retrieval.run(query).await;
        let escalate = self.can_escalate(&result);

        let first = self.synthesis.stream_answer(query, &result, &tx, escalate).await;
        if !(escalate && first.answer.is_not_found() && !first.forwarded) {
            return first.answer.with_tools(&result.trace);
        }

        let deeper = self.retrieval.deepen(query, &result).await;
        if deeper.len() == result.len() {
            // Held back above in case the scrape helped
            let _ = tx.send(SENTINEL.to_string()).await;
            return first.answer.with_tools(&deeper.trace);
        }

        info!("Snippets were not enough, answering again from the scraped page");
        self.synthesis
            .stream_answer(query, &deeper, &tx, false)
            .await
            .answer
            .with_tools(&deeper.trace)
    }
}
