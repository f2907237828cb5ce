//! Answer synthesis from retrieved evidence.

use askdoc_core::config::GenerationSettings;
use askdoc_core::{AppError, AppResult};
use askdoc_llm::{LlmClient, LlmRequest};
use askdoc_prompt::builtin::builtin_prompt;
use askdoc_prompt::{build_prompt, load_prompt, PromptDefinition, RETRIEVAL_PROMPT_ID, SYNTHESIS_PROMPT_ID};
use futures::StreamExt;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::types::{is_sentinel, Answer, RetrievalResult, SENTINEL};

/// The two prompt definitions a synthesis stage renders.
#[derive(Debug, Clone)]
pub struct PromptSet {
    /// Renders the evidence block
    pub retrieval: PromptDefinition,
    /// Renders the system and user prompts of the answer request
    pub synthesis: PromptDefinition,
}

impl PromptSet {
    /// Built-in prompts, with `.askdoc/prompts/` overrides from `workspace`.
    pub fn load(workspace: &Path) -> AppResult<Self> {
        Ok(Self {
            retrieval: load_prompt(workspace, RETRIEVAL_PROMPT_ID)?,
            synthesis: load_prompt(workspace, SYNTHESIS_PROMPT_ID)?,
        })
    }

    pub fn builtin() -> AppResult<Self> {
        let get = |id: &str| {
            builtin_prompt(id)?
                .ok_or_else(|| AppError::Prompt(format!("Missing built-in prompt: {}", id)))
        };
        Ok(Self {
            retrieval: get(RETRIEVAL_PROMPT_ID)?,
            synthesis: get(SYNTHESIS_PROMPT_ID)?,
        })
    }
}

/// Model and sampling parameters for answer requests.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl GenerationParams {
    pub fn new(model: impl Into<String>, settings: &GenerationSettings) -> Self {
        Self {
            model: model.into(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        }
    }
}

/// A streamed answer and whether any of it reached the receiver side.
#[derive(Debug, Clone)]
pub(crate) struct Streamed {
    pub answer: Answer,
    pub forwarded: bool,
}

/// Second stage of a pipeline: turns evidence into one answer.
///
/// The model only sees the evidence of the current query. Empty evidence and
/// model failures both produce the sentinel answer.
pub struct SynthesisStage {
    llm: Arc<dyn LlmClient>,
    params: GenerationParams,
    prompts: PromptSet,
}

impl std::fmt::Debug for SynthesisStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynthesisStage")
            .field("provider", &self.llm.provider_name())
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl SynthesisStage {
    pub fn new(llm: Arc<dyn LlmClient>, params: GenerationParams, prompts: PromptSet) -> Self {
        Self {
            llm,
            params,
            prompts,
        }
    }

    /// Render the answer request for `query` over `result`.
    pub fn build_request(&self, query: &str, result: &RetrievalResult) -> AppResult<LlmRequest> {
        let evidence: Vec<_> = result
            .evidence
            .iter()
            .enumerate()
            .map(|(i, e)| {
                json!({
                    "label": e.source.label(),
                    "number": i + 1,
                    "origin": e.origin,
                    "text": e.text,
                })
            })
            .collect();

        let block = build_prompt(
            &self.prompts.retrieval,
            json!({ "query": query, "evidence": evidence }),
        )?;

        let built = build_prompt(
            &self.prompts.synthesis,
            json!({ "query": query, "evidence": block.user, "sentinel": SENTINEL }),
        )?;

        let mut request = LlmRequest::new(built.user, &self.params.model)
            .with_temperature(self.params.temperature)
            .with_max_tokens(self.params.max_tokens);
        if let Some(system) = built.system {
            request = request.with_system(system);
        }
        Ok(request)
    }

    /// Answer `query` from `result` in one model call.
    #[instrument(skip(self, result), fields(evidence = result.len()))]
    pub async fn synthesize(&self, query: &str, result: &RetrievalResult) -> Answer {
        if result.is_empty() {
            info!("No evidence, answering with the sentinel");
            return Answer::not_found();
        }

        let request = match self.build_request(query, result) {
            Ok(request) => request,
            Err(e) => {
                warn!("Failed to build answer prompt: {}", e);
                return Answer::not_found();
            }
        };

        match self.llm.complete(&request).await {
            Ok(response) => {
                debug!(usage = ?response.usage, "Model answered");
                let answer = Answer::from_reply(response.content.trim().to_string(), result);
                if answer.is_not_found() {
                    info!("Model found no answer in the evidence");
                }
                answer
            }
            Err(e) => {
                warn!("Model call failed: {}", e);
                Answer::not_found()
            }
        }
    }

    /// Answer `query` from `result`, sending text to `tx` as the model
    /// produces it. The chunks sent concatenate to the returned text.
    pub async fn synthesize_streaming(
        &self,
        query: &str,
        result: &RetrievalResult,
        tx: mpsc::Sender<String>,
    ) -> Answer {
        self.stream_answer(query, result, &tx, false).await.answer
    }

    /// A sentinel reply is always forwarded as the exact sentinel text. With
    /// `hold_not_found` it is not forwarded at all, so the caller can still
    /// try to do better.
    #[instrument(skip(self, result, tx), fields(evidence = result.len()))]
    pub(crate) async fn stream_answer(
        &self,
        query: &str,
        result: &RetrievalResult,
        tx: &mpsc::Sender<String>,
        hold_not_found: bool,
    ) -> Streamed {
        let mut forwarder = ChunkForwarder::new(tx, hold_not_found);

        if result.is_empty() {
            info!("No evidence, answering with the sentinel");
            return forwarder.not_found().await;
        }

        let request = match self.build_request(query, result) {
            Ok(request) => request.with_streaming(),
            Err(e) => {
                warn!("Failed to build answer prompt: {}", e);
                return forwarder.not_found().await;
            }
        };

        let mut stream = match self.llm.stream(&request).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Model call failed: {}", e);
                return forwarder.not_found().await;
            }
        };

        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => {
                    forwarder.push(&chunk.content).await;
                    if chunk.done {
                        debug!(usage = ?chunk.usage, "Model stream finished");
                        break;
                    }
                }
                Err(e) => {
                    warn!("Model stream broke off: {}", e);
                    break;
                }
            }
        }

        forwarder.finish(result).await
    }
}

/// Forwards model text to the answer channel.
///
/// Leading and trailing whitespace never reach the channel, and text is
/// buffered while it still reads like the sentinel. A reply that turns out to
/// be the sentinel is replaced by the exact sentinel text, or, with
/// `hold_not_found`, not sent at all.
struct ChunkForwarder<'a> {
    tx: &'a mpsc::Sender<String>,
    text: String,
    held: String,
    trailing: String,
    holding: bool,
    hold_not_found: bool,
    receiver_gone: bool,
}

impl<'a> ChunkForwarder<'a> {
    fn new(tx: &'a mpsc::Sender<String>, hold_not_found: bool) -> Self {
        Self {
            tx,
            text: String::new(),
            held: String::new(),
            trailing: String::new(),
            holding: true,
            hold_not_found,
            receiver_gone: false,
        }
    }

    async fn push(&mut self, delta: &str) {
        let delta = if self.text.is_empty() && self.held.is_empty() {
            delta.trim_start()
        } else {
            delta
        };
        if delta.is_empty() {
            return;
        }

        if self.holding {
            self.held.push_str(delta);
            if could_be_sentinel(&self.held) {
                return;
            }
            self.holding = false;
            let held = std::mem::take(&mut self.held);
            self.forward(&held).await;
        } else {
            self.forward(delta).await;
        }
    }

    /// Send `text`, keeping any trailing whitespace back until more text
    /// follows it.
    async fn forward(&mut self, text: &str) {
        self.trailing.push_str(text);
        let end = self.trailing.trim_end().len();
        if end == 0 {
            return;
        }
        let rest = self.trailing.split_off(end);
        let ready = std::mem::replace(&mut self.trailing, rest);
        self.send(ready).await;
    }

    async fn send(&mut self, text: String) {
        self.text.push_str(&text);
        if self.receiver_gone {
            return;
        }
        if self.tx.send(text).await.is_err() {
            debug!("Answer receiver dropped, collecting the rest silently");
            self.receiver_gone = true;
        }
    }

    async fn not_found(mut self) -> Streamed {
        if !self.hold_not_found {
            self.send(SENTINEL.to_string()).await;
        }
        Streamed {
            answer: Answer::not_found(),
            forwarded: !self.text.is_empty(),
        }
    }

    async fn finish(mut self, result: &RetrievalResult) -> Streamed {
        if !self.held.is_empty() {
            if is_sentinel(&self.held) {
                info!("Model found no answer in the evidence");
                return self.not_found().await;
            }
            let held = std::mem::take(&mut self.held);
            self.forward(&held).await;
        }

        if self.text.is_empty() {
            return self.not_found().await;
        }

        Streamed {
            answer: Answer::from_reply(self.text, result),
            forwarded: true,
        }
    }
}

fn could_be_sentinel(text: &str) -> bool {
    SENTINEL.starts_with(text.trim().trim_matches('"'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Evidence, Outcome, SourceKind};
    use askdoc_llm::{LlmResponse, LlmStream, LlmStreamChunk, LlmUsage};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replies with a fixed text, streamed in small pieces.
    struct FixedReply {
        reply: Option<String>,
        calls: AtomicUsize,
    }

    impl FixedReply {
        fn new(reply: &str) -> Self {
            Self {
                reply: Some(reply.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                reply: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn reply(&self) -> AppResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply
                .clone()
                .ok_or_else(|| AppError::Llm("connection refused".to_string()))
        }
    }

    #[async_trait::async_trait]
    impl LlmClient for FixedReply {
        fn provider_name(&self) -> &str {
            "fixed"
        }

        async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
            Ok(LlmResponse {
                content: self.reply()?,
                model: request.model.clone(),
                usage: LlmUsage::default(),
            })
        }

        async fn stream(&self, _request: &LlmRequest) -> AppResult<LlmStream> {
            let reply = self.reply()?;
            let chars: Vec<char> = reply.chars().collect();
            let mut chunks: Vec<AppResult<LlmStreamChunk>> = chars
                .chunks(5)
                .map(|c| Ok(LlmStreamChunk::delta(c.iter().collect::<String>())))
                .collect();
            chunks.push(Ok(LlmStreamChunk::finished(None)));
            Ok(Box::pin(futures::stream::iter(chunks)))
        }
    }

    fn stage(llm: Arc<FixedReply>) -> SynthesisStage {
        SynthesisStage::new(
            llm,
            GenerationParams::new("test-model", &GenerationSettings::default()),
            PromptSet::builtin().unwrap(),
        )
    }

    fn web_evidence() -> RetrievalResult {
        RetrievalResult {
            evidence: vec![Evidence::new(
                SourceKind::WebSearch,
                "Paris - Wikipedia\nParis is the capital of France.",
                "https://en.wikipedia.org/wiki/Paris",
            )],
            ..Default::default()
        }
    }

    async fn collect(mut rx: mpsc::Receiver<String>) -> Vec<String> {
        let mut chunks = Vec::new();
        while let Some(chunk) = rx.recv().await {
            chunks.push(chunk);
        }
        chunks
    }

    #[tokio::test]
    async fn test_empty_evidence_skips_model() {
        let llm = Arc::new(FixedReply::new("should not be used"));
        let answer = stage(llm.clone())
            .synthesize("anything", &RetrievalResult::default())
            .await;

        assert_eq!(answer.text, SENTINEL);
        assert_eq!(answer.outcome, Outcome::NotFound);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_request_carries_evidence_and_sentinel() {
        let request = stage(Arc::new(FixedReply::new("")))
            .build_request("What is the capital of France?", &web_evidence())
            .unwrap();

        assert!(request.prompt.contains("[Web 1] https://en.wikipedia.org/wiki/Paris"));
        assert!(request.prompt.contains("Paris is the capital of France."));
        assert!(request.system.unwrap().contains(SENTINEL));
        assert_eq!(request.max_tokens, Some(1000));
    }

    #[tokio::test]
    async fn test_model_failure_degrades_to_sentinel() {
        let answer = stage(Arc::new(FixedReply::failing()))
            .synthesize("q", &web_evidence())
            .await;
        assert_eq!(answer, Answer::not_found());
    }

    #[tokio::test]
    async fn test_streamed_chunks_concatenate_to_answer() {
        let (tx, rx) = mpsc::channel(4);
        let stage = stage(Arc::new(FixedReply::new("  Paris is the capital of France.")));

        let receiver = tokio::spawn(collect(rx));
        let answer = stage
            .synthesize_streaming("What is the capital of France?", &web_evidence(), tx)
            .await;
        let chunks = receiver.await.unwrap();

        assert!(chunks.len() > 1);
        assert_eq!(chunks.concat(), answer.text);
        assert_eq!(answer.text, "Paris is the capital of France.");
        assert_eq!(answer.outcome, Outcome::Synthesized);
        assert_eq!(answer.sources.len(), 1);
    }

    #[tokio::test]
    async fn test_streaming_failure_sends_sentinel() {
        let (tx, rx) = mpsc::channel(4);
        let receiver = tokio::spawn(collect(rx));
        let answer = stage(Arc::new(FixedReply::failing()))
            .synthesize_streaming("q", &web_evidence(), tx)
            .await;

        assert_eq!(receiver.await.unwrap(), vec![SENTINEL.to_string()]);
        assert!(answer.is_not_found());
    }

    #[tokio::test]
    async fn test_held_sentinel_is_not_forwarded() {
        let (tx, rx) = mpsc::channel(32);
        let streamed = stage(Arc::new(FixedReply::new(SENTINEL)))
            .stream_answer("q", &web_evidence(), &tx, true)
            .await;
        drop(tx);

        assert!(streamed.answer.is_not_found());
        assert!(!streamed.forwarded);
        assert!(collect(rx).await.is_empty());
    }

    #[tokio::test]
    async fn test_loose_sentinel_streams_as_exact_sentinel() {
        for reply in [
            "\"I'm sorry, I couldn't find the information you're looking for\"",
            "I'm sorry, I couldn't find the information you're looking for",
            "I'm sorry, I couldn't find the information you're looking for.  \n",
        ] {
            let (tx, rx) = mpsc::channel(32);
            let receiver = tokio::spawn(collect(rx));
            let llm = Arc::new(FixedReply::new(reply));
            let streamed = stage(llm.clone())
                .synthesize_streaming("q", &web_evidence(), tx)
                .await;
            let complete = stage(llm).synthesize("q", &web_evidence()).await;

            assert_eq!(receiver.await.unwrap().concat(), SENTINEL);
            assert_eq!(streamed, Answer::not_found());
            assert_eq!(complete, streamed);
        }
    }

    #[tokio::test]
    async fn test_trailing_whitespace_is_not_streamed() {
        let (tx, rx) = mpsc::channel(32);
        let receiver = tokio::spawn(collect(rx));
        let answer = stage(Arc::new(FixedReply::new("Paris is the capital.   \n\n")))
            .synthesize_streaming("q", &web_evidence(), tx)
            .await;

        assert_eq!(answer.text, "Paris is the capital.");
        assert_eq!(receiver.await.unwrap().concat(), answer.text);
    }

    #[tokio::test]
    async fn test_held_text_is_released_once_it_diverges() {
        let (tx, rx) = mpsc::channel(32);
        let streamed = stage(Arc::new(FixedReply::new("I'm sure: Paris.")))
            .stream_answer("q", &web_evidence(), &tx, true)
            .await;
        drop(tx);

        assert!(streamed.forwarded);
        assert_eq!(collect(rx).await.concat(), "I'm sure: Paris.");
        assert_eq!(streamed.answer.text, "I'm sure: Paris.");
    }
}
