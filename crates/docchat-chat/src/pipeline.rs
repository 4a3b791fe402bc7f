//! Request to event stream: retrieval outcome, sources, then answer fragments.
use anyhow::Result;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use docchat_core::config::Settings;
use docchat_core::traits::ChunkStore;
use docchat_core::types::{ChatRequest, StreamEvent};
use docchat_embed::{shared_embedder, shared_reranker};
use docchat_hybrid::HybridSearch;
use docchat_llm::{AnswerStreamer, LanguageModel, OllamaClient, Prompts, QueryRewriter};
use docchat_vector::LanceChunkStore;

use crate::orchestrator::{RetrievalOrchestrator, RetrievalOutcome};
use crate::selection::{build_context, source_record};

pub const KNOWLEDGE_BASE_EMPTY: &str = "Knowledge base empty.";
pub const NO_RELEVANT_INFORMATION: &str = "Information Not Included.";

const CHANNEL_CAPACITY: usize = 32;

type Closed = mpsc::error::SendError<StreamEvent>;

pub struct ChatPipeline {
    orchestrator: RetrievalOrchestrator,
    answer: AnswerStreamer,
}

impl ChatPipeline {
    pub fn new(orchestrator: RetrievalOrchestrator, answer: AnswerStreamer) -> Self {
        Self { orchestrator, answer }
    }

    /// Wire the pipeline from settings: LanceDB store, shared local models,
    /// and the Ollama client for both rewriting and generation.
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        let store: Arc<dyn ChunkStore> = Arc::new(LanceChunkStore::from_settings(&settings.store).await?);
        let embedder = shared_embedder(&settings.embedding).await?;
        let reranker = shared_reranker(&settings.embedding).await;
        let llm: Arc<dyn LanguageModel> = Arc::new(OllamaClient::new(&settings.llm)?);
        let prompts = Arc::new(Prompts::load(&settings.prompts)?);

        let search = Arc::new(HybridSearch::new(store, embedder, reranker, settings.retrieval.clone()));
        let rewriter = Arc::new(QueryRewriter::new(
            Arc::clone(&llm),
            Arc::clone(&prompts),
            Duration::from_secs(settings.llm.rewrite_timeout_secs),
        ));
        let orchestrator = RetrievalOrchestrator::new(search, rewriter, settings.retrieval.threshold);
        Ok(Self::new(orchestrator, AnswerStreamer::new(llm, prompts)))
    }

    /// Answer `request` as a stream of events. Dropping the returned stream
    /// stops the work, including any in-flight model call.
    pub fn stream(self: Arc<Self>, request: ChatRequest) -> ReceiverStream<StreamEvent> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let worker_tx = tx.clone();
        let worker = tokio::spawn(async move {
            tokio::select! {
                _ = worker_tx.closed() => debug!("receiver dropped, request cancelled"),
                res = self.produce(request, &worker_tx) => {
                    if res.is_err() { debug!("receiver dropped mid-stream"); }
                }
            }
        });
        tokio::spawn(async move {
            if let Err(e) = worker.await {
                if e.is_panic() {
                    error!("chat pipeline panicked");
                    let _ = tx.send(StreamEvent::Error("Server Error: internal error".to_string())).await;
                }
            }
        });
        ReceiverStream::new(rx)
    }

    async fn produce(&self, request: ChatRequest, tx: &mpsc::Sender<StreamEvent>) -> Result<(), Closed> {
        let outcome = match self.orchestrator.run(&request.history, &request.message, &request.filter()).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "chat request failed");
                return tx.send(StreamEvent::Error(format!("Server Error: {e}"))).await;
            }
        };
        let selected = match outcome {
            RetrievalOutcome::KnowledgeBaseEmpty => {
                return tx.send(StreamEvent::Content(KNOWLEDGE_BASE_EMPTY.to_string())).await;
            }
            RetrievalOutcome::NoRelevantInformation => {
                return tx.send(StreamEvent::Content(NO_RELEVANT_INFORMATION.to_string())).await;
            }
            RetrievalOutcome::Selected(selected) => selected,
        };

        info!(sources = selected.len(), "answering from selected chunks");
        tx.send(StreamEvent::Sources(selected.iter().map(|s| source_record(&s.chunk)).collect())).await?;

        let context = build_context(&selected);
        let mut fragments = self.answer.stream(&context, &request.history, &request.message);
        while let Some(item) = fragments.next().await {
            match item {
                Ok(fragment) => tx.send(StreamEvent::Content(fragment)).await?,
                Err(e) => {
                    warn!(error = %e, "generation failed");
                    return tx.send(StreamEvent::Error(format!("Generation failed: {e}"))).await;
                }
            }
        }
        Ok(())
    }
}

/// One event as a JSON line.
pub fn encode_ndjson(event: &StreamEvent) -> serde_json::Result<String> {
    let mut line = serde_json::to_string(event)?;
    line.push('\n');
    Ok(line)
}
