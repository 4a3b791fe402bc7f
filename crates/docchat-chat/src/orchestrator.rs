use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

use docchat_core::types::{ConversationTurn, RetrievalFilter, ScoredChunk};
use docchat_hybrid::{HybridSearch, Retriever};
use docchat_llm::QueryRewriter;

use crate::selection::{display_label, filter_by_threshold};

/// How retrieval ended for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum RetrievalOutcome {
    /// Nothing is indexed under the request's filter.
    KnowledgeBaseEmpty,
    /// Chunks exist but none cleared the threshold, fallback included.
    NoRelevantInformation,
    /// Chunks to answer from, in retriever order.
    Selected(Vec<ScoredChunk>),
}

pub struct RetrievalOrchestrator {
    search: Arc<HybridSearch>,
    rewriter: Arc<QueryRewriter>,
    threshold: f32,
}

impl RetrievalOrchestrator {
    pub fn new(search: Arc<HybridSearch>, rewriter: Arc<QueryRewriter>, threshold: f32) -> Self {
        Self { search, rewriter, threshold }
    }

    /// Rewrite, retrieve, threshold, and retry once with the literal message
    /// when a rewritten query found nothing.
    pub async fn run(&self, history: &[ConversationTurn], message: &str, filter: &RetrievalFilter) -> Result<RetrievalOutcome> {
        let (search_query, is_rewritten) = match self.rewriter.rewrite(history, message).await {
            Ok(q) => {
                let changed = q != message;
                if changed {
                    info!(original = message, rewritten = %q, "query rewritten");
                }
                (q, changed)
            }
            Err(e) => {
                warn!(error = %e, "query rewriting failed, using original message");
                (message.to_string(), false)
            }
        };

        let retriever = self.search.prepare(filter).await;
        if !retriever.is_available() {
            return Ok(RetrievalOutcome::KnowledgeBaseEmpty);
        }

        let mut selected = self.retrieve_filtered(&retriever, &search_query).await?;
        if selected.is_empty() && is_rewritten {
            info!(original = message, "no relevant chunks for rewritten query, retrying with original");
            selected = self.retrieve_filtered(&retriever, message).await?;
        }
        if selected.is_empty() {
            info!("no chunks above threshold");
            return Ok(RetrievalOutcome::NoRelevantInformation);
        }
        Ok(RetrievalOutcome::Selected(selected))
    }

    async fn retrieve_filtered(&self, retriever: &Retriever, query: &str) -> Result<Vec<ScoredChunk>> {
        let results = retriever.retrieve(query).await?;
        debug!(query, hits = results.len(), "raw results");
        for (i, r) in results.iter().enumerate() {
            debug!(rank = i + 1, score = r.relevance_score.unwrap_or(0.0), label = %display_label(&r.chunk), "result");
        }
        Ok(filter_by_threshold(results, self.threshold))
    }
}
