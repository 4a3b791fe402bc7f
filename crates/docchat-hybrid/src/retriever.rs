use anyhow::{anyhow, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

use docchat_core::config::RetrievalSettings;
use docchat_core::traits::{ChunkStore, Embedder, Reranker};
use docchat_core::types::{Chunk, RetrievalFilter, ScoredChunk};
use docchat_text::KeywordRanker;

use crate::cache::{CacheKey, RankerCache};
use crate::fusion::weighted_rrf;

/// Builds a [`Retriever`] for one request scope.
pub struct HybridSearch {
    store: Arc<dyn ChunkStore>,
    embedder: Arc<dyn Embedder>,
    reranker: Arc<dyn Reranker>,
    settings: RetrievalSettings,
    rankers: Arc<RankerCache>,
}

/// What [`HybridSearch::prepare`] could set up for a filter.
pub enum Retriever {
    Hybrid(HybridRetriever),
    /// Keyword side could not be built; semantic results only, unscored.
    Degraded(SemanticRetriever),
    /// Nothing is indexed under the filter.
    Unavailable,
}

impl HybridSearch {
    pub fn new(
        store: Arc<dyn ChunkStore>,
        embedder: Arc<dyn Embedder>,
        reranker: Arc<dyn Reranker>,
        settings: RetrievalSettings,
    ) -> Self {
        Self::with_cache(store, embedder, reranker, settings, RankerCache::global())
    }

    pub fn with_cache(
        store: Arc<dyn ChunkStore>,
        embedder: Arc<dyn Embedder>,
        reranker: Arc<dyn Reranker>,
        settings: RetrievalSettings,
        rankers: Arc<RankerCache>,
    ) -> Self {
        Self { store, embedder, reranker, settings, rankers }
    }

    pub async fn prepare(&self, filter: &RetrievalFilter) -> Retriever {
        let semantic = SemanticRetriever {
            store: Arc::clone(&self.store),
            embedder: Arc::clone(&self.embedder),
            filter: filter.clone(),
            k: self.settings.k,
        };
        let scope = match self.store.list_all(filter).await {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(error = %e, "listing chunks failed, using semantic retrieval only");
                return Retriever::Degraded(semantic);
            }
        };
        if scope.is_empty() {
            info!(restricted = !filter.is_unrestricted(), "no chunks under filter");
            return Retriever::Unavailable;
        }
        match self.keyword_ranker(filter, scope).await {
            Ok(keyword) => Retriever::Hybrid(HybridRetriever {
                semantic,
                keyword,
                reranker: Arc::clone(&self.reranker),
                settings: self.settings.clone(),
            }),
            Err(e) => {
                warn!(error = %e, "keyword ranker build failed, using semantic retrieval only");
                Retriever::Degraded(semantic)
            }
        }
    }

    async fn keyword_ranker(&self, filter: &RetrievalFilter, scope: Vec<Chunk>) -> Result<Arc<KeywordRanker>> {
        let key = CacheKey::new(filter, &scope);
        if let Some(hit) = self.rankers.get(&key) {
            debug!(chunks = hit.len(), "keyword ranker cache hit");
            return Ok(hit);
        }
        let ranker = tokio::task::spawn_blocking(move || KeywordRanker::build(scope)).await??;
        Ok(self.rankers.insert(key, Arc::new(ranker)))
    }
}

impl Retriever {
    pub fn is_available(&self) -> bool { !matches!(self, Retriever::Unavailable) }

    /// Best-first results for `query`. `Unavailable` yields nothing.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<ScoredChunk>> {
        match self {
            Retriever::Hybrid(r) => r.retrieve(query).await,
            Retriever::Degraded(r) => Ok(r.search(query).await?.into_iter().map(ScoredChunk::unscored).collect()),
            Retriever::Unavailable => Ok(Vec::new()),
        }
    }
}

/// Embedding search against the store, filter applied at query time.
pub struct SemanticRetriever {
    store: Arc<dyn ChunkStore>,
    embedder: Arc<dyn Embedder>,
    filter: RetrievalFilter,
    k: usize,
}

impl SemanticRetriever {
    pub async fn search(&self, query: &str) -> Result<Vec<Chunk>> {
        let embedder = Arc::clone(&self.embedder);
        let text = query.to_string();
        let vector = tokio::task::spawn_blocking(move || embedder.embed_batch(&[text]))
            .await??
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("embedder returned no vector"))?;
        self.store.similarity_search(&vector, self.k, &self.filter).await
    }
}

pub struct HybridRetriever {
    semantic: SemanticRetriever,
    keyword: Arc<KeywordRanker>,
    reranker: Arc<dyn Reranker>,
    settings: RetrievalSettings,
}

impl HybridRetriever {
    pub async fn retrieve(&self, query: &str) -> Result<Vec<ScoredChunk>> {
        let semantic = self.semantic.search(query).await?;
        let ranker = Arc::clone(&self.keyword);
        let (q, k) = (query.to_string(), self.settings.k);
        let keyword = tokio::task::spawn_blocking(move || ranker.search(&q, k)).await??;
        debug!(
            semantic = ?semantic.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(),
            keyword = ?keyword.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(),
            "raw retrieval results"
        );
        let fused = weighted_rrf(
            &[(keyword.as_slice(), self.settings.keyword_weight), (semantic.as_slice(), self.settings.semantic_weight)],
            self.settings.rrf_c,
        );
        let reranker = Arc::clone(&self.reranker);
        let q = query.to_string();
        let top_n = self.settings.top_n;
        // A panicking model degrades the same way as an erroring one.
        let ranked = tokio::task::spawn_blocking(move || reranker.rerank(&q, fused, top_n))
            .await
            .map_err(anyhow::Error::from);
        match ranked {
            Ok(Ok(ranked)) => Ok(ranked),
            Ok(Err(e)) | Err(e) => {
                warn!(error = %e, "rerank failed, returning semantic results unscored");
                Ok(semantic.into_iter().map(ScoredChunk::unscored).collect())
            }
        }
    }
}
