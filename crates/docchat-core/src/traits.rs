use async_trait::async_trait;

use crate::types::{Chunk, RetrievalFilter, ScoredChunk};

pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Cross-encoder style relevance model.
pub trait Reranker: Send + Sync {
    /// One score per passage, higher is more relevant to `query`.
    fn score(&self, query: &str, passages: &[&str]) -> anyhow::Result<Vec<f32>>;

    /// Score `candidates` and keep the best `top_n`, best first.
    /// Candidates with equal scores keep their input order.
    fn rerank(&self, query: &str, candidates: Vec<Chunk>, top_n: usize) -> anyhow::Result<Vec<ScoredChunk>> {
        let passages: Vec<&str> = candidates.iter().map(|c| c.text.as_str()).collect();
        let scores = self.score(query, &passages)?;
        if scores.len() != candidates.len() {
            return Err(crate::error::Error::Model(format!(
                "reranker returned {} scores for {} candidates",
                scores.len(),
                candidates.len()
            ))
            .into());
        }
        let mut scored: Vec<ScoredChunk> =
            candidates.into_iter().zip(scores).map(|(c, s)| ScoredChunk::new(c, s)).collect();
        scored.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_n);
        Ok(scored)
    }
}

/// The external index store holding embedded chunks.
///
/// Readers get a best-effort snapshot; ingestion and deletion may run
/// concurrently.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Nearest chunks to `query_vec`, best first, restricted by `filter`.
    async fn similarity_search(&self, query_vec: &[f32], k: usize, filter: &RetrievalFilter) -> anyhow::Result<Vec<Chunk>>;

    /// Every chunk visible under `filter`.
    async fn list_all(&self, filter: &RetrievalFilter) -> anyhow::Result<Vec<Chunk>>;

    async fn add(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> anyhow::Result<()>;

    /// Remove every chunk that belongs to `filename`.
    async fn delete_file(&self, filename: &str) -> anyhow::Result<()>;

    /// Distinct filenames present in the store, sorted.
    async fn list_files(&self) -> anyhow::Result<Vec<String>> {
        let chunks = self.list_all(&RetrievalFilter::all()).await?;
        let names: std::collections::BTreeSet<String> =
            chunks.into_iter().map(|c| c.metadata.filename).filter(|f| !f.is_empty()).collect();
        Ok(names.into_iter().collect())
    }
}
