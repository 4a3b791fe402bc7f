//! In-process chunk store with brute-force cosine search, for tests and
//! embedding the pipeline without LanceDB.
use anyhow::Result;
use async_trait::async_trait;
use std::sync::RwLock;

use docchat_core::traits::ChunkStore;
use docchat_core::types::{Chunk, RetrievalFilter};

#[derive(Default)]
pub struct MemoryChunkStore {
    rows: RwLock<Vec<(Chunk, Vec<f32>)>>,
}

impl MemoryChunkStore {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.rows.read().map(|r| r.len()).unwrap_or(0) }

    pub fn is_empty(&self) -> bool { self.len() == 0 }
}

/// Cosine similarity; 0.0 for mismatched or zero-magnitude vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() { return 0.0; }
    let (mut dot, mut ma, mut mb) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        ma += x * x;
        mb += y * y;
    }
    let denom = ma.sqrt() * mb.sqrt();
    if denom < f32::EPSILON { 0.0 } else { (dot / denom).clamp(-1.0, 1.0) }
}

fn poisoned() -> anyhow::Error { docchat_core::Error::Store("memory store lock poisoned".into()).into() }

#[async_trait]
impl ChunkStore for MemoryChunkStore {
    async fn similarity_search(&self, query_vec: &[f32], k: usize, filter: &RetrievalFilter) -> Result<Vec<Chunk>> {
        let rows = self.rows.read().map_err(|_| poisoned())?;
        let mut scored: Vec<(f32, &Chunk)> = rows
            .iter()
            .filter(|(c, _)| filter.allows(c))
            .map(|(c, v)| (cosine_similarity(query_vec, v), c))
            .collect();
        // stable: equal similarity keeps insertion order
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored.into_iter().take(k).map(|(_, c)| c.clone()).collect())
    }

    async fn list_all(&self, filter: &RetrievalFilter) -> Result<Vec<Chunk>> {
        let rows = self.rows.read().map_err(|_| poisoned())?;
        Ok(rows.iter().filter(|(c, _)| filter.allows(c)).map(|(c, _)| c.clone()).collect())
    }

    async fn add(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()> {
        anyhow::ensure!(chunks.len() == embeddings.len(), "{} chunks but {} embeddings", chunks.len(), embeddings.len());
        let mut rows = self.rows.write().map_err(|_| poisoned())?;
        rows.extend(chunks.iter().cloned().zip(embeddings.iter().cloned()));
        Ok(())
    }

    async fn delete_file(&self, filename: &str) -> Result<()> {
        let mut rows = self.rows.write().map_err(|_| poisoned())?;
        rows.retain(|(c, _)| c.metadata.filename != filename);
        Ok(())
    }
}
