//! Process-wide model instances.
//!
//! Each model is constructed at most once, lazily, on a blocking thread. The
//! `OnceCell` serialises concurrent first use; a failed load is not cached,
//! so the next caller retries.
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::warn;

use docchat_core::config::EmbeddingSettings;
use docchat_core::traits::{Embedder, Reranker};

use crate::{get_default_embedder, CrossEncoder, UnloadedReranker};

static EMBEDDER: OnceCell<Arc<dyn Embedder>> = OnceCell::const_new();
static RERANKER: OnceCell<Arc<dyn Reranker>> = OnceCell::const_new();

pub async fn shared_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    let settings = settings.clone();
    EMBEDDER
        .get_or_try_init(|| async move {
            let embedder = tokio::task::spawn_blocking(move || get_default_embedder(&settings)).await??;
            Ok::<_, anyhow::Error>(Arc::from(embedder))
        })
        .await
        .cloned()
}

/// The shared cross-encoder. If it cannot be loaded, an `UnloadedReranker`
/// is returned (and not cached) so retrieval still works, unranked.
pub async fn shared_reranker(settings: &EmbeddingSettings) -> Arc<dyn Reranker> {
    let settings = settings.clone();
    let loaded = RERANKER
        .get_or_try_init(|| async move {
            let model = tokio::task::spawn_blocking(move || CrossEncoder::from_settings(&settings)).await??;
            Ok::<Arc<dyn Reranker>, anyhow::Error>(Arc::new(model))
        })
        .await;
    match loaded {
        Ok(r) => Arc::clone(r),
        Err(e) => {
            warn!(error = %e, "reranker failed to load");
            Arc::new(UnloadedReranker::new(e.to_string()))
        }
    }
}
