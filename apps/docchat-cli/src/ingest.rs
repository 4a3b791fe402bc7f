use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use docchat_core::config::Settings;
use docchat_core::data_processor::DataProcessor;
use docchat_core::traits::{ChunkStore, Embedder};
use docchat_embed::shared_embedder;
use docchat_vector::LanceChunkStore;

/// Chunk every `.txt`/`.md` file under `dir`, embed and store the chunks.
/// Files already in the store are replaced.
pub async fn run(settings: &Settings, dir: &Path, batch_size: usize) -> Result<usize> {
    let root = dir.to_path_buf();
    let chunks = tokio::task::spawn_blocking(move || DataProcessor::new().process_directory(&root))
        .await?
        .with_context(|| format!("reading {}", dir.display()))?;
    if chunks.is_empty() {
        warn!(dir = %dir.display(), "no .txt or .md files found");
        return Ok(0);
    }

    let store = LanceChunkStore::from_settings(&settings.store).await?;
    let files: BTreeSet<&str> = chunks.iter().map(|c| c.metadata.filename.as_str()).collect();
    for f in &files {
        store.delete_file(f).await?;
    }

    let embedder = shared_embedder(&settings.embedding).await?;
    let pb = ProgressBar::new(chunks.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")?
            .progress_chars("#>-"),
    );
    for batch in chunks.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let e = Arc::clone(&embedder);
        let vectors = tokio::task::spawn_blocking(move || e.embed_batch(&texts)).await??;
        store.add(batch, &vectors).await?;
        pb.inc(batch.len() as u64);
    }
    pb.finish_with_message("stored");
    info!(files = files.len(), chunks = chunks.len(), "ingest complete");
    Ok(chunks.len())
}
