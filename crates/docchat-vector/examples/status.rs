use docchat_core::config::Config;
use docchat_core::traits::ChunkStore;
use docchat_core::types::RetrievalFilter;
use docchat_vector::LanceChunkStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Config::load()?.settings()?;
    let store = LanceChunkStore::from_settings(&settings.store).await?;
    let chunks = store.list_all(&RetrievalFilter::all()).await?;
    let files = store.list_files().await?;
    println!("table {}: chunks={} files={}", settings.store.table, chunks.len(), files.len());
    for f in files {
        let n = chunks.iter().filter(|c| c.metadata.filename == f).count();
        println!("  {f}: {n}");
    }
    Ok(())
}
