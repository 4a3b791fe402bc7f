use anyhow::Result;
use arrow_array::{RecordBatch, RecordBatchIterator};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table};
use tracing::{debug, info};

use docchat_core::config::StoreSettings;
use docchat_core::config::expand_path;
use docchat_core::traits::ChunkStore;
use docchat_core::types::{Chunk, RetrievalFilter};

use crate::schema::{chunks_from_batch, chunks_to_record_batch};
use crate::table::{filename_predicate, open_db, open_if_exists, quote};

/// Chunks and their vectors in a single LanceDB table.
pub struct LanceChunkStore {
	conn: Connection,
	table: String,
}

impl LanceChunkStore {
	pub async fn open(uri: &str, table: &str) -> Result<Self> {
		let conn = open_db(uri).await?;
		Ok(Self { conn, table: table.to_string() })
	}

	pub async fn from_settings(settings: &StoreSettings) -> Result<Self> {
		let uri = expand_path(&settings.uri);
		Self::open(&uri.to_string_lossy(), &settings.table).await
	}

	async fn table(&self) -> Result<Option<Table>> {
		open_if_exists(&self.conn, &self.table).await
	}
}

async fn collect_chunks<S, E>(stream: S) -> Result<Vec<Chunk>>
where
	S: futures::Stream<Item = std::result::Result<RecordBatch, E>>,
	E: std::error::Error + Send + Sync + 'static,
{
	let batches: Vec<RecordBatch> = stream.try_collect().await?;
	let mut out = Vec::new();
	for b in &batches { out.extend(chunks_from_batch(b)?); }
	Ok(out)
}

#[async_trait]
impl ChunkStore for LanceChunkStore {
	async fn similarity_search(&self, query_vec: &[f32], k: usize, filter: &RetrievalFilter) -> Result<Vec<Chunk>> {
		let Some(table) = self.table().await? else { return Ok(Vec::new()) };
		if k == 0 { return Ok(Vec::new()); }
		let mut query = table.vector_search(query_vec.to_vec())?.distance_type(DistanceType::Cosine).limit(k);
		if let Some(pred) = filename_predicate(filter.filenames()) { query = query.only_if(pred); }
		let hits = collect_chunks(query.execute().await?).await?;
		debug!(k, hits = hits.len(), "vector search");
		Ok(hits)
	}

	async fn list_all(&self, filter: &RetrievalFilter) -> Result<Vec<Chunk>> {
		let Some(table) = self.table().await? else { return Ok(Vec::new()) };
		let pred = filename_predicate(filter.filenames());
		let n = table.count_rows(pred.clone()).await?;
		if n == 0 { return Ok(Vec::new()); }
		let mut query = table.query().limit(n);
		if let Some(pred) = pred { query = query.only_if(pred); }
		collect_chunks(query.execute().await?).await
	}

	async fn add(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()> {
		if chunks.is_empty() { return Ok(()); }
		anyhow::ensure!(chunks.len() == embeddings.len(), "{} chunks but {} embeddings", chunks.len(), embeddings.len());
		let dim = embeddings[0].len() as i32;
		let batch = chunks_to_record_batch(chunks, embeddings, dim)?;
		let schema = batch.schema();
		let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
		match self.table().await? {
			Some(table) => { table.add(reader).execute().await?; }
			None => { self.conn.create_table(&self.table, reader).execute().await?; }
		}
		info!(table = %self.table, added = chunks.len(), "chunks stored");
		Ok(())
	}

	async fn delete_file(&self, filename: &str) -> Result<()> {
		let Some(table) = self.table().await? else { return Ok(()) };
		table.delete(&format!("filename = {}", quote(filename))).await?;
		info!(table = %self.table, filename, "file deleted");
		Ok(())
	}
}
