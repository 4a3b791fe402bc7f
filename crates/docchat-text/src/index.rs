use anyhow::Result;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, Value};
use tantivy::{doc, Index, IndexReader, TantivyDocument};
use tracing::{debug, warn};

use docchat_core::types::Chunk;

use crate::tantivy_utils::{build_schema, register_tokenizer};

const WRITER_HEAP_BYTES: usize = 50_000_000;

/// BM25 keyword ranker over a fixed set of chunks, held in RAM.
///
/// The scope is frozen at build time; build a new ranker when the set of
/// visible chunks changes.
pub struct KeywordRanker {
	index: Index,
	reader: IndexReader,
	ord_field: Field,
	text_field: Field,
	chunks: Vec<Chunk>,
}

impl KeywordRanker {
	pub fn build(chunks: Vec<Chunk>) -> Result<Self> {
		let schema = build_schema();
		let index = Index::create_in_ram(schema.clone());
		register_tokenizer(&index);
		let ord_field = schema.get_field("ord")?;
		let text_field = schema.get_field("text")?;

		let mut index_writer = index.writer_with_num_threads(1, WRITER_HEAP_BYTES)?;
		for (ord, c) in chunks.iter().enumerate() {
			index_writer.add_document(doc!(
				ord_field => ord as u64,
				text_field => c.text.clone(),
			))?;
		}
		index_writer.commit()?;
		let reader = index.reader()?;
		debug!(chunks = chunks.len(), "keyword ranker built");
		Ok(Self { index, reader, ord_field, text_field, chunks })
	}

	pub fn len(&self) -> usize { self.chunks.len() }

	pub fn is_empty(&self) -> bool { self.chunks.is_empty() }

	/// Top `k` chunks for `query`, best first. Query syntax errors are
	/// tolerated; the parseable remainder is still searched.
	pub fn search(&self, query: &str, k: usize) -> Result<Vec<Chunk>> {
		if k == 0 || self.chunks.is_empty() { return Ok(vec![]); }
		let searcher = self.reader.searcher();
		let qp = QueryParser::for_index(&self.index, vec![self.text_field]);
		let (q, errors) = qp.parse_query_lenient(query);
		if !errors.is_empty() { warn!(query, errors = errors.len(), "keyword query partially parsed"); }
		let top_docs = searcher.search(&q, &TopDocs::with_limit(k))?;
		let mut hits = Vec::with_capacity(top_docs.len());
		for (score, addr) in top_docs {
			let doc: TantivyDocument = searcher.doc(addr)?;
			let Some(ord) = doc.get_first(self.ord_field).and_then(|v| v.as_u64()) else { continue };
			if let Some(chunk) = self.chunks.get(ord as usize) {
				debug!(score, id = %chunk.id, "keyword hit");
				hits.push(chunk.clone());
			}
		}
		Ok(hits)
	}
}
