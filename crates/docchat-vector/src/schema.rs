use anyhow::{anyhow, Result};
use arrow_array::{Array, FixedSizeListArray, Int32Array, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

use docchat_core::types::{Chunk, ChunkMetadata};

pub fn build_chunk_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("id", DataType::Utf8, false),
		Field::new("text", DataType::Utf8, false),
		Field::new("source_path", DataType::Utf8, false),
		Field::new("filename", DataType::Utf8, false),
		Field::new("page_number", DataType::Int32, true),
		Field::new("title", DataType::Utf8, true),
		Field::new("section", DataType::Utf8, true),
		Field::new("subsection", DataType::Utf8, true),
		Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
	]))
}

pub fn chunks_to_record_batch(chunks: &[Chunk], embeddings: &[Vec<f32>], dim: i32) -> Result<RecordBatch> {
	let mut ids = Vec::new(); let mut texts = Vec::new(); let mut paths = Vec::new(); let mut filenames = Vec::new();
	let mut pages: Vec<Option<i32>> = Vec::new(); let mut titles = Vec::new(); let mut sections = Vec::new(); let mut subsections = Vec::new();
	let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::new();
	for (c, v) in chunks.iter().zip(embeddings) {
		if v.len() != dim as usize { return Err(anyhow!("chunk {} has a {}-dim vector, table expects {}", c.id, v.len(), dim)); }
		ids.push(c.id.clone()); texts.push(c.text.clone());
		paths.push(c.metadata.source_path.clone()); filenames.push(c.metadata.filename.clone());
		pages.push(c.metadata.page_number.map(|p| p as i32));
		titles.push(c.metadata.title.clone()); sections.push(c.metadata.section.clone()); subsections.push(c.metadata.subsection.clone());
		vectors.push(Some(v.iter().map(|&x| Some(x)).collect()));
	}
	let batch = RecordBatch::try_new(build_chunk_schema(dim), vec![
		Arc::new(StringArray::from(ids)),
		Arc::new(StringArray::from(texts)),
		Arc::new(StringArray::from(paths)),
		Arc::new(StringArray::from(filenames)),
		Arc::new(Int32Array::from(pages)),
		Arc::new(StringArray::from(titles)),
		Arc::new(StringArray::from(sections)),
		Arc::new(StringArray::from(subsections)),
		Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors.into_iter(), dim)),
	])?;
	Ok(batch)
}

fn string_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
	batch
		.column_by_name(name)
		.and_then(|c| c.as_any().downcast_ref::<StringArray>())
		.ok_or_else(|| anyhow!("column '{}' missing or not utf8", name))
}

fn optional(col: &StringArray, i: usize) -> Option<String> {
	if col.is_null(i) { None } else { Some(col.value(i).to_string()).filter(|s| !s.is_empty()) }
}

pub fn chunks_from_batch(batch: &RecordBatch) -> Result<Vec<Chunk>> {
	let ids = string_col(batch, "id")?;
	let texts = string_col(batch, "text")?;
	let paths = string_col(batch, "source_path")?;
	let filenames = string_col(batch, "filename")?;
	let titles = string_col(batch, "title")?;
	let sections = string_col(batch, "section")?;
	let subsections = string_col(batch, "subsection")?;
	let pages = batch
		.column_by_name("page_number")
		.and_then(|c| c.as_any().downcast_ref::<Int32Array>())
		.ok_or_else(|| anyhow!("column 'page_number' missing or not int32"))?;
	let mut out = Vec::with_capacity(batch.num_rows());
	for i in 0..batch.num_rows() {
		out.push(Chunk {
			id: ids.value(i).to_string(),
			text: texts.value(i).to_string(),
			metadata: ChunkMetadata {
				source_path: paths.value(i).to_string(),
				filename: filenames.value(i).to_string(),
				page_number: if pages.is_null(i) { None } else { u32::try_from(pages.value(i)).ok() },
				title: optional(titles, i),
				section: optional(sections, i),
				subsection: optional(subsections, i),
			},
		});
	}
	Ok(out)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn record_batch_preserves_metadata() {
		let chunk = Chunk {
			id: "notes.pdf:0".into(),
			text: "A heap is a tree.".into(),
			metadata: ChunkMetadata {
				source_path: "/uploads/notes.pdf".into(),
				filename: "notes.pdf".into(),
				page_number: Some(4),
				section: Some("Heaps".into()),
				..Default::default()
			},
		};
		let batch = chunks_to_record_batch(std::slice::from_ref(&chunk), &[vec![0.5, 0.5]], 2).unwrap();
		assert_eq!(chunks_from_batch(&batch).unwrap(), vec![chunk]);
	}

	#[test]
	fn rejects_wrong_dimension() {
		let chunk = Chunk { id: "a".into(), text: "t".into(), metadata: ChunkMetadata::default() };
		assert!(chunks_to_record_batch(&[chunk], &[vec![1.0; 3]], 2).is_err());
	}
}
