//! Plain-text and markdown chunker used by the `ingest` command.
//!
//! Splits files on blank lines, carries the enclosing markdown headers
//! (`#`, `##`, `###`) into `title`/`section`/`subsection`, and breaks long
//! paragraphs into overlapping word windows.
use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::types::{Chunk, ChunkMetadata};

#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    pub max_tokens: usize,
    pub overlap_percent: f32,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { max_tokens: 500, overlap_percent: 0.2 }
    }
}

#[derive(Default)]
pub struct DataProcessor {
    chunking_config: ChunkingConfig,
}

#[derive(Default, Clone)]
struct Headers {
    title: Option<String>,
    section: Option<String>,
    subsection: Option<String>,
}

impl Headers {
    /// Returns true when `line` was a header and has been absorbed.
    fn absorb(&mut self, line: &str) -> bool {
        let trimmed = line.trim_start();
        let level = trimmed.chars().take_while(|c| *c == '#').count();
        if level == 0 || level > 3 || !trimmed[level..].starts_with(' ') {
            return false;
        }
        let text = trimmed[level..].trim().to_string();
        match level {
            1 => { self.title = Some(text); self.section = None; self.subsection = None; }
            2 => { self.section = Some(text); self.subsection = None; }
            _ => self.subsection = Some(text),
        }
        true
    }
}

impl DataProcessor {
    pub fn new() -> Self { Self::default() }

    pub fn with_config(chunking_config: ChunkingConfig) -> Self { Self { chunking_config } }

    pub fn process_directory(&self, data_dir: &Path) -> Result<Vec<Chunk>> {
        let files = self.list_text_files(data_dir);
        if files.is_empty() {
            info!(dir = %data_dir.display(), "no .txt or .md files found");
            return Ok(vec![]);
        }
        let mut all_chunks = Vec::new();
        for (file_index, file_path) in files.iter().enumerate() {
            debug!("Processing file {}/{}: {}", file_index + 1, files.len(), file_path.display());
            all_chunks.extend(self.process_file(file_path)?);
        }
        info!("Processed {} files into {} chunks", files.len(), all_chunks.len());
        Ok(all_chunks)
    }

    pub fn process_file(&self, file_path: &Path) -> Result<Vec<Chunk>> {
        let content = self.read_file_content(file_path)?;
        let filename = file_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| file_path.to_string_lossy().to_string());
        Ok(self.chunk_content(&content, &filename, file_path))
    }

    fn read_file_content(&self, file_path: &Path) -> Result<String> {
        match fs::read_to_string(file_path) {
            Ok(content) => Ok(content),
            Err(_) => Ok(String::from_utf8_lossy(&fs::read(file_path)?).to_string()),
        }
    }

    pub fn chunk_content(&self, content: &str, filename: &str, file_path: &Path) -> Vec<Chunk> {
        let mut headers = Headers::default();
        let mut chunks = Vec::new();
        for paragraph in content.split("\n\n") {
            let body: Vec<&str> = paragraph.lines().filter(|line| !headers.absorb(line)).collect();
            let body = body.join("\n");
            let body = body.trim();
            if body.is_empty() { continue; }
            let pieces = if self.count_tokens(body) <= self.chunking_config.max_tokens {
                vec![body.to_string()]
            } else {
                self.split_paragraph_with_overlap(body)
            };
            for text in pieces {
                let metadata = ChunkMetadata {
                    source_path: file_path.to_string_lossy().to_string(),
                    filename: filename.to_string(),
                    page_number: None,
                    title: headers.title.clone(),
                    section: headers.section.clone(),
                    subsection: headers.subsection.clone(),
                };
                chunks.push(Chunk { id: format!("{}:{}", filename, chunks.len()), text, metadata });
            }
        }
        chunks
    }

    fn count_tokens(&self, text: &str) -> usize { let word_count = text.split_whitespace().count(); (word_count as f32 / 0.75) as usize }

    fn split_paragraph_with_overlap(&self, paragraph: &str) -> Vec<String> {
        let words: Vec<&str> = paragraph.split_whitespace().collect();
        let words_per_chunk = 300; let overlap_words = (words_per_chunk as f32 * self.chunking_config.overlap_percent) as usize;
        let mut chunks = Vec::new(); let mut start = 0;
        while start < words.len() {
            let end = (start + words_per_chunk).min(words.len());
            chunks.push(words[start..end].join(" "));
            if end >= words.len() { break; }
            start = end - overlap_words;
        }
        chunks
    }

    fn list_text_files(&self, root: &Path) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(root).into_iter().filter_map(|e| e.ok()).filter(|e| e.file_type().is_file()) {
            let path = entry.path();
            if matches!(path.extension().and_then(|s| s.to_str()), Some("txt" | "md")) { files.push(path.to_path_buf()); }
        }
        files.sort(); files
    }
}
