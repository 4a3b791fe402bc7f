//! Thresholding retrieved chunks and turning them into source records.
use std::path::Path;
use tracing::debug;

use docchat_core::types::{Chunk, ScoredChunk, SourceRecord};

pub const DEFAULT_THRESHOLD: f32 = 0.7;

const PREVIEW_CHARS: usize = 500;
const FALLBACK_LABEL_WORDS: usize = 5;

fn non_empty(s: &Option<String>) -> Option<&str> {
    s.as_deref().filter(|s| !s.is_empty())
}

/// Most specific heading of the chunk, or the start of its text.
pub fn display_label(chunk: &Chunk) -> String {
    let m = &chunk.metadata;
    if let Some(h) = non_empty(&m.subsection).or_else(|| non_empty(&m.section)).or_else(|| non_empty(&m.title)) {
        return h.to_string();
    }
    let cleaned: String = chunk.text.chars().filter(|c| *c != '#' && *c != '*').collect();
    let words: Vec<&str> = cleaned.split_whitespace().take(FALLBACK_LABEL_WORDS).collect();
    format!("{}...", words.join(" "))
}

/// Keep chunks scoring at least `threshold`, in their given order. A missing
/// score counts as 0.0.
pub fn filter_by_threshold(chunks: Vec<ScoredChunk>, threshold: f32) -> Vec<ScoredChunk> {
    chunks
        .into_iter()
        .filter(|c| {
            let score = c.relevance_score.unwrap_or(0.0);
            let keep = score >= threshold;
            if !keep {
                debug!(label = %display_label(&c.chunk), score = format_args!("{score:.4}"), "dropped chunk");
            }
            keep
        })
        .collect()
}

fn source_filename(chunk: &Chunk) -> String {
    let from_path = Path::new(&chunk.metadata.source_path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .filter(|n| !n.is_empty());
    from_path
        .or_else(|| Some(chunk.metadata.filename.clone()).filter(|f| !f.is_empty()))
        .unwrap_or_else(|| "Unknown".to_string())
}

pub fn source_record(chunk: &Chunk) -> SourceRecord {
    let page = chunk.metadata.page_number.map_or_else(|| "N/A".to_string(), |p| p.to_string());
    SourceRecord {
        filename: source_filename(chunk),
        display_label: format!("{} (p.{})", display_label(chunk), page),
        content_preview: chunk.text.chars().take(PREVIEW_CHARS).map(|c| if c == '\n' { ' ' } else { c }).collect(),
    }
}

/// Chunk texts joined by a blank line, in the given order.
pub fn build_context(chunks: &[ScoredChunk]) -> String {
    chunks.iter().map(|c| c.chunk.text.as_str()).collect::<Vec<_>>().join("\n\n")
}
