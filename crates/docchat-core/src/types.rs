//! Domain types shared by the retrieval and generation crates.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub type ChunkId = String;

/// Metadata attached to a chunk at ingestion time.
///
/// - `source_path`: original path of the uploaded file
/// - `filename`: user-facing file name; the unit that retrieval filters select
/// - `page_number`: page the chunk came from, when the loader knows it
/// - `title`/`section`/`subsection`: markdown header hierarchy above the chunk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source_path: String,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subsection: Option<String>,
}

/// A retrievable unit of document text. Immutable once indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// A chunk plus the score the reranker gave it for one query.
///
/// `relevance_score` is `None` when the chunk reached the caller without
/// passing through the reranker (degraded retrieval).
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub relevance_score: Option<f32>,
}

impl ScoredChunk {
    pub fn new(chunk: Chunk, relevance_score: f32) -> Self {
        Self { chunk, relevance_score: Some(relevance_score) }
    }

    pub fn unscored(chunk: Chunk) -> Self {
        Self { chunk, relevance_score: None }
    }
}

/// Restricts retrieval to chunks whose `filename` is in the set.
/// An empty set means no restriction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RetrievalFilter {
    filenames: BTreeSet<String>,
}

impl RetrievalFilter {
    pub fn all() -> Self { Self::default() }

    pub fn from_filenames<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { filenames: names.into_iter().map(Into::into).collect() }
    }

    pub fn is_unrestricted(&self) -> bool { self.filenames.is_empty() }

    pub fn filenames(&self) -> impl Iterator<Item = &str> { self.filenames.iter().map(String::as_str) }

    pub fn allows(&self, chunk: &Chunk) -> bool {
        self.is_unrestricted() || self.filenames.contains(&chunk.metadata.filename)
    }
}

impl From<Option<Vec<String>>> for RetrievalFilter {
    fn from(selected: Option<Vec<String>>) -> Self {
        selected.map(Self::from_filenames).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self { Self { role: Role::User, content: content.into() } }
    pub fn assistant(content: impl Into<String>) -> Self { Self { role: Role::Assistant, content: content.into() } }
}

pub type ConversationHistory = Vec<ConversationTurn>;

/// Per-response view of a selected chunk, sent to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    #[serde(rename = "source")]
    pub filename: String,
    #[serde(rename = "display")]
    pub display_label: String,
    #[serde(rename = "content")]
    pub content_preview: String,
}

/// One line of the outbound answer stream.
///
/// At most one `Sources` event is sent, before any `Content`. An `Error`
/// ends the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum StreamEvent {
    Sources(Vec<SourceRecord>),
    Content(String),
    Error(String),
}

/// Inbound chat request as received from the transport.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: ConversationHistory,
    #[serde(default, alias = "selectedFiles")]
    pub selected_files: Option<Vec<String>>,
}

impl ChatRequest {
    pub fn filter(&self) -> RetrievalFilter { RetrievalFilter::from(self.selected_files.clone()) }
}
