use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use docchat_chat::{
    ChatPipeline, RetrievalOrchestrator, DEFAULT_THRESHOLD, KNOWLEDGE_BASE_EMPTY, NO_RELEVANT_INFORMATION,
};
use docchat_core::config::RetrievalSettings;
use docchat_core::traits::{ChunkStore, Embedder, Reranker};
use docchat_core::types::{ChatRequest, Chunk, ChunkMetadata, ConversationTurn, RetrievalFilter, StreamEvent};
use docchat_embed::{FakeEmbedder, FAKE_DIM};
use docchat_hybrid::{HybridSearch, RankerCache};
use docchat_llm::{AnswerStreamer, ChatMessage, FragmentStream, LanguageModel, LlmError, Prompts, QueryRewriter};
use docchat_vector::MemoryChunkStore;

/// 0.85 for passages mentioning "binary tree" when the query does too, 0.2 otherwise.
#[derive(Default)]
struct TopicReranker {
    queries: Mutex<Vec<String>>,
}

impl TopicReranker {
    fn calls(&self) -> usize { self.queries.lock().unwrap().len() }
}

impl Reranker for TopicReranker {
    fn score(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>> {
        self.queries.lock().unwrap().push(query.to_string());
        let q = query.to_lowercase().contains("binary tree");
        Ok(passages.iter().map(|p| if q && p.to_lowercase().contains("binary tree") { 0.85 } else { 0.2 }).collect())
    }
}

struct FailingReranker;

impl Reranker for FailingReranker {
    fn score(&self, _q: &str, _p: &[&str]) -> Result<Vec<f32>> { Err(anyhow!("reranker service down")) }
}

struct Guard(Arc<AtomicBool>);

impl Drop for Guard {
    fn drop(&mut self) { self.0.store(true, Ordering::SeqCst); }
}

enum Answer {
    Fragments(Vec<Result<&'static str, &'static str>>),
    /// Never finishes; flips the flag when the stream is dropped.
    Hang(Arc<AtomicBool>),
}

struct ScriptedModel {
    rewrite: Result<&'static str, &'static str>,
    answer: Answer,
    completes: AtomicUsize,
}

impl ScriptedModel {
    fn new(rewrite: Result<&'static str, &'static str>, answer: Answer) -> Self {
        Self { rewrite, answer, completes: AtomicUsize::new(0) }
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, _messages: Vec<ChatMessage>) -> Result<String, LlmError> {
        self.completes.fetch_add(1, Ordering::SeqCst);
        self.rewrite.map(str::to_string).map_err(|m| LlmError::ApiRequest { message: m.to_string() })
    }

    async fn complete_streaming(&self, _messages: Vec<ChatMessage>) -> Result<FragmentStream, LlmError> {
        match &self.answer {
            Answer::Fragments(items) => {
                let items: Vec<Result<String, LlmError>> = items
                    .iter()
                    .copied()
                    .map(|r| r.map(str::to_string).map_err(|m| LlmError::Streaming { message: m.to_string() }))
                    .collect();
                Ok(stream::iter(items).boxed())
            }
            Answer::Hang(flag) => {
                let guard = Guard(Arc::clone(flag));
                let first = stream::iter(vec![Ok("thinking".to_string())]);
                let rest = stream::pending::<Result<String, LlmError>>().map(move |item| {
                    let _held = &guard;
                    item
                });
                Ok(first.chain(rest).boxed())
            }
        }
    }
}

/// Lists fine, fails every search.
struct BrokenSearchStore(MemoryChunkStore);

#[async_trait]
impl ChunkStore for BrokenSearchStore {
    async fn similarity_search(&self, _v: &[f32], _k: usize, _f: &RetrievalFilter) -> Result<Vec<Chunk>> {
        Err(anyhow!("vector index offline"))
    }
    async fn list_all(&self, f: &RetrievalFilter) -> Result<Vec<Chunk>> { self.0.list_all(f).await }
    async fn add(&self, c: &[Chunk], e: &[Vec<f32>]) -> Result<()> { self.0.add(c, e).await }
    async fn delete_file(&self, f: &str) -> Result<()> { self.0.delete_file(f).await }
}

async fn seeded<S: ChunkStore>(store: S) -> S {
    let chunks = vec![
        Chunk {
            id: "trees.pdf:0".into(),
            text: "A binary tree is a tree in which each node has at most two children.".into(),
            metadata: ChunkMetadata {
                source_path: "/uploads/trees.pdf".into(),
                filename: "trees.pdf".into(),
                page_number: Some(3),
                section: Some("Binary trees".into()),
                ..Default::default()
            },
        },
        Chunk {
            id: "graphs.pdf:0".into(),
            text: "A graph consists of vertices and edges.".into(),
            metadata: ChunkMetadata { source_path: "/uploads/graphs.pdf".into(), filename: "graphs.pdf".into(), ..Default::default() },
        },
    ];
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = FakeEmbedder::new(FAKE_DIM).embed_batch(&texts).unwrap();
    store.add(&chunks, &vectors).await.unwrap();
    store
}

fn pipeline(store: Arc<dyn ChunkStore>, reranker: Arc<dyn Reranker>, llm: Arc<dyn LanguageModel>) -> Arc<ChatPipeline> {
    let search = Arc::new(HybridSearch::with_cache(
        store,
        Arc::new(FakeEmbedder::new(FAKE_DIM)),
        reranker,
        RetrievalSettings::default(),
        Arc::new(RankerCache::new(4)),
    ));
    let prompts = Arc::new(Prompts::default());
    let rewriter = Arc::new(QueryRewriter::new(Arc::clone(&llm), Arc::clone(&prompts), Duration::from_secs(5)));
    let orchestrator = RetrievalOrchestrator::new(search, rewriter, DEFAULT_THRESHOLD);
    Arc::new(ChatPipeline::new(orchestrator, AnswerStreamer::new(llm, prompts)))
}

fn request(message: &str, history: Vec<ConversationTurn>) -> ChatRequest {
    ChatRequest { message: message.into(), history, selected_files: None }
}

fn follow_up_history() -> Vec<ConversationTurn> {
    vec![ConversationTurn::user("Tell me about trees."), ConversationTurn::assistant("Trees are hierarchical structures.")]
}

fn answer(parts: &[&'static str]) -> Answer { Answer::Fragments(parts.iter().map(|p| Ok(*p)).collect()) }

fn assert_sources_first(events: &[StreamEvent]) {
    let sources: Vec<usize> = events.iter().enumerate().filter(|(_, e)| matches!(e, StreamEvent::Sources(_))).map(|(i, _)| i).collect();
    assert!(sources.len() <= 1);
    if let Some(&at) = sources.first() {
        assert!(events[..at].iter().all(|e| !matches!(e, StreamEvent::Content(_))));
    }
}

#[tokio::test]
async fn empty_index_yields_knowledge_base_empty() {
    let llm = Arc::new(ScriptedModel::new(Ok("unused"), answer(&["unused"])));
    let p = pipeline(Arc::new(MemoryChunkStore::new()), Arc::new(TopicReranker::default()), llm);
    let events: Vec<StreamEvent> = p.stream(request("What is a binary tree?", vec![])).collect().await;
    assert_eq!(events, vec![StreamEvent::Content(KNOWLEDGE_BASE_EMPTY.to_string())]);
}

#[tokio::test]
async fn filter_with_no_matching_files_yields_knowledge_base_empty() {
    let llm = Arc::new(ScriptedModel::new(Ok("unused"), answer(&["unused"])));
    let p = pipeline(Arc::new(seeded(MemoryChunkStore::new()).await), Arc::new(TopicReranker::default()), llm);
    let mut req = request("What is a binary tree?", vec![]);
    req.selected_files = Some(vec!["other.pdf".into()]);
    let events: Vec<StreamEvent> = p.stream(req).collect().await;
    assert_eq!(events, vec![StreamEvent::Content(KNOWLEDGE_BASE_EMPTY.to_string())]);
}

#[tokio::test]
async fn relevant_chunk_yields_sources_then_content() {
    let llm = Arc::new(ScriptedModel::new(Ok("unused"), answer(&["A binary tree ", "", "has two children."])));
    let reranker = Arc::new(TopicReranker::default());
    let p = pipeline(Arc::new(seeded(MemoryChunkStore::new()).await), reranker.clone(), llm.clone());
    let events: Vec<StreamEvent> = p.stream(request("What is a binary tree?", vec![])).collect().await;

    assert_sources_first(&events);
    let StreamEvent::Sources(sources) = &events[0] else { panic!("expected sources first, got {:?}", events[0]) };
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].filename, "trees.pdf");
    assert_eq!(sources[0].display_label, "Binary trees (p.3)");
    assert_eq!(
        &events[1..],
        &[StreamEvent::Content("A binary tree ".into()), StreamEvent::Content("has two children.".into())]
    );
    assert_eq!(llm.completes.load(Ordering::SeqCst), 0, "no rewrite without history");
    assert_eq!(reranker.queries.lock().unwrap().as_slice(), ["What is a binary tree?"]);
}

#[tokio::test]
async fn empty_rewritten_result_falls_back_to_original_message() {
    let llm = Arc::new(ScriptedModel::new(Ok("Define the structure mentioned earlier"), answer(&["Answer."])));
    let reranker = Arc::new(TopicReranker::default());
    let p = pipeline(Arc::new(seeded(MemoryChunkStore::new()).await), reranker.clone(), llm.clone());
    let events: Vec<StreamEvent> = p.stream(request("What is a binary tree?", follow_up_history())).collect().await;

    assert_eq!(llm.completes.load(Ordering::SeqCst), 1);
    assert_eq!(
        reranker.queries.lock().unwrap().as_slice(),
        ["Define the structure mentioned earlier", "What is a binary tree?"]
    );
    let StreamEvent::Sources(sources) = &events[0] else { panic!("expected sources first") };
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].filename, "trees.pdf");
    assert_eq!(events[1..], [StreamEvent::Content("Answer.".into())]);
}

#[tokio::test]
async fn no_fallback_when_rewrite_fails() {
    let llm = Arc::new(ScriptedModel::new(Err("model offline"), answer(&["unused"])));
    let reranker = Arc::new(TopicReranker::default());
    let p = pipeline(Arc::new(seeded(MemoryChunkStore::new()).await), reranker.clone(), llm);
    let events: Vec<StreamEvent> = p.stream(request("Which one is faster?", follow_up_history())).collect().await;
    assert_eq!(reranker.calls(), 1);
    assert_eq!(events, vec![StreamEvent::Content(NO_RELEVANT_INFORMATION.to_string())]);
}

#[tokio::test]
async fn no_fallback_when_rewrite_is_unchanged() {
    let llm = Arc::new(ScriptedModel::new(Ok("  Which one is faster? "), answer(&["unused"])));
    let reranker = Arc::new(TopicReranker::default());
    let p = pipeline(Arc::new(seeded(MemoryChunkStore::new()).await), reranker.clone(), llm);
    let events: Vec<StreamEvent> = p.stream(request("Which one is faster?", follow_up_history())).collect().await;
    assert_eq!(reranker.calls(), 1);
    assert_eq!(events, vec![StreamEvent::Content(NO_RELEVANT_INFORMATION.to_string())]);
}

#[tokio::test]
async fn reranker_failure_is_not_an_error_event() {
    let llm = Arc::new(ScriptedModel::new(Ok("unused"), answer(&["unused"])));
    let p = pipeline(Arc::new(seeded(MemoryChunkStore::new()).await), Arc::new(FailingReranker), llm);
    let events: Vec<StreamEvent> = p.stream(request("What is a binary tree?", vec![])).collect().await;
    assert!(events.iter().all(|e| !matches!(e, StreamEvent::Error(_))));
    // unscored semantic results cannot clear the threshold
    assert_eq!(events, vec![StreamEvent::Content(NO_RELEVANT_INFORMATION.to_string())]);
}

#[tokio::test]
async fn generation_failure_keeps_partial_content() {
    let llm = Arc::new(ScriptedModel::new(
        Ok("unused"),
        Answer::Fragments(vec![Ok("first"), Ok("second"), Err("connection reset"), Ok("never")]),
    ));
    let p = pipeline(Arc::new(seeded(MemoryChunkStore::new()).await), Arc::new(TopicReranker::default()), llm);
    let events: Vec<StreamEvent> = p.stream(request("What is a binary tree?", vec![])).collect().await;

    assert_sources_first(&events);
    assert_eq!(events.len(), 4);
    assert_eq!(events[1], StreamEvent::Content("first".into()));
    assert_eq!(events[2], StreamEvent::Content("second".into()));
    let StreamEvent::Error(msg) = &events[3] else { panic!("expected error last") };
    assert!(msg.starts_with("Generation failed:"));
    assert!(msg.contains("connection reset"));
}

#[tokio::test]
async fn store_failure_becomes_server_error_event() {
    let llm = Arc::new(ScriptedModel::new(Ok("unused"), answer(&["unused"])));
    let store = seeded(BrokenSearchStore(MemoryChunkStore::new())).await;
    let p = pipeline(Arc::new(store), Arc::new(TopicReranker::default()), llm);
    let events: Vec<StreamEvent> = p.stream(request("What is a binary tree?", vec![])).collect().await;
    assert_eq!(events.len(), 1);
    let StreamEvent::Error(msg) = &events[0] else { panic!("expected error event") };
    assert!(msg.starts_with("Server Error:"));
    assert!(msg.contains("vector index offline"));
}

#[tokio::test]
async fn dropping_the_stream_releases_the_model_stream() {
    let released = Arc::new(AtomicBool::new(false));
    let llm = Arc::new(ScriptedModel::new(Ok("unused"), Answer::Hang(Arc::clone(&released))));
    let p = pipeline(Arc::new(seeded(MemoryChunkStore::new()).await), Arc::new(TopicReranker::default()), llm);
    let mut events = p.stream(request("What is a binary tree?", vec![]));
    assert!(matches!(events.next().await, Some(StreamEvent::Sources(_))));
    assert_eq!(events.next().await, Some(StreamEvent::Content("thinking".into())));
    drop(events);

    for _ in 0..100 {
        if released.load(Ordering::SeqCst) { return; }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("model stream was not dropped after the consumer went away");
}
