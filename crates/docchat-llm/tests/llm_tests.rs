use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use docchat_core::types::ConversationTurn;
use docchat_llm::{AnswerStreamer, ChatMessage, FragmentStream, LanguageModel, LlmError, MessageRole, Prompts, QueryRewriter};

/// Replies from a script and records what it was sent.
#[derive(Default)]
struct ScriptedModel {
    reply: String,
    fragments: Vec<Result<String, String>>,
    delay: Option<Duration>,
    seen: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedModel {
    fn calls(&self) -> usize { self.seen.lock().unwrap().len() }
    fn last(&self) -> Vec<ChatMessage> { self.seen.lock().unwrap().last().cloned().unwrap_or_default() }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, LlmError> {
        self.seen.lock().unwrap().push(messages);
        if let Some(d) = self.delay { tokio::time::sleep(d).await; }
        Ok(self.reply.clone())
    }

    async fn complete_streaming(&self, messages: Vec<ChatMessage>) -> Result<FragmentStream, LlmError> {
        self.seen.lock().unwrap().push(messages);
        let items: Vec<Result<String, LlmError>> = self
            .fragments
            .iter()
            .map(|f| f.clone().map_err(|message| LlmError::Streaming { message }))
            .collect();
        Ok(stream::iter(items).boxed())
    }
}

struct RefusingModel;

#[async_trait]
impl LanguageModel for RefusingModel {
    async fn complete(&self, _m: Vec<ChatMessage>) -> Result<String, LlmError> {
        Err(LlmError::Connection { message: "connection refused".into() })
    }
    async fn complete_streaming(&self, _m: Vec<ChatMessage>) -> Result<FragmentStream, LlmError> {
        Err(LlmError::Connection { message: "connection refused".into() })
    }
}

fn history() -> Vec<ConversationTurn> {
    vec![ConversationTurn::user("What is binary search?"), ConversationTurn::assistant("A search that halves the range.")]
}

fn rewriter(model: Arc<dyn LanguageModel>, timeout: Duration) -> QueryRewriter {
    QueryRewriter::new(model, Arc::new(Prompts::default()), timeout)
}

#[tokio::test]
async fn empty_history_skips_the_model() {
    let model = Arc::new(ScriptedModel { reply: "unused".into(), ..Default::default() });
    let q = rewriter(model.clone(), Duration::from_secs(5)).rewrite(&[], "What is a heap?").await.unwrap();
    assert_eq!(q, "What is a heap?");
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn rewrite_sends_system_history_examples_then_message() {
    let model = Arc::new(ScriptedModel { reply: "  Binary search time complexity \n".into(), ..Default::default() });
    let q = rewriter(model.clone(), Duration::from_secs(5)).rewrite(&history(), "And its complexity?").await.unwrap();
    assert_eq!(q, "Binary search time complexity");

    let sent = model.last();
    let examples = Prompts::default().query_transform_examples.len();
    assert_eq!(sent.len(), 1 + 2 + 2 * examples + 1);
    assert_eq!(sent[0].role, MessageRole::System);
    assert_eq!(sent[1].content, "What is binary search?");
    assert_eq!(sent[2].role, MessageRole::Assistant);
    assert_eq!(sent[3].role, MessageRole::User);
    assert_eq!(sent.last().map(|m| m.content.as_str()), Some("And its complexity?"));
}

#[tokio::test]
async fn blank_rewrite_is_a_failure() {
    let model = Arc::new(ScriptedModel { reply: " \n".into(), ..Default::default() });
    let err = rewriter(model, Duration::from_secs(5)).rewrite(&history(), "And then?").await.unwrap_err();
    assert!(matches!(err, LlmError::EmptyResponse));
}

#[tokio::test]
async fn slow_rewrite_times_out() {
    let model = Arc::new(ScriptedModel { reply: "late".into(), delay: Some(Duration::from_millis(500)), ..Default::default() });
    let err = rewriter(model, Duration::from_millis(20)).rewrite(&history(), "And then?").await.unwrap_err();
    assert!(matches!(err, LlmError::Timeout { .. }));
}

#[tokio::test]
async fn model_error_surfaces_from_rewrite() {
    let err = rewriter(Arc::new(RefusingModel), Duration::from_secs(5)).rewrite(&history(), "And then?").await.unwrap_err();
    assert!(matches!(err, LlmError::Connection { .. }));
}

#[tokio::test]
async fn answer_stream_drops_empty_fragments_and_embeds_context() {
    let model = Arc::new(ScriptedModel {
        fragments: vec![Ok("Binary".into()), Ok(String::new()), Ok(" search".into()), Ok(String::new())],
        ..Default::default()
    });
    let streamer = AnswerStreamer::new(model.clone(), Arc::new(Prompts::default()));
    let out: Vec<String> = streamer
        .stream("CTX-MARKER", &history(), "Explain it")
        .map(|r| r.unwrap())
        .collect()
        .await;
    assert_eq!(out, ["Binary", " search"]);

    let sent = model.last();
    assert_eq!(sent.len(), 4);
    assert!(sent[0].content.contains("CTX-MARKER"));
    assert_eq!(sent[3], ChatMessage::user("Explain it"));
}

#[tokio::test]
async fn answer_stream_keeps_fragments_before_an_error() {
    let model = Arc::new(ScriptedModel {
        fragments: vec![Ok("partial".into()), Err("socket closed".into())],
        ..Default::default()
    });
    let streamer = AnswerStreamer::new(model, Arc::new(Prompts::default()));
    let out: Vec<Result<String, LlmError>> = streamer.stream("ctx", &[], "q").collect().await;
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].as_deref().ok(), Some("partial"));
    assert!(matches!(&out[1], Err(LlmError::Streaming { .. })));
}

#[tokio::test]
async fn answer_stream_reports_start_failure_as_first_item() {
    let streamer = AnswerStreamer::new(Arc::new(RefusingModel), Arc::new(Prompts::default()));
    let out: Vec<Result<String, LlmError>> = streamer.stream("ctx", &[], "q").collect().await;
    assert!(matches!(out.as_slice(), [Err(LlmError::Connection { .. })]));
}
