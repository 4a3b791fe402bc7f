//! Chat model interface and the Ollama implementation.
use async_trait::async_trait;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::fmt::Display;
use std::time::Duration;
use tracing::{debug, info, warn};

use docchat_core::config::LlmSettings;

use crate::error::LlmError;
use crate::message::ChatMessage;

pub type FragmentStream = BoxStream<'static, Result<String, LlmError>>;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// One full, non-streaming completion.
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, LlmError>;

    /// Completion delivered as text fragments in arrival order. Dropping the
    /// stream abandons the request.
    async fn complete_streaming(&self, messages: Vec<ChatMessage>) -> Result<FragmentStream, LlmError>;
}

/// Client for Ollama's native `/api/chat` endpoint.
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f32,
    keep_alive: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelStatus {
    Available,
    Pulled,
}

#[derive(Debug, Deserialize)]
struct ChatLine {
    #[serde(default)]
    message: Option<LineMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LineMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct TagList {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

/// Accepts both `http://host:11434` and the OpenAI-style `http://host:11434/v1`.
fn normalize_base_url(url: &str) -> String {
    let url = url.trim_end_matches('/');
    url.strip_suffix("/v1").unwrap_or(url).to_string()
}

impl OllamaClient {
    pub fn new(settings: &LlmSettings) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| LlmError::Connection { message: format!("Failed to build HTTP client: {e}") })?;
        Ok(Self {
            http,
            base_url: normalize_base_url(&settings.base_url),
            model: settings.model.clone(),
            temperature: settings.temperature,
            keep_alive: settings.keep_alive.clone(),
        })
    }

    pub fn model(&self) -> &str { &self.model }

    fn chat_body(&self, messages: &[ChatMessage], stream: bool) -> serde_json::Value {
        json!({
            "model": self.model,
            "messages": messages,
            "stream": stream,
            "keep_alive": self.keep_alive,
            "options": { "temperature": self.temperature },
        })
    }

    async fn post_chat(&self, messages: &[ChatMessage], stream: bool) -> Result<reqwest::Response, LlmError> {
        let url = format!("{}/api/chat", self.base_url);
        debug!(url = %url, model = %self.model, stream, messages = messages.len(), "sending chat request");
        let response = self
            .http
            .post(&url)
            .json(&self.chat_body(messages, stream))
            .send()
            .await
            .map_err(LlmError::from_reqwest)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiRequest { message: format!("HTTP {status}: {body}") });
        }
        Ok(response)
    }

    pub async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self.http.get(&url).send().await.map_err(LlmError::from_reqwest)?;
        let tags: TagList = response.json().await.map_err(LlmError::from_reqwest)?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    /// Pull the configured model unless it (or its `:latest` tag) is present.
    pub async fn ensure_model(&self) -> Result<ModelStatus, LlmError> {
        let existing = self.list_models().await?;
        let latest = format!("{}:latest", self.model);
        if existing.iter().any(|m| *m == self.model || *m == latest) {
            info!(model = %self.model, "model already available");
            return Ok(ModelStatus::Available);
        }
        info!(model = %self.model, "model not found, pulling");
        let url = format!("{}/api/pull", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&json!({ "name": self.model, "stream": false }))
            .send()
            .await
            .map_err(LlmError::from_reqwest)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(model = %self.model, %status, "model pull failed");
            return Err(LlmError::ApiRequest { message: format!("pull failed, HTTP {status}: {body}") });
        }
        info!(model = %self.model, "model pulled");
        Ok(ModelStatus::Pulled)
    }
}

fn decode_line(line: &[u8]) -> Result<Option<ChatLine>, LlmError> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() { return Ok(None); }
    serde_json::from_str(text)
        .map(Some)
        .map_err(|e| LlmError::ResponseParse { message: format!("Invalid stream line: {e}") })
}

struct LineState<S> {
    inner: S,
    buf: Vec<u8>,
    finished: bool,
}

/// Turns an NDJSON byte stream of chat chunks into content fragments. Ends
/// after the `done` line, the first error, or the end of input.
pub fn ndjson_fragments<S, B, E>(inner: S) -> impl Stream<Item = Result<String, LlmError>>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
{
    stream::unfold(LineState { inner, buf: Vec::new(), finished: false }, |mut st| async move {
        loop {
            if st.finished { return None; }
            let line: Vec<u8> = match st.buf.iter().position(|&b| b == b'\n') {
                Some(pos) => st.buf.drain(..=pos).collect(),
                None => match st.inner.next().await {
                    Some(Ok(bytes)) => { st.buf.extend_from_slice(bytes.as_ref()); continue; }
                    Some(Err(e)) => {
                        st.finished = true;
                        return Some((Err(LlmError::Streaming { message: e.to_string() }), st));
                    }
                    None => {
                        st.finished = true;
                        std::mem::take(&mut st.buf)
                    }
                },
            };
            match decode_line(&line) {
                Ok(None) => continue,
                Ok(Some(chunk)) => {
                    if let Some(err) = chunk.error {
                        st.finished = true;
                        return Some((Err(LlmError::Streaming { message: err }), st));
                    }
                    if chunk.done { st.finished = true; }
                    let content = chunk.message.map(|m| m.content).unwrap_or_default();
                    return Some((Ok(content), st));
                }
                Err(e) => {
                    st.finished = true;
                    return Some((Err(e), st));
                }
            }
        }
    })
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, LlmError> {
        let response = self.post_chat(&messages, false).await?;
        let body = response.text().await.map_err(LlmError::from_reqwest)?;
        let line = decode_line(body.as_bytes())?.ok_or(LlmError::EmptyResponse)?;
        if let Some(err) = line.error { return Err(LlmError::ApiRequest { message: err }); }
        Ok(line.message.map(|m| m.content).unwrap_or_default())
    }

    async fn complete_streaming(&self, messages: Vec<ChatMessage>) -> Result<FragmentStream, LlmError> {
        let response = self.post_chat(&messages, true).await?;
        Ok(ndjson_fragments(Box::pin(response.bytes_stream())).boxed())
    }
}
