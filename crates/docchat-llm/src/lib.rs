//! Language-model side of the chat pipeline: the model interface, the Ollama
//! client, prompts, query rewriting and answer streaming.
pub mod answer;
pub mod client;
pub mod error;
pub mod message;
pub mod prompts;
pub mod rewrite;

pub use answer::AnswerStreamer;
pub use client::{FragmentStream, LanguageModel, ModelStatus, OllamaClient};
pub use error::LlmError;
pub use message::{ChatMessage, MessageRole};
pub use prompts::Prompts;
pub use rewrite::QueryRewriter;
