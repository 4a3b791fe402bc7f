use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use docchat_core::types::ConversationTurn;

use crate::client::LanguageModel;
use crate::error::LlmError;
use crate::message::ChatMessage;
use crate::prompts::Prompts;

/// Condenses a follow-up question and the conversation into one standalone
/// search query.
pub struct QueryRewriter {
    llm: Arc<dyn LanguageModel>,
    prompts: Arc<Prompts>,
    timeout: Duration,
}

impl QueryRewriter {
    pub fn new(llm: Arc<dyn LanguageModel>, prompts: Arc<Prompts>, timeout: Duration) -> Self {
        Self { llm, prompts, timeout }
    }

    fn messages(&self, history: &[ConversationTurn], message: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() + 2 * self.prompts.query_transform_examples.len() + 2);
        messages.push(ChatMessage::system(&self.prompts.query_rewrite_prompt));
        messages.extend(history.iter().map(ChatMessage::from));
        for ex in &self.prompts.query_transform_examples {
            messages.push(ChatMessage::user(&ex.input));
            messages.push(ChatMessage::assistant(&ex.output));
        }
        messages.push(ChatMessage::user(message));
        messages
    }

    /// `message` itself when there is no history; no model call is made.
    pub async fn rewrite(&self, history: &[ConversationTurn], message: &str) -> Result<String, LlmError> {
        if history.is_empty() {
            return Ok(message.to_string());
        }
        let call = self.llm.complete(self.messages(history, message));
        let raw = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| LlmError::Timeout { timeout_secs: self.timeout.as_secs() })??;
        let query = raw.trim();
        if query.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        debug!(query, "rewrite produced");
        Ok(query.to_string())
    }
}
