use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;

use docchat_core::types::ConversationTurn;

use crate::client::{FragmentStream, LanguageModel};
use crate::message::ChatMessage;
use crate::prompts::Prompts;

/// Streams a grounded answer: system prompt with the context, the history,
/// then the user's message.
pub struct AnswerStreamer {
    llm: Arc<dyn LanguageModel>,
    prompts: Arc<Prompts>,
}

impl AnswerStreamer {
    pub fn new(llm: Arc<dyn LanguageModel>, prompts: Arc<Prompts>) -> Self { Self { llm, prompts } }

    fn messages(&self, context: &str, history: &[ConversationTurn], message: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(self.prompts.system_with_context(context)));
        messages.extend(history.iter().map(ChatMessage::from));
        messages.push(ChatMessage::user(message));
        messages
    }

    /// Non-empty fragments in arrival order. A failure to start the call
    /// arrives as the stream's first item.
    pub fn stream(&self, context: &str, history: &[ConversationTurn], message: &str) -> FragmentStream {
        let llm = Arc::clone(&self.llm);
        let messages = self.messages(context, history, message);
        stream::once(async move { llm.complete_streaming(messages).await })
            .try_flatten()
            .try_filter(|fragment| futures::future::ready(!fragment.is_empty()))
            .boxed()
    }
}
