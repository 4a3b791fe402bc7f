use serde::{Deserialize, Serialize};

use docchat_core::types::{ConversationTurn, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// One message sent to a chat model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self { Self { role: MessageRole::System, content: content.into() } }
    pub fn user(content: impl Into<String>) -> Self { Self { role: MessageRole::User, content: content.into() } }
    pub fn assistant(content: impl Into<String>) -> Self { Self { role: MessageRole::Assistant, content: content.into() } }
}

impl From<&ConversationTurn> for ChatMessage {
    fn from(turn: &ConversationTurn) -> Self {
        let role = match turn.role {
            Role::User => MessageRole::User,
            Role::Assistant => MessageRole::Assistant,
        };
        Self { role, content: turn.content.clone() }
    }
}
