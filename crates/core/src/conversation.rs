use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One turn of the conversation, in the `{role, content}` shape the API expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// The inline message shown when a request fails.
    pub fn error(reason: impl std::fmt::Display) -> Self {
        Self::assistant(format!("Error: {reason}"))
    }
}

/// Append-only history for the lifetime of a presentation session.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ConversationHistory {
    messages: Vec<ChatMessage>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The history with one extra message appended, without mutating it.
    /// Used to build request payloads that include a prompt the user never typed.
    pub fn with_extra(&self, extra: ChatMessage) -> Vec<ChatMessage> {
        let mut messages = self.messages.clone();
        messages.push(extra);
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles_serialize_lowercase() {
        let json = serde_json::to_string(&ChatMessage::user("hi")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"hi"}"#);
    }

    #[test]
    fn test_error_message_is_assistant_bubble() {
        let msg = ChatMessage::error("timeout");
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.content, "Error: timeout");
    }

    #[test]
    fn test_with_extra_leaves_history_untouched() {
        let mut history = ConversationHistory::new();
        history.push(ChatMessage::user("first"));
        let payload = history.with_extra(ChatMessage::user("prompt"));
        assert_eq!(payload.len(), 2);
        assert_eq!(history.len(), 1);
        assert_eq!(history.last().unwrap().content, "first");
    }
}
