use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

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
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ConversationError {
    #[error("message index {0} is out of range")]
    IndexOutOfRange(usize),
    #[error("message {0} is not a user message")]
    NotAUserMessage(usize),
    #[error("no user message to resend")]
    NothingToRetry,
}

/// Ordered message history of one chat.
///
/// Never holds two consecutive assistant messages: streamed tokens either
/// grow the trailing assistant reply or start a new one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// Copy of the history as it should be sent to the generation endpoint.
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.messages.clone()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::user(content));
    }

    /// Merge one streamed token into the in-progress assistant reply.
    pub fn apply_token(&mut self, token: &str) {
        match self.messages.last_mut() {
            Some(last) if last.role == Role::Assistant => last.content.push_str(token),
            _ => self.messages.push(ChatMessage::assistant(token)),
        }
    }

    /// Drop the trailing assistant reply so the last user message can be resent.
    pub fn retry(&mut self) -> Result<Vec<ChatMessage>, ConversationError> {
        if matches!(self.messages.last(), Some(m) if m.role == Role::Assistant) {
            self.messages.pop();
        }
        match self.messages.last() {
            Some(m) if m.role == Role::User => Ok(self.snapshot()),
            _ => Err(ConversationError::NothingToRetry),
        }
    }

    /// Replace the content of a user message and discard everything after it.
    pub fn edit(
        &mut self,
        index: usize,
        content: impl Into<String>,
    ) -> Result<Vec<ChatMessage>, ConversationError> {
        let message = self
            .messages
            .get_mut(index)
            .ok_or(ConversationError::IndexOutOfRange(index))?;
        if message.role != Role::User {
            return Err(ConversationError::NotAUserMessage(index));
        }
        message.content = content.into();
        self.messages.truncate(index + 1);
        Ok(self.snapshot())
    }

    pub fn last_user_index(&self) -> Option<usize> {
        self.messages.iter().rposition(|m| m.role == Role::User)
    }
}
