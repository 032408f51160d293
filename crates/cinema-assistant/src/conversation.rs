use std::time::Duration;

use crate::errors::StreamError;

/// Author of a chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry of the chat history, serialized as `{"role", "content"}`.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
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

/// Per-reply behavior options.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplyOptions {
    /// Optional overall timeout, covering both opening and streaming.
    pub timeout: Option<Duration>,
    /// Bounded event buffer size used by the reply channel.
    pub stream_buffer_capacity: usize,
}

impl Default for ReplyOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            stream_buffer_capacity: 128,
        }
    }
}

/// Body sent to the chat endpoint plus local reply options.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct ChatRequest {
    /// Full history, oldest first; the last entry is the new question.
    pub messages: Vec<ChatMessage>,
    #[serde(skip)]
    pub options: ReplyOptions,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            options: ReplyOptions::default(),
        }
    }

    /// Sets an overall timeout for the reply.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    /// Sets the bounded event buffer size.
    pub fn stream_buffer_capacity(mut self, capacity: usize) -> Self {
        self.options.stream_buffer_capacity = capacity;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), StreamError> {
        if self.options.stream_buffer_capacity == 0 {
            return Err(StreamError::Validation(
                "stream_buffer_capacity must be greater than 0".into(),
            ));
        }
        match self.messages.last() {
            None => Err(StreamError::Validation(
                "at least one message is required".into(),
            )),
            Some(last) if last.role != Role::User => Err(StreamError::Validation(
                "the last message must come from the user".into(),
            )),
            Some(last) if last.content.trim().is_empty() => Err(StreamError::Validation(
                "question must not be empty".into(),
            )),
            Some(_) => Ok(()),
        }
    }
}

/// Ordered chat history for one assistant panel.
///
/// The whole history is sent with every question; the chat service is
/// stateless.
#[derive(Clone, Debug)]
pub struct Conversation {
    id: uuid::Uuid,
    messages: Vec<ChatMessage>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

impl Conversation {
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            messages: Vec::new(),
        }
    }

    pub fn id(&self) -> uuid::Uuid {
        self.id
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

    /// Appends a user question. Blank questions are rejected.
    pub fn push_user(&mut self, question: impl Into<String>) -> Result<(), StreamError> {
        let question = question.into();
        if question.trim().is_empty() {
            return Err(StreamError::Validation(
                "question must not be empty".into(),
            ));
        }
        self.messages.push(ChatMessage::user(question));
        Ok(())
    }

    /// Records the assistant's answer. Blank answers are not kept.
    pub fn record_reply(&mut self, answer: impl Into<String>) {
        let answer = answer.into();
        if !answer.trim().is_empty() {
            self.messages.push(ChatMessage::assistant(answer));
        }
    }

    /// Builds a request carrying the whole history.
    pub fn to_request(&self) -> ChatRequest {
        ChatRequest::new(self.messages.clone())
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_carries_full_history() {
        let mut conversation = Conversation::new();
        conversation.push_user("من أخرج فيلم الأرض؟").expect("question");
        conversation.record_reply("يوسف شاهين");
        conversation.push_user("ومتى؟").expect("question");

        let body = serde_json::to_value(conversation.to_request()).expect("serialize");
        assert_eq!(
            body,
            serde_json::json!({
                "messages": [
                    {"role": "user", "content": "من أخرج فيلم الأرض؟"},
                    {"role": "assistant", "content": "يوسف شاهين"},
                    {"role": "user", "content": "ومتى؟"}
                ]
            })
        );
    }

    #[test]
    fn blank_inputs_are_not_recorded() {
        let mut conversation = Conversation::new();
        assert!(matches!(
            conversation.push_user("   "),
            Err(StreamError::Validation(_))
        ));
        conversation.record_reply("\n");
        assert!(conversation.is_empty());
    }

    #[test]
    fn validation_requires_trailing_user_question() {
        assert!(ChatRequest::new(Vec::new()).validate().is_err());
        assert!(
            ChatRequest::new(vec![ChatMessage::assistant("hi")])
                .validate()
                .is_err()
        );
        assert!(
            ChatRequest::new(vec![ChatMessage::user("hi")])
                .stream_buffer_capacity(0)
                .validate()
                .is_err()
        );
        assert!(ChatRequest::new(vec![ChatMessage::user("hi")]).validate().is_ok());
    }
}
