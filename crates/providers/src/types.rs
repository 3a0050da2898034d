use cellbook_core::Message;
use serde::{Deserialize, Serialize};

pub use cellbook_core::Role;

/// Conversation entries share the transcript's message type.
pub type ChatMessage = Message;

/// A request to a chat provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    pub fn builder() -> ChatRequestBuilder {
        ChatRequestBuilder::default()
    }

    /// Messages worth putting on the wire: blank user placeholders are dropped.
    pub fn wire_messages(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter().filter(|m| !m.is_placeholder())
    }
}

#[derive(Default)]
pub struct ChatRequestBuilder {
    messages: Vec<ChatMessage>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl ChatRequestBuilder {
    pub fn messages(mut self, messages: Vec<ChatMessage>) -> Self {
        self.messages = messages;
        self
    }

    pub fn add_message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Apply optional settings, leaving unset ones off the request.
    pub fn options(mut self, temperature: Option<f32>, max_tokens: Option<u32>) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn build(self) -> ChatRequest {
        ChatRequest { messages: self.messages, temperature: self.temperature, max_tokens: self.max_tokens }
    }
}

/// Token usage information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self { prompt_tokens, completion_tokens, total_tokens: prompt_tokens + completion_tokens }
    }
}

/// Events from streaming responses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum StreamEvent {
    /// A single token or chunk of content
    Token(String),
    /// Token accounting reported by the backend
    Usage(Usage),
    /// End of stream
    Done,
    /// An error occurred during streaming
    Error(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_request_builder() {
        let request = ChatRequest::builder()
            .add_message(ChatMessage::user("Hello"))
            .temperature(0.7)
            .max_tokens(100)
            .build();

        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.temperature, Some(0.7));
        assert_eq!(request.max_tokens, Some(100));
    }

    #[test]
    fn test_chat_request_options_can_be_unset() {
        let request = ChatRequest::builder()
            .messages(vec![ChatMessage::user("Hi")])
            .options(None, Some(64))
            .build();

        assert_eq!(request.temperature, None);
        assert_eq!(request.max_tokens, Some(64));

        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("temperature"));
        assert!(json.contains("\"max_tokens\":64"));
    }

    #[test]
    fn test_wire_messages_drop_placeholders() {
        let request = ChatRequest::builder()
            .messages(vec![
                ChatMessage::user("a"),
                ChatMessage::assistant("1"),
                ChatMessage::user(""),
                ChatMessage::user("b"),
            ])
            .build();

        let wire: Vec<_> = request.wire_messages().map(|m| m.content.as_str()).collect();
        assert_eq!(wire, vec!["a", "1", "b"]);
    }

    #[test]
    fn test_usage_calculation() {
        let usage = Usage::new(100, 50);
        assert_eq!(usage.total_tokens, 150);
    }

    #[test]
    fn test_stream_event_serialization() {
        let json = serde_json::to_string(&StreamEvent::Token("Hi".to_string())).unwrap();
        assert_eq!(json, r#"{"event":"Token","data":"Hi"}"#);

        let done = serde_json::to_string(&StreamEvent::Done).unwrap();
        assert_eq!(done, r#"{"event":"Done"}"#);
    }
}
