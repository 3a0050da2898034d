use crate::Provider;
use crate::types::*;
use cellbook_core::{Error, Result, Role};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_stream::Stream;

/// Mock response types for deterministic testing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MockResponse {
    Text { content: String },
    Error { message: String },
    Sequence { events: Vec<MockEvent> },
    /// Repeat the last user turn back
    Echo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum MockEvent {
    Token { text: String },
    Error { message: String },
    Done,
}

/// Mock configuration from TOML file
#[derive(Debug, Deserialize)]
struct MockConfig {
    responses: Vec<MockResponse>,
}

/// Mock provider for deterministic runs without API calls
///
/// Responses are served in order; once the script is exhausted every call
/// echoes the last user turn.
pub struct MockProvider {
    responses: Vec<MockResponse>,
    current: AtomicUsize,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockProvider {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self { responses, current: AtomicUsize::new(0), requests: Mutex::new(Vec::new()) }
    }

    /// A provider that only echoes.
    pub fn echo() -> Self {
        Self::new(Vec::new())
    }

    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let config: MockConfig =
            toml::from_str(toml_str).map_err(|e| Error::Config(format!("Failed to parse mock responses: {}", e)))?;
        Ok(Self::new(config.responses))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read mock responses {}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn get_next_response(&self) -> MockResponse {
        let index = self.current.fetch_add(1, Ordering::SeqCst);
        self.responses.get(index).cloned().unwrap_or(MockResponse::Echo)
    }
}

fn echo_of(request: &ChatRequest) -> String {
    request
        .messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User && !m.content.is_empty())
        .map(|m| format!("echo: {}", m.content))
        .unwrap_or_else(|| "echo:".to_string())
}

#[async_trait::async_trait]
impl Provider for MockProvider {
    async fn stream_chat<'a>(&'a self, request: ChatRequest) -> Result<Pin<Box<dyn Stream<Item = StreamEvent> + Send + 'a>>> {
        let response = self.get_next_response();
        let echo = echo_of(&request);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        let stream = async_stream::stream! {
            match response {
                MockResponse::Text { content } => {
                    yield StreamEvent::Token(content);
                }
                MockResponse::Echo => {
                    yield StreamEvent::Token(echo);
                }
                MockResponse::Error { message } => {
                    yield StreamEvent::Error(message);
                    return;
                }
                MockResponse::Sequence { events } => {
                    for event in events {
                        match event {
                            MockEvent::Token { text } => {
                                yield StreamEvent::Token(text);
                            }
                            MockEvent::Error { message } => {
                                yield StreamEvent::Error(message);
                                return;
                            }
                            MockEvent::Done => {
                                yield StreamEvent::Done;
                                return;
                            }
                        }
                    }
                }
            }
            yield StreamEvent::Done;
        };

        Ok(Box::pin(stream))
    }
}
