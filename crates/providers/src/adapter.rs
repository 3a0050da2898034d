use eventsource_stream::Eventsource;
use futures::{StreamExt, stream::Stream};
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;

use crate::mock::MockProvider;
use crate::types::*;
use cellbook_core::{ProviderConfig, Result};

/// Generic provider trait for LLM backends
#[async_trait::async_trait]
pub trait Provider: Send + Sync {
    /// Stream a chat completion
    async fn stream_chat<'a>(&'a self, request: ChatRequest) -> Result<Pin<Box<dyn Stream<Item = StreamEvent> + Send + 'a>>>;
}

/// OpenAI-compatible chat completions provider
pub struct OpenAiProvider {
    client: HttpClient,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: String, base_url: Option<String>) -> Self {
        Self {
            client: HttpClient::new(),
            api_key,
            model,
            base_url: base_url.unwrap_or_else(cellbook_core::config::default_openai_base_url),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Convert ChatRequest to the wire format
    fn to_openai_request(&self, request: &ChatRequest) -> OpenAiChatRequest {
        let messages = request
            .wire_messages()
            .map(|msg| OpenAiMessage { role: msg.role.as_str().to_string(), content: msg.content.clone() })
            .collect();

        OpenAiChatRequest {
            model: self.model.clone(),
            messages,
            stream: true,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream_options: Some(OpenAiStreamOptions { include_usage: true }),
        }
    }

    /// Parse SSE chunk into StreamEvent
    ///
    /// Role-only deltas and empty keep-alive chunks yield `None`.
    fn parse_chunk(&self, chunk: &str) -> Option<StreamEvent> {
        let chunk = chunk.trim();
        if chunk.is_empty() {
            return None;
        }
        if chunk.starts_with("[DONE]") {
            return Some(StreamEvent::Done);
        }

        match serde_json::from_str::<OpenAiChunk>(chunk) {
            Ok(data) => {
                if let Some(error) = data.error {
                    return Some(StreamEvent::Error(format!("OpenAI API error: {}", error.message)));
                }

                if let Some(choice) = data.choices.first()
                    && let Some(content) = &choice.delta.content
                    && !content.is_empty()
                {
                    return Some(StreamEvent::Token(content.clone()));
                }

                data.usage
                    .map(|u| StreamEvent::Usage(Usage::new(u.prompt_tokens, u.completion_tokens)))
            }
            Err(_) => Some(StreamEvent::Error(format!("Failed to parse chunk: {}", chunk))),
        }
    }
}

#[async_trait::async_trait]
impl Provider for OpenAiProvider {
    async fn stream_chat<'a>(&'a self, request: ChatRequest) -> Result<Pin<Box<dyn Stream<Item = StreamEvent> + Send + 'a>>> {
        let openai_request = self.to_openai_request(&request);
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let stream = async_stream::stream! {
            tracing::debug!(model = %self.model, messages = openai_request.messages.len(), "sending chat request");

            let response = match self.client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&openai_request)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    yield StreamEvent::Error(format!("OpenAI request failed: {}", e));
                    return;
                }
            };

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                yield StreamEvent::Error(format!("OpenAI API error: {} - {}", status, body));
                return;
            }

            let eventsource = response.bytes_stream().eventsource();
            tokio::pin!(eventsource);

            while let Some(event_result) = eventsource.next().await {
                match event_result {
                    Ok(event) => {
                        let Some(parsed) = self.parse_chunk(&event.data) else { continue };
                        let is_terminal = matches!(parsed, StreamEvent::Done | StreamEvent::Error(_));
                        yield parsed;

                        if is_terminal {
                            return;
                        }
                    }
                    Err(e) => {
                        yield StreamEvent::Error(format!("SSE error: {}", e));
                        return;
                    }
                }
            }

            yield StreamEvent::Done;
        };

        Ok(Box::pin(stream))
    }
}

/// OpenAI API request format
#[derive(Debug, Serialize)]
struct OpenAiChatRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<OpenAiStreamOptions>,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct OpenAiStreamOptions {
    include_usage: bool,
}

/// OpenAI SSE chunk format
#[derive(Debug, Deserialize)]
struct OpenAiChunk {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
    #[serde(default)]
    error: Option<OpenAiError>,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct OpenAiChoice {
    delta: OpenAiDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAiError {
    message: String,
}

pub struct ProviderFactory;

impl ProviderFactory {
    pub fn create_from_config(config: &ProviderConfig) -> Result<Arc<dyn Provider>> {
        match config {
            ProviderConfig::OpenAi { api_key, model, base_url } => Ok(Arc::new(OpenAiProvider::new(
                api_key.clone(),
                model.clone(),
                Some(base_url.clone()),
            ))),
            ProviderConfig::Mock { responses_file } => {
                let provider = match responses_file {
                    Some(path) => MockProvider::from_file(path)?,
                    None => MockProvider::echo(),
                };
                Ok(Arc::new(provider))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> OpenAiProvider {
        OpenAiProvider::new("test-key".to_string(), "gpt-4o-mini".to_string(), None)
    }

    #[test]
    fn test_openai_provider_creation() {
        let provider = provider();
        assert_eq!(provider.api_key, "test-key");
        assert_eq!(provider.model(), "gpt-4o-mini");
        assert_eq!(provider.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn test_openai_provider_custom_url() {
        let provider = OpenAiProvider::new(
            "test-key".to_string(),
            "local".to_string(),
            Some("http://localhost:8080/v1".to_string()),
        );
        assert_eq!(provider.base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn test_request_conversion_skips_placeholders() {
        let request = ChatRequest::builder()
            .messages(vec![
                ChatMessage::system("Be brief"),
                ChatMessage::user("a"),
                ChatMessage::user(""),
                ChatMessage::assistant("1"),
            ])
            .temperature(0.5)
            .build();

        let wire = provider().to_openai_request(&request);
        assert!(wire.stream);
        assert_eq!(wire.temperature, Some(0.5));
        let roles: Vec<_> = wire.messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant"]);

        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn test_parse_chunk_token() {
        let chunk = r#"{"choices":[{"index":0,"delta":{"content":"Hel"},"finish_reason":null}]}"#;
        assert_eq!(provider().parse_chunk(chunk), Some(StreamEvent::Token("Hel".to_string())));
    }

    #[test]
    fn test_parse_chunk_role_only_delta_is_skipped() {
        let chunk = r#"{"choices":[{"index":0,"delta":{"role":"assistant"},"finish_reason":null}]}"#;
        assert_eq!(provider().parse_chunk(chunk), None);
        assert_eq!(provider().parse_chunk("   "), None);
    }

    #[test]
    fn test_parse_chunk_done_and_usage() {
        assert_eq!(provider().parse_chunk("[DONE]"), Some(StreamEvent::Done));

        let chunk = r#"{"choices":[],"usage":{"prompt_tokens":12,"completion_tokens":3,"total_tokens":15}}"#;
        assert_eq!(provider().parse_chunk(chunk), Some(StreamEvent::Usage(Usage::new(12, 3))));
    }

    #[test]
    fn test_parse_chunk_errors() {
        let chunk = r#"{"error":{"message":"Rate limit reached"}}"#;
        assert!(matches!(
            provider().parse_chunk(chunk),
            Some(StreamEvent::Error(msg)) if msg.contains("Rate limit reached")
        ));

        assert!(matches!(provider().parse_chunk("not json"), Some(StreamEvent::Error(_))));
    }

    #[test]
    fn test_factory_creates_mock_without_script() {
        let config = ProviderConfig::Mock { responses_file: None };
        assert!(ProviderFactory::create_from_config(&config).is_ok());
    }

    #[test]
    fn test_factory_rejects_missing_mock_script() {
        let config = ProviderConfig::Mock { responses_file: Some("/nonexistent/responses.toml".into()) };
        assert!(ProviderFactory::create_from_config(&config).is_err());
    }
}
