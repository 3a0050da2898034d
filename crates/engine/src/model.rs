//! The model call capability: `history -> text`.

use cellbook_core::{Error, Message, Result};
use cellbook_providers::{ChatRequest, Provider, StreamEvent};
use futures::StreamExt;
use std::sync::Arc;

/// Asynchronous function from conversation history to model text.
///
/// Every failure (transport, auth, rate limit, malformed stream) surfaces as
/// [`Error::CallFailure`]. Timeouts and retries, if any, live behind this trait.
#[async_trait::async_trait]
pub trait ModelCall: Send + Sync {
    async fn invoke(&self, history: &[Message]) -> Result<String>;
}

/// Adapts a streaming [`Provider`] into a [`ModelCall`].
pub struct ProviderModel {
    provider: Arc<dyn Provider>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl ProviderModel {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider, temperature: None, max_tokens: None }
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[async_trait::async_trait]
impl ModelCall for ProviderModel {
    async fn invoke(&self, history: &[Message]) -> Result<String> {
        let request = ChatRequest::builder()
            .messages(history.to_vec())
            .options(self.temperature, self.max_tokens)
            .build();

        let stream = self
            .provider
            .stream_chat(request)
            .await
            .map_err(|e| Error::CallFailure(e.to_string()))?;
        tokio::pin!(stream);

        let mut buffer = String::new();
        while let Some(event) = stream.next().await {
            match event {
                StreamEvent::Token(text) => buffer.push_str(&text),
                StreamEvent::Usage(usage) => {
                    tracing::debug!(
                        prompt_tokens = usage.prompt_tokens,
                        completion_tokens = usage.completion_tokens,
                        "model usage"
                    );
                }
                StreamEvent::Done => break,
                StreamEvent::Error(message) => return Err(Error::CallFailure(message)),
            }
        }

        Ok(buffer.trim().to_string())
    }
}
