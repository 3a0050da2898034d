pub mod adapter;
pub mod mock;
pub mod types;

pub use adapter::{OpenAiProvider, Provider, ProviderFactory};
pub use mock::{MockEvent, MockProvider, MockResponse};
pub use types::{ChatMessage, ChatRequest, ChatRequestBuilder, Role, StreamEvent, Usage};

pub use cellbook_core::{Error, Result};
