pub mod client;
pub mod factory;
pub mod openai;

use async_trait::async_trait;
use serde_json::Value;
use webrover_core::types::{ChatMessage, LLMResponse, ToolChoice};
use webrover_core::Result;

/// Chat-completion transport consumed by the agent loop.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[Value],
        tool_choice: ToolChoice,
    ) -> Result<LLMResponse>;

    /// Model identifier, used for cost accounting.
    fn model(&self) -> &str;
}

pub use factory::{create_main_provider, create_provider, infer_provider_from_model};
pub use openai::OpenAIProvider;
