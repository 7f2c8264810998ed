use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info};
use webrover_core::types::{ChatMessage, LLMResponse, TokenUsage, ToolCallRequest, ToolChoice};
use webrover_core::{Error, Result};

use crate::client::build_http_client;
use crate::Provider;

/// Find the largest byte index <= `max_bytes` that is a valid char boundary.
fn truncate_at_char_boundary(s: &str, max_bytes: usize) -> usize {
    if max_bytes >= s.len() {
        return s.len();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    end
}

pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    api_base: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAIProvider {
    pub fn new(
        api_key: &str,
        api_base: Option<&str>,
        model: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Self {
        Self::new_with_proxy(api_key, api_base, model, max_tokens, temperature, None)
    }

    pub fn new_with_proxy(
        api_key: &str,
        api_base: Option<&str>,
        model: &str,
        max_tokens: u32,
        temperature: f32,
        proxy: Option<&str>,
    ) -> Self {
        let resolved_base = api_base
            .unwrap_or("https://api.openai.com/v1")
            .trim_end_matches('/')
            .to_string();
        let client = build_http_client(proxy, &resolved_base, Duration::from_secs(120));
        Self {
            client,
            api_key: api_key.to_string(),
            api_base: resolved_base,
            model: model.to_string(),
            max_tokens,
            temperature,
        }
    }

    fn build_request(
        &self,
        messages: &[ChatMessage],
        tools: &[Value],
        tool_choice: ToolChoice,
    ) -> ChatRequest {
        let has_tools = !tools.is_empty();
        ChatRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            tools: tools.to_vec(),
            tool_choice: has_tools.then_some(tool_choice),
            parallel_tool_calls: has_tools.then_some(false),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }

    async fn send_request(&self, request: &ChatRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.api_base);
        info!(
            url = %url,
            model = %self.model,
            tools_count = request.tools.len(),
            messages_count = request.messages.len(),
            tool_choice = ?request.tool_choice,
            "Calling LLM"
        );

        let request_body = serde_json::to_string(request)
            .map_err(|e| Error::Provider(format!("Failed to serialize request: {}", e)))?;
        debug!(body_len = request_body.len(), "Request body prepared");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .body(request_body)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Request failed: {}", e)))?;

        let status = response.status();
        let raw_body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            error!(status = %status, body = %raw_body, "LLM API error");
            return Err(Error::Provider(format!("API error {}: {}", status, raw_body)));
        }

        let end = truncate_at_char_boundary(&raw_body, 500);
        debug!(body_len = raw_body.len(), preview = %&raw_body[..end], "LLM raw response");

        Ok(raw_body)
    }
}

/// Decode a `/chat/completions` body into an [`LLMResponse`].
///
/// Tool call arguments that are not valid JSON are kept verbatim as a
/// string value.
pub(crate) fn parse_chat_response(raw_body: &str) -> Result<LLMResponse> {
    let chat_response: ChatResponse = serde_json::from_str(raw_body).map_err(|e| {
        let end = truncate_at_char_boundary(raw_body, 500);
        Error::Provider(format!("Failed to parse response: {}. Body: {}", e, &raw_body[..end]))
    })?;

    let choice = chat_response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| {
            let end = truncate_at_char_boundary(raw_body, 500);
            Error::Provider(format!("No choices in response. Body: {}", &raw_body[..end]))
        })?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| ToolCallRequest {
            id: tc.id,
            name: tc.function.name,
            arguments: ToolCallRequest::parse_arguments(&tc.function.arguments),
        })
        .collect();

    Ok(LLMResponse {
        content: choice.message.content.filter(|c| !c.is_empty()),
        tool_calls,
        finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
        usage: chat_response.usage.unwrap_or_default(),
    })
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parallel_tool_calls: Option<bool>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    id: String,
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[async_trait]
impl Provider for OpenAIProvider {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[Value],
        tool_choice: ToolChoice,
    ) -> Result<LLMResponse> {
        let request = self.build_request(messages, tools, tool_choice);
        let raw_body = self.send_request(&request).await?;
        let response = parse_chat_response(&raw_body)?;
        debug!(
            tool_calls = response.tool_calls.len(),
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            "LLM response decoded"
        );
        Ok(response)
    }

    fn model(&self) -> &str {
        &self.model
    }
}
