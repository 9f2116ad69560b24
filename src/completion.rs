//! Chat completions client for the categorization pass.
//!
//! Speaks the OpenAI-compatible `/chat/completions` dialect, so the endpoint
//! can point at OpenAI itself or any compatible gateway.

use crate::error::ServiceError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Async trait implemented by each completion backend.
#[async_trait::async_trait]
pub trait CompletionService: Send + Sync {
    /// Send `messages` and return the text of the first choice.
    async fn complete(&self, messages: Vec<Message>) -> Result<String, ServiceError>;
}

/// Client for an OpenAI-compatible chat completions endpoint.
#[derive(Clone)]
pub struct CompletionClient {
    client: Client,
    url: String,
    api_key: String,
    model: String,
    json_mode: bool,
}

impl CompletionClient {
    pub fn new(
        client: Client,
        url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            api_key: api_key.into(),
            model: model.into(),
            json_mode: false,
        }
    }

    /// Request a JSON object response from backends that support it.
    pub fn with_json_mode(mut self, enabled: bool) -> Self {
        self.json_mode = enabled;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn send_request(&self, request: ChatCompletionRequest) -> Result<String, ServiceError> {
        debug!(
            "Sending completion request: model={}, messages={}",
            request.model,
            request.messages.len()
        );

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let response: ChatCompletionResponse = response.json().await?;

        if let Some(usage) = &response.usage {
            info!(
                "Completion response: {} tokens (prompt: {}, completion: {})",
                usage.total_tokens, usage.prompt_tokens, usage.completion_tokens
            );
        }

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| ServiceError::Decode("completion returned no content".to_string()))
    }
}

#[async_trait::async_trait]
impl CompletionService for CompletionClient {
    async fn complete(&self, messages: Vec<Message>) -> Result<String, ServiceError> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            response_format: self.json_mode.then_some(ResponseFormat::JsonObject),
        };
        self.send_request(request).await
    }
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseFormat {
    JsonObject,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

// ============================================================================
// Message types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}
