//! Planner provider: chat-completions access for the intent parser and the
//! vision planning loop.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("planner request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("planner API error ({status}): {message}")]
    Api { status: u16, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerRole {
    System,
    User,
    Assistant,
}

impl PlannerRole {
    fn as_str(self) -> &'static str {
        match self {
            PlannerRole::System => "system",
            PlannerRole::User => "user",
            PlannerRole::Assistant => "assistant",
        }
    }
}

/// One content part of a planner message. Images are PNG, base64-encoded.
#[derive(Debug, Clone)]
pub enum PlannerPart {
    Text(String),
    PngBase64(String),
}

#[derive(Debug, Clone)]
pub struct PlannerMessage {
    pub role: PlannerRole,
    pub parts: Vec<PlannerPart>,
}

impl PlannerMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: PlannerRole::System,
            parts: vec![PlannerPart::Text(text.into())],
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: PlannerRole::User,
            parts: vec![PlannerPart::Text(text.into())],
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: PlannerRole::Assistant,
            parts: vec![PlannerPart::Text(text.into())],
        }
    }

    /// Screenshot-first user message as the vision loop sends it.
    pub fn user_with_image(png_base64: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: PlannerRole::User,
            parts: vec![
                PlannerPart::PngBase64(png_base64.into()),
                PlannerPart::Text(text.into()),
            ],
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlannerRequest {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: Option<f64>,
    pub messages: Vec<PlannerMessage>,
}

/// Token usage reported by the provider for one completion.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct PlannerUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl PlannerUsage {
    /// Total, falling back to prompt + completion when the provider omits it.
    pub fn effective_total(&self) -> u64 {
        if self.total_tokens > 0 {
            self.total_tokens
        } else {
            self.prompt_tokens + self.completion_tokens
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlannerReply {
    pub content: String,
    pub usage: Option<PlannerUsage>,
}

/// Seam between the orchestration core and the model provider. Tests
/// substitute scripted fakes.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn complete(&self, request: PlannerRequest) -> Result<PlannerReply, PlannerError>;
}

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Chat-completions client for OpenAI-compatible APIs.
pub struct OpenAiPlanner {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiPlanner {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL.to_string())
    }

    /// Point at a custom base URL (compatible providers, tests).
    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        Self {
            api_key,
            base_url,
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn build_body(request: &PlannerRequest) -> Value {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|message| {
                let content = match message.parts.as_slice() {
                    [PlannerPart::Text(text)] => Value::String(text.clone()),
                    parts => Value::Array(parts.iter().map(part_to_value).collect()),
                };
                json!({ "role": message.role.as_str(), "content": content })
            })
            .collect();

        let mut body = json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "messages": messages,
        });
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        body
    }
}

fn part_to_value(part: &PlannerPart) -> Value {
    match part {
        PlannerPart::Text(text) => json!({ "type": "text", "text": text }),
        PlannerPart::PngBase64(data) => json!({
            "type": "image_url",
            "image_url": { "url": format!("data:image/png;base64,{data}"), "detail": "high" },
        }),
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
    usage: Option<PlannerUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ApiChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl Planner for OpenAiPlanner {
    async fn complete(&self, request: PlannerRequest) -> Result<PlannerReply, PlannerError> {
        let body = Self::build_body(&request);
        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(PlannerError::Api { status, message });
        }

        let api_response: ApiResponse = response.json().await?;
        let content = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();
        Ok(PlannerReply {
            content,
            usage: api_response.usage,
        })
    }
}

#[cfg(test)]
#[path = "planner_tests.rs"]
mod tests;
