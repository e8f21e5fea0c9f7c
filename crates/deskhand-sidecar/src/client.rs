//! HTTP client for the accessibility sidecar.
//!
//! Transport failures never surface as errors: they are folded into a
//! not-ok [`SidecarResult`] with a connection error code so callers handle
//! "sidecar down" and "element not found" through one shape.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use deskhand_protocols::{ErrorCode, SemanticTarget};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Wire payload for find/act requests.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SidecarPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl From<&SemanticTarget> for SidecarPayload {
    fn from(target: &SemanticTarget) -> Self {
        Self {
            app: target.app.clone(),
            window_title: target.window_title.clone(),
            role: target.role.clone(),
            name: target.name.clone(),
            element_id: target.element_id.clone(),
            text: None,
        }
    }
}

/// Sidecar response envelope. `error_code` is the service's own string
/// vocabulary; [`SidecarResult::code`] maps it into ours.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SidecarResult {
    pub ok: bool,
    pub message: Option<String>,
    pub error_code: Option<String>,
    pub data: Option<Value>,
}

impl SidecarResult {
    fn transport_failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: Some(message.into()),
            error_code: Some(ErrorCode::SidecarConnectionError.as_str().to_string()),
            data: None,
        }
    }

    /// The error code as our enum, defaulting unknown strings to the given
    /// fallback.
    pub fn code(&self, fallback: ErrorCode) -> ErrorCode {
        self.error_code
            .as_deref()
            .and_then(|raw| serde_json::from_value(Value::String(raw.to_string())).ok())
            .unwrap_or(fallback)
    }
}

pub struct SidecarClient {
    base_url: String,
    http: reqwest::Client,
}

impl SidecarClient {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    async fn post(&self, path: &str, payload: &SidecarPayload) -> SidecarResult {
        let url = format!("{}{path}", self.base_url);
        let response = match self
            .http
            .post(&url)
            .timeout(REQUEST_TIMEOUT)
            .json(payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return SidecarResult::transport_failure(e.to_string()),
        };
        let status = response.status();
        let body = response.json::<SidecarResult>().await.unwrap_or_default();
        if !status.is_success() {
            return SidecarResult {
                ok: false,
                message: body.message.or_else(|| Some(format!("HTTP {status}"))),
                error_code: body
                    .error_code
                    .or_else(|| Some("sidecar_http_error".to_string())),
                data: None,
            };
        }
        body
    }

    pub async fn health(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.http.get(&url).timeout(REQUEST_TIMEOUT).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    pub async fn find(&self, target: &SemanticTarget) -> SidecarResult {
        self.post("/find", &SidecarPayload::from(target)).await
    }

    pub async fn click(&self, target: &SemanticTarget) -> SidecarResult {
        self.post("/act/click", &SidecarPayload::from(target)).await
    }

    pub async fn focus(&self, target: &SemanticTarget) -> SidecarResult {
        self.post("/act/focus", &SidecarPayload::from(target)).await
    }

    pub async fn type_text(&self, target: &SemanticTarget, text: &str) -> SidecarResult {
        let payload = SidecarPayload {
            text: Some(text.to_string()),
            ..SidecarPayload::from(target)
        };
        self.post("/act/type", &payload).await
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
