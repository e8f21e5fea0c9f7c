//! Execution results and agent run state.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ErrorCode;

/// Which surface actually produced an observed execution result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerceptionSource {
    /// Accessibility sidecar acted on a desktop element.
    Accessibility,
    /// Browser remote-debugging protocol drove the page.
    BrowserProtocol,
    /// Best-effort OS launch of the browser, outside protocol control.
    BrowserShell,
    /// Screenshot-driven single-action replanning.
    ScreenshotFallback,
    /// Raw coordinate/keyboard input against the OS.
    Coordinate,
}

impl std::fmt::Display for PerceptionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PerceptionSource::Accessibility => "accessibility",
            PerceptionSource::BrowserProtocol => "browser_protocol",
            PerceptionSource::BrowserShell => "browser_shell",
            PerceptionSource::ScreenshotFallback => "screenshot_fallback",
            PerceptionSource::Coordinate => "coordinate",
        };
        f.write_str(s)
    }
}

/// Outcome of executing one action against a surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub message: String,
    pub perception_source: PerceptionSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Map<String, Value>>,
}

impl ExecutionResult {
    pub fn ok(source: PerceptionSource, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            perception_source: source,
            retryable: None,
            error_code: None,
            evidence: None,
        }
    }

    pub fn failure(
        source: PerceptionSource,
        message: impl Into<String>,
        code: ErrorCode,
    ) -> Self {
        Self {
            success: false,
            message: message.into(),
            perception_source: source,
            retryable: Some(code.is_retryable()),
            error_code: Some(code),
            evidence: None,
        }
    }

    /// Failure the router may retry regardless of the code's default.
    pub fn retryable_failure(
        source: PerceptionSource,
        message: impl Into<String>,
        code: ErrorCode,
    ) -> Self {
        Self {
            retryable: Some(true),
            ..Self::failure(source, message, code)
        }
    }

    pub fn with_evidence(mut self, evidence: Map<String, Value>) -> Self {
        self.evidence = Some(evidence);
        self
    }

    /// Whether the router is allowed to retry this result.
    pub fn is_retryable(&self) -> bool {
        self.retryable.unwrap_or(false)
            || self.error_code.map(ErrorCode::is_retryable).unwrap_or(false)
    }
}

/// Lifecycle status of the orchestrator state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Thinking,
    Acting,
    AwaitingConfirmation,
}

/// Observable per-run state, reset at the start of every run and returned to
/// idle on the guaranteed cleanup path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub status: AgentStatus,
    pub step_count: u32,
    pub max_steps: u32,
    /// Surface the last step executed on; `None` while idle.
    pub execution_mode: Option<PerceptionSource>,
    pub fallback_reason: Option<String>,
}

impl AgentState {
    pub fn idle(max_steps: u32) -> Self {
        Self {
            status: AgentStatus::Idle,
            step_count: 0,
            max_steps,
            execution_mode: None,
            fallback_reason: None,
        }
    }
}
