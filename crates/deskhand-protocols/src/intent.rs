//! Structured intents: the validated interpretation of a free-text command.

use serde::{Deserialize, Serialize};

use crate::action::Point;

/// Terms no intent may ever drop from its constraint set.
pub const DEFAULT_FORBIDDEN_TERMS: &[&str] =
    &["captcha bypass", "anti-bot bypass", "unauthorized access"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    OpenApp,
    NavigateUrl,
    ClickElement,
    TypeText,
    PressHotkey,
    Scroll,
    Wait,
    Stop,
    MultiStepGoal,
    Unknown,
}

impl IntentType {
    /// Wire name of this intent kind.
    pub fn as_str(self) -> &'static str {
        match self {
            IntentType::OpenApp => "open_app",
            IntentType::NavigateUrl => "navigate_url",
            IntentType::ClickElement => "click_element",
            IntentType::TypeText => "type_text",
            IntentType::PressHotkey => "press_hotkey",
            IntentType::Scroll => "scroll",
            IntentType::Wait => "wait",
            IntentType::Stop => "stop",
            IntentType::MultiStepGoal => "multi_step_goal",
            IntentType::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreferredSurface {
    Desktop,
    Browser,
}

/// Loose bag of targets the parser managed to extract from the command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntentTargets {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hotkey: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coords: Option<Point>,
}

/// Execution constraints attached to an intent.
///
/// Invariant: after normalization `forbidden_terms` is never empty; the
/// default set is merged in when the source left it out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntentConstraints {
    pub forbidden_terms: Vec<String>,
    pub requires_confirmation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentSpec {
    pub intent_type: IntentType,
    pub objective: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_surface: Option<PreferredSurface>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_app: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_window: Option<String>,
    #[serde(default)]
    pub targets: IntentTargets,
    #[serde(default)]
    pub constraints: IntentConstraints,
    pub success_criteria: String,
}

impl IntentSpec {
    /// Catch-all intent for commands that could not be interpreted.
    pub fn unknown(command: &str) -> Self {
        Self {
            intent_type: IntentType::Unknown,
            objective: command.to_string(),
            preferred_surface: Some(PreferredSurface::Desktop),
            target_app: None,
            target_window: None,
            targets: IntentTargets::default(),
            constraints: IntentConstraints {
                forbidden_terms: default_forbidden_terms(),
                requires_confirmation: false,
                max_steps: None,
            },
            success_criteria: "Clarify user command before execution".to_string(),
        }
    }
}

pub fn default_forbidden_terms() -> Vec<String> {
    DEFAULT_FORBIDDEN_TERMS.iter().map(|s| s.to_string()).collect()
}

/// Where a parse result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentSource {
    Deterministic,
    Model,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentParseResult {
    pub intent: IntentSpec,
    /// Clamped to `[0, 1]`; non-finite input maps to 0.
    pub confidence: f64,
    pub clarification_needed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clarification_question: Option<String>,
    pub source: IntentSource,
}

/// Clamp a confidence value into `[0, 1]`, mapping NaN/infinities to 0.
pub fn clamp_confidence(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}
