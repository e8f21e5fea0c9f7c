//! Action schema: the typed action enum, the untyped planner wire form, and
//! semantic targets.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Screen-space point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

/// Optional descriptors identifying a UI element, URL, or application.
///
/// A target is "resolved" for element actions when at least one of
/// `element_id`, `selector`, or `name` is present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SemanticTarget {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coords: Option<Point>,
}

impl SemanticTarget {
    /// Whether an element-targeting action can act on this target.
    pub fn is_resolved(&self) -> bool {
        self.element_id.is_some() || self.selector.is_some() || self.name.is_some()
    }
}

/// Scroll direction. Unknown input defaults to `Down` during normalization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    #[default]
    Down,
}

/// A validated agent action with one payload shape per kind.
///
/// The wire schema is `{"action": "<kind>", "parameters": {...}}`; the
/// adjacent tagging below preserves that exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "parameters", rename_all = "snake_case")]
pub enum AgentAction {
    Click {
        x: i32,
        y: i32,
    },
    DoubleClick {
        x: i32,
        y: i32,
    },
    RightClick {
        x: i32,
        y: i32,
    },
    Move {
        x: i32,
        y: i32,
    },
    Drag {
        from: [i32; 2],
        to: [i32; 2],
    },
    Type {
        #[serde(default)]
        text: String,
    },
    Hotkey {
        keys: Vec<String>,
    },
    Scroll {
        #[serde(default)]
        direction: ScrollDirection,
        amount: i32,
    },
    Wait {
        seconds: f64,
    },
    Screenshot {},
    Speak {
        #[serde(default)]
        message: String,
    },
    ClickElement {
        #[serde(default)]
        target: SemanticTarget,
    },
    TypeIntoElement {
        #[serde(default)]
        text: String,
        #[serde(default)]
        target: SemanticTarget,
    },
    FocusElement {
        #[serde(default)]
        target: SemanticTarget,
    },
    SelectOption {
        #[serde(default)]
        value: String,
        #[serde(default)]
        target: SemanticTarget,
    },
    NavigateUrl {
        url: String,
        #[serde(default)]
        target: SemanticTarget,
    },
    OpenApp {
        app: String,
        #[serde(default)]
        target: SemanticTarget,
    },
    Done {
        #[serde(default)]
        summary: String,
    },
    Fail {
        #[serde(default)]
        reason: String,
    },
}

impl AgentAction {
    /// Wire name of this action kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AgentAction::Click { .. } => "click",
            AgentAction::DoubleClick { .. } => "double_click",
            AgentAction::RightClick { .. } => "right_click",
            AgentAction::Move { .. } => "move",
            AgentAction::Drag { .. } => "drag",
            AgentAction::Type { .. } => "type",
            AgentAction::Hotkey { .. } => "hotkey",
            AgentAction::Scroll { .. } => "scroll",
            AgentAction::Wait { .. } => "wait",
            AgentAction::Screenshot {} => "screenshot",
            AgentAction::Speak { .. } => "speak",
            AgentAction::ClickElement { .. } => "click_element",
            AgentAction::TypeIntoElement { .. } => "type_into_element",
            AgentAction::FocusElement { .. } => "focus_element",
            AgentAction::SelectOption { .. } => "select_option",
            AgentAction::NavigateUrl { .. } => "navigate_url",
            AgentAction::OpenApp { .. } => "open_app",
            AgentAction::Done { .. } => "done",
            AgentAction::Fail { .. } => "fail",
        }
    }

    /// Semantic actions target named elements/URLs/apps rather than raw
    /// coordinates and are dispatched through the semantic router.
    pub fn is_semantic(&self) -> bool {
        matches!(
            self,
            AgentAction::ClickElement { .. }
                | AgentAction::TypeIntoElement { .. }
                | AgentAction::FocusElement { .. }
                | AgentAction::SelectOption { .. }
                | AgentAction::NavigateUrl { .. }
                | AgentAction::OpenApp { .. }
        )
    }

    /// Pointer actions that drive the cursor to raw coordinates.
    pub fn is_pointer_coordinate(&self) -> bool {
        matches!(
            self,
            AgentAction::Click { .. }
                | AgentAction::DoubleClick { .. }
                | AgentAction::RightClick { .. }
                | AgentAction::Move { .. }
                | AgentAction::Drag { .. }
        )
    }

    /// Terminal actions are handled by the orchestrator, never dispatched.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentAction::Done { .. } | AgentAction::Fail { .. })
    }

    /// The semantic target carried by this action, if any.
    pub fn target(&self) -> Option<&SemanticTarget> {
        match self {
            AgentAction::ClickElement { target }
            | AgentAction::TypeIntoElement { target, .. }
            | AgentAction::FocusElement { target }
            | AgentAction::SelectOption { target, .. }
            | AgentAction::NavigateUrl { target, .. }
            | AgentAction::OpenApp { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Short human-readable description for progress messages.
    pub fn describe(&self) -> String {
        match self {
            AgentAction::Click { x, y }
            | AgentAction::DoubleClick { x, y }
            | AgentAction::RightClick { x, y }
            | AgentAction::Move { x, y } => format!("{} at ({x}, {y})", self.kind()),
            AgentAction::Drag { from, to } => {
                format!("drag from ({}, {}) to ({}, {})", from[0], from[1], to[0], to[1])
            }
            AgentAction::Type { text } => format!("type: {text}"),
            AgentAction::Hotkey { keys } => format!("hotkey: {}", keys.join("+")),
            AgentAction::Scroll { direction, amount } => {
                let dir = match direction {
                    ScrollDirection::Up => "up",
                    ScrollDirection::Down => "down",
                };
                format!("scroll {dir} {amount}")
            }
            AgentAction::Wait { seconds } => format!("wait {seconds}s"),
            AgentAction::Screenshot {} => "capture screenshot".to_string(),
            AgentAction::Speak { message } => format!("speak: {message}"),
            AgentAction::Done { .. } => "task completed".to_string(),
            AgentAction::Fail { .. } => "task failed".to_string(),
            AgentAction::OpenApp { app, .. } => format!("open app: {app}"),
            AgentAction::NavigateUrl { url, .. } => format!("navigate to {url}"),
            AgentAction::ClickElement { target }
            | AgentAction::TypeIntoElement { target, .. }
            | AgentAction::FocusElement { target }
            | AgentAction::SelectOption { target, .. } => {
                format!(
                    "{}: {}",
                    self.kind(),
                    serde_json::to_string(target).unwrap_or_default()
                )
            }
        }
    }
}

/// Untyped action as emitted by the planner, before normalization.
///
/// Invariant: `parameters` is always a map. Parsing coerces a missing or
/// non-object `parameters` value to an empty map rather than failing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawAction {
    pub action: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl RawAction {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            parameters: Map::new(),
        }
    }

    /// Extract an action from free-form planner text.
    ///
    /// Takes the span from the first `{` to the last `}` and parses it. The
    /// payload must be an object with a string `action` field; anything in
    /// `parameters` that is not an object is replaced by an empty map.
    pub fn from_planner_text(raw: &str) -> Option<Self> {
        let start = raw.find('{')?;
        let end = raw.rfind('}')?;
        if end <= start {
            return None;
        }
        let value: Value = serde_json::from_str(&raw[start..=end]).ok()?;
        Self::from_value(value)
    }

    /// Build from an already-parsed JSON value, applying the parameters-map
    /// coercion.
    pub fn from_value(value: Value) -> Option<Self> {
        let obj = value.as_object()?;
        let action = obj.get("action")?.as_str()?.to_string();
        let parameters = match obj.get("parameters") {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };
        Some(Self { action, parameters })
    }

    /// Read the `target` parameter as a semantic target, tolerating any
    /// malformed shape (which becomes an empty target).
    pub fn target(&self) -> SemanticTarget {
        self.parameters
            .get("target")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }

    pub fn set_target(&mut self, target: &SemanticTarget) {
        if let Ok(value) = serde_json::to_value(target) {
            self.parameters.insert("target".to_string(), value);
        }
    }

    pub fn str_param(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(Value::as_str)
    }
}

impl From<&AgentAction> for RawAction {
    fn from(action: &AgentAction) -> Self {
        // The typed enum serializes to the exact wire schema, so a round
        // trip through Value is lossless.
        serde_json::to_value(action)
            .ok()
            .and_then(RawAction::from_value)
            .unwrap_or_else(|| RawAction::new(action.kind()))
    }
}

#[cfg(test)]
#[path = "action_tests.rs"]
mod tests;
