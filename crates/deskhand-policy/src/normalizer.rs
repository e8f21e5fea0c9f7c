//! Converts untyped planner output into validated, typed actions.
//!
//! Every coordinate is rounded and clamped into the viewport, every
//! free-form field is coerced or defaulted, and every structurally invalid
//! payload is rejected with a stable error code before execution.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use deskhand_protocols::{
    AgentAction, ErrorCode, Point, RawAction, ScrollDirection, SemanticTarget,
};

static KEY_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9]+$").unwrap());

const SCROLL_DEFAULT_AMOUNT: f64 = 250.0;
const SCROLL_MIN: i32 = 10;
const SCROLL_MAX: i32 = 2400;
const WAIT_MIN_SECONDS: f64 = 0.1;
const WAIT_MAX_SECONDS: f64 = 30.0;

/// Screen dimensions the planner's coordinates are clamped into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: i32,
    pub height: i32,
}

impl Viewport {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    fn clamp_x(&self, value: f64) -> i32 {
        clamp_axis(value, self.width)
    }

    fn clamp_y(&self, value: f64) -> i32 {
        clamp_axis(value, self.height)
    }
}

fn clamp_axis(value: f64, extent: i32) -> i32 {
    let max = (extent - 1).max(0);
    (value.round() as i32).clamp(0, max)
}

/// Why a raw action could not be normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizeError {
    pub code: ErrorCode,
    pub message: String,
}

impl NormalizeError {
    fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for NormalizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

impl std::error::Error for NormalizeError {}

/// Read a finite number, accepting numeric strings the planner sometimes
/// emits instead of JSON numbers.
fn num(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

fn string_or_default(raw: &RawAction, key: &str) -> String {
    raw.str_param(key).unwrap_or_default().to_string()
}

fn point(raw: &RawAction, viewport: Viewport) -> Result<(i32, i32), NormalizeError> {
    let x = num(raw.parameters.get("x"));
    let y = num(raw.parameters.get("y"));
    match (x, y) {
        (Some(x), Some(y)) => Ok((viewport.clamp_x(x), viewport.clamp_y(y))),
        _ => Err(NormalizeError::new(
            ErrorCode::InvalidCoordinates,
            "Missing x/y coordinates",
        )),
    }
}

fn drag_endpoint(value: Option<&Value>, viewport: Viewport) -> Option<[i32; 2]> {
    let pair = value?.as_array()?;
    if pair.len() < 2 {
        return None;
    }
    let x = num(pair.first())?;
    let y = num(pair.get(1))?;
    Some([viewport.clamp_x(x), viewport.clamp_y(y)])
}

fn hotkey_keys(raw: &RawAction) -> Result<Vec<String>, NormalizeError> {
    let keys = raw
        .parameters
        .get("keys")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.trim().to_lowercase()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .filter(|key| KEY_NAME.is_match(key))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    if keys.is_empty() {
        return Err(NormalizeError::new(
            ErrorCode::InvalidHotkey,
            "Hotkey requires valid keys array",
        ));
    }
    Ok(keys)
}

/// Rebuild a target from whatever shape the planner produced, keeping only
/// well-typed fields and rounding coordinates.
fn normalize_target(raw: &Value) -> SemanticTarget {
    let Some(obj) = raw.as_object() else {
        return SemanticTarget::default();
    };
    let field = |key: &str| obj.get(key).and_then(Value::as_str).map(str::to_string);
    let coords = obj.get("coords").and_then(|c| {
        let x = num(c.get("x"))?;
        let y = num(c.get("y"))?;
        Some(Point {
            x: x.round() as i32,
            y: y.round() as i32,
        })
    });
    SemanticTarget {
        element_id: field("elementId"),
        role: field("role"),
        name: field("name"),
        app: field("app"),
        window_title: field("windowTitle"),
        selector: field("selector"),
        url: field("url"),
        text: field("text"),
        coords,
    }
}

fn target_of(raw: &RawAction) -> SemanticTarget {
    raw.parameters
        .get("target")
        .map(normalize_target)
        .unwrap_or_default()
}

fn require_resolved(target: &SemanticTarget, action: &str) -> Result<(), NormalizeError> {
    if target.is_resolved() {
        Ok(())
    } else {
        Err(NormalizeError::new(
            ErrorCode::TargetUnresolved,
            format!("{action} requires a semantic target"),
        ))
    }
}

/// Validate and coerce an untyped action into the typed schema.
pub fn normalize_action(
    raw: &RawAction,
    viewport: Viewport,
) -> Result<AgentAction, NormalizeError> {
    match raw.action.as_str() {
        "click" => point(raw, viewport).map(|(x, y)| AgentAction::Click { x, y }),
        "double_click" => point(raw, viewport).map(|(x, y)| AgentAction::DoubleClick { x, y }),
        "right_click" => point(raw, viewport).map(|(x, y)| AgentAction::RightClick { x, y }),
        "move" => point(raw, viewport).map(|(x, y)| AgentAction::Move { x, y }),
        "drag" => {
            let from = drag_endpoint(raw.parameters.get("from"), viewport);
            let to = drag_endpoint(raw.parameters.get("to"), viewport);
            match (from, to) {
                (Some(from), Some(to)) => Ok(AgentAction::Drag { from, to }),
                _ => Err(NormalizeError::new(
                    ErrorCode::InvalidDragPayload,
                    "Drag requires from/to coordinate pairs",
                )),
            }
        }
        "type" => Ok(AgentAction::Type {
            text: string_or_default(raw, "text"),
        }),
        "hotkey" => hotkey_keys(raw).map(|keys| AgentAction::Hotkey { keys }),
        "scroll" => {
            let direction = match raw.str_param("direction") {
                Some(d) if d.eq_ignore_ascii_case("up") => ScrollDirection::Up,
                _ => ScrollDirection::Down,
            };
            let amount = num(raw.parameters.get("amount")).unwrap_or(SCROLL_DEFAULT_AMOUNT);
            Ok(AgentAction::Scroll {
                direction,
                amount: (amount.round() as i32).clamp(SCROLL_MIN, SCROLL_MAX),
            })
        }
        "wait" => {
            let seconds = num(raw.parameters.get("seconds")).unwrap_or(1.0);
            Ok(AgentAction::Wait {
                seconds: seconds.clamp(WAIT_MIN_SECONDS, WAIT_MAX_SECONDS),
            })
        }
        "screenshot" => Ok(AgentAction::Screenshot {}),
        "speak" => Ok(AgentAction::Speak {
            message: string_or_default(raw, "message"),
        }),
        "navigate_url" => {
            let mut target = target_of(raw);
            let url = raw
                .str_param("url")
                .map(str::to_string)
                .or_else(|| target.url.clone())
                .ok_or_else(|| {
                    NormalizeError::new(ErrorCode::MissingTargetUrl, "navigate_url requires url")
                })?;
            target.url = Some(url.clone());
            Ok(AgentAction::NavigateUrl { url, target })
        }
        "open_app" => {
            let mut target = target_of(raw);
            let app = raw
                .str_param("app")
                .map(str::to_string)
                .or_else(|| target.app.clone())
                .ok_or_else(|| {
                    NormalizeError::new(ErrorCode::MissingTargetApp, "open_app requires app")
                })?;
            target.app = Some(app.clone());
            Ok(AgentAction::OpenApp { app, target })
        }
        "type_into_element" => {
            let mut target = target_of(raw);
            let text = raw
                .str_param("text")
                .map(str::to_string)
                .or_else(|| target.text.clone())
                .ok_or_else(|| {
                    NormalizeError::new(
                        ErrorCode::MissingTargetText,
                        "type_into_element requires text",
                    )
                })?;
            require_resolved(&target, "type_into_element")?;
            target.text = Some(text.clone());
            Ok(AgentAction::TypeIntoElement { text, target })
        }
        "click_element" => {
            let target = target_of(raw);
            require_resolved(&target, "click_element")?;
            Ok(AgentAction::ClickElement { target })
        }
        "focus_element" => {
            let target = target_of(raw);
            require_resolved(&target, "focus_element")?;
            Ok(AgentAction::FocusElement { target })
        }
        "select_option" => {
            let target = target_of(raw);
            require_resolved(&target, "select_option")?;
            Ok(AgentAction::SelectOption {
                value: string_or_default(raw, "value"),
                target,
            })
        }
        "done" => Ok(AgentAction::Done {
            summary: string_or_default(raw, "summary"),
        }),
        "fail" => Ok(AgentAction::Fail {
            reason: string_or_default(raw, "reason"),
        }),
        other => Err(NormalizeError::new(
            ErrorCode::UnsupportedAction,
            format!("Unsupported action '{other}'"),
        )),
    }
}

#[cfg(test)]
#[path = "normalizer_tests.rs"]
mod tests;
