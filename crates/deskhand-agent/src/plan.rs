//! Intent-first planning: deterministic action plans for well-understood
//! intents, and intent-derived defaults for actions the vision planner
//! returns with missing pieces.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;

use deskhand_protocols::action::{AgentAction, RawAction, ScrollDirection, SemanticTarget};
use deskhand_protocols::intent::{IntentSpec, IntentType};

static SEND_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bsend\b").unwrap());
static GMAIL_COMPOSE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)mail\.google\.com/mail/(?:u/\d+/)?\?view=cm").unwrap());
static MINUTES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(m|min|minute|minutes)\b").unwrap());
static SECONDS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(s|sec|second|seconds)\b").unwrap());

/// Expand an intent into a deterministic action sequence, or an empty plan
/// when the intent has no direct mapping and needs the vision loop.
pub fn build_intent_plan(intent: &IntentSpec) -> Vec<AgentAction> {
    let app = intent
        .target_app
        .clone()
        .or_else(|| intent.targets.app.clone());
    let url = intent.targets.url.clone();
    let element = intent.targets.element.clone();
    let text = intent.targets.text.clone();
    let coords = intent.targets.coords;
    let window_title = intent.target_window.clone();

    match intent.intent_type {
        IntentType::OpenApp => match app {
            Some(app) => vec![AgentAction::OpenApp {
                app: app.clone(),
                target: SemanticTarget {
                    app: Some(app),
                    window_title,
                    ..SemanticTarget::default()
                },
            }],
            None => Vec::new(),
        },
        IntentType::NavigateUrl => match url {
            Some(url) => vec![AgentAction::NavigateUrl {
                url: url.clone(),
                target: SemanticTarget {
                    url: Some(url),
                    app,
                    window_title,
                    ..SemanticTarget::default()
                },
            }],
            None => Vec::new(),
        },
        IntentType::ClickElement => {
            if let Some(point) = coords {
                return vec![AgentAction::Click {
                    x: point.x,
                    y: point.y,
                }];
            }
            match element {
                Some(name) => vec![AgentAction::ClickElement {
                    target: SemanticTarget {
                        name: Some(name),
                        app,
                        window_title,
                        ..SemanticTarget::default()
                    },
                }],
                None => Vec::new(),
            }
        }
        IntentType::TypeText => {
            let Some(text) = text else {
                return Vec::new();
            };
            match element {
                Some(name) => vec![AgentAction::TypeIntoElement {
                    text: text.clone(),
                    target: SemanticTarget {
                        name: Some(name),
                        text: Some(text),
                        app,
                        window_title,
                        ..SemanticTarget::default()
                    },
                }],
                None => vec![AgentAction::Type { text }],
            }
        }
        IntentType::PressHotkey => match intent.targets.hotkey.clone() {
            Some(keys) if !keys.is_empty() => vec![AgentAction::Hotkey { keys }],
            _ => Vec::new(),
        },
        IntentType::Scroll => {
            let direction = if element.as_deref() == Some("up") {
                ScrollDirection::Up
            } else {
                ScrollDirection::Down
            };
            vec![AgentAction::Scroll {
                direction,
                amount: 350,
            }]
        }
        IntentType::Wait => vec![AgentAction::Wait {
            seconds: extract_wait_seconds(&intent.objective),
        }],
        IntentType::MultiStepGoal => {
            let mut actions = Vec::new();
            let send_requested = SEND_RE.is_match(&intent.objective.to_lowercase());
            let gmail_compose = url
                .as_deref()
                .map(|u| GMAIL_COMPOSE_RE.is_match(u))
                .unwrap_or(false);

            if let (Some(app), None) = (app.as_ref(), url.as_ref()) {
                actions.push(AgentAction::OpenApp {
                    app: app.clone(),
                    target: SemanticTarget {
                        app: Some(app.clone()),
                        window_title: window_title.clone(),
                        ..SemanticTarget::default()
                    },
                });
            }
            if app.is_some() && url.is_some() && !gmail_compose {
                actions.push(AgentAction::Wait { seconds: 0.8 });
            }
            if let Some(url) = url {
                actions.push(AgentAction::NavigateUrl {
                    url: url.clone(),
                    target: SemanticTarget {
                        url: Some(url),
                        app: app.clone(),
                        window_title: window_title.clone(),
                        ..SemanticTarget::default()
                    },
                });
            }
            if gmail_compose && send_requested {
                actions.push(AgentAction::Wait { seconds: 1.0 });
                actions.push(AgentAction::ClickElement {
                    target: SemanticTarget {
                        name: Some("Send".to_string()),
                        app: Some(app.unwrap_or_else(|| "chrome".to_string())),
                        window_title: Some("Gmail".to_string()),
                        ..SemanticTarget::default()
                    },
                });
            }
            actions
        }
        IntentType::Stop | IntentType::Unknown => Vec::new(),
    }
}

/// Fill holes in a planner-proposed action from the current intent before
/// normalization. An unresolvable element click with known coordinates is
/// rewritten to a plain coordinate click.
pub fn apply_intent_defaults(mut raw: RawAction, intent: &IntentSpec) -> RawAction {
    let mut target = raw.target();

    if raw.action == "click_element" && !target.is_resolved() {
        if let Some(coords) = intent.targets.coords {
            let mut click = RawAction::new("click");
            click.parameters.insert("x".to_string(), json!(coords.x));
            click.parameters.insert("y".to_string(), json!(coords.y));
            return click;
        }
    }

    match raw.action.as_str() {
        "navigate_url" => {
            if raw.str_param("url").is_none() {
                if let Some(url) = &intent.targets.url {
                    raw.parameters.insert("url".to_string(), json!(url));
                    target.url = Some(url.clone());
                    raw.set_target(&target);
                }
            }
        }
        "open_app" => {
            if raw.str_param("app").is_none() {
                if let Some(app) = intent
                    .target_app
                    .as_ref()
                    .or(intent.targets.app.as_ref())
                {
                    raw.parameters.insert("app".to_string(), json!(app));
                    target.app = Some(app.clone());
                    raw.set_target(&target);
                }
            }
        }
        "click_element" | "focus_element" | "select_option" => {
            if target.name.is_none() && target.selector.is_none() {
                if let Some(element) = &intent.targets.element {
                    target.name = Some(element.clone());
                    raw.set_target(&target);
                }
            }
        }
        "type_into_element" => {
            if raw.str_param("text").is_none() {
                if let Some(text) = &intent.targets.text {
                    raw.parameters.insert("text".to_string(), json!(text));
                }
            }
            if target.name.is_none() && target.selector.is_none() {
                if let Some(element) = &intent.targets.element {
                    target.name = Some(element.clone());
                    raw.set_target(&target);
                }
            }
        }
        _ => {}
    }

    raw
}

/// Pull a wait duration out of the objective text, clamped to the same
/// bounds the normalizer enforces. Defaults to one second.
pub fn extract_wait_seconds(objective: &str) -> f64 {
    if let Some(caps) = MINUTES_RE.captures(objective) {
        if let Ok(minutes) = caps[1].parse::<f64>() {
            return (minutes * 60.0).clamp(0.1, 30.0);
        }
    }
    if let Some(caps) = SECONDS_RE.captures(objective) {
        if let Ok(seconds) = caps[1].parse::<f64>() {
            return seconds.clamp(0.1, 30.0);
        }
    }
    1.0
}

#[cfg(test)]
#[path = "plan_tests.rs"]
mod tests;
