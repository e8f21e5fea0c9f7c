//! Intent parsing: deterministic rules first, model fallback second.
//!
//! The rule table covers the common command shapes with fixed confidences;
//! anything it cannot place goes to the intent model, whose JSON reply is
//! normalized into the same structure. Results below the configured
//! confidence threshold always come back flagged for clarification.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

use deskhand_protocols::action::Point;
use deskhand_protocols::intent::{
    clamp_confidence, default_forbidden_terms, IntentConstraints, IntentParseResult, IntentSource,
    IntentSpec, IntentTargets, IntentType, PreferredSurface,
};

use crate::meter::{MeterPhase, TokenMeter};
use crate::planner::{Planner, PlannerError, PlannerMessage, PlannerRequest};

static URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bhttps?://\S+|\b(?:www\.)?[a-z0-9.-]+\.[a-z]{2,}(?:/\S*)?").unwrap()
});
static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}\b").unwrap());
static COORDS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d{1,4})\s*[,x]\s*(\d{1,4})").unwrap());
static QUOTED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#""([^"]+)""#).unwrap());
static HOTKEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:ctrl|alt|shift|cmd|win)\s*\+\s*[a-z0-9]+\b").unwrap());

static STOP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(stop|cancel|abort)\b").unwrap());
static GMAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bgmail\b").unwrap());
static COMPOSE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(compose|email|mail)\b").unwrap());
static SEND_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bsend\b").unwrap());
static OPEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bopen\b").unwrap());
static GOTO_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(go to|visit|navigate)\b").unwrap());
static APP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bopen\s+([a-z0-9 ._-]+)").unwrap());
static CLICK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bclick\b").unwrap());
static CLICK_PREFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\s*click\s*").unwrap());
static TYPE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(type|enter)\b").unwrap());
static PRESS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(press|hotkey|shortcut)\b").unwrap());
static SCROLL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bscroll\b").unwrap());
static WAIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bwait\b").unwrap());
static UP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bup\b").unwrap());
static DOWN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bdown\b").unwrap());
static BROWSERY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)tab|browser|chrome|url|website|page").unwrap());
static SCROLL_BROWSERY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)browser|chrome|website|page").unwrap());
static SENSITIVE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bpassword|token|api key|secret\b").unwrap());

const CLARIFY_LOW_CONFIDENCE: &str = "Please clarify your command with a clearer verb and target, \
for example: 'open chrome and go to github.com'.";
const CLARIFY_REPHRASE: &str = "Please rephrase with a clear verb and target, \
for example: 'open chrome and go to github.com'.";
const CLARIFY_UNPARSEABLE: &str = "I could not confidently interpret your command. \
Try: 'open <app>', 'go to <url>', 'click <element>', 'type \"text\" in <field>'.";

#[derive(Debug, Error)]
pub enum IntentParseError {
    #[error(transparent)]
    Planner(#[from] PlannerError),
    #[error("intent model returned non-JSON output")]
    NonJson,
}

pub struct IntentParser {
    planner: Arc<dyn Planner>,
    model: String,
    min_confidence: f64,
    meter: Arc<TokenMeter>,
}

impl IntentParser {
    pub fn new(
        planner: Arc<dyn Planner>,
        model: impl Into<String>,
        min_confidence: f64,
        meter: Arc<TokenMeter>,
    ) -> Self {
        Self {
            planner,
            model: model.into(),
            min_confidence: clamp_confidence(min_confidence),
            meter,
        }
    }

    /// Parse a free-text command. Deterministic results above the threshold
    /// win outright; everything else consults the intent model, and model
    /// failure degrades to an `unknown` intent asking for clarification.
    pub async fn parse(&self, command: &str) -> IntentParseResult {
        if let Some(deterministic) = deterministic_parse(command) {
            if deterministic.confidence >= self.min_confidence
                && !deterministic.clarification_needed
            {
                return deterministic;
            }
        }

        match self.model_parse(command).await {
            Ok(result) if result.confidence < self.min_confidence => {
                let question = result
                    .clarification_question
                    .clone()
                    .unwrap_or_else(|| CLARIFY_LOW_CONFIDENCE.to_string());
                IntentParseResult {
                    clarification_needed: true,
                    clarification_question: Some(question),
                    ..result
                }
            }
            Ok(result) => result,
            Err(error) => {
                tracing::warn!(%error, "intent model parse failed");
                IntentParseResult {
                    intent: IntentSpec::unknown(command),
                    confidence: 0.0,
                    clarification_needed: true,
                    clarification_question: Some(CLARIFY_UNPARSEABLE.to_string()),
                    source: IntentSource::Model,
                }
            }
        }
    }

    async fn model_parse(&self, command: &str) -> Result<IntentParseResult, IntentParseError> {
        let request = PlannerRequest {
            model: self.model.clone(),
            max_tokens: 350,
            temperature: Some(0.0),
            messages: vec![
                PlannerMessage::system(intent_system_prompt()),
                PlannerMessage::user(command),
            ],
        };
        let reply = self.planner.complete(request).await?;
        if let Some(usage) = reply.usage {
            self.meter
                .record(MeterPhase::IntentParser, &self.model, &usage);
        }

        let wire = extract_json(&reply.content).ok_or(IntentParseError::NonJson)?;
        Ok(self.normalize(command, wire))
    }

    fn normalize(&self, command: &str, wire: WireParseResult) -> IntentParseResult {
        let mut result = wire.into_result(command);
        if result.intent.constraints.forbidden_terms.is_empty() {
            result.intent.constraints.forbidden_terms = default_forbidden_terms();
        }
        if result.confidence < self.min_confidence && !result.clarification_needed {
            result.clarification_needed = true;
            result
                .clarification_question
                .get_or_insert_with(|| CLARIFY_REPHRASE.to_string());
        }
        result
    }
}

fn intent_system_prompt() -> String {
    [
        "You are an intent parser for a desktop automation agent.",
        "Return ONLY valid JSON with this schema:",
        "{",
        "  \"intent\": {",
        "    \"intentType\": \"open_app|navigate_url|click_element|type_text|press_hotkey|scroll|wait|stop|multi_step_goal|unknown\",",
        "    \"objective\": \"string\",",
        "    \"preferredSurface\": \"desktop|browser (optional)\",",
        "    \"targetApp\": \"string (optional)\",",
        "    \"targetWindow\": \"string (optional)\",",
        "    \"targets\": {\"app?\":\"string\",\"url?\":\"string\",\"element?\":\"string\",\"text?\":\"string\",\"hotkey?\":[\"string\"],\"coords?\":{\"x\":number,\"y\":number}},",
        "    \"constraints\": {\"forbiddenTerms\":[\"string\"],\"requiresConfirmation\":boolean,\"maxSteps?\":number},",
        "    \"successCriteria\": \"string\"",
        "  },",
        "  \"confidence\": number,",
        "  \"clarificationNeeded\": boolean,",
        "  \"clarificationQuestion\": \"string (optional)\"",
        "}",
        "No markdown, no prose.",
    ]
    .join("\n")
}

/// Rule-table parse. Returns `None` when no rule recognizes the command.
pub fn deterministic_parse(command: &str) -> Option<IntentParseResult> {
    let raw = command.trim();
    if raw.is_empty() {
        return None;
    }
    let text = raw.to_lowercase();

    let url_match = URL_RE.find(raw).map(|m| m.as_str().trim().to_string());
    let email_match = EMAIL_RE.find(raw).map(|m| m.as_str().trim().to_string());
    let coords_match = COORDS_RE.captures(raw).and_then(|caps| {
        let x = caps.get(1)?.as_str().parse::<i32>().ok()?;
        let y = caps.get(2)?.as_str().parse::<i32>().ok()?;
        Some(Point { x, y })
    });
    let quoted_match = QUOTED_RE
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string());

    if STOP_RE.is_match(&text) {
        return Some(deterministic(
            IntentSpec {
                intent_type: IntentType::Stop,
                objective: "Stop the running task safely".to_string(),
                preferred_surface: Some(PreferredSurface::Desktop),
                target_app: None,
                target_window: None,
                targets: IntentTargets::default(),
                constraints: default_constraints(),
                success_criteria: "Current automation loop stops".to_string(),
            },
            0.98,
        ));
    }

    if GMAIL_RE.is_match(&text) && COMPOSE_RE.is_match(&text) {
        if let Some(recipient) = email_match {
            let body = quoted_match.clone().unwrap_or_default();
            let send_requested = SEND_RE.is_match(&text);
            let compose_url = format!(
                "https://mail.google.com/mail/u/0/?view=cm&fs=1&to={}&body={}",
                encode_uri_component(&recipient),
                encode_uri_component(&body),
            );
            return Some(deterministic(
                IntentSpec {
                    intent_type: IntentType::MultiStepGoal,
                    objective: raw.to_string(),
                    preferred_surface: Some(PreferredSurface::Browser),
                    target_app: Some("chrome".to_string()),
                    target_window: None,
                    targets: IntentTargets {
                        app: Some("chrome".to_string()),
                        url: Some(compose_url),
                        element: send_requested.then(|| "Send".to_string()),
                        text: Some(body),
                        ..IntentTargets::default()
                    },
                    constraints: default_constraints(),
                    success_criteria: if send_requested {
                        "Gmail compose is opened with recipient/body and send action is attempted."
                    } else {
                        "Gmail compose is opened with recipient/body prefilled."
                    }
                    .to_string(),
                },
                0.93,
            ));
        }
    }

    let app_match = APP_RE
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|app| !app.is_empty());

    if OPEN_RE.is_match(&text) && (GOTO_RE.is_match(&text) || url_match.is_some()) {
        return Some(deterministic(
            IntentSpec {
                intent_type: IntentType::MultiStepGoal,
                objective: raw.to_string(),
                preferred_surface: Some(PreferredSurface::Browser),
                target_app: app_match.clone(),
                target_window: None,
                targets: IntentTargets {
                    app: app_match,
                    url: url_match,
                    ..IntentTargets::default()
                },
                constraints: default_constraints(),
                success_criteria: "Requested app opens and target destination is reached"
                    .to_string(),
            },
            0.9,
        ));
    }

    if GOTO_RE.is_match(&text) {
        if let Some(url) = url_match.clone() {
            return Some(deterministic(
                IntentSpec {
                    intent_type: IntentType::NavigateUrl,
                    objective: raw.to_string(),
                    preferred_surface: Some(PreferredSurface::Browser),
                    target_app: None,
                    target_window: None,
                    targets: IntentTargets {
                        url: Some(url),
                        ..IntentTargets::default()
                    },
                    constraints: default_constraints(),
                    success_criteria: "Target URL is opened in an active browser".to_string(),
                },
                0.94,
            ));
        }
    }

    if OPEN_RE.is_match(&text) && url_match.is_none() {
        let browserish = app_match
            .as_deref()
            .map(|app| app.to_lowercase().contains("chrome"))
            .unwrap_or(false);
        let has_app = app_match.is_some();
        return Some(IntentParseResult {
            intent: IntentSpec {
                intent_type: IntentType::OpenApp,
                objective: raw.to_string(),
                preferred_surface: Some(if browserish {
                    PreferredSurface::Browser
                } else {
                    PreferredSurface::Desktop
                }),
                target_app: app_match.clone(),
                target_window: None,
                targets: IntentTargets {
                    app: app_match,
                    ..IntentTargets::default()
                },
                constraints: default_constraints(),
                success_criteria: "Application is launched and visible".to_string(),
            },
            confidence: if has_app { 0.88 } else { 0.62 },
            clarification_needed: !has_app,
            clarification_question: (!has_app)
                .then(|| "Which application should I open?".to_string()),
            source: IntentSource::Deterministic,
        });
    }

    if CLICK_RE.is_match(&text) {
        let targets = match coords_match {
            Some(coords) => IntentTargets {
                coords: Some(coords),
                ..IntentTargets::default()
            },
            None => IntentTargets {
                element: Some(CLICK_PREFIX_RE.replace(raw, "").trim().to_string())
                    .filter(|element| !element.is_empty()),
                ..IntentTargets::default()
            },
        };
        return Some(deterministic(
            IntentSpec {
                intent_type: IntentType::ClickElement,
                objective: raw.to_string(),
                preferred_surface: Some(if BROWSERY_RE.is_match(raw) {
                    PreferredSurface::Browser
                } else {
                    PreferredSurface::Desktop
                }),
                target_app: None,
                target_window: None,
                targets,
                constraints: default_constraints(),
                success_criteria: "Requested click interaction is completed".to_string(),
            },
            if coords_match.is_some() { 0.96 } else { 0.78 },
        ));
    }

    if TYPE_RE.is_match(&text) {
        let has_text = quoted_match.is_some();
        return Some(IntentParseResult {
            intent: IntentSpec {
                intent_type: IntentType::TypeText,
                objective: raw.to_string(),
                preferred_surface: Some(if BROWSERY_RE.is_match(raw) {
                    PreferredSurface::Browser
                } else {
                    PreferredSurface::Desktop
                }),
                target_app: None,
                target_window: None,
                targets: IntentTargets {
                    text: quoted_match,
                    ..IntentTargets::default()
                },
                constraints: IntentConstraints {
                    forbidden_terms: default_forbidden_terms(),
                    requires_confirmation: SENSITIVE_RE.is_match(&text),
                    max_steps: None,
                },
                success_criteria: "Requested text is entered in target input".to_string(),
            },
            confidence: if has_text { 0.9 } else { 0.58 },
            clarification_needed: !has_text,
            clarification_question: (!has_text)
                .then(|| "What exact text should be typed? Use quotes for clarity.".to_string()),
            source: IntentSource::Deterministic,
        });
    }

    if PRESS_RE.is_match(&text) {
        if let Some(combo) = HOTKEY_RE.find(raw) {
            let keys: Vec<String> = combo
                .as_str()
                .to_lowercase()
                .split('+')
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty())
                .collect();
            return Some(deterministic(
                IntentSpec {
                    intent_type: IntentType::PressHotkey,
                    objective: raw.to_string(),
                    preferred_surface: Some(PreferredSurface::Desktop),
                    target_app: None,
                    target_window: None,
                    targets: IntentTargets {
                        hotkey: Some(keys),
                        ..IntentTargets::default()
                    },
                    constraints: default_constraints(),
                    success_criteria: "Requested hotkey has been pressed".to_string(),
                },
                0.95,
            ));
        }
    }

    if SCROLL_RE.is_match(&text) {
        let direction = if UP_RE.is_match(&text) {
            Some("up")
        } else if DOWN_RE.is_match(&text) {
            Some("down")
        } else {
            None
        };
        return Some(IntentParseResult {
            intent: IntentSpec {
                intent_type: IntentType::Scroll,
                objective: raw.to_string(),
                preferred_surface: Some(if SCROLL_BROWSERY_RE.is_match(raw) {
                    PreferredSurface::Browser
                } else {
                    PreferredSurface::Desktop
                }),
                target_app: None,
                target_window: None,
                targets: IntentTargets {
                    element: direction.map(str::to_string),
                    ..IntentTargets::default()
                },
                constraints: default_constraints(),
                success_criteria: "Screen view has been scrolled in requested direction"
                    .to_string(),
            },
            confidence: if direction.is_some() { 0.88 } else { 0.67 },
            clarification_needed: direction.is_none(),
            clarification_question: direction
                .is_none()
                .then(|| "Should I scroll up or down?".to_string()),
            source: IntentSource::Deterministic,
        });
    }

    if WAIT_RE.is_match(&text) {
        return Some(deterministic(
            IntentSpec {
                intent_type: IntentType::Wait,
                objective: raw.to_string(),
                preferred_surface: Some(PreferredSurface::Desktop),
                target_app: None,
                target_window: None,
                targets: IntentTargets::default(),
                constraints: default_constraints(),
                success_criteria: "Wait period completes".to_string(),
            },
            0.9,
        ));
    }

    None
}

fn deterministic(intent: IntentSpec, confidence: f64) -> IntentParseResult {
    IntentParseResult {
        intent,
        confidence,
        clarification_needed: false,
        clarification_question: None,
        source: IntentSource::Deterministic,
    }
}

fn default_constraints() -> IntentConstraints {
    IntentConstraints {
        forbidden_terms: default_forbidden_terms(),
        requires_confirmation: false,
        max_steps: None,
    }
}

/// Percent-encode a query component the way browsers do for compose links.
fn encode_uri_component(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

fn extract_json(raw: &str) -> Option<WireParseResult> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&raw[start..=end]).ok()
}

// Wire shapes for the model reply, following the camelCase schema in the
// system prompt. Every field is optional; missing pieces default.

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WireParseResult {
    intent: WireIntent,
    confidence: f64,
    clarification_needed: bool,
    clarification_question: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WireIntent {
    intent_type: Option<String>,
    objective: Option<String>,
    preferred_surface: Option<String>,
    target_app: Option<String>,
    target_window: Option<String>,
    targets: WireTargets,
    constraints: WireConstraints,
    success_criteria: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WireTargets {
    app: Option<String>,
    url: Option<String>,
    element: Option<String>,
    text: Option<String>,
    hotkey: Option<Vec<String>>,
    coords: Option<WireCoords>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireCoords {
    x: f64,
    y: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct WireConstraints {
    forbidden_terms: Vec<String>,
    requires_confirmation: bool,
    max_steps: Option<u32>,
}

impl WireParseResult {
    fn into_result(self, command: &str) -> IntentParseResult {
        let intent_type = match self.intent.intent_type.as_deref() {
            Some("open_app") => IntentType::OpenApp,
            Some("navigate_url") => IntentType::NavigateUrl,
            Some("click_element") => IntentType::ClickElement,
            Some("type_text") => IntentType::TypeText,
            Some("press_hotkey") => IntentType::PressHotkey,
            Some("scroll") => IntentType::Scroll,
            Some("wait") => IntentType::Wait,
            Some("stop") => IntentType::Stop,
            Some("multi_step_goal") => IntentType::MultiStepGoal,
            _ => IntentType::Unknown,
        };
        let preferred_surface = match self.intent.preferred_surface.as_deref() {
            Some("browser") => Some(PreferredSurface::Browser),
            Some("desktop") => Some(PreferredSurface::Desktop),
            _ => None,
        };
        let intent = IntentSpec {
            intent_type,
            objective: self
                .intent
                .objective
                .unwrap_or_else(|| command.to_string()),
            preferred_surface,
            target_app: self.intent.target_app,
            target_window: self.intent.target_window,
            targets: IntentTargets {
                app: self.intent.targets.app,
                url: self.intent.targets.url,
                element: self.intent.targets.element,
                text: self.intent.targets.text,
                hotkey: self.intent.targets.hotkey,
                coords: self.intent.targets.coords.map(|coords| Point {
                    x: coords.x.round() as i32,
                    y: coords.y.round() as i32,
                }),
            },
            constraints: IntentConstraints {
                forbidden_terms: self.intent.constraints.forbidden_terms,
                requires_confirmation: self.intent.constraints.requires_confirmation,
                max_steps: self.intent.constraints.max_steps,
            },
            success_criteria: self
                .intent
                .success_criteria
                .unwrap_or_else(|| "Clarify user command before execution".to_string()),
        };
        IntentParseResult {
            intent,
            confidence: clamp_confidence(self.confidence),
            clarification_needed: self.clarification_needed,
            clarification_question: self.clarification_question,
            source: IntentSource::Model,
        }
    }
}

#[cfg(test)]
#[path = "intent_tests.rs"]
mod tests;
