//! Safety layer: term blocklists, destructive-action heuristics, and the
//! confirmation gate applied to every action before dispatch.

use once_cell::sync::Lazy;
use regex::Regex;

use deskhand_protocols::{AgentAction, ErrorCode, IntentSpec, SemanticTarget};

use crate::domain::evaluate_browser_target;

/// Substrings that block an action outright, regardless of intent.
pub const ALWAYS_BLOCK_TERMS: &[&str] =
    &["captcha", "bypass", "anti-bot", "unauthorized access"];

/// Substrings that force a user confirmation before dispatch.
pub const CONFIRM_TERMS: &[&str] = &[
    "delete",
    "remove",
    "format",
    "uninstall",
    "password",
    "api key",
    "token",
    "system settings",
    "registry",
    "wipe",
];

static DESTRUCTIVE_INTENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(delete|remove|format|wipe|reset|uninstall|factory reset)\b").unwrap()
});
static DESTRUCTIVE_ACTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(delete|remove|format|wipe|reset|uninstall|registry|system settings)\b")
        .unwrap()
});
static EMAIL_FLOW: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(gmail|email|mail)\b").unwrap());

/// Outcome of the safety check for one action.
#[derive(Debug, Clone, PartialEq)]
pub struct SafetyVerdict {
    pub allowed: bool,
    pub reason: Option<String>,
    pub error_code: Option<ErrorCode>,
}

impl SafetyVerdict {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
            error_code: None,
        }
    }

    pub fn blocked(reason: impl Into<String>, code: ErrorCode) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            error_code: Some(code),
        }
    }
}

/// Stateless policy configured with the domain blocklist.
#[derive(Debug, Clone, Default)]
pub struct SafetyPolicy {
    blocklist: Vec<String>,
}

impl SafetyPolicy {
    pub fn new(blocklist: Vec<String>) -> Self {
        Self { blocklist }
    }

    /// Term, domain, and target checks. Runs after the confirmation gate so
    /// a blocked action is never silently confirmed.
    pub fn check(
        &self,
        action: &AgentAction,
        task: &str,
        intent: Option<&IntentSpec>,
    ) -> SafetyVerdict {
        let payload = format!(
            "{task} {} {} {}",
            serialize_action(action),
            intent.map(|i| i.objective.as_str()).unwrap_or_default(),
            intent.map(|i| i.success_criteria.as_str()).unwrap_or_default(),
        )
        .to_lowercase();

        if let Some(term) = first_matching_term(&payload, ALWAYS_BLOCK_TERMS.iter().copied()) {
            return SafetyVerdict::blocked(
                format!("blocked term detected: {term}"),
                ErrorCode::BlockedTerm,
            );
        }

        if let Some(intent) = intent {
            let forbidden = intent
                .constraints
                .forbidden_terms
                .iter()
                .map(|term| term.to_lowercase())
                .collect::<Vec<_>>();
            if let Some(term) =
                first_matching_term(&payload, forbidden.iter().map(String::as_str))
            {
                return SafetyVerdict::blocked(
                    format!("blocked by intent constraint: {term}"),
                    ErrorCode::BlockedTerm,
                );
            }
        }

        if let Some(verdict) = self.check_domain(action) {
            return verdict;
        }
        if let Some(verdict) = check_semantic_target(action) {
            return verdict;
        }
        SafetyVerdict::allowed()
    }

    /// Whether this action must be confirmed by the user before dispatch.
    pub fn requires_confirmation(&self, action: &AgentAction, intent: Option<&IntentSpec>) -> bool {
        if action_requires_confirmation(action) {
            return true;
        }
        if let AgentAction::ClickElement { target } = action {
            let is_send_button = target
                .name
                .as_deref()
                .map(|name| name.to_lowercase().contains("send"))
                .unwrap_or(false);
            let objective = intent
                .map(|i| i.objective.to_lowercase())
                .unwrap_or_default();
            if is_send_button && EMAIL_FLOW.is_match(&objective) {
                return true;
            }
        }
        let Some(intent) = intent else {
            return false;
        };
        if intent.constraints.requires_confirmation {
            return true;
        }
        intent_appears_destructive(intent) || action_appears_destructive(action)
    }

    fn check_domain(&self, action: &AgentAction) -> Option<SafetyVerdict> {
        let AgentAction::NavigateUrl { url, .. } = action else {
            return None;
        };
        let decision = evaluate_browser_target(url, &self.blocklist);
        if decision.allowed {
            return None;
        }
        Some(SafetyVerdict {
            allowed: false,
            reason: decision.reason,
            error_code: decision.error_code.or(Some(ErrorCode::BlockedDomain)),
        })
    }
}

fn serialize_action(action: &AgentAction) -> String {
    serde_json::to_string(action).unwrap_or_else(|_| action.kind().to_string())
}

fn first_matching_term<'a>(
    payload: &str,
    terms: impl Iterator<Item = &'a str>,
) -> Option<String> {
    for term in terms {
        if !term.is_empty() && payload.contains(term) {
            return Some(term.to_string());
        }
    }
    None
}

/// Read-only and terminal actions never need confirmation.
fn action_requires_confirmation(action: &AgentAction) -> bool {
    if matches!(
        action,
        AgentAction::Done { .. }
            | AgentAction::Fail { .. }
            | AgentAction::Wait { .. }
            | AgentAction::Screenshot {}
    ) {
        return false;
    }
    let payload = serialize_action(action).to_lowercase();
    first_matching_term(&payload, CONFIRM_TERMS.iter().copied()).is_some()
}

fn intent_appears_destructive(intent: &IntentSpec) -> bool {
    let text = format!("{} {}", intent.objective, intent.success_criteria).to_lowercase();
    DESTRUCTIVE_INTENT.is_match(&text)
}

fn action_appears_destructive(action: &AgentAction) -> bool {
    DESTRUCTIVE_ACTION.is_match(&serialize_action(action).to_lowercase())
}

fn check_semantic_target(action: &AgentAction) -> Option<SafetyVerdict> {
    let target: &SemanticTarget = match action {
        AgentAction::ClickElement { target }
        | AgentAction::TypeIntoElement { target, .. }
        | AgentAction::FocusElement { target }
        | AgentAction::SelectOption { target, .. } => target,
        _ => return None,
    };
    if target.is_resolved() {
        return None;
    }
    Some(SafetyVerdict::blocked(
        "Semantic action target is unresolved",
        ErrorCode::TargetUnresolved,
    ))
}

#[cfg(test)]
#[path = "safety_tests.rs"]
mod tests;
