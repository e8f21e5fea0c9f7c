//! Semantic execution routing between the browser surface and the
//! accessibility sidecar.

use std::sync::Arc;

use deskhand_policy::evaluate_browser_target;
use deskhand_protocols::action::{AgentAction, SemanticTarget};
use deskhand_protocols::execution::{ExecutionResult, PerceptionSource};
use deskhand_protocols::intent::{IntentSpec, PreferredSurface};

const BROWSER_HINTS: &[&str] = &["chrome", "google chrome"];

/// Routes semantic actions to the right surface after merging intent-level
/// target hints into the action's own target.
pub struct SemanticRouter {
    browser: Arc<dyn deskhand_protocols::surface::SemanticSurface>,
    sidecar: Arc<dyn deskhand_protocols::surface::SemanticSurface>,
    blocklist: Vec<String>,
}

impl SemanticRouter {
    pub fn new(
        browser: Arc<dyn deskhand_protocols::surface::SemanticSurface>,
        sidecar: Arc<dyn deskhand_protocols::surface::SemanticSurface>,
        blocklist: Vec<String>,
    ) -> Self {
        Self {
            browser,
            sidecar,
            blocklist,
        }
    }

    /// Execute a semantic action. Navigation is policy-checked before any
    /// surface sees it.
    pub async fn execute(
        &self,
        action: &AgentAction,
        intent: Option<&IntentSpec>,
    ) -> ExecutionResult {
        let target = merge_target(action, intent);

        if let AgentAction::NavigateUrl { url, .. } = action {
            let url = target.url.as_deref().unwrap_or(url);
            let decision = evaluate_browser_target(url, &self.blocklist);
            if !decision.allowed {
                return ExecutionResult::failure(
                    PerceptionSource::BrowserProtocol,
                    decision
                        .reason
                        .unwrap_or_else(|| "Navigation blocked by browser policy".to_string()),
                    decision
                        .error_code
                        .unwrap_or(deskhand_protocols::error::ErrorCode::BlockedDomain),
                );
            }
        }

        let routed = with_target(action, target.clone());
        let surface = if routes_to_browser(action, intent, &target) {
            &self.browser
        } else {
            &self.sidecar
        };
        tracing::debug!(
            action = action.kind(),
            surface = surface.name(),
            "routing semantic action"
        );
        surface.execute(&routed).await
    }
}

/// Merge intent-level hints into the action's target. Action-level fields
/// always win; the intent only fills holes.
pub fn merge_target(action: &AgentAction, intent: Option<&IntentSpec>) -> SemanticTarget {
    let own = action.target().cloned().unwrap_or_default();
    let action_url = match action {
        AgentAction::NavigateUrl { url, .. } => Some(url.clone()),
        _ => None,
    };
    let action_text = match action {
        AgentAction::TypeIntoElement { text, .. } => Some(text.clone()),
        _ => None,
    };

    SemanticTarget {
        app: own.app.or_else(|| {
            intent.and_then(|i| i.target_app.clone().or_else(|| i.targets.app.clone()))
        }),
        url: own
            .url
            .or(action_url)
            .or_else(|| intent.and_then(|i| i.targets.url.clone())),
        selector: own.selector,
        role: own.role,
        name: own
            .name
            .or_else(|| intent.and_then(|i| i.targets.element.clone())),
        element_id: own.element_id,
        window_title: own
            .window_title
            .or_else(|| intent.and_then(|i| i.target_window.clone())),
        text: own
            .text
            .or(action_text)
            .or_else(|| intent.and_then(|i| i.targets.text.clone())),
        coords: own.coords.or_else(|| intent.and_then(|i| i.targets.coords)),
    }
}

fn routes_to_browser(
    action: &AgentAction,
    intent: Option<&IntentSpec>,
    target: &SemanticTarget,
) -> bool {
    if matches!(action, AgentAction::NavigateUrl { .. }) {
        return true;
    }
    if target.selector.is_some() || target.element_id.is_some() {
        return true;
    }
    let app_hint = format!(
        "{} {}",
        target.app.as_deref().unwrap_or(""),
        intent.and_then(|i| i.target_app.as_deref()).unwrap_or(""),
    )
    .to_lowercase();
    if matches!(action, AgentAction::OpenApp { .. })
        && BROWSER_HINTS.iter().any(|hint| app_hint.contains(hint))
    {
        return true;
    }
    if intent.map(|i| i.preferred_surface) == Some(Some(PreferredSurface::Browser))
        && (target.selector.is_some() || target.element_id.is_some())
    {
        return true;
    }
    false
}

/// Clone an action with its semantic target replaced by the merged one.
fn with_target(action: &AgentAction, target: SemanticTarget) -> AgentAction {
    let mut routed = action.clone();
    match &mut routed {
        AgentAction::ClickElement { target: slot }
        | AgentAction::TypeIntoElement { target: slot, .. }
        | AgentAction::FocusElement { target: slot }
        | AgentAction::SelectOption { target: slot, .. }
        | AgentAction::NavigateUrl { target: slot, .. }
        | AgentAction::OpenApp { target: slot, .. } => *slot = target,
        _ => {}
    }
    routed
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
