//! The browser semantic surface: routes element and navigation actions
//! through the DevTools protocol, with a plain shell launch as the last
//! resort for navigation.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use deskhand_policy::domain::evaluate_browser_target;
use deskhand_protocols::{
    AgentAction, ErrorCode, ExecutionResult, PerceptionSource, SemanticSurface, SemanticTarget,
};

use crate::client::CdpClient;
use crate::dom;
use crate::error::BrowserError;
use crate::session::BrowserSessionManager;

const SOURCE: PerceptionSource = PerceptionSource::BrowserProtocol;

/// Semantic surface backed by the remote-debugging protocol.
pub struct BrowserSurface {
    session: Arc<BrowserSessionManager>,
}

impl BrowserSurface {
    pub fn new(session: Arc<BrowserSessionManager>) -> Self {
        Self { session }
    }

    /// Attach to the active tab, honoring the availability cooldown. Every
    /// connection-level failure arms the cooldown so the next steps fail
    /// fast instead of re-paying probe timeouts.
    async fn connected_client(&self) -> Result<(CdpClient, String), BrowserError> {
        if let Some(standing) = self.session.availability_error() {
            return Err(standing);
        }

        if let Err(e) = self.session.ensure_session().await {
            self.session.mark_unavailable(&e.to_string());
            return Err(e);
        }

        let tab = match self.session.active_tab().await {
            Ok(tab) => tab,
            Err(e) => {
                self.session.mark_unavailable(&e.to_string());
                return Err(e);
            }
        };
        let Some(tab) = tab else {
            self.session.mark_unavailable("no active debuggable tab");
            return Err(BrowserError::NoActiveTab);
        };
        let Some(ws_url) = tab.web_socket_debugger_url.clone() else {
            self.session
                .mark_unavailable("active tab has no debugger websocket URL");
            return Err(BrowserError::Unavailable(
                "active tab has no debugger websocket URL".to_string(),
            ));
        };

        // Activation is best-effort; continue even if the browser rejects it.
        if let Err(e) = self.session.activate_tab(&tab.id).await {
            debug!("tab activation failed: {e}");
        }

        let client = match CdpClient::connect(&ws_url).await {
            Ok(client) => client,
            Err(e) => {
                self.session.mark_unavailable(&e.to_string());
                return Err(e);
            }
        };
        if let Err(e) = client.enable_domains().await {
            self.session.mark_unavailable(&e.to_string());
            return Err(e);
        }

        self.session.clear_unavailable();
        Ok((client, tab.id))
    }

    async fn execute_navigate(&self, url: &str) -> ExecutionResult {
        let decision = evaluate_browser_target(url, &self.session.config().blocklist);
        if !decision.allowed {
            return ExecutionResult::failure(
                SOURCE,
                decision
                    .reason
                    .unwrap_or_else(|| "Navigation blocked by domain policy".to_string()),
                decision.error_code.unwrap_or(ErrorCode::BlockedDomain),
            );
        }
        let normalized = decision
            .normalized_url
            .unwrap_or_else(|| url.to_string());

        match self.navigate_via_protocol(&normalized).await {
            Ok(tab_id) => ExecutionResult::ok(SOURCE, format!("Navigated to {normalized}"))
                .with_evidence(evidence(json!({
                    "final_url": normalized,
                    "tab_id": tab_id,
                }))),
            Err(e) => {
                // Protocol attach failed; a plain shell launch still gets
                // the user to the page, just without verification.
                if self.session.open_url_in_shell(&normalized) {
                    warn!("protocol navigation failed ({e}); used shell fallback");
                    return ExecutionResult::ok(
                        PerceptionSource::BrowserShell,
                        format!("Opened {normalized} via browser shell fallback"),
                    )
                    .with_evidence(evidence(json!({
                        "final_url": normalized,
                        "browser_mode": "shell_fallback",
                        "semantic_failure": e.to_string(),
                        "semantic_failure_code": e.error_code().as_str(),
                    })));
                }
                failure_from(&e)
            }
        }
    }

    async fn navigate_via_protocol(&self, url: &str) -> Result<String, BrowserError> {
        let (client, tab_id) = self.connected_client().await?;
        client.navigate(url).await?;
        // Read back the location as confirmation the page context is live.
        client.evaluate("window.location.href").await?;
        Ok(tab_id)
    }

    async fn execute_open_app(&self, app: &str) -> ExecutionResult {
        let app = app.to_lowercase();
        if !app.contains("chrome") {
            return ExecutionResult::failure(
                SOURCE,
                format!("browser surface cannot open non-browser app: {app}"),
                ErrorCode::TargetUnresolved,
            );
        }

        if let Err(e) = self.session.ensure_session().await {
            return failure_from(&e);
        }
        match self.session.active_tab().await {
            Ok(tab) => {
                let message = if tab.is_some() {
                    "Browser session is ready"
                } else {
                    "Browser started (no active tab exposed yet)"
                };
                ExecutionResult::ok(SOURCE, message).with_evidence(evidence(json!({
                    "app": "chrome",
                    "browser_mode": "protocol",
                    "has_active_tab": tab.is_some(),
                    "tab_id": tab.map(|t| t.id),
                })))
            }
            Err(e) => failure_from(&e),
        }
    }

    async fn execute_element_action(&self, action: &AgentAction) -> ExecutionResult {
        let Some(target) = action.target() else {
            return ExecutionResult::failure(
                SOURCE,
                "semantic action carries no target",
                ErrorCode::TargetUnresolved,
            );
        };

        let (client, _tab_id) = match self.connected_client().await {
            Ok(attached) => attached,
            Err(e) => {
                // For element actions a missing tab is the same operational
                // condition as a dead endpoint.
                let code = match e.error_code() {
                    ErrorCode::CdpNoActiveTab => ErrorCode::CdpUnavailable,
                    code => code,
                };
                return ExecutionResult::retryable_failure(SOURCE, e.to_string(), code);
            }
        };

        match action {
            AgentAction::SelectOption { value, target } => {
                self.select_option(&client, target, value).await
            }
            _ => self.pointer_element_action(&client, action, target).await,
        }
    }

    async fn pointer_element_action(
        &self,
        client: &CdpClient,
        action: &AgentAction,
        target: &SemanticTarget,
    ) -> ExecutionResult {
        let point = match dom::resolve_element(client, target).await {
            Ok(Some(point)) => point,
            Ok(None) => {
                return ExecutionResult::retryable_failure(
                    SOURCE,
                    "could not resolve browser element target",
                    ErrorCode::TargetNotFound,
                );
            }
            Err(e) => return failure_from(&e),
        };
        let (x, y) = (point.x.round() as i64, point.y.round() as i64);
        let hints = evidence(json!({
            "resolved_selector": point.selector_hint,
            "resolved_tag": point.tag,
            "x": x,
            "y": y,
        }));

        let outcome = match action {
            AgentAction::ClickElement { .. } => {
                client.click_at(x, y).await.map(|_| "Clicked browser element")
            }
            AgentAction::FocusElement { .. } => {
                client.click_at(x, y).await.map(|_| "Focused browser element")
            }
            AgentAction::TypeIntoElement { text, .. } => {
                match client.click_at(x, y).await {
                    Ok(()) => client
                        .insert_text(text)
                        .await
                        .map(|_| "Typed into browser element"),
                    Err(e) => Err(e),
                }
            }
            other => {
                return ExecutionResult::failure(
                    SOURCE,
                    format!("unsupported browser semantic action: {}", other.kind()),
                    ErrorCode::UnsupportedAction,
                );
            }
        };

        match outcome {
            Ok(message) => ExecutionResult::ok(SOURCE, message).with_evidence(hints),
            Err(e) => failure_from(&e),
        }
    }

    async fn select_option(
        &self,
        client: &CdpClient,
        target: &SemanticTarget,
        value: &str,
    ) -> ExecutionResult {
        let Some(selector) = target.selector.as_deref() else {
            return ExecutionResult::failure(
                SOURCE,
                "select_option requires target.selector",
                ErrorCode::TargetUnresolved,
            );
        };
        let result = match client
            .evaluate(&dom::select_option_expression(selector, value))
            .await
        {
            Ok(result) => result,
            Err(e) => return failure_from(&e),
        };
        match dom::parse_select_outcome(&result) {
            Ok(selected) => ExecutionResult::ok(SOURCE, "Selected option in browser element")
                .with_evidence(evidence(json!({
                    "resolved_selector": selector,
                    "selected_value": selected,
                }))),
            Err(reason) => ExecutionResult::failure(
                SOURCE,
                format!("failed selecting option ({reason})"),
                ErrorCode::TargetNotFound,
            ),
        }
    }
}

#[async_trait]
impl SemanticSurface for BrowserSurface {
    fn name(&self) -> &'static str {
        "browser"
    }

    async fn execute(&self, action: &AgentAction) -> ExecutionResult {
        match action {
            AgentAction::NavigateUrl { url, .. } => self.execute_navigate(url).await,
            AgentAction::OpenApp { app, .. } => self.execute_open_app(app).await,
            AgentAction::ClickElement { .. }
            | AgentAction::FocusElement { .. }
            | AgentAction::TypeIntoElement { .. }
            | AgentAction::SelectOption { .. } => self.execute_element_action(action).await,
            other => ExecutionResult::failure(
                SOURCE,
                format!("action {} is not supported by the browser surface", other.kind()),
                ErrorCode::UnsupportedAction,
            ),
        }
    }
}

fn failure_from(e: &BrowserError) -> ExecutionResult {
    ExecutionResult {
        retryable: Some(e.retryable()),
        ..ExecutionResult::failure(SOURCE, e.to_string(), e.error_code())
    }
}

fn evidence(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}
