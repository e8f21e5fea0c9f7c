//! The accessibility semantic surface.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

use deskhand_protocols::{
    AgentAction, ErrorCode, ExecutionResult, PerceptionSource, SemanticSurface, SemanticTarget,
};

use crate::client::SidecarResult;
use crate::manager::SidecarManager;

const SOURCE: PerceptionSource = PerceptionSource::Accessibility;

pub struct SidecarSurface {
    manager: Arc<SidecarManager>,
}

impl SidecarSurface {
    pub fn new(manager: Arc<SidecarManager>) -> Self {
        Self { manager }
    }

    fn result_from(&self, result: SidecarResult, ok_message: &str, fail_message: &str) -> ExecutionResult {
        if result.ok {
            let mut out = ExecutionResult::ok(
                SOURCE,
                result.message.unwrap_or_else(|| ok_message.to_string()),
            );
            if let Some(Value::Object(map)) = result.data {
                out = out.with_evidence(map);
            }
            return out;
        }
        let code = result.code(ErrorCode::TargetNotFound);
        ExecutionResult::retryable_failure(
            SOURCE,
            result.message.unwrap_or_else(|| fail_message.to_string()),
            code,
        )
    }

    async fn open_app(&self, app: &str, target: &SemanticTarget) -> ExecutionResult {
        let app = target.app.as_deref().unwrap_or(app);
        if app.is_empty() {
            return ExecutionResult::failure(
                SOURCE,
                "open_app requires a target app name",
                ErrorCode::TargetUnresolved,
            );
        }
        if spawn_desktop_app(app) {
            ExecutionResult::ok(SOURCE, format!("Opened app '{app}'"))
                .with_evidence(object(json!({ "app": app })))
        } else {
            ExecutionResult::retryable_failure(
                SOURCE,
                format!("failed to open app '{app}'"),
                ErrorCode::TargetNotFound,
            )
        }
    }
}

#[async_trait]
impl SemanticSurface for SidecarSurface {
    fn name(&self) -> &'static str {
        "accessibility"
    }

    async fn execute(&self, action: &AgentAction) -> ExecutionResult {
        if !self.manager.ensure_started().await {
            return ExecutionResult::retryable_failure(
                SOURCE,
                "accessibility sidecar is unavailable",
                ErrorCode::SurfaceUnavailable,
            );
        }
        let client = self.manager.client();

        match action {
            AgentAction::ClickElement { target } => {
                debug!(target = ?target.name, "sidecar click");
                let result = client.click(target).await;
                self.result_from(result, "Clicked desktop element", "accessibility click failed")
            }
            AgentAction::FocusElement { target } => {
                let result = client.focus(target).await;
                self.result_from(result, "Focused desktop element", "accessibility focus failed")
            }
            AgentAction::TypeIntoElement { text, target } => {
                let result = client.type_text(target, text).await;
                self.result_from(
                    result,
                    "Typed into desktop element",
                    "accessibility type failed",
                )
            }
            // No select pattern on this surface; focusing the target is the
            // closest primitive.
            AgentAction::SelectOption { target, .. } => {
                let result = client.focus(target).await;
                self.result_from(result, "Focused option target", "accessibility select failed")
            }
            AgentAction::OpenApp { app, target } => self.open_app(app, target).await,
            other => ExecutionResult::failure(
                SOURCE,
                format!(
                    "action {} is not supported by the accessibility surface",
                    other.kind()
                ),
                ErrorCode::UnsupportedAction,
            ),
        }
    }
}

fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

#[cfg(target_os = "windows")]
fn spawn_desktop_app(app: &str) -> bool {
    std::process::Command::new("cmd.exe")
        .args(["/c", "start", "", app])
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .is_ok()
}

#[cfg(target_os = "macos")]
fn spawn_desktop_app(app: &str) -> bool {
    std::process::Command::new("open")
        .args(["-a", app])
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .is_ok()
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn spawn_desktop_app(app: &str) -> bool {
    std::process::Command::new(app)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .is_ok()
}

#[cfg(test)]
#[path = "surface_tests.rs"]
mod tests;
