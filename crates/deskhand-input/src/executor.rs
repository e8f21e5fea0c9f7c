//! Coordinate-level action execution against the OS input surface.
//!
//! Enigo handles are not `Send`, so every input action constructs its
//! controller inside a blocking task.

use async_trait::async_trait;
use tracing::debug;

use deskhand_protocols::{
    AgentAction, CoordinateExecutor, ErrorCode, ExecutionResult, PerceptionSource,
    ScrollDirection,
};

use crate::input::InputController;

const SOURCE: PerceptionSource = PerceptionSource::Coordinate;

async fn run_input<F>(f: F) -> Result<(), String>
where
    F: FnOnce(&mut InputController) -> Result<(), crate::input::InputError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut controller = InputController::new().map_err(|e| e.to_string())?;
        f(&mut controller).map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| e.to_string())?
}

/// The default executor for pointer/keyboard actions and the OS-level
/// compatibility paths for `open_app` / `navigate_url`.
pub struct CoordinateActionExecutor;

impl CoordinateActionExecutor {
    pub fn new() -> Self {
        Self
    }

    fn ok(message: impl Into<String>) -> ExecutionResult {
        ExecutionResult::ok(SOURCE, message)
    }

    fn input_failure(message: String) -> ExecutionResult {
        ExecutionResult::retryable_failure(SOURCE, message, ErrorCode::TransientSurfaceError)
    }
}

impl Default for CoordinateActionExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoordinateExecutor for CoordinateActionExecutor {
    async fn execute(&self, action: &AgentAction) -> ExecutionResult {
        debug!(action = action.kind(), "coordinate execute");
        match action.clone() {
            AgentAction::Click { x, y } => match run_input(move |c| c.click(x, y)).await {
                Ok(()) => Self::ok("Clicked successfully"),
                Err(e) => Self::input_failure(e),
            },
            AgentAction::DoubleClick { x, y } => {
                match run_input(move |c| c.double_click(x, y)).await {
                    Ok(()) => Self::ok("Double-clicked successfully"),
                    Err(e) => Self::input_failure(e),
                }
            }
            AgentAction::RightClick { x, y } => {
                match run_input(move |c| c.right_click(x, y)).await {
                    Ok(()) => Self::ok("Right-clicked successfully"),
                    Err(e) => Self::input_failure(e),
                }
            }
            AgentAction::Move { x, y } => match run_input(move |c| c.mouse_move(x, y)).await {
                Ok(()) => Self::ok("Cursor moved"),
                Err(e) => Self::input_failure(e),
            },
            AgentAction::Drag { from, to } => match run_input(move |c| c.drag(from, to)).await {
                Ok(()) => Self::ok("Dragged successfully"),
                Err(e) => Self::input_failure(e),
            },
            AgentAction::Type { text } => match run_input(move |c| c.type_text(&text)).await {
                Ok(()) => Self::ok("Typed successfully"),
                Err(e) => Self::input_failure(e),
            },
            AgentAction::Hotkey { keys } => match run_input(move |c| c.hotkey(&keys)).await {
                Ok(()) => Self::ok("Hotkey executed"),
                Err(e) => Self::input_failure(e),
            },
            AgentAction::Scroll { direction, amount } => {
                let delta = match direction {
                    ScrollDirection::Up => -amount,
                    ScrollDirection::Down => amount,
                };
                match run_input(move |c| c.scroll(delta)).await {
                    Ok(()) => Self::ok("Scrolled successfully"),
                    Err(e) => Self::input_failure(e),
                }
            }
            AgentAction::Wait { seconds } => {
                tokio::time::sleep(std::time::Duration::from_secs_f64(seconds.max(0.0))).await;
                Self::ok("Wait complete")
            }
            // Capture itself is owned by the orchestrator; acknowledging
            // keeps the step loop uniform.
            AgentAction::Screenshot {} => Self::ok("Screenshot acknowledged"),
            AgentAction::Speak { .. } => ExecutionResult::failure(
                SOURCE,
                "speak is delivered as a user message, not an input action",
                ErrorCode::UnsupportedAction,
            ),
            AgentAction::OpenApp { app, target } => {
                let app = target.app.unwrap_or(app);
                if open_with_shell(&app) {
                    Self::ok(format!("Opened app '{app}'"))
                } else {
                    ExecutionResult::retryable_failure(
                        SOURCE,
                        format!("failed to open app '{app}'"),
                        ErrorCode::TargetNotFound,
                    )
                }
            }
            AgentAction::NavigateUrl { url, .. } => {
                if open_with_shell(&url) {
                    Self::ok(format!("Opened URL '{url}'"))
                } else {
                    ExecutionResult::retryable_failure(
                        SOURCE,
                        format!("failed to open URL '{url}'"),
                        ErrorCode::TransientSurfaceError,
                    )
                }
            }
            AgentAction::ClickElement { .. }
            | AgentAction::TypeIntoElement { .. }
            | AgentAction::FocusElement { .. }
            | AgentAction::SelectOption { .. } => ExecutionResult::failure(
                SOURCE,
                format!(
                    "semantic action '{}' requires a semantic surface",
                    action.kind()
                ),
                ErrorCode::UnsupportedAction,
            ),
            AgentAction::Done { summary } => {
                Self::ok(if summary.is_empty() {
                    "Task marked done".to_string()
                } else {
                    summary
                })
            }
            AgentAction::Fail { reason } => ExecutionResult::failure(
                SOURCE,
                if reason.is_empty() {
                    "Task failed".to_string()
                } else {
                    reason
                },
                ErrorCode::InvalidActionPayload,
            ),
        }
    }
}

/// Open an app name or URL through the platform shell.
#[cfg(target_os = "windows")]
fn open_with_shell(value: &str) -> bool {
    std::process::Command::new("cmd.exe")
        .args(["/c", "start", "", value])
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .is_ok()
}

#[cfg(target_os = "macos")]
fn open_with_shell(value: &str) -> bool {
    std::process::Command::new("open")
        .arg(value)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .is_ok()
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn open_with_shell(value: &str) -> bool {
    std::process::Command::new("xdg-open")
        .arg(value)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .spawn()
        .is_ok()
}
