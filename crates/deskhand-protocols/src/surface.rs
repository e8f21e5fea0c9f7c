//! Trait seams between the orchestrator and the execution surfaces.
//!
//! The construction root wires real adapters behind these traits; tests
//! substitute hand-written fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::action::AgentAction;
use crate::execution::{ExecutionResult, PerceptionSource};

/// A semantic execution surface (browser protocol or accessibility sidecar).
///
/// Adapters never propagate raw transport errors: every failure is folded
/// into an [`ExecutionResult`] with an error code so the router can decide
/// on retry and fallback uniformly.
#[async_trait]
pub trait SemanticSurface: Send + Sync {
    fn name(&self) -> &'static str;

    async fn execute(&self, action: &AgentAction) -> ExecutionResult;
}

/// Executor for position/keyboard-level primitives against the OS input
/// surface. The default non-semantic executor and the fallback target.
#[async_trait]
pub trait CoordinateExecutor: Send + Sync {
    async fn execute(&self, action: &AgentAction) -> ExecutionResult;
}

/// One captured screen frame handed to the vision planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenFrame {
    /// PNG-encoded image, base64.
    pub base64: String,
    pub width: u32,
    pub height: u32,
}

#[async_trait]
pub trait ScreenCapture: Send + Sync {
    async fn capture(&self) -> Result<ScreenFrame, String>;
}

/// One executed step, as recorded into run history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub task: String,
    pub action: AgentAction,
    pub result: String,
    pub perception_source: PerceptionSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

/// Persistence of executed steps is an external collaborator; this seam is
/// all the core knows about it.
pub trait HistorySink: Send + Sync {
    fn record(&self, entry: HistoryEntry);
}

/// Default sink: structured log line per step.
pub struct TracingHistorySink;

impl HistorySink for TracingHistorySink {
    fn record(&self, entry: HistoryEntry) {
        tracing::info!(
            task = %entry.task,
            action = entry.action.kind(),
            source = %entry.perception_source,
            fallback = entry.fallback_reason.as_deref().unwrap_or(""),
            "step: {}",
            entry.result
        );
    }
}
