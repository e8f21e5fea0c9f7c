//! # Deskhand Protocols
//!
//! Shared data model for the Deskhand desktop automation agent: the action
//! schema exchanged with the vision planner, structured intents, execution
//! results, agent state, and the error-code taxonomy used across surfaces.
//!
//! Every other crate in the workspace depends on this one; it depends on
//! nothing but serde and friends so the model stays portable.

pub mod action;
pub mod error;
pub mod event;
pub mod execution;
pub mod intent;
pub mod surface;

pub use action::{AgentAction, Point, RawAction, ScrollDirection, SemanticTarget};
pub use error::ErrorCode;
pub use event::{AgentEvent, AgentMessage, MessageKind, MessageRole};
pub use execution::{AgentState, AgentStatus, ExecutionResult, PerceptionSource};
pub use intent::{
    clamp_confidence, default_forbidden_terms, IntentConstraints, IntentParseResult, IntentSource,
    IntentSpec, IntentTargets, IntentType, PreferredSurface, DEFAULT_FORBIDDEN_TERMS,
};
pub use surface::{
    CoordinateExecutor, HistoryEntry, HistorySink, ScreenCapture, ScreenFrame, SemanticSurface,
    TracingHistorySink,
};
