//! # Deskhand Agent
//!
//! The orchestration core: free-text commands are parsed into structured
//! intents, expanded into deterministic action plans where possible, and
//! otherwise driven by a vision planner loop over screen captures. Every
//! action passes confirmation and safety gates before it reaches a surface.

pub mod confirm;
pub mod intent;
pub mod meter;
pub mod orchestrator;
pub mod plan;
pub mod planner;
pub mod router;

pub use confirm::ConfirmationBroker;
pub use intent::IntentParser;
pub use meter::TokenMeter;
pub use orchestrator::{AgentOrchestrator, OrchestratorOptions, RunOutcome};
pub use planner::{OpenAiPlanner, Planner, PlannerError, PlannerReply, PlannerRequest};
pub use router::SemanticRouter;
