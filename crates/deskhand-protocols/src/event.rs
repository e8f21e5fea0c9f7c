//! Events emitted by the orchestrator for an external presentation shell.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::action::AgentAction;
use crate::execution::AgentState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Agent,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Action,
    Progress,
    Error,
}

/// One chat-style progress message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    pub id: String,
    pub role: MessageRole,
    pub kind: MessageKind,
    pub content: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<AgentAction>,
}

impl AgentMessage {
    pub fn new(role: MessageRole, kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            id: format!("msg_{}", Uuid::new_v4().simple()),
            role,
            kind,
            content: content.into(),
            timestamp: Utc::now().to_rfc3339(),
            action: None,
        }
    }

    pub fn with_action(mut self, action: AgentAction) -> Self {
        self.action = Some(action);
        self
    }
}

/// Event stream consumed by the embedding shell (chat panel, CLI printer).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AgentEvent {
    Message(AgentMessage),
    State(AgentState),
    /// A gated action awaits an external yes/no keyed by `id`.
    ConfirmationRequested { id: String, action: AgentAction },
}
