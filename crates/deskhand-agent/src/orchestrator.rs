//! The agent run loop: intent parse, plan or vision-planner step selection,
//! confirmation and safety gating, execution with retry and screenshot
//! fallback, and guaranteed return to idle.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use deskhand_policy::{normalize_action, SafetyPolicy, Viewport};
use deskhand_protocols::action::{AgentAction, RawAction};
use deskhand_protocols::event::{AgentEvent, AgentMessage, MessageKind, MessageRole};
use deskhand_protocols::execution::{
    AgentState, AgentStatus, ExecutionResult, PerceptionSource,
};
use deskhand_protocols::intent::IntentType;
use deskhand_protocols::surface::{
    CoordinateExecutor, HistoryEntry, HistorySink, ScreenCapture, ScreenFrame,
};

use crate::confirm::ConfirmationBroker;
use crate::intent::IntentParser;
use crate::meter::{MeterPhase, TokenMeter};
use crate::plan::{apply_intent_defaults, build_intent_plan};
use crate::planner::{Planner, PlannerMessage, PlannerRequest};
use crate::router::SemanticRouter;

const STEP_PAUSE: Duration = Duration::from_millis(250);

/// Knobs the orchestrator needs from configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub planner_model: String,
    pub semantic_enabled: bool,
    /// Extra semantic attempts after the first failure.
    pub semantic_retry_count: u32,
    pub max_steps: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Aborted,
    Error,
}

impl RunOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            RunOutcome::Completed => "completed",
            RunOutcome::Aborted => "aborted",
            RunOutcome::Error => "error",
        }
    }
}

/// Why a step could not produce an execution result.
enum StepFailure {
    Aborted,
    Error(String),
}

struct StepRecord {
    action: AgentAction,
    result: String,
}

struct RunState {
    task: String,
    intent: Option<deskhand_protocols::intent::IntentSpec>,
    state: AgentState,
    history: Vec<StepRecord>,
}

struct ExecutionEnvelope {
    action: AgentAction,
    result: ExecutionResult,
    perception_source: PerceptionSource,
    fallback_reason: Option<String>,
}

pub struct AgentOrchestrator {
    planner: Arc<dyn Planner>,
    intent_parser: IntentParser,
    router: SemanticRouter,
    coordinate: Arc<dyn CoordinateExecutor>,
    capture: Arc<dyn ScreenCapture>,
    policy: SafetyPolicy,
    history: Arc<dyn HistorySink>,
    broker: Arc<ConfirmationBroker>,
    meter: Arc<TokenMeter>,
    events: mpsc::UnboundedSender<AgentEvent>,
    options: OrchestratorOptions,
}

impl AgentOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        planner: Arc<dyn Planner>,
        intent_parser: IntentParser,
        router: SemanticRouter,
        coordinate: Arc<dyn CoordinateExecutor>,
        capture: Arc<dyn ScreenCapture>,
        policy: SafetyPolicy,
        history: Arc<dyn HistorySink>,
        broker: Arc<ConfirmationBroker>,
        meter: Arc<TokenMeter>,
        events: mpsc::UnboundedSender<AgentEvent>,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            planner,
            intent_parser,
            router,
            coordinate,
            capture,
            policy,
            history,
            broker,
            meter,
            events,
            options,
        }
    }

    /// Run one task to completion. The state is reset to idle on every exit
    /// path, including errors and cancellation.
    pub async fn run(&self, command: &str, cancel: CancellationToken) -> RunOutcome {
        self.meter.start_run(command);
        let mut run = RunState {
            task: command.to_string(),
            intent: None,
            state: AgentState {
                status: AgentStatus::Thinking,
                step_count: 0,
                max_steps: self.options.max_steps,
                execution_mode: None,
                fallback_reason: None,
            },
            history: Vec::new(),
        };
        self.emit_state(&run.state);
        self.emit(AgentEvent::Message(AgentMessage::new(
            MessageRole::User,
            MessageKind::Text,
            command,
        )));

        let outcome = self.run_inner(&mut run, &cancel).await;

        self.meter.finish(outcome.as_str(), run.state.step_count);
        run.state = AgentState::idle(run.state.max_steps);
        self.emit_state(&run.state);
        outcome
    }

    async fn run_inner(&self, run: &mut RunState, cancel: &CancellationToken) -> RunOutcome {
        let parse = tokio::select! {
            _ = cancel.cancelled() => return RunOutcome::Aborted,
            parse = self.intent_parser.parse(&run.task) => parse,
        };
        run.state.max_steps = parse
            .intent
            .constraints
            .max_steps
            .unwrap_or(self.options.max_steps);
        self.emit_state(&run.state);

        if parse.intent.intent_type == IntentType::Stop {
            self.emit_system(
                "Stop command recognized. Use Stop during a running task to cancel safely.",
                MessageKind::Text,
            );
            return RunOutcome::Completed;
        }

        if parse.clarification_needed || parse.confidence <= 0.0 {
            let question = parse.clarification_question.clone().unwrap_or_else(|| {
                "Please clarify your command with a direct verb and target, for example: \
                 'open chrome and go to github.com'."
                    .to_string()
            });
            self.emit_system(question, MessageKind::Text);
            return RunOutcome::Completed;
        }

        self.emit_system(
            format!(
                "Interpreted command as {} ({}% confidence).",
                parse.intent.intent_type.as_str(),
                (parse.confidence * 100.0).round() as i64
            ),
            MessageKind::Progress,
        );

        let plan = build_intent_plan(&parse.intent);
        let has_semantic = plan.iter().any(AgentAction::is_semantic);
        let using_plan = !plan.is_empty() && (!has_semantic || self.options.semantic_enabled);
        let mut plan: VecDeque<AgentAction> = if using_plan {
            plan.into()
        } else {
            VecDeque::new()
        };
        if using_plan {
            let steps = plan.len();
            self.emit_system(
                format!(
                    "Using intent-first execution plan ({steps} step{}) without screenshot planning.",
                    if steps == 1 { "" } else { "s" }
                ),
                MessageKind::Progress,
            );
        }
        run.intent = Some(parse.intent.clone());

        while run.state.step_count < run.state.max_steps {
            if cancel.is_cancelled() {
                self.emit_system("Task cancelled.", MessageKind::Text);
                return RunOutcome::Aborted;
            }

            run.state.status = AgentStatus::Thinking;
            self.emit_state(&run.state);

            let mut frame: Option<ScreenFrame> = None;
            let action = if using_plan {
                match plan.pop_front() {
                    Some(action) => action,
                    None => {
                        self.emit_agent(
                            "Intent plan completed.",
                            MessageKind::Text,
                            Some(AgentAction::Done {
                                summary: "Task completed from intent plan.".to_string(),
                            }),
                        );
                        return RunOutcome::Completed;
                    }
                }
            } else {
                let captured = match self.capture.capture().await {
                    Ok(frame) => frame,
                    Err(error) => {
                        self.emit_system(format!("Error: {error}"), MessageKind::Error);
                        return RunOutcome::Error;
                    }
                };
                let reply = match self.request_planner_action(&captured, run, cancel).await {
                    Ok(reply) => reply,
                    Err(StepFailure::Aborted) => return RunOutcome::Aborted,
                    Err(StepFailure::Error(message)) => {
                        self.emit_system(format!("Error: {message}"), MessageKind::Error);
                        return RunOutcome::Error;
                    }
                };
                let Some(raw) = RawAction::from_planner_text(&reply) else {
                    let message = if reply.is_empty() {
                        "No action parsed from model response.".to_string()
                    } else {
                        reply
                    };
                    self.emit_system(message, MessageKind::Error);
                    continue;
                };
                let raw = match &run.intent {
                    Some(intent) => apply_intent_defaults(raw, intent),
                    None => raw,
                };
                let viewport = Viewport::new(captured.width as i32, captured.height as i32);
                let normalized = match normalize_action(&raw, viewport) {
                    Ok(action) => action,
                    Err(error) => {
                        self.emit_system(
                            format!("Planner returned invalid action: {error}"),
                            MessageKind::Error,
                        );
                        continue;
                    }
                };
                frame = Some(captured);

                if self.options.semantic_enabled && normalized.is_pointer_coordinate() {
                    self.emit_system(
                        "Planner returned coordinate pointer action outside fallback mode. \
                         Rephrase command with semantic target (app/url/element).",
                        MessageKind::Error,
                    );
                    break;
                }
                normalized
            };

            match self.ensure_action_allowed(&action, run, cancel).await {
                None => return RunOutcome::Aborted,
                Some(false) => {
                    if using_plan {
                        break;
                    }
                    continue;
                }
                Some(true) => {}
            }

            run.state.status = AgentStatus::Acting;
            self.emit_state(&run.state);
            self.emit_agent(action.describe(), MessageKind::Action, Some(action.clone()));

            if let AgentAction::Done { summary } = &action {
                let content = if summary.is_empty() {
                    "Task completed."
                } else {
                    summary.as_str()
                };
                self.emit_agent(content, MessageKind::Text, Some(action.clone()));
                break;
            }
            if let AgentAction::Fail { reason } = &action {
                let content = if reason.is_empty() {
                    "Task failed."
                } else {
                    reason.as_str()
                };
                self.emit_system(content, MessageKind::Error);
                break;
            }

            let envelope = match self
                .execute_with_fallback(&action, frame.as_ref(), run, cancel)
                .await
            {
                Ok(envelope) => envelope,
                Err(StepFailure::Aborted) => return RunOutcome::Aborted,
                Err(StepFailure::Error(message)) => {
                    self.emit_system(format!("Error: {message}"), MessageKind::Error);
                    return RunOutcome::Error;
                }
            };

            let history_result = match &envelope.fallback_reason {
                Some(reason) => format!(
                    "{} [source={}; fallback_reason={}]",
                    envelope.result.message, envelope.perception_source, reason
                ),
                None => format!(
                    "{} [source={}]",
                    envelope.result.message, envelope.perception_source
                ),
            };
            self.history.record(HistoryEntry {
                task: run.task.clone(),
                action: envelope.action.clone(),
                result: history_result.clone(),
                perception_source: envelope.perception_source,
                fallback_reason: envelope.fallback_reason.clone(),
            });
            run.history.push(StepRecord {
                action: envelope.action.clone(),
                result: history_result,
            });
            run.state.step_count += 1;
            run.state.status = AgentStatus::Thinking;
            self.emit_state(&run.state);

            self.emit_system(
                envelope.result.message.clone(),
                if envelope.result.success {
                    MessageKind::Progress
                } else {
                    MessageKind::Error
                },
            );
            if envelope.result.success {
                self.set_execution_mode(
                    run,
                    Some(envelope.perception_source),
                    envelope.fallback_reason.clone(),
                );
            }
            if !envelope.result.success && using_plan {
                self.emit_system(
                    "Intent-first execution failed. Stopping without extra screenshot planning.",
                    MessageKind::Error,
                );
                break;
            }

            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(STEP_PAUSE) => {}
            }
        }

        if run.state.step_count >= run.state.max_steps {
            self.emit_system(
                "Maximum steps reached. Task may be incomplete.",
                MessageKind::Error,
            );
        }
        RunOutcome::Completed
    }

    /// Confirmation gate first, safety check second, so a blocked action is
    /// never silently confirmed. `None` means the run was cancelled while
    /// waiting.
    async fn ensure_action_allowed(
        &self,
        action: &AgentAction,
        run: &mut RunState,
        cancel: &CancellationToken,
    ) -> Option<bool> {
        if self.policy.requires_confirmation(action, run.intent.as_ref()) {
            run.state.status = AgentStatus::AwaitingConfirmation;
            self.emit_state(&run.state);
            let (id, rx) = self.broker.register();
            self.emit(AgentEvent::ConfirmationRequested {
                id: id.clone(),
                action: action.clone(),
            });
            let approved = tokio::select! {
                _ = cancel.cancelled() => {
                    self.broker.discard(&id);
                    return None;
                }
                answer = rx => answer.unwrap_or(false),
            };
            if !approved {
                self.emit_system("Action cancelled by user.", MessageKind::Text);
                return Some(false);
            }
        }

        let verdict = self.policy.check(action, &run.task, run.intent.as_ref());
        if !verdict.allowed {
            let reason = verdict
                .reason
                .unwrap_or_else(|| "safety policy".to_string());
            let suffix = verdict
                .error_code
                .map(|code| format!(" ({code})"))
                .unwrap_or_default();
            self.emit_system(format!("Blocked: {reason}{suffix}"), MessageKind::Error);
            return Some(false);
        }

        Some(true)
    }

    async fn execute_with_fallback(
        &self,
        action: &AgentAction,
        frame: Option<&ScreenFrame>,
        run: &mut RunState,
        cancel: &CancellationToken,
    ) -> Result<ExecutionEnvelope, StepFailure> {
        if !(self.options.semantic_enabled && action.is_semantic()) {
            self.set_execution_mode(run, Some(PerceptionSource::Coordinate), None);
            let result = self.coordinate.execute(action).await;
            let perception_source = result.perception_source;
            return Ok(ExecutionEnvelope {
                action: action.clone(),
                result,
                perception_source,
                fallback_reason: None,
            });
        }

        let mut last_message = "Semantic execution failed".to_string();
        let mut last_code = None;
        for attempt in 0..=self.options.semantic_retry_count {
            let semantic = self.router.execute(action, run.intent.as_ref()).await;
            self.set_execution_mode(run, Some(semantic.perception_source), None);
            if semantic.success {
                self.emit_agent(
                    format!(
                        "Semantic execution ({}): {}",
                        semantic.perception_source, semantic.message
                    ),
                    MessageKind::Progress,
                    Some(action.clone()),
                );
                let perception_source = semantic.perception_source;
                return Ok(ExecutionEnvelope {
                    action: action.clone(),
                    result: semantic,
                    perception_source,
                    fallback_reason: None,
                });
            }

            last_message = semantic.message.clone();
            last_code = semantic.error_code;
            if attempt < self.options.semantic_retry_count && semantic.is_retryable() {
                self.emit_system(
                    format!(
                        "Semantic target unresolved. Retrying ({}/{})...",
                        attempt + 1,
                        self.options.semantic_retry_count
                    ),
                    MessageKind::Progress,
                );
                continue;
            }
            break;
        }

        self.emit_system("Switched to screenshot fallback.", MessageKind::Progress);
        self.set_execution_mode(
            run,
            Some(PerceptionSource::ScreenshotFallback),
            Some(last_message.clone()),
        );
        let fallback_frame = match frame {
            Some(frame) => frame.clone(),
            None => self
                .capture
                .capture()
                .await
                .map_err(StepFailure::Error)?,
        };
        let fallback = self
            .request_screenshot_fallback_action(&fallback_frame, run, &last_message, action, cancel)
            .await?;
        let Some(fallback) = fallback else {
            let message = match last_code {
                Some(code) => format!("Semantic execution failed: {last_message} ({code})"),
                None => format!("Semantic execution failed: {last_message}"),
            };
            return Ok(ExecutionEnvelope {
                action: action.clone(),
                result: ExecutionResult {
                    success: false,
                    message,
                    perception_source: PerceptionSource::ScreenshotFallback,
                    retryable: None,
                    error_code: last_code,
                    evidence: None,
                },
                perception_source: PerceptionSource::ScreenshotFallback,
                fallback_reason: Some(last_message),
            });
        };

        match self.ensure_action_allowed(&fallback, run, cancel).await {
            None => return Err(StepFailure::Aborted),
            Some(false) => {
                return Ok(ExecutionEnvelope {
                    action: fallback,
                    result: ExecutionResult {
                        success: false,
                        message: "Fallback action blocked by safety or confirmation policy"
                            .to_string(),
                        perception_source: PerceptionSource::ScreenshotFallback,
                        retryable: None,
                        error_code: None,
                        evidence: None,
                    },
                    perception_source: PerceptionSource::ScreenshotFallback,
                    fallback_reason: Some(last_message),
                });
            }
            Some(true) => {}
        }

        self.emit_agent(
            format!("Fallback action: {}", fallback.describe()),
            MessageKind::Action,
            Some(fallback.clone()),
        );
        let result = self.coordinate.execute(&fallback).await;
        Ok(ExecutionEnvelope {
            action: fallback,
            result,
            perception_source: PerceptionSource::ScreenshotFallback,
            fallback_reason: Some(last_message),
        })
    }

    async fn request_planner_action(
        &self,
        frame: &ScreenFrame,
        run: &RunState,
        cancel: &CancellationToken,
    ) -> Result<String, StepFailure> {
        let system = self.build_system_prompt(
            frame.width,
            frame.height,
            run,
            !self.options.semantic_enabled,
        );
        let mut messages = vec![PlannerMessage::system(system)];
        messages.extend(conversation_history(run));
        let text = if run.state.step_count == 0 {
            let intent_json = run
                .intent
                .as_ref()
                .and_then(|intent| serde_json::to_string(intent).ok())
                .unwrap_or_default();
            format!(
                "Structured intent:\n{intent_json}\nTask: {}\nReturn one best next action.",
                run.task
            )
        } else {
            let objective = run
                .intent
                .as_ref()
                .map(|intent| intent.objective.as_str())
                .unwrap_or(run.task.as_str());
            format!(
                "Intent objective: {objective}\nContinue from prior result and return one next action."
            )
        };
        messages.push(PlannerMessage::user_with_image(frame.base64.clone(), text));

        let request = PlannerRequest {
            model: self.options.planner_model.clone(),
            max_tokens: 900,
            temperature: None,
            messages,
        };
        let reply = tokio::select! {
            _ = cancel.cancelled() => return Err(StepFailure::Aborted),
            reply = self.planner.complete(request) => {
                reply.map_err(|error| StepFailure::Error(error.to_string()))?
            }
        };
        if let Some(usage) = reply.usage {
            self.meter
                .record(MeterPhase::Planner, &self.options.planner_model, &usage);
        }
        Ok(reply.content)
    }

    async fn request_screenshot_fallback_action(
        &self,
        frame: &ScreenFrame,
        run: &RunState,
        failure_reason: &str,
        semantic_action: &AgentAction,
        cancel: &CancellationToken,
    ) -> Result<Option<AgentAction>, StepFailure> {
        let system = [
            "You are a screenshot fallback planner.",
            "The semantic adapter could not execute the requested action.",
            "Return only one JSON action object.",
            "Allowed fallback actions: click, double_click, right_click, type, hotkey, scroll, \
             move, drag, wait, screenshot, done, fail.",
            "Do not return semantic actions in fallback mode.",
        ]
        .join("\n");
        let intent_json = run
            .intent
            .as_ref()
            .and_then(|intent| serde_json::to_string(intent).ok())
            .unwrap_or_default();
        let action_json = serde_json::to_string(semantic_action).unwrap_or_default();
        let text = format!(
            "Task: {}\nIntent: {intent_json}\nSemantic failure: {failure_reason}\n\
             Failed semantic action: {action_json}\n\
             Provide one coordinate-compatible fallback action now.",
            run.task
        );

        let mut messages = vec![PlannerMessage::system(system)];
        messages.extend(conversation_history(run));
        messages.push(PlannerMessage::user_with_image(frame.base64.clone(), text));

        let request = PlannerRequest {
            model: self.options.planner_model.clone(),
            max_tokens: 700,
            temperature: None,
            messages,
        };
        let reply = tokio::select! {
            _ = cancel.cancelled() => return Err(StepFailure::Aborted),
            reply = self.planner.complete(request) => {
                reply.map_err(|error| StepFailure::Error(error.to_string()))?
            }
        };
        if let Some(usage) = reply.usage {
            self.meter.record(
                MeterPhase::ScreenshotFallback,
                &self.options.planner_model,
                &usage,
            );
        }

        let Some(raw) = RawAction::from_planner_text(&reply.content) else {
            return Ok(None);
        };
        let viewport = Viewport::new(frame.width as i32, frame.height as i32);
        let Ok(action) = normalize_action(&raw, viewport) else {
            return Ok(None);
        };
        if action.is_semantic() {
            return Ok(None);
        }
        Ok(Some(action))
    }

    fn build_system_prompt(
        &self,
        width: u32,
        height: u32,
        run: &RunState,
        allow_pointer_coordinates: bool,
    ) -> String {
        let intent = run.intent.as_ref();
        let objective = intent
            .map(|i| i.objective.as_str())
            .unwrap_or(run.task.as_str());
        let success = intent
            .map(|i| i.success_criteria.as_str())
            .unwrap_or("User goal is achieved and confirmed.");
        let forbidden = intent
            .map(|i| i.constraints.forbidden_terms.join(", "))
            .filter(|terms| !terms.is_empty())
            .unwrap_or_else(|| "captcha bypass, unauthorized access".to_string());
        let requires_confirmation = if intent
            .map(|i| i.constraints.requires_confirmation)
            .unwrap_or(false)
        {
            "yes"
        } else {
            "no"
        };
        [
            "# AUTONOMOUS DESKTOP AGENT".to_string(),
            "You control a desktop computer by returning exactly one JSON action.".to_string(),
            "Prefer semantic actions first when possible.".to_string(),
            if allow_pointer_coordinates {
                "Pointer coordinate actions are allowed in this mode.".to_string()
            } else {
                "Pointer coordinate actions are NOT allowed in this mode (click, double_click, \
                 right_click, move, drag)."
                    .to_string()
            },
            "Intent objective:".to_string(),
            objective.to_string(),
            "Constraints:".to_string(),
            format!("- Forbidden behavior: {forbidden}"),
            format!("- Requires confirmation for risky operations: {requires_confirmation}"),
            "Termination conditions:".to_string(),
            format!("- done when: {success}"),
            "- fail when target is missing after retry or task is unsafe".to_string(),
            format!("Resolution: {width}x{height}"),
            "Coordinates origin: (0,0) top-left.".to_string(),
            "Allowed semantic actions: click_element, type_into_element, focus_element, \
             select_option, navigate_url, open_app."
                .to_string(),
            if allow_pointer_coordinates {
                "Allowed coordinate actions: click, double_click, right_click, move, drag, type, \
                 hotkey, scroll, wait, screenshot."
                    .to_string()
            } else {
                "Allowed non-pointer utility actions: type, hotkey, scroll, wait, screenshot."
                    .to_string()
            },
            "Also allowed terminal actions: done, fail.".to_string(),
            "Action schema reminder: {\"action\":\"...\",\"parameters\":{...}}".to_string(),
            "Output one JSON action object only.".to_string(),
        ]
        .join("\n")
    }

    fn set_execution_mode(
        &self,
        run: &mut RunState,
        mode: Option<PerceptionSource>,
        fallback_reason: Option<String>,
    ) {
        run.state.execution_mode = mode;
        run.state.fallback_reason = fallback_reason;
        self.emit_state(&run.state);
    }

    fn emit(&self, event: AgentEvent) {
        let _ = self.events.send(event);
    }

    fn emit_state(&self, state: &AgentState) {
        self.emit(AgentEvent::State(state.clone()));
    }

    fn emit_system(&self, content: impl Into<String>, kind: MessageKind) {
        self.emit(AgentEvent::Message(AgentMessage::new(
            MessageRole::System,
            kind,
            content,
        )));
    }

    fn emit_agent(
        &self,
        content: impl Into<String>,
        kind: MessageKind,
        action: Option<AgentAction>,
    ) {
        let mut message = AgentMessage::new(MessageRole::Agent, kind, content);
        if let Some(action) = action {
            message = message.with_action(action);
        }
        self.emit(AgentEvent::Message(message));
    }
}

/// Last eight executed steps as assistant/user message pairs.
fn conversation_history(run: &RunState) -> Vec<PlannerMessage> {
    let start = run.history.len().saturating_sub(8);
    let mut messages = Vec::new();
    for record in &run.history[start..] {
        if let Ok(json) = serde_json::to_string(&record.action) {
            messages.push(PlannerMessage::assistant(json));
        }
        messages.push(PlannerMessage::user(format!(
            "Action result: {}",
            record.result
        )));
    }
    messages
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
