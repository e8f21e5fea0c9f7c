use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::planner::{PlannerReply, PlannerUsage};

use super::*;

struct FakePlanner {
    replies: Mutex<VecDeque<Result<String, PlannerError>>>,
    calls: AtomicUsize,
}

impl FakePlanner {
    fn with_replies(replies: Vec<Result<String, PlannerError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Planner for FakePlanner {
    async fn complete(&self, _request: PlannerRequest) -> Result<PlannerReply, PlannerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.replies.lock().pop_front() {
            Some(Ok(content)) => Ok(PlannerReply {
                content,
                usage: Some(PlannerUsage {
                    prompt_tokens: 10,
                    completion_tokens: 10,
                    total_tokens: 20,
                }),
            }),
            Some(Err(error)) => Err(error),
            None => panic!("unexpected planner call"),
        }
    }
}

fn parser_with(planner: Arc<FakePlanner>) -> IntentParser {
    IntentParser::new(planner, "intent-model", 0.65, Arc::new(TokenMeter::new(false)))
}

#[test]
fn stop_command_wins_with_high_confidence() {
    let result = deterministic_parse("please stop the task").unwrap();
    assert_eq!(result.intent.intent_type, IntentType::Stop);
    assert!((result.confidence - 0.98).abs() < 1e-9);
    assert!(!result.clarification_needed);
}

#[test]
fn gmail_compose_builds_prefilled_url() {
    let result =
        deterministic_parse("compose a gmail to a.b@example.com saying \"hi there\" and send it")
            .unwrap();
    assert_eq!(result.intent.intent_type, IntentType::MultiStepGoal);
    assert!((result.confidence - 0.93).abs() < 1e-9);
    let url = result.intent.targets.url.as_deref().unwrap();
    assert!(url.starts_with("https://mail.google.com/mail/u/0/?view=cm&fs=1&to=a.b%40example.com"));
    assert!(url.contains("&body=hi%20there"));
    assert_eq!(result.intent.targets.element.as_deref(), Some("Send"));
    assert_eq!(result.intent.target_app.as_deref(), Some("chrome"));
}

#[test]
fn gmail_compose_without_send_has_no_element() {
    let result = deterministic_parse("compose a gmail to a.b@example.com").unwrap();
    assert!(result.intent.targets.element.is_none());
    assert!(result
        .intent
        .success_criteria
        .contains("prefilled"));
}

#[test]
fn open_and_navigate_combines_into_multi_step_goal() {
    let result = deterministic_parse("open chrome and go to github.com").unwrap();
    assert_eq!(result.intent.intent_type, IntentType::MultiStepGoal);
    assert!((result.confidence - 0.9).abs() < 1e-9);
    assert_eq!(result.intent.targets.url.as_deref(), Some("github.com"));
    assert!(result
        .intent
        .target_app
        .as_deref()
        .unwrap()
        .starts_with("chrome"));
    assert_eq!(
        result.intent.preferred_surface,
        Some(PreferredSurface::Browser)
    );
}

#[test]
fn navigate_only_parses_url() {
    let result = deterministic_parse("go to example.com").unwrap();
    assert_eq!(result.intent.intent_type, IntentType::NavigateUrl);
    assert!((result.confidence - 0.94).abs() < 1e-9);
    assert_eq!(result.intent.targets.url.as_deref(), Some("example.com"));
}

#[test]
fn open_app_with_and_without_app_name() {
    let result = deterministic_parse("open notepad").unwrap();
    assert_eq!(result.intent.intent_type, IntentType::OpenApp);
    assert!((result.confidence - 0.88).abs() < 1e-9);
    assert_eq!(result.intent.targets.app.as_deref(), Some("notepad"));
    assert_eq!(
        result.intent.preferred_surface,
        Some(PreferredSurface::Desktop)
    );

    let result = deterministic_parse("open").unwrap();
    assert!((result.confidence - 0.62).abs() < 1e-9);
    assert!(result.clarification_needed);
    assert_eq!(
        result.clarification_question.as_deref(),
        Some("Which application should I open?")
    );
}

#[test]
fn open_chrome_prefers_browser_surface() {
    let result = deterministic_parse("open chrome").unwrap();
    assert_eq!(
        result.intent.preferred_surface,
        Some(PreferredSurface::Browser)
    );
}

#[test]
fn click_with_coordinates_is_high_confidence() {
    let result = deterministic_parse("click 200,300").unwrap();
    assert_eq!(result.intent.intent_type, IntentType::ClickElement);
    assert!((result.confidence - 0.96).abs() < 1e-9);
    assert_eq!(
        result.intent.targets.coords,
        Some(Point { x: 200, y: 300 })
    );
}

#[test]
fn click_by_element_keeps_remaining_text() {
    let result = deterministic_parse("click the save button").unwrap();
    assert!((result.confidence - 0.78).abs() < 1e-9);
    assert_eq!(
        result.intent.targets.element.as_deref(),
        Some("the save button")
    );
    assert_eq!(
        result.intent.preferred_surface,
        Some(PreferredSurface::Desktop)
    );
}

#[test]
fn type_with_quoted_text() {
    let result = deterministic_parse("type \"hello world\" in the search box").unwrap();
    assert_eq!(result.intent.intent_type, IntentType::TypeText);
    assert!((result.confidence - 0.9).abs() < 1e-9);
    assert_eq!(
        result.intent.targets.text.as_deref(),
        Some("hello world")
    );
    assert!(!result.intent.constraints.requires_confirmation);
}

#[test]
fn type_without_quotes_needs_clarification() {
    let result = deterministic_parse("type something").unwrap();
    assert!((result.confidence - 0.58).abs() < 1e-9);
    assert!(result.clarification_needed);
}

#[test]
fn typing_secrets_requires_confirmation() {
    let result = deterministic_parse("type \"hunter2\" into the password field").unwrap();
    assert!(result.intent.constraints.requires_confirmation);
}

#[test]
fn hotkey_combo_splits_into_keys() {
    let result = deterministic_parse("press ctrl+shift").unwrap();
    assert_eq!(result.intent.intent_type, IntentType::PressHotkey);
    assert!((result.confidence - 0.95).abs() < 1e-9);
    assert_eq!(
        result.intent.targets.hotkey.as_deref(),
        Some(&["ctrl".to_string(), "shift".to_string()][..])
    );
}

#[test]
fn scroll_direction_detection() {
    let result = deterministic_parse("scroll down the page").unwrap();
    assert!((result.confidence - 0.88).abs() < 1e-9);
    assert_eq!(result.intent.targets.element.as_deref(), Some("down"));
    assert_eq!(
        result.intent.preferred_surface,
        Some(PreferredSurface::Browser)
    );

    let result = deterministic_parse("scroll").unwrap();
    assert!((result.confidence - 0.67).abs() < 1e-9);
    assert!(result.clarification_needed);
    assert_eq!(
        result.clarification_question.as_deref(),
        Some("Should I scroll up or down?")
    );
}

#[test]
fn wait_is_recognized() {
    let result = deterministic_parse("wait a moment").unwrap();
    assert_eq!(result.intent.intent_type, IntentType::Wait);
    assert!((result.confidence - 0.9).abs() < 1e-9);
}

#[test]
fn empty_and_unknown_commands_return_none() {
    assert!(deterministic_parse("   ").is_none());
    assert!(deterministic_parse("do the needful").is_none());
}

#[tokio::test]
async fn confident_deterministic_parse_skips_the_model() {
    let planner = FakePlanner::with_replies(vec![]);
    let parser = parser_with(planner.clone());
    let result = parser.parse("go to example.com").await;
    assert_eq!(result.source, IntentSource::Deterministic);
    assert_eq!(planner.calls(), 0);
}

#[tokio::test]
async fn model_fallback_fills_in_unknown_commands() {
    let planner = FakePlanner::with_replies(vec![Ok(r#"{
        "intent": {
            "intentType": "open_app",
            "objective": "open the calculator",
            "targetApp": "calculator",
            "targets": {"app": "calculator"},
            "constraints": {"forbiddenTerms": [], "requiresConfirmation": false},
            "successCriteria": "Calculator is open"
        },
        "confidence": 0.91,
        "clarificationNeeded": false
    }"#
    .to_string())]);
    let parser = parser_with(planner.clone());
    let result = parser.parse("do the calculator thing").await;
    assert_eq!(result.source, IntentSource::Model);
    assert_eq!(result.intent.intent_type, IntentType::OpenApp);
    assert!((result.confidence - 0.91).abs() < 1e-9);
    // Empty forbidden-terms list gets the defaults merged back in.
    assert!(!result.intent.constraints.forbidden_terms.is_empty());
    assert_eq!(planner.calls(), 1);
}

#[tokio::test]
async fn low_confidence_model_result_asks_for_clarification() {
    let planner = FakePlanner::with_replies(vec![Ok(
        r#"{"intent": {"intentType": "unknown"}, "confidence": 0.3, "clarificationNeeded": false}"#
            .to_string(),
    )]);
    let parser = parser_with(planner);
    let result = parser.parse("hmm").await;
    assert!(result.clarification_needed);
    assert!(result.clarification_question.is_some());
}

#[tokio::test]
async fn model_failure_degrades_to_unknown_intent() {
    let planner = FakePlanner::with_replies(vec![Err(PlannerError::Api {
        status: 500,
        message: "boom".to_string(),
    })]);
    let parser = parser_with(planner);
    let result = parser.parse("garbled input").await;
    assert_eq!(result.intent.intent_type, IntentType::Unknown);
    assert_eq!(result.confidence, 0.0);
    assert!(result.clarification_needed);
    assert!(result
        .clarification_question
        .as_deref()
        .unwrap()
        .contains("could not confidently interpret"));
}

#[tokio::test]
async fn model_reply_json_is_extracted_from_prose() {
    let planner = FakePlanner::with_replies(vec![Ok(
        "Here you go:\n```json\n{\"intent\": {\"intentType\": \"wait\", \"objective\": \"wait\"}, \
         \"confidence\": 0.8, \"clarificationNeeded\": false}\n```"
            .to_string(),
    )]);
    let parser = parser_with(planner);
    let result = parser.parse("zzz").await;
    assert_eq!(result.intent.intent_type, IntentType::Wait);
    assert!((result.confidence - 0.8).abs() < 1e-9);
}

#[tokio::test]
async fn clarifying_deterministic_parse_still_consults_the_model() {
    // "open" alone parses deterministically at 0.62 with a clarification,
    // which is below threshold, so the model gets a chance first.
    let planner = FakePlanner::with_replies(vec![Err(PlannerError::Api {
        status: 503,
        message: "down".to_string(),
    })]);
    let parser = parser_with(planner.clone());
    let result = parser.parse("open").await;
    assert_eq!(planner.calls(), 1);
    assert_eq!(result.intent.intent_type, IntentType::Unknown);
}
