use deskhand_protocols::action::Point;
use deskhand_protocols::intent::{IntentParseResult, IntentTargets};

use crate::intent::deterministic_parse;

use super::*;

fn intent_for(command: &str) -> IntentParseResult {
    deterministic_parse(command).expect("command should parse deterministically")
}

#[test]
fn navigate_intent_becomes_single_navigate_action() {
    let parse = intent_for("go to example.com");
    let plan = build_intent_plan(&parse.intent);
    assert_eq!(plan.len(), 1);
    match &plan[0] {
        AgentAction::NavigateUrl { url, target } => {
            assert_eq!(url, "example.com");
            assert_eq!(target.url.as_deref(), Some("example.com"));
        }
        other => panic!("expected navigate_url, got {other:?}"),
    }
}

#[test]
fn open_and_navigate_waits_between_steps() {
    let parse = intent_for("open chrome and go to github.com");
    let plan = build_intent_plan(&parse.intent);
    assert_eq!(plan.len(), 2);
    assert!(matches!(plan[0], AgentAction::Wait { seconds } if (seconds - 0.8).abs() < 1e-9));
    assert!(matches!(plan[1], AgentAction::NavigateUrl { .. }));
}

#[test]
fn open_app_only_plan() {
    let parse = intent_for("open notepad");
    let plan = build_intent_plan(&parse.intent);
    assert_eq!(plan.len(), 1);
    match &plan[0] {
        AgentAction::OpenApp { app, target } => {
            assert_eq!(app, "notepad");
            assert_eq!(target.app.as_deref(), Some("notepad"));
        }
        other => panic!("expected open_app, got {other:?}"),
    }
}

#[test]
fn gmail_compose_with_send_clicks_the_send_button() {
    let parse = intent_for("compose a gmail to a@b.com saying \"hello\" and send");
    let plan = build_intent_plan(&parse.intent);
    assert_eq!(plan.len(), 3);
    assert!(matches!(plan[0], AgentAction::NavigateUrl { .. }));
    assert!(matches!(plan[1], AgentAction::Wait { seconds } if (seconds - 1.0).abs() < 1e-9));
    match &plan[2] {
        AgentAction::ClickElement { target } => {
            assert_eq!(target.name.as_deref(), Some("Send"));
            assert_eq!(target.window_title.as_deref(), Some("Gmail"));
        }
        other => panic!("expected click_element, got {other:?}"),
    }
}

#[test]
fn click_intent_with_coordinates_bypasses_semantic_click() {
    let parse = intent_for("click 200,300");
    let plan = build_intent_plan(&parse.intent);
    assert_eq!(plan, vec![AgentAction::Click { x: 200, y: 300 }]);
}

#[test]
fn scroll_intent_uses_fixed_amount() {
    let parse = intent_for("scroll up");
    let plan = build_intent_plan(&parse.intent);
    assert_eq!(
        plan,
        vec![AgentAction::Scroll {
            direction: ScrollDirection::Up,
            amount: 350,
        }]
    );
}

#[test]
fn type_without_element_uses_plain_type() {
    let parse = intent_for("type \"hello\"");
    let plan = build_intent_plan(&parse.intent);
    assert_eq!(
        plan,
        vec![AgentAction::Type {
            text: "hello".to_string(),
        }]
    );
}

#[test]
fn stop_and_unknown_have_empty_plans() {
    let parse = intent_for("stop");
    assert!(build_intent_plan(&parse.intent).is_empty());
    let unknown = IntentSpec::unknown("???");
    assert!(build_intent_plan(&unknown).is_empty());
}

#[test]
fn wait_seconds_extraction() {
    assert!((extract_wait_seconds("wait 5 seconds") - 5.0).abs() < 1e-9);
    assert!((extract_wait_seconds("wait 2 min") - 30.0).abs() < 1e-9);
    assert!((extract_wait_seconds("wait 0.2s") - 0.2).abs() < 1e-9);
    assert!((extract_wait_seconds("wait") - 1.0).abs() < 1e-9);
}

#[test]
fn unresolved_element_click_with_known_coords_becomes_coordinate_click() {
    let mut intent = IntentSpec::unknown("click it");
    intent.targets = IntentTargets {
        coords: Some(Point { x: 40, y: 60 }),
        ..IntentTargets::default()
    };
    let raw = RawAction::new("click_element");
    let defaulted = apply_intent_defaults(raw, &intent);
    assert_eq!(defaulted.action, "click");
    assert_eq!(defaulted.parameters["x"], 40);
    assert_eq!(defaulted.parameters["y"], 60);
}

#[test]
fn navigate_url_default_fills_url_from_intent() {
    let mut intent = IntentSpec::unknown("go somewhere");
    intent.targets.url = Some("https://example.com".to_string());
    let raw = RawAction::new("navigate_url");
    let defaulted = apply_intent_defaults(raw, &intent);
    assert_eq!(defaulted.str_param("url"), Some("https://example.com"));
    assert_eq!(
        defaulted.target().url.as_deref(),
        Some("https://example.com")
    );
}

#[test]
fn element_name_default_is_applied_to_element_actions() {
    let mut intent = IntentSpec::unknown("click the save button");
    intent.targets.element = Some("Save".to_string());
    let raw = RawAction::new("click_element");
    let defaulted = apply_intent_defaults(raw, &intent);
    assert_eq!(defaulted.target().name.as_deref(), Some("Save"));
}

#[test]
fn type_into_element_defaults_text_and_target() {
    let mut intent = IntentSpec::unknown("type the message");
    intent.targets.element = Some("Message".to_string());
    intent.targets.text = Some("hi".to_string());
    let raw = RawAction::new("type_into_element");
    let defaulted = apply_intent_defaults(raw, &intent);
    assert_eq!(defaulted.str_param("text"), Some("hi"));
    assert_eq!(defaulted.target().name.as_deref(), Some("Message"));
}

#[test]
fn resolved_targets_are_left_alone() {
    let mut intent = IntentSpec::unknown("click");
    intent.targets.element = Some("Other".to_string());
    let mut raw = RawAction::new("click_element");
    let mut target = SemanticTarget::default();
    target.selector = Some("#save".to_string());
    raw.set_target(&target);
    let defaulted = apply_intent_defaults(raw, &intent);
    assert_eq!(defaulted.target().selector.as_deref(), Some("#save"));
    assert!(defaulted.target().name.is_none());
}
