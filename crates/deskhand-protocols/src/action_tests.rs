use super::*;
use serde_json::json;

#[test]
fn wire_schema_round_trip() {
    let action = AgentAction::Click { x: 10, y: 20 };
    let value = serde_json::to_value(&action).unwrap();
    assert_eq!(value, json!({"action": "click", "parameters": {"x": 10, "y": 20}}));

    let back: AgentAction = serde_json::from_value(value).unwrap();
    assert_eq!(back, action);
}

#[test]
fn semantic_actions_carry_targets() {
    let action = AgentAction::ClickElement {
        target: SemanticTarget {
            name: Some("Send".to_string()),
            ..Default::default()
        },
    };
    assert!(action.is_semantic());
    assert!(action.target().unwrap().is_resolved());
    assert_eq!(action.kind(), "click_element");
}

#[test]
fn pointer_and_terminal_classification() {
    assert!(AgentAction::Drag { from: [0, 0], to: [5, 5] }.is_pointer_coordinate());
    assert!(!AgentAction::Type { text: "hi".into() }.is_pointer_coordinate());
    assert!(AgentAction::Done { summary: String::new() }.is_terminal());
    assert!(!AgentAction::Wait { seconds: 1.0 }.is_terminal());
}

#[test]
fn raw_action_from_planner_text_extracts_first_json_span() {
    let raw = RawAction::from_planner_text(
        "Here is the next step:\n{\"action\": \"click\", \"parameters\": {\"x\": 1, \"y\": 2}}\nthanks",
    )
    .unwrap();
    assert_eq!(raw.action, "click");
    assert_eq!(raw.parameters.get("x"), Some(&json!(1)));
}

#[test]
fn raw_action_coerces_bad_parameters_to_empty_map() {
    let raw = RawAction::from_value(json!({"action": "wait", "parameters": [1, 2]})).unwrap();
    assert!(raw.parameters.is_empty());

    let raw = RawAction::from_value(json!({"action": "wait"})).unwrap();
    assert!(raw.parameters.is_empty());
}

#[test]
fn raw_action_rejects_non_action_payloads() {
    assert!(RawAction::from_planner_text("no json here").is_none());
    assert!(RawAction::from_value(json!({"parameters": {}})).is_none());
    assert!(RawAction::from_value(json!({"action": 7})).is_none());
}

#[test]
fn raw_action_target_tolerates_malformed_shapes() {
    let mut raw = RawAction::new("click_element");
    raw.parameters.insert("target".into(), json!("not an object"));
    assert_eq!(raw.target(), SemanticTarget::default());

    raw.parameters.insert("target".into(), json!({"name": "OK", "coords": {"x": 3, "y": 4}}));
    let target = raw.target();
    assert_eq!(target.name.as_deref(), Some("OK"));
    assert_eq!(target.coords, Some(Point { x: 3, y: 4 }));
}

#[test]
fn typed_action_converts_to_raw_wire_form() {
    let action = AgentAction::NavigateUrl {
        url: "https://example.com/".to_string(),
        target: SemanticTarget {
            url: Some("https://example.com/".to_string()),
            ..Default::default()
        },
    };
    let raw = RawAction::from(&action);
    assert_eq!(raw.action, "navigate_url");
    assert_eq!(raw.str_param("url"), Some("https://example.com/"));
}
