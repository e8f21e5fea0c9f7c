use serde_json::json;

use deskhand_protocols::{AgentAction, ErrorCode, RawAction, ScrollDirection};

use super::{normalize_action, Viewport};

const SCREEN: Viewport = Viewport {
    width: 1920,
    height: 1080,
};

fn raw(action: &str, parameters: serde_json::Value) -> RawAction {
    RawAction::from_value(json!({ "action": action, "parameters": parameters }))
        .unwrap_or_else(|| panic!("invalid raw action fixture for {action}"))
}

#[test]
fn click_coordinates_are_rounded_and_clamped() {
    let action = normalize_action(&raw("click", json!({ "x": 5000.7, "y": -3 })), SCREEN).unwrap();
    assert_eq!(action, AgentAction::Click { x: 1919, y: 0 });
}

#[test]
fn numeric_strings_are_coerced() {
    let action = normalize_action(&raw("move", json!({ "x": "100", "y": "250.4" })), SCREEN).unwrap();
    assert_eq!(action, AgentAction::Move { x: 100, y: 250 });
}

#[test]
fn missing_coordinates_are_rejected() {
    let err = normalize_action(&raw("click", json!({ "x": 10 })), SCREEN).unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidCoordinates);
}

#[test]
fn drag_endpoints_are_clamped() {
    let action = normalize_action(
        &raw("drag", json!({ "from": [-5, 50], "to": [99999, 200] })),
        SCREEN,
    )
    .unwrap();
    assert_eq!(
        action,
        AgentAction::Drag {
            from: [0, 50],
            to: [1919, 200]
        }
    );
}

#[test]
fn drag_without_pairs_is_rejected() {
    let err = normalize_action(&raw("drag", json!({ "from": [10] })), SCREEN).unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidDragPayload);
}

#[test]
fn hotkey_keys_are_lowercased_and_filtered() {
    let action = normalize_action(
        &raw("hotkey", json!({ "keys": [" CTRL ", "Shift", "N", "!!"] })),
        SCREEN,
    )
    .unwrap();
    assert_eq!(
        action,
        AgentAction::Hotkey {
            keys: vec!["ctrl".into(), "shift".into(), "n".into()]
        }
    );
}

#[test]
fn hotkey_with_no_valid_keys_is_rejected() {
    let err = normalize_action(&raw("hotkey", json!({ "keys": ["@#$"] })), SCREEN).unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidHotkey);
}

#[test]
fn scroll_defaults_and_clamps() {
    let action = normalize_action(&raw("scroll", json!({})), SCREEN).unwrap();
    assert_eq!(
        action,
        AgentAction::Scroll {
            direction: ScrollDirection::Down,
            amount: 250
        }
    );

    let action = normalize_action(
        &raw("scroll", json!({ "direction": "UP", "amount": 1_000_000 })),
        SCREEN,
    )
    .unwrap();
    assert_eq!(
        action,
        AgentAction::Scroll {
            direction: ScrollDirection::Up,
            amount: 2400
        }
    );
}

#[test]
fn wait_seconds_are_clamped() {
    let action = normalize_action(&raw("wait", json!({ "seconds": 0.0 })), SCREEN).unwrap();
    assert_eq!(action, AgentAction::Wait { seconds: 0.1 });

    let action = normalize_action(&raw("wait", json!({ "seconds": 120 })), SCREEN).unwrap();
    assert_eq!(action, AgentAction::Wait { seconds: 30.0 });

    let action = normalize_action(&raw("wait", json!({})), SCREEN).unwrap();
    assert_eq!(action, AgentAction::Wait { seconds: 1.0 });
}

#[test]
fn navigate_url_falls_back_to_target_url() {
    let action = normalize_action(
        &raw("navigate_url", json!({ "target": { "url": "example.com" } })),
        SCREEN,
    )
    .unwrap();
    match action {
        AgentAction::NavigateUrl { url, target } => {
            assert_eq!(url, "example.com");
            assert_eq!(target.url.as_deref(), Some("example.com"));
        }
        other => panic!("unexpected action: {other:?}"),
    }
}

#[test]
fn navigate_url_without_url_is_rejected() {
    let err = normalize_action(&raw("navigate_url", json!({})), SCREEN).unwrap_err();
    assert_eq!(err.code, ErrorCode::MissingTargetUrl);
}

#[test]
fn open_app_requires_app() {
    let err = normalize_action(&raw("open_app", json!({ "target": {} })), SCREEN).unwrap_err();
    assert_eq!(err.code, ErrorCode::MissingTargetApp);
}

#[test]
fn type_into_element_requires_text_and_target() {
    let err = normalize_action(
        &raw("type_into_element", json!({ "target": { "name": "Search" } })),
        SCREEN,
    )
    .unwrap_err();
    assert_eq!(err.code, ErrorCode::MissingTargetText);

    let err = normalize_action(
        &raw("type_into_element", json!({ "text": "hello" })),
        SCREEN,
    )
    .unwrap_err();
    assert_eq!(err.code, ErrorCode::TargetUnresolved);

    let action = normalize_action(
        &raw(
            "type_into_element",
            json!({ "text": "hello", "target": { "selector": "#q" } }),
        ),
        SCREEN,
    )
    .unwrap();
    match action {
        AgentAction::TypeIntoElement { text, target } => {
            assert_eq!(text, "hello");
            assert_eq!(target.text.as_deref(), Some("hello"));
        }
        other => panic!("unexpected action: {other:?}"),
    }
}

#[test]
fn element_actions_require_resolved_target() {
    for kind in ["click_element", "focus_element", "select_option"] {
        let err = normalize_action(&raw(kind, json!({ "target": { "role": "button" } })), SCREEN)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::TargetUnresolved, "{kind}");
    }
}

#[test]
fn malformed_target_fields_are_dropped() {
    let action = normalize_action(
        &raw(
            "click_element",
            json!({ "target": { "name": "OK", "selector": 42, "coords": { "x": "10", "y": 20.6 } } }),
        ),
        SCREEN,
    )
    .unwrap();
    match action {
        AgentAction::ClickElement { target } => {
            assert_eq!(target.name.as_deref(), Some("OK"));
            assert_eq!(target.selector, None);
            let coords = target.coords.unwrap();
            assert_eq!((coords.x, coords.y), (10, 21));
        }
        other => panic!("unexpected action: {other:?}"),
    }
}

#[test]
fn unknown_action_is_unsupported() {
    let err = normalize_action(&raw("teleport", json!({})), SCREEN).unwrap_err();
    assert_eq!(err.code, ErrorCode::UnsupportedAction);
}

#[test]
fn normalization_is_idempotent() {
    let first = normalize_action(
        &raw("scroll", json!({ "direction": "up", "amount": 9999.4 })),
        SCREEN,
    )
    .unwrap();
    let second = normalize_action(&RawAction::from(&first), SCREEN).unwrap();
    assert_eq!(first, second);
}
