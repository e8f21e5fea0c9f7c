use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use deskhand_config::SidecarConfig;
use deskhand_protocols::{
    AgentAction, ErrorCode, PerceptionSource, SemanticSurface, SemanticTarget,
};

use super::SidecarSurface;
use crate::manager::SidecarManager;

fn surface_against(server: &MockServer, supported: bool) -> SidecarSurface {
    let config = SidecarConfig {
        port: 8765,
        executable: PathBuf::from("/nonexistent/sidecar"),
        supported,
    };
    SidecarSurface::new(Arc::new(SidecarManager::with_base_url(config, server.uri())))
}

async fn mount_healthy(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .mount(server)
        .await;
}

fn click(name: &str) -> AgentAction {
    AgentAction::ClickElement {
        target: SemanticTarget {
            name: Some(name.to_string()),
            ..Default::default()
        },
    }
}

#[tokio::test]
async fn unsupported_platform_reports_surface_unavailable() {
    let server = MockServer::start().await;
    let surface = surface_against(&server, false);
    let result = surface.execute(&click("OK")).await;
    assert!(!result.success);
    assert_eq!(result.error_code, Some(ErrorCode::SurfaceUnavailable));
    assert!(result.is_retryable());
}

#[tokio::test]
async fn click_success_carries_service_evidence() {
    let server = MockServer::start().await;
    mount_healthy(&server).await;
    Mock::given(method("POST"))
        .and(path("/act/click"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "message": "clicked OK",
            "data": { "elementId": "e-9", "role": "button" }
        })))
        .mount(&server)
        .await;

    let surface = surface_against(&server, true);
    let result = surface.execute(&click("OK")).await;
    assert!(result.success);
    assert_eq!(result.perception_source, PerceptionSource::Accessibility);
    assert_eq!(result.message, "clicked OK");
    let evidence = result.evidence.unwrap();
    assert_eq!(evidence.get("elementId"), Some(&json!("e-9")));
}

#[tokio::test]
async fn failed_click_maps_service_error_code() {
    let server = MockServer::start().await;
    mount_healthy(&server).await;
    Mock::given(method("POST"))
        .and(path("/act/click"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": false,
            "message": "no match in tree",
            "errorCode": "target_not_found"
        })))
        .mount(&server)
        .await;

    let surface = surface_against(&server, true);
    let result = surface.execute(&click("Missing")).await;
    assert!(!result.success);
    assert_eq!(result.error_code, Some(ErrorCode::TargetNotFound));
    assert!(result.is_retryable());
}

#[tokio::test]
async fn type_into_element_round_trips() {
    let server = MockServer::start().await;
    mount_healthy(&server).await;
    Mock::given(method("POST"))
        .and(path("/act/type"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;

    let surface = surface_against(&server, true);
    let action = AgentAction::TypeIntoElement {
        text: "hello".to_string(),
        target: SemanticTarget {
            name: Some("Editor".to_string()),
            ..Default::default()
        },
    };
    let result = surface.execute(&action).await;
    assert!(result.success);
    assert_eq!(result.message, "Typed into desktop element");
}

#[tokio::test]
async fn select_option_falls_back_to_focus() {
    let server = MockServer::start().await;
    mount_healthy(&server).await;
    Mock::given(method("POST"))
        .and(path("/act/focus"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&server)
        .await;

    let surface = surface_against(&server, true);
    let action = AgentAction::SelectOption {
        value: "NZ".to_string(),
        target: SemanticTarget {
            name: Some("Country".to_string()),
            ..Default::default()
        },
    };
    assert!(surface.execute(&action).await.success);
}

#[tokio::test]
async fn coordinate_actions_are_rejected() {
    let server = MockServer::start().await;
    mount_healthy(&server).await;
    let surface = surface_against(&server, true);
    let result = surface.execute(&AgentAction::Click { x: 1, y: 2 }).await;
    assert!(!result.success);
    assert_eq!(result.error_code, Some(ErrorCode::UnsupportedAction));
}
