use std::path::PathBuf;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use deskhand_config::{BrowserConfig, ProfileMode};

use super::{detect_last_used_profile, BrowserSessionManager};

fn test_config() -> BrowserConfig {
    BrowserConfig {
        debug_port: 9222,
        profile_mode: ProfileMode::System,
        profile_dir: PathBuf::from("./profile"),
        system_profile: "auto".to_string(),
        system_user_data_dir: None,
        blocklist: Vec::new(),
    }
}

fn manager_for(server: &MockServer) -> BrowserSessionManager {
    BrowserSessionManager::with_endpoint(test_config(), server.uri())
}

#[tokio::test]
async fn ensure_session_attaches_to_running_browser() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/json/version"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "browser": "Chrome/130.0",
            "webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/browser/abc"
        })))
        .mount(&server)
        .await;

    let manager = manager_for(&server);
    manager.ensure_session().await.unwrap();
}

#[tokio::test]
async fn active_tab_is_first_page_entry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/json/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "W1", "type": "service_worker", "title": "", "url": "" },
            { "id": "P1", "type": "page", "title": "Inbox", "url": "https://mail.test" },
            { "id": "P2", "type": "page", "title": "Docs", "url": "https://docs.test" }
        ])))
        .mount(&server)
        .await;

    let manager = manager_for(&server);
    let tab = manager.active_tab().await.unwrap().unwrap();
    assert_eq!(tab.id, "P1");
}

#[tokio::test]
async fn active_tab_is_none_without_pages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/json/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "W1", "type": "service_worker", "title": "", "url": "" }
        ])))
        .mount(&server)
        .await;

    let manager = manager_for(&server);
    assert!(manager.active_tab().await.unwrap().is_none());
}

#[tokio::test]
async fn open_tab_uses_put() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/json/new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "T1", "type": "page", "title": "", "url": "https://example.com"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let manager = manager_for(&server);
    let tab = manager.open_tab("https://example.com").await.unwrap();
    assert_eq!(tab.id, "T1");
}

#[tokio::test]
async fn open_tab_falls_back_to_get_when_put_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/json/new"))
        .respond_with(ResponseTemplate::new(405))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/json/new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "T2", "type": "page", "title": "", "url": "https://example.com"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let manager = manager_for(&server);
    let tab = manager.open_tab("https://example.com").await.unwrap();
    assert_eq!(tab.id, "T2");
}

#[tokio::test]
async fn activate_tab_hits_discovery_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/json/activate/P1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let manager = manager_for(&server);
    manager.activate_tab("P1").await.unwrap();
}

#[test]
fn last_used_profile_read_from_local_state() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("Local State"),
        r#"{"profile":{"last_used":"Profile 3"}}"#,
    )
    .unwrap();
    assert_eq!(detect_last_used_profile(dir.path()), "Profile 3");
}

#[test]
fn last_used_profile_defaults_when_missing() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(detect_last_used_profile(dir.path()), "Default");

    std::fs::write(dir.path().join("Local State"), "not json").unwrap();
    assert_eq!(detect_last_used_profile(dir.path()), "Default");
}

#[tokio::test]
async fn cooldown_reports_standing_error_until_cleared() {
    let server = MockServer::start().await;
    let manager = manager_for(&server);
    assert!(manager.availability_error().is_none());

    manager.mark_unavailable("endpoint refused connection");
    let error = manager.availability_error().unwrap();
    assert!(error.to_string().contains("endpoint refused connection"));

    manager.clear_unavailable();
    assert!(manager.availability_error().is_none());
}
