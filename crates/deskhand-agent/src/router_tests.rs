use async_trait::async_trait;
use parking_lot::Mutex;

use deskhand_protocols::error::ErrorCode;
use deskhand_protocols::intent::IntentTargets;
use deskhand_protocols::surface::SemanticSurface;

use super::*;

struct FakeSurface {
    label: &'static str,
    source: PerceptionSource,
    calls: Mutex<Vec<AgentAction>>,
}

impl FakeSurface {
    fn new(label: &'static str, source: PerceptionSource) -> Arc<Self> {
        Arc::new(Self {
            label,
            source,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<AgentAction> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl SemanticSurface for FakeSurface {
    fn name(&self) -> &'static str {
        self.label
    }

    async fn execute(&self, action: &AgentAction) -> ExecutionResult {
        self.calls.lock().push(action.clone());
        ExecutionResult::ok(self.source, format!("{} handled {}", self.label, action.kind()))
    }
}

fn router_with(
    blocklist: Vec<String>,
) -> (SemanticRouter, Arc<FakeSurface>, Arc<FakeSurface>) {
    let browser = FakeSurface::new("browser", PerceptionSource::BrowserProtocol);
    let sidecar = FakeSurface::new("accessibility", PerceptionSource::Accessibility);
    let router = SemanticRouter::new(browser.clone(), sidecar.clone(), blocklist);
    (router, browser, sidecar)
}

fn intent_with_targets(targets: IntentTargets) -> IntentSpec {
    let mut intent = IntentSpec::unknown("task");
    intent.targets = targets;
    intent
}

#[tokio::test]
async fn navigation_always_routes_to_the_browser() {
    let (router, browser, sidecar) = router_with(Vec::new());
    let action = AgentAction::NavigateUrl {
        url: "https://example.com".to_string(),
        target: SemanticTarget::default(),
    };
    let result = router.execute(&action, None).await;
    assert!(result.success);
    assert_eq!(result.perception_source, PerceptionSource::BrowserProtocol);
    assert_eq!(browser.calls().len(), 1);
    assert!(sidecar.calls().is_empty());
}

#[tokio::test]
async fn blocked_navigation_never_reaches_a_surface() {
    let (router, browser, sidecar) = router_with(vec!["blocked.example".to_string()]);
    let action = AgentAction::NavigateUrl {
        url: "https://blocked.example/login".to_string(),
        target: SemanticTarget::default(),
    };
    let result = router.execute(&action, None).await;
    assert!(!result.success);
    assert_eq!(result.error_code, Some(ErrorCode::BlockedDomain));
    assert!(browser.calls().is_empty());
    assert!(sidecar.calls().is_empty());
}

#[tokio::test]
async fn invalid_navigation_url_is_rejected() {
    let (router, browser, _) = router_with(Vec::new());
    let action = AgentAction::NavigateUrl {
        url: "not a url".to_string(),
        target: SemanticTarget::default(),
    };
    let result = router.execute(&action, None).await;
    assert!(!result.success);
    assert_eq!(result.error_code, Some(ErrorCode::InvalidUrl));
    assert!(browser.calls().is_empty());
}

#[tokio::test]
async fn selector_targets_route_to_the_browser() {
    let (router, browser, sidecar) = router_with(Vec::new());
    let action = AgentAction::ClickElement {
        target: SemanticTarget {
            selector: Some("#save".to_string()),
            ..SemanticTarget::default()
        },
    };
    router.execute(&action, None).await;
    assert_eq!(browser.calls().len(), 1);
    assert!(sidecar.calls().is_empty());
}

#[tokio::test]
async fn name_only_targets_route_to_the_sidecar() {
    let (router, browser, sidecar) = router_with(Vec::new());
    let action = AgentAction::ClickElement {
        target: SemanticTarget {
            name: Some("Save".to_string()),
            ..SemanticTarget::default()
        },
    };
    router.execute(&action, None).await;
    assert!(browser.calls().is_empty());
    assert_eq!(sidecar.calls().len(), 1);
}

#[tokio::test]
async fn opening_a_browser_app_routes_to_the_browser() {
    let (router, browser, sidecar) = router_with(Vec::new());
    let action = AgentAction::OpenApp {
        app: "Google Chrome".to_string(),
        target: SemanticTarget {
            app: Some("Google Chrome".to_string()),
            ..SemanticTarget::default()
        },
    };
    router.execute(&action, None).await;
    assert_eq!(browser.calls().len(), 1);

    let action = AgentAction::OpenApp {
        app: "notepad".to_string(),
        target: SemanticTarget {
            app: Some("notepad".to_string()),
            ..SemanticTarget::default()
        },
    };
    router.execute(&action, None).await;
    assert_eq!(sidecar.calls().len(), 1);
}

#[tokio::test]
async fn intent_hints_fill_target_holes_before_dispatch() {
    let (router, _, sidecar) = router_with(Vec::new());
    let intent = intent_with_targets(IntentTargets {
        element: Some("Send".to_string()),
        app: Some("mailer".to_string()),
        ..IntentTargets::default()
    });
    let action = AgentAction::ClickElement {
        target: SemanticTarget::default(),
    };
    router.execute(&action, Some(&intent)).await;
    let dispatched = &sidecar.calls()[0];
    let target = dispatched.target().unwrap();
    assert_eq!(target.name.as_deref(), Some("Send"));
    assert_eq!(target.app.as_deref(), Some("mailer"));
}

#[test]
fn action_level_target_fields_win_over_intent_hints() {
    let intent = intent_with_targets(IntentTargets {
        element: Some("Other".to_string()),
        text: Some("intent text".to_string()),
        ..IntentTargets::default()
    });
    let action = AgentAction::TypeIntoElement {
        text: "typed text".to_string(),
        target: SemanticTarget {
            name: Some("Field".to_string()),
            ..SemanticTarget::default()
        },
    };
    let merged = merge_target(&action, Some(&intent));
    assert_eq!(merged.name.as_deref(), Some("Field"));
    assert_eq!(merged.text.as_deref(), Some("typed text"));
}
