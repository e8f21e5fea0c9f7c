//! DevTools protocol message types and the HTTP discovery payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outgoing protocol command.
#[derive(Debug, Clone, Serialize)]
pub struct CdpRequest {
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CdpErrorPayload {
    pub code: i64,
    pub message: String,
}

/// Incoming message: either a command response (has `id`) or an event
/// notification (has `method`).
#[derive(Debug, Clone, Deserialize)]
pub struct CdpResponse {
    pub id: Option<u64>,
    pub result: Option<Value>,
    pub error: Option<CdpErrorPayload>,
    pub method: Option<String>,
}

/// One entry from `GET /json/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabInfo {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub web_socket_debugger_url: Option<String>,
}

impl TabInfo {
    pub fn is_page(&self) -> bool {
        self.kind == "page"
    }
}

/// Payload of `GET /json/version`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    #[serde(default)]
    pub browser: Option<String>,
    #[serde(default)]
    pub web_socket_debugger_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_omits_missing_params() {
        let request = CdpRequest {
            id: 7,
            method: "Page.enable".to_string(),
            params: None,
        };
        let wire = serde_json::to_value(&request).unwrap();
        assert_eq!(wire, json!({ "id": 7, "method": "Page.enable" }));
    }

    #[test]
    fn response_distinguishes_replies_from_events() {
        let reply: CdpResponse =
            serde_json::from_str(r#"{"id":3,"result":{"frameId":"f"}}"#).unwrap();
        assert_eq!(reply.id, Some(3));
        assert!(reply.method.is_none());

        let event: CdpResponse =
            serde_json::from_str(r#"{"method":"Page.loadEventFired","params":{}}"#).unwrap();
        assert!(event.id.is_none());
        assert_eq!(event.method.as_deref(), Some("Page.loadEventFired"));
    }

    #[test]
    fn tab_info_parses_discovery_entry() {
        let tab: TabInfo = serde_json::from_value(json!({
            "id": "A1",
            "title": "Inbox",
            "url": "https://mail.example.com",
            "type": "page",
            "webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/page/A1"
        }))
        .unwrap();
        assert!(tab.is_page());
        assert!(tab.web_socket_debugger_url.is_some());
    }
}
