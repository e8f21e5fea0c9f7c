//! Per-tab DevTools WebSocket client.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};

use crate::error::BrowserError;
use crate::protocol::{CdpRequest, CdpResponse};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const CALL_TIMEOUT: Duration = Duration::from_secs(10);

struct PendingRequest {
    tx: oneshot::Sender<Result<Value, BrowserError>>,
}

/// Short-lived client attached to one tab's debugger WebSocket.
///
/// Commands are correlated to responses through the shared pending map; the
/// background receive task resolves them as replies arrive.
pub struct CdpClient {
    ws_tx: Arc<tokio::sync::Mutex<WsSink>>,
    request_id: AtomicU64,
    pending: Arc<Mutex<HashMap<u64, PendingRequest>>>,
    _recv_task: tokio::task::JoinHandle<()>,
}

impl CdpClient {
    /// Connect to a tab's `webSocketDebuggerUrl`.
    pub async fn connect(ws_url: &str) -> Result<Self, BrowserError> {
        let connect = tokio_tungstenite::connect_async(ws_url);
        let (ws_stream, _) = tokio::time::timeout(CONNECT_TIMEOUT, connect)
            .await
            .map_err(|_| BrowserError::Timeout("debugger connection".to_string()))?
            .map_err(|e| BrowserError::ConnectionFailed(e.to_string()))?;

        let (ws_sink, ws_source) = ws_stream.split();
        let pending: Arc<Mutex<HashMap<u64, PendingRequest>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let recv_task = {
            let pending = pending.clone();
            tokio::spawn(async move {
                Self::receive_loop(ws_source, pending).await;
            })
        };

        debug!("attached to tab debugger at {ws_url}");

        Ok(Self {
            ws_tx: Arc::new(tokio::sync::Mutex::new(ws_sink)),
            request_id: AtomicU64::new(1),
            pending,
            _recv_task: recv_task,
        })
    }

    async fn receive_loop(mut ws_source: WsSource, pending: Arc<Mutex<HashMap<u64, PendingRequest>>>) {
        while let Some(msg) = ws_source.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    trace!("cdp recv: {text}");
                    let Ok(response) = serde_json::from_str::<CdpResponse>(&text) else {
                        warn!("unparseable protocol message");
                        continue;
                    };
                    let Some(id) = response.id else {
                        // Event notification; this client does not subscribe.
                        continue;
                    };
                    if let Some(request) = pending.lock().remove(&id) {
                        let result = match response.error {
                            Some(error) => Err(BrowserError::Protocol {
                                code: error.code,
                                message: error.message,
                            }),
                            None => Ok(response.result.unwrap_or(Value::Null)),
                        };
                        let _ = request.tx.send(result);
                    }
                }
                Ok(Message::Close(_)) => {
                    debug!("tab debugger socket closed");
                    break;
                }
                Err(e) => {
                    warn!("tab debugger socket error: {e}");
                    break;
                }
                _ => {}
            }
        }
        // Fail anything still waiting so callers see a closed session
        // instead of a timeout.
        let mut map = pending.lock();
        for (_, request) in map.drain() {
            let _ = request.tx.send(Err(BrowserError::SessionClosed));
        }
    }

    /// Send a command and wait for its response.
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, BrowserError> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = CdpRequest {
            id,
            method: method.to_string(),
            params,
        };
        let json = serde_json::to_string(&request)?;
        trace!("cdp send: {json}");

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, PendingRequest { tx });

        {
            let mut ws = self.ws_tx.lock().await;
            ws.send(Message::Text(json.into())).await?;
        }

        match tokio::time::timeout(CALL_TIMEOUT, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(BrowserError::SessionClosed),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(BrowserError::Timeout(method.to_string()))
            }
        }
    }

    /// Enable the domains element actions rely on.
    pub async fn enable_domains(&self) -> Result<(), BrowserError> {
        self.call("Page.enable", None).await?;
        self.call("Runtime.enable", None).await?;
        Ok(())
    }

    /// Evaluate a JS expression in the page, returning the value by copy.
    pub async fn evaluate(&self, expression: &str) -> Result<Value, BrowserError> {
        let result = self
            .call(
                "Runtime.evaluate",
                Some(json!({ "expression": expression, "returnByValue": true })),
            )
            .await?;
        Ok(result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Synthesize a left click at page coordinates.
    pub async fn click_at(&self, x: i64, y: i64) -> Result<(), BrowserError> {
        for (kind, clicks) in [("mouseMoved", 0), ("mousePressed", 1), ("mouseReleased", 1)] {
            self.call(
                "Input.dispatchMouseEvent",
                Some(json!({
                    "type": kind,
                    "x": x,
                    "y": y,
                    "button": "left",
                    "clickCount": clicks
                })),
            )
            .await?;
        }
        Ok(())
    }

    /// Insert text into the focused element.
    pub async fn insert_text(&self, text: &str) -> Result<(), BrowserError> {
        self.call("Input.insertText", Some(json!({ "text": text })))
            .await?;
        Ok(())
    }

    /// Navigate the tab.
    pub async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        self.call("Page.navigate", Some(json!({ "url": url }))).await?;
        Ok(())
    }
}

impl Drop for CdpClient {
    fn drop(&mut self) {
        self._recv_task.abort();
    }
}
