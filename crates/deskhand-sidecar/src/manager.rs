//! Sidecar process lifecycle.
//!
//! Start is single-flight: concurrent callers share one startup attempt
//! instead of racing to spawn duplicate processes.

use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use deskhand_config::SidecarConfig;

use crate::client::SidecarClient;

const STARTUP_TIMEOUT: Duration = Duration::from_secs(15);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_millis(300);

pub struct SidecarManager {
    config: SidecarConfig,
    client: SidecarClient,
    process: Mutex<Option<Child>>,
    start_lock: tokio::sync::Mutex<()>,
}

impl SidecarManager {
    pub fn new(config: SidecarConfig) -> Self {
        let base_url = config.base_url();
        Self::with_base_url(config, base_url)
    }

    /// Construct against an explicit service URL (tests point this at a
    /// mock server).
    pub fn with_base_url(config: SidecarConfig, base_url: String) -> Self {
        Self {
            config,
            client: SidecarClient::new(base_url),
            process: Mutex::new(None),
            start_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn client(&self) -> &SidecarClient {
        &self.client
    }

    pub async fn is_healthy(&self) -> bool {
        self.client.health().await
    }

    /// Make sure the sidecar answers health checks, launching it if needed.
    /// Returns `false` when the platform does not support it or startup
    /// failed; callers then fall back to other surfaces.
    pub async fn ensure_started(&self) -> bool {
        if !self.config.supported {
            return false;
        }
        if self.is_healthy().await {
            return true;
        }

        let _guard = self.start_lock.lock().await;
        // Another caller may have finished startup while we waited.
        if self.is_healthy().await {
            return true;
        }
        self.start().await
    }

    async fn start(&self) -> bool {
        let executable = &self.config.executable;
        if !executable.exists() {
            warn!(executable = %executable.display(), "sidecar executable not found");
            return false;
        }

        let spawned = Command::new(executable)
            .arg("--port")
            .arg(self.config.port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        match spawned {
            Ok(child) => {
                info!(port = self.config.port, "sidecar process launched");
                *self.process.lock() = Some(child);
            }
            Err(e) => {
                warn!("failed to spawn sidecar: {e}");
                return false;
            }
        }

        let deadline = Instant::now() + STARTUP_TIMEOUT;
        while Instant::now() < deadline {
            if self.is_healthy().await {
                debug!("sidecar became healthy");
                return true;
            }
            tokio::time::sleep(HEALTH_POLL_INTERVAL).await;
        }

        warn!("sidecar did not become healthy in time");
        self.stop();
        false
    }

    /// Kill the managed process. Safe to call repeatedly.
    pub fn stop(&self) {
        if let Some(mut child) = self.process.lock().take() {
            let _ = child.kill();
        }
    }
}

impl Drop for SidecarManager {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(supported: bool) -> SidecarConfig {
        SidecarConfig {
            port: 8765,
            executable: PathBuf::from("/nonexistent/sidecar"),
            supported,
        }
    }

    #[tokio::test]
    async fn unsupported_platform_short_circuits() {
        let manager = SidecarManager::with_base_url(config(false), "http://127.0.0.1:1".into());
        assert!(!manager.ensure_started().await);
    }

    #[tokio::test]
    async fn healthy_service_needs_no_launch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .mount(&server)
            .await;

        let manager = SidecarManager::with_base_url(config(true), server.uri());
        assert!(manager.ensure_started().await);
    }

    #[tokio::test]
    async fn missing_executable_fails_startup() {
        let manager = SidecarManager::with_base_url(config(true), "http://127.0.0.1:1".into());
        assert!(!manager.ensure_started().await);
    }

    #[test]
    fn stop_is_idempotent() {
        let manager = SidecarManager::with_base_url(config(true), "http://127.0.0.1:1".into());
        manager.stop();
        manager.stop();
    }
}
