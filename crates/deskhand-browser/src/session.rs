//! Browser session lifecycle: attach to an already-debuggable browser or
//! launch one, then discover and manage tabs over the HTTP endpoint.

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use reqwest::StatusCode;
use tracing::{debug, info, warn};

use deskhand_config::{BrowserConfig, ProfileMode};

use crate::error::BrowserError;
use crate::protocol::{TabInfo, VersionInfo};

const STARTUP_TIMEOUT: Duration = Duration::from_secs(12);
const STARTUP_POLL_INTERVAL: Duration = Duration::from_millis(250);
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(3);
const UNAVAILABLE_COOLDOWN: Duration = Duration::from_secs(15);

#[derive(Default)]
struct CooldownState {
    until: Option<Instant>,
    reason: String,
}

/// Manages one debuggable browser process and its discovery endpoint.
///
/// The browser is only killed on shutdown when this manager started it; an
/// already-running debuggable browser is left alone.
pub struct BrowserSessionManager {
    config: BrowserConfig,
    endpoint: String,
    http: reqwest::Client,
    process: Mutex<Option<Child>>,
    started_by_agent: AtomicBool,
    cooldown: Mutex<CooldownState>,
}

impl BrowserSessionManager {
    pub fn new(config: BrowserConfig) -> Self {
        let endpoint = config.endpoint();
        Self::with_endpoint(config, endpoint)
    }

    /// Construct against an explicit discovery endpoint (tests point this at
    /// a mock server).
    pub fn with_endpoint(config: BrowserConfig, endpoint: String) -> Self {
        Self {
            config,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            process: Mutex::new(None),
            started_by_agent: AtomicBool::new(false),
            cooldown: Mutex::new(CooldownState::default()),
        }
    }

    pub fn config(&self) -> &BrowserConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Availability cooldown
    // ------------------------------------------------------------------

    /// After a connection-level failure the endpoint is considered down for
    /// a cooldown window so each step does not re-pay the probe timeout.
    pub fn mark_unavailable(&self, reason: &str) {
        let mut state = self.cooldown.lock();
        state.until = Some(Instant::now() + UNAVAILABLE_COOLDOWN);
        state.reason = reason.to_string();
        warn!(reason, "browser endpoint marked unavailable");
    }

    pub fn clear_unavailable(&self) {
        let mut state = self.cooldown.lock();
        state.until = None;
        state.reason.clear();
    }

    /// The standing failure if the cooldown window is still open.
    pub fn availability_error(&self) -> Option<BrowserError> {
        let state = self.cooldown.lock();
        let until = state.until?;
        if Instant::now() >= until {
            return None;
        }
        let detail = if state.reason.is_empty() {
            "runtime is temporarily unavailable".to_string()
        } else {
            state.reason.clone()
        };
        Some(BrowserError::Unavailable(format!(
            "in cooldown ({detail})"
        )))
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    /// Make sure a debuggable browser is reachable, launching one if needed.
    pub async fn ensure_session(&self) -> Result<(), BrowserError> {
        if let Some(version) = self.version_info().await {
            if version.web_socket_debugger_url.is_some() {
                return Ok(());
            }
        }

        match self.config.profile_mode {
            ProfileMode::Managed => self.launch_managed()?,
            ProfileMode::System => self.launch_system()?,
        }

        match self.wait_for_debugger().await {
            Ok(()) => Ok(()),
            Err(_) if self.config.profile_mode == ProfileMode::System => {
                Err(BrowserError::Unavailable(
                    "could not attach in system-profile mode; close all browser windows and \
                     retry, or switch to a managed profile"
                        .to_string(),
                ))
            }
            Err(e) => Err(e),
        }
    }

    async fn version_info(&self) -> Option<VersionInfo> {
        let url = format!("{}/json/version", self.endpoint);
        let response = self
            .http
            .get(&url)
            .timeout(Duration::from_millis(1500))
            .send()
            .await
            .ok()?;
        response.json::<VersionInfo>().await.ok()
    }

    async fn wait_for_debugger(&self) -> Result<(), BrowserError> {
        let deadline = Instant::now() + STARTUP_TIMEOUT;
        while Instant::now() < deadline {
            if let Some(version) = self.version_info().await {
                if version.web_socket_debugger_url.is_some() {
                    if let Some(browser) = version.browser {
                        debug!(browser, "debugging endpoint ready");
                    }
                    return Ok(());
                }
            }
            tokio::time::sleep(STARTUP_POLL_INTERVAL).await;
        }
        Err(BrowserError::Unavailable(
            "remote debugging endpoint did not become ready in time".to_string(),
        ))
    }

    fn launch_managed(&self) -> Result<(), BrowserError> {
        let executable = find_browser_executable()
            .ok_or_else(|| BrowserError::LaunchFailed("browser executable not found".to_string()))?;
        std::fs::create_dir_all(&self.config.profile_dir)
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        let child = Command::new(&executable)
            .arg(format!("--remote-debugging-port={}", self.config.debug_port))
            .arg(format!("--user-data-dir={}", self.config.profile_dir.display()))
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-networking")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        info!(executable = %executable.display(), "launched managed browser");
        *self.process.lock() = Some(child);
        self.started_by_agent.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn launch_system(&self) -> Result<(), BrowserError> {
        let executable = find_browser_executable()
            .ok_or_else(|| BrowserError::LaunchFailed("browser executable not found".to_string()))?;
        let user_data_dir = self.system_user_data_dir();
        let profile = self.system_profile_name();

        let child = Command::new(&executable)
            .arg(format!("--remote-debugging-port={}", self.config.debug_port))
            .arg(format!("--user-data-dir={}", user_data_dir.display()))
            .arg(format!("--profile-directory={profile}"))
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        info!(profile, "launched system-profile browser");
        *self.process.lock() = Some(child);
        self.started_by_agent.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Open a URL in a plain (non-debug) browser window. Last-resort path
    /// when the protocol endpoint cannot be reached.
    pub fn open_url_in_shell(&self, url: &str) -> bool {
        let Some(executable) = find_browser_executable() else {
            return false;
        };
        let user_data_dir = self.system_user_data_dir();
        let profile = self.system_profile_name();
        Command::new(&executable)
            .arg(format!("--user-data-dir={}", user_data_dir.display()))
            .arg(format!("--profile-directory={profile}"))
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .is_ok()
    }

    /// Kill the browser only when this manager launched it.
    pub fn shutdown(&self) {
        if self.started_by_agent.swap(false, Ordering::SeqCst) {
            if let Some(mut child) = self.process.lock().take() {
                let _ = child.kill();
            }
        } else {
            *self.process.lock() = None;
        }
    }

    // ------------------------------------------------------------------
    // Profiles
    // ------------------------------------------------------------------

    fn system_user_data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.config.system_user_data_dir {
            return dir.clone();
        }
        default_system_user_data_dir()
    }

    fn system_profile_name(&self) -> String {
        let configured = self.config.system_profile.trim();
        if configured.is_empty() || configured.eq_ignore_ascii_case("auto") {
            return detect_last_used_profile(&self.system_user_data_dir());
        }
        configured.to_string()
    }

    // ------------------------------------------------------------------
    // Tab discovery
    // ------------------------------------------------------------------

    pub async fn list_tabs(&self) -> Result<Vec<TabInfo>, BrowserError> {
        let url = format!("{}/json/list", self.endpoint);
        let tabs = self
            .http
            .get(&url)
            .timeout(DISCOVERY_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<TabInfo>>()
            .await?;
        Ok(tabs)
    }

    /// First page-type tab, which the discovery endpoint orders most
    /// recently focused first.
    pub async fn active_tab(&self) -> Result<Option<TabInfo>, BrowserError> {
        let tabs = self.list_tabs().await?;
        Ok(tabs.into_iter().find(TabInfo::is_page))
    }

    /// Open a new tab. Newer browsers require `PUT /json/new`; older ones
    /// only accept `GET`, so fall back when PUT is rejected.
    pub async fn open_tab(&self, url: &str) -> Result<TabInfo, BrowserError> {
        let encoded: String = url::form_urlencoded::byte_serialize(url.as_bytes()).collect();
        let endpoint = format!("{}/json/new?{encoded}", self.endpoint);

        let response = self
            .http
            .put(&endpoint)
            .timeout(Duration::from_secs(5))
            .send()
            .await?;
        let response = if response.status() == StatusCode::METHOD_NOT_ALLOWED {
            self.http
                .get(&endpoint)
                .timeout(Duration::from_secs(5))
                .send()
                .await?
        } else {
            response
        };
        Ok(response.error_for_status()?.json::<TabInfo>().await?)
    }

    /// Bring a tab to front. Best-effort at call sites.
    pub async fn activate_tab(&self, tab_id: &str) -> Result<(), BrowserError> {
        let url = format!("{}/json/activate/{tab_id}", self.endpoint);
        self.http
            .get(&url)
            .timeout(DISCOVERY_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

impl Drop for BrowserSessionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn default_system_user_data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        dirs::data_local_dir()
            .unwrap_or_default()
            .join("Google")
            .join("Chrome")
            .join("User Data")
    }
    #[cfg(target_os = "macos")]
    {
        dirs::config_dir()
            .unwrap_or_default()
            .join("Google")
            .join("Chrome")
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        dirs::config_dir().unwrap_or_default().join("google-chrome")
    }
}

/// Last profile the user had open, read from the browser's Local State
/// file. Falls back to `Default` when the file is missing or malformed.
fn detect_last_used_profile(user_data_dir: &std::path::Path) -> String {
    let local_state = user_data_dir.join("Local State");
    let Ok(raw) = std::fs::read_to_string(&local_state) else {
        return "Default".to_string();
    };
    let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&raw) else {
        return "Default".to_string();
    };
    parsed
        .pointer("/profile/last_used")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "Default".to_string())
}

fn find_browser_executable() -> Option<PathBuf> {
    for candidate in browser_candidates() {
        if candidate.exists() {
            return Some(candidate);
        }
    }
    None
}

#[cfg(target_os = "windows")]
fn browser_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(local) = dirs::data_local_dir() {
        candidates.push(local.join("Google\\Chrome\\Application\\chrome.exe"));
    }
    candidates.push(PathBuf::from(
        "C:\\Program Files\\Google\\Chrome\\Application\\chrome.exe",
    ));
    candidates.push(PathBuf::from(
        "C:\\Program Files (x86)\\Google\\Chrome\\Application\\chrome.exe",
    ));
    candidates
}

#[cfg(target_os = "macos")]
fn browser_candidates() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"),
        PathBuf::from("/Applications/Chromium.app/Contents/MacOS/Chromium"),
    ]
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn browser_candidates() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/usr/bin/google-chrome"),
        PathBuf::from("/usr/bin/google-chrome-stable"),
        PathBuf::from("/usr/bin/chromium"),
        PathBuf::from("/usr/bin/chromium-browser"),
        PathBuf::from("/snap/bin/chromium"),
    ]
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
