//! # Deskhand Config
//!
//! Immutable configuration assembled once at startup from `AGENT_*`
//! environment variables and injected into each component constructor.

use std::path::PathBuf;

use serde::Serialize;

mod env;

pub use env::EnvSource;

/// Which user-data profile the managed browser session runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileMode {
    /// Dedicated, agent-owned profile directory.
    Managed,
    /// The user's installed browser profile.
    System,
}

/// Browser session / remote-debugging settings.
#[derive(Debug, Clone, Serialize)]
pub struct BrowserConfig {
    pub debug_port: u16,
    pub profile_mode: ProfileMode,
    pub profile_dir: PathBuf,
    /// System profile name, or the last-used profile when configured `auto`.
    pub system_profile: String,
    pub system_user_data_dir: Option<PathBuf>,
    pub blocklist: Vec<String>,
}

impl BrowserConfig {
    /// HTTP debug endpoint base, e.g. `http://127.0.0.1:9222`.
    pub fn endpoint(&self) -> String {
        format!("http://127.0.0.1:{}", self.debug_port)
    }
}

/// Accessibility sidecar settings.
#[derive(Debug, Clone, Serialize)]
pub struct SidecarConfig {
    pub port: u16,
    pub executable: PathBuf,
    /// Platform/deployment gate; defaults to enabled only on Windows where
    /// the accessibility service runs.
    pub supported: bool,
}

impl SidecarConfig {
    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }
}

/// Planner provider (vision/intent model) settings.
#[derive(Debug, Clone, Serialize)]
pub struct PlannerConfig {
    #[serde(skip_serializing)]
    pub api_key: String,
    pub base_url: String,
    pub planner_model: String,
    pub intent_model: String,
}

/// Top-level agent configuration.
#[derive(Debug, Clone, Serialize)]
pub struct AgentConfig {
    pub browser: BrowserConfig,
    pub sidecar: SidecarConfig,
    pub planner: PlannerConfig,
    pub semantic_enabled: bool,
    /// Extra attempts after the first semantic failure.
    pub semantic_retry_count: u32,
    pub intent_min_confidence: f64,
    pub max_steps: u32,
    /// Per-run model token accounting emitted as structured log lines.
    pub token_meter_enabled: bool,
}

impl AgentConfig {
    /// Assemble from process environment variables.
    pub fn from_env() -> Self {
        Self::from_source(&EnvSource::process())
    }

    /// Assemble from an explicit variable source (tests inject a map here).
    pub fn from_source(source: &EnvSource) -> Self {
        let profile_mode = match source.get("AGENT_BROWSER_PROFILE_MODE").as_deref() {
            Some("managed") => ProfileMode::Managed,
            _ => ProfileMode::System,
        };

        let browser = BrowserConfig {
            debug_port: source.port("AGENT_BROWSER_DEBUG_PORT", 9222),
            profile_mode,
            profile_dir: source
                .path("AGENT_BROWSER_PROFILE_DIR")
                .unwrap_or_else(|| PathBuf::from("./.deskhand/browser-profile")),
            system_profile: source
                .get("AGENT_BROWSER_SYSTEM_PROFILE")
                .unwrap_or_else(|| "auto".to_string()),
            system_user_data_dir: source.path("AGENT_BROWSER_USER_DATA_DIR"),
            blocklist: parse_blocklist(source.get("AGENT_BROWSER_BLOCKLIST").as_deref()),
        };

        let sidecar = SidecarConfig {
            port: source.port("AGENT_SIDECAR_PORT", 8765),
            executable: source
                .path("AGENT_SIDECAR_EXE")
                .unwrap_or_else(|| PathBuf::from("sidecar/accessibility-service")),
            supported: source
                .flag("AGENT_SIDECAR_SUPPORTED", cfg!(target_os = "windows")),
        };

        let planner = PlannerConfig {
            api_key: source.get("AGENT_PLANNER_API_KEY").unwrap_or_default(),
            base_url: source
                .get("AGENT_PLANNER_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            planner_model: source
                .get("AGENT_PLANNER_MODEL")
                .unwrap_or_else(|| "gpt-4o".to_string()),
            intent_model: source
                .get("AGENT_INTENT_MODEL")
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
        };

        Self {
            browser,
            sidecar,
            planner,
            semantic_enabled: source.flag("AGENT_SEMANTIC_AUTOMATION_ENABLED", true),
            semantic_retry_count: source.number("AGENT_SEMANTIC_RETRY_COUNT", 1.0).max(0.0)
                as u32,
            intent_min_confidence: source
                .number("AGENT_INTENT_MIN_CONFIDENCE", 0.65)
                .clamp(0.0, 1.0),
            max_steps: source.number("AGENT_MAX_STEPS", 50.0).max(1.0) as u32,
            token_meter_enabled: source.flag("AGENT_TOKEN_METER_ENABLED", true),
        }
    }
}

/// Split a comma-separated blocklist into lowercase trimmed rules.
pub fn parse_blocklist(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(|item| item.trim().to_lowercase())
        .filter(|item| !item.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(pairs: &[(&str, &str)]) -> EnvSource {
        EnvSource::from_pairs(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())))
    }

    #[test]
    fn defaults_without_environment() {
        let config = AgentConfig::from_source(&source(&[]));
        assert_eq!(config.browser.debug_port, 9222);
        assert_eq!(config.browser.profile_mode, ProfileMode::System);
        assert_eq!(config.sidecar.port, 8765);
        assert_eq!(config.semantic_retry_count, 1);
        assert_eq!(config.max_steps, 50);
        assert!((config.intent_min_confidence - 0.65).abs() < f64::EPSILON);
        assert!(config.browser.blocklist.is_empty());
        assert!(config.token_meter_enabled);
    }

    #[test]
    fn environment_overrides() {
        let config = AgentConfig::from_source(&source(&[
            ("AGENT_BROWSER_DEBUG_PORT", "9333"),
            ("AGENT_BROWSER_PROFILE_MODE", "managed"),
            ("AGENT_BROWSER_BLOCKLIST", "Example.com, *.internal.net ,"),
            ("AGENT_SEMANTIC_AUTOMATION_ENABLED", "off"),
            ("AGENT_SEMANTIC_RETRY_COUNT", "3"),
            ("AGENT_MAX_STEPS", "7"),
            ("AGENT_TOKEN_METER_ENABLED", "0"),
        ]));
        assert_eq!(config.browser.debug_port, 9333);
        assert_eq!(config.browser.profile_mode, ProfileMode::Managed);
        assert_eq!(
            config.browser.blocklist,
            vec!["example.com".to_string(), "*.internal.net".to_string()]
        );
        assert!(!config.semantic_enabled);
        assert_eq!(config.semantic_retry_count, 3);
        assert_eq!(config.max_steps, 7);
        assert!(!config.token_meter_enabled);
    }

    #[test]
    fn invalid_numbers_fall_back_to_defaults() {
        let config = AgentConfig::from_source(&source(&[
            ("AGENT_BROWSER_DEBUG_PORT", "not-a-port"),
            ("AGENT_INTENT_MIN_CONFIDENCE", "nan"),
            ("AGENT_MAX_STEPS", "0"),
        ]));
        assert_eq!(config.browser.debug_port, 9222);
        assert!((config.intent_min_confidence - 0.65).abs() < f64::EPSILON);
        assert_eq!(config.max_steps, 1);
    }

    #[test]
    fn endpoint_and_base_url_formatting() {
        let config = AgentConfig::from_source(&source(&[]));
        assert_eq!(config.browser.endpoint(), "http://127.0.0.1:9222");
        assert_eq!(config.sidecar.base_url(), "http://127.0.0.1:8765");
    }
}
