use std::collections::HashMap;
use std::path::PathBuf;

/// Environment variable source. Production reads the process environment;
/// tests inject a fixed map so cases never race on shared globals.
#[derive(Debug, Clone)]
pub enum EnvSource {
    Process,
    Fixed(HashMap<String, String>),
}

impl EnvSource {
    pub fn process() -> Self {
        Self::Process
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        Self::Fixed(pairs.into_iter().collect())
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let value = match self {
            Self::Process => std::env::var(key).ok(),
            Self::Fixed(map) => map.get(key).cloned(),
        };
        value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    pub fn path(&self, key: &str) -> Option<PathBuf> {
        self.get(key).map(PathBuf::from)
    }

    /// Boolean flag: `1`, `true`, `yes`, `on` enable; `0`, `false`, `no`,
    /// `off` disable; anything else keeps the default.
    pub fn flag(&self, key: &str, default: bool) -> bool {
        match self.get(key).map(|v| v.to_lowercase()) {
            Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
            Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
            _ => default,
        }
    }

    /// Finite numeric value, or the default when unset or unparseable.
    pub fn number(&self, key: &str, default: f64) -> f64 {
        self.get(key)
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .unwrap_or(default)
    }

    pub fn port(&self, key: &str, default: u16) -> u16 {
        self.get(key)
            .and_then(|v| v.parse::<u16>().ok())
            .filter(|&p| p > 0)
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_values_read_as_unset() {
        let source = EnvSource::from_pairs([("KEY".to_string(), "   ".to_string())]);
        assert_eq!(source.get("KEY"), None);
        assert!(source.flag("KEY", true));
    }

    #[test]
    fn flag_parsing() {
        let source = EnvSource::from_pairs([
            ("ON".to_string(), "Yes".to_string()),
            ("OFF".to_string(), "0".to_string()),
            ("JUNK".to_string(), "maybe".to_string()),
        ]);
        assert!(source.flag("ON", false));
        assert!(!source.flag("OFF", true));
        assert!(source.flag("JUNK", true));
        assert!(!source.flag("JUNK", false));
    }

    #[test]
    fn number_rejects_non_finite() {
        let source = EnvSource::from_pairs([("N".to_string(), "inf".to_string())]);
        assert_eq!(source.number("N", 2.5), 2.5);
    }
}
