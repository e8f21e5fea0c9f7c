//! Domain blocklist evaluation for browser navigation targets.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use deskhand_protocols::ErrorCode;

static BARE_DOMAIN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^[a-z0-9.-]+\.[a-z]{2,}").unwrap());

/// Outcome of checking a navigation URL against the domain blocklist.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainDecision {
    pub allowed: bool,
    pub normalized_url: Option<String>,
    pub domain: Option<String>,
    pub reason: Option<String>,
    pub error_code: Option<ErrorCode>,
    pub matched_rule: Option<String>,
}

impl DomainDecision {
    fn denied(reason: impl Into<String>, code: ErrorCode) -> Self {
        Self {
            allowed: false,
            normalized_url: None,
            domain: None,
            reason: Some(reason.into()),
            error_code: Some(code),
            matched_rule: None,
        }
    }
}

/// Prefix bare domains with `https://`; reject anything that is neither an
/// http(s) URL nor a plausible domain.
fn normalize_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lower = trimmed.to_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return Some(trimmed.to_string());
    }
    if BARE_DOMAIN.is_match(trimmed) {
        return Some(format!("https://{trimmed}"));
    }
    None
}

/// A rule matches the host itself and every subdomain. `*.` prefixes are
/// accepted for compatibility but behave the same as the bare rule.
fn host_matches_rule(hostname: &str, rule: &str) -> bool {
    let rule = rule.strip_prefix("*.").unwrap_or(rule);
    hostname == rule || hostname.ends_with(&format!(".{rule}"))
}

/// Evaluate a navigation target against a lowercase blocklist.
pub fn evaluate_browser_target(raw_url: &str, blocklist: &[String]) -> DomainDecision {
    let Some(normalized) = normalize_url(raw_url) else {
        return DomainDecision::denied(
            "URL is invalid or missing protocol/domain",
            ErrorCode::InvalidUrl,
        );
    };

    let Ok(url) = Url::parse(&normalized) else {
        return DomainDecision::denied("URL cannot be parsed", ErrorCode::InvalidUrl);
    };
    let Some(hostname) = url.host_str().map(str::to_lowercase) else {
        return DomainDecision::denied("URL has no host", ErrorCode::InvalidUrl);
    };

    for rule in blocklist {
        if host_matches_rule(&hostname, rule) {
            return DomainDecision {
                allowed: false,
                normalized_url: Some(url.to_string()),
                domain: Some(hostname),
                reason: Some(format!("Domain blocked by policy: {rule}")),
                error_code: Some(ErrorCode::BlockedDomain),
                matched_rule: Some(rule.clone()),
            };
        }
    }

    DomainDecision {
        allowed: true,
        normalized_url: Some(url.to_string()),
        domain: Some(hostname),
        reason: None,
        error_code: None,
        matched_rule: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn bare_domain_gets_https_prefix() {
        let decision = evaluate_browser_target("example.com/path", &[]);
        assert!(decision.allowed);
        assert_eq!(decision.normalized_url.as_deref(), Some("https://example.com/path"));
        assert_eq!(decision.domain.as_deref(), Some("example.com"));
    }

    #[test]
    fn garbage_url_is_invalid() {
        let decision = evaluate_browser_target("not a url", &[]);
        assert!(!decision.allowed);
        assert_eq!(decision.error_code, Some(ErrorCode::InvalidUrl));
    }

    #[test]
    fn empty_url_is_invalid() {
        let decision = evaluate_browser_target("   ", &[]);
        assert!(!decision.allowed);
        assert_eq!(decision.error_code, Some(ErrorCode::InvalidUrl));
    }

    #[test]
    fn blocklist_matches_exact_host_and_subdomains() {
        let blocklist = rules(&["example.com"]);
        assert!(!evaluate_browser_target("https://example.com", &blocklist).allowed);
        assert!(!evaluate_browser_target("https://mail.example.com", &blocklist).allowed);
        assert!(evaluate_browser_target("https://example.org", &blocklist).allowed);
        // Suffix match requires a dot boundary.
        assert!(evaluate_browser_target("https://notexample.com", &blocklist).allowed);
    }

    #[test]
    fn wildcard_rules_behave_like_bare_rules() {
        let blocklist = rules(&["*.internal.net"]);
        assert!(!evaluate_browser_target("https://internal.net", &blocklist).allowed);
        assert!(!evaluate_browser_target("https://a.b.internal.net", &blocklist).allowed);
        assert!(evaluate_browser_target("https://internal.network", &blocklist).allowed);
    }

    #[test]
    fn blocked_decision_reports_matched_rule() {
        let decision = evaluate_browser_target("https://bad.example.com", &rules(&["example.com"]));
        assert_eq!(decision.error_code, Some(ErrorCode::BlockedDomain));
        assert_eq!(decision.matched_rule.as_deref(), Some("example.com"));
        assert_eq!(decision.domain.as_deref(), Some("bad.example.com"));
    }
}
