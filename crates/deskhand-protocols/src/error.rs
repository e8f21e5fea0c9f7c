//! Error-code taxonomy shared across validation, policy, and surfaces.

use serde::{Deserialize, Serialize};

/// Machine-readable failure codes carried by execution results and
/// normalization errors.
///
/// Only `target_not_found`, `stale_element`, and `transient_surface_error`
/// are retryable; policy and validation codes surface immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Payload validation
    InvalidActionPayload,
    UnsupportedAction,
    InvalidCoordinates,
    InvalidDragPayload,
    InvalidHotkey,
    // Semantic resolution
    MissingTargetUrl,
    MissingTargetApp,
    MissingTargetText,
    TargetUnresolved,
    TargetNotFound,
    StaleElement,
    // Surfaces
    CdpUnavailable,
    CdpNoActiveTab,
    TransientSurfaceError,
    SurfaceUnavailable,
    SidecarConnectionError,
    // Policy
    BlockedTerm,
    BlockedDomain,
    InvalidUrl,
    RequiresConfirmation,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidActionPayload => "invalid_action_payload",
            ErrorCode::UnsupportedAction => "unsupported_action",
            ErrorCode::InvalidCoordinates => "invalid_coordinates",
            ErrorCode::InvalidDragPayload => "invalid_drag_payload",
            ErrorCode::InvalidHotkey => "invalid_hotkey",
            ErrorCode::MissingTargetUrl => "missing_target_url",
            ErrorCode::MissingTargetApp => "missing_target_app",
            ErrorCode::MissingTargetText => "missing_target_text",
            ErrorCode::TargetUnresolved => "target_unresolved",
            ErrorCode::TargetNotFound => "target_not_found",
            ErrorCode::StaleElement => "stale_element",
            ErrorCode::CdpUnavailable => "cdp_unavailable",
            ErrorCode::CdpNoActiveTab => "cdp_no_active_tab",
            ErrorCode::TransientSurfaceError => "transient_surface_error",
            ErrorCode::SurfaceUnavailable => "surface_unavailable",
            ErrorCode::SidecarConnectionError => "sidecar_connection_error",
            ErrorCode::BlockedTerm => "blocked_term",
            ErrorCode::BlockedDomain => "blocked_domain",
            ErrorCode::InvalidUrl => "invalid_url",
            ErrorCode::RequiresConfirmation => "requires_confirmation",
        }
    }

    /// Whether the router may retry an execution that failed with this code.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorCode::TargetNotFound | ErrorCode::StaleElement | ErrorCode::TransientSurfaceError
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
