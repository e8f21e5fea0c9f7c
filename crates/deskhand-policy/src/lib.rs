//! # Deskhand Policy
//!
//! Pure decision logic that gates every action before it reaches a surface:
//! payload normalization, domain blocklisting, and the safety layer. Nothing
//! in this crate touches the network or the OS, so every rule is unit
//! testable in isolation.

pub mod domain;
pub mod normalizer;
pub mod safety;

pub use domain::{evaluate_browser_target, DomainDecision};
pub use normalizer::{normalize_action, NormalizeError, Viewport};
pub use safety::{SafetyPolicy, SafetyVerdict};
