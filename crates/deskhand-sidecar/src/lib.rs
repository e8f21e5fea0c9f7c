//! # Deskhand Sidecar
//!
//! Client, process manager, and semantic surface for the accessibility
//! sidecar: a local HTTP service that finds and acts on desktop UI elements
//! through the platform accessibility tree.

pub mod client;
pub mod manager;
pub mod surface;

pub use client::{SidecarClient, SidecarResult};
pub use manager::SidecarManager;
pub use surface::SidecarSurface;
