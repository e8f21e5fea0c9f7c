//! # Deskhand Browser
//!
//! Browser automation surface over the Chrome DevTools Protocol: session
//! lifecycle (attach or launch), per-tab WebSocket clients, DOM element
//! resolution, and the semantic-action adapter the agent dispatches to.

pub mod adapter;
pub mod client;
pub mod dom;
pub mod error;
pub mod protocol;
pub mod session;

pub use adapter::BrowserSurface;
pub use client::CdpClient;
pub use error::BrowserError;
pub use session::BrowserSessionManager;
