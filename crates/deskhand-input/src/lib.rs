//! # Deskhand Input
//!
//! Raw OS input surface: coordinate-level mouse/keyboard execution and
//! primary-screen capture for the vision planner.

pub mod capture;
pub mod executor;
pub mod input;

pub use capture::PrimaryScreenCapture;
pub use executor::CoordinateActionExecutor;
pub use input::{InputController, InputError};
