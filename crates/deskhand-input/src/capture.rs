//! Primary-screen capture for the vision planner.

use std::io::Cursor;

use async_trait::async_trait;
use base64::Engine;
use screenshots::image::ImageOutputFormat;
use screenshots::Screen;
use thiserror::Error;

use deskhand_protocols::{ScreenCapture, ScreenFrame};

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Capture failed: {0}")]
    CaptureFailed(String),

    #[error("Encoding failed: {0}")]
    EncodingFailed(String),

    #[error("No monitor found")]
    NoMonitor,
}

/// Captures the primary monitor as a base64 PNG frame.
pub struct PrimaryScreenCapture;

impl PrimaryScreenCapture {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PrimaryScreenCapture {
    fn default() -> Self {
        Self::new()
    }
}

fn capture_primary() -> Result<ScreenFrame, CaptureError> {
    let screens = Screen::all().map_err(|e| CaptureError::CaptureFailed(e.to_string()))?;
    let screen = screens
        .into_iter()
        .find(|s| s.display_info.is_primary)
        .or_else(|| Screen::all().ok()?.into_iter().next())
        .ok_or(CaptureError::NoMonitor)?;

    let image = screen
        .capture()
        .map_err(|e| CaptureError::CaptureFailed(e.to_string()))?;
    let (width, height) = (image.width(), image.height());

    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageOutputFormat::Png)
        .map_err(|e| CaptureError::EncodingFailed(e.to_string()))?;

    Ok(ScreenFrame {
        base64: base64::engine::general_purpose::STANDARD.encode(buffer.into_inner()),
        width,
        height,
    })
}

#[async_trait]
impl ScreenCapture for PrimaryScreenCapture {
    async fn capture(&self) -> Result<ScreenFrame, String> {
        tokio::task::spawn_blocking(capture_primary)
            .await
            .map_err(|e| e.to_string())?
            .map_err(|e| e.to_string())
    }
}
