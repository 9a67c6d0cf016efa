//! Screen observation types and the capture seam.
//!
//! Capture itself (screenshots, accessibility extraction) lives outside this
//! crate; the loop only sees the opaque [`Observation`] snapshot.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::id::now_ms;

/// On-screen rectangle of the captured window, in screen points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// One captured view of the screen or of a target window.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Encoded image bytes
    pub image: Vec<u8>,
    /// MIME type of `image` (e.g. "image/jpeg")
    pub media_type: String,
    /// Pixel width of `image`
    pub width: u32,
    /// Pixel height of `image`
    pub height: u32,
    /// Window frame when a target process was captured
    pub frame: Option<Frame>,
    /// Optional textual description supplied by the capture layer
    pub description: Option<String>,
    /// Unix timestamp in milliseconds
    pub captured_at: u64,
}

impl Observation {
    /// Create an observation from an encoded JPEG.
    pub fn jpeg(image: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            image,
            media_type: "image/jpeg".to_string(),
            width,
            height,
            frame: None,
            description: None,
            captured_at: now_ms(),
        }
    }

    /// Attach the window frame.
    pub fn with_frame(mut self, frame: Frame) -> Self {
        self.frame = Some(frame);
        self
    }

    /// Attach a textual description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// File extension matching the media type.
    pub fn extension(&self) -> &'static str {
        match self.media_type.as_str() {
            "image/png" => "png",
            "image/webp" => "webp",
            _ => "jpg",
        }
    }

    /// One-line summary used in prompts and logs.
    pub fn summary(&self) -> String {
        let mut out = format!("Screenshot {}x{}", self.width, self.height);
        if let Some(frame) = self.frame {
            out.push_str(&format!(
                " of window at ({}, {}) size {}x{}",
                frame.x, frame.y, frame.width, frame.height
            ));
        }
        out
    }
}

/// Why a capture failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CaptureError {
    #[error("Screen recording permission is not granted")]
    PermissionDenied,

    #[error("Target process {0} has no capturable window")]
    TargetNotFound(u32),

    #[error("Capture failed: {0}")]
    Failed(String),
}

/// Capture quality knobs passed through to the capture layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSettings {
    /// Longest edge of the returned image, in pixels
    pub max_dimension: u32,
    /// Encoder quality, 1-100
    pub quality: u8,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            max_dimension: 1280,
            quality: 70,
        }
    }
}

/// Source of fresh observations.
#[async_trait]
pub trait ObservationSource: Send + Sync {
    /// Capture the screen, or the window of `target_pid` when given.
    async fn capture(
        &self,
        target_pid: Option<u32>,
        max_dimension: u32,
        quality: u8,
    ) -> Result<Observation, CaptureError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jpeg_defaults() {
        let obs = Observation::jpeg(vec![0xff, 0xd8], 800, 600);
        assert_eq!(obs.media_type, "image/jpeg");
        assert_eq!(obs.extension(), "jpg");
        assert!(obs.frame.is_none());
        assert!(obs.captured_at > 0);
    }

    #[test]
    fn test_extension_by_media_type() {
        let mut obs = Observation::jpeg(vec![], 1, 1);
        obs.media_type = "image/png".to_string();
        assert_eq!(obs.extension(), "png");
    }

    #[test]
    fn test_summary_includes_frame() {
        let obs = Observation::jpeg(vec![], 640, 480).with_frame(Frame {
            x: 10,
            y: 20,
            width: 300,
            height: 200,
        });
        let summary = obs.summary();
        assert!(summary.contains("640x480"));
        assert!(summary.contains("(10, 20)"));
    }

    #[test]
    fn test_capture_settings_default() {
        let settings = CaptureSettings::default();
        assert_eq!(settings.max_dimension, 1280);
        assert_eq!(settings.quality, 70);
    }

    #[test]
    fn test_capture_error_display() {
        assert_eq!(
            CaptureError::TargetNotFound(42).to_string(),
            "Target process 42 has no capturable window"
        );
    }
}
