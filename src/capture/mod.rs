/// Capture sources
///
/// Enumerates candidate windows and pulls frames from the selected one. The
/// platform implementation is chosen once at startup by `platform_source()`;
/// call sites only see the `SourceCapture` trait.
///
/// ## Implementations
///
/// ```text
/// SourceCapture
///   ├── WindowSource  (feature "window-capture", xcap)
///   └── ReplaySource  (image files replayed from a directory)
/// ```
pub mod replay;
#[cfg(feature = "window-capture")]
pub mod window;

pub use replay::ReplaySource;
#[cfg(feature = "window-capture")]
pub use window::WindowSource;

use chrono::{DateTime, Utc};
use image::RgbaImage;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::detection::layout::RelRect;
use crate::error::{CaptureError, ValidationError};

/// Opaque handle identifying one capture source
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceHandle(String);

impl SourceHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source as reported by enumeration, before classification
#[derive(Debug, Clone, PartialEq)]
pub struct SourceInfo {
    pub handle: SourceHandle,
    pub title: String,
}

impl SourceInfo {
    pub fn new(handle: SourceHandle, title: impl Into<String>) -> Self {
        Self {
            handle,
            title: title.into(),
        }
    }
}

/// Represents a screen region in absolute pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CaptureRegion {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }
}

/// One captured frame. Never mutated after creation.
#[derive(Debug, Clone)]
pub struct Frame {
    pub id: u64,
    pub source: SourceHandle,
    pub source_title: String,
    pub captured_at: Instant,
    pub captured_wall: DateTime<Utc>,
    pub bounds: CaptureRegion,
    image: Arc<RgbaImage>,
}

impl Frame {
    pub fn new(
        id: u64,
        source: SourceHandle,
        source_title: impl Into<String>,
        bounds: CaptureRegion,
        image: RgbaImage,
    ) -> Self {
        Self {
            id,
            source,
            source_title: source_title.into(),
            captured_at: Instant::now(),
            captured_wall: Utc::now(),
            bounds,
            image: Arc::new(image),
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Copy out a relative region of the frame
    pub fn crop(&self, rect: RelRect) -> Result<RgbaImage, ValidationError> {
        rect.validate()?;
        let (width, height) = self.image.dimensions();
        if width == 0 || height == 0 {
            return Err(ValidationError::RegionOutOfBounds {
                x: rect.x,
                y: rect.y,
                width: rect.width,
                height: rect.height,
            });
        }
        let (x, y, w, h) = rect.to_pixels(width, height);
        Ok(image::imageops::crop_imm(self.image.as_ref(), x, y, w, h).to_image())
    }
}

/// Capture source abstraction
///
/// Implementations must report every failure as a `CaptureError`; the capture
/// stage retries a bounded number of times before degrading the pipeline.
pub trait SourceCapture: Send {
    /// List candidate sources with their titles
    fn enumerate(&mut self) -> Result<Vec<SourceInfo>, CaptureError>;

    /// Capture one frame from a source
    fn capture(&mut self, source: &SourceHandle, frame_id: u64) -> Result<Frame, CaptureError>;

    /// Implementation name (for logging)
    fn name(&self) -> &'static str;
}

/// Pick the capture implementation for this build
///
/// With a replay directory the replay source is used; otherwise the window source
/// when compiled in.
pub fn platform_source(
    replay_dir: Option<PathBuf>,
    replay_title: Option<String>,
) -> Result<Box<dyn SourceCapture>, CaptureError> {
    if let Some(dir) = replay_dir {
        let title = replay_title.unwrap_or_else(|| {
            dir.file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_else(|| "replay".to_string())
        });
        let source = ReplaySource::open(&dir, title)?;
        tracing::info!("Using replay capture from {}", dir.display());
        return Ok(Box::new(source));
    }

    #[cfg(feature = "window-capture")]
    {
        tracing::info!("Using window capture");
        Ok(Box::new(WindowSource::new()))
    }

    #[cfg(not(feature = "window-capture"))]
    {
        Err(CaptureError::SourceUnavailable(
            "window capture not compiled in (enable the \"window-capture\" feature) and no replay directory given"
                .to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn test_frame() -> Frame {
        let mut image = RgbaImage::from_pixel(100, 50, Rgba([0, 0, 0, 255]));
        image.put_pixel(60, 30, Rgba([255, 0, 0, 255]));
        Frame::new(
            1,
            SourceHandle::new("test"),
            "Test table",
            CaptureRegion::new(0, 0, 100, 50),
            image,
        )
    }

    #[test]
    fn test_frame_crop() {
        let frame = test_frame();
        let crop = frame.crop(RelRect::new(0.5, 0.5, 0.5, 0.5)).unwrap();
        assert_eq!(crop.dimensions(), (50, 25));
        assert_eq!(crop.get_pixel(10, 5), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_frame_crop_rejects_bad_region() {
        let frame = test_frame();
        assert!(frame.crop(RelRect::new(0.8, 0.0, 0.5, 0.5)).is_err());
    }
}
