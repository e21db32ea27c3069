/// Replay capture source
///
/// Presents a directory of still images as a single table source and cycles
/// through them in file-name order. Useful for offline runs and tests.
use std::fs;
use std::path::{Path, PathBuf};

use super::{CaptureRegion, Frame, SourceCapture, SourceHandle, SourceInfo};
use crate::error::CaptureError;

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

pub struct ReplaySource {
    handle: SourceHandle,
    title: String,
    files: Vec<PathBuf>,
    cursor: usize,
}

impl ReplaySource {
    /// Open a replay directory; fails when it holds no images
    pub fn open(dir: &Path, title: impl Into<String>) -> Result<Self, CaptureError> {
        let entries = fs::read_dir(dir)
            .map_err(|err| CaptureError::SourceUnavailable(format!("{}: {err}", dir.display())))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(CaptureError::SourceUnavailable(format!(
                "no images in {}",
                dir.display()
            )));
        }

        Ok(Self {
            handle: SourceHandle::new(format!("replay:{}", dir.display())),
            title: title.into(),
            files,
            cursor: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl SourceCapture for ReplaySource {
    fn enumerate(&mut self) -> Result<Vec<SourceInfo>, CaptureError> {
        Ok(vec![SourceInfo::new(self.handle.clone(), self.title.clone())])
    }

    fn capture(&mut self, source: &SourceHandle, frame_id: u64) -> Result<Frame, CaptureError> {
        if source != &self.handle {
            return Err(CaptureError::SourceGone(source.to_string()));
        }

        let path = &self.files[self.cursor % self.files.len()];
        self.cursor = (self.cursor + 1) % self.files.len();

        let image = image::open(path)
            .map_err(|err| CaptureError::CaptureFailed {
                source_id: source.to_string(),
                source: Box::new(err),
            })?
            .to_rgba8();

        let (width, height) = image.dimensions();
        Ok(Frame::new(
            frame_id,
            self.handle.clone(),
            self.title.clone(),
            CaptureRegion::new(0, 0, width, height),
            image,
        ))
    }

    fn name(&self) -> &'static str {
        "replay"
    }
}
