/// Test fixtures shared by unit and integration tests
///
/// - `PaletteTable` paints each labelled region in its own color and pairs the
///   frame with a recognizer that maps colors back to labels.
/// - `ScriptedDetector` replays queued results (repeating the last one).
/// - `ScriptedSource` produces distinct frames and can be told to fail.
use image::{Rgba, RgbaImage};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::capture::{CaptureRegion, Frame, SourceCapture, SourceHandle, SourceInfo};
use crate::detection::{
    DetectionContext, DetectionResult, Detector, DetectorKind, Payload, Recognition,
    RecognitionHint, Recognizer, RelRect, TableLayout,
};
use crate::error::{CaptureError, RecognitionError};

const FRAME_SIZE: u32 = 1000;
const BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 255]);

type Reading = Result<Recognition, RecognitionError>;

/// Painted table frame with a matching recognizer
pub struct PaletteTable {
    layout: TableLayout,
    title: String,
    regions: Vec<(RelRect, Rgba<u8>)>,
    readings: HashMap<[u8; 3], Reading>,
}

impl PaletteTable {
    pub fn new() -> Self {
        Self {
            layout: TableLayout::six_max(),
            title: "Test table".to_string(),
            regions: Vec::new(),
            readings: HashMap::new(),
        }
    }

    pub fn layout(&self) -> &TableLayout {
        &self.layout
    }

    pub fn set_title(&mut self, title: impl Into<String>) -> &mut Self {
        self.title = title.into();
        self
    }

    fn next_color(&self) -> Rgba<u8> {
        let index = self.regions.len() as u16 + 1;
        Rgba([(index & 0xff) as u8, (index >> 8) as u8, 200, 255])
    }

    fn paint(&mut self, rect: RelRect, reading: Reading) -> &mut Self {
        let color = self.next_color();
        self.regions.push((rect, color));
        self.readings.insert([color[0], color[1], color[2]], reading);
        self
    }

    /// Region reads as `text` with `confidence`
    pub fn label(&mut self, rect: RelRect, text: &str, confidence: f32) -> &mut Self {
        self.paint(rect, Ok(Recognition::new(text, confidence)))
    }

    /// Region makes the recognizer fail
    pub fn fail(&mut self, rect: RelRect, message: &str) -> &mut Self {
        self.paint(rect, Err(RecognitionError::Primitive(message.to_string())))
    }

    pub fn frame(&self, id: u64) -> Frame {
        let mut image = RgbaImage::from_pixel(FRAME_SIZE, FRAME_SIZE, BACKGROUND);
        for (rect, color) in &self.regions {
            let (x, y, w, h) = rect.to_pixels(FRAME_SIZE, FRAME_SIZE);
            for py in y..y + h {
                for px in x..x + w {
                    image.put_pixel(px, py, *color);
                }
            }
        }
        Frame::new(
            id,
            SourceHandle::new("palette"),
            self.title.clone(),
            CaptureRegion::new(0, 0, FRAME_SIZE, FRAME_SIZE),
            image,
        )
    }

    pub fn recognizer(&self) -> Arc<dyn Recognizer> {
        Arc::new(PaletteRecognizer {
            readings: self.readings.clone(),
        })
    }

    pub fn context(&self, frame_id: u64) -> DetectionContext {
        DetectionContext::new(
            Arc::new(self.frame(frame_id)),
            Arc::new(self.layout.clone()),
            self.recognizer(),
        )
    }
}

impl Default for PaletteTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps the color at the center of a region to a scripted reading
struct PaletteRecognizer {
    readings: HashMap<[u8; 3], Reading>,
}

impl Recognizer for PaletteRecognizer {
    fn recognize(&self, region: &RgbaImage, _hint: RecognitionHint) -> Result<Recognition, RecognitionError> {
        let (width, height) = region.dimensions();
        if width == 0 || height == 0 {
            return Err(RecognitionError::Primitive("empty region".to_string()));
        }
        let pixel = region.get_pixel(width / 2, height / 2);
        match self.readings.get(&[pixel[0], pixel[1], pixel[2]]) {
            Some(reading) => reading.clone(),
            None => Ok(Recognition::new("", 0.95)),
        }
    }

    fn name(&self) -> &'static str {
        "palette"
    }
}

type Step = Result<(Payload, f32), RecognitionError>;

/// Detector replaying queued results; the last step repeats once the queue drains
pub struct ScriptedDetector {
    kind: DetectorKind,
    steps: Mutex<VecDeque<Step>>,
    last: Mutex<Option<Step>>,
    delay: Mutex<Duration>,
    calls: AtomicUsize,
}

impl ScriptedDetector {
    pub fn new(kind: DetectorKind) -> Self {
        Self {
            kind,
            steps: Mutex::new(VecDeque::new()),
            last: Mutex::new(None),
            delay: Mutex::new(Duration::ZERO),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn push_ok(&self, payload: Payload, confidence: f32) -> &Self {
        self.steps.lock().push_back(Ok((payload, confidence)));
        self
    }

    pub fn push_err(&self, error: RecognitionError) -> &Self {
        self.steps.lock().push_back(Err(error));
        self
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> Step {
        let mut last = self.last.lock();
        if let Some(step) = self.steps.lock().pop_front() {
            *last = Some(step.clone());
            return step;
        }
        last.clone().unwrap_or_else(|| {
            Err(RecognitionError::Failed {
                kind: self.kind,
                message: "script is empty".to_string(),
            })
        })
    }
}

impl Detector for ScriptedDetector {
    fn kind(&self) -> DetectorKind {
        self.kind
    }

    fn detect(&self, context: &DetectionContext) -> Result<DetectionResult, RecognitionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        let (payload, confidence) = self.next_step()?;
        Ok(DetectionResult::new(payload, confidence, context.frame.id))
    }

    fn regions(&self, _layout: &TableLayout) -> Vec<RelRect> {
        vec![RelRect::new(0.0, 0.0, 1.0, 1.0)]
    }

    fn name(&self) -> &'static str {
        "ScriptedDetector"
    }
}

/// Switches shared between a `ScriptedSource` and the test driving it
#[derive(Clone, Default)]
pub struct SourceControl {
    failures: Arc<AtomicUsize>,
    gone: Arc<AtomicBool>,
    frozen: Arc<AtomicBool>,
    captures: Arc<AtomicU64>,
}

impl SourceControl {
    /// Fail the next `count` captures
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Make the source disappear from enumeration
    pub fn set_gone(&self, gone: bool) {
        self.gone.store(gone, Ordering::SeqCst);
    }

    /// Produce identical pixels every capture
    pub fn set_frozen(&self, frozen: bool) {
        self.frozen.store(frozen, Ordering::SeqCst);
    }

    pub fn captures(&self) -> u64 {
        self.captures.load(Ordering::SeqCst)
    }
}

/// Capture source producing small frames that differ per capture
pub struct ScriptedSource {
    handle: SourceHandle,
    title: String,
    extra: Vec<SourceInfo>,
    control: SourceControl,
}

impl ScriptedSource {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            handle: SourceHandle::new("scripted"),
            title: title.into(),
            extra: Vec::new(),
            control: SourceControl::default(),
        }
    }

    /// Additional windows reported by enumeration (never captured)
    pub fn with_window(mut self, id: &str, title: &str) -> Self {
        self.extra.push(SourceInfo::new(SourceHandle::new(id), title));
        self
    }

    pub fn control(&self) -> SourceControl {
        self.control.clone()
    }
}

impl SourceCapture for ScriptedSource {
    fn enumerate(&mut self) -> Result<Vec<SourceInfo>, CaptureError> {
        let mut sources = self.extra.clone();
        if !self.control.gone.load(Ordering::SeqCst) {
            sources.push(SourceInfo::new(self.handle.clone(), self.title.clone()));
        }
        Ok(sources)
    }

    fn capture(&mut self, source: &SourceHandle, frame_id: u64) -> Result<Frame, CaptureError> {
        if source != &self.handle || self.control.gone.load(Ordering::SeqCst) {
            return Err(CaptureError::SourceGone(source.to_string()));
        }

        let pending = self.control.failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.control.failures.store(pending - 1, Ordering::SeqCst);
            return Err(CaptureError::SourceUnavailable(format!("{} is busy", source)));
        }

        let count = self.control.captures.fetch_add(1, Ordering::SeqCst) + 1;
        let mut image = RgbaImage::from_pixel(16, 16, BACKGROUND);
        if !self.control.frozen.load(Ordering::SeqCst) {
            let bytes = count.to_le_bytes();
            image.put_pixel(0, 0, Rgba([bytes[0], bytes[1], bytes[2], 255]));
        }

        Ok(Frame::new(
            frame_id,
            self.handle.clone(),
            self.title.clone(),
            CaptureRegion::new(0, 0, 16, 16),
            image,
        ))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
