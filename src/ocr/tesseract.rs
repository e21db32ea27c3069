/// Tesseract recognition backend
///
/// Each worker thread lazily owns its own Tesseract instance, so detectors
/// running in parallel never contend on one engine.
use image::{ImageFormat, RgbaImage};
use leptess::{LepTess, Variable};
use std::cell::RefCell;
use std::io::Cursor;

use super::preprocessing::ImagePreprocessor;
use crate::detection::{Recognition, RecognitionHint, Recognizer};
use crate::error::RecognitionError;

thread_local! {
    static ENGINE: RefCell<Option<LepTess>> = const { RefCell::new(None) };
}

pub struct TesseractRecognizer {
    datapath: Option<String>,
    language: String,
    preprocessor: ImagePreprocessor,
}

impl TesseractRecognizer {
    /// Check that an engine can be created with these settings
    pub fn new(datapath: Option<String>, language: &str) -> Result<Self, RecognitionError> {
        let recognizer = Self {
            datapath,
            language: language.to_string(),
            preprocessor: ImagePreprocessor::default(),
        };
        recognizer.engine()?;
        tracing::info!("✓ Tesseract OCR initialized (language {})", recognizer.language);
        Ok(recognizer)
    }

    fn engine(&self) -> Result<LepTess, RecognitionError> {
        let mut tess = LepTess::new(self.datapath.as_deref(), &self.language)
            .map_err(|e| RecognitionError::Primitive(format!("tesseract init: {}", e)))?;
        // PSM 7 = treat the region as a single text line
        tess.set_variable(Variable::TesseditPagesegMode, "7")
            .map_err(|e| RecognitionError::Primitive(format!("tesseract config: {}", e)))?;
        Ok(tess)
    }

    fn whitelist(hint: RecognitionHint) -> Option<&'static str> {
        match hint {
            RecognitionHint::Amount => Some("0123456789$€£.,KMkmBb "),
            RecognitionHint::Timer => Some("0123456789:s"),
            RecognitionHint::Cards => Some("23456789TJQKAtjqkashdc10 "),
            RecognitionHint::Text | RecognitionHint::Marker => None,
        }
    }

    fn run(&self, tess: &mut LepTess, region: &RgbaImage, hint: RecognitionHint) -> Result<Recognition, RecognitionError> {
        let binary = self.preprocessor.preprocess(region);
        let mut png = Vec::new();
        binary
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| RecognitionError::Primitive(format!("encode region: {}", e)))?;

        tess.set_variable(Variable::TesseditCharWhitelist, Self::whitelist(hint).unwrap_or(""))
            .map_err(|e| RecognitionError::Primitive(format!("tesseract config: {}", e)))?;
        tess.set_image_from_mem(&png)
            .map_err(|e| RecognitionError::Primitive(format!("tesseract image: {}", e)))?;
        let text = tess
            .get_utf8_text()
            .map_err(|e| RecognitionError::Primitive(format!("tesseract text: {}", e)))?;
        let confidence = (tess.mean_text_conf().clamp(0, 100) as f32) / 100.0;

        let label = text.trim().to_string();
        if !label.is_empty() {
            tracing::debug!("[ocr] {:?} '{}' ({:.2})", hint, label, confidence);
        }
        Ok(Recognition::new(label, confidence))
    }
}

impl Recognizer for TesseractRecognizer {
    fn recognize(&self, region: &RgbaImage, hint: RecognitionHint) -> Result<Recognition, RecognitionError> {
        ENGINE.with(|cell| {
            let mut slot = cell.borrow_mut();
            if slot.is_none() {
                *slot = Some(self.engine()?);
            }
            match slot.as_mut() {
                Some(tess) => self.run(tess, region, hint),
                None => Err(RecognitionError::Primitive("tesseract unavailable".into())),
            }
        })
    }

    fn name(&self) -> &'static str {
        "tesseract"
    }
}
