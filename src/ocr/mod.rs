/// OCR module
///
/// `preprocessing` turns colored table crops into binary images; with the
/// `tesseract` feature, `TesseractRecognizer` implements the recognition
/// primitive on top of it.
pub mod preprocessing;
#[cfg(feature = "tesseract")]
pub mod tesseract;

pub use preprocessing::ImagePreprocessor;
#[cfg(feature = "tesseract")]
pub use tesseract::TesseractRecognizer;
