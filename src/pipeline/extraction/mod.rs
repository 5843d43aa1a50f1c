pub mod extractor;
pub mod ocr;
pub mod page_image;
pub mod pdf;
pub mod types;

pub use extractor::DocumentExtractor;
pub use types::{ExtractionMethod, ExtractionOutput, OcrEngine, OcrPageResult, PdfPageRenderer};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Failed to read file: {0}")]
    FileRead(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("PDF parsing failed: {0}")]
    PdfParsing(String),

    #[error("Image processing failed: {0}")]
    ImageProcessing(String),

    #[error("OCR engine unavailable: {0}")]
    OcrUnavailable(String),

    #[error("OCR processing failed: {0}")]
    OcrProcessing(String),

    #[error("OCR timed out after {0}s")]
    OcrTimeout(u64),
}
