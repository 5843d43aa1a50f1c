use super::ExtractionError;

/// How the text was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMethod {
    /// Text layer read straight from a digital PDF.
    DigitalText,
    /// Optical character recognition over page images.
    Ocr,
    /// File contents read as UTF-8.
    PlainText,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DigitalText => "digital_text",
            Self::Ocr => "ocr",
            Self::PlainText => "plain_text",
        }
    }
}

/// Final extraction result handed to the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct ExtractionOutput {
    pub text: String,
    pub method: ExtractionMethod,
    pub word_count: i64,
    pub page_count: Option<i64>,
    /// Mean OCR confidence in 0.0–1.0, absent for non-OCR extractions.
    pub avg_confidence: Option<f64>,
}

impl ExtractionOutput {
    pub fn new(text: String, method: ExtractionMethod) -> Self {
        let word_count = text.split_whitespace().count() as i64;
        Self {
            text,
            method,
            word_count,
            page_count: None,
            avg_confidence: None,
        }
    }
}

/// One recognized word with its confidence score.
#[derive(Debug, Clone)]
pub struct OcrWordResult {
    pub text: String,
    pub confidence: f32,
}

/// OCR output for a single page image.
#[derive(Debug, Clone)]
pub struct OcrPageResult {
    pub text: String,
    /// Page-mean confidence in 0.0–1.0.
    pub confidence: f32,
    pub word_confidences: Vec<OcrWordResult>,
}

/// OCR boundary, implemented by the Tesseract wrapper and mocked in tests.
pub trait OcrEngine: Send + Sync {
    fn ocr_image(&self, image_bytes: &[u8]) -> Result<OcrPageResult, ExtractionError>;
}

/// Turns one PDF page into an image suitable for OCR.
pub trait PdfPageRenderer: Send + Sync {
    fn render_page(&self, pdf_bytes: &[u8], page_number: usize) -> Result<Vec<u8>, ExtractionError>;
}
