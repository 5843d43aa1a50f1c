//! PDF text-layer extraction and the scanned-vs-digital heuristic.

use lopdf::Document;
use tracing::debug;

use super::ExtractionError;

/// How many leading pages the scanned-vs-digital heuristic samples.
const HEURISTIC_SAMPLE_PAGES: usize = 3;

/// Extract the full text layer from a digital PDF.
pub fn extract_digital_text(pdf_bytes: &[u8]) -> Result<String, ExtractionError> {
    pdf_extract::extract_text_from_mem(pdf_bytes)
        .map_err(|e| ExtractionError::PdfParsing(format!("Text extraction failed: {e}")))
}

pub fn page_count(pdf_bytes: &[u8]) -> Result<usize, ExtractionError> {
    let doc = Document::load_mem(pdf_bytes)
        .map_err(|e| ExtractionError::PdfParsing(format!("Failed to parse PDF: {e}")))?;
    Ok(doc.get_pages().len())
}

/// Decide whether a PDF is a scan that needs OCR.
///
/// Samples the text layer of the first few pages; if the average number of
/// embedded characters per sampled page falls below `threshold`, the PDF has
/// no usable text layer and is treated as scanned. A zero-page PDF is not
/// scanned (there is nothing to OCR).
pub fn looks_scanned(pdf_bytes: &[u8], threshold: usize) -> Result<bool, ExtractionError> {
    let doc = Document::load_mem(pdf_bytes)
        .map_err(|e| ExtractionError::PdfParsing(format!("Failed to parse PDF: {e}")))?;

    let pages = doc.get_pages();
    if pages.is_empty() {
        return Ok(false);
    }

    let sample = pages.len().min(HEURISTIC_SAMPLE_PAGES);
    let mut total_chars = 0usize;
    for page_num in 1..=sample as u32 {
        let text = doc.extract_text(&[page_num]).unwrap_or_default();
        total_chars += text.trim().chars().count();
    }

    let avg_chars = total_chars / sample;
    let scanned = avg_chars < threshold;
    debug!(
        sampled_pages = sample,
        avg_chars, threshold, scanned, "Scanned-vs-digital heuristic"
    );
    Ok(scanned)
}
