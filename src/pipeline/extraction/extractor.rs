use std::path::Path;

use tracing::{info, warn};

use super::pdf;
use super::types::{ExtractionMethod, ExtractionOutput, OcrEngine, PdfPageRenderer};
use super::ExtractionError;

/// Routes a file to the right extraction strategy based on its MIME type.
pub struct DocumentExtractor<'a> {
    ocr: &'a dyn OcrEngine,
    renderer: &'a dyn PdfPageRenderer,
    /// Below this many average embedded chars per page, a PDF counts as scanned.
    scanned_text_threshold: usize,
    /// OCR stops after this many pages to bound processing time.
    ocr_max_pages: usize,
}

impl<'a> DocumentExtractor<'a> {
    pub fn new(
        ocr: &'a dyn OcrEngine,
        renderer: &'a dyn PdfPageRenderer,
        scanned_text_threshold: usize,
        ocr_max_pages: usize,
    ) -> Self {
        Self {
            ocr,
            renderer,
            scanned_text_threshold,
            ocr_max_pages,
        }
    }

    pub fn extract(
        &self,
        path: &Path,
        mime_type: &str,
    ) -> Result<ExtractionOutput, ExtractionError> {
        let bytes = std::fs::read(path)
            .map_err(|e| ExtractionError::FileRead(format!("{}: {e}", path.display())))?;

        if mime_type == "application/pdf" {
            self.extract_pdf(&bytes)
        } else if mime_type.starts_with("image/") {
            self.extract_image(&bytes)
        } else if mime_type.starts_with("text/") {
            Ok(ExtractionOutput::new(
                String::from_utf8_lossy(&bytes).into_owned(),
                ExtractionMethod::PlainText,
            ))
        } else {
            Err(ExtractionError::UnsupportedType(mime_type.to_string()))
        }
    }

    fn extract_image(&self, bytes: &[u8]) -> Result<ExtractionOutput, ExtractionError> {
        let page = self.ocr.ocr_image(bytes)?;
        let mut output = ExtractionOutput::new(page.text, ExtractionMethod::Ocr);
        output.page_count = Some(1);
        output.avg_confidence = Some(page.confidence as f64);
        Ok(output)
    }

    pub fn extract_pdf(&self, bytes: &[u8]) -> Result<ExtractionOutput, ExtractionError> {
        let pages = pdf::page_count(bytes)?;

        if pdf::looks_scanned(bytes, self.scanned_text_threshold)? {
            self.ocr_pdf(bytes, pages)
        } else {
            let text = pdf::extract_digital_text(bytes)?;
            let mut output = ExtractionOutput::new(text, ExtractionMethod::DigitalText);
            output.page_count = Some(pages as i64);
            Ok(output)
        }
    }

    /// OCR a scanned PDF page by page, up to the page cap.
    ///
    /// Pages whose image cannot be recovered or recognized are skipped, not
    /// fatal; the rest of the document is still worth having.
    fn ocr_pdf(&self, bytes: &[u8], pages: usize) -> Result<ExtractionOutput, ExtractionError> {
        let limit = pages.min(self.ocr_max_pages);
        if pages > self.ocr_max_pages {
            info!(
                pages,
                cap = self.ocr_max_pages,
                "Scanned PDF exceeds OCR page cap, truncating"
            );
        }

        let mut text = String::new();
        let mut confidences = Vec::new();

        for page_idx in 0..limit {
            let page_result = self
                .renderer
                .render_page(bytes, page_idx)
                .and_then(|png| self.ocr.ocr_image(&png));

            match page_result {
                Ok(page) => {
                    text.push_str(&format!("\n--- Page {} ---\n", page_idx + 1));
                    text.push_str(&page.text);
                    confidences.push(page.confidence);
                }
                Err(e) => {
                    warn!(page = page_idx + 1, error = %e, "Skipping unreadable page");
                }
            }
        }

        let avg_confidence = if confidences.is_empty() {
            None
        } else {
            Some((confidences.iter().sum::<f32>() / confidences.len() as f32) as f64)
        };

        let mut output = ExtractionOutput::new(text, ExtractionMethod::Ocr);
        output.page_count = Some(pages as i64);
        output.avg_confidence = avg_confidence;
        Ok(output)
    }
}
