//! Document ingestion state machine.
//!
//! uploading → processing (ocr) → processing (ai_analysis) → ready | failed
//!
//! Extraction failures are terminal. AI analysis failures are not: a
//! document with text but no category or tags is still fully usable, so the
//! pipeline degrades instead of failing the document.

use std::path::PathBuf;
use std::sync::Arc;

use rusqlite::Connection;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::repository;
use crate::db::sqlite::open_database;
use crate::models::enums::{DocumentStatus, ProcessingStage};
use crate::models::Document;

use super::classify;
use super::extraction::{DocumentExtractor, OcrEngine, PdfPageRenderer};
use super::ollama::LlmClient;
use super::tagging;
use super::PipelineError;

/// Everything the ingestion pipeline needs beyond a database connection.
/// Shared across worker threads.
pub struct IngestionDeps {
    pub llm: Arc<dyn LlmClient>,
    pub ocr: Arc<dyn OcrEngine>,
    pub renderer: Arc<dyn PdfPageRenderer>,
    pub analysis_model: String,
    pub scanned_text_threshold: usize,
    pub ocr_max_pages: usize,
}

/// Run the full ingestion pipeline for one document, synchronously.
///
/// Only documents in `uploading` may enter. On extraction failure the
/// document is marked `failed` before the error is returned.
pub fn process_document(
    conn: &Connection,
    deps: &IngestionDeps,
    document_id: &Uuid,
) -> Result<Document, PipelineError> {
    let doc = repository::get_document(conn, document_id)?
        .ok_or_else(|| PipelineError::DocumentNotFound(document_id.to_string()))?;

    if doc.status != DocumentStatus::Uploading {
        return Err(PipelineError::InvalidState(format!(
            "document {document_id} is {}, expected uploading",
            doc.status.as_str()
        )));
    }

    // ── Stage 1: text extraction ──────────────────────────────
    // Only documents that will actually be OCRed show the `ocr` stage;
    // a digital PDF polls straight through to `ai_analysis`.
    repository::update_document_state(
        conn,
        document_id,
        DocumentStatus::Processing,
        extraction_stage(&doc, deps.scanned_text_threshold),
    )?;
    info!(document_id = %document_id, name = %doc.name, "Extraction started");

    let extractor = DocumentExtractor::new(
        deps.ocr.as_ref(),
        deps.renderer.as_ref(),
        deps.scanned_text_threshold,
        deps.ocr_max_pages,
    );

    let extraction = match extractor.extract(std::path::Path::new(&doc.file_path), &doc.mime_type)
    {
        Ok(output) => output,
        Err(e) => {
            let message = e.to_string();
            repository::mark_document_failed(conn, document_id, &message)?;
            error!(document_id = %document_id, error = %message, "Extraction failed");
            return Err(e.into());
        }
    };

    let stored = repository::store_extraction(
        conn,
        document_id,
        &extraction.text,
        extraction.word_count,
        extraction.page_count.unwrap_or(1),
        extraction.avg_confidence,
    )?;
    if !stored {
        warn!(document_id = %document_id, "Extracted text already present, keeping original");
    }

    info!(
        document_id = %document_id,
        method = extraction.method.as_str(),
        words = extraction.word_count,
        "Extraction complete"
    );

    // A document with no recoverable text still becomes ready; there is
    // nothing for the analysis stage to look at.
    if extraction.text.trim().is_empty() {
        repository::update_document_state(
            conn,
            document_id,
            DocumentStatus::Ready,
            ProcessingStage::Completed,
        )?;
        info!(document_id = %document_id, "Ready without extractable text");
        return finish(conn, document_id);
    }

    // ── Stage 2: AI analysis (best effort) ────────────────────
    repository::update_document_state(
        conn,
        document_id,
        DocumentStatus::Processing,
        ProcessingStage::AiAnalysis,
    )?;

    let categories = repository::list_active_category_names(conn)?;
    let suggestion = classify::suggest_category(
        deps.llm.as_ref(),
        &deps.analysis_model,
        &doc.name,
        &extraction.text,
        &categories,
    );
    let tags = tagging::generate_tags(
        deps.llm.as_ref(),
        &deps.analysis_model,
        &doc.name,
        &extraction.text,
    );

    repository::store_analysis(conn, document_id, Some(&suggestion.category), &tags)?;

    repository::update_document_state(
        conn,
        document_id,
        DocumentStatus::Ready,
        ProcessingStage::Completed,
    )?;
    info!(
        document_id = %document_id,
        category = %suggestion.category,
        tag_count = tags.len(),
        "Document ready"
    );

    finish(conn, document_id)
}

/// Stage shown while extraction runs: `ocr` for images and scanned PDFs,
/// `none` otherwise. Unreadable files fall through; the extractor reports
/// the real error.
fn extraction_stage(doc: &Document, scanned_text_threshold: usize) -> ProcessingStage {
    let needs_ocr = if doc.mime_type.starts_with("image/") {
        true
    } else if doc.mime_type == "application/pdf" {
        std::fs::read(&doc.file_path)
            .ok()
            .map(|bytes| {
                super::extraction::pdf::looks_scanned(&bytes, scanned_text_threshold)
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    } else {
        false
    };

    if needs_ocr {
        ProcessingStage::Ocr
    } else {
        ProcessingStage::None
    }
}

fn finish(conn: &Connection, document_id: &Uuid) -> Result<Document, PipelineError> {
    repository::get_document(conn, document_id)?
        .ok_or_else(|| PipelineError::DocumentNotFound(document_id.to_string()))
}

/// Run ingestion on a detached worker thread with its own connection.
pub fn spawn_ingestion(
    db_path: PathBuf,
    deps: Arc<IngestionDeps>,
    document_id: Uuid,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let conn = match open_database(&db_path) {
            Ok(conn) => conn,
            Err(e) => {
                error!(document_id = %document_id, error = %e, "Worker could not open database");
                return;
            }
        };

        match process_document(&conn, &deps, &document_id) {
            Ok(doc) => info!(
                document_id = %document_id,
                status = doc.status.as_str(),
                "Ingestion worker finished"
            ),
            Err(e) => error!(document_id = %document_id, error = %e, "Ingestion worker failed"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::pipeline::extraction::ocr::MockOcrEngine;
    use crate::pipeline::extraction::page_image::EmbeddedImageRenderer;
    use crate::pipeline::ollama::MockLlmClient;
    use std::io::Write;

    fn deps_with_llm(llm: MockLlmClient) -> IngestionDeps {
        IngestionDeps {
            llm: Arc::new(llm),
            ocr: Arc::new(MockOcrEngine::new("scanned text", 0.9)),
            renderer: Arc::new(EmbeddedImageRenderer),
            analysis_model: "llama3.2:3b-instruct-q4_K_M".into(),
            scanned_text_threshold: 100,
            ocr_max_pages: 10,
        }
    }

    fn upload_text_file(conn: &Connection, content: &str) -> (Document, tempfile::NamedTempFile) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();

        let doc = Document::new_upload(
            1,
            "notes.txt",
            file.path().to_str().unwrap(),
            "text/plain",
        );
        repository::insert_document(conn, &doc).unwrap();
        (doc, file)
    }

    #[test]
    fn text_document_reaches_ready_with_analysis() {
        let conn = open_memory_database().unwrap();
        let llm = MockLlmClient::with_responses(&[
            r#"{"category_name": "Reports", "confidence": 0.9, "reasoning": "report-like"}"#,
            r#"["quarterly", "budget"]"#,
        ]);
        let deps = deps_with_llm(llm);
        let (doc, _file) = upload_text_file(&conn, "The quarterly budget report shows growth.");

        let result = process_document(&conn, &deps, &doc.id).unwrap();

        assert_eq!(result.status, DocumentStatus::Ready);
        assert_eq!(result.processing_stage, ProcessingStage::Completed);
        assert_eq!(
            result.extracted_text.as_deref(),
            Some("The quarterly budget report shows growth.")
        );
        assert_eq!(result.suggested_category.as_deref(), Some("Reports"));
        assert_eq!(result.tags, vec!["quarterly", "budget"]);
        assert_eq!(result.word_count, Some(6));
    }

    #[test]
    fn llm_outage_degrades_but_document_is_ready() {
        let conn = open_memory_database().unwrap();
        let deps = deps_with_llm(MockLlmClient::failing("connection refused"));
        let (doc, _file) = upload_text_file(&conn, "Some perfectly extractable text.");

        let result = process_document(&conn, &deps, &doc.id).unwrap();

        assert_eq!(result.status, DocumentStatus::Ready);
        assert_eq!(result.suggested_category.as_deref(), Some("General"));
        assert!(result.tags.is_empty());
        assert!(result.error_message.is_none());
    }

    #[test]
    fn missing_file_marks_document_failed() {
        let conn = open_memory_database().unwrap();
        let deps = deps_with_llm(MockLlmClient::new("unused"));

        let doc = Document::new_upload(1, "ghost.txt", "/nonexistent/ghost.txt", "text/plain");
        repository::insert_document(&conn, &doc).unwrap();

        let result = process_document(&conn, &deps, &doc.id);
        assert!(matches!(result, Err(PipelineError::Extraction(_))));

        let stored = repository::get_document(&conn, &doc.id).unwrap().unwrap();
        assert_eq!(stored.status, DocumentStatus::Failed);
        assert!(stored.error_message.is_some());
    }

    #[test]
    fn empty_file_becomes_ready_without_analysis() {
        let conn = open_memory_database().unwrap();
        // A failing LLM proves the analysis stage is never reached.
        let deps = deps_with_llm(MockLlmClient::failing("must not be called"));
        let (doc, _file) = upload_text_file(&conn, "   \n  ");

        let result = process_document(&conn, &deps, &doc.id).unwrap();

        assert_eq!(result.status, DocumentStatus::Ready);
        assert_eq!(result.processing_stage, ProcessingStage::Completed);
        assert!(result.suggested_category.is_none());
        assert!(result.tags.is_empty());
    }

    #[test]
    fn processing_requires_uploading_state() {
        let conn = open_memory_database().unwrap();
        let deps = deps_with_llm(MockLlmClient::new("unused"));
        let (doc, _file) = upload_text_file(&conn, "text");

        repository::update_document_state(
            &conn,
            &doc.id,
            DocumentStatus::Ready,
            ProcessingStage::Completed,
        )
        .unwrap();

        let result = process_document(&conn, &deps, &doc.id);
        assert!(matches!(result, Err(PipelineError::InvalidState(_))));
    }

    #[test]
    fn only_ocr_inputs_show_the_ocr_stage() {
        let image_doc = Document::new_upload(1, "scan.jpg", "/tmp/scan.jpg", "image/jpeg");
        assert_eq!(extraction_stage(&image_doc, 100), ProcessingStage::Ocr);

        let text_doc = Document::new_upload(1, "notes.txt", "/tmp/notes.txt", "text/plain");
        assert_eq!(extraction_stage(&text_doc, 100), ProcessingStage::None);

        let digital = crate::pipeline::extraction::pdf::fixtures::make_text_pdf(
            "A digital report page with a long embedded text layer, comfortably \
             past the scanned-document threshold for average characters.",
        );
        let mut pdf_file = tempfile::NamedTempFile::new().unwrap();
        pdf_file.write_all(&digital).unwrap();
        let pdf_doc = Document::new_upload(
            1,
            "report.pdf",
            pdf_file.path().to_str().unwrap(),
            "application/pdf",
        );
        assert_eq!(extraction_stage(&pdf_doc, 100), ProcessingStage::None);
    }

    #[test]
    fn unknown_document_is_reported() {
        let conn = open_memory_database().unwrap();
        let deps = deps_with_llm(MockLlmClient::new("unused"));

        let result = process_document(&conn, &deps, &Uuid::new_v4());
        assert!(matches!(result, Err(PipelineError::DocumentNotFound(_))));
    }
}
