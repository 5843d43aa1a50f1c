// ─────────────────────────────────────────────
// Document pipeline: extraction → OCR → analysis
// ─────────────────────────────────────────────

pub mod classify;
pub mod extraction;
pub mod ollama;
pub mod processor;
pub mod tagging;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Extraction failed: {0}")]
    Extraction(#[from] extraction::ExtractionError),

    #[error("Model error: {0}")]
    Llm(#[from] ollama::LlmError),

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Document is not ready for processing: {0}")]
    InvalidState(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
