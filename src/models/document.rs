use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{DocumentStatus, ProcessingStage};

/// A user-owned document moving through the ingestion pipeline.
///
/// `extracted_text` is set once by the extractor and never mutated afterwards.
/// `status = Ready` implies `processing_stage = Completed`;
/// `status = Failed` implies `error_message` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub owner_id: i64,
    pub name: String,
    /// Raw-storage reference (path on disk in this deployment).
    pub file_path: String,
    pub mime_type: String,
    pub extracted_text: Option<String>,
    pub summary: Option<String>,
    pub word_count: Option<i64>,
    pub page_count: Option<i64>,
    /// Average OCR confidence, 0.0-1.0. Recorded, not enforced.
    pub ocr_confidence: Option<f64>,
    pub suggested_category: Option<String>,
    /// Insertion order = generation order.
    pub tags: Vec<String>,
    pub status: DocumentStatus,
    pub processing_stage: ProcessingStage,
    pub error_message: Option<String>,
    pub created_at: NaiveDateTime,
}

impl Document {
    /// Build a fresh record for an accepted upload.
    pub fn new_upload(owner_id: i64, name: &str, file_path: &str, mime_type: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name: name.to_string(),
            file_path: file_path.to_string(),
            mime_type: mime_type.to_string(),
            extracted_text: None,
            summary: None,
            word_count: None,
            page_count: None,
            ocr_confidence: None,
            suggested_category: None,
            tags: Vec::new(),
            status: DocumentStatus::Uploading,
            processing_stage: ProcessingStage::None,
            error_message: None,
            created_at: chrono::Local::now().naive_local(),
        }
    }

    /// Text usable as chat context: extracted text, else summary.
    pub fn usable_text(&self) -> Option<&str> {
        self.extracted_text
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| self.summary.as_deref().filter(|t| !t.trim().is_empty()))
    }
}
