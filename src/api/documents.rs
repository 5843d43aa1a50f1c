use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::db::repository;
use crate::models::enums::{DocumentStatus, ProcessingStage};
use crate::models::Document;
use crate::pipeline::processor::spawn_ingestion;

use super::error::ApiError;
use super::{owner_from_headers, with_connection, AppState};

/// Accept a multipart upload and create the document record in `uploading`.
/// Processing does not start until the client posts to `/process`.
pub async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Document>), ApiError> {
    let owner_id = owner_from_headers(&headers)?;

    let mut payload: Option<(String, String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field
            .file_name()
            .map(sanitize_file_name)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ApiError::bad_request("Upload is missing a file name"))?;
        let mime_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| {
                mime_guess::from_path(&file_name)
                    .first_or_octet_stream()
                    .to_string()
            });
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Upload read failed: {e}")))?;
        payload = Some((file_name, mime_type, bytes.to_vec()));
        break;
    }

    let (file_name, mime_type, bytes) =
        payload.ok_or_else(|| ApiError::bad_request("No 'file' field in upload"))?;
    if bytes.is_empty() {
        return Err(ApiError::bad_request("Uploaded file is empty"));
    }

    let storage_dir = state.storage_dir.clone();
    let doc = with_connection(&state, move |conn| {
        std::fs::create_dir_all(&storage_dir)
            .map_err(|e| ApiError::internal(format!("Storage unavailable: {e}")))?;

        let doc_id = Uuid::new_v4();
        let stored_path = storage_dir.join(format!("{doc_id}_{file_name}"));
        std::fs::write(&stored_path, &bytes)
            .map_err(|e| ApiError::internal(format!("Could not store upload: {e}")))?;

        let mut doc = Document::new_upload(
            owner_id,
            &file_name,
            &stored_path.to_string_lossy(),
            &mime_type,
        );
        doc.id = doc_id;
        repository::insert_document(conn, &doc)?;

        info!(document_id = %doc.id, name = %doc.name, size = bytes.len(), "Upload stored");
        Ok(doc)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(doc)))
}

pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Document>>, ApiError> {
    let owner_id = owner_from_headers(&headers)?;
    let docs =
        with_connection(&state, move |conn| {
            Ok(repository::list_documents_by_owner(conn, owner_id)?)
        })
        .await?;
    Ok(Json(docs))
}

/// Kick off ingestion on a worker thread and acknowledge immediately.
pub async fn process(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let owner_id = owner_from_headers(&headers)?;

    // Ownership and state are checked up front so the client gets a real
    // status code; the worker re-checks state before mutating anything.
    with_connection(&state, move |conn| {
        let doc = repository::get_document_owned(conn, &id, owner_id)?
            .ok_or_else(|| ApiError::not_found(format!("Document not found: {id}")))?;
        if doc.status != DocumentStatus::Uploading {
            return Err(ApiError {
                status: StatusCode::CONFLICT,
                message: format!("Document is {}, expected uploading", doc.status.as_str()),
            });
        }
        Ok(())
    })
    .await?;

    spawn_ingestion(state.db_path.clone(), state.deps.clone(), id);

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "documentId": id, "status": "processing" })),
    ))
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub id: Uuid,
    pub status: DocumentStatus,
    pub processing_stage: ProcessingStage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_category: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub word_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ocr_confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Poll target while a document is being processed.
pub async fn status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<StatusResponse>, ApiError> {
    let owner_id = owner_from_headers(&headers)?;

    let doc = with_connection(&state, move |conn| {
        repository::get_document_owned(conn, &id, owner_id)?
            .ok_or_else(|| ApiError::not_found(format!("Document not found: {id}")))
    })
    .await?;

    Ok(Json(StatusResponse {
        id: doc.id,
        status: doc.status,
        processing_stage: doc.processing_stage,
        suggested_category: doc.suggested_category,
        tags: doc.tags,
        word_count: doc.word_count,
        page_count: doc.page_count,
        ocr_confidence: doc.ocr_confidence,
        error_message: doc.error_message,
    }))
}

pub async fn remove(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let owner_id = owner_from_headers(&headers)?;

    with_connection(&state, move |conn| {
        let doc = repository::get_document_owned(conn, &id, owner_id)?
            .ok_or_else(|| ApiError::not_found(format!("Document not found: {id}")))?;
        repository::delete_document(conn, &id)?;
        // Stored file removal is best effort; the record is gone either way.
        if let Err(e) = std::fs::remove_file(&doc.file_path) {
            tracing::warn!(path = %doc.file_path, error = %e, "Could not remove stored file");
        }
        Ok(())
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '.' | '-' | '_' | ' '))
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_are_sanitized() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "....etcpasswd");
        assert_eq!(sanitize_file_name("report (v2).pdf"), "report v2.pdf");
        assert_eq!(sanitize_file_name("simple.txt"), "simple.txt");
    }

    #[test]
    fn status_response_omits_empty_fields() {
        let response = StatusResponse {
            id: Uuid::nil(),
            status: DocumentStatus::Processing,
            processing_stage: ProcessingStage::Ocr,
            suggested_category: None,
            tags: vec![],
            word_count: None,
            page_count: None,
            ocr_confidence: None,
            error_message: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "processing");
        assert_eq!(json["processing_stage"], "ocr");
        assert!(json.get("tags").is_none());
        assert!(json.get("error_message").is_none());
    }
}
