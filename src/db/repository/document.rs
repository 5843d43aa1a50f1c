use std::str::FromStr;

use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::{DocumentStatus, ProcessingStage};
use crate::models::Document;

use super::{format_datetime, parse_datetime};

const DOCUMENT_COLUMNS: &str = "id, owner_id, name, file_path, mime_type, extracted_text, summary,
     word_count, page_count, ocr_confidence, suggested_category, status, processing_stage,
     error_message, created_at";

pub fn insert_document(conn: &Connection, doc: &Document) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO documents (id, owner_id, name, file_path, mime_type, extracted_text, summary,
         word_count, page_count, ocr_confidence, suggested_category, status, processing_stage,
         error_message, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            doc.id.to_string(),
            doc.owner_id,
            doc.name,
            doc.file_path,
            doc.mime_type,
            doc.extracted_text,
            doc.summary,
            doc.word_count,
            doc.page_count,
            doc.ocr_confidence,
            doc.suggested_category,
            doc.status.as_str(),
            doc.processing_stage.as_str(),
            doc.error_message,
            format_datetime(&doc.created_at),
        ],
    )?;
    replace_tags(conn, &doc.id, &doc.tags)?;
    Ok(())
}

pub fn get_document(conn: &Connection, id: &Uuid) -> Result<Option<Document>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1"
    ))?;

    let result = stmt.query_row(params![id.to_string()], row_to_document_row);

    match result {
        Ok(row) => Ok(Some(document_from_row(conn, row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Fetch a document only if it belongs to `owner_id`. A wrong owner looks
/// identical to a missing document.
pub fn get_document_owned(
    conn: &Connection,
    id: &Uuid,
    owner_id: i64,
) -> Result<Option<Document>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1 AND owner_id = ?2"
    ))?;

    let result = stmt.query_row(params![id.to_string(), owner_id], row_to_document_row);

    match result {
        Ok(row) => Ok(Some(document_from_row(conn, row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_documents_by_owner(
    conn: &Connection,
    owner_id: i64,
) -> Result<Vec<Document>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE owner_id = ?1 ORDER BY created_at DESC"
    ))?;

    let rows = stmt.query_map(params![owner_id], row_to_document_row)?;

    let mut docs = Vec::new();
    for row in rows {
        docs.push(document_from_row(conn, row?)?);
    }
    Ok(docs)
}

/// Keyword search over name, extracted text, and summary for documents
/// that actually have extracted text. Used by all-documents chat context.
pub fn search_documents_with_text(
    conn: &Connection,
    owner_id: i64,
    query: &str,
    limit: usize,
) -> Result<Vec<Document>, DatabaseError> {
    let term = format!("%{query}%");
    let mut stmt = conn.prepare(&format!(
        "SELECT {DOCUMENT_COLUMNS} FROM documents
         WHERE owner_id = ?1
           AND (extracted_text LIKE ?2 OR summary LIKE ?2 OR name LIKE ?2)
           AND extracted_text IS NOT NULL AND extracted_text != ''
         ORDER BY created_at DESC
         LIMIT ?3"
    ))?;

    let rows = stmt.query_map(params![owner_id, term, limit as i64], row_to_document_row)?;

    let mut docs = Vec::new();
    for row in rows {
        docs.push(document_from_row(conn, row?)?);
    }
    Ok(docs)
}

/// Advance lifecycle state. Errors if the document does not exist.
pub fn update_document_state(
    conn: &Connection,
    id: &Uuid,
    status: DocumentStatus,
    stage: ProcessingStage,
) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE documents SET status = ?2, processing_stage = ?3 WHERE id = ?1",
        params![id.to_string(), status.as_str(), stage.as_str()],
    )?;
    if rows == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Document".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Terminal failure: status = failed with a non-null error message.
pub fn mark_document_failed(
    conn: &Connection,
    id: &Uuid,
    error_message: &str,
) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE documents SET status = 'failed', error_message = ?2 WHERE id = ?1",
        params![id.to_string(), error_message],
    )?;
    if rows == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Document".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Persist extraction output. Writes only when `extracted_text` is still
/// NULL; the text is immutable once set. Returns whether a write happened.
pub fn store_extraction(
    conn: &Connection,
    id: &Uuid,
    text: &str,
    word_count: i64,
    page_count: i64,
    ocr_confidence: Option<f64>,
) -> Result<bool, DatabaseError> {
    let rows = conn.execute(
        "UPDATE documents SET extracted_text = ?2, word_count = ?3, page_count = ?4,
         ocr_confidence = ?5
         WHERE id = ?1 AND extracted_text IS NULL",
        params![id.to_string(), text, word_count, page_count, ocr_confidence],
    )?;
    Ok(rows > 0)
}

/// Persist classification + tagging results together.
pub fn store_analysis(
    conn: &Connection,
    id: &Uuid,
    suggested_category: Option<&str>,
    tags: &[String],
) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE documents SET suggested_category = ?2 WHERE id = ?1",
        params![id.to_string(), suggested_category],
    )?;
    if rows == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Document".into(),
            id: id.to_string(),
        });
    }
    replace_tags(conn, id, tags)?;
    Ok(())
}

pub fn delete_document(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    // document_tags cascades, chat_sessions.document_id is set NULL by FK.
    let rows = conn.execute(
        "DELETE FROM documents WHERE id = ?1",
        params![id.to_string()],
    )?;
    if rows == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Document".into(),
            id: id.to_string(),
        });
    }
    tracing::info!(document_id = %id, "Document deleted");
    Ok(())
}

fn replace_tags(conn: &Connection, id: &Uuid, tags: &[String]) -> Result<(), DatabaseError> {
    conn.execute(
        "DELETE FROM document_tags WHERE document_id = ?1",
        params![id.to_string()],
    )?;
    for (position, tag) in tags.iter().enumerate() {
        conn.execute(
            "INSERT INTO document_tags (document_id, position, tag) VALUES (?1, ?2, ?3)",
            params![id.to_string(), position as i64, tag],
        )?;
    }
    Ok(())
}

fn get_tags(conn: &Connection, id: &Uuid) -> Result<Vec<String>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT tag FROM document_tags WHERE document_id = ?1 ORDER BY position ASC",
    )?;
    let rows = stmt.query_map(params![id.to_string()], |row| row.get::<_, String>(0))?;

    let mut tags = Vec::new();
    for row in rows {
        tags.push(row?);
    }
    Ok(tags)
}

// Internal row type for Document mapping
struct DocumentRow {
    id: String,
    owner_id: i64,
    name: String,
    file_path: String,
    mime_type: String,
    extracted_text: Option<String>,
    summary: Option<String>,
    word_count: Option<i64>,
    page_count: Option<i64>,
    ocr_confidence: Option<f64>,
    suggested_category: Option<String>,
    status: String,
    processing_stage: String,
    error_message: Option<String>,
    created_at: String,
}

fn row_to_document_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DocumentRow> {
    Ok(DocumentRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        file_path: row.get(3)?,
        mime_type: row.get(4)?,
        extracted_text: row.get(5)?,
        summary: row.get(6)?,
        word_count: row.get(7)?,
        page_count: row.get(8)?,
        ocr_confidence: row.get(9)?,
        suggested_category: row.get(10)?,
        status: row.get(11)?,
        processing_stage: row.get(12)?,
        error_message: row.get(13)?,
        created_at: row.get(14)?,
    })
}

fn document_from_row(conn: &Connection, row: DocumentRow) -> Result<Document, DatabaseError> {
    let id = Uuid::parse_str(&row.id)
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?;
    let tags = get_tags(conn, &id)?;

    Ok(Document {
        id,
        owner_id: row.owner_id,
        name: row.name,
        file_path: row.file_path,
        mime_type: row.mime_type,
        extracted_text: row.extracted_text,
        summary: row.summary,
        word_count: row.word_count,
        page_count: row.page_count,
        ocr_confidence: row.ocr_confidence,
        suggested_category: row.suggested_category,
        tags,
        status: DocumentStatus::from_str(&row.status)?,
        processing_stage: ProcessingStage::from_str(&row.processing_stage)?,
        error_message: row.error_message,
        created_at: parse_datetime(&row.created_at),
    })
}
