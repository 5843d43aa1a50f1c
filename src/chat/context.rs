//! Context assembly for chat turns.
//!
//! A session bound to one document gets that document's text, capped. An
//! unbound session gets keyword-matched snippets from across the owner's
//! library. Every document whose text lands in the context is listed as a
//! source, so answers stay attributable.

use rusqlite::Connection;
use tracing::debug;
use uuid::Uuid;

use crate::db::repository;
use crate::models::{Document, SourceRef};

use super::ChatError;

/// Character cap for single-document context.
const SINGLE_DOC_CONTEXT_CHARS: usize = 4000;
/// Per-document snippet cap in multi-document context.
const MULTI_DOC_SNIPPET_CHARS: usize = 1500;
/// At most this many documents contribute to multi-document context.
const MULTI_DOC_LIMIT: usize = 3;

const TRUNCATION_NOTICE: &str = "...\n[Text truncated due to length]";

#[derive(Debug, Clone)]
pub struct AssembledContext {
    pub text: String,
    pub sources: Vec<SourceRef>,
    pub multi_document: bool,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Build the document context for one chat turn.
pub fn assemble_context(
    conn: &Connection,
    owner_id: i64,
    query: &str,
    document_id: Option<&Uuid>,
) -> Result<AssembledContext, ChatError> {
    match document_id {
        Some(id) => single_document_context(conn, owner_id, id),
        None => multi_document_context(conn, owner_id, query),
    }
}

fn single_document_context(
    conn: &Connection,
    owner_id: i64,
    document_id: &Uuid,
) -> Result<AssembledContext, ChatError> {
    let doc = repository::get_document_owned(conn, document_id, owner_id)?
        .ok_or_else(|| ChatError::DocumentNotFound(document_id.to_string()))?;

    let text = doc
        .usable_text()
        .map(|t| cap_text(t, SINGLE_DOC_CONTEXT_CHARS))
        .unwrap_or_default();

    debug!(
        document_id = %document_id,
        context_chars = text.chars().count(),
        "Assembled single-document context"
    );

    Ok(AssembledContext {
        text,
        sources: vec![source_ref(&doc)],
        multi_document: false,
    })
}

fn multi_document_context(
    conn: &Connection,
    owner_id: i64,
    query: &str,
) -> Result<AssembledContext, ChatError> {
    let docs = repository::search_documents_with_text(conn, owner_id, query, MULTI_DOC_LIMIT)?;

    let mut text = String::new();
    let mut sources = Vec::new();
    for doc in &docs {
        let Some(doc_text) = doc.usable_text() else {
            continue;
        };
        let snippet = cap_text(doc_text, MULTI_DOC_SNIPPET_CHARS);
        text.push_str(&format!(
            "Document: {} (ID: {})\nContent: {}\n\n",
            doc.name, doc.id, snippet
        ));
        sources.push(source_ref(doc));
    }

    debug!(
        matched = sources.len(),
        context_chars = text.chars().count(),
        "Assembled multi-document context"
    );

    Ok(AssembledContext {
        text,
        sources,
        multi_document: true,
    })
}

fn source_ref(doc: &Document) -> SourceRef {
    SourceRef {
        document_id: doc.id,
        document_name: doc.name.clone(),
    }
}

fn cap_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let capped: String = text.chars().take(max_chars).collect();
    format!("{capped}{TRUNCATION_NOTICE}")
}
