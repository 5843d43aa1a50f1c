//! Chat session lifecycle: create, list, rename, delete.
//!
//! Every operation is owner-scoped; a session belonging to someone else is
//! indistinguishable from one that does not exist.

use rusqlite::Connection;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::db::repository;
use crate::models::{ChatMessage, ChatSession};

use super::ChatError;

const DEFAULT_SESSION_NAME: &str = "New Chat Session";

/// A session plus the bits the session list shows.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    #[serde(flatten)]
    pub session: ChatSession,
    pub message_count: i64,
    pub last_message: Option<String>,
}

/// Create a session, optionally bound to one document.
///
/// Without an explicit name, a document-bound session is named after its
/// document ("Chat: lease.pdf"), an unbound one gets the generic default.
pub fn create_session(
    conn: &Connection,
    owner_id: i64,
    document_id: Option<Uuid>,
    name: Option<String>,
) -> Result<ChatSession, ChatError> {
    let bound_doc = match document_id {
        Some(id) => Some(
            repository::get_document_owned(conn, &id, owner_id)?
                .ok_or_else(|| ChatError::DocumentNotFound(id.to_string()))?,
        ),
        None => None,
    };

    let name = name.filter(|n| !n.trim().is_empty()).unwrap_or_else(|| {
        bound_doc
            .as_ref()
            .map(|doc| format!("Chat: {}", doc.name))
            .unwrap_or_else(|| DEFAULT_SESSION_NAME.to_string())
    });

    let now = chrono::Local::now().naive_local();
    let session = ChatSession {
        id: Uuid::new_v4(),
        owner_id,
        document_id,
        name: Some(name),
        created_at: now,
        updated_at: now,
    };
    repository::insert_session(conn, &session)?;

    info!(
        session_id = %session.id,
        document_bound = session.document_id.is_some(),
        "Chat session created"
    );
    Ok(session)
}

pub fn get_session_owned(
    conn: &Connection,
    owner_id: i64,
    session_id: &Uuid,
) -> Result<ChatSession, ChatError> {
    repository::get_session(conn, session_id)?
        .filter(|s| s.owner_id == owner_id)
        .ok_or_else(|| ChatError::SessionNotFound(session_id.to_string()))
}

/// Sessions newest-activity-first, with message counts and a preview line.
pub fn list_sessions(conn: &Connection, owner_id: i64) -> Result<Vec<SessionSummary>, ChatError> {
    let sessions = repository::list_sessions_by_owner(conn, owner_id)?;

    let mut summaries = Vec::with_capacity(sessions.len());
    for session in sessions {
        let message_count = repository::count_messages(conn, &session.id)?;
        let last_message = repository::get_last_message_content(conn, &session.id)?;
        summaries.push(SessionSummary {
            session,
            message_count,
            last_message,
        });
    }
    Ok(summaries)
}

pub fn rename_session(
    conn: &Connection,
    owner_id: i64,
    session_id: &Uuid,
    name: &str,
) -> Result<ChatSession, ChatError> {
    get_session_owned(conn, owner_id, session_id)?;
    repository::rename_session(conn, session_id, name)?;
    get_session_owned(conn, owner_id, session_id)
}

pub fn delete_session(
    conn: &Connection,
    owner_id: i64,
    session_id: &Uuid,
) -> Result<(), ChatError> {
    get_session_owned(conn, owner_id, session_id)?;
    repository::delete_session(conn, session_id)?;
    info!(session_id = %session_id, "Chat session deleted");
    Ok(())
}

pub fn get_messages(
    conn: &Connection,
    owner_id: i64,
    session_id: &Uuid,
) -> Result<Vec<ChatMessage>, ChatError> {
    get_session_owned(conn, owner_id, session_id)?;
    Ok(repository::get_messages_by_session(conn, session_id)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::models::Document;

    #[test]
    fn document_bound_session_is_auto_named() {
        let conn = open_memory_database().unwrap();
        let doc = Document::new_upload(1, "lease.pdf", "/tmp/lease.pdf", "application/pdf");
        repository::insert_document(&conn, &doc).unwrap();

        let session = create_session(&conn, 1, Some(doc.id), None).unwrap();
        assert_eq!(session.name.as_deref(), Some("Chat: lease.pdf"));
        assert_eq!(session.document_id, Some(doc.id));
    }

    #[test]
    fn unbound_session_gets_default_name() {
        let conn = open_memory_database().unwrap();
        let session = create_session(&conn, 1, None, None).unwrap();
        assert_eq!(session.name.as_deref(), Some("New Chat Session"));
    }

    #[test]
    fn explicit_name_wins() {
        let conn = open_memory_database().unwrap();
        let session = create_session(&conn, 1, None, Some("Tax research".into())).unwrap();
        assert_eq!(session.name.as_deref(), Some("Tax research"));
    }

    #[test]
    fn blank_explicit_name_falls_back() {
        let conn = open_memory_database().unwrap();
        let session = create_session(&conn, 1, None, Some("   ".into())).unwrap();
        assert_eq!(session.name.as_deref(), Some("New Chat Session"));
    }

    #[test]
    fn binding_to_foreign_document_fails() {
        let conn = open_memory_database().unwrap();
        let doc = Document::new_upload(2, "private.pdf", "/tmp/p.pdf", "application/pdf");
        repository::insert_document(&conn, &doc).unwrap();

        let result = create_session(&conn, 1, Some(doc.id), None);
        assert!(matches!(result, Err(ChatError::DocumentNotFound(_))));
    }

    #[test]
    fn foreign_session_is_invisible() {
        let conn = open_memory_database().unwrap();
        let session = create_session(&conn, 1, None, None).unwrap();

        assert!(matches!(
            get_session_owned(&conn, 2, &session.id),
            Err(ChatError::SessionNotFound(_))
        ));
        assert!(matches!(
            delete_session(&conn, 2, &session.id),
            Err(ChatError::SessionNotFound(_))
        ));
        assert!(matches!(
            rename_session(&conn, 2, &session.id, "stolen"),
            Err(ChatError::SessionNotFound(_))
        ));
    }

    #[test]
    fn list_includes_counts_and_preview() {
        let conn = open_memory_database().unwrap();
        let session = create_session(&conn, 1, None, None).unwrap();
        repository::insert_message(&conn, &ChatMessage::user(session.id, "question")).unwrap();
        repository::insert_message(&conn, &ChatMessage::assistant(session.id, "answer", None))
            .unwrap();

        let list = list_sessions(&conn, 1).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].message_count, 2);
        assert_eq!(list[0].last_message.as_deref(), Some("answer"));
    }

    #[test]
    fn rename_round_trips() {
        let conn = open_memory_database().unwrap();
        let session = create_session(&conn, 1, None, None).unwrap();

        let renamed = rename_session(&conn, 1, &session.id, "Renamed").unwrap();
        assert_eq!(renamed.name.as_deref(), Some("Renamed"));
    }
}
