use std::str::FromStr;

use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::MessageRole;
use crate::models::{ChatMessage, ChatSession, MessageMetadata};

use super::{format_datetime, parse_datetime};

pub fn insert_session(conn: &Connection, session: &ChatSession) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO chat_sessions (id, owner_id, document_id, name, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            session.id.to_string(),
            session.owner_id,
            session.document_id.map(|id| id.to_string()),
            session.name,
            format_datetime(&session.created_at),
            format_datetime(&session.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_session(conn: &Connection, id: &Uuid) -> Result<Option<ChatSession>, DatabaseError> {
    let result = conn.query_row(
        "SELECT id, owner_id, document_id, name, created_at, updated_at
         FROM chat_sessions WHERE id = ?1",
        params![id.to_string()],
        row_to_session,
    );

    match result {
        Ok(session) => Ok(Some(session)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_sessions_by_owner(
    conn: &Connection,
    owner_id: i64,
) -> Result<Vec<ChatSession>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, owner_id, document_id, name, created_at, updated_at
         FROM chat_sessions WHERE owner_id = ?1 ORDER BY updated_at DESC",
    )?;

    let rows = stmt.query_map(params![owner_id], row_to_session)?;

    let mut sessions = Vec::new();
    for row in rows {
        sessions.push(row?);
    }
    Ok(sessions)
}

pub fn rename_session(conn: &Connection, id: &Uuid, name: &str) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE chat_sessions SET name = ?2 WHERE id = ?1",
        params![id.to_string(), name],
    )?;
    if rows == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "ChatSession".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Bump `updated_at` so the session sorts to the top of the list.
pub fn touch_session(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE chat_sessions SET updated_at = ?2 WHERE id = ?1",
        params![
            id.to_string(),
            format_datetime(&chrono::Local::now().naive_local()),
        ],
    )?;
    Ok(())
}

/// Delete a session; messages cascade.
pub fn delete_session(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "DELETE FROM chat_sessions WHERE id = ?1",
        params![id.to_string()],
    )?;
    if rows == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "ChatSession".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

pub fn insert_message(conn: &Connection, msg: &ChatMessage) -> Result<(), DatabaseError> {
    let metadata_json = msg
        .metadata
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?;

    conn.execute(
        "INSERT INTO chat_messages (id, session_id, role, content, metadata, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            msg.id.to_string(),
            msg.session_id.to_string(),
            msg.role.as_str(),
            msg.content,
            metadata_json,
            format_datetime(&msg.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_messages_by_session(
    conn: &Connection,
    session_id: &Uuid,
) -> Result<Vec<ChatMessage>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, session_id, role, content, metadata, created_at
         FROM chat_messages WHERE session_id = ?1 ORDER BY created_at ASC",
    )?;

    let rows = stmt.query_map(params![session_id.to_string()], |row| {
        Ok(MessageRow {
            id: row.get(0)?,
            session_id: row.get(1)?,
            role: row.get(2)?,
            content: row.get(3)?,
            metadata: row.get(4)?,
            created_at: row.get(5)?,
        })
    })?;

    let mut messages = Vec::new();
    for row in rows {
        messages.push(message_from_row(row?)?);
    }
    Ok(messages)
}

/// Content of the newest message in a session, for list previews.
pub fn get_last_message_content(
    conn: &Connection,
    session_id: &Uuid,
) -> Result<Option<String>, DatabaseError> {
    let result = conn.query_row(
        "SELECT content FROM chat_messages WHERE session_id = ?1
         ORDER BY created_at DESC LIMIT 1",
        params![session_id.to_string()],
        |row| row.get::<_, String>(0),
    );

    match result {
        Ok(content) => Ok(Some(content)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn count_messages(conn: &Connection, session_id: &Uuid) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM chat_messages WHERE session_id = ?1",
        params![session_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}

struct MessageRow {
    id: String,
    session_id: String,
    role: String,
    content: String,
    metadata: Option<String>,
    created_at: String,
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatSession> {
    let id_str: String = row.get(0)?;
    let document_id: Option<String> = row.get(2)?;
    let created_at: String = row.get(4)?;
    let updated_at: String = row.get(5)?;

    Ok(ChatSession {
        id: Uuid::parse_str(&id_str).unwrap_or_default(),
        owner_id: row.get(1)?,
        document_id: document_id.and_then(|s| Uuid::parse_str(&s).ok()),
        name: row.get(3)?,
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
    })
}

fn message_from_row(row: MessageRow) -> Result<ChatMessage, DatabaseError> {
    let metadata = row
        .metadata
        .as_deref()
        .map(serde_json::from_str::<MessageMetadata>)
        .transpose()
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?;

    Ok(ChatMessage {
        id: Uuid::parse_str(&row.id)
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        session_id: Uuid::parse_str(&row.session_id)
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        role: MessageRole::from_str(&row.role)?,
        content: row.content,
        metadata,
        created_at: parse_datetime(&row.created_at),
    })
}
