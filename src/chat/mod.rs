// ─────────────────────────────────────────────
// Conversational subsystem: context → route → generate
// ─────────────────────────────────────────────

pub mod context;
pub mod engine;
pub mod router;
pub mod sessions;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::SourceRef;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Model error: {0}")]
    Llm(#[from] crate::pipeline::ollama::LlmError),

    #[error("Chat session not found: {0}")]
    SessionNotFound(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Message must not be empty")]
    EmptyMessage,
}

/// Wire protocol for a streamed assistant turn.
///
/// Exactly one `Start`, zero or more `Chunk`s, then a single terminal
/// `Done` or `Error`. The concatenated chunk contents equal `full_response`
/// on the `Done` event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatStreamEvent {
    Start {
        #[serde(rename = "userMessageId")]
        user_message_id: Uuid,
        sources: Vec<SourceRef>,
    },
    Chunk {
        content: String,
    },
    Done {
        #[serde(rename = "assistantMessageId")]
        assistant_message_id: Uuid,
        #[serde(rename = "fullResponse")]
        full_response: String,
        sources: Vec<SourceRef>,
    },
    Error {
        error: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_events_serialize_with_type_tag() {
        let event = ChatStreamEvent::Chunk {
            content: "hello".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "chunk");
        assert_eq!(json["content"], "hello");
    }

    #[test]
    fn done_event_uses_camel_case_fields() {
        let event = ChatStreamEvent::Done {
            assistant_message_id: Uuid::nil(),
            full_response: "answer".into(),
            sources: vec![],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "done");
        assert!(json.get("assistantMessageId").is_some());
        assert!(json.get("fullResponse").is_some());
    }
}
