use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::MessageRole;

/// A chat session. `document_id` binds the session to one document;
/// None means "query across all of the owner's documents". The reference
/// is weak: deleting the document clears it, it does not cascade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: Uuid,
    pub owner_id: i64,
    pub document_id: Option<Uuid>,
    pub name: Option<String>,
    pub created_at: NaiveDateTime,
    /// Bumped on every new message.
    pub updated_at: NaiveDateTime,
}

/// One message within a session. Messages are strictly ordered by
/// `created_at`; a streamed assistant message is only persisted once
/// the stream finalizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub metadata: Option<MessageMetadata>,
    pub created_at: NaiveDateTime,
}

/// Structured payload attached to assistant messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Attribution entry: a document whose text contributed to a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub document_id: Uuid,
    pub document_name: String,
}

impl ChatMessage {
    pub fn user(session_id: Uuid, content: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            role: MessageRole::User,
            content: content.to_string(),
            metadata: None,
            created_at: chrono::Local::now().naive_local(),
        }
    }

    pub fn assistant(session_id: Uuid, content: &str, metadata: Option<MessageMetadata>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            role: MessageRole::Assistant,
            content: content.to_string(),
            metadata,
            created_at: chrono::Local::now().naive_local(),
        }
    }
}
