pub mod chat;
pub mod document;
pub mod enums;

pub use chat::{ChatMessage, ChatSession, MessageMetadata, SourceRef};
pub use document::Document;
pub use enums::{DocumentStatus, MessageRole, ProcessingStage};
