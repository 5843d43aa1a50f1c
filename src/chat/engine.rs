//! The conversation engine: one user turn in, one assistant turn out.
//!
//! Ordering guarantees: the user message is persisted before any generation
//! starts, so a model failure never loses what the user typed. The
//! assistant message is persisted only once its full text is known.

use rusqlite::Connection;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::repository;
use crate::models::{ChatMessage, ChatSession, MessageMetadata};
use crate::pipeline::ollama::LlmClient;

use super::context::{assemble_context, AssembledContext};
use super::router::{classify_complexity, TierTable};
use super::sessions::get_session_owned;
use super::{ChatError, ChatStreamEvent};

/// How many prior messages accompany each turn.
const HISTORY_MESSAGES: usize = 6;

const SYSTEM_PROMPT: &str = "You are a helpful assistant that answers questions about the \
user's documents. Ground your answers in the provided document content and say so when the \
documents do not contain the answer.";

const NO_TEXT_GUIDANCE: &str = "I can't read any text from this document. It may be a scanned \
image that didn't OCR cleanly, or an empty file. You could try re-uploading it at a higher \
resolution, or paste the relevant text directly into the chat.";

const GENERATION_FAILED: &str = "I couldn't generate a response. Please check that the local \
model service is running and try again.";

/// A completed non-streaming turn.
#[derive(Debug)]
pub struct ChatTurn {
    pub user_message: ChatMessage,
    pub assistant_message: ChatMessage,
}

pub struct ConversationEngine<'a> {
    llm: &'a dyn LlmClient,
    tiers: TierTable,
}

struct TurnSetup {
    session: ChatSession,
    /// Request override when given, else the session binding.
    target_document: Option<Uuid>,
    context: AssembledContext,
    history: Vec<ChatMessage>,
    user_message: ChatMessage,
}

impl<'a> ConversationEngine<'a> {
    pub fn new(llm: &'a dyn LlmClient) -> Self {
        Self {
            llm,
            tiers: TierTable::default(),
        }
    }

    pub fn with_tiers(mut self, tiers: TierTable) -> Self {
        self.tiers = tiers;
        self
    }

    /// Validate, assemble context, capture history, persist the user turn.
    /// The request's document override wins over the session binding when
    /// both exist. History is read before the insert so the new message is
    /// not its own conversation history.
    fn prepare(
        &self,
        conn: &Connection,
        owner_id: i64,
        session_id: &Uuid,
        message: &str,
        document_override: Option<Uuid>,
    ) -> Result<TurnSetup, ChatError> {
        if message.trim().is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let session = get_session_owned(conn, owner_id, session_id)?;
        let target_document = document_override.or(session.document_id);
        let context = assemble_context(conn, owner_id, message, target_document.as_ref())?;

        let all_messages = repository::get_messages_by_session(conn, session_id)?;
        let history = recent_history(all_messages, HISTORY_MESSAGES);

        let user_message = ChatMessage::user(*session_id, message);
        repository::insert_message(conn, &user_message)?;

        Ok(TurnSetup {
            session,
            target_document,
            context,
            history,
            user_message,
        })
    }

    fn generate_answer(&self, setup: &TurnSetup, message: &str) -> Result<String, ChatError> {
        let tier = classify_complexity(
            message,
            setup.context.text.chars().count(),
            setup.context.multi_document,
        );
        let available = self.llm.list_models().unwrap_or_default();
        let (selected, profile) = self.tiers.route(tier, &available);

        info!(
            session_id = %setup.session.id,
            tier = selected.as_str(),
            model = %profile.model,
            "Routing chat turn"
        );

        let (system, prompt) = build_prompt(&setup.context, &setup.history, message);
        Ok(self
            .llm
            .generate(&profile.model, &system, &prompt, &profile.generate_options())?)
    }

    /// Non-streaming turn. Generation failure still produces an assistant
    /// message, carrying the error in its metadata.
    pub fn send(
        &self,
        conn: &Connection,
        owner_id: i64,
        session_id: &Uuid,
        message: &str,
        document_id: Option<Uuid>,
    ) -> Result<ChatTurn, ChatError> {
        let setup = self.prepare(conn, owner_id, session_id, message, document_id)?;

        let assistant_message = if document_has_no_text(&setup) {
            self.canned_no_text_message(&setup)
        } else {
            match self.generate_answer(&setup, message) {
                Ok(text) => ChatMessage::assistant(
                    *session_id,
                    &text,
                    Some(MessageMetadata {
                        sources: setup.context.sources.clone(),
                        error: None,
                    }),
                ),
                Err(e) => {
                    warn!(session_id = %session_id, error = %e, "Generation failed");
                    ChatMessage::assistant(
                        *session_id,
                        GENERATION_FAILED,
                        Some(MessageMetadata {
                            sources: setup.context.sources.clone(),
                            error: Some(e.to_string()),
                        }),
                    )
                }
            }
        };

        repository::insert_message(conn, &assistant_message)?;
        repository::touch_session(conn, session_id)?;

        Ok(ChatTurn {
            user_message: setup.user_message,
            assistant_message,
        })
    }

    /// Streaming turn following the start / chunk* / (done | error) protocol.
    ///
    /// On generation failure a terminal `Error` event is emitted and no
    /// assistant message is persisted; the user message always survives.
    pub fn stream(
        &self,
        conn: &Connection,
        owner_id: i64,
        session_id: &Uuid,
        message: &str,
        document_id: Option<Uuid>,
        events: std::sync::mpsc::Sender<ChatStreamEvent>,
    ) -> Result<(), ChatError> {
        let setup = self.prepare(conn, owner_id, session_id, message, document_id)?;

        let _ = events.send(ChatStreamEvent::Start {
            user_message_id: setup.user_message.id,
            sources: setup.context.sources.clone(),
        });

        if document_has_no_text(&setup) {
            let assistant = self.canned_no_text_message(&setup);
            let _ = events.send(ChatStreamEvent::Chunk {
                content: NO_TEXT_GUIDANCE.to_string(),
            });
            repository::insert_message(conn, &assistant)?;
            repository::touch_session(conn, session_id)?;
            let _ = events.send(ChatStreamEvent::Done {
                assistant_message_id: assistant.id,
                full_response: NO_TEXT_GUIDANCE.to_string(),
                sources: setup.context.sources,
            });
            return Ok(());
        }

        let tier = classify_complexity(
            message,
            setup.context.text.chars().count(),
            setup.context.multi_document,
        );
        let available = self.llm.list_models().unwrap_or_default();
        let (selected, profile) = self.tiers.route(tier, &available);
        info!(
            session_id = %session_id,
            tier = selected.as_str(),
            model = %profile.model,
            "Routing streamed chat turn"
        );

        let (system, prompt) = build_prompt(&setup.context, &setup.history, message);

        // Forward raw tokens as chunk events while generation blocks.
        // Reports whether the event receiver went away mid-stream.
        let (token_tx, token_rx) = std::sync::mpsc::channel::<String>();
        let chunk_events = events.clone();
        let forwarder = std::thread::spawn(move || {
            let mut receiver_gone = false;
            for token in token_rx {
                if receiver_gone {
                    continue;
                }
                if chunk_events
                    .send(ChatStreamEvent::Chunk { content: token })
                    .is_err()
                {
                    receiver_gone = true;
                }
            }
            receiver_gone
        });

        let result = self.llm.generate_streaming(
            &profile.model,
            &system,
            &prompt,
            &profile.generate_options(),
            token_tx,
        );
        // Token sender is dropped by now; wait until every chunk is out
        // before the terminal event.
        let client_disconnected = forwarder.join().unwrap_or(false);

        // An interrupted turn never gets an assistant message; the user
        // message already persisted stands on its own.
        if client_disconnected {
            warn!(session_id = %session_id, "Client disconnected mid-stream, discarding response");
            return Ok(());
        }

        match result {
            Ok(full_response) => {
                let assistant = ChatMessage::assistant(
                    *session_id,
                    &full_response,
                    Some(MessageMetadata {
                        sources: setup.context.sources.clone(),
                        error: None,
                    }),
                );
                repository::insert_message(conn, &assistant)?;
                repository::touch_session(conn, session_id)?;
                let _ = events.send(ChatStreamEvent::Done {
                    assistant_message_id: assistant.id,
                    full_response,
                    sources: setup.context.sources,
                });
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Streamed generation failed");
                let _ = events.send(ChatStreamEvent::Error {
                    error: e.to_string(),
                });
            }
        }

        Ok(())
    }

    fn canned_no_text_message(&self, setup: &TurnSetup) -> ChatMessage {
        ChatMessage::assistant(
            setup.session.id,
            NO_TEXT_GUIDANCE,
            Some(MessageMetadata {
                sources: setup.context.sources.clone(),
                error: Some("document has no extractable text".to_string()),
            }),
        )
    }
}

/// A turn targeting a document that yielded no text gets a guidance turn
/// instead of a generation attempt.
fn document_has_no_text(setup: &TurnSetup) -> bool {
    setup.target_document.is_some() && setup.context.is_empty()
}

fn recent_history(mut messages: Vec<ChatMessage>, limit: usize) -> Vec<ChatMessage> {
    if messages.len() > limit {
        messages.split_off(messages.len() - limit)
    } else {
        messages
    }
}

fn build_prompt(
    context: &AssembledContext,
    history: &[ChatMessage],
    message: &str,
) -> (String, String) {
    let system = if context.is_empty() {
        SYSTEM_PROMPT.to_string()
    } else {
        format!(
            "{SYSTEM_PROMPT}\n\nDocument content:\n{}",
            context.text.trim_end()
        )
    };

    let mut prompt = String::new();
    for msg in history {
        let speaker = match msg.role {
            crate::models::enums::MessageRole::User => "User",
            _ => "Assistant",
        };
        prompt.push_str(&format!("{speaker}: {}\n", msg.content));
    }
    prompt.push_str(&format!("User: {message}\nAssistant:"));

    (system, prompt)
}
