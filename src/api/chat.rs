use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use crate::chat::engine::ConversationEngine;
use crate::chat::{sessions, ChatStreamEvent};
use crate::db::sqlite::open_database;
use crate::models::{ChatMessage, ChatSession};

use super::error::ApiError;
use super::{owner_from_headers, with_connection, AppState};

#[derive(Deserialize, Default)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub document_id: Option<Uuid>,
    #[serde(default)]
    pub name: Option<String>,
}

pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<ChatSession>), ApiError> {
    let owner_id = owner_from_headers(&headers)?;
    let session = with_connection(&state, move |conn| {
        Ok(sessions::create_session(
            conn,
            owner_id,
            req.document_id,
            req.name,
        )?)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

pub async fn list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<sessions::SessionSummary>>, ApiError> {
    let owner_id = owner_from_headers(&headers)?;
    let summaries =
        with_connection(&state, move |conn| Ok(sessions::list_sessions(conn, owner_id)?)).await?;
    Ok(Json(summaries))
}

#[derive(Serialize)]
pub struct SessionWithMessages {
    #[serde(flatten)]
    pub session: ChatSession,
    pub messages: Vec<ChatMessage>,
}

pub async fn get_with_messages(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionWithMessages>, ApiError> {
    let owner_id = owner_from_headers(&headers)?;
    let result = with_connection(&state, move |conn| {
        let session = sessions::get_session_owned(conn, owner_id, &id)?;
        let messages = sessions::get_messages(conn, owner_id, &id)?;
        Ok(SessionWithMessages { session, messages })
    })
    .await?;
    Ok(Json(result))
}

#[derive(Deserialize)]
pub struct RenameRequest {
    pub name: String,
}

pub async fn rename(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<RenameRequest>,
) -> Result<Json<ChatSession>, ApiError> {
    let owner_id = owner_from_headers(&headers)?;
    if req.name.trim().is_empty() {
        return Err(ApiError::bad_request("Session name must not be empty"));
    }
    let session = with_connection(&state, move |conn| {
        Ok(sessions::rename_session(conn, owner_id, &id, req.name.trim())?)
    })
    .await?;
    Ok(Json(session))
}

pub async fn remove(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let owner_id = owner_from_headers(&headers)?;
    with_connection(&state, move |conn| {
        Ok(sessions::delete_session(conn, owner_id, &id)?)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub message: String,
    /// Ask about this document instead of the session's bound one.
    #[serde(default)]
    pub document_id: Option<Uuid>,
}

#[derive(Serialize)]
pub struct SendMessageResponse {
    #[serde(rename = "userMessage")]
    pub user_message: ChatMessage,
    #[serde(rename = "assistantMessage")]
    pub assistant_message: ChatMessage,
}

/// Non-streaming send: blocks until the full assistant reply exists.
pub async fn send_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, ApiError> {
    let owner_id = owner_from_headers(&headers)?;
    let deps = state.deps.clone();

    let turn = with_connection(&state, move |conn| {
        let engine = ConversationEngine::new(deps.llm.as_ref());
        Ok(engine.send(conn, owner_id, &id, &req.message, req.document_id)?)
    })
    .await?;

    Ok(Json(SendMessageResponse {
        user_message: turn.user_message,
        assistant_message: turn.assistant_message,
    }))
}

/// Streaming send. Each event goes out as one `data: {json}` line in an
/// event-stream body; errors after the stream starts become terminal
/// `error` events rather than HTTP status codes.
pub async fn stream_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Response, ApiError> {
    let owner_id = owner_from_headers(&headers)?;

    let (event_tx, event_rx) = tokio::sync::mpsc::unbounded_channel::<ChatStreamEvent>();
    let db_path = state.db_path.clone();
    let deps = state.deps.clone();
    let message = req.message;
    let document_id = req.document_id;

    tokio::task::spawn_blocking(move || {
        let conn = match open_database(&db_path) {
            Ok(conn) => conn,
            Err(e) => {
                error!(error = %e, "Stream worker could not open database");
                let _ = event_tx.send(ChatStreamEvent::Error {
                    error: "Service temporarily unavailable".into(),
                });
                return;
            }
        };

        // Bridge the engine's std channel onto the async response channel.
        let (tx, rx) = std::sync::mpsc::channel::<ChatStreamEvent>();
        let pump_tx = event_tx.clone();
        let pump = std::thread::spawn(move || {
            for event in rx {
                if pump_tx.send(event).is_err() {
                    break;
                }
            }
        });

        let engine = ConversationEngine::new(deps.llm.as_ref());
        if let Err(e) = engine.stream(&conn, owner_id, &id, &message, document_id, tx) {
            let _ = event_tx.send(ChatStreamEvent::Error {
                error: e.to_string(),
            });
        }
        let _ = pump.join();
    });

    let stream = futures_util::stream::unfold(event_rx, |mut rx| async move {
        let event = rx.recv().await?;
        let json = serde_json::to_string(&event)
            .unwrap_or_else(|_| r#"{"type":"error","error":"event serialization failed"}"#.into());
        Some((
            Ok::<_, std::convert::Infallible>(Bytes::from(format!("data: {json}\n\n"))),
            rx,
        ))
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(stream))
        .map_err(|e| ApiError::internal(format!("Response build failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_response_uses_camel_case_keys() {
        let session_id = Uuid::new_v4();
        let response = SendMessageResponse {
            user_message: ChatMessage::user(session_id, "q"),
            assistant_message: ChatMessage::assistant(session_id, "a", None),
        };
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("userMessage").is_some());
        assert!(json.get("assistantMessage").is_some());
    }

    #[test]
    fn create_request_tolerates_empty_body_object() {
        let req: CreateSessionRequest = serde_json::from_str("{}").unwrap();
        assert!(req.document_id.is_none());
        assert!(req.name.is_none());
    }

    #[test]
    fn send_request_accepts_optional_document_id() {
        let req: SendMessageRequest = serde_json::from_str(r#"{"message": "hi"}"#).unwrap();
        assert!(req.document_id.is_none());

        let id = Uuid::new_v4();
        let req: SendMessageRequest =
            serde_json::from_str(&format!(r#"{{"message": "hi", "document_id": "{id}"}}"#))
                .unwrap();
        assert_eq!(req.document_id, Some(id));
    }
}
