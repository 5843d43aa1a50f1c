// ─────────────────────────────────────────────
// HTTP surface: documents + chat over axum
// ─────────────────────────────────────────────

pub mod chat;
pub mod documents;
pub mod error;

use std::path::PathBuf;
use std::sync::Arc;

use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::pipeline::processor::IngestionDeps;

use self::error::ApiError;

/// Shared state for every handler. Connections are opened per request on a
/// blocking thread; only the path travels in the state.
#[derive(Clone)]
pub struct AppState {
    pub db_path: PathBuf,
    /// Where uploaded files are stored.
    pub storage_dir: PathBuf,
    pub deps: Arc<IngestionDeps>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/documents", post(documents::upload).get(documents::list))
        .route("/documents/:id", axum::routing::delete(documents::remove))
        .route("/documents/:id/process", post(documents::process))
        .route("/documents/:id/status", get(documents::status))
        .route("/chat/sessions", post(chat::create).get(chat::list))
        .route(
            "/chat/sessions/:id",
            get(chat::get_with_messages)
                .patch(chat::rename)
                .delete(chat::remove),
        )
        .route("/chat/sessions/:id/messages", post(chat::send_message))
        .route("/chat/sessions/:id/stream", post(chat::stream_message))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Resolve the request owner from the `X-User-Id` header.
/// Authentication itself is handled upstream; this service only scopes data.
pub(crate) fn owner_from_headers(headers: &HeaderMap) -> Result<i64, ApiError> {
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<i64>().ok())
        .ok_or_else(|| ApiError::bad_request("Missing or invalid X-User-Id header"))
}

/// Run `f` with a fresh connection on the blocking pool.
pub(crate) async fn with_connection<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&rusqlite::Connection) -> Result<T, ApiError> + Send + 'static,
{
    let db_path = state.db_path.clone();
    tokio::task::spawn_blocking(move || {
        let conn = crate::db::sqlite::open_database(&db_path)?;
        f(&conn)
    })
    .await
    .map_err(|e| ApiError::internal(format!("Worker task failed: {e}")))?
}
