use std::sync::Arc;

use tracing::info;

use docmind::api::{build_router, AppState};
use docmind::config::{self, Config};
use docmind::db::sqlite::open_database;
use docmind::{build_ingestion_deps, init_tracing};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = Config::from_env();
    info!(version = config::APP_VERSION, "docmind starting");

    let data_dir = config
        .db_path
        .parent()
        .map(std::path::Path::to_path_buf)
        .unwrap_or_else(config::app_data_dir);
    std::fs::create_dir_all(&data_dir)?;

    // Open once at startup so migrations run before the first request.
    let conn = open_database(&config.db_path)?;
    drop(conn);
    info!(db_path = %config.db_path.display(), "Database ready");

    let deps = build_ingestion_deps(&config)?;
    let state = AppState {
        db_path: config.db_path.clone(),
        storage_dir: data_dir.join("uploads"),
        deps: Arc::clone(&deps),
    };

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %config.bind_addr, "Listening");
    axum::serve(listener, build_router(state)).await?;

    Ok(())
}
