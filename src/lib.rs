pub mod api;
pub mod chat;
pub mod config;
pub mod db;
pub mod models;
pub mod pipeline;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::pipeline::extraction::ocr::TesseractCli;
use crate::pipeline::extraction::page_image::EmbeddedImageRenderer;
use crate::pipeline::ollama::OllamaClient;
use crate::pipeline::processor::IngestionDeps;

/// Wire up logging from RUST_LOG, falling back to the service default.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();
}

/// Build the shared pipeline dependencies from configuration.
pub fn build_ingestion_deps(
    config: &config::Config,
) -> Result<Arc<IngestionDeps>, pipeline::ollama::LlmError> {
    let llm = OllamaClient::new(&config.ollama_base_url, config.llm_timeout_secs)?;
    Ok(Arc::new(IngestionDeps {
        llm: Arc::new(llm),
        ocr: Arc::new(TesseractCli::new(config.ocr_timeout_secs)),
        renderer: Arc::new(EmbeddedImageRenderer),
        analysis_model: config.analysis_model.clone(),
        scanned_text_threshold: config.scanned_text_threshold,
        ocr_max_pages: config.ocr_max_pages,
    }))
}
