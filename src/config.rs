use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "docmind";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default tracing filter when RUST_LOG is not set.
pub fn default_log_filter() -> String {
    format!("{}=info,tower_http=warn", APP_NAME)
}

/// Get the application data directory (~/.docmind/)
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".docmind")
}

/// Runtime configuration. Built from defaults, overridable via environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database file.
    pub db_path: PathBuf,
    /// Address the HTTP service binds to.
    pub bind_addr: String,
    /// Base URL of the local Ollama instance.
    pub ollama_base_url: String,
    /// Timeout for model invocations, seconds.
    pub llm_timeout_secs: u64,
    /// Timeout for a single OCR invocation, seconds.
    pub ocr_timeout_secs: u64,
    /// Model used for document classification and tagging.
    pub analysis_model: String,
    /// Average embedded chars/page below which a PDF is treated as scanned.
    pub scanned_text_threshold: usize,
    /// Maximum PDF pages to OCR per document (latency control).
    pub ocr_max_pages: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: app_data_dir().join("docmind.db"),
            bind_addr: "127.0.0.1:8920".to_string(),
            ollama_base_url: "http://localhost:11434".to_string(),
            llm_timeout_secs: 300,
            ocr_timeout_secs: 120,
            analysis_model: "llama3.2:3b-instruct-q4_K_M".to_string(),
            scanned_text_threshold: 100,
            ocr_max_pages: 10,
        }
    }
}

impl Config {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(path) = std::env::var("DOCMIND_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Ok(addr) = std::env::var("DOCMIND_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(url) = std::env::var("OLLAMA_BASE_URL") {
            config.ollama_base_url = url;
        }
        if let Ok(model) = std::env::var("DOCMIND_ANALYSIS_MODEL") {
            config.analysis_model = model;
        }
        config
    }
}
