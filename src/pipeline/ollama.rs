use std::io::BufRead;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Cannot reach Ollama at {0}. Is it running?")]
    Connection(String),

    #[error("Model request timed out after {0}s")]
    Timeout(u64),

    #[error("Ollama returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Failed to parse model response: {0}")]
    ResponseParsing(String),

    #[error("HTTP client error: {0}")]
    Http(String),
}

/// Per-call sampling parameters, resolved by the model router.
#[derive(Debug, Clone, Copy)]
pub struct GenerateOptions {
    pub temperature: f32,
    /// Token budget for the response (Ollama `num_predict`).
    pub max_tokens: Option<u32>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: None,
        }
    }
}

/// Language-model invocation boundary (allows mocking in tests).
///
/// `generate_streaming` forwards each increment through `token_tx` as soon
/// as it arrives and returns the full concatenated text; the returned string
/// is exactly the concatenation of all forwarded increments.
pub trait LlmClient: Send + Sync {
    fn generate(
        &self,
        model: &str,
        system: &str,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<String, LlmError>;

    fn generate_streaming(
        &self,
        model: &str,
        system: &str,
        prompt: &str,
        options: &GenerateOptions,
        token_tx: std::sync::mpsc::Sender<String>,
    ) -> Result<String, LlmError>;

    fn list_models(&self) -> Result<Vec<String>, LlmError>;
}

/// Ollama HTTP client for local LLM inference.
pub struct OllamaClient {
    base_url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OllamaClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, LlmError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| LlmError::Http(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
        })
    }

    fn map_send_error(&self, e: reqwest::Error) -> LlmError {
        if e.is_connect() {
            LlmError::Connection(self.base_url.clone())
        } else if e.is_timeout() {
            LlmError::Timeout(self.timeout_secs)
        } else {
            LlmError::Http(e.to_string())
        }
    }
}

/// Request body for Ollama /api/generate
#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

impl From<&GenerateOptions> for OllamaOptions {
    fn from(opts: &GenerateOptions) -> Self {
        Self {
            temperature: opts.temperature,
            num_predict: opts.max_tokens,
        }
    }
}

/// Response body from Ollama /api/generate (non-streaming)
#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

/// One NDJSON line from Ollama /api/generate (streaming)
#[derive(Deserialize)]
struct OllamaStreamChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Response body from Ollama /api/tags
#[derive(Deserialize)]
struct OllamaTagsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

impl LlmClient for OllamaClient {
    fn generate(
        &self,
        model: &str,
        system: &str,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<String, LlmError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = OllamaGenerateRequest {
            model,
            prompt,
            system,
            stream: false,
            options: options.into(),
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OllamaGenerateResponse = response
            .json()
            .map_err(|e| LlmError::ResponseParsing(e.to_string()))?;

        Ok(parsed.response)
    }

    fn generate_streaming(
        &self,
        model: &str,
        system: &str,
        prompt: &str,
        options: &GenerateOptions,
        token_tx: std::sync::mpsc::Sender<String>,
    ) -> Result<String, LlmError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = OllamaGenerateRequest {
            model,
            prompt,
            system,
            stream: true,
            options: options.into(),
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let reader = std::io::BufReader::new(response);
        let mut full_text = String::new();

        for line in reader.lines() {
            let line = line.map_err(|e| LlmError::Http(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }

            let chunk: OllamaStreamChunk = serde_json::from_str(&line)
                .map_err(|e| LlmError::ResponseParsing(e.to_string()))?;

            if let Some(err) = chunk.error {
                return Err(LlmError::Api {
                    status: 200,
                    body: err,
                });
            }

            if !chunk.response.is_empty() {
                full_text.push_str(&chunk.response);
                // Receiver may be gone (client stopped reading); keep
                // consuming so the full text is still returned.
                let _ = token_tx.send(chunk.response);
            }

            if chunk.done {
                break;
            }
        }

        Ok(full_text)
    }

    fn list_models(&self) -> Result<Vec<String>, LlmError> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OllamaTagsResponse = response
            .json()
            .map_err(|e| LlmError::ResponseParsing(e.to_string()))?;

        Ok(parsed.models.into_iter().map(|m| m.name).collect())
    }
}

/// Mock LLM client for testing. Returns configurable responses.
pub struct MockLlmClient {
    responses: std::sync::Mutex<Vec<String>>,
    available_models: Vec<String>,
    fail_with: Option<String>,
}

impl MockLlmClient {
    pub fn new(response: &str) -> Self {
        Self {
            responses: std::sync::Mutex::new(vec![response.to_string()]),
            available_models: vec!["llama3.2:3b-instruct-q4_K_M".to_string()],
            fail_with: None,
        }
    }

    /// Queue several responses, returned in order (last one repeats).
    pub fn with_responses(responses: &[&str]) -> Self {
        Self {
            responses: std::sync::Mutex::new(
                responses.iter().rev().map(|s| s.to_string()).collect(),
            ),
            available_models: vec!["llama3.2:3b-instruct-q4_K_M".to_string()],
            fail_with: None,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            responses: std::sync::Mutex::new(vec![]),
            available_models: vec![],
            fail_with: Some(message.to_string()),
        }
    }

    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.available_models = models;
        self
    }

    fn next_response(&self) -> Result<String, LlmError> {
        if let Some(ref msg) = self.fail_with {
            return Err(LlmError::Connection(msg.clone()));
        }
        let mut responses = self.responses.lock().unwrap();
        if responses.len() > 1 {
            Ok(responses.pop().unwrap_or_default())
        } else {
            Ok(responses.last().cloned().unwrap_or_default())
        }
    }
}

impl LlmClient for MockLlmClient {
    fn generate(
        &self,
        _model: &str,
        _system: &str,
        _prompt: &str,
        _options: &GenerateOptions,
    ) -> Result<String, LlmError> {
        self.next_response()
    }

    fn generate_streaming(
        &self,
        _model: &str,
        _system: &str,
        _prompt: &str,
        _options: &GenerateOptions,
        token_tx: std::sync::mpsc::Sender<String>,
    ) -> Result<String, LlmError> {
        let full = self.next_response()?;
        // Stream word-by-word to exercise multi-chunk consumers.
        let mut sent = String::new();
        for piece in split_inclusive_whitespace(&full) {
            sent.push_str(&piece);
            let _ = token_tx.send(piece);
        }
        Ok(sent)
    }

    fn list_models(&self) -> Result<Vec<String>, LlmError> {
        if let Some(ref msg) = self.fail_with {
            return Err(LlmError::Connection(msg.clone()));
        }
        Ok(self.available_models.clone())
    }
}

/// Split text into word + trailing-whitespace pieces whose concatenation
/// reproduces the input exactly.
fn split_inclusive_whitespace(text: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut in_whitespace = false;

    for ch in text.chars() {
        if ch.is_whitespace() {
            in_whitespace = true;
            current.push(ch);
        } else {
            if in_whitespace {
                pieces.push(std::mem::take(&mut current));
                in_whitespace = false;
            }
            current.push(ch);
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_client_returns_configured_response() {
        let client = MockLlmClient::new("test response");
        let result = client
            .generate("model", "system", "prompt", &GenerateOptions::default())
            .unwrap();
        assert_eq!(result, "test response");
    }

    #[test]
    fn mock_client_streams_exact_concatenation() {
        let client = MockLlmClient::new("The answer is in section 3.");
        let (tx, rx) = std::sync::mpsc::channel();
        let full = client
            .generate_streaming("m", "s", "p", &GenerateOptions::default(), tx)
            .unwrap();

        let concatenated: String = rx.iter().collect();
        assert_eq!(concatenated, full);
        assert_eq!(full, "The answer is in section 3.");
    }

    #[test]
    fn mock_client_queued_responses_in_order() {
        let client = MockLlmClient::with_responses(&["first", "second"]);
        let opts = GenerateOptions::default();
        assert_eq!(client.generate("m", "s", "p", &opts).unwrap(), "first");
        assert_eq!(client.generate("m", "s", "p", &opts).unwrap(), "second");
        // Last response repeats
        assert_eq!(client.generate("m", "s", "p", &opts).unwrap(), "second");
    }

    #[test]
    fn failing_mock_reports_connection_error() {
        let client = MockLlmClient::failing("down");
        let result = client.generate("m", "s", "p", &GenerateOptions::default());
        assert!(matches!(result, Err(LlmError::Connection(_))));
    }

    #[test]
    fn ollama_client_trims_trailing_slash() {
        let client = OllamaClient::new("http://localhost:11434/", 60).unwrap();
        assert_eq!(client.base_url, "http://localhost:11434");
        assert_eq!(client.timeout_secs, 60);
    }

    #[test]
    fn split_pieces_reassemble_exactly() {
        for text in ["", "one", "two words", "  leading and trailing  ", "a\nb\tc"] {
            let pieces = split_inclusive_whitespace(text);
            assert_eq!(pieces.concat(), text);
        }
    }

    #[test]
    fn stream_chunk_parses_ollama_ndjson() {
        let line = r#"{"model":"llama3.1:8b","response":"Hel","done":false}"#;
        let chunk: OllamaStreamChunk = serde_json::from_str(line).unwrap();
        assert_eq!(chunk.response, "Hel");
        assert!(!chunk.done);

        let final_line = r#"{"model":"llama3.1:8b","response":"","done":true,"total_duration":123}"#;
        let chunk: OllamaStreamChunk = serde_json::from_str(final_line).unwrap();
        assert!(chunk.done);
    }
}
