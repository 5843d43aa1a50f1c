use serde::Deserialize;
use tracing::{debug, warn};

use super::ollama::{GenerateOptions, LlmClient};

/// How much of the document the classifier sees.
const CLASSIFY_PREFIX_CHARS: usize = 3000;

const FALLBACK_CATEGORY: &str = "General";

const SYSTEM_PROMPT: &str = "You are a document classification assistant. \
Respond only with valid JSON, no markdown, no commentary.";

/// Classifier output after matching against the known category set.
#[derive(Debug, Clone, PartialEq)]
pub struct CategorySuggestion {
    pub category: String,
    pub confidence: f64,
    pub reasoning: Option<String>,
}

impl CategorySuggestion {
    fn fallback(confidence: f64, reasoning: &str) -> Self {
        Self {
            category: FALLBACK_CATEGORY.to_string(),
            confidence,
            reasoning: Some(reasoning.to_string()),
        }
    }
}

#[derive(Deserialize)]
struct RawClassification {
    category_name: String,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    reasoning: Option<String>,
}

/// Ask the model to classify a document into one of the known categories.
///
/// Never fails: any model or parsing problem degrades to "General" so
/// ingestion can finish without a category from the model.
pub fn suggest_category(
    client: &dyn LlmClient,
    model: &str,
    document_name: &str,
    text: &str,
    categories: &[String],
) -> CategorySuggestion {
    if categories.is_empty() {
        return CategorySuggestion::fallback(0.0, "No categories configured");
    }

    let excerpt = truncate_chars(text, CLASSIFY_PREFIX_CHARS);
    let category_list = categories.join(", ");

    let prompt = format!(
        "Classify the following document into exactly one of these categories: {category_list}\n\n\
         Document name: {document_name}\n\n\
         Document content:\n{excerpt}\n\n\
         Respond with JSON in this exact format:\n\
         {{\"category_name\": \"<one of the categories>\", \"confidence\": <0.0-1.0>, \"reasoning\": \"<one sentence>\"}}"
    );

    let options = GenerateOptions {
        temperature: 0.2,
        max_tokens: Some(200),
    };

    let response = match client.generate(model, SYSTEM_PROMPT, &prompt, &options) {
        Ok(r) => r,
        Err(e) => {
            warn!(document_name = %document_name, error = %e, "Classification request failed");
            return CategorySuggestion::fallback(0.0, "Classification unavailable");
        }
    };

    let raw = match parse_classification(&response) {
        Some(r) => r,
        None => {
            warn!(document_name = %document_name, "Could not parse classification response");
            return CategorySuggestion::fallback(0.0, "Unparseable classification response");
        }
    };

    let matched = match_category(&raw.category_name, raw.confidence, categories);
    debug!(
        document_name = %document_name,
        category = %matched.category,
        confidence = matched.confidence,
        "Classified document"
    );
    matched
}

/// Parse the model's JSON, tolerating markdown code fences.
fn parse_classification(response: &str) -> Option<RawClassification> {
    let cleaned = strip_code_fences(response);
    serde_json::from_str::<RawClassification>(cleaned).ok()
}

pub(crate) fn strip_code_fences(response: &str) -> &str {
    let trimmed = response.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

/// Match the model's answer against the real category set.
///
/// Exact match wins, then case-insensitive, then a containment match with a
/// confidence penalty. Anything else falls back to "General" at low
/// confidence so a hallucinated category never reaches the database.
fn match_category(name: &str, confidence: f64, categories: &[String]) -> CategorySuggestion {
    let name = name.trim();
    let confidence = confidence.clamp(0.0, 1.0);

    if let Some(exact) = categories.iter().find(|c| c.as_str() == name) {
        return CategorySuggestion {
            category: exact.clone(),
            confidence,
            reasoning: None,
        };
    }

    let lower = name.to_lowercase();
    if let Some(ci) = categories.iter().find(|c| c.to_lowercase() == lower) {
        return CategorySuggestion {
            category: ci.clone(),
            confidence,
            reasoning: None,
        };
    }

    // Containment match: "Financial Invoices" → "Invoices", but only when
    // the overlap covers most of the known name.
    for candidate in categories {
        let cand_lower = candidate.to_lowercase();
        let contained = lower.contains(&cand_lower) || cand_lower.contains(&lower);
        if contained {
            let name_chars = lower.chars().count();
            let cand_chars = cand_lower.chars().count();
            let shorter = name_chars.min(cand_chars);
            let longer = name_chars.max(cand_chars);
            if longer > 0 && (shorter as f64 / longer as f64) >= 0.7 {
                return CategorySuggestion {
                    category: candidate.clone(),
                    confidence: (confidence * 0.8).max(0.3),
                    reasoning: None,
                };
            }
        }
    }

    CategorySuggestion::fallback(0.3, "Model suggested an unknown category")
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ollama::MockLlmClient;

    fn categories() -> Vec<String> {
        ["General", "Invoices", "Contracts", "Reports"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn exact_category_match() {
        let client = MockLlmClient::new(
            r#"{"category_name": "Invoices", "confidence": 0.92, "reasoning": "Contains line items and totals"}"#,
        );
        let result = suggest_category(&client, "m", "invoice.pdf", "Total due: $400", &categories());
        assert_eq!(result.category, "Invoices");
        assert!((result.confidence - 0.92).abs() < 1e-9);
    }

    #[test]
    fn case_insensitive_match_keeps_confidence() {
        let client = MockLlmClient::new(r#"{"category_name": "invoices", "confidence": 0.8}"#);
        let result = suggest_category(&client, "m", "doc", "text", &categories());
        assert_eq!(result.category, "Invoices");
        assert!((result.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn containment_match_applies_penalty() {
        let client = MockLlmClient::new(r#"{"category_name": "Invoice", "confidence": 0.9}"#);
        let result = suggest_category(&client, "m", "doc", "text", &categories());
        assert_eq!(result.category, "Invoices");
        assert!((result.confidence - 0.72).abs() < 1e-9);
    }

    #[test]
    fn penalty_has_floor() {
        let client = MockLlmClient::new(r#"{"category_name": "Invoice", "confidence": 0.1}"#);
        let result = suggest_category(&client, "m", "doc", "text", &categories());
        assert_eq!(result.category, "Invoices");
        assert!((result.confidence - 0.3).abs() < 1e-9);
    }

    #[test]
    fn containment_ratio_counts_characters_not_bytes() {
        // "notes日記" is 7 chars but 11 bytes; the 5/7 overlap clears the
        // ratio only when lengths are measured in characters.
        let client = MockLlmClient::new(r#"{"category_name": "Notes日記", "confidence": 0.9}"#);
        let cats = vec!["General".to_string(), "Notes".to_string()];
        let result = suggest_category(&client, "m", "doc", "text", &cats);
        assert_eq!(result.category, "Notes");
        assert!((result.confidence - 0.72).abs() < 1e-9);
    }

    #[test]
    fn unknown_category_falls_back_to_general() {
        let client =
            MockLlmClient::new(r#"{"category_name": "Cryptozoology", "confidence": 0.99}"#);
        let result = suggest_category(&client, "m", "doc", "text", &categories());
        assert_eq!(result.category, "General");
        assert!((result.confidence - 0.3).abs() < 1e-9);
    }

    #[test]
    fn garbage_response_falls_back_with_zero_confidence() {
        let client = MockLlmClient::new("I think this is probably an invoice.");
        let result = suggest_category(&client, "m", "doc", "text", &categories());
        assert_eq!(result.category, "General");
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn model_failure_degrades_instead_of_erroring() {
        let client = MockLlmClient::failing("connection refused");
        let result = suggest_category(&client, "m", "doc", "text", &categories());
        assert_eq!(result.category, "General");
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn strips_markdown_fences() {
        let client = MockLlmClient::new(
            "```json\n{\"category_name\": \"Reports\", \"confidence\": 0.7}\n```",
        );
        let result = suggest_category(&client, "m", "doc", "text", &categories());
        assert_eq!(result.category, "Reports");
    }

    #[test]
    fn confidence_is_clamped() {
        let client = MockLlmClient::new(r#"{"category_name": "Reports", "confidence": 3.5}"#);
        let result = suggest_category(&client, "m", "doc", "text", &categories());
        assert_eq!(result.confidence, 1.0);
    }
}
