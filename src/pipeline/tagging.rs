use tracing::{debug, warn};

use super::classify::strip_code_fences;
use super::ollama::{GenerateOptions, LlmClient};

/// How much of the document the tagger sees.
const TAG_PREFIX_CHARS: usize = 2000;

const MAX_TAGS: usize = 5;

const SYSTEM_PROMPT: &str = "You are a document tagging assistant. \
Respond only with a JSON array of short lowercase tags, no markdown, no commentary.";

/// Ask the model for up to five descriptive tags.
///
/// Never fails: any model or parsing problem yields an empty list so the
/// document still finishes processing, just untagged.
pub fn generate_tags(
    client: &dyn LlmClient,
    model: &str,
    document_name: &str,
    text: &str,
) -> Vec<String> {
    let excerpt = truncate_chars(text, TAG_PREFIX_CHARS);

    let prompt = format!(
        "Generate up to {MAX_TAGS} short topical tags for this document.\n\n\
         Document name: {document_name}\n\n\
         Document content:\n{excerpt}\n\n\
         Respond with a JSON array of lowercase strings, for example: [\"tax\", \"2024\", \"quarterly\"]"
    );

    let options = GenerateOptions {
        temperature: 0.5,
        max_tokens: Some(150),
    };

    let response = match client.generate(model, SYSTEM_PROMPT, &prompt, &options) {
        Ok(r) => r,
        Err(e) => {
            warn!(document_name = %document_name, error = %e, "Tag generation request failed");
            return Vec::new();
        }
    };

    let tags = parse_tags(&response);
    if tags.is_empty() {
        warn!(document_name = %document_name, "No usable tags in model response");
    } else {
        debug!(document_name = %document_name, count = tags.len(), "Generated tags");
    }
    tags
}

/// Accept either a bare array or an object with a "tags" field.
fn parse_tags(response: &str) -> Vec<String> {
    let cleaned = strip_code_fences(response);

    let raw: Vec<String> = if let Ok(list) = serde_json::from_str::<Vec<String>>(cleaned) {
        list
    } else if let Ok(value) = serde_json::from_str::<serde_json::Value>(cleaned) {
        value
            .get("tags")
            .and_then(|t| t.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    } else {
        return Vec::new();
    };

    let mut tags = Vec::new();
    for tag in raw {
        let normalized = tag.trim().to_lowercase();
        if normalized.len() > 1 && !tags.contains(&normalized) {
            tags.push(normalized);
        }
        if tags.len() == MAX_TAGS {
            break;
        }
    }
    tags
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

    #[test]
    fn bare_array_is_parsed() {
        let client = MockLlmClient::new(r#"["tax", "quarterly", "2024"]"#);
        let tags = generate_tags(&client, "m", "q1.pdf", "some text");
        assert_eq!(tags, vec!["tax", "quarterly", "2024"]);
    }

    #[test]
    fn object_with_tags_field_is_parsed() {
        let client = MockLlmClient::new(r#"{"tags": ["contract", "lease"]}"#);
        let tags = generate_tags(&client, "m", "lease.pdf", "some text");
        assert_eq!(tags, vec!["contract", "lease"]);
    }

    #[test]
    fn tags_are_normalized_and_capped() {
        let client = MockLlmClient::new(r#"["  Tax ", "TAX", "a", "one", "two", "three", "four"]"#);
        let tags = generate_tags(&client, "m", "doc", "text");
        // " Tax " and "TAX" collapse, "a" is too short, then capped at five
        assert_eq!(tags, vec!["tax", "one", "two", "three", "four"]);
    }

    #[test]
    fn fenced_response_is_accepted() {
        let client = MockLlmClient::new("```json\n[\"medical\", \"insurance\"]\n```");
        let tags = generate_tags(&client, "m", "doc", "text");
        assert_eq!(tags, vec!["medical", "insurance"]);
    }

    #[test]
    fn prose_response_yields_no_tags() {
        let client = MockLlmClient::new("Here are some tags: tax, quarterly");
        let tags = generate_tags(&client, "m", "doc", "text");
        assert!(tags.is_empty());
    }

    #[test]
    fn model_failure_yields_no_tags() {
        let client = MockLlmClient::failing("down");
        let tags = generate_tags(&client, "m", "doc", "text");
        assert!(tags.is_empty());
    }
}
