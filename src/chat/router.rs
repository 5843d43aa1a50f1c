//! Query-complexity model routing.
//!
//! Four tiers trade answer quality against latency. Trivial greetings hit a
//! 1B model in well under a second; multi-document questions get the 8B
//! model and a bigger token budget.

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::pipeline::ollama::GenerateOptions;

/// Tiers in ascending capability order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ModelTier {
    Fast,
    Medium,
    Complex,
    Advanced,
}

impl ModelTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Medium => "medium",
            Self::Complex => "complex",
            Self::Advanced => "advanced",
        }
    }

    fn downgrade(&self) -> Option<Self> {
        match self {
            Self::Advanced => Some(Self::Complex),
            Self::Complex => Some(Self::Medium),
            Self::Medium => Some(Self::Fast),
            Self::Fast => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TierProfile {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl TierProfile {
    pub fn generate_options(&self) -> GenerateOptions {
        GenerateOptions {
            temperature: self.temperature,
            max_tokens: Some(self.max_tokens),
        }
    }
}

/// Maps each tier to a concrete model and sampling parameters.
#[derive(Debug, Clone)]
pub struct TierTable {
    pub fast: TierProfile,
    pub medium: TierProfile,
    pub complex: TierProfile,
    pub advanced: TierProfile,
}

impl Default for TierTable {
    fn default() -> Self {
        Self {
            fast: TierProfile {
                model: "llama3.2:1b-instruct-q4_K_M".into(),
                max_tokens: 200,
                temperature: 0.2,
            },
            medium: TierProfile {
                model: "llama3.2:3b-instruct-q4_K_M".into(),
                max_tokens: 500,
                temperature: 0.3,
            },
            complex: TierProfile {
                model: "llama3.1:8b".into(),
                max_tokens: 1000,
                temperature: 0.3,
            },
            advanced: TierProfile {
                model: "llama3:8b-instruct-q4_K_M".into(),
                max_tokens: 2000,
                temperature: 0.3,
            },
        }
    }
}

impl TierTable {
    pub fn profile(&self, tier: ModelTier) -> &TierProfile {
        match tier {
            ModelTier::Fast => &self.fast,
            ModelTier::Medium => &self.medium,
            ModelTier::Complex => &self.complex,
            ModelTier::Advanced => &self.advanced,
        }
    }

    /// Pick the profile for a tier, downgrading until an installed model is
    /// found. An empty availability list means we could not ask Ollama;
    /// proceed optimistically with the requested tier.
    pub fn route(&self, tier: ModelTier, available_models: &[String]) -> (ModelTier, &TierProfile) {
        if available_models.is_empty() {
            return (tier, self.profile(tier));
        }

        let mut current = tier;
        loop {
            let profile = self.profile(current);
            if available_models.iter().any(|m| *m == profile.model) {
                if current != tier {
                    debug!(
                        requested = tier.as_str(),
                        selected = current.as_str(),
                        "Routed down to an installed model"
                    );
                }
                return (current, profile);
            }
            match current.downgrade() {
                Some(lower) => current = lower,
                None => return (tier, self.profile(tier)),
            }
        }
    }
}

fn trivial_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        // Anchored both ends: a long question that happens to open with a
        // greeting must not short-circuit to the fast tier.
        [
            r"^(hi|hello|hey|greetings)\s*[!?.]?$",
            r"^(yes|no|ok|okay|sure|thanks|thank you)\s*[!?.]?$",
            r"^\w+\?$",
            r"^(what|who|when|where|why|how)\s+\w+\s*\?$",
            r"^(is|are|was|were|do|does|did|can|could|will|would)\s+\w+\s*\?$",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("routing pattern must compile"))
        .collect()
    })
}

const COMPLEX_KEYWORDS: &[&str] = &[
    "analyze",
    "compare",
    "summarize",
    "explain in detail",
    "describe",
    "evaluate",
    "discuss",
    "review",
    "all documents",
    "multiple",
    "across",
    "between",
    "difference",
    "similarity",
    "relationship",
    "extract",
    "list all",
    "find all",
    "search for",
];

/// Classify a user message into a tier.
///
/// Context size and multi-document scope dominate message shape: a short
/// question over a large context still needs a capable model.
pub fn classify_complexity(message: &str, context_len: usize, multi_document: bool) -> ModelTier {
    if multi_document || context_len > 5000 {
        return ModelTier::Advanced;
    }

    let normalized = message.trim().to_lowercase();
    if trivial_patterns().iter().any(|p| p.is_match(&normalized)) {
        return ModelTier::Fast;
    }

    let word_count = normalized.split_whitespace().count();
    let has_keyword = COMPLEX_KEYWORDS.iter().any(|kw| normalized.contains(kw));

    if word_count <= 3 && !has_keyword {
        return ModelTier::Fast;
    }
    if word_count <= 8 && !has_keyword {
        return ModelTier::Medium;
    }
    if word_count > 8 || has_keyword {
        return ModelTier::Complex;
    }
    if context_len > 2000 {
        return ModelTier::Complex;
    }
    ModelTier::Medium
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greetings_route_fast() {
        assert_eq!(classify_complexity("Hello!", 0, false), ModelTier::Fast);
        assert_eq!(classify_complexity("thanks", 500, false), ModelTier::Fast);
        assert_eq!(classify_complexity("ok", 100, false), ModelTier::Fast);
    }

    #[test]
    fn short_questions_route_medium() {
        assert_eq!(
            classify_complexity("what is the total due", 500, false),
            ModelTier::Medium
        );
    }

    #[test]
    fn simple_questions_route_fast() {
        assert_eq!(classify_complexity("status?", 0, false), ModelTier::Fast);
        assert_eq!(classify_complexity("how much?", 500, false), ModelTier::Fast);
        assert_eq!(classify_complexity("is it?", 0, false), ModelTier::Fast);
    }

    #[test]
    fn keywords_route_complex() {
        assert_eq!(
            classify_complexity("summarize this", 500, false),
            ModelTier::Complex
        );
        assert_eq!(
            classify_complexity("describe the contract", 0, false),
            ModelTier::Complex
        );
        assert_eq!(
            classify_complexity("search for the deadline", 0, false),
            ModelTier::Complex
        );
    }

    #[test]
    fn long_questions_route_complex() {
        assert_eq!(
            classify_complexity(
                "could you tell me which clauses in this agreement mention early termination",
                500,
                false
            ),
            ModelTier::Complex
        );
    }

    #[test]
    fn multi_document_always_routes_advanced() {
        assert_eq!(classify_complexity("hi", 0, true), ModelTier::Advanced);
    }

    #[test]
    fn huge_context_routes_advanced() {
        assert_eq!(
            classify_complexity("what is this", 6000, false),
            ModelTier::Advanced
        );
    }

    #[test]
    fn greeting_prefix_does_not_shortcut_long_questions() {
        assert_eq!(
            classify_complexity(
                "hello, could you analyze the indemnification clause for me",
                500,
                false
            ),
            ModelTier::Complex
        );
    }

    #[test]
    fn tier_never_drops_as_words_grow() {
        let questions = [
            "total?",
            "what is the total",
            "what is the total across every line item listed in the second table",
        ];
        let mut last = ModelTier::Fast;
        for q in questions {
            let tier = classify_complexity(q, 500, false);
            assert!(tier >= last, "tier dropped at {q:?}");
            last = tier;
        }
    }

    #[test]
    fn tier_never_drops_as_context_grows() {
        let message = "explain the payment terms in detail please";
        let mut last = ModelTier::Fast;
        for ctx in [0usize, 1000, 3000, 5001, 10_000] {
            let tier = classify_complexity(message, ctx, false);
            assert!(tier >= last, "tier dropped at context {ctx}");
            last = tier;
        }
    }

    #[test]
    fn default_table_matches_tiering() {
        let table = TierTable::default();
        assert_eq!(table.fast.model, "llama3.2:1b-instruct-q4_K_M");
        assert_eq!(table.fast.max_tokens, 200);
        assert_eq!(table.advanced.model, "llama3:8b-instruct-q4_K_M");
        assert_eq!(table.advanced.max_tokens, 2000);
        assert!(table.fast.temperature < table.medium.temperature + f32::EPSILON);
    }

    #[test]
    fn routing_downgrades_to_installed_model() {
        let table = TierTable::default();
        let available = vec!["llama3.2:1b-instruct-q4_K_M".to_string()];

        let (tier, profile) = table.route(ModelTier::Advanced, &available);
        assert_eq!(tier, ModelTier::Fast);
        assert_eq!(profile.model, "llama3.2:1b-instruct-q4_K_M");
    }

    #[test]
    fn routing_keeps_tier_when_model_installed() {
        let table = TierTable::default();
        let available = vec![
            "llama3.1:8b".to_string(),
            "llama3.2:3b-instruct-q4_K_M".to_string(),
        ];

        let (tier, profile) = table.route(ModelTier::Complex, &available);
        assert_eq!(tier, ModelTier::Complex);
        assert_eq!(profile.model, "llama3.1:8b");
    }

    #[test]
    fn unknown_availability_is_optimistic() {
        let table = TierTable::default();
        let (tier, profile) = table.route(ModelTier::Medium, &[]);
        assert_eq!(tier, ModelTier::Medium);
        assert_eq!(profile.model, table.medium.model);
    }

    #[test]
    fn nothing_installed_keeps_requested_tier() {
        let table = TierTable::default();
        let available = vec!["mistral:7b".to_string()];
        let (tier, profile) = table.route(ModelTier::Complex, &available);
        assert_eq!(tier, ModelTier::Complex);
        assert_eq!(profile.model, "llama3.1:8b");
    }
}
