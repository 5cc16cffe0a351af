//! Intent classification
//!
//! Scores input against a fixed, ordered set of intents by keyword overlap.
//! A small set of override rules runs first and short-circuits the scorer
//! for structural requests the bag-of-keywords model cannot express.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::entities::extract_code_tokens;
use crate::knowledge::CodeSet;

/// Confidence assigned when an override rule fires. Above anything the
/// keyword scorer can reach (3 points per keyword, at most a dozen keywords).
pub const OVERRIDE_CONFIDENCE: u32 = 100;

/// Points for a keyword contained anywhere in the input
const CONTAINED_POINTS: u32 = 1;

/// Extra points when the keyword stands as a whole word or phrase
const WHOLE_WORD_POINTS: u32 = 2;

/// Named request categories, in declaration (tie-break) order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    CodeLookup,
    Terminology,
    ProviderLookup,
    Eligibility,
    Claims,
    Workflow,
    MobileFeatures,
    General,
    /// "show all CPT codes for ophthalmology" style requests
    BulkCodeListing,
    /// Nothing matched (confidence 0)
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::CodeLookup => "code_lookup",
            Intent::Terminology => "terminology",
            Intent::ProviderLookup => "provider_lookup",
            Intent::Eligibility => "eligibility",
            Intent::Claims => "claims",
            Intent::Workflow => "workflow",
            Intent::MobileFeatures => "mobile_features",
            Intent::General => "general",
            Intent::BulkCodeListing => "bulk_code_listing",
            Intent::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keyword sets per scored intent, in tie-break order
const INTENT_KEYWORDS: &[(Intent, &[&str])] = &[
    (
        Intent::CodeLookup,
        &[
            "code", "codes", "icd", "cpt", "hcpcs", "modifier", "billing code", "lookup",
            "look up",
        ],
    ),
    (
        Intent::Terminology,
        &[
            "what is", "what does", "mean", "meaning", "stand for", "stands for",
            "abbreviation", "definition", "define", "term",
        ],
    ),
    (
        Intent::ProviderLookup,
        &[
            "provider", "npi", "doctor", "physician", "ophthalmologist", "optometrist",
            "referring", "rendering", "taxonomy",
        ],
    ),
    (
        Intent::Eligibility,
        &[
            "eligibility", "eligible", "coverage", "covered", "insurance", "benefits",
            "deductible", "copay", "coinsurance", "verify",
        ],
    ),
    (
        Intent::Claims,
        &[
            "claim", "claims", "denied", "denial", "submit", "rejected", "rejection", "appeal",
            "reimbursement", "payment", "eob", "remittance",
        ],
    ),
    (
        Intent::Workflow,
        &[
            "how do i", "next step", "step", "workflow", "process", "fill out", "form", "field",
            "save", "start",
        ],
    ),
    (
        Intent::MobileFeatures,
        &[
            "mobile", "phone", "voice", "swipe", "gesture", "offline", "camera", "scan",
            "tablet",
        ],
    ),
    (
        Intent::General,
        &["help", "hello", "thanks", "thank you", "what can you do"],
    ),
];

/// Specialty words recognized in bulk listing requests
const SPECIALTY_KEYWORDS: &[(&str, &str)] = &[
    ("ophthalmology", "ophthalmology"),
    ("ophthalmic", "ophthalmology"),
    ("ophthalmological", "ophthalmology"),
    ("eye", "ophthalmology"),
    ("vision", "ophthalmology"),
    ("retina", "retina"),
    ("retinal", "retina"),
    ("glaucoma", "glaucoma"),
    ("diabetes", "diabetes"),
    ("diabetic", "diabetes"),
    ("optical", "optical"),
    ("eyewear", "optical"),
    ("telehealth", "telehealth"),
    ("surgery", "surgery"),
    ("surgical", "surgery"),
    ("hospital", "hospital"),
    ("laboratory", "laboratory"),
    ("lab", "laboratory"),
];

static WORD_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-z0-9][a-z0-9\-/]*").expect("valid regex"));

/// Score of one intent for one input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentCandidate {
    pub intent: Intent,
    pub score: u32,
    pub matched_keywords: Vec<String>,
}

/// Parameters of a bulk listing request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkListingRequest {
    pub code_set: Option<CodeSet>,
    pub specialty: Option<String>,
}

/// Classifier output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentClassification {
    pub intent: Intent,
    /// Non-negative keyword score; 0 means nothing recognized
    pub confidence: u32,
    pub matched_keywords: Vec<String>,
    /// Name of the override rule that fired, if any
    pub override_rule: Option<String>,
    pub bulk_request: Option<BulkListingRequest>,
    /// Every intent with a positive score, best first
    pub candidates: Vec<IntentCandidate>,
}

impl IntentClassification {
    fn unknown() -> Self {
        Self {
            intent: Intent::Unknown,
            confidence: 0,
            matched_keywords: Vec::new(),
            override_rule: None,
            bulk_request: None,
            candidates: Vec::new(),
        }
    }
}

/// Coarse confidence band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

/// Thresholds mapping a score to a band.
///
/// Tunable policy; the defaults (>= 2 high, 1 medium, 0 low) are pinned by
/// the golden fixtures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidencePolicy {
    pub high: u32,
    pub medium: u32,
}

impl Default for ConfidencePolicy {
    fn default() -> Self {
        Self { high: 2, medium: 1 }
    }
}

impl ConfidencePolicy {
    pub fn level(&self, confidence: u32) -> ConfidenceLevel {
        if confidence >= self.high {
            ConfidenceLevel::High
        } else if confidence >= self.medium {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }
}

struct CompiledKeyword {
    keyword: &'static str,
    whole_word: Regex,
}

/// Keyword-overlap intent classifier
pub struct IntentClassifier {
    intents: Vec<(Intent, Vec<CompiledKeyword>)>,
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl IntentClassifier {
    pub fn new() -> Self {
        let intents = INTENT_KEYWORDS
            .iter()
            .map(|(intent, keywords)| {
                let compiled = keywords
                    .iter()
                    .filter_map(|kw| {
                        Regex::new(&format!(r"\b{}\b", regex::escape(kw)))
                            .ok()
                            .map(|whole_word| CompiledKeyword {
                                keyword: kw,
                                whole_word,
                            })
                    })
                    .collect();
                (*intent, compiled)
            })
            .collect();
        Self { intents }
    }

    /// Classify raw text
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    pub fn classify(&self, text: &str) -> IntentClassification {
        let lower = text.to_lowercase();
        let lower = lower.trim();
        if lower.is_empty() {
            return IntentClassification::unknown();
        }

        if let Some(classification) = self.apply_overrides(text, lower) {
            debug!(
                intent = %classification.intent,
                rule = classification.override_rule.as_deref().unwrap_or(""),
                "Override rule fired"
            );
            return classification;
        }

        let candidates = self.score_all(lower);
        let Some(best) = best_candidate(&candidates) else {
            return IntentClassification::unknown();
        };

        debug!(intent = %best.intent, confidence = best.score, "Intent classified");

        let mut ranked = candidates.clone();
        ranked.sort_by(|a, b| b.score.cmp(&a.score));

        IntentClassification {
            intent: best.intent,
            confidence: best.score,
            matched_keywords: best.matched_keywords.clone(),
            override_rule: None,
            bulk_request: None,
            candidates: ranked,
        }
    }

    /// Score every declared intent (zero-score intents are omitted)
    pub fn score_all(&self, lower: &str) -> Vec<IntentCandidate> {
        self.intents
            .iter()
            .filter_map(|(intent, keywords)| {
                let mut score = 0;
                let mut matched = Vec::new();
                for kw in keywords {
                    if !lower.contains(kw.keyword) {
                        continue;
                    }
                    score += CONTAINED_POINTS;
                    if kw.whole_word.is_match(lower) {
                        score += WHOLE_WORD_POINTS;
                    }
                    matched.push(kw.keyword.to_string());
                }
                (score > 0).then(|| IntentCandidate {
                    intent: *intent,
                    score,
                    matched_keywords: matched,
                })
            })
            .collect()
    }

    fn apply_overrides(&self, original: &str, lower: &str) -> Option<IntentClassification> {
        bulk_listing_rule(lower).or_else(|| literal_code_rule(original))
    }
}

/// Highest score wins; ties go to the first-declared intent
fn best_candidate(candidates: &[IntentCandidate]) -> Option<&IntentCandidate> {
    candidates
        .iter()
        .fold(None, |best: Option<&IntentCandidate>, c| match best {
            Some(b) if b.score >= c.score => Some(b),
            _ => Some(c),
        })
}

/// Whether `text` is a "show all ..." style bulk listing request
pub fn is_bulk_listing_request(text: &str) -> bool {
    bulk_listing_rule(&text.to_lowercase()).is_some()
}

/// Nouns that make a specialty-only request about codes
const CODE_NOUNS: &[&str] = &["code", "codes"];

/// (show|list) + (all|every) + a code-set word, or a specialty word with a
/// code noun
fn bulk_listing_rule(lower: &str) -> Option<IntentClassification> {
    let words: Vec<&str> = WORD_PATTERN.find_iter(lower).map(|m| m.as_str()).collect();

    let verb = words.iter().find(|w| **w == "show" || **w == "list")?;
    let quantifier = words.iter().find(|w| **w == "all" || **w == "every")?;

    let code_set_word = words.iter().find(|w| CodeSet::from_keyword(w).is_some());
    let specialty_word = words
        .iter()
        .find_map(|w| SPECIALTY_KEYWORDS.iter().find(|(kw, _)| kw == w));

    let code_noun = words.iter().any(|w| CODE_NOUNS.contains(w));

    if code_set_word.is_none() && !(specialty_word.is_some() && code_noun) {
        return None;
    }

    let mut matched = vec![verb.to_string(), quantifier.to_string()];
    if let Some(w) = code_set_word {
        matched.push(w.to_string());
    }
    if let Some((kw, _)) = specialty_word {
        matched.push(kw.to_string());
    }

    Some(IntentClassification {
        intent: Intent::BulkCodeListing,
        confidence: OVERRIDE_CONFIDENCE,
        matched_keywords: matched,
        override_rule: Some("bulk_code_listing".to_string()),
        bulk_request: Some(BulkListingRequest {
            code_set: code_set_word.and_then(|w| CodeSet::from_keyword(w)),
            specialty: specialty_word.map(|(_, s)| s.to_string()),
        }),
        candidates: Vec::new(),
    })
}

/// A literal code-shaped token is always a code lookup
fn literal_code_rule(original: &str) -> Option<IntentClassification> {
    let tokens = extract_code_tokens(original);
    if tokens.is_empty() {
        return None;
    }
    Some(IntentClassification {
        intent: Intent::CodeLookup,
        confidence: OVERRIDE_CONFIDENCE,
        matched_keywords: tokens.into_iter().map(|t| t.normalized).collect(),
        override_rule: Some("literal_code".to_string()),
        bulk_request: None,
        candidates: Vec::new(),
    })
}
