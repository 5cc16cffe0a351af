//! Medical entity and code-pattern extraction
//!
//! Recognizes:
//! - ICD-10 diagnosis codes (e.g. E11.9, H40.10)
//! - CPT procedure codes (e.g. 92250, 0001F)
//! - HCPCS Level II codes (e.g. J0178)
//! - Place-of-service codes ("POS 11", "place of service 22")
//! - Modifiers ("modifier 25", "92250-26", "RT modifier")
//! - Conditions and procedures from the knowledge base vocabularies
//!
//! ## Invariants
//!
//! - Extraction never panics on any input
//! - Only substrings present in the input are reported
//! - Identical input yields identical output (results sorted by position)
//! - Bounded output: max 100 entities per text

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::knowledge::{CodeSet, KnowledgeBase, VocabularyEntry};

/// Maximum entities to extract from a single text
const MAX_ENTITIES_PER_TEXT: usize = 100;

/// ICD-10-CM: letter (not U), two digits, optional decimal part.
/// Lowercase forms only count when the decimal part is present.
static ICD10_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:[A-TV-Z][0-9]{2}(?:\.[0-9A-Z]{1,4})?|[a-tv-z][0-9]{2}\.[0-9a-z]{1,4})\b")
        .expect("valid regex")
});

/// CPT Category I (five digits) and Category II/III (four digits + F/T/U)
static CPT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[0-9]{4}[0-9FTU]\b").expect("valid regex"));

/// HCPCS Level II: letter A-V followed by four digits
static HCPCS_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b[A-V][0-9]{4}\b").expect("valid regex"));

static POS_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:pos|place\s+of\s+service)\s*(?:code\s*)?#?\s*([0-9]{2})\b")
        .expect("valid regex")
});

/// "modifier 25", "modifier-RT" (letter modifiers must be uppercase)
static MODIFIER_AFTER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i:\bmodifiers?)\s*-?\s*([0-9]{2}|[A-Z]{2})\b").expect("valid regex")
});

/// "25 modifier", "RT modifier"
static MODIFIER_BEFORE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([0-9]{2}|[A-Z]{2})\s+(?i:modifiers?)\b").expect("valid regex")
});

/// "92250-26", "67028-RT"
static MODIFIER_SUFFIX_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[0-9]{4}[0-9FTU]-([0-9A-Z]{2})\b").expect("valid regex"));

/// Category of a recognized entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityCategory {
    Code,
    Condition,
    Procedure,
}

/// A literal code-shaped substring
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeToken {
    /// Text as it appears in the input
    pub text: String,
    /// Uppercased code
    pub normalized: String,
    pub code_set: CodeSet,
    /// Byte offset in the input
    pub position: usize,
}

/// A recognized medical entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemanticEntity {
    /// Surface text as found in the input
    pub text: String,
    pub category: EntityCategory,
    /// Canonical form used for memory and lookups
    pub normalized: String,
    /// Set only for code entities
    pub code_set: Option<CodeSet>,
    pub position: usize,
}

/// Result of entity extraction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// Entities sorted by position
    pub entities: Vec<SemanticEntity>,
    /// Code-shaped substrings sorted by position
    pub code_tokens: Vec<CodeToken>,
}

impl ExtractionResult {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.code_tokens.is_empty()
    }

    pub fn of_category(&self, category: EntityCategory) -> impl Iterator<Item = &SemanticEntity> {
        self.entities.iter().filter(move |e| e.category == category)
    }
}

/// Configuration for entity extraction
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    pub extract_codes: bool,
    pub extract_conditions: bool,
    pub extract_procedures: bool,
    pub max_entities: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            extract_codes: true,
            extract_conditions: true,
            extract_procedures: true,
            max_entities: MAX_ENTITIES_PER_TEXT,
        }
    }
}

/// Extracts medical entities using the injected knowledge base
#[derive(Clone)]
pub struct EntityExtractor {
    kb: Arc<KnowledgeBase>,
    config: ExtractionConfig,
}

impl EntityExtractor {
    pub fn new(kb: Arc<KnowledgeBase>) -> Self {
        Self::with_config(kb, ExtractionConfig::default())
    }

    pub fn with_config(kb: Arc<KnowledgeBase>, config: ExtractionConfig) -> Self {
        Self { kb, config }
    }

    /// Extract entities and code tokens from text.
    ///
    /// This function never panics. Empty input returns an empty result.
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    pub fn extract(&self, text: &str) -> ExtractionResult {
        if text.trim().is_empty() {
            return ExtractionResult::default();
        }

        let code_tokens = if self.config.extract_codes {
            extract_code_tokens(text)
        } else {
            Vec::new()
        };

        let mut entities: Vec<SemanticEntity> = code_tokens
            .iter()
            .map(|t| SemanticEntity {
                text: t.text.clone(),
                category: EntityCategory::Code,
                normalized: t.normalized.clone(),
                code_set: Some(t.code_set),
                position: t.position,
            })
            .collect();

        // Lowercasing can shift byte offsets for some scripts; the surface
        // slice falls back to the vocabulary form when it no longer lines up.
        let lower = text.to_lowercase();
        let mut claimed: Vec<(usize, usize)> = Vec::new();
        if self.config.extract_conditions {
            match_vocabulary(
                text,
                &lower,
                self.kb.conditions(),
                EntityCategory::Condition,
                &mut claimed,
                &mut entities,
            );
        }
        if self.config.extract_procedures {
            match_vocabulary(
                text,
                &lower,
                self.kb.procedures(),
                EntityCategory::Procedure,
                &mut claimed,
                &mut entities,
            );
        }

        entities.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.text.cmp(&b.text)));
        entities.truncate(self.config.max_entities);

        let mut code_tokens = code_tokens;
        code_tokens.truncate(self.config.max_entities);

        debug!(
            entity_count = entities.len(),
            code_count = code_tokens.len(),
            "Entity extraction complete"
        );

        ExtractionResult {
            entities,
            code_tokens,
        }
    }
}

/// Vocabulary matching by case-insensitive substring containment.
///
/// Longer surfaces are matched first (the knowledge base keeps them sorted),
/// and a hit overlapping an earlier one is dropped.
fn match_vocabulary(
    text: &str,
    lower: &str,
    vocabulary: &[VocabularyEntry],
    category: EntityCategory,
    claimed: &mut Vec<(usize, usize)>,
    out: &mut Vec<SemanticEntity>,
) {
    for entry in vocabulary {
        let needle = entry.surface.to_lowercase();
        if needle.is_empty() {
            continue;
        }
        let Some(start) = lower.find(&needle) else {
            continue;
        };
        let end = start + needle.len();
        if claimed.iter().any(|&(s, e)| start < e && s < end) {
            continue;
        }
        if out
            .iter()
            .any(|e| e.category == category && e.normalized == entry.normalized)
        {
            continue;
        }
        claimed.push((start, end));
        let surface = text
            .get(start..end)
            .filter(|s| s.to_lowercase() == needle)
            .unwrap_or(entry.surface.as_str());
        out.push(SemanticEntity {
            text: surface.to_string(),
            category,
            normalized: entry.normalized.clone(),
            code_set: None,
            position: start,
        });
    }
}

/// All code-shaped substrings in `text`, deduplicated and sorted by position
pub fn extract_code_tokens(text: &str) -> Vec<CodeToken> {
    let mut tokens: Vec<CodeToken> = Vec::new();

    let mut push = |m: regex::Match<'_>, code_set: CodeSet| {
        let normalized = m.as_str().to_uppercase();
        if tokens
            .iter()
            .any(|t| t.normalized == normalized && t.code_set == code_set)
        {
            return;
        }
        tokens.push(CodeToken {
            text: m.as_str().to_string(),
            normalized,
            code_set,
            position: m.start(),
        });
    };

    for m in ICD10_PATTERN.find_iter(text) {
        push(m, CodeSet::Icd10);
    }
    for m in CPT_PATTERN.find_iter(text) {
        push(m, CodeSet::Cpt);
    }
    for m in HCPCS_PATTERN.find_iter(text) {
        push(m, CodeSet::Hcpcs);
    }
    for cap in POS_PATTERN.captures_iter(text) {
        if let Some(m) = cap.get(1) {
            push(m, CodeSet::Pos);
        }
    }
    for pattern in [
        &*MODIFIER_AFTER_PATTERN,
        &*MODIFIER_BEFORE_PATTERN,
        &*MODIFIER_SUFFIX_PATTERN,
    ] {
        for cap in pattern.captures_iter(text) {
            if let Some(m) = cap.get(1) {
                push(m, CodeSet::Modifier);
            }
        }
    }

    tokens.sort_by(|a, b| {
        a.position
            .cmp(&b.position)
            .then_with(|| a.code_set.cmp(&b.code_set))
    });
    tokens.truncate(MAX_ENTITIES_PER_TEXT);
    tokens
}

/// Whether `text` contains any code-shaped token
pub fn has_code_token(text: &str) -> bool {
    ICD10_PATTERN.is_match(text)
        || CPT_PATTERN.is_match(text)
        || HCPCS_PATTERN.is_match(text)
        || POS_PATTERN.is_match(text)
        || MODIFIER_AFTER_PATTERN.is_match(text)
        || MODIFIER_BEFORE_PATTERN.is_match(text)
        || MODIFIER_SUFFIX_PATTERN.is_match(text)
}
