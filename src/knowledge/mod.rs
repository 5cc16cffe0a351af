//! Static knowledge tables (terminology, code sets, form-field guidance)
//!
//! The knowledge base is immutable once built and is passed into the
//! components that need it, so tests can swap in their own tables.

mod tables;

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{FormHelperError, Result};

/// Maximum edit distance accepted for fuzzy term and field lookups
const MAX_FUZZY_DISTANCE: usize = 2;

/// Minimum query length before fuzzy matching is attempted
const MIN_FUZZY_LENGTH: usize = 4;

/// Billing code families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeSet {
    Icd10,
    Cpt,
    Hcpcs,
    Pos,
    Modifier,
}

impl CodeSet {
    /// Human-facing label
    pub fn label(&self) -> &'static str {
        match self {
            CodeSet::Icd10 => "ICD-10",
            CodeSet::Cpt => "CPT",
            CodeSet::Hcpcs => "HCPCS",
            CodeSet::Pos => "Place of Service",
            CodeSet::Modifier => "Modifier",
        }
    }

    /// Detect a code set named in free text
    pub fn from_keyword(word: &str) -> Option<CodeSet> {
        match word {
            "icd" | "icds" | "icd-10" | "icd10" | "diagnosis" | "diagnoses" => Some(CodeSet::Icd10),
            "cpt" | "cpts" | "procedure" | "procedures" => Some(CodeSet::Cpt),
            "hcpcs" => Some(CodeSet::Hcpcs),
            "pos" => Some(CodeSet::Pos),
            "modifier" | "modifiers" => Some(CodeSet::Modifier),
            _ => None,
        }
    }
}

impl std::fmt::Display for CodeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A terminology entry (abbreviation or billing term)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermEntry {
    pub term: String,
    pub meaning: String,
    pub explanation: String,
    pub category: String,
}

impl TermEntry {
    /// Two/three-letter abbreviations get special routing treatment
    pub fn is_short_abbreviation(&self) -> bool {
        let len = self.term.chars().count();
        (2..=3).contains(&len) && self.term.chars().all(|c| c.is_ascii_uppercase())
    }
}

/// A billing code with its description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeEntry {
    pub code: String,
    pub code_set: CodeSet,
    pub description: String,
    #[serde(default)]
    pub specialties: Vec<String>,
}

/// Help text for a form field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldGuidance {
    pub field: String,
    pub label: String,
    pub help: String,
    pub example: Option<String>,
}

/// A surface form recognized by the entity extractor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularyEntry {
    pub surface: String,
    pub normalized: String,
}

/// Topics covered by the template guidance handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuideTopic {
    Provider,
    Eligibility,
    Claims,
    Workflow,
    Mobile,
}

/// A canned guidance paragraph selected by keyword
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuideEntry {
    pub topic: GuideTopic,
    pub title: String,
    /// Lowercase phrases that select this entry
    pub keywords: Vec<String>,
    pub body: String,
    /// Ordered steps, rendered as a numbered list when present
    #[serde(default)]
    pub steps: Vec<String>,
}

/// Serializable table bundle
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeTables {
    pub terms: Vec<TermEntry>,
    pub codes: Vec<CodeEntry>,
    pub fields: Vec<FieldGuidance>,
    pub conditions: Vec<VocabularyEntry>,
    pub procedures: Vec<VocabularyEntry>,
    pub guides: Vec<GuideEntry>,
}

/// Read-only lookup tables
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    /// Lowercased term -> entry
    terms: HashMap<String, TermEntry>,
    /// Uppercased code -> entries (POS and modifier numbers can collide)
    codes: HashMap<String, Vec<CodeEntry>>,
    /// Normalized field key -> guidance
    fields: HashMap<String, FieldGuidance>,
    conditions: Vec<VocabularyEntry>,
    procedures: Vec<VocabularyEntry>,
    guides: Vec<GuideEntry>,
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self::builtin()
    }
}

impl KnowledgeBase {
    /// Tables shipped with the crate
    pub fn builtin() -> Self {
        Self::from_tables(tables::builtin_tables())
    }

    /// Build lookup indexes from a table bundle
    pub fn from_tables(tables: KnowledgeTables) -> Self {
        let terms = tables
            .terms
            .into_iter()
            .map(|t| (t.term.to_lowercase(), t))
            .collect();

        let mut codes: HashMap<String, Vec<CodeEntry>> = HashMap::new();
        for entry in tables.codes {
            codes
                .entry(entry.code.to_uppercase())
                .or_default()
                .push(entry);
        }

        let fields = tables
            .fields
            .into_iter()
            .map(|f| (normalize_field_key(&f.field), f))
            .collect();

        // Longest surface first so "diabetic retinopathy" wins over "diabetic"
        let mut conditions = tables.conditions;
        conditions.sort_by(|a, b| b.surface.len().cmp(&a.surface.len()));
        let mut procedures = tables.procedures;
        procedures.sort_by(|a, b| b.surface.len().cmp(&a.surface.len()));

        Self {
            terms,
            codes,
            fields,
            conditions,
            procedures,
            guides: tables.guides,
        }
    }

    /// Load tables from JSON (same shape as [`KnowledgeTables`])
    pub fn from_json(raw: &str) -> Result<Self> {
        let tables: KnowledgeTables = serde_json::from_str(raw)
            .map_err(|e| FormHelperError::Knowledge(format!("invalid knowledge tables: {}", e)))?;
        Ok(Self::from_tables(tables))
    }

    /// Exact, case-insensitive terminology lookup
    pub fn term(&self, term: &str) -> Option<&TermEntry> {
        self.terms.get(&term.trim().to_lowercase())
    }

    /// Terminology lookup tolerating small typos
    pub fn fuzzy_term(&self, query: &str) -> Option<&TermEntry> {
        if let Some(entry) = self.term(query) {
            return Some(entry);
        }
        let query = query.trim().to_lowercase();
        if query.len() < MIN_FUZZY_LENGTH {
            return None;
        }
        self.terms
            .iter()
            .filter(|(key, _)| key.len() >= MIN_FUZZY_LENGTH)
            .map(|(key, entry)| (levenshtein::levenshtein(&query, key), key, entry))
            .filter(|(distance, _, _)| *distance <= MAX_FUZZY_DISTANCE)
            .min_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)))
            .map(|(_, _, entry)| entry)
    }

    /// Terms mentioned as whole words in `text`, in order of appearance
    pub fn terms_in(&self, text: &str) -> Vec<&TermEntry> {
        let mut found: Vec<(usize, &TermEntry)> = Vec::new();
        let lower = text.to_lowercase();
        for word_start in word_positions(&lower) {
            let (start, word) = word_start;
            if let Some(entry) = self.terms.get(word) {
                if !found.iter().any(|(_, e)| e.term == entry.term) {
                    found.push((start, entry));
                }
            }
        }
        found.sort_by_key(|(pos, _)| *pos);
        found.into_iter().map(|(_, e)| e).collect()
    }

    /// Whether `token` is a known two/three-letter abbreviation
    pub fn is_abbreviation(&self, token: &str) -> bool {
        self.term(token)
            .map(|t| t.is_short_abbreviation())
            .unwrap_or(false)
    }

    /// Exact code lookup (all code sets)
    pub fn codes(&self, code: &str) -> &[CodeEntry] {
        self.codes
            .get(&code.trim().to_uppercase())
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Exact code lookup restricted to a code set
    pub fn code(&self, code: &str, code_set: CodeSet) -> Option<&CodeEntry> {
        self.codes(code).iter().find(|c| c.code_set == code_set)
    }

    /// Nearby codes for a code that is not in the tables
    pub fn suggest_codes(&self, code: &str, code_set: CodeSet, limit: usize) -> Vec<&CodeEntry> {
        let wanted = code.trim().to_uppercase();
        let prefix: String = wanted.chars().take(3).collect();

        let mut scored: Vec<(usize, &CodeEntry)> = self
            .codes
            .values()
            .flatten()
            .filter(|c| c.code_set == code_set)
            .filter_map(|c| {
                let distance = levenshtein::levenshtein(&wanted, &c.code);
                if c.code.starts_with(&prefix) || distance <= MAX_FUZZY_DISTANCE {
                    Some((distance, c))
                } else {
                    None
                }
            })
            .collect();

        scored.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.code.cmp(&b.1.code)));
        scored.into_iter().take(limit).map(|(_, c)| c).collect()
    }

    /// Codes filtered by set and/or specialty, sorted by code
    pub fn list_codes(
        &self,
        code_set: Option<CodeSet>,
        specialty: Option<&str>,
    ) -> Vec<&CodeEntry> {
        let mut codes: Vec<&CodeEntry> = self
            .codes
            .values()
            .flatten()
            .filter(|c| code_set.map_or(true, |set| c.code_set == set))
            .filter(|c| specialty.map_or(true, |s| c.specialties.iter().any(|cs| cs == s)))
            .collect();
        codes.sort_by(|a, b| a.code_set.cmp(&b.code_set).then_with(|| a.code.cmp(&b.code)));
        codes
    }

    /// Codes whose description mentions `query` (case-insensitive)
    pub fn search_codes(&self, query: &str, limit: usize) -> Vec<&CodeEntry> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Vec::new();
        }
        let mut codes: Vec<&CodeEntry> = self
            .codes
            .values()
            .flatten()
            .filter(|c| c.description.to_lowercase().contains(&query))
            .collect();
        codes.sort_by(|a, b| a.code_set.cmp(&b.code_set).then_with(|| a.code.cmp(&b.code)));
        codes.truncate(limit);
        codes
    }

    /// All specialty tags present in the code tables
    pub fn specialties(&self) -> BTreeSet<&str> {
        self.codes
            .values()
            .flatten()
            .flat_map(|c| c.specialties.iter().map(String::as_str))
            .collect()
    }

    /// Guidance for a form field, tolerating label-style names
    pub fn field_guidance(&self, field: &str) -> Option<&FieldGuidance> {
        let key = normalize_field_key(field);
        if let Some(guidance) = self.fields.get(&key) {
            return Some(guidance);
        }
        self.fields
            .values()
            .find(|f| normalize_field_key(&f.label) == key)
            .or_else(|| {
                self.fields
                    .iter()
                    .map(|(k, f)| (levenshtein::levenshtein(&key, k), f))
                    .filter(|(d, _)| *d <= MAX_FUZZY_DISTANCE)
                    .min_by_key(|(d, _)| *d)
                    .map(|(_, f)| f)
            })
    }

    /// Fields whose key or label is mentioned in `text`
    pub fn fields_in(&self, text: &str) -> Vec<&FieldGuidance> {
        let lower = text.to_lowercase();
        let mut found: Vec<&FieldGuidance> = self
            .fields
            .values()
            .filter(|f| {
                lower.contains(&f.label.to_lowercase())
                    || lower.contains(&f.field.replace('_', " "))
            })
            .collect();
        found.sort_by(|a, b| a.field.cmp(&b.field));
        found
    }

    /// Best guide for `topic` by number of keywords contained in `text`
    pub fn find_guide(&self, topic: GuideTopic, text: &str) -> Option<&GuideEntry> {
        let lower = text.to_lowercase();
        self.guides
            .iter()
            .filter(|g| g.topic == topic)
            .map(|g| {
                let hits = g.keywords.iter().filter(|k| lower.contains(k.as_str())).count();
                (hits, g)
            })
            .filter(|(hits, _)| *hits > 0)
            // max_by_key keeps the last maximum; reverse so declaration order wins ties
            .rev()
            .max_by_key(|(hits, _)| *hits)
            .map(|(_, g)| g)
    }

    pub fn guides(&self, topic: GuideTopic) -> impl Iterator<Item = &GuideEntry> {
        self.guides.iter().filter(move |g| g.topic == topic)
    }

    pub fn conditions(&self) -> &[VocabularyEntry] {
        &self.conditions
    }

    pub fn procedures(&self) -> &[VocabularyEntry] {
        &self.procedures
    }

    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    pub fn code_count(&self) -> usize {
        self.codes.values().map(Vec::len).sum()
    }
}

/// Normalize "Date of Service" / "date-of-service" to "date_of_service"
pub fn normalize_field_key(field: &str) -> String {
    field
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .split('_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// Byte offsets and slices of alphanumeric words (keeps inner '-' and '.')
fn word_positions(text: &str) -> Vec<(usize, &str)> {
    let mut words = Vec::new();
    let mut start: Option<usize> = None;
    for (i, c) in text.char_indices() {
        let part_of_word = c.is_alphanumeric() || ((c == '-' || c == '.') && start.is_some());
        match (part_of_word, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                words.push((s, text[s..i].trim_end_matches(['-', '.'])));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        words.push((s, text[s..].trim_end_matches(['-', '.'])));
    }
    words
}
