//! Response handlers for the local strategy chain
//!
//! Each handler answers one kind of question from the knowledge base, or
//! returns `None` so the chain can move on. Handlers never fail.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::intelligence::{
    CodeToken, EntityCategory, ExtractionResult, Intent, IntentClassification,
};
use crate::knowledge::{CodeEntry, CodeSet, GuideEntry, GuideTopic, KnowledgeBase};
use crate::types::FormContext;

/// Maximum suggestions offered for an unknown code
const MAX_SUGGESTIONS: usize = 3;

/// Maximum codes listed for a description search
const MAX_SEARCH_RESULTS: usize = 6;

/// Term candidates after "what is", "define", "meaning of" ...
static TERM_QUESTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:what\s+(?:is|are|does)|define|definition\s+of|meaning\s+of|explain)\s+(?:an?\s+|the\s+)?([a-z0-9][a-z0-9\-]*(?:\s+[a-z0-9][a-z0-9\-]*)?)",
    )
    .expect("valid regex")
});

/// Everything a handler may look at for one query
pub struct HandlerInput<'a> {
    pub text: &'a str,
    pub classification: &'a IntentClassification,
    pub extraction: &'a ExtractionResult,
    pub context: &'a FormContext,
    pub kb: &'a KnowledgeBase,
}

impl HandlerInput<'_> {
    fn lower(&self) -> String {
        self.text.to_lowercase()
    }
}

/// One strategy in the local chain
pub trait ResponseHandler: Send + Sync {
    /// Stable name for logs and diagnostics
    fn name(&self) -> &'static str;

    /// Intents dispatched directly to this handler
    fn serves(&self, intent: Intent) -> bool;

    /// An answer, or `None` when the input is not this handler's business
    fn handle(&self, input: &HandlerInput<'_>) -> Option<String>;
}

/// Handlers in chain order
pub fn default_handlers() -> Vec<Box<dyn ResponseHandler>> {
    vec![
        Box::new(CodeLookupHandler),
        Box::new(TerminologyHandler),
        Box::new(GuideHandler::provider()),
        Box::new(GuideHandler::eligibility()),
        Box::new(GuideHandler::claims()),
        Box::new(WorkflowHandler),
        Box::new(GuideHandler::mobile()),
        Box::new(GeneralHandler),
    ]
}

// ---------------------------------------------------------------------------
// Code lookup
// ---------------------------------------------------------------------------

/// Resolves literal codes, bulk listings and "code for X" questions
pub struct CodeLookupHandler;

impl ResponseHandler for CodeLookupHandler {
    fn name(&self) -> &'static str {
        "code_lookup"
    }

    fn serves(&self, intent: Intent) -> bool {
        matches!(intent, Intent::CodeLookup | Intent::BulkCodeListing)
    }

    fn handle(&self, input: &HandlerInput<'_>) -> Option<String> {
        if let Some(request) = &input.classification.bulk_request {
            return Some(bulk_listing(
                input.kb,
                request.code_set,
                request.specialty.as_deref(),
            ));
        }

        if !input.extraction.code_tokens.is_empty() {
            let sections: Vec<String> = input
                .extraction
                .code_tokens
                .iter()
                .map(|token| describe_code_token(input.kb, token))
                .collect();
            return Some(sections.join("\n\n"));
        }

        codes_for_entities(input)
    }
}

fn bulk_listing(kb: &KnowledgeBase, code_set: Option<CodeSet>, specialty: Option<&str>) -> String {
    let codes = kb.list_codes(code_set, specialty);
    let set_label = code_set.map(|s| s.label()).unwrap_or("All");
    let heading = match specialty {
        Some(s) => format!("{} codes for {}", set_label, s),
        None => format!("{} codes", set_label),
    };

    if codes.is_empty() {
        let known: Vec<&str> = kb.specialties().into_iter().collect();
        return format!(
            "No **{}** are in the built-in tables.\n\nAvailable specialties: {}",
            heading,
            known.join(", ")
        );
    }

    let mut out = format!("**{}** ({}):\n", heading, codes.len());
    for code in codes {
        out.push_str(&format_code_line(code));
        out.push('\n');
    }
    out.trim_end().to_string()
}

fn format_code_line(code: &CodeEntry) -> String {
    format!("- **{}** ({}): {}", code.code, code.code_set.label(), code.description)
}

fn describe_code_token(kb: &KnowledgeBase, token: &CodeToken) -> String {
    if let Some(entry) = kb.code(&token.normalized, token.code_set) {
        return format!(
            "**{}** ({}): {}",
            entry.code,
            entry.code_set.label(),
            entry.description
        );
    }

    // Same code under another set (e.g. "25" typed as a POS)
    if let Some(entry) = kb.codes(&token.normalized).first() {
        return format!(
            "**{}** ({}): {}",
            entry.code,
            entry.code_set.label(),
            entry.description
        );
    }

    let suggestions = kb.suggest_codes(&token.normalized, token.code_set, MAX_SUGGESTIONS);
    let mut out = format!(
        "**{}** was not found in the {} table.",
        token.normalized,
        token.code_set.label()
    );
    if suggestions.is_empty() {
        out.push_str(" Check the code against the current code book.");
    } else {
        out.push_str(" Did you mean:\n");
        let lines: Vec<String> = suggestions.into_iter().map(format_code_line).collect();
        out.push_str(&lines.join("\n"));
    }
    out
}

/// "What is the code for diabetic retinopathy?"
fn codes_for_entities(input: &HandlerInput<'_>) -> Option<String> {
    if input.classification.intent != Intent::CodeLookup {
        return None;
    }

    let mut sections = Vec::new();
    for entity in &input.extraction.entities {
        if entity.category == EntityCategory::Code {
            continue;
        }
        let mut codes = input.kb.search_codes(&entity.normalized, MAX_SEARCH_RESULTS);
        if codes.is_empty() {
            codes = input.kb.search_codes(&entity.text, MAX_SEARCH_RESULTS);
        }
        if codes.is_empty() {
            continue;
        }
        let lines: Vec<String> = codes.into_iter().map(format_code_line).collect();
        sections.push(format!("Codes for **{}**:\n{}", entity.normalized, lines.join("\n")));
    }

    if sections.is_empty() {
        None
    } else {
        Some(sections.join("\n\n"))
    }
}

// ---------------------------------------------------------------------------
// Terminology
// ---------------------------------------------------------------------------

/// Explains abbreviations and billing terms
pub struct TerminologyHandler;

impl ResponseHandler for TerminologyHandler {
    fn name(&self) -> &'static str {
        "terminology"
    }

    fn serves(&self, intent: Intent) -> bool {
        intent == Intent::Terminology
    }

    fn handle(&self, input: &HandlerInput<'_>) -> Option<String> {
        let mut terms = input.kb.terms_in(input.text);

        if terms.is_empty() {
            // Tolerate typos in the asked-about term ("deductable")
            if let Some(caps) = TERM_QUESTION.captures(input.text) {
                let phrase = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                let found = input.kb.fuzzy_term(phrase).or_else(|| {
                    phrase
                        .split_whitespace()
                        .next()
                        .and_then(|first| input.kb.fuzzy_term(first))
                });
                terms.extend(found);
            }
        }

        if terms.is_empty() {
            return None;
        }

        let lines: Vec<String> = terms
            .iter()
            .map(|t| format!("**{}** means **{}**. {}", t.term, t.meaning, t.explanation))
            .collect();
        Some(lines.join("\n\n"))
    }
}

// ---------------------------------------------------------------------------
// Provider / eligibility / claims / mobile guidance
// ---------------------------------------------------------------------------

/// Template answers selected from the knowledge base's guide entries
pub struct GuideHandler {
    name: &'static str,
    topic: GuideTopic,
    intent: Intent,
}

impl GuideHandler {
    pub fn provider() -> Self {
        Self {
            name: "provider_lookup",
            topic: GuideTopic::Provider,
            intent: Intent::ProviderLookup,
        }
    }

    pub fn eligibility() -> Self {
        Self {
            name: "eligibility",
            topic: GuideTopic::Eligibility,
            intent: Intent::Eligibility,
        }
    }

    pub fn claims() -> Self {
        Self {
            name: "claims",
            topic: GuideTopic::Claims,
            intent: Intent::Claims,
        }
    }

    pub fn mobile() -> Self {
        Self {
            name: "mobile_features",
            topic: GuideTopic::Mobile,
            intent: Intent::MobileFeatures,
        }
    }
}

impl ResponseHandler for GuideHandler {
    fn name(&self) -> &'static str {
        self.name
    }

    fn serves(&self, intent: Intent) -> bool {
        intent == self.intent
    }

    fn handle(&self, input: &HandlerInput<'_>) -> Option<String> {
        let guide = input.kb.find_guide(self.topic, input.text)?;
        let mut out = format_guide(guide);
        if let Some(note) = entity_note(input) {
            out.push_str("\n\n");
            out.push_str(&note);
        }
        Some(out)
    }
}

fn format_guide(guide: &GuideEntry) -> String {
    let mut out = format!("**{}**\n\n{}", guide.title, guide.body);
    if !guide.steps.is_empty() {
        out.push('\n');
        for (i, step) in guide.steps.iter().enumerate() {
            out.push_str(&format!("\n{}. {}", i + 1, step));
        }
    }
    out
}

/// "Related to: ..." line naming the entities found in the query
fn entity_note(input: &HandlerInput<'_>) -> Option<String> {
    let names: Vec<&str> = input
        .extraction
        .entities
        .iter()
        .map(|e| e.normalized.as_str())
        .collect();
    if names.is_empty() {
        None
    } else {
        Some(format!("Related to: {}", names.join(", ")))
    }
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// Form-field help and step-by-step form guidance
pub struct WorkflowHandler;

impl WorkflowHandler {
    fn asks_about_current_field(lower: &str) -> bool {
        ["this field", "what goes", "what do i enter", "what do i put", "what should i enter"]
            .iter()
            .any(|p| lower.contains(p))
    }
}

impl ResponseHandler for WorkflowHandler {
    fn name(&self) -> &'static str {
        "workflow"
    }

    fn serves(&self, intent: Intent) -> bool {
        intent == Intent::Workflow
    }

    fn handle(&self, input: &HandlerInput<'_>) -> Option<String> {
        let lower = input.lower();

        let mut fields = input.kb.fields_in(input.text);
        if fields.is_empty() && Self::asks_about_current_field(&lower) {
            fields.extend(
                input
                    .context
                    .active_field
                    .as_deref()
                    .and_then(|f| input.kb.field_guidance(f)),
            );
        }

        let mut sections: Vec<String> = fields
            .iter()
            .map(|f| {
                let mut line = format!("**{}**: {}", f.label, f.help);
                if let Some(example) = &f.example {
                    line.push_str(&format!(" Example: `{}`", example));
                }
                line
            })
            .collect();

        if sections.is_empty() {
            sections.push(format_guide(input.kb.find_guide(GuideTopic::Workflow, input.text)?));
        }

        if let Some(step) = &input.context.step {
            sections.push(format!("You are on the **{}** step.", step));
        }
        Some(sections.join("\n\n"))
    }
}

// ---------------------------------------------------------------------------
// General
// ---------------------------------------------------------------------------

/// Greetings, thanks and "what can you do"
pub struct GeneralHandler;

impl ResponseHandler for GeneralHandler {
    fn name(&self) -> &'static str {
        "general"
    }

    fn serves(&self, intent: Intent) -> bool {
        intent == Intent::General
    }

    fn handle(&self, input: &HandlerInput<'_>) -> Option<String> {
        let lower = input.lower();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        if words.iter().any(|w| *w == "thanks" || *w == "thank") {
            return Some(
                "You're welcome. Ask about any code, abbreviation or form field whenever you need it."
                    .to_string(),
            );
        }

        let greeting = words
            .first()
            .is_some_and(|w| matches!(*w, "hi" | "hello" | "hey"));
        let capabilities = lower.contains("what can you do") || words.iter().any(|w| *w == "help");
        if greeting || capabilities {
            return Some(format!(
                "Hello! Here is what I can do:\n{}",
                CAPABILITY_MENU.join("\n")
            ));
        }
        None
    }
}

/// Supported capabilities, listed in greetings and contextual help
pub const CAPABILITY_MENU: &[&str] = &[
    "- Look up ICD-10, CPT, HCPCS, place-of-service and modifier codes (\"What is 92250?\")",
    "- Explain abbreviations and billing terms (\"What does OD mean?\")",
    "- List codes by specialty (\"Show all CPT codes for ophthalmology\")",
    "- Answer provider, eligibility and claims questions",
    "- Explain form fields and walk through the form",
    "- Describe mobile features such as voice input and card scanning",
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intelligence::{EntityExtractor, IntentClassifier};
    use std::sync::Arc;

    fn run(handler: &dyn ResponseHandler, text: &str, context: &FormContext) -> Option<String> {
        let kb = Arc::new(KnowledgeBase::builtin());
        let classification = IntentClassifier::new().classify(text);
        let extraction = EntityExtractor::new(kb.clone()).extract(text);
        let input = HandlerInput {
            text,
            classification: &classification,
            extraction: &extraction,
            context,
            kb: &kb,
        };
        handler.handle(&input)
    }

    #[test]
    fn test_code_lookup_known_code() {
        let out = run(&CodeLookupHandler, "what does 92250 cover", &FormContext::default())
            .unwrap();
        assert!(out.contains("**92250** (CPT): Fundus photography"));
    }

    #[test]
    fn test_code_lookup_unknown_code_suggests() {
        let out = run(&CodeLookupHandler, "92255", &FormContext::default()).unwrap();
        assert!(out.contains("**92255** was not found in the CPT table"));
        assert!(out.contains("92250"));
    }

    #[test]
    fn test_code_lookup_bulk_listing() {
        let out = run(
            &CodeLookupHandler,
            "show me all CPT codes for ophthalmology",
            &FormContext::default(),
        )
        .unwrap();
        assert!(out.starts_with("**CPT codes for ophthalmology**"));
        assert!(out.contains("92250"));
        assert!(!out.contains("99213"));
        assert!(!out.contains("E11.9"));
    }

    #[test]
    fn test_code_lookup_by_condition() {
        let out = run(
            &CodeLookupHandler,
            "which code for diabetic retinopathy",
            &FormContext::default(),
        )
        .unwrap();
        assert!(out.contains("E11.319"));
    }

    #[test]
    fn test_code_lookup_declines_other_questions() {
        let context = FormContext::default();
        assert!(run(&CodeLookupHandler, "how do I save a draft", &context).is_none());
    }

    #[test]
    fn test_terminology() {
        let out = run(&TerminologyHandler, "What is OD?", &FormContext::default()).unwrap();
        assert!(out.contains("Right Eye"));

        let out = run(&TerminologyHandler, "what is a deductable", &FormContext::default())
            .unwrap();
        assert!(out.contains("**deductible**"));

        assert!(run(&TerminologyHandler, "purple elephants", &FormContext::default()).is_none());
    }

    #[test]
    fn test_guide_handlers() {
        let out = run(&GuideHandler::claims(), "my claim was denied", &FormContext::default())
            .unwrap();
        assert!(out.starts_with("**Claim denials**"));
        assert!(out.contains("1. Read the reason code"));

        let out = run(
            &GuideHandler::eligibility(),
            "verify coverage for diabetic retinopathy exam",
            &FormContext::default(),
        )
        .unwrap();
        assert!(out.contains("Related to: diabetic retinopathy"));

        assert!(run(&GuideHandler::mobile(), "what is OD", &FormContext::default()).is_none());
    }

    #[test]
    fn test_workflow_uses_active_field() {
        let context = FormContext {
            active_field: Some("place_of_service".into()),
            step: Some("encounter".into()),
            ..Default::default()
        };
        let out = run(&WorkflowHandler, "what goes in this field?", &context).unwrap();
        assert!(out.contains("**Place of service**"));
        assert!(out.contains("You are on the **encounter** step."));
    }

    #[test]
    fn test_workflow_guide() {
        let out = run(&WorkflowHandler, "how do I fill out the form", &FormContext::default())
            .unwrap();
        assert!(out.contains("Completing a billing form"));
    }

    #[test]
    fn test_general() {
        let out = run(&GeneralHandler, "hello", &FormContext::default()).unwrap();
        assert!(out.contains("Look up ICD-10"));
        assert!(run(&GeneralHandler, "thanks!", &FormContext::default()).is_some());
        assert!(run(&GeneralHandler, "purple elephants", &FormContext::default()).is_none());
    }

    #[test]
    fn test_handler_outputs_are_not_generic() {
        use crate::intelligence::is_generic_response;
        let out = run(&GeneralHandler, "thanks", &FormContext::default()).unwrap();
        assert!(!is_generic_response(&out));
    }
}
