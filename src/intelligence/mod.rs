//! Query understanding
//!
//! Provides:
//! - Entity and code-token extraction
//! - Intent classification with override rules and confidence policy
//! - Generic-response detection
//! - The bounded interaction learning log

pub mod entities;
pub mod generic;
pub mod intent;
pub mod learning;

pub use entities::{
    extract_code_tokens, has_code_token, CodeToken, EntityCategory, EntityExtractor,
    ExtractionConfig, ExtractionResult, SemanticEntity,
};
pub use generic::{is_generic_response, FILLER_PHRASES};
pub use intent::{
    BulkListingRequest, ConfidenceLevel, ConfidencePolicy, Intent, IntentCandidate,
    IntentClassification, IntentClassifier, OVERRIDE_CONFIDENCE, is_bulk_listing_request,
};
pub use learning::{InteractionLog, InteractionLogEntry, InteractionStats};
