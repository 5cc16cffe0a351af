//! Core types for the form assistant

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identifier of a memory entry or conversation record
pub type RecordId = String;

/// Kind of a stored memory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Conversation,
    Preference,
    Learning,
    #[default]
    Context,
    MedicalTerm,
    FormData,
}

impl MemoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Conversation => "conversation",
            MemoryType::Preference => "preference",
            MemoryType::Learning => "learning",
            MemoryType::Context => "context",
            MemoryType::MedicalTerm => "medical_term",
            MemoryType::FormData => "form_data",
        }
    }

    pub fn all() -> [MemoryType; 6] {
        [
            MemoryType::Conversation,
            MemoryType::Preference,
            MemoryType::Learning,
            MemoryType::Context,
            MemoryType::MedicalTerm,
            MemoryType::FormData,
        ]
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MemoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "conversation" => Ok(MemoryType::Conversation),
            "preference" => Ok(MemoryType::Preference),
            "learning" => Ok(MemoryType::Learning),
            "context" => Ok(MemoryType::Context),
            "medical_term" | "medical-term" => Ok(MemoryType::MedicalTerm),
            "form_data" | "form-data" => Ok(MemoryType::FormData),
            _ => Err(format!("Unknown memory type: {}", s)),
        }
    }
}

/// Bookkeeping attached to every memory entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryMetadata {
    /// When the value was last written
    pub timestamp: DateTime<Utc>,
    /// Importance score (0.0 - 1.0)
    #[serde(default = "default_importance")]
    pub importance: f32,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Optional expiry; expired entries are still only removed by an explicit clear
    pub expires_at: Option<DateTime<Utc>>,
}

impl Default for MemoryMetadata {
    fn default() -> Self {
        Self {
            timestamp: Utc::now(),
            importance: default_importance(),
            tags: Vec::new(),
            expires_at: None,
        }
    }
}

fn default_importance() -> f32 {
    0.5
}

/// A stored memory entry, owned by the memory store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: RecordId,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    #[serde(rename = "type")]
    pub memory_type: MemoryType,
    pub key: String,
    /// Arbitrary payload
    pub value: serde_json::Value,
    #[serde(default)]
    pub metadata: MemoryMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Addressing tuple for a memory entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryKey {
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub memory_type: MemoryType,
    pub key: String,
}

impl EntryKey {
    /// Key scoped to a user only (no session)
    pub fn user(user_id: &str, memory_type: MemoryType, key: &str) -> Self {
        Self {
            user_id: Some(user_id.to_string()),
            session_id: None,
            memory_type,
            key: key.to_string(),
        }
    }

    /// Key scoped to a user's session
    pub fn session(user_id: &str, session_id: &str, memory_type: MemoryType, key: &str) -> Self {
        Self {
            user_id: Some(user_id.to_string()),
            session_id: Some(session_id.to_string()),
            memory_type,
            key: key.to_string(),
        }
    }
}

/// Input for creating a memory entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEntryInput {
    #[serde(flatten)]
    pub key: EntryKey,
    pub value: serde_json::Value,
    #[serde(default)]
    pub importance: Option<f32>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Time-to-live in seconds (None = never expires)
    #[serde(default)]
    pub ttl_seconds: Option<i64>,
}

impl CreateEntryInput {
    pub fn new(key: EntryKey, value: serde_json::Value) -> Self {
        Self {
            key,
            value,
            importance: None,
            tags: Vec::new(),
            ttl_seconds: None,
        }
    }
}

/// Speaker of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
        }
    }
}

impl std::str::FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            "system" => Ok(MessageRole::System),
            _ => Err(format!("Unknown message role: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// One persisted turn pair (user input + assistant answer)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: RecordId,
    pub user_id: String,
    pub session_id: String,
    pub messages: Vec<ConversationMessage>,
    /// Snapshot of the form context at the time of the turn
    #[serde(default)]
    pub context: serde_json::Value,
    pub summary: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a conversation record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateConversationInput {
    pub user_id: String,
    pub session_id: String,
    pub messages: Vec<ConversationMessage>,
    #[serde(default)]
    pub context: serde_json::Value,
    pub summary: Option<String>,
}

/// Per-user usage of a recognized medical term
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicalTermUsage {
    pub term: String,
    pub user_id: String,
    pub usage_count: u32,
    pub last_used: DateTime<Utc>,
    /// Context tags accumulated across every recorded use
    #[serde(default)]
    pub context: Vec<String>,
}

/// Aggregate statistics reported by a memory store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total_entries: i64,
    pub entries_by_type: HashMap<String, i64>,
    pub conversations: i64,
    pub distinct_terms: i64,
    pub total_term_usages: i64,
    /// Storage backend label (e.g. "in-memory", "sqlite-wal")
    pub backend: String,
}

/// Where the user currently is in the billing form
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormContext {
    /// Form being filled (e.g. "cms1500", "eye_exam_claim")
    pub form_type: Option<String>,
    /// Field that currently has focus
    pub active_field: Option<String>,
    /// Wizard step or section label
    pub step: Option<String>,
    /// Free-form extra context from the host application
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

impl FormContext {
    pub fn is_empty(&self) -> bool {
        self.form_type.is_none()
            && self.active_field.is_none()
            && self.step.is_none()
            && self.extra.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// An incoming query from the host application
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    pub text: String,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    #[serde(default)]
    pub context: FormContext,
}

impl QueryRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_context(mut self, context: FormContext) -> Self {
        self.context = context;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_type_round_trip_names() {
        for t in MemoryType::all() {
            assert_eq!(t.as_str().parse::<MemoryType>().unwrap(), t);
        }
        assert!("bogus".parse::<MemoryType>().is_err());
    }

    #[test]
    fn test_memory_type_serde_is_snake_case() {
        let json = serde_json::to_string(&MemoryType::MedicalTerm).unwrap();
        assert_eq!(json, "\"medical_term\"");
    }

    #[test]
    fn test_form_context_empty() {
        assert!(FormContext::default().is_empty());
        let ctx = FormContext {
            active_field: Some("diagnosis_code".into()),
            ..Default::default()
        };
        assert!(!ctx.is_empty());
    }
}
