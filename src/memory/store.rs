//! Memory store abstraction
//!
//! The assistant only issues requests through [`MemoryStore`]; the store owns
//! persistence. Implementations must be safe to share across concurrent
//! queries.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::types::{
    ConversationRecord, CreateConversationInput, CreateEntryInput, EntryKey, MedicalTermUsage,
    MemoryEntry, MemoryMetadata, MemoryStats, MemoryType,
};

/// CRUD over entries, conversations and term usage
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Backend label reported in stats (e.g. "in-memory", "sqlite-wal")
    fn backend(&self) -> &'static str;

    /// Cheap availability probe
    async fn ping(&self) -> Result<()>;

    /// Create the entry, or overwrite the value of the entry with the same key
    async fn put_entry(&self, input: CreateEntryInput) -> Result<MemoryEntry>;

    async fn get_entry(&self, key: &EntryKey) -> Result<Option<MemoryEntry>>;

    /// Replace the value of an existing entry; `NotFound` when absent
    async fn update_entry(&self, key: &EntryKey, value: serde_json::Value) -> Result<MemoryEntry>;

    /// Returns whether an entry was removed
    async fn delete_entry(&self, key: &EntryKey) -> Result<bool>;

    /// Entries owned by `user_id`, optionally of one type, oldest first
    async fn list_entries(
        &self,
        user_id: &str,
        memory_type: Option<MemoryType>,
    ) -> Result<Vec<MemoryEntry>>;

    /// Remove every entry, conversation and term usage of a user.
    ///
    /// Returns the number of records removed.
    async fn clear_user(&self, user_id: &str) -> Result<u64>;

    async fn create_conversation(&self, input: CreateConversationInput)
        -> Result<ConversationRecord>;

    /// Conversations of a user, newest first
    async fn list_conversations(&self, user_id: &str, limit: usize)
        -> Result<Vec<ConversationRecord>>;

    /// First use creates the record with count 1; later uses increment the
    /// count and append `context` tags.
    async fn upsert_term_usage(
        &self,
        term: &str,
        user_id: &str,
        context: &[String],
    ) -> Result<MedicalTermUsage>;

    /// Term usage of a user, most used first (ties: most recent first)
    async fn term_usage(&self, user_id: &str, limit: usize) -> Result<Vec<MedicalTermUsage>>;

    /// Aggregate statistics, for one user or the whole store
    async fn stats(&self, user_id: Option<&str>) -> Result<MemoryStats>;
}

/// Build a fresh entry, or the updated version of `existing`
pub(crate) fn build_entry(input: CreateEntryInput, existing: Option<&MemoryEntry>) -> MemoryEntry {
    let now = Utc::now();
    let metadata = MemoryMetadata {
        timestamp: now,
        importance: input
            .importance
            .map(|i| i.clamp(0.0, 1.0))
            .or(existing.map(|e| e.metadata.importance))
            .unwrap_or(0.5),
        tags: if input.tags.is_empty() {
            existing.map(|e| e.metadata.tags.clone()).unwrap_or_default()
        } else {
            input.tags
        },
        expires_at: input
            .ttl_seconds
            .map(|ttl| now + Duration::seconds(ttl))
            .or(existing.and_then(|e| e.metadata.expires_at)),
    };

    MemoryEntry {
        id: existing
            .map(|e| e.id.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        user_id: input.key.user_id,
        session_id: input.key.session_id,
        memory_type: input.key.memory_type,
        key: input.key.key,
        value: input.value,
        metadata,
        created_at: existing.map(|e| e.created_at).unwrap_or(now),
        updated_at: now,
    }
}

pub(crate) fn build_conversation(input: CreateConversationInput) -> ConversationRecord {
    ConversationRecord {
        id: Uuid::new_v4().to_string(),
        user_id: input.user_id,
        session_id: input.session_id,
        messages: input.messages,
        context: input.context,
        summary: input.summary,
        created_at: Utc::now(),
    }
}

/// Apply one more use of a term to its usage record
pub(crate) fn bump_term_usage(
    existing: Option<MedicalTermUsage>,
    term: &str,
    user_id: &str,
    context: &[String],
) -> MedicalTermUsage {
    let now = Utc::now();
    match existing {
        Some(mut usage) => {
            usage.usage_count += 1;
            usage.last_used = now;
            usage.context.extend(context.iter().cloned());
            usage
        }
        None => MedicalTermUsage {
            term: term.to_string(),
            user_id: user_id.to_string(),
            usage_count: 1,
            last_used: now,
            context: context.to_vec(),
        },
    }
}

/// Most used first, then most recently used, then alphabetical
pub(crate) fn rank_term_usage(usages: &mut [MedicalTermUsage]) {
    usages.sort_by(|a, b| {
        b.usage_count
            .cmp(&a.usage_count)
            .then_with(|| b.last_used.cmp(&a.last_used))
            .then_with(|| a.term.cmp(&b.term))
    });
}

/// Whether an entry's expiry has passed at `now`
pub fn is_expired(entry: &MemoryEntry, now: DateTime<Utc>) -> bool {
    entry.metadata.expires_at.is_some_and(|at| at <= now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_entry_keeps_identity_on_update() {
        let key = EntryKey::user("u1", MemoryType::Preference, "response_style");
        let mut input = CreateEntryInput::new(key.clone(), json!("brief"));
        input.importance = Some(3.0);
        input.tags = vec!["style".into()];
        let first = build_entry(input, None);
        assert_eq!(first.metadata.importance, 1.0);

        let second = build_entry(CreateEntryInput::new(key, json!("detailed")), Some(&first));
        assert_eq!(second.id, first.id);
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.value, json!("detailed"));
        assert_eq!(second.metadata.tags, vec!["style".to_string()]);
    }

    #[test]
    fn test_bump_term_usage() {
        let first = bump_term_usage(None, "OD", "u1", &["terminology".into()]);
        assert_eq!(first.usage_count, 1);
        let second = bump_term_usage(Some(first), "OD", "u1", &["a".into(), "b".into()]);
        assert_eq!(second.usage_count, 2);
        assert_eq!(second.context.len(), 3);
    }

    #[test]
    fn test_ttl_expiry() {
        let mut input = CreateEntryInput::new(
            EntryKey::user("u1", MemoryType::Context, "snapshot"),
            json!({}),
        );
        input.ttl_seconds = Some(60);
        let entry = build_entry(input, None);
        assert!(!is_expired(&entry, Utc::now()));
        assert!(is_expired(&entry, Utc::now() + Duration::seconds(120)));
    }
}
