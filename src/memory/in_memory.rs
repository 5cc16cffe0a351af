//! Process-local memory store
//!
//! Backs tests and deployments without a database. Data is lost on restart.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::store::{
    build_conversation, build_entry, bump_term_usage, rank_term_usage, MemoryStore,
};
use crate::error::{FormHelperError, Result};
use crate::types::{
    ConversationRecord, CreateConversationInput, CreateEntryInput, EntryKey, MedicalTermUsage,
    MemoryEntry, MemoryStats, MemoryType,
};

#[derive(Default)]
struct Inner {
    entries: HashMap<EntryKey, MemoryEntry>,
    conversations: Vec<ConversationRecord>,
    /// (user id, term) -> usage
    terms: HashMap<(String, String), MedicalTermUsage>,
}

/// `parking_lot`-guarded maps
pub struct InMemoryMemoryStore {
    inner: RwLock<Inner>,
    available: AtomicBool,
}

impl Default for InMemoryMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryMemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            available: AtomicBool::new(true),
        }
    }

    /// Toggle availability. While unavailable every call fails with
    /// `MemoryUnavailable`, as a disconnected remote store would.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(FormHelperError::MemoryUnavailable(
                "in-memory store marked unavailable".to_string(),
            ))
        }
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    fn backend(&self) -> &'static str {
        "in-memory"
    }

    async fn ping(&self) -> Result<()> {
        self.check()
    }

    async fn put_entry(&self, input: CreateEntryInput) -> Result<MemoryEntry> {
        self.check()?;
        let mut inner = self.inner.write();
        let key = input.key.clone();
        let entry = build_entry(input, inner.entries.get(&key));
        inner.entries.insert(key, entry.clone());
        Ok(entry)
    }

    async fn get_entry(&self, key: &EntryKey) -> Result<Option<MemoryEntry>> {
        self.check()?;
        Ok(self.inner.read().entries.get(key).cloned())
    }

    async fn update_entry(&self, key: &EntryKey, value: serde_json::Value) -> Result<MemoryEntry> {
        self.check()?;
        let mut inner = self.inner.write();
        let existing = inner
            .entries
            .get(key)
            .ok_or_else(|| FormHelperError::NotFound(key.key.clone()))?;
        let entry = build_entry(CreateEntryInput::new(key.clone(), value), Some(existing));
        inner.entries.insert(key.clone(), entry.clone());
        Ok(entry)
    }

    async fn delete_entry(&self, key: &EntryKey) -> Result<bool> {
        self.check()?;
        Ok(self.inner.write().entries.remove(key).is_some())
    }

    async fn list_entries(
        &self,
        user_id: &str,
        memory_type: Option<MemoryType>,
    ) -> Result<Vec<MemoryEntry>> {
        self.check()?;
        let inner = self.inner.read();
        let mut entries: Vec<MemoryEntry> = inner
            .entries
            .values()
            .filter(|e| e.user_id.as_deref() == Some(user_id))
            .filter(|e| memory_type.map_or(true, |t| e.memory_type == t))
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.key.cmp(&b.key)));
        Ok(entries)
    }

    async fn clear_user(&self, user_id: &str) -> Result<u64> {
        self.check()?;
        let mut inner = self.inner.write();
        let before = inner.entries.len() + inner.conversations.len() + inner.terms.len();
        inner.entries.retain(|_, e| e.user_id.as_deref() != Some(user_id));
        inner.conversations.retain(|c| c.user_id != user_id);
        inner.terms.retain(|(owner, _), _| owner != user_id);
        let after = inner.entries.len() + inner.conversations.len() + inner.terms.len();
        Ok((before - after) as u64)
    }

    async fn create_conversation(
        &self,
        input: CreateConversationInput,
    ) -> Result<ConversationRecord> {
        self.check()?;
        let record = build_conversation(input);
        self.inner.write().conversations.push(record.clone());
        Ok(record)
    }

    async fn list_conversations(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationRecord>> {
        self.check()?;
        let inner = self.inner.read();
        Ok(inner
            .conversations
            .iter()
            .rev()
            .filter(|c| c.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn upsert_term_usage(
        &self,
        term: &str,
        user_id: &str,
        context: &[String],
    ) -> Result<MedicalTermUsage> {
        self.check()?;
        let mut inner = self.inner.write();
        let key = (user_id.to_string(), term.to_string());
        let usage = bump_term_usage(inner.terms.remove(&key), term, user_id, context);
        inner.terms.insert(key, usage.clone());
        Ok(usage)
    }

    async fn term_usage(&self, user_id: &str, limit: usize) -> Result<Vec<MedicalTermUsage>> {
        self.check()?;
        let inner = self.inner.read();
        let mut usages: Vec<MedicalTermUsage> = inner
            .terms
            .values()
            .filter(|u| u.user_id == user_id)
            .cloned()
            .collect();
        rank_term_usage(&mut usages);
        usages.truncate(limit);
        Ok(usages)
    }

    async fn stats(&self, user_id: Option<&str>) -> Result<MemoryStats> {
        self.check()?;
        let inner = self.inner.read();
        let owned = |owner: Option<&str>| user_id.map_or(true, |u| owner == Some(u));

        let mut stats = MemoryStats {
            backend: self.backend().to_string(),
            ..Default::default()
        };
        for entry in inner.entries.values().filter(|e| owned(e.user_id.as_deref())) {
            stats.total_entries += 1;
            *stats
                .entries_by_type
                .entry(entry.memory_type.as_str().to_string())
                .or_insert(0) += 1;
        }
        stats.conversations = inner
            .conversations
            .iter()
            .filter(|c| owned(Some(c.user_id.as_str())))
            .count() as i64;

        let mut distinct = std::collections::HashSet::new();
        for usage in inner.terms.values().filter(|u| owned(Some(u.user_id.as_str()))) {
            distinct.insert(usage.term.as_str());
            stats.total_term_usages += i64::from(usage.usage_count);
        }
        stats.distinct_terms = distinct.len() as i64;
        Ok(stats)
    }
}
