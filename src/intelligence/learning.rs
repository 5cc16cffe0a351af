//! Interaction learning log
//!
//! A bounded, in-process history of answered queries. Nothing here is
//! persisted; the log only feeds lightweight personalization hints.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::generic::is_generic_response;
use crate::types::FormContext;

/// Default number of interactions kept
pub const DEFAULT_CAPACITY: usize = 50;

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "a", "an", "is", "are", "was", "were", "be", "been", "have", "has", "had", "do",
        "does", "did", "will", "would", "could", "should", "can", "this", "that", "these",
        "those", "i", "you", "it", "we", "they", "what", "which", "who", "when", "where", "why",
        "how", "all", "each", "every", "some", "not", "only", "just", "and", "but", "or", "if",
        "as", "of", "at", "by", "for", "with", "about", "to", "from", "in", "on", "me", "my",
        "your", "our", "there", "here", "any", "need", "want", "use", "mean", "please", "show",
    ]
    .into_iter()
    .collect()
});

/// One answered query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionLogEntry {
    pub input: String,
    pub response: String,
    pub user_id: Option<String>,
    pub context: FormContext,
    pub timestamp: DateTime<Utc>,
    /// `true` when the response was not generic
    pub success: bool,
}

/// Snapshot of the log's contents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractionStats {
    pub entries: usize,
    pub successes: usize,
    pub capacity: usize,
    /// Fraction of successful entries, 0.0 when empty
    pub success_rate: f64,
}

/// Fixed-capacity ring buffer of interactions, oldest evicted first
#[derive(Debug)]
pub struct InteractionLog {
    entries: Mutex<VecDeque<InteractionLogEntry>>,
    capacity: usize,
}

impl Default for InteractionLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl InteractionLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Append an interaction; success is derived from the response text.
    ///
    /// Returns the success flag that was stored.
    pub fn record(
        &self,
        input: &str,
        response: &str,
        user_id: Option<&str>,
        context: &FormContext,
    ) -> bool {
        let success = !is_generic_response(response);
        let entry = InteractionLogEntry {
            input: input.to_string(),
            response: response.to_string(),
            user_id: user_id.map(str::to_string),
            context: context.clone(),
            timestamp: Utc::now(),
            success,
        };

        // Eviction and push happen under one lock so concurrent writers
        // cannot interleave between them.
        let mut entries = self.entries.lock();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
        success
    }

    /// Most frequent tokens across recent successful inputs.
    ///
    /// Entries are filtered by `user_id` and `form_type` when given. Ties are
    /// broken alphabetically so the result is stable.
    pub fn personalized_hints(
        &self,
        user_id: Option<&str>,
        form_type: Option<&str>,
        limit: usize,
    ) -> Vec<String> {
        let entries = self.entries.lock();
        let mut counts: HashMap<String, usize> = HashMap::new();

        for entry in entries.iter().filter(|e| e.success) {
            if user_id.is_some() && entry.user_id.as_deref() != user_id {
                continue;
            }
            if form_type.is_some() && entry.context.form_type.as_deref() != form_type {
                continue;
            }
            for token in hint_tokens(&entry.input) {
                *counts.entry(token).or_insert(0) += 1;
            }
        }
        drop(entries);

        let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.into_iter().take(limit).map(|(t, _)| t).collect()
    }

    /// Most recent entries, newest last
    pub fn recent(&self, limit: usize) -> Vec<InteractionLogEntry> {
        let entries = self.entries.lock();
        let skip = entries.len().saturating_sub(limit);
        entries.iter().skip(skip).cloned().collect()
    }

    pub fn stats(&self) -> InteractionStats {
        let entries = self.entries.lock();
        let successes = entries.iter().filter(|e| e.success).count();
        let success_rate = if entries.is_empty() {
            0.0
        } else {
            successes as f64 / entries.len() as f64
        };
        InteractionStats {
            entries: entries.len(),
            successes,
            capacity: self.capacity,
            success_rate,
        }
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// Distinct, lowercase, non-stop-word tokens of an input
fn hint_tokens(input: &str) -> HashSet<String> {
    input
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric() && c != '.')
        .map(|w| w.trim_matches('.'))
        .filter(|w| w.len() > 1 && !STOP_WORDS.contains(w))
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn form(form_type: &str) -> FormContext {
        FormContext {
            form_type: Some(form_type.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_record_derives_success() {
        let log = InteractionLog::default();
        assert!(log.record("What is OD?", "**OD** means Right Eye", None, &FormContext::default()));
        assert!(!log.record("hmm", "I'd be happy to help!", None, &FormContext::default()));
        let stats = log.stats();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.successes, 1);
        assert!((stats.success_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_ring_buffer_evicts_oldest() {
        let log = InteractionLog::new(3);
        for i in 0..5 {
            log.record(&format!("query {}", i), "answer", None, &FormContext::default());
        }
        assert_eq!(log.len(), 3);
        let inputs: Vec<String> = log.recent(10).into_iter().map(|e| e.input).collect();
        assert_eq!(inputs, vec!["query 2", "query 3", "query 4"]);
    }

    #[test]
    fn test_default_capacity_is_fifty() {
        let log = InteractionLog::default();
        for i in 0..60 {
            log.record(&format!("q{}", i), "answer", None, &FormContext::default());
        }
        assert_eq!(log.len(), 50);
        assert_eq!(log.recent(1)[0].input, "q59");
    }

    #[test]
    fn test_personalized_hints_ranked() {
        let log = InteractionLog::default();
        let ctx = form("eye_exam_claim");
        log.record("What is the code for glaucoma?", "H40.10", Some("u1"), &ctx);
        log.record("glaucoma screening code", "G0117", Some("u1"), &ctx);
        log.record("retinopathy code", "E11.319", Some("u1"), &ctx);
        // Failed interactions do not contribute
        log.record("glaucoma glaucoma", "", Some("u1"), &ctx);

        let hints = log.personalized_hints(Some("u1"), Some("eye_exam_claim"), 2);
        assert_eq!(hints, vec!["code", "glaucoma"]);
    }

    #[test]
    fn test_personalized_hints_filters_user_and_form() {
        let log = InteractionLog::default();
        log.record("modifier 25", "**25**: separate E/M", Some("u1"), &form("cms1500"));
        log.record("telehealth pos", "**02**: telehealth", Some("u2"), &form("cms1500"));

        assert_eq!(log.personalized_hints(Some("u2"), None, 5), vec!["pos", "telehealth"]);
        assert!(log.personalized_hints(Some("u1"), Some("other"), 5).is_empty());
        assert_eq!(log.personalized_hints(None, None, 10).len(), 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_records_stay_bounded() {
        let log = Arc::new(InteractionLog::new(20));
        let tasks: Vec<_> = (0..200)
            .map(|i| {
                let log = log.clone();
                tokio::spawn(async move {
                    log.record(
                        &format!("question {}", i),
                        "Use modifier 25 on the office visit line.",
                        Some("u1"),
                        &FormContext::default(),
                    )
                })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap());
        }

        assert_eq!(log.len(), 20);
        let recent = log.recent(50);
        assert_eq!(recent.len(), 20);
        let distinct: HashSet<&str> =
            recent.iter().map(|e| e.input.as_str()).collect();
        assert_eq!(distinct.len(), 20);
        assert_eq!(log.stats().entries, 20);
    }

    #[test]
    fn test_clear() {
        let log = InteractionLog::new(5);
        log.record("a b", "answer", None, &FormContext::default());
        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.stats().success_rate, 0.0);
    }
}
