//! Memory-backed personalization around the routing pipeline
//!
//! Every step is best-effort: failures and timeouts are logged and skipped,
//! and never change the primary answer.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::store::MemoryStore;
use crate::config::{MemoryConfig, PersonalizationConfig};
use crate::error::Result;
use crate::intelligence::{ExtractionResult, Intent, IntentClassification};
use crate::knowledge::KnowledgeBase;
use crate::types::{
    ConversationMessage, CreateConversationInput, CreateEntryInput, EntryKey, MemoryType,
    MessageRole, QueryRequest,
};

/// Preference key holding the response style
pub const RESPONSE_STYLE_KEY: &str = "response_style";

/// Entry key of the per-session context snapshot
pub const CONTEXT_SNAPSHOT_KEY: &str = "current_context";

/// Session id used when the caller supplies none
const DEFAULT_SESSION: &str = "default";

/// Context snapshots expire after a day
const SNAPSHOT_TTL_SECS: i64 = 86_400;

/// Memory state gathered before routing
#[derive(Debug, Clone, Default, Serialize)]
pub struct OverlaySession {
    pub user_id: Option<String>,
    pub session_id: String,
    /// Whether the store answered the availability probe
    pub available: bool,
    pub preferences: HashMap<String, serde_json::Value>,
    /// Terms recorded for this query
    pub recorded_terms: Vec<String>,
}

impl OverlaySession {
    pub fn wants_detail(&self) -> bool {
        self.preferences
            .get(RESPONSE_STYLE_KEY)
            .and_then(|v| v.as_str())
            .is_some_and(|s| s.eq_ignore_ascii_case("detailed"))
    }

    fn active_user(&self) -> Option<&str> {
        if self.available {
            self.user_id.as_deref()
        } else {
            None
        }
    }
}

/// What personalization added to a response
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Personalization {
    pub detail_added: bool,
    pub related_terms: Vec<String>,
}

/// Reads and writes per-user memory around each query
pub struct PersonalizationOverlay {
    store: Option<Arc<dyn MemoryStore>>,
    kb: Arc<KnowledgeBase>,
    config: MemoryConfig,
    personalization: PersonalizationConfig,
    /// Session id -> probe result
    probes: DashMap<String, bool>,
}

impl PersonalizationOverlay {
    pub fn new(
        store: Option<Arc<dyn MemoryStore>>,
        kb: Arc<KnowledgeBase>,
        config: MemoryConfig,
        personalization: PersonalizationConfig,
    ) -> Self {
        let store = if config.enabled { store } else { None };
        Self {
            store,
            kb,
            config,
            personalization,
            probes: DashMap::new(),
        }
    }

    /// Overlay with no store; every step is a no-op
    pub fn disabled(kb: Arc<KnowledgeBase>) -> Self {
        Self::new(
            None,
            kb,
            MemoryConfig {
                enabled: false,
                ..Default::default()
            },
            PersonalizationConfig::default(),
        )
    }

    pub fn store(&self) -> Option<&Arc<dyn MemoryStore>> {
        self.store.as_ref()
    }

    /// Drop the cached probe result so the next query probes again
    pub fn forget_session(&self, session_id: &str) {
        self.probes.remove(session_id);
    }

    /// Run a store call with the configured timeout; `None` on any failure
    async fn guarded<T, F>(&self, step: &'static str, fut: F) -> Option<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.config.timeout(), fut).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!(step, error = %e, "Memory step skipped");
                None
            }
            Err(_) => {
                warn!(step, timeout_ms = self.config.timeout_ms, "Memory step timed out");
                None
            }
        }
    }

    async fn is_available(&self, store: &Arc<dyn MemoryStore>, session_id: &str) -> bool {
        if !self.config.probe_on_first_use {
            return true;
        }
        if let Some(cached) = self.probes.get(session_id) {
            return *cached;
        }
        let available = self.guarded("probe", store.ping()).await.is_some();
        debug!(session_id, available, backend = store.backend(), "Memory store probed");
        self.probes.insert(session_id.to_string(), available);
        available
    }

    /// Load preferences, record term usage and snapshot the context
    pub async fn before_routing(
        &self,
        request: &QueryRequest,
        classification: &IntentClassification,
    ) -> OverlaySession {
        let session_id = request
            .session_id
            .clone()
            .unwrap_or_else(|| DEFAULT_SESSION.to_string());
        let mut session = OverlaySession {
            user_id: request.user_id.clone(),
            session_id,
            ..Default::default()
        };

        let (Some(store), Some(user_id)) = (&self.store, request.user_id.as_deref()) else {
            return session;
        };
        session.available = self.is_available(store, &session.session_id).await;
        if !session.available {
            return session;
        }

        if let Some(entries) = self
            .guarded(
                "load_preferences",
                store.list_entries(user_id, Some(MemoryType::Preference)),
            )
            .await
        {
            session.preferences = entries.into_iter().map(|e| (e.key, e.value)).collect();
        }

        if classification.intent == Intent::Terminology {
            let mut tags = vec![Intent::Terminology.as_str().to_string()];
            tags.extend(request.context.form_type.clone());
            tags.extend(request.context.active_field.clone());

            for term in self.kb.terms_in(&request.text) {
                if self
                    .guarded(
                        "record_term",
                        store.upsert_term_usage(&term.term, user_id, &tags),
                    )
                    .await
                    .is_some()
                {
                    session.recorded_terms.push(term.term.clone());
                }
            }
        }

        let mut snapshot = CreateEntryInput::new(
            EntryKey::session(
                user_id,
                &session.session_id,
                MemoryType::Context,
                CONTEXT_SNAPSHOT_KEY,
            ),
            json!({
                "query": request.text,
                "intent": classification.intent.as_str(),
                "form": request.context.to_json(),
            }),
        );
        snapshot.ttl_seconds = Some(SNAPSHOT_TTL_SECS);
        snapshot.importance = Some(0.2);
        self.guarded("store_context", store.put_entry(snapshot)).await;

        session
    }

    /// Append the detail block and related-term hint
    pub async fn personalize(
        &self,
        session: &OverlaySession,
        request: &QueryRequest,
        extraction: &ExtractionResult,
        response: &mut String,
    ) -> Personalization {
        let mut applied = Personalization::default();

        if session.wants_detail() {
            if let Some(block) = self.detail_block(request, extraction) {
                response.push_str("\n\n");
                response.push_str(&block);
                applied.detail_added = true;
            }
        }

        let (Some(store), Some(user_id)) = (&self.store, session.active_user()) else {
            return applied;
        };

        let wanted = self.personalization.related_terms;
        if wanted == 0 {
            return applied;
        }
        let current: Vec<String> = self
            .kb
            .terms_in(&request.text)
            .into_iter()
            .map(|t| t.term.to_lowercase())
            .collect();
        let limit = wanted + current.len();

        if let Some(usages) = self
            .guarded("related_terms", store.term_usage(user_id, limit))
            .await
        {
            applied.related_terms = usages
                .into_iter()
                .map(|u| u.term)
                .filter(|t| !current.contains(&t.to_lowercase()))
                .take(wanted)
                .collect();
        }

        if !applied.related_terms.is_empty() {
            response.push_str(&format!(
                "\n\nRelated terms you've asked about: {}",
                applied.related_terms.join(", ")
            ));
        }
        applied
    }

    /// Persist the turn pair on a spawned task.
    ///
    /// The task finishes even if the caller stops waiting for it.
    pub fn persist_turn(
        &self,
        session: &OverlaySession,
        request: &QueryRequest,
        response: &str,
    ) -> Option<JoinHandle<()>> {
        let store = self.store.clone()?;
        let user_id = session.active_user()?.to_string();

        let input = CreateConversationInput {
            user_id,
            session_id: session.session_id.clone(),
            messages: vec![
                ConversationMessage::new(MessageRole::User, request.text.clone()),
                ConversationMessage::new(MessageRole::Assistant, response.to_string()),
            ],
            context: request.context.to_json(),
            summary: None,
        };
        let timeout = self.config.timeout();

        Some(tokio::spawn(async move {
            match tokio::time::timeout(timeout, store.create_conversation(input)).await {
                Ok(Ok(record)) => debug!(conversation_id = %record.id, "Conversation persisted"),
                Ok(Err(e)) => {
                    warn!(step = "persist_conversation", error = %e, "Memory step skipped")
                }
                Err(_) => warn!(step = "persist_conversation", "Memory step timed out"),
            }
        }))
    }

    /// Extra explanations for users who prefer detailed answers
    fn detail_block(
        &self,
        request: &QueryRequest,
        extraction: &ExtractionResult,
    ) -> Option<String> {
        let mut lines = Vec::new();

        for term in self.kb.terms_in(&request.text) {
            lines.push(format!(
                "- **{}** ({}): {}",
                term.term, term.meaning, term.explanation
            ));
        }
        for token in &extraction.code_tokens {
            if let Some(entry) = self.kb.code(&token.normalized, token.code_set) {
                if !entry.specialties.is_empty() {
                    lines.push(format!(
                        "- **{}** is used in: {}",
                        entry.code,
                        entry.specialties.join(", ")
                    ));
                }
            }
        }
        if let Some(guidance) = request
            .context
            .active_field
            .as_deref()
            .and_then(|f| self.kb.field_guidance(f))
        {
            let mut line = format!("- Field **{}**: {}", guidance.label, guidance.help);
            if let Some(example) = &guidance.example {
                line.push_str(&format!(" Example: `{}`", example));
            }
            lines.push(line);
        }

        if lines.is_empty() {
            None
        } else {
            Some(format!("**More detail**\n{}", lines.join("\n")))
        }
    }
}
