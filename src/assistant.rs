//! Query pipeline entry point
//!
//! `FormAssistant` owns one instance of every stateful component (rate
//! window, interaction log, probe cache) and wires them around the router:
//!
//! 1. classify and extract
//! 2. memory overlay, before routing
//! 3. hybrid routing (remote or local chain, with fallback)
//! 4. personalization, learning log, conversation persistence
//!
//! `process_query` never fails; every step below it degrades instead.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::config::AssistantConfig;
use crate::error::{FormHelperError, RemoteError, Result};
use crate::intelligence::{
    EntityExtractor, ExtractionResult, Intent, IntentClassification, IntentClassifier,
    InteractionLog, InteractionStats,
};
use crate::knowledge::KnowledgeBase;
use crate::memory::{
    InMemoryMemoryStore, MemoryStore, Personalization, PersonalizationOverlay, SqliteMemoryStore,
};
use crate::remote::{RateWindow, RemoteGateway};
use crate::routing::{
    DispatchMode, HybridRouter, RoutePath, RoutingDecision, StrategyChain,
};
use crate::types::{MemoryStats, QueryRequest};

/// Answer to one query, with how it was produced
#[derive(Debug, Clone, Serialize)]
pub struct AssistantReply {
    pub text: String,
    pub intent: Intent,
    pub confidence: u32,
    /// Path chosen by the routing rules
    pub route: RoutePath,
    /// Path that produced the answer
    pub served_by: RoutePath,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_error: Option<RemoteError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handler: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatch: Option<DispatchMode>,
    pub personalization: Personalization,
    /// Frequent tokens from this user's earlier successful queries
    pub hints: Vec<String>,
    /// Whether the answer was non-generic
    pub success: bool,
    pub elapsed_ms: u64,
}

/// Side-effect-free view of how a query would be handled
#[derive(Debug, Clone, Serialize)]
pub struct QueryDiagnostics {
    pub classification: IntentClassification,
    pub extraction: ExtractionResult,
    pub decision: RoutingDecision,
}

pub struct FormAssistant {
    kb: Arc<KnowledgeBase>,
    classifier: IntentClassifier,
    extractor: EntityExtractor,
    router: HybridRouter,
    overlay: PersonalizationOverlay,
    log: InteractionLog,
    config: AssistantConfig,
}

impl FormAssistant {
    /// Assemble from explicit parts
    pub fn with_parts(
        config: AssistantConfig,
        kb: Arc<KnowledgeBase>,
        gateway: Arc<RemoteGateway>,
        store: Option<Arc<dyn MemoryStore>>,
    ) -> Self {
        let chain = Arc::new(StrategyChain::new(kb.clone()));
        let overlay = PersonalizationOverlay::new(
            store,
            kb.clone(),
            config.memory.clone(),
            config.personalization.clone(),
        );
        Self {
            classifier: IntentClassifier::new(),
            extractor: EntityExtractor::new(kb.clone()),
            router: HybridRouter::new(chain, gateway),
            overlay,
            log: InteractionLog::new(config.learning.capacity),
            kb,
            config,
        }
    }

    /// Built-in knowledge and a gateway configured from `config.remote`
    pub fn new(config: AssistantConfig, store: Option<Arc<dyn MemoryStore>>) -> Self {
        let window = Arc::new(RateWindow::from_config(&config.rate_limit));
        let gateway = Arc::new(RemoteGateway::from_config(&config.remote, window));
        Self::with_parts(config, Arc::new(KnowledgeBase::builtin()), gateway, store)
    }

    /// Open the configured memory backend and build the assistant.
    ///
    /// A configured SQLite path selects `SqliteMemoryStore`, otherwise the
    /// in-process store is used. Disabled memory means no store at all.
    pub fn open(config: AssistantConfig) -> Result<Self> {
        let store: Option<Arc<dyn MemoryStore>> = if !config.memory.enabled {
            None
        } else if let Some(path) = &config.memory.db_path {
            Some(Arc::new(SqliteMemoryStore::open(path)?))
        } else {
            Some(Arc::new(InMemoryMemoryStore::new()))
        };
        Ok(Self::new(config, store))
    }

    pub fn config(&self) -> &AssistantConfig {
        &self.config
    }

    pub fn knowledge(&self) -> &Arc<KnowledgeBase> {
        &self.kb
    }

    pub fn router(&self) -> &HybridRouter {
        &self.router
    }

    pub fn overlay(&self) -> &PersonalizationOverlay {
        &self.overlay
    }

    pub fn interaction_log(&self) -> &InteractionLog {
        &self.log
    }

    /// Classification, entities and routing decision, without answering
    pub fn classify(&self, text: &str) -> QueryDiagnostics {
        QueryDiagnostics {
            classification: self.classifier.classify(text),
            extraction: self.extractor.extract(text),
            decision: self.router.decide(text),
        }
    }

    /// Answer one query
    #[instrument(
        skip_all,
        fields(
            user = request.user_id.as_deref().unwrap_or("-"),
            text_len = request.text.len()
        )
    )]
    pub async fn process_query(&self, request: QueryRequest) -> AssistantReply {
        let started = Instant::now();
        let classification = self.classifier.classify(&request.text);
        let extraction = self.extractor.extract(&request.text);
        debug!(
            intent = %classification.intent,
            confidence = classification.confidence,
            entities = extraction.entities.len(),
            "Query understood"
        );

        let session = self.overlay.before_routing(&request, &classification).await;

        let routed = self
            .router
            .respond(&request.text, &classification, &extraction, &request.context)
            .await;

        let hints = self.log.personalized_hints(
            request.user_id.as_deref(),
            request.context.form_type.as_deref(),
            self.config.learning.hint_count,
        );
        let success = self.log.record(
            &request.text,
            &routed.text,
            request.user_id.as_deref(),
            &request.context,
        );

        let mut text = routed.text.clone();
        let personalization = self
            .overlay
            .personalize(&session, &request, &extraction, &mut text)
            .await;

        if let Some(handle) = self.overlay.persist_turn(&session, &request, &text) {
            // Task failures are already logged inside the task
            let _ = handle.await;
        }

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            intent = %classification.intent,
            route = ?routed.decision.path,
            served_by = ?routed.served_by,
            degraded = routed.is_degraded(),
            elapsed_ms,
            "Query answered"
        );

        AssistantReply {
            text,
            intent: classification.intent,
            confidence: classification.confidence,
            route: routed.decision.path,
            served_by: routed.served_by,
            degraded: routed.is_degraded(),
            handler: routed.chain.as_ref().and_then(|c| c.handler),
            dispatch: routed.chain.as_ref().map(|c| c.mode),
            remote_error: routed.remote_error,
            personalization,
            hints,
            success,
            elapsed_ms,
        }
    }

    /// Aggregate memory statistics, for one user or the whole store
    pub async fn memory_stats(&self, user_id: Option<&str>) -> Result<MemoryStats> {
        let store = self.require_store()?;
        self.with_timeout(store.stats(user_id)).await
    }

    /// Remove every entry, conversation and term usage of a user
    pub async fn clear_user(&self, user_id: &str) -> Result<u64> {
        let store = self.require_store()?;
        let removed = self.with_timeout(store.clear_user(user_id)).await?;
        debug!(user_id, removed, "User memory cleared");
        Ok(removed)
    }

    pub fn interaction_stats(&self) -> InteractionStats {
        self.log.stats()
    }

    pub fn clear_interactions(&self) {
        self.log.clear();
    }

    fn require_store(&self) -> Result<&Arc<dyn MemoryStore>> {
        self.overlay
            .store()
            .ok_or_else(|| FormHelperError::MemoryUnavailable("memory is disabled".to_string()))
    }

    async fn with_timeout<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        let timeout = self.config.memory.timeout();
        tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| FormHelperError::Timeout(self.config.memory.timeout_ms))?
    }
}
