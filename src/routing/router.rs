//! Hybrid local/remote router

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::strategy::{ChainOutcome, StrategyChain};
use crate::error::RemoteError;
use crate::intelligence::{
    has_code_token, is_bulk_listing_request, ExtractionResult, IntentClassification,
};
use crate::knowledge::KnowledgeBase;
use crate::remote::RemoteGateway;
use crate::types::FormContext;

/// Longer queries go remote
const MAX_LOCAL_WORDS: usize = 8;

/// Longer questions go remote
const MAX_LOCAL_QUESTION_WORDS: usize = 4;

/// Phrases signalling comparison, multi-step, ambiguity or detail requests
pub const COMPLEX_INDICATORS: &[&str] = &[
    "difference between",
    "compare",
    "comparison",
    "versus",
    " vs ",
    "explain why",
    "step by step",
    "walk me through",
    "process for",
    "not sure",
    "confused",
    "which should",
    "when to use",
    "in detail",
    "detailed explanation",
    "pros and cons",
    "what if",
];

/// "OD", "what is OD?", "what does IOP stand for"
static ABBREVIATION_QUERY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?:what\s+(?:is|are|does)\s+(?:an?\s+|the\s+)?)?([a-z]{2,3})(?:\s+(?:mean|stand\s+for))?\s*\??\s*$",
    )
    .expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutePath {
    Local,
    Remote,
}

/// Which rule decided the route
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "rule", content = "detail")]
pub enum RouteReason {
    CodeToken,
    Abbreviation(String),
    BulkListing,
    ComplexPhrase(String),
    LongQuery(usize),
    LongQuestion(usize),
    Simple,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutingDecision {
    pub path: RoutePath,
    pub reason: RouteReason,
    pub rationale: String,
}

impl RoutingDecision {
    fn local(reason: RouteReason, rationale: impl Into<String>) -> Self {
        Self {
            path: RoutePath::Local,
            reason,
            rationale: rationale.into(),
        }
    }

    fn remote(reason: RouteReason, rationale: impl Into<String>) -> Self {
        Self {
            path: RoutePath::Remote,
            reason,
            rationale: rationale.into(),
        }
    }
}

/// Answer produced by the router
#[derive(Debug, Clone, Serialize)]
pub struct RoutedResponse {
    pub text: String,
    pub decision: RoutingDecision,
    /// Path that actually produced `text`
    pub served_by: RoutePath,
    /// Remote failure that forced the local fallback
    pub remote_error: Option<RemoteError>,
    /// Local chain details when the chain ran
    pub chain: Option<ChainOutcome>,
}

impl RoutedResponse {
    pub fn is_degraded(&self) -> bool {
        self.remote_error.is_some()
    }
}

/// Notice placed before local answers given in place of a remote one
pub fn degraded_notice(error: &RemoteError) -> String {
    format!(
        "[Offline mode] {} Showing local guidance instead.\n\n",
        error.user_message()
    )
}

/// Chooses the local chain or the remote gateway per query
pub struct HybridRouter {
    kb: Arc<KnowledgeBase>,
    chain: Arc<StrategyChain>,
    gateway: Arc<RemoteGateway>,
}

impl HybridRouter {
    pub fn new(chain: Arc<StrategyChain>, gateway: Arc<RemoteGateway>) -> Self {
        Self {
            kb: chain.knowledge().clone(),
            chain,
            gateway,
        }
    }

    pub fn chain(&self) -> &Arc<StrategyChain> {
        &self.chain
    }

    pub fn gateway(&self) -> &Arc<RemoteGateway> {
        &self.gateway
    }

    /// Apply the routing rules in order; first match wins
    pub fn decide(&self, text: &str) -> RoutingDecision {
        if has_code_token(text) {
            return RoutingDecision::local(RouteReason::CodeToken, "contains a literal code");
        }

        if let Some(abbr) = ABBREVIATION_QUERY
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .filter(|a| self.kb.is_abbreviation(a))
        {
            return RoutingDecision::local(
                RouteReason::Abbreviation(abbr.to_uppercase()),
                format!("known abbreviation {}", abbr.to_uppercase()),
            );
        }

        if is_bulk_listing_request(text) {
            return RoutingDecision::local(RouteReason::BulkListing, "bulk code listing request");
        }

        let lower = format!(" {} ", text.to_lowercase());
        if let Some(phrase) = COMPLEX_INDICATORS.iter().find(|p| lower.contains(*p)) {
            let phrase = phrase.trim().to_string();
            return RoutingDecision::remote(
                RouteReason::ComplexPhrase(phrase.clone()),
                format!("complex reasoning phrase \"{}\"", phrase),
            );
        }

        let words = text.split_whitespace().count();
        if words > MAX_LOCAL_WORDS {
            return RoutingDecision::remote(
                RouteReason::LongQuery(words),
                format!("{} words", words),
            );
        }
        if text.contains('?') && words > MAX_LOCAL_QUESTION_WORDS {
            return RoutingDecision::remote(
                RouteReason::LongQuestion(words),
                format!("question with {} words", words),
            );
        }

        RoutingDecision::local(RouteReason::Simple, "short query")
    }

    /// Produce an answer. Remote failures fall back to the local chain and
    /// are never returned to the caller.
    #[instrument(skip_all, fields(text_len = text.len()))]
    pub async fn respond(
        &self,
        text: &str,
        classification: &IntentClassification,
        extraction: &ExtractionResult,
        context: &FormContext,
    ) -> RoutedResponse {
        let decision = self.decide(text);
        debug!(path = ?decision.path, rationale = %decision.rationale, "Routing decision");

        if decision.path == RoutePath::Remote {
            match self.gateway.ask(text, context).await {
                Ok(answer) => {
                    return RoutedResponse {
                        text: answer,
                        decision,
                        served_by: RoutePath::Remote,
                        remote_error: None,
                        chain: None,
                    };
                }
                Err(error) => {
                    warn!(
                        kind = error.kind(),
                        error = %error,
                        "Remote path failed, using local chain"
                    );
                    let outcome = self.chain.execute(text, classification, extraction, context);
                    return RoutedResponse {
                        text: format!("{}{}", degraded_notice(&error), outcome.text),
                        decision,
                        served_by: RoutePath::Local,
                        remote_error: Some(error),
                        chain: Some(outcome),
                    };
                }
            }
        }

        let outcome = self.chain.execute(text, classification, extraction, context);
        RoutedResponse {
            text: outcome.text.clone(),
            decision,
            served_by: RoutePath::Local,
            remote_error: None,
            chain: Some(outcome),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemoteConfig;
    use crate::intelligence::{EntityExtractor, IntentClassifier};
    use crate::remote::{RateWindow, ReasoningService, RemotePrompt};
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl ReasoningService for Echo {
        async fn complete(&self, prompt: &RemotePrompt) -> Result<String, RemoteError> {
            Ok(format!("remote: {}", prompt.user))
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    fn router(service: Option<Arc<dyn ReasoningService>>) -> HybridRouter {
        let kb = Arc::new(KnowledgeBase::builtin());
        let chain = Arc::new(StrategyChain::new(kb));
        let gateway = Arc::new(RemoteGateway::new(
            service,
            Arc::new(RateWindow::default()),
            RemoteConfig::default(),
        ));
        HybridRouter::new(chain, gateway)
    }

    async fn respond(router: &HybridRouter, text: &str) -> RoutedResponse {
        let classification = IntentClassifier::new().classify(text);
        let extraction = EntityExtractor::new(router.chain().knowledge().clone()).extract(text);
        router
            .respond(text, &classification, &extraction, &FormContext::default())
            .await
    }

    #[test]
    fn test_code_tokens_route_local() {
        let r = router(None);
        for text in [
            "E11.9",
            "92250",
            "Can you explain the difference between 92250 and 92228 in detail please?",
        ] {
            let decision = r.decide(text);
            assert_eq!(decision.path, RoutePath::Local, "{}", text);
            assert_eq!(decision.reason, RouteReason::CodeToken);
        }
    }

    #[test]
    fn test_abbreviation_routes_local() {
        let r = router(None);
        assert_eq!(
            r.decide("What is OD?").reason,
            RouteReason::Abbreviation("OD".to_string())
        );
        assert_eq!(
            r.decide("what does IOP stand for").reason,
            RouteReason::Abbreviation("IOP".to_string())
        );
        // Not a known abbreviation: falls through to the word-count rules
        assert_eq!(r.decide("what is xyz").reason, RouteReason::Simple);
    }

    #[test]
    fn test_bulk_routes_local() {
        let r = router(None);
        let decision = r.decide("show me all CPT codes for ophthalmology, what is there?");
        assert_eq!(decision.reason, RouteReason::BulkListing);
    }

    #[test]
    fn test_complex_phrase_routes_remote() {
        let r = router(None);
        let decision =
            r.decide("Explain the difference between ICD-10 and CPT codes and when to use each");
        assert_eq!(decision.path, RoutePath::Remote);
        assert_eq!(
            decision.reason,
            RouteReason::ComplexPhrase("difference between".to_string())
        );
        assert_eq!(r.decide("OCT vs fundus photo").path, RoutePath::Remote);
    }

    #[test]
    fn test_word_count_rules() {
        let r = router(None);
        assert_eq!(
            r.decide("tell me about billing for eye exams at our clinic").reason,
            RouteReason::LongQuery(10)
        );
        assert_eq!(
            r.decide("how should I bill this?").reason,
            RouteReason::LongQuestion(5)
        );
        assert_eq!(r.decide("how do I bill?").reason, RouteReason::Simple);
        assert_eq!(r.decide("save my draft form now").path, RoutePath::Local);
    }

    #[tokio::test]
    async fn test_remote_success() {
        let r = router(Some(Arc::new(Echo)));
        let response =
            respond(&r, "Explain why eye exam claims get denied so often by payers").await;
        assert_eq!(response.served_by, RoutePath::Remote);
        assert!(response.text.starts_with("remote: "));
        assert!(!response.is_degraded());
    }

    #[tokio::test]
    async fn test_remote_failure_falls_back_with_notice() {
        let r = router(None);
        let response = respond(
            &r,
            "Explain the difference between ICD-10 and CPT codes and when to use each",
        )
        .await;
        assert_eq!(response.decision.path, RoutePath::Remote);
        assert_eq!(response.served_by, RoutePath::Local);
        assert!(response.text.starts_with("[Offline mode] The AI assistant is not configured."));
        assert!(matches!(response.remote_error, Some(RemoteError::Configuration(_))));
        let chain = response.chain.unwrap();
        assert!(!chain.text.is_empty());
    }

    #[tokio::test]
    async fn test_local_answer() {
        let r = router(Some(Arc::new(Echo)));
        let response = respond(&r, "What is OD?").await;
        assert_eq!(response.served_by, RoutePath::Local);
        assert!(response.text.contains("Right Eye"));
    }
}
