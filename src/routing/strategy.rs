//! Strategy chain executor
//!
//! Dispatches a classified query to handlers until one produces a non-generic
//! answer. When every handler declines, a contextual-help response is built
//! instead, so execution always ends with text.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, instrument};

use super::handlers::{default_handlers, HandlerInput, ResponseHandler, CAPABILITY_MENU};
use crate::intelligence::{
    is_generic_response, ConfidenceLevel, ConfidencePolicy, ExtractionResult, IntentClassification,
};
use crate::knowledge::KnowledgeBase;
use crate::types::FormContext;

/// How the accepted answer was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// High confidence: intent mapped straight to its handler
    Direct,
    /// Medium confidence: best-matching handler tried first
    BestHandler,
    /// Handlers tried in chain order
    FullChain,
    /// Nothing matched; synthesized help
    ContextualHelp,
}

/// Result of one chain execution
#[derive(Debug, Clone, Serialize)]
pub struct ChainOutcome {
    pub text: String,
    pub mode: DispatchMode,
    /// Handler whose answer was accepted
    pub handler: Option<&'static str>,
    /// Handlers invoked, in order
    pub attempted: Vec<&'static str>,
}

impl ChainOutcome {
    pub fn is_contextual_help(&self) -> bool {
        self.mode == DispatchMode::ContextualHelp
    }
}

/// Ordered handler chain over an injected knowledge base
pub struct StrategyChain {
    kb: Arc<KnowledgeBase>,
    handlers: Vec<Box<dyn ResponseHandler>>,
    policy: ConfidencePolicy,
}

impl StrategyChain {
    pub fn new(kb: Arc<KnowledgeBase>) -> Self {
        Self::with_handlers(kb, default_handlers(), ConfidencePolicy::default())
    }

    pub fn with_handlers(
        kb: Arc<KnowledgeBase>,
        handlers: Vec<Box<dyn ResponseHandler>>,
        policy: ConfidencePolicy,
    ) -> Self {
        Self {
            kb,
            handlers,
            policy,
        }
    }

    pub fn with_policy(mut self, policy: ConfidencePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> ConfidencePolicy {
        self.policy
    }

    pub fn knowledge(&self) -> &Arc<KnowledgeBase> {
        &self.kb
    }

    pub fn handler_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Run the chain for one query
    #[instrument(
        skip_all,
        fields(intent = %classification.intent, confidence = classification.confidence)
    )]
    pub fn execute(
        &self,
        text: &str,
        classification: &IntentClassification,
        extraction: &ExtractionResult,
        context: &FormContext,
    ) -> ChainOutcome {
        let input = HandlerInput {
            text,
            classification,
            extraction,
            context,
            kb: &self.kb,
        };
        let mut attempted: Vec<&'static str> = Vec::new();

        let first_mode = match self.policy.level(classification.confidence) {
            ConfidenceLevel::High => Some(DispatchMode::Direct),
            ConfidenceLevel::Medium => Some(DispatchMode::BestHandler),
            ConfidenceLevel::Low => None,
        };

        if let Some(mode) = first_mode {
            if let Some(handler) = self.handlers.iter().find(|h| h.serves(classification.intent)) {
                attempted.push(handler.name());
                if let Some(text) = accept(handler.as_ref(), &input) {
                    debug!(handler = handler.name(), ?mode, "Handler accepted");
                    return ChainOutcome {
                        text,
                        mode,
                        handler: Some(handler.name()),
                        attempted,
                    };
                }
                debug!(handler = handler.name(), "Dispatched handler declined, running full chain");
            }
        }

        for handler in &self.handlers {
            if attempted.contains(&handler.name()) {
                continue;
            }
            attempted.push(handler.name());
            if let Some(text) = accept(handler.as_ref(), &input) {
                debug!(handler = handler.name(), "Handler accepted");
                return ChainOutcome {
                    text,
                    mode: DispatchMode::FullChain,
                    handler: Some(handler.name()),
                    attempted,
                };
            }
        }

        debug!("Chain exhausted, building contextual help");
        ChainOutcome {
            text: self.contextual_help(classification, context),
            mode: DispatchMode::ContextualHelp,
            handler: None,
            attempted,
        }
    }

    /// Help text echoing the form position and what was understood
    pub fn contextual_help(
        &self,
        classification: &IntentClassification,
        context: &FormContext,
    ) -> String {
        let mut out =
            String::from("I couldn't find a specific answer to that in the billing reference.");

        let mut position = Vec::new();
        if let Some(form) = &context.form_type {
            position.push(format!("the **{}** form", form));
        }
        if let Some(field) = &context.active_field {
            let label = self
                .kb
                .field_guidance(field)
                .map(|g| g.label.clone())
                .unwrap_or_else(|| field.clone());
            position.push(format!("the **{}** field", label));
        }
        if let Some(step) = &context.step {
            position.push(format!("the **{}** step", step));
        }
        if !position.is_empty() {
            out.push_str(&format!("\n\nYou are on {}.", position.join(", ")));
        }

        if let Some(guidance) = context
            .active_field
            .as_deref()
            .and_then(|f| self.kb.field_guidance(f))
        {
            out.push_str(&format!("\n\nField tip: {}", guidance.help));
        }

        if !classification.matched_keywords.is_empty() {
            out.push_str(&format!(
                "\n\nI picked up on: {}.",
                classification.matched_keywords.join(", ")
            ));
        }

        out.push_str("\n\nI can help you:\n");
        out.push_str(&CAPABILITY_MENU.join("\n"));
        out
    }
}

/// Handler output if it is present and not generic
fn accept(handler: &dyn ResponseHandler, input: &HandlerInput<'_>) -> Option<String> {
    handler
        .handle(input)
        .filter(|text| !is_generic_response(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intelligence::{EntityExtractor, Intent, IntentClassifier};
    use pretty_assertions::assert_eq;

    struct Fixed {
        name: &'static str,
        intent: Intent,
        reply: Option<&'static str>,
    }

    impl ResponseHandler for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }

        fn serves(&self, intent: Intent) -> bool {
            intent == self.intent
        }

        fn handle(&self, _input: &HandlerInput<'_>) -> Option<String> {
            self.reply.map(str::to_string)
        }
    }

    fn fixed(
        name: &'static str,
        intent: Intent,
        reply: Option<&'static str>,
    ) -> Box<dyn ResponseHandler> {
        Box::new(Fixed {
            name,
            intent,
            reply,
        })
    }

    fn classification(intent: Intent, confidence: u32) -> IntentClassification {
        IntentClassification {
            intent,
            confidence,
            matched_keywords: vec!["claim".into()],
            override_rule: None,
            bulk_request: None,
            candidates: Vec::new(),
        }
    }

    fn chain(handlers: Vec<Box<dyn ResponseHandler>>) -> StrategyChain {
        StrategyChain::with_handlers(
            Arc::new(KnowledgeBase::builtin()),
            handlers,
            ConfidencePolicy::default(),
        )
    }

    fn run(chain: &StrategyChain, classification: &IntentClassification) -> ChainOutcome {
        chain.execute(
            "anything",
            classification,
            &ExtractionResult::default(),
            &FormContext::default(),
        )
    }

    #[test]
    fn test_high_confidence_dispatches_directly() {
        let chain = chain(vec![
            fixed("a", Intent::CodeLookup, Some("A answer")),
            fixed("b", Intent::Claims, Some("B answer")),
        ]);
        let outcome = run(&chain, &classification(Intent::Claims, 3));
        assert_eq!(outcome.text, "B answer");
        assert_eq!(outcome.mode, DispatchMode::Direct);
        assert_eq!(outcome.attempted, vec!["b"]);
    }

    #[test]
    fn test_medium_confidence_falls_back_to_chain() {
        let chain = chain(vec![
            fixed("a", Intent::CodeLookup, None),
            fixed("b", Intent::Claims, Some("I'd be happy to help!")),
            fixed("c", Intent::Workflow, Some("C answer")),
        ]);
        let outcome = run(&chain, &classification(Intent::Claims, 1));
        assert_eq!(outcome.text, "C answer");
        assert_eq!(outcome.mode, DispatchMode::FullChain);
        // "b" is not retried in the full chain
        assert_eq!(outcome.attempted, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_medium_confidence_best_handler() {
        let chain = chain(vec![
            fixed("a", Intent::CodeLookup, Some("A answer")),
            fixed("b", Intent::Claims, Some("B answer")),
        ]);
        let outcome = run(&chain, &classification(Intent::Claims, 1));
        assert_eq!(outcome.text, "B answer");
        assert_eq!(outcome.mode, DispatchMode::BestHandler);
    }

    #[test]
    fn test_low_confidence_runs_full_chain() {
        let chain = chain(vec![
            fixed("a", Intent::CodeLookup, None),
            fixed("b", Intent::Claims, Some("B answer")),
        ]);
        let outcome = run(&chain, &classification(Intent::Unknown, 0));
        assert_eq!(outcome.text, "B answer");
        assert_eq!(outcome.attempted, vec!["a", "b"]);
    }

    #[test]
    fn test_exhausted_chain_builds_contextual_help() {
        let chain = chain(vec![
            fixed("a", Intent::CodeLookup, None),
            fixed("b", Intent::Claims, Some("   ")),
        ]);
        let context = FormContext {
            form_type: Some("cms1500".into()),
            active_field: Some("npi".into()),
            ..Default::default()
        };
        let outcome = chain.execute(
            "zzz",
            &classification(Intent::Claims, 3),
            &ExtractionResult::default(),
            &context,
        );
        assert!(outcome.is_contextual_help());
        assert!(outcome.text.contains("the **cms1500** form"));
        assert!(outcome.text.contains("the **Rendering provider NPI** field"));
        assert!(outcome.text.contains("I picked up on: claim."));
        assert!(outcome.text.contains("Look up ICD-10"));
    }

    #[test]
    fn test_tunable_policy() {
        let chain = chain(vec![
            fixed("a", Intent::CodeLookup, Some("A answer")),
            fixed("b", Intent::Claims, Some("B answer")),
        ])
        .with_policy(ConfidencePolicy { high: 5, medium: 4 });
        let outcome = run(&chain, &classification(Intent::Claims, 3));
        assert_eq!(outcome.mode, DispatchMode::FullChain);
        assert_eq!(outcome.text, "A answer");
    }

    #[test]
    fn test_default_chain_real_query() {
        let kb = Arc::new(KnowledgeBase::builtin());
        let chain = StrategyChain::new(kb.clone());
        let text = "What is OD?";
        let classification = IntentClassifier::new().classify(text);
        let extraction = EntityExtractor::new(kb).extract(text);
        let outcome = chain.execute(text, &classification, &extraction, &FormContext::default());
        assert_eq!(outcome.handler, Some("terminology"));
        assert!(outcome.text.contains("Right Eye"));
    }

    #[test]
    fn test_default_chain_never_empty() {
        let kb = Arc::new(KnowledgeBase::builtin());
        let chain = StrategyChain::new(kb.clone());
        let extractor = EntityExtractor::new(kb);
        let classifier = IntentClassifier::new();
        for text in ["", "   ", "purple elephants", "???", "zzzz qqqq"] {
            let outcome = chain.execute(
                text,
                &classifier.classify(text),
                &extractor.extract(text),
                &FormContext::default(),
            );
            assert!(!outcome.text.trim().is_empty());
        }
    }
}
