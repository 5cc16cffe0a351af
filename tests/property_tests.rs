//! Property-based tests for formhelper
//!
//! These tests verify invariants that must hold for all inputs:
//! - Extraction and classification never panic and are deterministic
//! - Code-shaped input always routes locally
//! - The strategy chain always answers
//! - Bounded structures stay bounded
//!
//! Run with: cargo test --test property_tests

use std::sync::Arc;

use proptest::prelude::*;

use formhelper::config::RemoteConfig;
use formhelper::remote::{RateWindow, RemoteGateway};
use formhelper::routing::{HybridRouter, StrategyChain};
use formhelper::KnowledgeBase;

fn router() -> HybridRouter {
    let chain = Arc::new(StrategyChain::new(Arc::new(KnowledgeBase::builtin())));
    let gateway = Arc::new(RemoteGateway::new(
        None,
        Arc::new(RateWindow::default()),
        RemoteConfig::default(),
    ));
    HybridRouter::new(chain, gateway)
}

// ============================================================================
// EXTRACTION & CLASSIFICATION
// ============================================================================

mod understanding_tests {
    use super::*;
    use formhelper::intelligence::{EntityExtractor, Intent, IntentClassifier};

    proptest! {
        /// Invariant: extraction never panics and is deterministic
        #[test]
        fn extraction_deterministic(s in "\\PC{0,200}") {
            let extractor = EntityExtractor::new(Arc::new(KnowledgeBase::builtin()));
            let first = extractor.extract(&s);
            let second = extractor.extract(&s);
            prop_assert_eq!(first, second);
        }

        /// Invariant: every reported entity is a substring of the input
        #[test]
        fn code_tokens_come_from_input(s in "[A-Za-z0-9 .\\-]{0,120}") {
            let extractor = EntityExtractor::new(Arc::new(KnowledgeBase::builtin()));
            for token in extractor.extract(&s).code_tokens {
                prop_assert!(s.contains(&token.text));
            }
        }

        /// Invariant: confidence is zero exactly when nothing was recognized
        #[test]
        fn zero_confidence_means_unknown(s in "\\PC{0,120}") {
            let result = IntentClassifier::new().classify(&s);
            prop_assert_eq!(result.confidence == 0, result.intent == Intent::Unknown);
        }
    }
}

// ============================================================================
// ROUTING
// ============================================================================

mod routing_tests {
    use super::*;
    use formhelper::routing::{RoutePath, COMPLEX_INDICATORS};

    fn code() -> impl Strategy<Value = String> {
        prop_oneof![
            "[A-TV-Z][0-9]{2}\\.[0-9]{1,2}",
            "[0-9]{5}",
            "J[0-9]{4}",
        ]
    }

    fn filler_word() -> impl Strategy<Value = &'static str> {
        prop::sample::select(vec![
            "patient", "billing", "today", "clinic", "visit", "payer", "office", "record",
            "staff",
        ])
    }

    proptest! {
        /// Invariant: input containing a code-shaped token always routes local
        #[test]
        fn code_shaped_input_is_local(
            prefix in "[a-z ]{0,40}",
            code in code(),
            suffix in "[a-z ?]{0,40}",
        ) {
            let text = format!("{} {} {}", prefix, code, suffix);
            prop_assert_eq!(router().decide(&text).path, RoutePath::Local);
        }

        /// Invariant: nine or more words with a complex phrase route remote
        #[test]
        fn complex_long_input_is_remote(
            words in prop::collection::vec(filler_word(), 9..20),
            phrase in prop::sample::select(COMPLEX_INDICATORS.to_vec()),
            at in 0usize..9,
        ) {
            let mut parts: Vec<&str> = words;
            parts.insert(at, phrase.trim());
            let text = parts.join(" ");
            prop_assert_eq!(router().decide(&text).path, RoutePath::Remote);
        }
    }
}

// ============================================================================
// STRATEGY CHAIN
// ============================================================================

mod chain_tests {
    use super::*;
    use formhelper::intelligence::{EntityExtractor, IntentClassifier};
    use formhelper::FormContext;

    proptest! {
        /// Invariant: the chain always returns non-empty text
        #[test]
        fn chain_always_answers(s in "\\PC{0,120}") {
            let kb = Arc::new(KnowledgeBase::builtin());
            let chain = StrategyChain::new(kb.clone());
            let outcome = chain.execute(
                &s,
                &IntentClassifier::new().classify(&s),
                &EntityExtractor::new(kb).extract(&s),
                &FormContext::default(),
            );
            prop_assert!(!outcome.text.trim().is_empty());
        }
    }
}

// ============================================================================
// MEMORY & LEARNING
// ============================================================================

mod memory_tests {
    use super::*;
    use formhelper::intelligence::InteractionLog;
    use formhelper::memory::{InMemoryMemoryStore, MemoryStore};
    use formhelper::FormContext;

    proptest! {
        /// Invariant: N upserts give count N and all contexts concatenated
        #[test]
        fn term_usage_counts_every_upsert(
            contexts in prop::collection::vec(prop::collection::vec("[a-z]{1,8}", 0..4), 1..10),
        ) {
            let usage = tokio_test::block_on(async {
                let store = InMemoryMemoryStore::new();
                let mut last = None;
                for context in &contexts {
                    last = Some(store.upsert_term_usage("IOP", "u1", context).await.unwrap());
                }
                last.unwrap()
            });
            let expected_context: Vec<String> = contexts.iter().flatten().cloned().collect();
            prop_assert_eq!(usage.usage_count as usize, contexts.len());
            prop_assert_eq!(usage.context, expected_context);
        }

        /// Invariant: the interaction log never grows past its capacity
        #[test]
        fn interaction_log_bounded(capacity in 1usize..20, records in 0usize..60) {
            let log = InteractionLog::new(capacity);
            for i in 0..records {
                log.record(&format!("question {}", i), "answer", None, &FormContext::default());
            }
            prop_assert_eq!(log.len(), records.min(capacity));
            if records > 0 {
                let newest = log.recent(1);
                prop_assert_eq!(&newest[0].input, &format!("question {}", records - 1));
            }
        }
    }
}
