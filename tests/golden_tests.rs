//! Golden tests - fixture-based tests that lock expected behavior
//!
//! These tests use JSON fixtures to verify that classification, routing,
//! code extraction and the default handler chain produce expected outputs.
//! Any change in behavior will cause these tests to fail, signaling a
//! potential breaking change.
//!
//! Run with: cargo test --test golden_tests

use serde::Deserialize;
use std::fs;

fn load_fixture<T: for<'de> Deserialize<'de>>(name: &str) -> T {
    let path = format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name);
    let content =
        fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read {}: {}", name, e));
    serde_json::from_str(&content).unwrap_or_else(|e| panic!("Failed to parse {}: {}", name, e))
}

// ============================================================================
// INTENT CLASSIFICATION GOLDEN TESTS
// ============================================================================

mod intent_golden {
    use super::*;
    use formhelper::intelligence::{Intent, IntentClassifier};

    #[derive(Debug, Deserialize)]
    struct TestCase {
        name: String,
        input: String,
        intent: Intent,
        confidence: u32,
        override_rule: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    struct Fixture {
        test_cases: Vec<TestCase>,
    }

    #[test]
    fn test_intent_classification_golden() {
        let fixture: Fixture = load_fixture("intent_classification.json");
        let classifier = IntentClassifier::new();

        for case in fixture.test_cases {
            let result = classifier.classify(&case.input);
            assert_eq!(result.intent, case.intent, "Case '{}': intent mismatch", case.name);
            assert_eq!(
                result.confidence, case.confidence,
                "Case '{}': confidence mismatch",
                case.name
            );
            assert_eq!(
                result.override_rule, case.override_rule,
                "Case '{}': override rule mismatch",
                case.name
            );
        }
    }
}

// ============================================================================
// ROUTING GOLDEN TESTS
// ============================================================================

mod routing_golden {
    use super::*;
    use formhelper::config::RemoteConfig;
    use formhelper::remote::{RateWindow, RemoteGateway};
    use formhelper::routing::{HybridRouter, RoutePath, StrategyChain};
    use formhelper::KnowledgeBase;
    use std::sync::Arc;

    #[derive(Debug, Deserialize)]
    struct TestCase {
        name: String,
        input: String,
        path: RoutePath,
        rule: String,
    }

    #[derive(Debug, Deserialize)]
    struct Fixture {
        test_cases: Vec<TestCase>,
    }

    #[test]
    fn test_routing_golden() {
        let fixture: Fixture = load_fixture("routing_decisions.json");
        let chain = Arc::new(StrategyChain::new(Arc::new(KnowledgeBase::builtin())));
        let gateway = Arc::new(RemoteGateway::new(
            None,
            Arc::new(RateWindow::default()),
            RemoteConfig::default(),
        ));
        let router = HybridRouter::new(chain, gateway);

        for case in fixture.test_cases {
            let decision = router.decide(&case.input);
            assert_eq!(decision.path, case.path, "Case '{}': path mismatch", case.name);

            let reason = serde_json::to_value(&decision.reason).expect("reason serializes");
            assert_eq!(
                reason["rule"], case.rule.as_str(),
                "Case '{}': rule mismatch ({})",
                case.name, decision.rationale
            );
        }
    }
}

// ============================================================================
// CODE TOKEN GOLDEN TESTS
// ============================================================================

mod code_token_golden {
    use super::*;
    use formhelper::intelligence::extract_code_tokens;
    use formhelper::knowledge::CodeSet;

    #[derive(Debug, Deserialize)]
    struct TestCase {
        name: String,
        input: String,
        expected: Vec<ExpectedToken>,
    }

    #[derive(Debug, Deserialize)]
    struct ExpectedToken {
        code: String,
        code_set: CodeSet,
    }

    #[derive(Debug, Deserialize)]
    struct Fixture {
        test_cases: Vec<TestCase>,
    }

    #[test]
    fn test_code_tokens_golden() {
        let fixture: Fixture = load_fixture("code_tokens.json");

        for case in fixture.test_cases {
            let tokens = extract_code_tokens(&case.input);
            let actual: Vec<(&str, CodeSet)> = tokens
                .iter()
                .map(|t| (t.normalized.as_str(), t.code_set))
                .collect();
            let expected: Vec<(&str, CodeSet)> = case
                .expected
                .iter()
                .map(|t| (t.code.as_str(), t.code_set))
                .collect();
            assert_eq!(actual, expected, "Case '{}': token mismatch", case.name);

            // Surface text always comes from the input
            for token in &tokens {
                assert!(
                    case.input.contains(&token.text),
                    "Case '{}': {:?} not in input",
                    case.name,
                    token.text
                );
            }
        }
    }
}

// ============================================================================
// STRATEGY CHAIN GOLDEN TESTS
// ============================================================================

mod chain_golden {
    use super::*;
    use formhelper::intelligence::{EntityExtractor, IntentClassifier};
    use formhelper::routing::StrategyChain;
    use formhelper::{FormContext, KnowledgeBase};
    use std::sync::Arc;

    #[derive(Debug, Deserialize)]
    struct TestCase {
        name: String,
        input: String,
        handler: Option<String>,
        contains: Vec<String>,
        excludes: Vec<String>,
    }

    #[derive(Debug, Deserialize)]
    struct Fixture {
        test_cases: Vec<TestCase>,
    }

    #[test]
    fn test_chain_responses_golden() {
        let fixture: Fixture = load_fixture("chain_responses.json");
        let kb = Arc::new(KnowledgeBase::builtin());
        let chain = StrategyChain::new(kb.clone());
        let classifier = IntentClassifier::new();
        let extractor = EntityExtractor::new(kb);

        for case in fixture.test_cases {
            let outcome = chain.execute(
                &case.input,
                &classifier.classify(&case.input),
                &extractor.extract(&case.input),
                &FormContext::default(),
            );

            assert_eq!(
                outcome.handler.map(str::to_string),
                case.handler,
                "Case '{}': handler mismatch",
                case.name
            );
            for needle in &case.contains {
                assert!(
                    outcome.text.contains(needle.as_str()),
                    "Case '{}': expected {:?} in:\n{}",
                    case.name,
                    needle,
                    outcome.text
                );
            }
            for needle in &case.excludes {
                assert!(
                    !outcome.text.contains(needle.as_str()),
                    "Case '{}': unexpected {:?} in:\n{}",
                    case.name,
                    needle,
                    outcome.text
                );
            }
        }
    }
}
