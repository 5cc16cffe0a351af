//! Performance benchmarks for query understanding and routing decisions

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use formhelper::config::RemoteConfig;
use formhelper::intelligence::{EntityExtractor, IntentClassifier};
use formhelper::remote::{RateWindow, RemoteGateway};
use formhelper::routing::{HybridRouter, StrategyChain};
use formhelper::{FormContext, KnowledgeBase};

const QUERIES: &[&str] = &[
    "What is OD?",
    "92250",
    "show me all CPT codes for ophthalmology",
    "my claim was denied for E11.319 with modifier 25",
    "Explain the difference between ICD-10 and CPT codes and when to use each",
    "how do I verify insurance coverage",
];

fn bench_classification(c: &mut Criterion) {
    let classifier = IntentClassifier::new();

    let mut group = c.benchmark_group("intent_classification");
    group.throughput(Throughput::Elements(QUERIES.len() as u64));
    group.bench_function("classify_mixed", |b| {
        b.iter(|| {
            for q in QUERIES {
                black_box(classifier.classify(q));
            }
        })
    });
    group.bench_function("classifier_new", |b| b.iter(IntentClassifier::new));
    group.finish();
}

fn bench_extraction(c: &mut Criterion) {
    let extractor = EntityExtractor::new(Arc::new(KnowledgeBase::builtin()));
    let text = "Fundus photography 92250 for diabetic retinopathy E11.319 OD, \
                POS 11 with modifier 25 and 92250-26, follow-up for glaucoma H40.10";

    let mut group = c.benchmark_group("entity_extraction");
    group.throughput(Throughput::Bytes(text.len() as u64));
    group.bench_function("extract_mixed", |b| b.iter(|| extractor.extract(black_box(text))));
    group.finish();
}

fn bench_local_answer(c: &mut Criterion) {
    let kb = Arc::new(KnowledgeBase::builtin());
    let chain = Arc::new(StrategyChain::new(kb.clone()));
    let gateway = Arc::new(RemoteGateway::new(
        None,
        Arc::new(RateWindow::default()),
        RemoteConfig::default(),
    ));
    let router = HybridRouter::new(chain.clone(), gateway);
    let classifier = IntentClassifier::new();
    let extractor = EntityExtractor::new(kb);
    let context = FormContext::default();

    let mut group = c.benchmark_group("local_path");
    group.bench_function("route_decision", |b| {
        b.iter(|| {
            for q in QUERIES {
                black_box(router.decide(q));
            }
        })
    });
    group.bench_function("chain_execute", |b| {
        b.iter(|| {
            for q in QUERIES {
                let classification = classifier.classify(q);
                let extraction = extractor.extract(q);
                black_box(chain.execute(q, &classification, &extraction, &context));
            }
        })
    });
    group.finish();
}

criterion_group!(benches, bench_classification, bench_extraction, bench_local_answer);

criterion_main!(benches);
