//! End-to-end checks of the pipeline, routers, cache, and batch runner
//! wired together through `FactChecker`.

mod common;

use anyhow::Result;
use async_trait::async_trait;
use claimcheck::batch::{BatchRunner, ClaimVerifier};
use claimcheck::config::{parse_config, Config};
use claimcheck::models::{ClaimRecord, Domain, Verdict, PIPELINE_METHOD};
use claimcheck::pipeline::Pipeline;
use claimcheck::search::{Remaining, SearchRouter};
use claimcheck::service::BatchMode;
use common::*;
use std::sync::atomic::Ordering;
use std::sync::Arc;

const VERDICT_TRUE: &str = r#"{"verdict": "true", "explanation": "Official statistics agree."}"#;

#[tokio::test]
async fn test_check_populates_every_stage() {
    let model = StageModel::new("economics", "The statement matches the evidence.", VERDICT_TRUE);
    let checker = healthy_checker(model.clone());

    let outcome = checker.check("GDP grew by 5% in 2024", true).await;
    let record = outcome.record;

    assert!(!outcome.cached);
    assert_eq!(record.statement(), "GDP grew by 5% in 2024");
    assert_eq!(record.domain, Domain::Economics);
    assert_eq!(record.verdict, Verdict::True);
    assert_eq!(record.search_source, "tavily");
    assert_eq!(record.search_results.len(), 1);
    assert_eq!(record.retrieved_docs.len(), 1);
    assert_eq!(record.method, PIPELINE_METHOD);
    assert!(record.analysis.contains("Official statistics agree."));
    assert_eq!(model.calls(), 3);
}

#[tokio::test]
async fn test_domain_and_verdict_always_valid() {
    let replies = [
        ("health", VERDICT_TRUE),
        ("SPORTS", "not json at all"),
        ("", r#"{"verdict": "maybe"}"#),
        ("politics\n", "```json\n{\"verdict\": \"FALSE\", \"explanation\": \"x\"}\n```"),
    ];

    for (domain, verdict) in replies {
        let model = StageModel::new(domain, "Some analysis.", verdict);
        let checker = checker(model, SearchRouter::new(), Arc::new(FailingIndex));
        let record = checker.check("claim", false).await.record;

        assert!(Domain::ALL.contains(&record.domain));
        assert!(matches!(
            record.verdict,
            Verdict::True | Verdict::False | Verdict::Insufficient
        ));
    }
}

#[tokio::test]
async fn test_every_model_call_failing_degrades() {
    let model = Arc::new(StageModel {
        domain: None,
        analysis: None,
        verdict: None,
        calls: Default::default(),
    });
    let checker = checker(model, SearchRouter::new(), Arc::new(FailingIndex));

    let record = checker.check("claim", true).await.record;
    assert_eq!(record.domain, Domain::Politics);
    assert!(record.analysis.starts_with("Analysis failed:"));
    assert_eq!(record.verdict, Verdict::Insufficient);
    assert!(record.retrieved_docs.is_empty());
    assert_eq!(record.search_source, "none");
}

#[tokio::test]
async fn test_empty_evidence_still_analyzed() {
    let model = StageModel::new("health", "There is nothing to compare against.", VERDICT_TRUE);
    let checker = checker(model, SearchRouter::new(), Arc::new(StaticIndex(vec![])));

    let record = checker.check("Vaccines were free in 2021", true).await.record;
    assert!(record.search_results.is_empty());
    assert!(record.retrieved_docs.is_empty());
    assert!(!record.analysis.is_empty());
}

#[tokio::test]
async fn test_unparsable_verdict_falls_back_to_keywords() {
    let model = StageModel::new(
        "politics",
        "සාක්ෂි අනුව මෙම ප්‍රකාශය අසත්‍ය වේ.",
        "The statement is probably wrong, see above",
    );
    let checker = checker(model, SearchRouter::new(), Arc::new(StaticIndex(vec![])));

    let record = checker.check("claim", true).await.record;
    assert_eq!(record.verdict, Verdict::False);
}

#[tokio::test]
async fn test_exhausted_and_unconfigured_providers_fall_through() {
    let mut search = SearchRouter::new();
    search.register(StaticSearch::ok("tavily", vec![hit("a", "from tavily")]), Some(1));
    search.register(StaticSearch::unconfigured("brave"), Some(2000));
    search.register(
        StaticSearch::ok("duckduckgo", vec![hit("b", "from duckduckgo")]),
        None,
    );

    // Spend tavily's single unit.
    assert_eq!(search.search("warm-up").await.source, "tavily");

    let outcome = search.search("claim").await;
    assert_eq!(outcome.source, "duckduckgo");
    assert_eq!(outcome.results[0].content, "from duckduckgo");
    assert_eq!(outcome.remaining, Remaining::Unlimited);

    let status = search.quota_status();
    assert_eq!(status[0].used, 1);
    assert_eq!(status[0].remaining, Remaining::Limited(0));
    assert!(!status[1].configured);
    assert_eq!(status[1].used, 0);
}

#[tokio::test]
async fn test_all_providers_failing_returns_tagged_empty() {
    let mut search = SearchRouter::new();
    search.register(StaticSearch::failing("tavily"), Some(1000));
    search.register(StaticSearch::failing("duckduckgo"), None);

    let outcome = search.search("claim").await;
    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["source"], "none");
    assert_eq!(json["results"], serde_json::json!([]));
    assert_eq!(json["remaining"], "unknown");
    assert_eq!(search.quota_status()[0].used, 0);
}

#[tokio::test]
async fn test_cache_hit_skips_pipeline() {
    let model = StageModel::new("economics", "Supported.", VERDICT_TRUE);
    let checker = healthy_checker(model.clone());

    let first = checker.check("Inflation fell", true).await;
    let second = checker.check("  inflation   FELL ", true).await;

    assert!(!first.cached);
    assert!(second.cached);
    assert_eq!(first.record, second.record);
    assert_eq!(model.calls(), 3);

    let forced = checker.check("Inflation fell", false).await;
    assert!(!forced.cached);
    assert_eq!(model.calls(), 6);

    assert_eq!(checker.stats().cache.size, 1);
    checker.clear_all();
    assert_eq!(checker.stats().cache.size, 0);
}

#[tokio::test]
async fn test_check_batch_mixes_cached_and_fresh_in_order() {
    let model = StageModel::new("economics", "Supported.", VERDICT_TRUE);
    let checker = healthy_checker(model.clone());
    checker.check("second", true).await;

    let statements: Vec<String> = ["first", "second", "third"].iter().map(|s| s.to_string()).collect();
    let entries = checker
        .check_batch(&statements, BatchMode::Parallel { max_concurrent: 2 })
        .await
        .unwrap();

    assert_eq!(entries.len(), 3);
    let cached: Vec<bool> = entries.iter().map(|e| e.cached).collect();
    assert_eq!(cached, vec![false, true, false]);
    for (entry, statement) in entries.iter().zip(&statements) {
        assert_eq!(entry.item.statement(), statement);
    }

    // Fresh results were cached.
    assert!(checker.check("third", true).await.cached);
    assert_eq!(checker.stats().search_quota[0].used, 3);
}

#[tokio::test(start_paused = true)]
async fn test_check_batch_rate_limited() {
    let model = StageModel::new("health", "Supported.", VERDICT_TRUE);
    let checker = healthy_checker(model);
    let statements: Vec<String> = vec!["a".into(), "b".into()];

    let started = tokio::time::Instant::now();
    let entries = checker
        .check_batch(&statements, BatchMode::RateLimited { rate_per_second: 0.5 })
        .await
        .unwrap();
    assert_eq!(entries.len(), 2);
    assert!(started.elapsed() >= std::time::Duration::from_secs(2));

    assert!(checker
        .check_batch(&statements, BatchMode::RateLimited { rate_per_second: -1.0 })
        .await
        .is_err());
}

struct FlakyVerifier;

#[async_trait]
impl ClaimVerifier for FlakyVerifier {
    async fn verify(&self, statement: &str) -> Result<ClaimRecord> {
        if statement == "item 3" {
            anyhow::bail!("model quota exceeded");
        }
        let mut record = ClaimRecord::new(statement);
        record.verdict = Verdict::Insufficient;
        Ok(record)
    }
}

#[tokio::test]
async fn test_batch_item_failure_is_isolated() {
    let runner = BatchRunner::new(Arc::new(FlakyVerifier));
    let statements: Vec<String> = (1..=5).map(|i| format!("item {}", i)).collect();

    let items = runner.run_parallel(&statements, 10).await;
    assert_eq!(items.len(), 5);
    for (i, item) in items.iter().enumerate() {
        assert_eq!(item.statement(), statements[i]);
        if i == 2 {
            assert_eq!(item.verdict(), Verdict::Error);
        } else {
            assert!(!item.is_error());
        }
    }

    let json = serde_json::to_value(&items[2]).unwrap();
    assert_eq!(json["verdict"], "error");
    assert_eq!(json["statement"], "item 3");
    assert!(json["error"].as_str().unwrap().contains("model quota exceeded"));
}

#[tokio::test]
async fn test_quality_saturation_degrades_analysis_to_throughput() {
    let model = StageModel::new("economics", "Supported.", VERDICT_TRUE);
    let mut models = models_config();
    models.quality_rpm = 1;
    let router = claimcheck::router::ModelRouter::from_config(&models, model.clone());
    let pipeline = Pipeline::new(
        Arc::new(router),
        Arc::new(SearchRouter::new()),
        Arc::new(StaticIndex(vec![])),
        Default::default(),
    );

    pipeline.run("one").await;
    let record = pipeline.run("two").await;
    assert_eq!(record.analysis.lines().next(), Some("Supported."));

    let quality = &pipeline.router().stats()[1];
    assert_eq!(quality.used, 1);
    assert_eq!(quality.limit, 1);
    assert_eq!(model.calls.load(Ordering::SeqCst), 6);
}

#[test]
fn test_missing_model_key_is_fatal_at_construction() {
    let cfg: Config = parse_config(
        "[models]\napi_key_env = \"CLAIMCHECK_TEST_KEY_THAT_IS_NEVER_SET\"\n",
    )
    .unwrap();

    let err = match Pipeline::from_config(&cfg) {
        Ok(_) => panic!("pipeline built without a model key"),
        Err(e) => e,
    };
    assert!(err.to_string().contains("CLAIMCHECK_TEST_KEY_THAT_IS_NEVER_SET"));
}
