//! HTTP API tests against a server bound to a free local port.

mod common;

use claimcheck::server::run_server_with_checker;
use claimcheck::tools::ToolRegistry;
use common::*;
use serde_json::{json, Value};
use std::sync::Arc;

const VERDICT_FALSE: &str = r#"{"verdict": "false", "explanation": "Budget documents disagree."}"#;

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

/// Start a server over a healthy in-memory checker; returns its base URL.
async fn start_server() -> (String, tokio::task::JoinHandle<()>) {
    let port = find_free_port();
    let model = StageModel::new("economics", "The figures contradict the claim.", VERDICT_FALSE);
    let checker = Arc::new(healthy_checker(model));

    let handle = tokio::spawn(async move {
        run_server_with_checker(
            &format!("127.0.0.1:{}", port),
            checker,
            ToolRegistry::with_builtins(),
        )
        .await
        .ok();
    });
    wait_for_server(port).await;
    (format!("http://127.0.0.1:{}", port), handle)
}

#[tokio::test]
async fn test_health_reports_version() {
    let (base, handle) = start_server().await;

    let body: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));

    handle.abort();
}

#[tokio::test]
async fn test_verify_then_cached() {
    let (base, handle) = start_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/verify", base))
        .json(&json!({ "statement": "Tax revenue doubled in 2023" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["cached"], false);
    assert_eq!(body["statement"], "Tax revenue doubled in 2023");
    assert_eq!(body["domain"], "economics");
    assert_eq!(body["verdict"], "false");
    assert_eq!(body["search_source"], "tavily");
    assert_eq!(body["method"], "4-stage-pipeline");

    let again: Value = client
        .post(format!("{}/verify", base))
        .json(&json!({ "statement": "Tax revenue doubled in 2023" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(again["cached"], true);
    assert_eq!(again["id"], body["id"]);

    let stats: Value = reqwest::get(format!("{}/stats", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["cache"]["size"], 1);
    assert_eq!(stats["search_quota"][0]["provider"], "tavily");
    assert_eq!(stats["search_quota"][0]["remaining"], 999);
    assert_eq!(stats["models"].as_array().unwrap().len(), 3);

    handle.abort();
}

#[tokio::test]
async fn test_verify_rejects_empty_statement() {
    let (base, handle) = start_server().await;

    let resp = reqwest::Client::new()
        .post(format!("{}/verify", base))
        .json(&json!({ "statement": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");

    handle.abort();
}

#[tokio::test]
async fn test_verify_batch_preserves_order() {
    let (base, handle) = start_server().await;
    let client = reqwest::Client::new();

    let statements = ["first claim", "second claim", "third claim"];
    let resp = client
        .post(format!("{}/verify/batch", base))
        .json(&json!({ "statements": statements, "mode": "parallel", "max_concurrent": 2 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 3);
    for (result, statement) in results.iter().zip(statements) {
        assert_eq!(result["statement"], statement);
        assert_eq!(result["verdict"], "false");
    }

    let resp = client
        .post(format!("{}/verify/batch", base))
        .json(&json!({ "statements": ["fourth"], "mode": "rate_limited", "rate_per_second": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    handle.abort();
}

#[tokio::test]
async fn test_verify_batch_extreme_settings() {
    let (base, handle) = start_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/verify/batch", base))
        .json(&json!({ "statements": ["a claim", "b claim"], "mode": "parallel", "max_concurrent": u64::MAX }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["results"].as_array().unwrap().len(), 2);

    let resp = client
        .post(format!("{}/verify/batch", base))
        .json(&json!({ "statements": ["c claim"], "mode": "rate_limited", "rate_per_second": 1e-20 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "bad_request");

    handle.abort();
}

#[tokio::test]
async fn test_cache_sweep_reports_removed() {
    let (base, handle) = start_server().await;

    let body: Value = reqwest::Client::new()
        .post(format!("{}/cache/sweep", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["removed"], 0);

    handle.abort();
}

#[tokio::test]
async fn test_tools_list_and_call() {
    let (base, handle) = start_server().await;
    let client = reqwest::Client::new();

    let body: Value = reqwest::get(format!("{}/tools/list", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let names: Vec<&str> = body["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["search_web", "verify_claim", "quota_status"]);

    let resp = client
        .post(format!("{}/tools/search_web", base))
        .json(&json!({ "query": "GDP 2024" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["result"]["source"], "tavily");
    assert_eq!(body["result"]["results"][0]["title"], "growth");

    let body: Value = client
        .post(format!("{}/tools/quota_status", base))
        .json(&json!({}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["result"]["providers"][0]["used"], 1);

    let resp = client
        .post(format!("{}/tools/verify_claim", base))
        .json(&json!({ "use_cache": false }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(format!("{}/tools/verify_claim", base))
        .json(&json!({ "statement": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(format!("{}/tools/nonexistent", base))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "not_found");

    handle.abort();
}
